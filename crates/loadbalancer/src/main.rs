//! Load balancer binary

use anyhow::Context;
use loadbalancer::{Config, LoadBalancer};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);

    // Tracing is not initialized until the logging section is known
    let config = match Config::load(config_path.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) if config_path.is_some() => {
            return Err(e).context("failed to load configuration");
        }
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            eprintln!("Using default configuration");
            Config::default()
        }
    };

    common::logging::init_with(config.logging.level(), config.logging.format());

    tracing::info!("Load balancer starting");

    let lb_config = config
        .to_balancer_config()
        .context("invalid backend list")?;
    let lb = LoadBalancer::bind(lb_config).await?;

    lb.serve_with_shutdown(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    })
    .await?;

    Ok(())
}
