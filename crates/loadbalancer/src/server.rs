//! Listener: accepts client connections and hands each to its own task.

use crate::error::ProxyError;
use crate::handler::ConnectionHandler;
use crate::health::HealthMonitor;
use crate::pool::BackendPool;
use crate::types::LoadBalancerConfig;
use futures::FutureExt;
use std::future::Future;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Bound load balancer, ready to serve.
pub struct LoadBalancer {
    listener: TcpListener,
    pool: Arc<BackendPool>,
    handler: Arc<ConnectionHandler>,
    monitor: HealthMonitor,
}

impl LoadBalancer {
    /// Bind the listening socket and register the configured backends.
    pub async fn bind(config: LoadBalancerConfig) -> Result<Self, ProxyError> {
        let addr = config.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ProxyError::Bind {
                addr: addr.clone(),
                source,
            })?;

        let pool = Arc::new(BackendPool::new());
        for backend in &config.backends {
            pool.add_backend(backend.clone()).await;
        }
        if pool.is_empty().await {
            warn!("No backends configured, every request will get 503");
        }

        let handler = Arc::new(ConnectionHandler::new(pool.clone(), &config));
        let monitor = HealthMonitor::new(pool.clone(), config.health.clone());

        info!(addr = %addr, backends = config.backends.len(), "Load balancer bound");

        Ok(Self {
            listener,
            pool,
            handler,
            monitor,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ProxyError> {
        Ok(self.listener.local_addr()?)
    }

    /// Pool shared by the handlers and the health monitor.
    pub fn pool(&self) -> Arc<BackendPool> {
        self.pool.clone()
    }

    /// Serve until the process exits.
    pub async fn run(self) -> Result<(), ProxyError> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Serve until `shutdown` completes.
    ///
    /// The health monitor runs for as long as the listener does. In-flight
    /// connections are left to finish on their own tasks.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> Result<(), ProxyError>
    where
        F: Future<Output = ()>,
    {
        let LoadBalancer {
            listener,
            pool: _,
            handler,
            monitor,
        } = self;

        let stop_monitor = monitor.stop_handle();
        let monitor_handle = tokio::spawn(monitor.run());

        if let Ok(addr) = listener.local_addr() {
            info!(addr = %addr, "Listening for connections");
        }

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, no longer accepting connections");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let handler = handler.clone();
                        spawn_session(peer, async move { handler.handle(stream, peer).await });
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    }
                }
            }
        }

        stop_monitor.notify_one();
        if let Err(e) = monitor_handle.await {
            warn!(error = %e, "Health monitor task failed");
        }

        info!("Load balancer stopped");
        Ok(())
    }
}

/// Run one connection on its own task.
///
/// A panic inside `session` ends that task only; the socket it owned is
/// dropped during unwinding.
fn spawn_session<F>(peer: SocketAddr, session: F) -> JoinHandle<()>
where
    F: Future + Send + 'static,
{
    tokio::spawn(async move {
        if AssertUnwindSafe(session).catch_unwind().await.is_err() {
            error!(peer = %peer, "Connection handler panicked");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backend;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn config_with(backends: Vec<Backend>) -> LoadBalancerConfig {
        LoadBalancerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            backends,
            ..LoadBalancerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_bind_registers_backends_in_order() {
        let lb = LoadBalancer::bind(config_with(vec![
            Backend::new("127.0.0.1", 4001),
            Backend::new("127.0.0.1", 4002),
            Backend::new("127.0.0.1", 4001),
        ]))
        .await
        .unwrap();

        let snapshot = lb.pool().snapshot().await;
        assert_eq!(
            snapshot.healthy,
            vec![Backend::new("127.0.0.1", 4001), Backend::new("127.0.0.1", 4002)]
        );
        assert_ne!(lb.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let mut config = config_with(Vec::new());
        config.port = port;

        match LoadBalancer::bind(config).await {
            Err(ProxyError::Bind { addr, .. }) => assert_eq!(addr, format!("127.0.0.1:{port}")),
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("bind on a used port succeeded"),
        }
    }

    #[tokio::test]
    async fn test_shutdown_stops_serving() {
        let lb = LoadBalancer::bind(config_with(Vec::new())).await.unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let server = tokio::spawn(lb.serve_with_shutdown(async {
            let _ = rx.await;
        }));
        tx.send(()).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(2), server)
            .await
            .expect("server did not stop")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_panicking_session_does_not_stop_serving() {
        let backend = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let backend_port = backend.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = backend.accept().await {
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let _ = stream.read_to_end(&mut request).await;
                    let _ = stream
                        .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
                        .await;
                });
            }
        });

        let lb = LoadBalancer::bind(config_with(vec![Backend::new("127.0.0.1", backend_port)]))
            .await
            .unwrap();
        let addr = lb.local_addr().unwrap();
        let (_shutdown, rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(lb.serve_with_shutdown(async {
            let _ = rx.await;
        }));

        let faulty = spawn_session(addr, async {
            panic!("handler fault");
        });
        assert!(faulty.await.is_ok(), "panic escaped the session task");

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
        let mut response = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), client.read_to_end(&mut response))
            .await
            .expect("no response after a panicking session")
            .unwrap();
        assert_eq!(response, b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok");
    }
}
