use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use loadbalancer::{Backend, BackendPool, MessageFramer};
use std::hint::black_box;

fn request_with_body(body_len: usize) -> Vec<u8> {
    let mut raw = format!(
        "POST /upload HTTP/1.1\r\nHost: bench.local\r\nUser-Agent: bench\r\nContent-Length: {body_len}\r\n\r\n"
    )
    .into_bytes();
    raw.resize(raw.len() + body_len, b'x');
    raw
}

fn framer_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let framer = MessageFramer::default();
    let mut group = c.benchmark_group("read_message");

    for body_len in [0usize, 1024, 64 * 1024] {
        let raw = request_with_body(body_len);
        group.throughput(Throughput::Bytes(raw.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(body_len), &raw, |b, raw| {
            b.iter(|| {
                rt.block_on(async {
                    let mut reader = raw.as_slice();
                    black_box(framer.read_message(&mut reader).await.unwrap())
                })
            });
        });
    }

    group.finish();
}

fn select_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let pool = BackendPool::with_backends((1..=8).map(|i| Backend::new("127.0.0.1", 4000 + i)));

    c.bench_function("select_next", |b| {
        b.iter(|| rt.block_on(async { black_box(pool.select_next().await.unwrap()) }));
    });
}

criterion_group!(benches, framer_benchmark, select_benchmark);
criterion_main!(benches);
