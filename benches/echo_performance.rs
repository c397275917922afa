use bytes::Bytes;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use hako::start::{StartConfig, create_router};
use hako::{EchoHandler, Handler, HttpClient, ManagedServer, ServerConfig};
use http::{Method, Request};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

fn start_server(rt: &Runtime) -> (ManagedServer, SocketAddr) {
    let _guard = rt.enter();
    let server = ManagedServer::with_addr(
        "127.0.0.1:0".parse().unwrap(),
        create_router(&StartConfig::default()),
        ServerConfig::default(),
    );
    let addr = server.start_async().unwrap();
    (server, addr)
}

fn bench_echo_throughput(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (server, addr) = start_server(&rt);
    let client = Arc::new(Mutex::new(rt.block_on(HttpClient::connect(addr)).unwrap()));

    let mut group = c.benchmark_group("echo_throughput");

    // Test different body sizes over one keep-alive connection
    for size in [64, 256, 1024, 4096, 16384, 65536] {
        let body = Bytes::from(vec![b'x'; size]);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("keep_alive_post", size), &body, |b, body| {
            b.to_async(&rt).iter(|| {
                let client = client.clone();
                let body = body.clone();
                async move {
                    let response = client
                        .lock()
                        .await
                        .post("/echo", "application/octet-stream", black_box(body))
                        .await
                        .unwrap();
                    assert_eq!(response.body().len(), size);
                    response
                }
            });
        });
    }

    group.finish();
    rt.block_on(server.stop_now(Duration::from_secs(5))).unwrap();
}

fn bench_concurrent_clients(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (server, addr) = start_server(&rt);

    let mut group = c.benchmark_group("concurrent_clients");

    for count in [1, 5, 10, 20] {
        group.bench_with_input(BenchmarkId::new("connect_and_post", count), &count, |b, &count| {
            b.to_async(&rt).iter(|| async move {
                let mut clients = JoinSet::new();
                for _ in 0..count {
                    clients.spawn(async move {
                        let mut client = HttpClient::connect(addr).await.unwrap();
                        client
                            .post("/echo", "text/plain", black_box(vec![b'x'; 1024]))
                            .await
                            .unwrap()
                    });
                }

                while let Some(result) = clients.join_next().await {
                    assert_eq!(result.unwrap().body().len(), 1024);
                }
            });
        });
    }

    group.finish();
    rt.block_on(server.stop_now(Duration::from_secs(5))).unwrap();
}

fn bench_handler_overhead(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let echo = EchoHandler::default();
    let router = create_router(&StartConfig::default());

    let request = || {
        Request::builder()
            .method(Method::POST)
            .uri("/echo")
            .header("content-type", "text/plain")
            .body(Bytes::from_static(b"Hello, World!"))
            .unwrap()
    };

    let mut group = c.benchmark_group("handler_overhead");

    group.bench_function("echo_handler", |b| {
        b.to_async(&rt).iter(|| echo.handle(black_box(request())));
    });

    // Routing plus request id and logging middleware
    group.bench_function("router", |b| {
        b.to_async(&rt).iter(|| router.handle(black_box(request())));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_echo_throughput,
    bench_concurrent_clients,
    bench_handler_overhead
);
criterion_main!(benches);
