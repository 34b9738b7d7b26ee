use fetchbridge_api::{
    config::Config, consumer::MockFetchConsumer, message::MessageType,
    remote_fetch::FailureReason,
};
use fetchbridge_core::{
    default_builder, default_test_builder,
    factories::{
        http_connection_pool::config::*, MemConnectionPool,
        MemConnectionPoolFactory, MemReply,
    },
    fetch_bridge::{config::CoreFetchBridgeModConfig, FetchState},
    CoreUrlFetcher,
};
use fetchbridge_test_utils::{
    consumer::RecordingConsumer, enable_tracing,
    message::RecordingMessageHandler, WAIT_TIMEOUT,
};
use std::io::{Read, Write};
use std::net::TcpListener;

#[tokio::test(flavor = "multi_thread")]
async fn fetcher_uses_builder_config() {
    enable_tracing();
    let pool = MemConnectionPool::new();
    pool.set_reply("http://host/a", MemReply::ok("hello"));

    let mut builder = default_test_builder().with_default_config().unwrap();
    builder.connection_pool =
        MemConnectionPoolFactory::with_pool(pool.clone());
    let overrides = Config::from_json_str(
        r#"{"coreFetchBridge":{"defaultCluster":"edge","userAgent":"probe/2"}}"#,
    )
    .unwrap();
    let overrides: CoreFetchBridgeModConfig =
        overrides.get_module_config().unwrap();
    builder.config.set_module_config(&overrides).unwrap();

    let fetcher = CoreUrlFetcher::new(builder.build().await.unwrap()).unwrap();
    assert_eq!("edge", fetcher.config().default_cluster);
    assert_eq!(60_000, fetcher.config().outcome_timeout_ms);

    let consumer = RecordingConsumer::new();
    let handle = fetcher.fetch("http://host/a", consumer.clone()).unwrap();

    assert_eq!(Ok(()), consumer.wait_done().await);
    let progress = tokio::time::timeout(WAIT_TIMEOUT, handle.wait())
        .await
        .unwrap();
    assert_eq!(FetchState::Released, progress.state);
    assert_eq!(5, progress.bytes_written);

    let requests = pool.requests();
    assert_eq!("edge", requests[0].cluster());
    assert_eq!(
        "probe/2",
        requests[0].request_headers()[http::header::USER_AGENT]
            .to_str()
            .unwrap(),
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn mock_consumer_sees_headers_write_done_in_order() {
    enable_tracing();
    let pool = MemConnectionPool::new();
    pool.set_reply("http://host/a", MemReply::ok("abc"));
    let mut builder = default_test_builder().with_default_config().unwrap();
    builder.connection_pool = MemConnectionPoolFactory::with_pool(pool);
    let fetcher = CoreUrlFetcher::new(builder.build().await.unwrap()).unwrap();

    let (done_send, mut done_recv) = tokio::sync::mpsc::unbounded_channel();
    let mut seq = mockall::Sequence::new();
    let mut consumer = MockFetchConsumer::new();
    consumer
        .expect_headers()
        .withf(|h| h.status() == http::StatusCode::OK)
        .times(1)
        .in_sequence(&mut seq)
        .return_const(());
    consumer
        .expect_write()
        .withf(|data| &data[..] == b"abc")
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));
    consumer
        .expect_done()
        .times(1)
        .in_sequence(&mut seq)
        .returning(move |result| {
            let _ = done_send.send(result);
        });

    fetcher
        .fetch("http://host/a", std::sync::Arc::new(consumer))
        .unwrap();

    let result = tokio::time::timeout(WAIT_TIMEOUT, done_recv.recv())
        .await
        .unwrap();
    assert_eq!(Some(Ok(())), result);
}

/// Accept one connection, answer it with `response` and return the
/// request head that was received.
fn serve_once(
    response: &'static str,
) -> (String, std::thread::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut request = Vec::new();
        let mut buf = [0; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        stream.write_all(response.as_bytes()).unwrap();
        String::from_utf8_lossy(&request).to_lowercase()
    });
    (format!("http://{addr}"), handle)
}

#[tokio::test(flavor = "multi_thread")]
async fn http_fetch_through_a_cluster_endpoint() {
    enable_tracing();
    let (endpoint, server) = serve_once(
        "HTTP/1.1 200 OK\r\nContent-Length: 11\r\nConnection: close\r\n\r\nhello world",
    );

    let builder = default_builder().with_default_config().unwrap();
    let mut pool_config = HttpConnectionPoolModConfig::default();
    pool_config.http_connection_pool.clusters.insert(
        "default".into(),
        ClusterConfig {
            endpoint: Some(endpoint),
        },
    );
    builder.config.set_module_config(&pool_config).unwrap();
    let fetcher = CoreUrlFetcher::new(builder.build().await.unwrap()).unwrap();

    let consumer = RecordingConsumer::new();
    fetcher
        .fetch("http://origin.example/index.html", consumer.clone())
        .unwrap();

    assert_eq!(Ok(()), consumer.wait_done().await);
    assert_eq!(&b"hello world"[..], &consumer.body()[..]);
    assert_eq!(Some(11), consumer.headers().unwrap().content_length());

    let request = server.join().unwrap();
    assert!(request.starts_with("get /index.html http/1.1"), "{request}");
    assert!(request.contains("host: origin.example"), "{request}");
    assert!(request.contains("user-agent: fetchbridge/"), "{request}");
}

#[tokio::test(flavor = "multi_thread")]
async fn http_error_status_is_delivered_as_a_response() {
    enable_tracing();
    let (base, server) = serve_once(
        "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 4\r\nConnection: close\r\n\r\nbusy",
    );

    let builder = default_builder().with_default_config().unwrap();
    let fetcher = CoreUrlFetcher::new(builder.build().await.unwrap()).unwrap();

    let consumer = RecordingConsumer::new();
    fetcher
        .fetch(&format!("{base}/status"), consumer.clone())
        .unwrap();

    assert_eq!(Ok(()), consumer.wait_done().await);
    assert_eq!(
        http::StatusCode::SERVICE_UNAVAILABLE,
        consumer.headers().unwrap().status()
    );
    assert_eq!(&b"busy"[..], &consumer.body()[..]);
    server.join().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn http_connection_failure_is_a_transport_failure() {
    enable_tracing();
    let addr = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();

    let handler = RecordingMessageHandler::new();
    let mut builder = default_builder().with_default_config().unwrap();
    builder.message_handler = handler.clone();
    let fetcher = CoreUrlFetcher::new(builder.build().await.unwrap()).unwrap();

    let consumer = RecordingConsumer::new();
    fetcher
        .fetch(&format!("http://{addr}/gone"), consumer.clone())
        .unwrap();

    let result = consumer.wait_done().await;
    assert!(matches!(result, Err(FailureReason::Transport(_))), "{result:?}");
    assert!(consumer.headers().is_none());
    assert!(!handler.contains(MessageType::Error, "released"));
}
