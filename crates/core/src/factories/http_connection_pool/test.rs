use super::*;
use fetchbridge_test_utils::callback::RecordingCallback;
use std::io::Write;
use std::net::TcpListener;

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

fn target(uri: &str, cluster: &str) -> TargetDescriptor {
    TargetDescriptor::new(Url::parse(uri).unwrap(), cluster, "token")
}

async fn fetch(
    config: HttpConnectionPoolConfig,
    target: TargetDescriptor,
) -> Outcome {
    let callback = RecordingCallback::new();
    HttpConnectionPool::new(config)
        .remote_fetcher()
        .unwrap()
        .fetch(target, callback.clone());
    callback.wait_outcome().await
}

#[tokio::test(flavor = "multi_thread")]
async fn fetches_a_response() {
    let (base, server) = serve_once(
        "HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello",
    );

    let mut request_headers = http::HeaderMap::new();
    request_headers.insert(
        http::header::USER_AGENT,
        http::HeaderValue::from_static("fetchbridge-test"),
    );
    let target = target(&format!("{base}/a?b=c"), "default")
        .with_request_headers(request_headers);

    match fetch(HttpConnectionPoolConfig::default(), target).await {
        Outcome::Success { headers, body } => {
            assert_eq!(http::StatusCode::OK, headers.status());
            assert_eq!(Some(5), headers.content_length());
            assert_eq!(&b"hello"[..], &body[..]);
        }
        oth => panic!("unexpected outcome: {oth:?}"),
    }

    let request = server.join().unwrap();
    assert!(request.starts_with("get /a?b=c http/1.1"), "{request}");
    assert!(request.contains("user-agent: fetchbridge-test"), "{request}");
}

#[tokio::test(flavor = "multi_thread")]
async fn repeated_request_header_sends_every_value() {
    let (base, server) = serve_once(
        "HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
    );

    let mut request_headers = http::HeaderMap::new();
    request_headers.append(
        http::header::ACCEPT,
        http::HeaderValue::from_static("text/html"),
    );
    request_headers.append(
        http::header::ACCEPT,
        http::HeaderValue::from_static("application/json"),
    );
    let target = target(&format!("{base}/a"), "default")
        .with_request_headers(request_headers);

    let outcome = fetch(HttpConnectionPoolConfig::default(), target).await;
    assert!(matches!(outcome, Outcome::Success { .. }), "{outcome:?}");

    let request = server.join().unwrap();
    assert!(
        request.contains("accept: text/html, application/json"),
        "{request}"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn error_status_is_a_response() {
    let (base, server) = serve_once(
        "HTTP/1.1 404 Not Found\r\nContent-Length: 4\r\nConnection: close\r\n\r\nnope",
    );

    match fetch(
        HttpConnectionPoolConfig::default(),
        target(&format!("{base}/missing"), "default"),
    )
    .await
    {
        Outcome::Success { headers, body } => {
            assert_eq!(http::StatusCode::NOT_FOUND, headers.status());
            assert_eq!(&b"nope"[..], &body[..]);
        }
        oth => panic!("unexpected outcome: {oth:?}"),
    }
    server.join().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn redirect_is_not_followed() {
    let (base, server) = serve_once(
        "HTTP/1.1 302 Found\r\nLocation: /elsewhere\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
    );

    match fetch(
        HttpConnectionPoolConfig::default(),
        target(&format!("{base}/moved"), "default"),
    )
    .await
    {
        Outcome::Success { headers, .. } => {
            assert_eq!(http::StatusCode::FOUND, headers.status());
            assert_eq!(
                "/elsewhere",
                headers
                    .headers()
                    .get(http::header::LOCATION)
                    .unwrap()
                    .to_str()
                    .unwrap()
            );
        }
        oth => panic!("unexpected outcome: {oth:?}"),
    }
    server.join().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn connection_refused_is_a_failure() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };

    match fetch(
        HttpConnectionPoolConfig::default(),
        target(&format!("http://{addr}/a"), "default"),
    )
    .await
    {
        Outcome::Failure(FailureReason::Transport(reason)) => {
            assert!(!reason.is_empty());
        }
        oth => panic!("unexpected outcome: {oth:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn unlisted_cluster_can_be_refused() {
    let config = HttpConnectionPoolConfig {
        allow_unlisted_clusters: false,
        ..Default::default()
    };

    assert_eq!(
        Outcome::Failure(FailureReason::Transport(
            "unknown cluster \"cluster9\"".into()
        )),
        fetch(config, target("http://host.invalid/a", "cluster9")).await
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn cluster_endpoint_receives_the_request() {
    let (base, server) = serve_once(
        "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok",
    );
    let mut config = HttpConnectionPoolConfig {
        allow_unlisted_clusters: false,
        ..Default::default()
    };
    config.clusters.insert(
        "cluster1".into(),
        ClusterConfig {
            endpoint: Some(base),
        },
    );

    let outcome =
        fetch(config, target("http://origin.invalid/a/b?x=1", "cluster1"))
            .await;
    assert!(matches!(outcome, Outcome::Success { .. }), "{outcome:?}");

    let request = server.join().unwrap();
    assert!(request.starts_with("get /a/b?x=1 http/1.1"), "{request}");
    assert!(request.contains("host: origin.invalid"), "{request}");
}

#[tokio::test(flavor = "multi_thread")]
async fn oversized_body_is_a_failure() {
    let (base, server) = serve_once(
        "HTTP/1.1 200 OK\r\nContent-Length: 10\r\nConnection: close\r\n\r\n0123456789",
    );
    let config = HttpConnectionPoolConfig {
        max_body_bytes: 4,
        ..Default::default()
    };

    assert_eq!(
        Outcome::Failure(FailureReason::Transport(
            "response body exceeds 4 bytes".into()
        )),
        fetch(config, target(&format!("{base}/big"), "default")).await
    );
    server.join().unwrap();
}

#[test]
fn without_runtime_fails_immediately() {
    let callback = RecordingCallback::new();
    HttpConnectionPool::new(HttpConnectionPoolConfig::default())
        .remote_fetcher()
        .unwrap()
        .fetch(target("http://host.invalid/a", "default"), callback.clone());

    match callback.outcomes().as_slice() {
        [Outcome::Failure(FailureReason::Transport(reason))] => {
            assert!(reason.starts_with("no runtime"), "{reason}");
        }
        oth => panic!("unexpected outcomes: {oth:?}"),
    }
}

#[test]
fn default_config_renders() {
    let config = Config::default();
    HttpConnectionPoolFactory::create()
        .default_config(&config)
        .unwrap();
    let config: HttpConnectionPoolModConfig =
        config.get_module_config().unwrap();
    assert_eq!(10_000, config.http_connection_pool.connect_timeout_ms);
    assert!(config.http_connection_pool.allow_unlisted_clusters);
}
