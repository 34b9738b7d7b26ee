use super::*;
use fetchbridge_test_utils::callback::RecordingCallback;

fn target(uri: &str) -> TargetDescriptor {
    TargetDescriptor::new(Url::parse(uri).unwrap(), "cluster1", "token")
}

#[tokio::test(flavor = "multi_thread")]
async fn scripted_response() {
    let pool = MemConnectionPool::new();
    pool.set_reply("http://host/a", MemReply::ok("hello"));

    let callback = RecordingCallback::new();
    pool.remote_fetcher()
        .unwrap()
        .fetch(target("http://host/a"), callback.clone());

    match callback.wait_outcome().await {
        Outcome::Success { headers, body } => {
            assert_eq!(http::StatusCode::OK, headers.status());
            assert_eq!(Some(5), headers.content_length());
            assert_eq!(&b"hello"[..], &body[..]);
        }
        oth => panic!("unexpected outcome: {oth:?}"),
    }
    assert_eq!(1, pool.fetchers_created());
    assert_eq!(vec![target("http://host/a")], pool.requests());
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_uri_fails() {
    let pool = MemConnectionPool::new();

    let callback = RecordingCallback::new();
    pool.remote_fetcher()
        .unwrap()
        .fetch(target("http://host/missing"), callback.clone());

    assert_eq!(
        Outcome::Failure(FailureReason::Transport(
            "no route to http://host/missing".into()
        )),
        callback.wait_outcome().await
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn reply_keys_are_normalized() {
    let pool = MemConnectionPool::new();
    pool.set_reply("http://HOST", MemReply::Fail("refused".into()));

    let callback = RecordingCallback::new();
    pool.remote_fetcher()
        .unwrap()
        .fetch(target("http://host/"), callback.clone());

    assert_eq!(
        Outcome::Failure(FailureReason::Transport("refused".into())),
        callback.wait_outcome().await
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn delayed_response_is_not_immediate() {
    let pool = MemConnectionPool::new();
    pool.set_reply(
        "http://host/slow",
        MemReply::ok("x").with_delay(Duration::from_millis(100)),
    );

    let callback = RecordingCallback::new();
    pool.remote_fetcher()
        .unwrap()
        .fetch(target("http://host/slow"), callback.clone());

    assert!(callback.outcomes().is_empty());
    assert!(matches!(
        callback.wait_outcome().await,
        Outcome::Success { .. }
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn respond_twice_reports_two_outcomes() {
    let pool = MemConnectionPool::new();
    let MemReply::Respond { headers, body, .. } = MemReply::ok("x") else {
        unreachable!()
    };
    pool.set_reply("http://host/twice", MemReply::RespondTwice { headers, body });

    let callback = RecordingCallback::new();
    pool.remote_fetcher()
        .unwrap()
        .fetch(target("http://host/twice"), callback.clone());
    callback.wait_outcome().await;

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(2, callback.outcomes().len());
}

#[test]
fn without_runtime_replies_inline() {
    let pool = MemConnectionPool::new();
    pool.set_reply("http://host/a", MemReply::ok("hello"));

    let callback = RecordingCallback::new();
    pool.remote_fetcher()
        .unwrap()
        .fetch(target("http://host/a"), callback.clone());

    assert_eq!(1, callback.outcomes().len());
}
