//! Client tests against an in-process bloomd.

mod common;

use bloomd_client::{
    BloomdClient, BloomdError, ClearResult, CreateFilterArgs, CreateResult, Lookup, StateResult,
};
use common::{eventually, FakeBloomd};
use std::time::Duration;

use StateResult::{No, Yes};

const TIMEOUT: Duration = Duration::from_secs(2);

async fn connect(server: &FakeBloomd) -> BloomdClient {
    BloomdClient::connect(&server.addr, TIMEOUT).await.unwrap()
}

#[tokio::test]
async fn test_filter_lifecycle() {
    let server = FakeBloomd::start().await;
    let client = connect(&server).await;

    let args = CreateFilterArgs::new("f", Some(100_000), Some(0.0001), None).unwrap();
    assert_eq!(client.create_with(args).unwrap().await.unwrap(), CreateResult::Done);

    assert_eq!(client.set("f", "a").unwrap().await.unwrap(), Lookup::Found(Yes));
    assert_eq!(client.set("f", "a").unwrap().await.unwrap(), Lookup::Found(No));
    assert_eq!(client.check("f", "a").unwrap().await.unwrap(), Lookup::Found(Yes));
    assert_eq!(client.check("f", "b").unwrap().await.unwrap(), Lookup::Found(No));
    assert_eq!(
        client.bulk("f", ["a", "b"]).unwrap().await.unwrap(),
        Lookup::Found(vec![No, Yes])
    );

    let info = client.info("f").unwrap().await.unwrap().found().unwrap();
    assert_eq!(info.capacity, 100_000);
    assert_eq!(info.size, 2);
    assert_eq!(info.sets, 4);
    assert_eq!(info.set_hits, 2);
    assert_eq!(info.checks, 2);
    assert_eq!(info.check_hits, 1);
    assert!(!info.in_memory);
    assert!((info.probability - 0.0001).abs() < 1e-9);

    assert_eq!(client.drop("f").unwrap().await.unwrap(), Lookup::Found(()));
    assert!(client.list(Some("f")).unwrap().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_create_existing_filter() {
    let server = FakeBloomd::start().await;
    let client = connect(&server).await;

    assert_eq!(client.create("f").unwrap().await.unwrap(), CreateResult::Done);
    assert_eq!(client.create("f").unwrap().await.unwrap(), CreateResult::Exists);
}

#[tokio::test]
async fn test_missing_filter_is_a_value() {
    let server = FakeBloomd::start().await;
    let client = connect(&server).await;

    assert_eq!(client.clear("nope").unwrap().await.unwrap(), Lookup::FilterNotFound);
    assert_eq!(client.drop("nope").unwrap().await.unwrap(), Lookup::FilterNotFound);
    assert_eq!(client.close("nope").unwrap().await.unwrap(), Lookup::FilterNotFound);
    assert_eq!(client.flush("nope").unwrap().await.unwrap(), Lookup::FilterNotFound);
    assert_eq!(client.check("nope", "k").unwrap().await.unwrap(), Lookup::FilterNotFound);
    assert_eq!(client.multi("nope", ["k"]).unwrap().await.unwrap(), Lookup::FilterNotFound);
    assert_eq!(client.info("nope").unwrap().await.unwrap(), Lookup::FilterNotFound);
}

#[tokio::test]
async fn test_clear_requires_close() {
    let server = FakeBloomd::start().await;
    let client = connect(&server).await;

    client.create("f").unwrap().await.unwrap();
    assert_eq!(
        client.clear("f").unwrap().await.unwrap(),
        Lookup::Found(ClearResult::NotProxied)
    );

    assert_eq!(client.close("f").unwrap().await.unwrap(), Lookup::Found(()));
    assert_eq!(
        client.clear("f").unwrap().await.unwrap(),
        Lookup::Found(ClearResult::Cleared)
    );
    assert_eq!(server.filter_size("f"), None);
}

#[tokio::test]
async fn test_list_with_prefix() {
    let server = FakeBloomd::start().await;
    let client = connect(&server).await;

    for name in ["users", "user_sessions", "events"] {
        client.create(name).unwrap().await.unwrap();
    }
    client.bulk("users", ["a", "b", "c"]).unwrap().await.unwrap();

    let all = client.list(None).unwrap().await.unwrap();
    assert_eq!(all.len(), 3);

    let users = client.list(Some("user")).unwrap().await.unwrap();
    let names: Vec<_> = users.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["user_sessions", "users"]);

    let row = users.iter().find(|f| f.name == "users").unwrap();
    assert_eq!(row.size, 3);
    assert_eq!(row.capacity, 100_000);

    // Blank prefix lists everything.
    assert_eq!(client.list(Some("  ")).unwrap().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_pipelined_commands_stay_in_order() {
    let server = FakeBloomd::start().await;
    let client = connect(&server).await;
    client.create("f").unwrap().await.unwrap();

    let sets: Vec<_> = (0..200)
        .map(|i| client.set("f", &format!("key{}", i % 100)).unwrap())
        .collect();

    for (i, pending) in sets.into_iter().enumerate() {
        let expected = if i < 100 { Yes } else { No };
        assert_eq!(pending.await.unwrap(), Lookup::Found(expected), "command {}", i);
    }
    assert_eq!(server.filter_size("f"), Some(100));
}

#[tokio::test]
async fn test_shared_client_across_tasks() {
    let server = FakeBloomd::start().await;
    let client = connect(&server).await;
    client.create("f").unwrap().await.unwrap();

    let mut handles = Vec::new();
    for task in 0..8 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..25 {
                let key = format!("t{}-k{}", task, i);
                assert_eq!(client.set("f", &key).unwrap().await.unwrap(), Lookup::Found(Yes));
                assert_eq!(client.check("f", &key).unwrap().await.unwrap(), Lookup::Found(Yes));
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(server.filter_size("f"), Some(200));
    assert_eq!(client.stats().commands_sent, 401);
    assert_eq!(client.stats().replies_received, 401);
}

#[tokio::test]
async fn test_validation_rejects_before_sending() {
    let server = FakeBloomd::start().await;
    let client = connect(&server).await;

    assert!(matches!(client.create("   "), Err(BloomdError::InvalidArgument(_))));
    assert!(matches!(
        CreateFilterArgs::new("f", Some(99_999), None, None),
        Err(BloomdError::InvalidArgument(_))
    ));
    assert!(matches!(
        CreateFilterArgs::new("f", None, Some(1.5), None),
        Err(BloomdError::InvalidArgument(_))
    ));
    assert!(matches!(client.set("f", ""), Err(BloomdError::InvalidArgument(_))));
    assert!(matches!(client.info("a b"), Err(BloomdError::InvalidArgument(_))));
    assert!(matches!(
        client.multi("f", Vec::<&str>::new()),
        Err(BloomdError::InvalidArgument(_))
    ));

    assert_eq!(client.stats().commands_sent, 0);
}

#[tokio::test]
async fn test_create_in_memory() {
    let server = FakeBloomd::start().await;
    let client = connect(&server).await;

    let args = CreateFilterArgs::new("f", None, None, Some(true)).unwrap();
    assert_eq!(client.create_with(args).unwrap().await.unwrap(), CreateResult::Done);
    let info = client.info("f").unwrap().await.unwrap().found().unwrap();
    assert!(info.in_memory);
}

#[tokio::test]
async fn test_server_disconnect_fails_client() {
    let server = FakeBloomd::start().await;
    let client = connect(&server).await;
    client.create("f").unwrap().await.unwrap();

    server.drop_connections();
    eventually(|| !client.is_connected()).await;

    assert!(matches!(client.check("f", "a"), Err(BloomdError::NotConnected)));
}

#[tokio::test]
async fn test_connect_refused() {
    let server = FakeBloomd::start().await;
    let addr = server.addr.clone();
    drop(server);
    // Give the listener task a moment to be aborted.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let result = BloomdClient::connect(&addr, TIMEOUT).await;
    assert!(matches!(result, Err(BloomdError::Io(_))));
}
