use httpmock::prelude::*;
use mailgun_client::{Client, Config, EVENT_STORED, Error, ListEventsOptions};
use serde_json::json;

fn client(server: &MockServer) -> Client {
    Client::builder(Config::new("testDomain", "testAPIKey"))
        .api_base(server.base_url())
        .build()
        .unwrap()
}

#[tokio::test]
async fn pages_until_empty() {
    let server = MockServer::start_async().await;
    let first = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/testDomain/events")
                .query_param("limit", "2");
            then.status(200).json_body(json!({
                "items": [
                    {"id": "a", "event": "delivered", "timestamp": 1.5},
                    {"id": "b", "event": "stored", "timestamp": 2.5,
                     "storage": {"key": "stored-key", "url": "https://example.com/stored-key"}}
                ],
                "paging": {"next": server.url("/testDomain/events/page2")}
            }));
        })
        .await;
    let second = server
        .mock_async(|when, then| {
            when.method(GET).path("/testDomain/events/page2");
            then.status(200).json_body(json!({
                "items": [{"id": "c", "event": "failed", "timestamp": 3.5}],
                "paging": {"next": server.url("/testDomain/events/page3")}
            }));
        })
        .await;
    let third = server
        .mock_async(|when, then| {
            when.method(GET).path("/testDomain/events/page3");
            then.status(200).json_body(json!({
                "items": [],
                "paging": {"next": server.url("/testDomain/events/page4")}
            }));
        })
        .await;

    let mut it = client(&server).list_events(ListEventsOptions {
        limit: Some(2),
        ..Default::default()
    });

    let mut ids = Vec::new();
    let mut stored_key = None;
    while let Some(page) = it.next().await {
        for event in page {
            if event.name() == EVENT_STORED {
                stored_key = event.storage.as_ref().map(|s| s.key.clone());
            }
            ids.push(event.id);
        }
    }

    assert!(it.err().is_none());
    assert_eq!(ids, ["a", "b", "c"]);
    assert_eq!(stored_key.as_deref(), Some("stored-key"));
    first.assert_async().await;
    second.assert_async().await;
    third.assert_async().await;
}

#[tokio::test]
async fn error_stops_iteration_and_is_kept() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/testDomain/events");
            then.status(401).json_body(json!({"message": "Invalid private key"}));
        })
        .await;

    let mut it = client(&server).list_events(ListEventsOptions::default());
    assert!(it.next().await.is_none());
    assert!(it.next().await.is_none());

    match it.err() {
        Some(Error::Api { status, message }) => {
            assert_eq!(*status, 401);
            assert_eq!(message, "Invalid private key");
        }
        other => panic!("expected API error, got {other:?}"),
    }
    mock.assert_hits_async(1).await;
}

#[tokio::test]
async fn each_listing_starts_over() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/testDomain/events");
            then.status(200).json_body(json!({
                "items": [{"id": "a", "event": "delivered", "timestamp": 1.0}],
                "paging": {}
            }));
        })
        .await;
    let client = client(&server);

    for _ in 0..2 {
        let mut it = client.list_events(ListEventsOptions::default());
        let page = it.next().await.unwrap();
        assert_eq!(page.len(), 1);
        assert!(it.next().await.is_none());
        assert!(it.err().is_none());
    }
    mock.assert_hits_async(2).await;
}
