use bu_reconcile_core::client::{ApiClient, FetchError};
use bu_reconcile_core::contract::{ApiRequest, Method, MockTransport, RawResponse};
use bu_reconcile_core::model::ResourceKind;
use serde_json::{json, Value};

const MONITORS: &str = "https://betteruptime.com/api/v2/monitors";

fn ok(body: Value) -> RawResponse {
    RawResponse::Received {
        status: 200,
        body: body.to_string(),
    }
}

fn expect_page(transport: &mut MockTransport, url: &'static str, body: Value) {
    transport
        .expect_send()
        .withf(move |req: &ApiRequest| req.method == Method::Get && req.url == url)
        .times(1)
        .returning(move |_| ok(body.clone()));
}

#[tokio::test]
async fn test_fetch_all_follows_cursor_until_null_sentinel() {
    let mut transport = MockTransport::new();
    expect_page(
        &mut transport,
        MONITORS,
        json!({
            "data": {
                "id": "1",
                "attributes": {"url": "https://one.test"},
                "pagination": {"next": "https://betteruptime.com/api/v2/monitors?page=2"}
            }
        }),
    );
    expect_page(
        &mut transport,
        "https://betteruptime.com/api/v2/monitors?page=2",
        json!({
            "data": {
                "id": "2",
                "attributes": {"url": "https://two.test"},
                "pagination": {"next": "https://betteruptime.com/api/v2/monitors?page=3"}
            }
        }),
    );
    expect_page(
        &mut transport,
        "https://betteruptime.com/api/v2/monitors?page=3",
        json!({
            "data": {
                "id": "3",
                "attributes": {"url": "https://three.test"},
                "pagination": {"next": "null"}
            }
        }),
    );

    let client = ApiClient::new(transport, "secret");
    let records = client
        .fetch_all(ResourceKind::Monitors, None)
        .await
        .expect("listing should succeed");

    let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "3"], "each page exactly once, in order");
    assert_eq!(records[1].attributes["url"], json!("https://two.test"));
}

#[tokio::test]
async fn test_fetch_all_stops_without_pagination_member() {
    let mut transport = MockTransport::new();
    // The cursor lives under `data`; a top-level one is not followed.
    expect_page(
        &mut transport,
        MONITORS,
        json!({
            "data": [
                {"id": "10", "type": "monitor", "attributes": {"url": "a"}},
                {"id": "11", "type": "monitor", "attributes": {"url": "b"}}
            ],
            "pagination": {"next": "https://betteruptime.com/api/v2/monitors?page=2"}
        }),
    );

    let client = ApiClient::new(transport, "secret");
    let records = client.fetch_all(ResourceKind::Monitors, None).await.unwrap();
    assert_eq!(records.len(), 2);
}

#[tokio::test]
async fn test_fetch_all_stops_when_next_is_json_null() {
    let mut transport = MockTransport::new();
    expect_page(
        &mut transport,
        MONITORS,
        json!({
            "data": {"id": "1", "attributes": {}, "pagination": {"next": null}}
        }),
    );

    let client = ApiClient::new(transport, "secret");
    let records = client.fetch_all(ResourceKind::Monitors, None).await.unwrap();
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn test_fetch_all_sends_bearer_token_and_json_content_type() {
    let mut transport = MockTransport::new();
    transport
        .expect_send()
        .withf(|req: &ApiRequest| {
            req.header("authorization") == Some("Bearer secret")
                && req.header("Content-Type") == Some("application/json")
                && req.body.is_none()
        })
        .times(1)
        .returning(|_| ok(json!({"data": []})));

    let client = ApiClient::new(transport, "secret");
    let records = client.fetch_all(ResourceKind::StatusPages, None).await.unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn test_fetch_one_by_id_uses_record_url() {
    let mut transport = MockTransport::new();
    expect_page(
        &mut transport,
        "https://betteruptime.com/api/v2/status-pages/42",
        json!({"data": {"id": 42, "type": "status_page", "attributes": {"subdomain": "acme"}}}),
    );

    let client = ApiClient::new(transport, "secret");
    let records = client
        .fetch_all(ResourceKind::StatusPages, Some(42))
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, "42");
}

#[tokio::test]
async fn test_fetch_all_returns_remote_errors() {
    let mut transport = MockTransport::new();
    transport.expect_send().times(1).returning(|_| RawResponse::Received {
        status: 401,
        body: json!({"errors": "Invalid Team API Token"}).to_string(),
    });

    let client = ApiClient::new(transport, "wrong");
    let err = client
        .fetch_all(ResourceKind::Monitors, None)
        .await
        .unwrap_err();
    assert!(
        matches!(&err, FetchError::Remote(errors) if errors == &json!("Invalid Team API Token")),
        "got {err:?}"
    );
}

#[tokio::test]
async fn test_fetch_all_surfaces_transport_failure() {
    let mut transport = MockTransport::new();
    transport.expect_send().times(1).returning(|_| RawResponse::Failed {
        reason: "connection refused".into(),
    });

    let client = ApiClient::new(transport, "secret");
    let err = client
        .fetch_all(ResourceKind::Monitors, None)
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Transport { ref reason, .. } if reason == "connection refused"));
}

#[tokio::test]
async fn test_fetch_all_rejects_non_json_body() {
    let mut transport = MockTransport::new();
    transport.expect_send().times(1).returning(|_| RawResponse::Received {
        status: 502,
        body: "<html>Bad Gateway</html>".into(),
    });

    let client = ApiClient::new(transport, "secret");
    let err = client
        .fetch_all(ResourceKind::Monitors, None)
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Decode { status: 502, .. }));
}

#[tokio::test]
async fn test_base_url_override_gets_trailing_slash() {
    let mut transport = MockTransport::new();
    transport
        .expect_send()
        .withf(|req: &ApiRequest| req.url == "http://localhost:8080/api/v2/monitors")
        .times(1)
        .returning(|_| ok(json!({"data": []})));

    let client = ApiClient::new(transport, "secret").with_base_url("http://localhost:8080/api/v2");
    assert_eq!(client.base_url(), "http://localhost:8080/api/v2/");
    client.fetch_all(ResourceKind::Monitors, None).await.unwrap();
}
