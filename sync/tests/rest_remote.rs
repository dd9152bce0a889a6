//! HTTP contract of the REST remote.

use serde_json::json;
use tally_engine::Table;
use tally_sync::{RemoteBackend, RestRemote, SyncError};
use wiremock::matchers::{body_json, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY: &str = "anon-key";

async fn remote(server: &MockServer) -> RestRemote {
    // Trailing slash is tolerated.
    RestRemote::new(format!("{}/", server.uri()), KEY).unwrap()
}

#[tokio::test]
async fn upsert_posts_row_with_merge_on_conflict() {
    let server = MockServer::start().await;
    let row = json!({"id": "p1", "user_id": "alice", "name": "Tile"});

    Mock::given(method("POST"))
        .and(path("/rest/v1/products"))
        .and(query_param("on_conflict", "id,user_id"))
        .and(header("apikey", KEY))
        .and(header("authorization", "Bearer anon-key"))
        .and(header_exists("prefer"))
        .and(body_json(&row))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    remote(&server)
        .await
        .upsert(Table::Products, row)
        .await
        .unwrap();

    let received = server.received_requests().await.unwrap();
    assert_eq!(
        received[0].headers.get("prefer").unwrap().to_str().unwrap(),
        "resolution=merge-duplicates,return=minimal"
    );
}

#[tokio::test]
async fn delete_filters_by_id() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/clients"))
        .and(query_param("id", "eq.c1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    remote(&server)
        .await
        .delete(Table::Clients, "c1")
        .await
        .unwrap();
}

#[tokio::test]
async fn fetch_all_filters_by_owner() {
    let server = MockServer::start().await;
    let rows = json!([
        {"id": "t1", "user_id": "alice", "client_id": "c1"},
        {"id": "t2", "user_id": "alice", "client_id": "c2"},
    ]);

    Mock::given(method("GET"))
        .and(path("/rest/v1/transactions"))
        .and(query_param("user_id", "eq.alice"))
        .and(query_param("select", "*"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&rows))
        .expect(1)
        .mount(&server)
        .await;

    let fetched = remote(&server)
        .await
        .fetch_all(Table::Transactions, "alice")
        .await
        .unwrap();

    assert_eq!(fetched.len(), 2);
    assert_eq!(fetched[1]["id"], json!("t2"));
}

#[tokio::test]
async fn access_token_replaces_api_key_as_bearer() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/products"))
        .and(header("apikey", KEY))
        .and(header("authorization", "Bearer session-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/clients"))
        .and(header("authorization", "Bearer anon-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let remote = remote(&server).await;
    remote.set_access_token(Some("session-token".into()));
    remote.fetch_all(Table::Products, "alice").await.unwrap();

    remote.set_access_token(None);
    remote.fetch_all(Table::Clients, "alice").await.unwrap();
}

#[tokio::test]
async fn non_success_status_is_rejected() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/clients"))
        .respond_with(ResponseTemplate::new(409).set_body_string("duplicate key"))
        .mount(&server)
        .await;

    let err = remote(&server)
        .await
        .upsert(Table::Clients, json!({"id": "c1"}))
        .await
        .unwrap_err();

    match err {
        SyncError::Rejected {
            table,
            status,
            message,
        } => {
            assert_eq!(table, Table::Clients);
            assert_eq!(status, 409);
            assert_eq!(message, "duplicate key");
        }
        other => panic!("expected a rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn non_array_body_is_invalid() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/products"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "ok"})))
        .mount(&server)
        .await;

    let err = remote(&server)
        .await
        .fetch_all(Table::Products, "alice")
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::InvalidResponse(_)));
}

#[tokio::test]
async fn unreachable_remote_is_an_http_error() {
    // Nothing listens on port 1.
    let remote = RestRemote::new("http://127.0.0.1:1", KEY).unwrap();
    let err = remote
        .fetch_all(Table::Products, "alice")
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Http(_)));
}
