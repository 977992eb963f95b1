//! Query and mutation tests against a mocked HTTP endpoint.

use std::time::Duration;

use horizon_lattice_graphql::{AppSyncPlugin, ClientError, GraphQLClient, GraphQLRequest};
use serde::Deserialize;
use serde_json::{Value, json};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Deserialize, PartialEq)]
struct User {
    name: String,
}

#[derive(Debug, Deserialize, PartialEq)]
struct UserData {
    user: User,
}

fn client_for(server: &MockServer) -> GraphQLClient {
    GraphQLClient::builder(format!("{}/graphql", server.uri()))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_query_decodes_data() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({
            "query": "query($id: ID!) { user(id: $id) { name } }",
            "variables": {"id": "1"}
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"data": {"user": {"name": "Ada"}}})),
        )
        .mount(&server)
        .await;

    let data: UserData = client_for(&server)
        .query("query($id: ID!) { user(id: $id) { name } }", json!({"id": "1"}))
        .await
        .unwrap();

    assert_eq!(data.user.name, "Ada");
}

#[tokio::test]
async fn test_mutation_uses_mutation_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_json(json!({
            "mutation": "mutation { rename(name: \"Grace\") { name } }",
            "variables": {}
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"data": {"user": {"name": "Grace"}}})),
        )
        .mount(&server)
        .await;

    let data: UserData = client_for(&server)
        .mutation("mutation { rename(name: \"Grace\") { name } }", json!({}))
        .await
        .unwrap();

    assert_eq!(data.user.name, "Grace");
}

#[tokio::test]
async fn test_errors_win_over_data() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"user": {"name": "Ada"}},
            "errors": [{"message": "field deprecated", "path": ["user", "name"]}]
        })))
        .mount(&server)
        .await;

    let result: Result<UserData, _> = client_for(&server).query("{ user { name } }", json!({})).await;

    match result {
        Err(ClientError::Response(errors)) => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].message, "field deprecated");
        }
        other => panic!("expected response error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_execute_returns_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": null,
            "errors": [{"message": "boom", "locations": [{"line": 1, "column": 3}]}]
        })))
        .mount(&server)
        .await;

    let response = client_for(&server)
        .execute(&GraphQLRequest::query("{ a }"))
        .await
        .unwrap();

    assert!(response.has_errors());
    assert_eq!(response.errors[0].locations[0].column, 3);
}

#[tokio::test]
async fn test_http_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .mount(&server)
        .await;

    let result: Result<Value, _> = client_for(&server).query("{ a }", json!({})).await;

    match result {
        Err(ClientError::HttpStatus { status, message }) => {
            assert_eq!(status, 503);
            assert_eq!(message.as_deref(), Some("Service Unavailable"));
        }
        other => panic!("expected HTTP status error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_error_status_with_graphql_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({"errors": [{"message": "Syntax Error"}]})),
        )
        .mount(&server)
        .await;

    let result: Result<Value, _> = client_for(&server).query("{ a", json!({})).await;

    match result {
        Err(ClientError::Response(errors)) => assert_eq!(errors[0].message, "Syntax Error"),
        other => panic!("expected response error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_invalid_body_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .mount(&server)
        .await;

    let result: Result<Value, _> = client_for(&server).query("{ a }", json!({})).await;
    assert!(matches!(result, Err(ClientError::Decode(_))));
}

#[tokio::test]
async fn test_unserializable_variables_fail_early() {
    let server = MockServer::start().await;

    // map keys must be strings
    let mut variables = std::collections::HashMap::new();
    variables.insert(vec![1u8], 1);

    let result: Result<Value, _> = client_for(&server).query("{ a }", variables).await;
    assert!(matches!(result, Err(ClientError::Request(_))));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_request_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"data": {}}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let client = GraphQLClient::builder(format!("{}/graphql", server.uri()))
        .request_timeout(Duration::from_millis(100))
        .build()
        .unwrap();
    let result: Result<Value, _> = client.query("{ a }", json!({})).await;

    assert!(matches!(result, Err(ClientError::Timeout(_))));
}

#[tokio::test]
async fn test_default_headers_and_plugin_decoration() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("x-api-key", "da2-key"))
        .and(header("x-trace", "abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"ok": true}})))
        .mount(&server)
        .await;

    let client = GraphQLClient::builder(format!("{}/graphql", server.uri()))
        .header("x-trace", "abc")
        .plugin(AppSyncPlugin::new("da2-key"))
        .build()
        .unwrap();
    let data: Value = client.query("{ ok }", json!({})).await.unwrap();

    assert_eq!(data, json!({"ok": true}));
}
