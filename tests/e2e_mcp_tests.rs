//! End-to-end tests for the stateless MCP endpoint

mod common;

use common::{TestClient, TestServer, KNOWN_COMPONENT, TOOL_COUNT, VALID_API_KEY};
use reqwest::StatusCode;
use serde_json::{json, Value};

fn client(server: &TestServer) -> TestClient {
    TestClient::with_bearer(server.base_url.clone(), VALID_API_KEY)
}

fn tool_text(body: &Value) -> Value {
    let text = body["result"]["content"][0]["text"].as_str().unwrap();
    serde_json::from_str(text).unwrap()
}

#[tokio::test]
async fn test_initialize_negotiates_protocol() {
    let server = TestServer::spawn().await;
    let response = client(&server)
        .rpc(
            "initialize",
            Some(json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": { "name": "e2e", "version": "0.0.1" }
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("mcp-session-id").is_none());

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(body["result"]["serverInfo"]["name"], "design-system-mcp");
    assert!(body["result"]["capabilities"]["tools"].is_object());
}

#[tokio::test]
async fn test_stateless_requests_need_no_handshake() {
    let server = TestServer::spawn().await;
    let client = client(&server);

    let response = client.rpc("tools/list", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["result"]["tools"].as_array().unwrap().len(), TOOL_COUNT);

    // A second request is independent of the first
    let response = client
        .call_tool("get_component", json!({ "name": KNOWN_COMPONENT }))
        .await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(tool_text(&body)["name"], KNOWN_COMPONENT);
}

#[tokio::test]
async fn test_client_session_header_is_ignored() {
    let server = TestServer::spawn().await;
    let response = client(&server)
        .client
        .post(format!("{}/mcp", server.base_url))
        .bearer_auth(VALID_API_KEY)
        .header("Mcp-Session-Id", "made-up-session")
        .body(r#"{"jsonrpc":"2.0","id":7,"method":"ping"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("mcp-session-id").is_none());
}

#[tokio::test]
async fn test_tools_answer_from_catalog() {
    let server = TestServer::spawn().await;
    let client = client(&server);

    let body: Value = client
        .call_tool("search_components", json!({ "query": "modal", "limit": 3 }))
        .await
        .json()
        .await
        .unwrap();
    let results = tool_text(&body);
    assert_eq!(results["results"][0]["name"], "Modal");
    assert!(results["results"].as_array().unwrap().len() <= 3);

    let body: Value = client
        .call_tool("list_components", json!({ "category": "forms" }))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(tool_text(&body)["total"], 3);

    let body: Value = client
        .call_tool("get_design_tokens", json!({ "category": "spacing" }))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(tool_text(&body)["total"], 5);

    let body: Value = client
        .call_tool("get_component", json!({ "name": "Carousel" }))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["result"]["isError"], true);
}

#[tokio::test]
async fn test_protocol_errors() {
    let server = TestServer::spawn().await;
    let client = client(&server);

    let body: Value = client.rpc("sampling/createMessage", None).await.json().await.unwrap();
    assert_eq!(body["error"]["code"], -32601);

    let body: Value = client
        .call_tool("no_such_tool", json!({}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["error"]["code"], -32602);

    let body: Value = client
        .read_resource("design-system://components/Carousel")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["error"]["code"], -32002);
    assert_eq!(body["error"]["data"]["uri"], "design-system://components/Carousel");
}

#[tokio::test]
async fn test_resources() {
    let server = TestServer::spawn().await;
    let client = client(&server);

    let body: Value = client.rpc("resources/list", None).await.json().await.unwrap();
    let uris: Vec<&str> = body["result"]["resources"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["uri"].as_str().unwrap())
        .collect();
    assert!(uris.contains(&"design-system://components"));
    assert!(uris.contains(&"design-system://tokens"));

    let body: Value = client
        .read_resource("design-system://components/Tooltip")
        .await
        .json()
        .await
        .unwrap();
    let content = &body["result"]["contents"][0];
    assert_eq!(content["mimeType"], "application/json");
    let component: Value = serde_json::from_str(content["text"].as_str().unwrap()).unwrap();
    assert_eq!(component["name"], "Tooltip");
}

#[tokio::test]
async fn test_batch_and_notifications() {
    let server = TestServer::spawn().await;
    let client = client(&server);

    let response = client
        .post_mcp(&json!([
            { "jsonrpc": "2.0", "id": 1, "method": "ping" },
            { "jsonrpc": "2.0", "method": "notifications/initialized" },
            { "jsonrpc": "2.0", "id": "two", "method": "tools/call",
              "params": { "name": "list_categories" } }
        ]))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    let responses = body.as_array().unwrap();
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["id"], 1);
    assert_eq!(responses[1]["id"], "two");

    let response = client
        .post_mcp(&json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }))
        .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert!(response.text().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_json_body() {
    let server = TestServer::spawn().await;
    let response = client(&server).post_mcp_raw("{\"jsonrpc\": ").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["type"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_get_and_delete_are_not_allowed() {
    let server = TestServer::spawn().await;
    let client = client(&server);

    for response in [client.get_mcp().await, client.delete_mcp().await] {
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()["allow"], "POST");
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["jsonrpc"], "2.0");
        assert_eq!(body["error"]["code"], -32000);
        assert!(body["id"].is_null());
    }
}
