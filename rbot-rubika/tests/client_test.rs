//! HTTP-level tests for [`RubikaClient`] against a mock server.

use std::time::Duration;

use mockito::{Matcher, Server};
use rbot_core::{Bot, Offset, RbotError, TransportError, UpdateKind, UpdateSource};
use rbot_rubika::RubikaClient;
use serde_json::json;

const TOKEN: &str = "TESTTOKEN";

fn client(server: &Server) -> RubikaClient {
    RubikaClient::new(TOKEN, server.url(), Duration::from_secs(5)).unwrap()
}

/// **Test: getUpdates sends the offset and parses the batch.**
///
/// **Setup:** Mock `getUpdates` expecting `offset_id = "41"` and `limit = 10`; it answers two
/// updates and a `next_offset_id`.
/// **Action:** `fetch(Some("41"), 10)`.
/// **Expected:** Two parsed updates, cursor `43`, mock hit once.
#[tokio::test]
async fn test_get_updates_parses_batch() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/TESTTOKEN/getUpdates")
        .match_body(Matcher::PartialJson(json!({"offset_id": "41", "limit": 10})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "status": "OK",
                "data": {
                    "updates": [
                        {"type": "NewMessage", "chat_id": "u0a",
                         "new_message": {"message_id": "42", "sender_id": "u0a", "text": "hi"}},
                        {"type": "NewMessage", "chat_id": "u0a",
                         "new_message": {"message_id": "43", "sender_id": "u0a",
                                         "aux_data": {"button_id": "ok"}}}
                    ],
                    "next_offset_id": "43"
                }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let batch = client(&server)
        .fetch(Some(&Offset::from("41")), 10)
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(batch.updates.len(), 2);
    assert_eq!(batch.updates[0].text(), Some("hi"));
    assert_eq!(batch.updates[1].kind, UpdateKind::Callback);
    assert_eq!(batch.next_offset, Some(Offset::from("43")));
}

#[tokio::test]
async fn test_first_fetch_omits_offset() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/TESTTOKEN/getUpdates")
        .match_body(Matcher::Json(json!({"limit": 50})))
        .with_status(200)
        .with_body(json!({"status": "OK", "data": {"updates": []}}).to_string())
        .create_async()
        .await;

    let batch = client(&server).fetch(None, 50).await.unwrap();

    mock.assert_async().await;
    assert!(batch.is_empty());
}

#[tokio::test]
async fn test_server_error_maps_to_status() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/TESTTOKEN/getUpdates")
        .with_status(502)
        .create_async()
        .await;

    let err = client(&server).fetch(None, 50).await.unwrap_err();
    assert!(matches!(err, TransportError::Status(502)));
}

#[tokio::test]
async fn test_rate_limit_reads_retry_after() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/TESTTOKEN/getUpdates")
        .with_status(429)
        .with_header("retry-after", "3")
        .create_async()
        .await;

    let err = client(&server).fetch(None, 50).await.unwrap_err();
    assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
}

#[tokio::test]
async fn test_api_status_and_malformed_body() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/TESTTOKEN/getUpdates")
        .with_status(200)
        .with_body(json!({"status": "INVALID_ACCESS"}).to_string())
        .create_async()
        .await;
    server
        .mock("POST", "/TESTTOKEN/editMessageText")
        .with_status(200)
        .with_body("<html>not json</html>")
        .create_async()
        .await;

    let client = client(&server);

    let err = client.fetch(None, 50).await.unwrap_err();
    assert!(matches!(err, TransportError::Api(status) if status == "INVALID_ACCESS"));

    let err = client
        .edit_message_text("u0a", "1", "new text")
        .await
        .unwrap_err();
    assert!(matches!(err, RbotError::Transport(TransportError::Malformed(_))));
}

/// **Test: sendMessage posts chat, text and reply id and returns the new message id.**
///
/// **Setup:** Mock `sendMessage` matching the JSON body; it answers `message_id: 900`.
/// **Action:** `send_message("u0a", "pong", Some("42"))`.
/// **Expected:** `Some("900")`.
#[tokio::test]
async fn test_send_message_returns_id() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/TESTTOKEN/sendMessage")
        .match_body(Matcher::PartialJson(json!({
            "chat_id": "u0a",
            "text": "pong",
            "reply_to_message_id": "42"
        })))
        .with_status(200)
        .with_body(json!({"status": "OK", "data": {"message_id": 900}}).to_string())
        .create_async()
        .await;

    let id = client(&server)
        .send_message("u0a", "pong", Some("42"))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(id.as_deref(), Some("900"));
}

#[tokio::test]
async fn test_delete_message() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/TESTTOKEN/deleteMessage")
        .match_body(Matcher::Json(json!({"chat_id": "u0a", "message_id": "7"})))
        .with_status(200)
        .with_body(json!({"status": "OK", "data": {}}).to_string())
        .create_async()
        .await;

    client(&server).delete_message("u0a", "7").await.unwrap();
    mock.assert_async().await;
}
