//! Adapters from Rubika update JSON to [`rbot_core::Update`].
//!
//! The wire shape is `{type, chat_id | object_guid, new_message | updated_message |
//! inline_message, removed_message_id}`. Unknown or partial payloads still produce an update;
//! fields that are missing stay `None` so filters inspecting them evaluate to false.

use rbot_core::{AuxData, FileRef, MessagePayload, Offset, TransportError, Update, UpdateBatch, UpdateKind};
use serde_json::Value;
use tracing::debug;

/// Reads a string-ish field; Rubika sends some ids as numbers.
fn str_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_file(value: &Value) -> FileRef {
    FileRef {
        file_id: str_field(value, "file_id"),
        file_name: str_field(value, "file_name"),
        size: str_field(value, "size"),
    }
}

fn parse_aux(value: &Value) -> AuxData {
    AuxData {
        start_id: str_field(value, "start_id"),
        button_id: str_field(value, "button_id"),
    }
}

/// Builds the message payload shared by new, edited and inline updates.
pub fn parse_message(msg: &Value) -> MessagePayload {
    MessagePayload {
        message_id: str_field(msg, "message_id"),
        sender_id: str_field(msg, "sender_id"),
        text: str_field(msg, "text"),
        time: str_field(msg, "time"),
        reply_to_message_id: str_field(msg, "reply_to_message_id"),
        is_forwarded: msg.get("forwarded_from").is_some_and(|v| !v.is_null()),
        aux: msg.get("aux_data").filter(|v| v.is_object()).map(parse_aux),
        file: msg.get("file").filter(|v| v.is_object()).map(parse_file),
        has_sticker: msg.get("sticker").is_some_and(|v| !v.is_null()),
        has_contact: msg.get("contact_message").is_some_and(|v| !v.is_null()),
        has_poll: msg.get("poll").is_some_and(|v| !v.is_null()),
        has_location: msg
            .get("location")
            .or_else(|| msg.get("live_location"))
            .is_some_and(|v| !v.is_null()),
    }
}

/// Converts one raw update. Never fails; unrecognised types become [`UpdateKind::Unknown`].
pub fn parse_update(raw: Value) -> Update {
    let chat_id = str_field(&raw, "object_guid").or_else(|| str_field(&raw, "chat_id"));
    let event_type = raw.get("type").and_then(Value::as_str).unwrap_or_default();

    let (kind, message) = match event_type {
        "NewMessage" => {
            let message = raw.get("new_message").map(parse_message);
            let has_button = message
                .as_ref()
                .and_then(|m| m.aux.as_ref())
                .is_some_and(|aux| aux.button_id.is_some());
            let kind = if has_button {
                UpdateKind::Callback
            } else {
                UpdateKind::NewMessage
            };
            (kind, message)
        }
        "UpdatedMessage" => (
            UpdateKind::EditedMessage,
            raw.get("updated_message").map(parse_message),
        ),
        "ReceiveQuery" | "ReceiveInlineMessage" => (
            UpdateKind::InlineQuery,
            raw.get("inline_message").map(parse_message),
        ),
        "StartedBot" => (UpdateKind::StartedBot, None),
        "StoppedBot" => (UpdateKind::StoppedBot, None),
        "RemovedMessage" => (UpdateKind::RemovedMessage, None),
        other => {
            debug!(event_type = %other, "Unrecognised update type");
            (UpdateKind::Unknown, None)
        }
    };

    let chat_id = chat_id.or_else(|| {
        raw.get("inline_message")
            .and_then(|m| str_field(m, "chat_id"))
    });
    let id = match kind {
        UpdateKind::RemovedMessage => str_field(&raw, "removed_message_id"),
        _ => message.as_ref().and_then(|m| m.message_id.clone()),
    };

    Update {
        id,
        kind,
        chat_id,
        message,
        raw,
    }
}

/// Parses the `data` object of a `getUpdates` response.
pub fn parse_batch(data: &Value) -> Result<UpdateBatch, TransportError> {
    let updates = match data.get("updates") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().cloned().map(parse_update).collect(),
        Some(other) => {
            return Err(TransportError::Malformed(format!(
                "`updates` is not an array: {other}"
            )))
        }
    };
    let next_offset = str_field(data, "next_offset_id")
        .filter(|s| !s.is_empty())
        .map(Offset::from);
    Ok(UpdateBatch {
        updates,
        next_offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rbot_core::MediaKind;
    use serde_json::json;

    #[test]
    fn test_new_message_with_text() {
        let update = parse_update(json!({
            "type": "NewMessage",
            "chat_id": "u0abc",
            "new_message": {
                "message_id": "101",
                "sender_id": "u0sender",
                "text": "/start now",
                "time": "1700000000",
                "reply_to_message_id": "99"
            }
        }));

        assert_eq!(update.kind, UpdateKind::NewMessage);
        assert_eq!(update.id.as_deref(), Some("101"));
        assert_eq!(update.chat_id.as_deref(), Some("u0abc"));
        assert_eq!(update.text(), Some("/start now"));
        assert_eq!(update.sender_id(), Some("u0sender"));
        assert_eq!(
            update.message.as_ref().unwrap().reply_to_message_id.as_deref(),
            Some("99")
        );
    }

    #[test]
    fn test_button_press_becomes_callback() {
        let update = parse_update(json!({
            "type": "NewMessage",
            "object_guid": "g0group",
            "chat_id": "ignored",
            "new_message": {
                "message_id": 5,
                "sender_id": "u0sender",
                "aux_data": {"button_id": "buy:1"}
            }
        }));

        assert_eq!(update.kind, UpdateKind::Callback);
        assert_eq!(update.button_id(), Some("buy:1"));
        assert_eq!(update.chat_id.as_deref(), Some("g0group"));
        assert_eq!(update.id.as_deref(), Some("5"));
    }

    #[test]
    fn test_media_payloads() {
        let update = parse_update(json!({
            "type": "NewMessage",
            "chat_id": "u0abc",
            "new_message": {
                "message_id": "1",
                "file": {"file_id": "f", "file_name": "clip.mp4", "size": "1024"},
                "forwarded_from": {"type_from": "User"},
                "location": {"latitude": "1", "longitude": "2"}
            }
        }));

        assert!(update.has_media(MediaKind::Video));
        assert!(update.has_media(MediaKind::Location));
        assert!(update.message.as_ref().unwrap().is_forwarded);
    }

    #[test]
    fn test_lifecycle_and_removed() {
        let started = parse_update(json!({"type": "StartedBot", "chat_id": "b0chat"}));
        assert_eq!(started.kind, UpdateKind::StartedBot);
        assert_eq!(started.chat_id.as_deref(), Some("b0chat"));
        assert!(started.message.is_none());

        let removed = parse_update(json!({
            "type": "RemovedMessage", "chat_id": "u0abc", "removed_message_id": "77"
        }));
        assert_eq!(removed.kind, UpdateKind::RemovedMessage);
        assert_eq!(removed.id.as_deref(), Some("77"));
    }

    #[test]
    fn test_inline_query() {
        let update = parse_update(json!({
            "type": "ReceiveQuery",
            "inline_message": {
                "chat_id": "u0abc", "sender_id": "u0sender", "text": "search", "message_id": "3"
            }
        }));
        assert_eq!(update.kind, UpdateKind::InlineQuery);
        assert_eq!(update.chat_id.as_deref(), Some("u0abc"));
        assert_eq!(update.text(), Some("search"));
    }

    #[test]
    fn test_unknown_type_is_kept() {
        let update = parse_update(json!({"type": "SomethingNew", "chat_id": "u0abc"}));
        assert_eq!(update.kind, UpdateKind::Unknown);
        assert_eq!(update.raw["type"], "SomethingNew");
    }

    #[test]
    fn test_parse_batch() {
        let batch = parse_batch(&json!({
            "updates": [
                {"type": "NewMessage", "chat_id": "u0a", "new_message": {"message_id": "1", "text": "a"}},
                {"type": "StoppedBot", "chat_id": "u0b"}
            ],
            "next_offset_id": "cursor-2"
        }))
        .unwrap();
        assert_eq!(batch.updates.len(), 2);
        assert_eq!(batch.next_offset, Some(Offset::from("cursor-2")));

        let empty = parse_batch(&json!({})).unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.next_offset, None);

        assert!(matches!(
            parse_batch(&json!({"updates": "nope"})),
            Err(TransportError::Malformed(_))
        ));
    }
}
