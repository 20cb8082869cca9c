//! Core types: offsets, updates and their payloads, dispatch outcomes, and the Middleware trait.

use std::cmp::Ordering;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Opaque polling cursor handed out by the platform (`next_offset_id`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Offset(String);

impl Offset {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Offset {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Offset {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Update discriminant. `Callback` is a new message that carries a button id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateKind {
    NewMessage,
    EditedMessage,
    Callback,
    InlineQuery,
    StartedBot,
    StoppedBot,
    RemovedMessage,
    Unknown,
}

/// Chat privacy class, derived from the chat id prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChatType {
    User,
    Group,
    Channel,
    Bot,
    Unknown,
}

impl ChatType {
    /// `u…` user, `g…` group, `c…` channel; a `b…` chat counts as a private user chat when
    /// the sender is a user.
    pub fn classify(chat_id: &str, sender_id: Option<&str>) -> Self {
        match chat_id.chars().next() {
            Some('u') => ChatType::User,
            Some('g') => ChatType::Group,
            Some('c') => ChatType::Channel,
            Some('b') => {
                if sender_id.is_some_and(|s| s.starts_with('u')) {
                    ChatType::User
                } else {
                    ChatType::Bot
                }
            }
            _ => ChatType::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    Photo,
    Video,
    Voice,
    Audio,
    Document,
    Sticker,
    Contact,
    Poll,
    Location,
}

const PHOTO_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "webm"];
const VOICE_EXTENSIONS: &[&str] = &["ogg", "oga", "opus"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "flac"];

/// File attachment reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub file_id: Option<String>,
    pub file_name: Option<String>,
    pub size: Option<String>,
}

impl FileRef {
    /// Classifies by file-name extension; anything unrecognised is a document.
    pub fn media_kind(&self) -> MediaKind {
        let ext = self
            .file_name
            .as_deref()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase());
        match ext.as_deref() {
            Some(e) if PHOTO_EXTENSIONS.contains(&e) => MediaKind::Photo,
            Some(e) if VIDEO_EXTENSIONS.contains(&e) => MediaKind::Video,
            Some(e) if VOICE_EXTENSIONS.contains(&e) => MediaKind::Voice,
            Some(e) if AUDIO_EXTENSIONS.contains(&e) => MediaKind::Audio,
            _ => MediaKind::Document,
        }
    }
}

/// Button-click metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuxData {
    pub start_id: Option<String>,
    pub button_id: Option<String>,
}

/// Message payload shared by new, edited, callback and inline updates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub message_id: Option<String>,
    pub sender_id: Option<String>,
    pub text: Option<String>,
    pub time: Option<String>,
    pub reply_to_message_id: Option<String>,
    pub is_forwarded: bool,
    pub aux: Option<AuxData>,
    pub file: Option<FileRef>,
    pub has_sticker: bool,
    pub has_contact: bool,
    pub has_poll: bool,
    pub has_location: bool,
}

impl MessagePayload {
    pub fn has_media(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Sticker => self.has_sticker,
            MediaKind::Contact => self.has_contact,
            MediaKind::Poll => self.has_poll,
            MediaKind::Location => self.has_location,
            file_kind => self
                .file
                .as_ref()
                .is_some_and(|f| !self.has_sticker && f.media_kind() == file_kind),
        }
    }
}

/// One event from the platform. Immutable once built; shared as `Arc<Update>` during dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    /// Platform identifier used for ordering (message id, or removed message id).
    pub id: Option<String>,
    pub kind: UpdateKind,
    pub chat_id: Option<String>,
    pub message: Option<MessagePayload>,
    /// Original JSON, kept for passthrough.
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl Update {
    /// Builds a plain text message update (handy for tests and local tooling).
    pub fn text_message(id: &str, chat_id: &str, sender_id: &str, text: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            kind: UpdateKind::NewMessage,
            chat_id: Some(chat_id.to_string()),
            message: Some(MessagePayload {
                message_id: Some(id.to_string()),
                sender_id: Some(sender_id.to_string()),
                text: Some(text.to_string()),
                ..MessagePayload::default()
            }),
            raw: serde_json::Value::Null,
        }
    }

    /// Builds a button-press update.
    pub fn callback(id: &str, chat_id: &str, sender_id: &str, button_id: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            kind: UpdateKind::Callback,
            chat_id: Some(chat_id.to_string()),
            message: Some(MessagePayload {
                message_id: Some(id.to_string()),
                sender_id: Some(sender_id.to_string()),
                aux: Some(AuxData {
                    start_id: None,
                    button_id: Some(button_id.to_string()),
                }),
                ..MessagePayload::default()
            }),
            raw: serde_json::Value::Null,
        }
    }

    /// Builds a payload-less update such as bot started / stopped.
    pub fn lifecycle(kind: UpdateKind, chat_id: &str) -> Self {
        Self {
            id: None,
            kind,
            chat_id: Some(chat_id.to_string()),
            message: None,
            raw: serde_json::Value::Null,
        }
    }

    pub fn text(&self) -> Option<&str> {
        self.message.as_ref()?.text.as_deref()
    }

    pub fn sender_id(&self) -> Option<&str> {
        self.message.as_ref()?.sender_id.as_deref()
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message.as_ref()?.message_id.as_deref()
    }

    pub fn button_id(&self) -> Option<&str> {
        self.message.as_ref()?.aux.as_ref()?.button_id.as_deref()
    }

    pub fn chat_type(&self) -> ChatType {
        match self.chat_id.as_deref() {
            Some(chat_id) => ChatType::classify(chat_id, self.sender_id()),
            None => ChatType::Unknown,
        }
    }

    pub fn has_media(&self, kind: MediaKind) -> bool {
        self.message.as_ref().is_some_and(|m| m.has_media(kind))
    }

    /// Key that defines the per-conversation ordering domain: chat, else sender.
    pub fn ordering_key(&self) -> &str {
        self.chat_id
            .as_deref()
            .or_else(|| self.sender_id())
            .unwrap_or("")
    }
}

/// Compares identifiers numerically when both are integers, lexically otherwise.
pub fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u128>(), b.parse::<u128>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
    }
}

/// One `getUpdates` response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateBatch {
    pub updates: Vec<Update>,
    /// Cursor reported by the platform, if any.
    pub next_offset: Option<Offset>,
}

impl UpdateBatch {
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Offset to commit once the batch is dispatched: the platform cursor, or the highest
    /// update id when the platform omits it.
    pub fn candidate_offset(&self) -> Option<Offset> {
        if let Some(next) = &self.next_offset {
            return Some(next.clone());
        }
        self.updates
            .iter()
            .filter_map(|u| u.id.as_deref())
            .max_by(|a, b| compare_ids(a, b))
            .map(Offset::from)
    }
}

/// Result of dispatching one update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A handler ran to completion.
    Handled,
    /// A gate (anti-spam) stopped the update before any handler saw it.
    Suppressed,
    /// No registration matched.
    NoMatch,
    /// The selected handler returned an error or panicked.
    HandlerFailed(String),
}

/// Gate that runs before a selected handler (`before`) and after it (`after`).
/// Returning `false` from `before` suppresses the update.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn before(&self, _update: &Update) -> crate::error::Result<bool> {
        Ok(true)
    }

    async fn after(&self, _update: &Update, _outcome: &DispatchOutcome) -> crate::error::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_type_from_prefix() {
        assert_eq!(ChatType::classify("u0abc", None), ChatType::User);
        assert_eq!(ChatType::classify("g0abc", None), ChatType::Group);
        assert_eq!(ChatType::classify("c0abc", None), ChatType::Channel);
        assert_eq!(ChatType::classify("b0abc", Some("u0xyz")), ChatType::User);
        assert_eq!(ChatType::classify("b0abc", None), ChatType::Bot);
        assert_eq!(ChatType::classify("", None), ChatType::Unknown);
    }

    #[test]
    fn test_file_media_kind_by_extension() {
        let file = |name: &str| FileRef {
            file_name: Some(name.to_string()),
            ..FileRef::default()
        };
        assert_eq!(file("cat.JPG").media_kind(), MediaKind::Photo);
        assert_eq!(file("clip.mkv").media_kind(), MediaKind::Video);
        assert_eq!(file("note.opus").media_kind(), MediaKind::Voice);
        assert_eq!(file("song.flac").media_kind(), MediaKind::Audio);
        assert_eq!(file("report.pdf").media_kind(), MediaKind::Document);
        assert_eq!(FileRef::default().media_kind(), MediaKind::Document);
    }

    #[test]
    fn test_candidate_offset_prefers_platform_cursor() {
        let batch = UpdateBatch {
            updates: vec![Update::text_message("5", "u1", "u1", "hi")],
            next_offset: Some(Offset::new("cursor-9")),
        };
        assert_eq!(batch.candidate_offset(), Some(Offset::new("cursor-9")));
    }

    #[test]
    fn test_candidate_offset_falls_back_to_highest_id() {
        let batch = UpdateBatch {
            updates: vec![
                Update::text_message("9", "u1", "u1", "a"),
                Update::text_message("10", "u2", "u2", "b"),
                Update::lifecycle(UpdateKind::StartedBot, "u3"),
            ],
            next_offset: None,
        };
        assert_eq!(batch.candidate_offset(), Some(Offset::new("10")));
        assert_eq!(UpdateBatch::default().candidate_offset(), None);
    }

    #[test]
    fn test_ordering_key_uses_chat_then_sender() {
        let update = Update::text_message("1", "g0group", "u0user", "hi");
        assert_eq!(update.ordering_key(), "g0group");

        let mut no_chat = update.clone();
        no_chat.chat_id = None;
        assert_eq!(no_chat.ordering_key(), "u0user");
    }
}
