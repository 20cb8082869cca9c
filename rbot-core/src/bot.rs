//! Outward API abstraction and the update source consumed by the poller.
//!
//! [`Bot`] is transport-agnostic; `rbot-rubika` implements it (and [`UpdateSource`]) over HTTP.

use std::time::Duration;

use crate::error::{RbotError, Result, TransportError};
use crate::types::{Offset, Update, UpdateBatch};
use async_trait::async_trait;

/// Sending and editing messages. Implementations map to a transport (e.g. the Rubika bot API).
#[async_trait]
pub trait Bot: Send + Sync {
    /// Sends `text` to `chat_id`, optionally as a reply. Returns the new message id when the
    /// platform reports one.
    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        reply_to_message_id: Option<&str>,
    ) -> Result<Option<String>>;

    /// Replaces the text of an already-sent message.
    async fn edit_message_text(&self, chat_id: &str, message_id: &str, text: &str) -> Result<()>;

    async fn delete_message(&self, chat_id: &str, message_id: &str) -> Result<()>;

    /// Replies in the update's chat, quoting the update's message when it has one.
    async fn reply_to(&self, update: &Update, text: &str) -> Result<Option<String>> {
        let chat_id = update
            .chat_id
            .as_deref()
            .ok_or_else(|| RbotError::Bot("Update has no chat to reply to".to_string()))?;
        self.send_message(chat_id, text, update.message_id()).await
    }
}

/// Pull-based update endpoint.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Fetches the batch strictly after `offset` (from the beginning when `None`).
    async fn fetch(
        &self,
        offset: Option<&Offset>,
        limit: u32,
    ) -> std::result::Result<UpdateBatch, TransportError>;

    /// Minimum spacing the endpoint expects between consecutive fetches.
    fn min_interval(&self) -> Duration {
        Duration::ZERO
    }
}
