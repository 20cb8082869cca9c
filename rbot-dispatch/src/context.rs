//! Per-update handler context.

use std::sync::Arc;
use std::time::Duration;

use rbot_core::{Bot, ChatType, Result, Update};
use tracing::warn;

use crate::bridge::{BlockingBot, ExecutionBridge};
use crate::filter::command_name;
use crate::job::Job;

/// What a handler receives: the update, the outward API and the execution bridge.
#[derive(Clone)]
pub struct Context {
    update: Arc<Update>,
    bot: Arc<dyn Bot>,
    bridge: ExecutionBridge,
}

impl Context {
    pub fn new(update: Arc<Update>, bot: Arc<dyn Bot>, bridge: ExecutionBridge) -> Self {
        Self { update, bot, bridge }
    }

    pub fn update(&self) -> &Update {
        &self.update
    }

    pub fn bot(&self) -> &Arc<dyn Bot> {
        &self.bot
    }

    pub fn bridge(&self) -> &ExecutionBridge {
        &self.bridge
    }

    pub fn text(&self) -> Option<&str> {
        self.update.text()
    }

    pub fn chat_id(&self) -> Option<&str> {
        self.update.chat_id.as_deref()
    }

    pub fn sender_id(&self) -> Option<&str> {
        self.update.sender_id()
    }

    pub fn button_id(&self) -> Option<&str> {
        self.update.button_id()
    }

    pub fn chat_type(&self) -> ChatType {
        self.update.chat_type()
    }

    /// Command word without the slash, when the text is a command.
    pub fn command(&self) -> Option<&str> {
        command_name(&self.update)
    }

    /// Whitespace-separated words after the command; empty for non-command text.
    pub fn args(&self) -> Vec<String> {
        if self.command().is_none() {
            return Vec::new();
        }
        self.text()
            .map(|t| t.split_whitespace().skip(1).map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub async fn reply(&self, text: &str) -> Result<Option<String>> {
        self.bot.reply_to(&self.update, text).await
    }

    /// Replies, then deletes the reply after `delay`. Returns the deletion job when the
    /// platform reported the new message id.
    pub async fn reply_auto_delete(&self, text: &str, delay: Duration) -> Result<Option<Job>> {
        let Some(message_id) = self.reply(text).await? else {
            return Ok(None);
        };
        let Some(chat_id) = self.chat_id().map(str::to_string) else {
            return Ok(None);
        };
        let bot = Arc::clone(&self.bot);
        Ok(Some(Job::schedule(delay, async move {
            if let Err(e) = bot.delete_message(&chat_id, &message_id).await {
                warn!(chat_id = %chat_id, message_id = %message_id, error = %e, "Auto-delete failed");
            }
        })))
    }

    /// Synchronous access to the outward API for blocking handlers.
    pub fn blocking_bot(&self) -> BlockingBot {
        BlockingBot::new(Arc::clone(&self.bot), self.bridge.clone())
    }
}
