//! Shared test doubles for rbot-dispatch integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rbot_core::{Bot, RbotError, Result};
use rbot_dispatch::{Context, Handler};

/// Bot that records outgoing calls and hands out sequential message ids.
#[derive(Default)]
pub struct RecordingBot {
    pub sent: Mutex<Vec<(String, String)>>,
    pub deleted: Mutex<Vec<(String, String)>>,
    next_id: AtomicUsize,
}

impl RecordingBot {
    pub fn sent_texts(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
    }
}

#[async_trait]
impl Bot for RecordingBot {
    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        _reply_to_message_id: Option<&str>,
    ) -> Result<Option<String>> {
        self.sent
            .lock()
            .unwrap()
            .push((chat_id.to_string(), text.to_string()));
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Some(format!("m{id}")))
    }

    async fn edit_message_text(&self, _chat_id: &str, _message_id: &str, _text: &str) -> Result<()> {
        Ok(())
    }

    async fn delete_message(&self, chat_id: &str, message_id: &str) -> Result<()> {
        self.deleted
            .lock()
            .unwrap()
            .push((chat_id.to_string(), message_id.to_string()));
        Ok(())
    }
}

pub type Log = Arc<Mutex<Vec<String>>>;

pub fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Handler that appends `"<name>:<text or button>"` to `log`.
pub fn record(log: Log, name: &'static str) -> impl Handler {
    move |ctx: Context| {
        let log = log.clone();
        async move {
            let what = ctx.text().or(ctx.button_id()).unwrap_or("").to_string();
            log.lock().unwrap().push(format!("{name}:{what}"));
            Ok::<(), RbotError>(())
        }
    }
}
