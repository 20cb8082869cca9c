//! HTTP client for the Rubika bot API.
//!
//! Every method is a JSON `POST {api_url}/{token}/{method}`; a successful call answers
//! `{"status": "OK", "data": {...}}`. Implements [`Bot`] for outward calls and
//! [`UpdateSource`] for `getUpdates`.

use std::time::Duration;

use async_trait::async_trait;
use rbot_core::{Bot, Offset, RbotError, Result, TransportError, UpdateBatch, UpdateSource};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use crate::adapters::parse_batch;
use crate::config::RubikaConfig;

pub const DEFAULT_API_URL: &str = "https://botapi.rubika.ir/v3";

#[derive(Clone)]
pub struct RubikaClient {
    http: Client,
    api_url: String,
    token: String,
    poll_interval: Duration,
}

impl RubikaClient {
    pub fn new(token: impl Into<String>, api_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RbotError::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            poll_interval: Duration::from_millis(500),
        })
    }

    pub fn from_config(config: &RubikaConfig) -> Result<Self> {
        Ok(Self::new(&config.bot_token, &config.api_url, config.request_timeout)?
            .with_poll_interval(config.poll_interval))
    }

    /// Minimum spacing between `getUpdates` calls reported to the poller.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}/{}", self.api_url, self.token, method)
    }

    /// Calls `method` and returns the `data` object of a successful response.
    async fn post(&self, method: &str, body: &Value) -> std::result::Result<Value, TransportError> {
        let response = self
            .http
            .post(self.method_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.without_url().to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(TransportError::RateLimited { retry_after });
        }
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let text = response
            .text()
            .await
            .map_err(|e| TransportError::Network(e.without_url().to_string()))?;
        let json: Value = serde_json::from_str(&text)
            .map_err(|e| TransportError::Malformed(format!("{method}: {e}")))?;

        match json.get("status").and_then(Value::as_str) {
            Some("OK") => Ok(json.get("data").cloned().unwrap_or(Value::Null)),
            Some(other) => Err(TransportError::Api(other.to_string())),
            None => Err(TransportError::Malformed(format!("{method}: missing status"))),
        }
    }

    /// Fetches updates after `offset`.
    #[instrument(skip(self), fields(offset = ?offset.map(Offset::as_str)))]
    pub async fn get_updates(
        &self,
        offset: Option<&Offset>,
        limit: u32,
    ) -> std::result::Result<UpdateBatch, TransportError> {
        let mut body = json!({ "limit": limit });
        if let Some(offset) = offset {
            body["offset_id"] = Value::String(offset.as_str().to_string());
        }
        let data = self.post("getUpdates", &body).await?;
        let batch = parse_batch(&data)?;
        debug!(
            count = batch.updates.len(),
            next_offset = ?batch.next_offset.as_ref().map(Offset::as_str),
            "Fetched updates"
        );
        Ok(batch)
    }
}

fn sent_message_id(data: &Value) -> Option<String> {
    let id = data
        .get("message_id")
        .or_else(|| data.get("message_update").and_then(|m| m.get("message_id")))?;
    match id {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl Bot for RubikaClient {
    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        reply_to_message_id: Option<&str>,
    ) -> Result<Option<String>> {
        let mut body = json!({ "chat_id": chat_id, "text": text });
        if let Some(reply_to) = reply_to_message_id {
            body["reply_to_message_id"] = Value::String(reply_to.to_string());
        }
        let data = self.post("sendMessage", &body).await.map_err(|e| {
            warn!(chat_id = %chat_id, error = %e, "sendMessage failed");
            e
        })?;
        Ok(sent_message_id(&data))
    }

    async fn edit_message_text(&self, chat_id: &str, message_id: &str, text: &str) -> Result<()> {
        let body = json!({ "chat_id": chat_id, "message_id": message_id, "text": text });
        self.post("editMessageText", &body).await?;
        Ok(())
    }

    async fn delete_message(&self, chat_id: &str, message_id: &str) -> Result<()> {
        let body = json!({ "chat_id": chat_id, "message_id": message_id });
        self.post("deleteMessage", &body).await?;
        Ok(())
    }
}

#[async_trait]
impl UpdateSource for RubikaClient {
    async fn fetch(
        &self,
        offset: Option<&Offset>,
        limit: u32,
    ) -> std::result::Result<UpdateBatch, TransportError> {
        self.get_updates(offset, limit).await
    }

    fn min_interval(&self) -> Duration {
        self.poll_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_url_trims_trailing_slash() {
        let client = RubikaClient::new("TOKEN", "http://localhost:1234/v3/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.method_url("getUpdates"), "http://localhost:1234/v3/TOKEN/getUpdates");
    }

    #[test]
    fn test_sent_message_id_shapes() {
        assert_eq!(sent_message_id(&json!({"message_id": "12"})), Some("12".to_string()));
        assert_eq!(
            sent_message_id(&json!({"message_update": {"message_id": 13}})),
            Some("13".to_string())
        );
        assert_eq!(sent_message_id(&json!({})), None);
    }
}
