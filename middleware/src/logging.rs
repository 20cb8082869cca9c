//! Middleware that logs every routed update and its outcome.

use async_trait::async_trait;
use rbot_core::{DispatchOutcome, Middleware, Result, Update};
use tracing::{debug, info, instrument};

/// Logs each update in before() and the dispatch outcome in after(); always continues.
pub struct LoggingMiddleware;

#[async_trait]
impl Middleware for LoggingMiddleware {
    #[instrument(skip(self, update))]
    async fn before(&self, update: &Update) -> Result<bool> {
        info!(
            kind = ?update.kind,
            chat_id = %update.chat_id.as_deref().unwrap_or("unknown"),
            sender_id = %update.sender_id().unwrap_or("unknown"),
            text = %update.text().unwrap_or(""),
            "Received update"
        );
        Ok(true)
    }

    #[instrument(skip(self, update, outcome))]
    async fn after(&self, update: &Update, outcome: &DispatchOutcome) -> Result<()> {
        debug!(
            update_id = ?update.id,
            outcome = ?outcome,
            "Processed update"
        );
        Ok(())
    }
}
