use std::sync::Arc;

use async_trait::async_trait;
use rbot_core::{Middleware, Result, Update, UpdateKind};
use tracing::{debug, instrument};

use crate::antispam::{AntiSpamManager, SpamVerdict};

/// Gate that suppresses message and callback updates from punished senders.
///
/// Updates without a sender, and lifecycle/inline/edited updates, always pass.
#[derive(Clone)]
pub struct AntiSpamMiddleware {
    manager: Arc<AntiSpamManager>,
}

impl AntiSpamMiddleware {
    pub fn new(manager: Arc<AntiSpamManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<AntiSpamManager> {
        &self.manager
    }
}

#[async_trait]
impl Middleware for AntiSpamMiddleware {
    #[instrument(skip(self, update))]
    async fn before(&self, update: &Update) -> Result<bool> {
        if !matches!(update.kind, UpdateKind::NewMessage | UpdateKind::Callback) {
            return Ok(true);
        }
        let Some(sender) = update.sender_id() else {
            return Ok(true);
        };

        let verdict = self.manager.check(sender);
        if verdict == SpamVerdict::Punished {
            debug!(sender_id = %sender, "Dropping update from punished sender");
        }
        Ok(!verdict.is_blocked())
    }
}
