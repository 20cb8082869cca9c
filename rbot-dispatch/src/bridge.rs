//! Runs handlers of either calling convention without stalling the async scheduler.
//!
//! Cooperative handlers are awaited in place. Blocking handlers (and any blocking call made
//! through [`ExecutionBridge::run_blocking`]) go to tokio's blocking pool. Code already on a
//! blocking thread reaches async APIs through [`ExecutionBridge::block_on`] or [`BlockingBot`].
//! Panics on either side are caught and reported as [`HandlerError::Panicked`].

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use rbot_core::{Bot, HandlerError, RbotError, Result, Update};
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::context::Context;
use crate::handler::Callable;

#[derive(Clone, Default)]
pub struct ExecutionBridge {
    handle: Option<Handle>,
    permits: Option<Arc<Semaphore>>,
}

impl ExecutionBridge {
    /// Bridge bound to the runtime it is created in, if any.
    pub fn new() -> Self {
        Self {
            handle: Handle::try_current().ok(),
            permits: None,
        }
    }

    pub fn with_handle(mut self, handle: Handle) -> Self {
        self.handle = Some(handle);
        self
    }

    /// Caps how many blocking calls run at the same time; extra calls wait for a slot.
    pub fn with_max_blocking(mut self, max: usize) -> Self {
        self.permits = Some(Arc::new(Semaphore::new(max.max(1))));
        self
    }

    /// Runs `ctx` through `callable`, turning errors and panics into a [`HandlerError`].
    pub async fn invoke(&self, callable: &Callable, ctx: Context) -> std::result::Result<(), HandlerError> {
        match callable {
            Callable::Cooperative(handler) => {
                match AssertUnwindSafe(handler.handle(ctx)).catch_unwind().await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(HandlerError::Failed(e.to_string())),
                    Err(payload) => Err(HandlerError::Panicked(panic_message(payload))),
                }
            }
            Callable::Blocking(handler) => {
                let handler = Arc::clone(handler);
                self.run_blocking(move || handler.handle(ctx))
                    .await?
                    .map_err(|e| HandlerError::Failed(e.to_string()))
            }
        }
    }

    /// Offloads a blocking closure to the blocking pool and awaits its result.
    pub async fn run_blocking<F, T>(&self, f: F) -> std::result::Result<T, HandlerError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = match &self.permits {
            Some(permits) => Some(
                Arc::clone(permits)
                    .acquire_owned()
                    .await
                    .map_err(|e| HandlerError::Join(e.to_string()))?,
            ),
            None => None,
        };

        let joined = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            f()
        })
        .await;

        match joined {
            Ok(value) => Ok(value),
            Err(e) if e.is_panic() => Err(HandlerError::Panicked(panic_message(e.into_panic()))),
            Err(e) => Err(HandlerError::Join(e.to_string())),
        }
    }

    /// Drives `fut` to completion from a blocking thread.
    ///
    /// # Panics
    ///
    /// Panics when called from inside an async task; use it only from blocking handlers or
    /// closures passed to [`run_blocking`](Self::run_blocking).
    pub fn block_on<F: Future>(&self, fut: F) -> Result<F::Output> {
        let handle = match &self.handle {
            Some(handle) => handle.clone(),
            None => Handle::try_current()
                .map_err(|e| RbotError::Runtime(format!("no async runtime available: {e}")))?,
        };
        Ok(handle.block_on(fut))
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Synchronous facade over an async [`Bot`], for use inside blocking handlers.
#[derive(Clone)]
pub struct BlockingBot {
    bot: Arc<dyn Bot>,
    bridge: ExecutionBridge,
}

impl BlockingBot {
    pub fn new(bot: Arc<dyn Bot>, bridge: ExecutionBridge) -> Self {
        Self { bot, bridge }
    }

    pub fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        reply_to_message_id: Option<&str>,
    ) -> Result<Option<String>> {
        debug!(chat_id = %chat_id, "Blocking send_message");
        self.bridge
            .block_on(self.bot.send_message(chat_id, text, reply_to_message_id))?
    }

    pub fn reply_to(&self, update: &Update, text: &str) -> Result<Option<String>> {
        self.bridge.block_on(self.bot.reply_to(update, text))?
    }

    pub fn edit_message_text(&self, chat_id: &str, message_id: &str, text: &str) -> Result<()> {
        self.bridge
            .block_on(self.bot.edit_message_text(chat_id, message_id, text))?
    }

    pub fn delete_message(&self, chat_id: &str, message_id: &str) -> Result<()> {
        self.bridge.block_on(self.bot.delete_message(chat_id, message_id))?
    }
}
