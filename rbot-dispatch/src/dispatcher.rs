//! Handler registry and per-update dispatch.
//!
//! Registrations are kept per dispatch kind in registration order; the first registration whose
//! filter matches wins. Middleware `before` runs once a handler is selected and can suppress the
//! update; `after` runs in reverse order with the final outcome. Handler errors and panics end
//! in [`DispatchOutcome::HandlerFailed`] and never escape `dispatch`.

use std::sync::Arc;

use rbot_core::{Bot, DispatchOutcome, Middleware, Update, UpdateKind};
use tracing::{debug, error, info, instrument, warn};

use crate::bridge::ExecutionBridge;
use crate::context::Context;
use crate::filter::Filter;
use crate::handler::{BlockingHandler, Callable, Handler};

/// Registry partition an update is looked up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchKind {
    Message,
    EditedMessage,
    Callback,
    InlineQuery,
    StartedBot,
    StoppedBot,
}

impl DispatchKind {
    /// `None` for updates that are only logged (removed messages, unknown types).
    pub fn of(kind: UpdateKind) -> Option<Self> {
        match kind {
            UpdateKind::NewMessage => Some(DispatchKind::Message),
            UpdateKind::EditedMessage => Some(DispatchKind::EditedMessage),
            UpdateKind::Callback => Some(DispatchKind::Callback),
            UpdateKind::InlineQuery => Some(DispatchKind::InlineQuery),
            UpdateKind::StartedBot => Some(DispatchKind::StartedBot),
            UpdateKind::StoppedBot => Some(DispatchKind::StoppedBot),
            UpdateKind::RemovedMessage | UpdateKind::Unknown => None,
        }
    }
}

/// Which button presses a callback registration accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonMatcher {
    Exact(String),
    Prefix(String),
}

impl ButtonMatcher {
    pub fn matches(&self, button_id: &str) -> bool {
        match self {
            ButtonMatcher::Exact(id) => button_id == id,
            ButtonMatcher::Prefix(prefix) => button_id.starts_with(prefix.as_str()),
        }
    }
}

#[derive(Clone)]
struct Registration {
    filter: Option<Filter>,
    button: Option<ButtonMatcher>,
    callable: Callable,
}

impl Registration {
    fn accepts(&self, update: &Update) -> bool {
        if let Some(button) = &self.button {
            match update.button_id() {
                Some(id) if button.matches(id) => {}
                _ => return false,
            }
        }
        self.filter.as_ref().map_or(true, |f| f.matches(update))
    }
}

#[derive(Default, Clone)]
struct Registry {
    message: Vec<Registration>,
    edited: Vec<Registration>,
    callback: Vec<Registration>,
    inline: Vec<Registration>,
    started: Vec<Registration>,
    stopped: Vec<Registration>,
}

impl Registry {
    fn partition(&self, kind: DispatchKind) -> &[Registration] {
        match kind {
            DispatchKind::Message => &self.message,
            DispatchKind::EditedMessage => &self.edited,
            DispatchKind::Callback => &self.callback,
            DispatchKind::InlineQuery => &self.inline,
            DispatchKind::StartedBot => &self.started,
            DispatchKind::StoppedBot => &self.stopped,
        }
    }

    fn partition_mut(&mut self, kind: DispatchKind) -> &mut Vec<Registration> {
        match kind {
            DispatchKind::Message => &mut self.message,
            DispatchKind::EditedMessage => &mut self.edited,
            DispatchKind::Callback => &mut self.callback,
            DispatchKind::InlineQuery => &mut self.inline,
            DispatchKind::StartedBot => &mut self.started,
            DispatchKind::StoppedBot => &mut self.stopped,
        }
    }

    fn len(&self) -> usize {
        self.message.len()
            + self.edited.len()
            + self.callback.len()
            + self.inline.len()
            + self.started.len()
            + self.stopped.len()
    }
}

/// Collects registrations and middleware, then freezes them into a [`Dispatcher`].
pub struct DispatcherBuilder {
    bot: Arc<dyn Bot>,
    bridge: ExecutionBridge,
    registry: Registry,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl DispatcherBuilder {
    pub fn new(bot: Arc<dyn Bot>) -> Self {
        Self {
            bot,
            bridge: ExecutionBridge::new(),
            registry: Registry::default(),
            middleware: Vec::new(),
        }
    }

    pub fn bridge(mut self, bridge: ExecutionBridge) -> Self {
        self.bridge = bridge;
        self
    }

    /// Appends a middleware (before in order, after in reverse).
    pub fn add_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Low-level registration used by all `on_*` methods.
    pub fn register(
        mut self,
        kind: DispatchKind,
        filter: Option<Filter>,
        button: Option<ButtonMatcher>,
        callable: Callable,
    ) -> Self {
        self.registry.partition_mut(kind).push(Registration {
            filter,
            button,
            callable,
        });
        self
    }

    pub fn on_message(self, filter: Filter, handler: impl Handler + 'static) -> Self {
        self.register(DispatchKind::Message, Some(filter), None, Callable::cooperative(handler))
    }

    /// Catch-all message handler.
    pub fn on_any_message(self, handler: impl Handler + 'static) -> Self {
        self.register(DispatchKind::Message, None, None, Callable::cooperative(handler))
    }

    pub fn on_message_blocking(self, filter: Filter, handler: impl BlockingHandler) -> Self {
        self.register(DispatchKind::Message, Some(filter), None, Callable::blocking(handler))
    }

    pub fn on_edited_message(self, filter: Filter, handler: impl Handler + 'static) -> Self {
        self.register(
            DispatchKind::EditedMessage,
            Some(filter),
            None,
            Callable::cooperative(handler),
        )
    }

    pub fn on_callback(self, button_id: impl Into<String>, handler: impl Handler + 'static) -> Self {
        self.register(
            DispatchKind::Callback,
            None,
            Some(ButtonMatcher::Exact(button_id.into())),
            Callable::cooperative(handler),
        )
    }

    pub fn on_callback_prefix(self, prefix: impl Into<String>, handler: impl Handler + 'static) -> Self {
        self.register(
            DispatchKind::Callback,
            None,
            Some(ButtonMatcher::Prefix(prefix.into())),
            Callable::cooperative(handler),
        )
    }

    pub fn on_inline_query(self, filter: Filter, handler: impl Handler + 'static) -> Self {
        self.register(
            DispatchKind::InlineQuery,
            Some(filter),
            None,
            Callable::cooperative(handler),
        )
    }

    pub fn on_started_bot(self, handler: impl Handler + 'static) -> Self {
        self.register(DispatchKind::StartedBot, None, None, Callable::cooperative(handler))
    }

    pub fn on_stopped_bot(self, handler: impl Handler + 'static) -> Self {
        self.register(DispatchKind::StoppedBot, None, None, Callable::cooperative(handler))
    }

    pub fn build(self) -> Dispatcher {
        info!(
            registrations = self.registry.len(),
            middleware = self.middleware.len(),
            "Dispatcher built"
        );
        Dispatcher {
            bot: self.bot,
            bridge: self.bridge,
            registry: Arc::new(self.registry),
            middleware: Arc::new(self.middleware),
        }
    }
}

/// Immutable, cheaply cloneable dispatcher shared by the poller's tasks.
#[derive(Clone)]
pub struct Dispatcher {
    bot: Arc<dyn Bot>,
    bridge: ExecutionBridge,
    registry: Arc<Registry>,
    middleware: Arc<Vec<Arc<dyn Middleware>>>,
}

impl Dispatcher {
    pub fn builder(bot: Arc<dyn Bot>) -> DispatcherBuilder {
        DispatcherBuilder::new(bot)
    }

    pub fn bridge(&self) -> &ExecutionBridge {
        &self.bridge
    }

    fn select(&self, update: &Update) -> Option<&Registration> {
        let kind = DispatchKind::of(update.kind)?;
        let first_match = |kind| {
            self.registry
                .partition(kind)
                .iter()
                .find(|r| r.accepts(update))
        };
        match kind {
            // A button press nobody claimed is still a message.
            DispatchKind::Callback => {
                first_match(DispatchKind::Callback).or_else(|| first_match(DispatchKind::Message))
            }
            other => first_match(other),
        }
    }

    #[instrument(
        skip(self, update),
        fields(
            kind = ?update.kind,
            update_id = update.id.as_deref().unwrap_or(""),
            chat_id = update.chat_id.as_deref().unwrap_or(""),
        )
    )]
    pub async fn dispatch(&self, update: Arc<Update>) -> DispatchOutcome {
        if DispatchKind::of(update.kind).is_none() {
            info!(sender_id = ?update.sender_id(), "step: update not dispatchable, logged only");
            return DispatchOutcome::NoMatch;
        }

        let Some(registration) = self.select(&update) else {
            debug!("step: no registration matched");
            return DispatchOutcome::NoMatch;
        };

        let outcome = match self.run_before(&update).await {
            Some(outcome) => outcome,
            None => self.invoke(registration, &update).await,
        };

        for mw in self.middleware.iter().rev() {
            if let Err(e) = mw.after(&update, &outcome).await {
                warn!(
                    middleware = %std::any::type_name_of_val(mw.as_ref()),
                    error = %e,
                    "step: middleware after failed"
                );
            }
        }

        debug!(outcome = ?outcome, "step: dispatch finished");
        outcome
    }

    /// Runs every `before`; returns the outcome that ends dispatch early, if any.
    async fn run_before(&self, update: &Update) -> Option<DispatchOutcome> {
        for mw in self.middleware.iter() {
            let mw_name = std::any::type_name_of_val(mw.as_ref());
            match mw.before(update).await {
                Ok(true) => {}
                Ok(false) => {
                    info!(
                        middleware = %mw_name,
                        sender_id = ?update.sender_id(),
                        "step: middleware suppressed update"
                    );
                    return Some(DispatchOutcome::Suppressed);
                }
                Err(e) => {
                    error!(middleware = %mw_name, error = %e, "step: middleware before failed");
                    return Some(DispatchOutcome::HandlerFailed(format!("middleware: {e}")));
                }
            }
        }
        None
    }

    async fn invoke(&self, registration: &Registration, update: &Arc<Update>) -> DispatchOutcome {
        let ctx = Context::new(Arc::clone(update), Arc::clone(&self.bot), self.bridge.clone());
        debug!(may_block = registration.callable.may_block(), "step: invoking handler");
        match self.bridge.invoke(&registration.callable, ctx).await {
            Ok(()) => DispatchOutcome::Handled,
            Err(e) => {
                error!(
                    sender_id = ?update.sender_id(),
                    error = %e,
                    "step: handler failed"
                );
                DispatchOutcome::HandlerFailed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_kind_partitions() {
        assert_eq!(DispatchKind::of(UpdateKind::NewMessage), Some(DispatchKind::Message));
        assert_eq!(DispatchKind::of(UpdateKind::Callback), Some(DispatchKind::Callback));
        assert_eq!(DispatchKind::of(UpdateKind::RemovedMessage), None);
        assert_eq!(DispatchKind::of(UpdateKind::Unknown), None);
    }

    #[test]
    fn test_button_matcher() {
        assert!(ButtonMatcher::Exact("ok".into()).matches("ok"));
        assert!(!ButtonMatcher::Exact("ok".into()).matches("ok2"));
        assert!(ButtonMatcher::Prefix("page:".into()).matches("page:3"));
        assert!(!ButtonMatcher::Prefix("page:".into()).matches("pag"));
    }
}
