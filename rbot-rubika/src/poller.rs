//! Polling loop: fetch a batch after the committed offset, dispatch it, commit, repeat.
//!
//! The offset is committed only after every update of the batch has finished dispatching, so a
//! crash between dispatch and commit redelivers that batch (at-least-once) and never skips one.
//! Transport failures back off exponentially and retry forever; a failed commit is retried
//! without fetching again. Shutdown through the [`CancellationToken`] abandons a pending fetch
//! or backoff sleep but lets an in-flight dispatch and its commit finish.
//!
//! Numeric offsets only move forward: updates at or before the committed id are skipped and
//! a batch whose highest id is behind it is not committed. Platform cursors are opaque and
//! committed as given.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use rbot_core::{compare_ids, DispatchOutcome, Offset, RbotError, Result, Update, UpdateSource};
use rbot_dispatch::Dispatcher;
use storage::OffsetStore;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::RubikaConfig;

/// How a batch is handed to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Chats run concurrently as tasks; each chat's updates stay in order.
    Cooperative,
    /// One update at a time, sorted by id when every update has one, else in batch order.
    Blocking,
}

#[derive(Error, Debug)]
#[error("unknown execution mode: {0} (expected `cooperative` or `blocking`)")]
pub struct ParseExecutionModeError(String);

impl FromStr for ExecutionMode {
    type Err = ParseExecutionModeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cooperative" | "async" => Ok(ExecutionMode::Cooperative),
            "blocking" | "sync" => Ok(ExecutionMode::Blocking),
            other => Err(ParseExecutionModeError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Fetching,
    Dispatching,
    Committing,
    Backoff,
    Stopped,
}

/// Exponential backoff with ±20% jitter: `initial * 2^attempt`, capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    attempt: u32,
    initial_ms: u64,
    max_ms: u64,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            attempt: 0,
            initial_ms: initial.as_millis() as u64,
            max_ms: max.as_millis() as u64,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let factor = 2u64.saturating_pow(self.attempt.min(32));
        let backoff_ms = self.initial_ms.saturating_mul(factor).min(self.max_ms);
        self.attempt = self.attempt.saturating_add(1);

        let jitter = backoff_ms / 5;
        let with_jitter = if jitter == 0 {
            backoff_ms
        } else {
            backoff_ms - jitter + fastrand::u64(0..=2 * jitter)
        };
        Duration::from_millis(with_jitter)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub limit: u32,
    pub mode: ExecutionMode,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    /// Overrides the source's own minimum spacing between fetches.
    pub min_interval: Option<Duration>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            limit: 50,
            mode: ExecutionMode::Cooperative,
            backoff_initial: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
            min_interval: None,
        }
    }
}

impl PollerConfig {
    /// Poll settings from the environment config. Fetch spacing is left to the client.
    pub fn from_config(config: &RubikaConfig) -> Self {
        Self {
            limit: config.poll_limit,
            mode: config.execution_mode,
            backoff_initial: config.backoff_initial,
            backoff_max: config.backoff_max,
            min_interval: None,
        }
    }
}

/// Per-batch dispatch tally, for logging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub handled: usize,
    pub suppressed: usize,
    pub no_match: usize,
    pub failed: usize,
}

impl BatchReport {
    fn record(&mut self, outcome: &DispatchOutcome) {
        match outcome {
            DispatchOutcome::Handled => self.handled += 1,
            DispatchOutcome::Suppressed => self.suppressed += 1,
            DispatchOutcome::NoMatch => self.no_match += 1,
            DispatchOutcome::HandlerFailed(_) => self.failed += 1,
        }
    }

    fn merge(&mut self, other: BatchReport) {
        self.handled += other.handled;
        self.suppressed += other.suppressed;
        self.no_match += other.no_match;
        self.failed += other.failed;
    }
}

pub struct Poller {
    source: Arc<dyn UpdateSource>,
    store: Arc<dyn OffsetStore>,
    dispatcher: Dispatcher,
    config: PollerConfig,
    state: watch::Sender<PollerState>,
    token: CancellationToken,
}

impl Poller {
    pub fn new(
        source: Arc<dyn UpdateSource>,
        store: Arc<dyn OffsetStore>,
        dispatcher: Dispatcher,
        config: PollerConfig,
    ) -> Self {
        let (state, _) = watch::channel(PollerState::Idle);
        Self {
            source,
            store,
            dispatcher,
            config,
            state,
            token: CancellationToken::new(),
        }
    }

    /// Stops the loop when `token` (or a parent of it) is cancelled.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Token that stops the loop when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollerState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: PollerState) {
        self.state.send_replace(state);
    }

    /// Sleeps unless cancelled first; returns `false` on cancellation.
    async fn sleep_or_cancel(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.token.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// Runs until cancelled. Fails only when the stored offset can't be read at startup.
    pub async fn run(&self) -> Result<()> {
        let mut offset = self.store.load().await.map_err(|e| {
            error!(error = %e, "Failed to load offset");
            RbotError::Persistence(e.to_string())
        })?;
        info!(
            offset = ?offset.as_ref().map(Offset::as_str),
            mode = ?self.config.mode,
            limit = self.config.limit,
            "Poller started"
        );

        let min_interval = self
            .config
            .min_interval
            .unwrap_or_else(|| self.source.min_interval());
        let mut fetch_backoff = Backoff::new(self.config.backoff_initial, self.config.backoff_max);
        let mut last_fetch: Option<Instant> = None;

        while !self.token.is_cancelled() {
            if let Some(last) = last_fetch {
                let wait = min_interval.saturating_sub(last.elapsed());
                if !wait.is_zero() && !self.sleep_or_cancel(wait).await {
                    break;
                }
            }

            self.set_state(PollerState::Fetching);
            let fetched = tokio::select! {
                _ = self.token.cancelled() => break,
                fetched = self.source.fetch(offset.as_ref(), self.config.limit) => fetched,
            };
            last_fetch = Some(Instant::now());

            let batch = match fetched {
                Ok(batch) => {
                    fetch_backoff.reset();
                    batch
                }
                Err(e) => {
                    let delay = fetch_backoff
                        .next_delay()
                        .max(e.retry_after().unwrap_or_default());
                    warn!(
                        error = %e,
                        attempt = fetch_backoff.attempt(),
                        delay_ms = delay.as_millis() as u64,
                        "Fetch failed, backing off"
                    );
                    self.set_state(PollerState::Backoff);
                    if !self.sleep_or_cancel(delay).await {
                        break;
                    }
                    continue;
                }
            };

            let from_cursor = batch.next_offset.is_some();
            let candidate = batch.candidate_offset();
            let mut updates = batch.updates;
            if let Some(current) = &offset {
                let received = updates.len();
                updates.retain(|u| {
                    !u.id
                        .as_deref()
                        .is_some_and(|id| is_behind(id, current.as_str()))
                });
                let skipped = received - updates.len();
                if skipped > 0 {
                    warn!(skipped, offset = %current, "Skipped updates at or before the committed offset");
                }
            }

            if !updates.is_empty() {
                self.set_state(PollerState::Dispatching);
                let report = self.dispatch_batch(updates).await;
                info!(
                    handled = report.handled,
                    suppressed = report.suppressed,
                    no_match = report.no_match,
                    failed = report.failed,
                    "Batch dispatched"
                );
            }

            if let Some(candidate) = candidate.filter(|c| offset.as_ref() != Some(c)) {
                let backwards = !from_cursor
                    && offset
                        .as_ref()
                        .is_some_and(|current| is_behind(candidate.as_str(), current.as_str()));
                if backwards {
                    warn!(
                        candidate = %candidate,
                        offset = ?offset.as_ref().map(Offset::as_str),
                        "Batch does not advance the offset, keeping the committed one"
                    );
                } else if self.commit(&candidate).await {
                    offset = Some(candidate);
                } else {
                    warn!(
                        offset = %candidate,
                        "Stopped before the offset was committed; the batch will be redelivered"
                    );
                    break;
                }
            }
            self.set_state(PollerState::Idle);
        }

        self.set_state(PollerState::Stopped);
        info!(offset = ?offset.as_ref().map(Offset::as_str), "Poller stopped");
        Ok(())
    }

    /// Retries until the store accepts `offset`. Returns `false` only when cancelled first.
    #[instrument(skip(self, offset), fields(offset = %offset))]
    async fn commit(&self, offset: &Offset) -> bool {
        let mut backoff = Backoff::new(self.config.backoff_initial, self.config.backoff_max);
        loop {
            self.set_state(PollerState::Committing);
            match self.store.commit(offset).await {
                Ok(()) => {
                    debug!("Offset committed");
                    return true;
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    error!(
                        error = %e,
                        attempt = backoff.attempt(),
                        delay_ms = delay.as_millis() as u64,
                        "Offset commit failed, retrying"
                    );
                    self.set_state(PollerState::Backoff);
                    if !self.sleep_or_cancel(delay).await {
                        return false;
                    }
                }
            }
        }
    }

    /// Dispatches the whole batch and waits for every update to finish.
    pub async fn dispatch_batch(&self, updates: Vec<Update>) -> BatchReport {
        let updates: Vec<Arc<Update>> = updates.into_iter().map(Arc::new).collect();
        match self.config.mode {
            ExecutionMode::Blocking => {
                let mut updates = updates;
                sort_by_id(&mut updates);
                let mut report = BatchReport::default();
                for update in updates {
                    report.record(&self.dispatcher.dispatch(update).await);
                }
                report
            }
            ExecutionMode::Cooperative => {
                let mut tasks = JoinSet::new();
                for chat in group_by_chat(updates) {
                    let dispatcher = self.dispatcher.clone();
                    tasks.spawn(async move {
                        let mut report = BatchReport::default();
                        for update in chat {
                            report.record(&dispatcher.dispatch(update).await);
                        }
                        report
                    });
                }

                let mut report = BatchReport::default();
                while let Some(joined) = tasks.join_next().await {
                    match joined {
                        Ok(chat_report) => report.merge(chat_report),
                        Err(e) => error!(error = %e, "Chat dispatch task failed"),
                    }
                }
                report
            }
        }
    }

    /// Drives [`run`](Self::run) on a dedicated current-thread runtime. Call from a plain
    /// thread, not from inside an async context.
    pub fn run_blocking(self) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.run())
    }

    /// Runs the loop as a task on the current runtime.
    pub fn spawn(self) -> PollerHandle {
        let token = self.token.clone();
        let state = self.subscribe();
        let task = tokio::spawn(async move { self.run().await });
        PollerHandle { token, state, task }
    }
}

/// Groups updates by chat in first-seen order; each group is sorted by id when every update
/// in it has one.
fn group_by_chat(updates: Vec<Arc<Update>>) -> Vec<Vec<Arc<Update>>> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Vec<Arc<Update>>> = Vec::new();
    for update in updates {
        let key = update.ordering_key().to_string();
        let slot = *index.entry(key).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(update);
    }
    for group in &mut groups {
        sort_by_id(group);
    }
    groups
}

/// Stable sort by id; left untouched when any update lacks one.
fn sort_by_id(updates: &mut [Arc<Update>]) {
    if updates.iter().all(|u| u.id.is_some()) {
        updates.sort_by(|a, b| {
            compare_ids(
                a.id.as_deref().unwrap_or_default(),
                b.id.as_deref().unwrap_or_default(),
            )
        });
    }
}

/// True when both values are numeric ids and `id` is not strictly after `offset`.
/// Opaque cursors never compare as behind.
fn is_behind(id: &str, offset: &str) -> bool {
    let numeric = |s: &str| s.parse::<u128>().is_ok();
    numeric(id) && numeric(offset) && compare_ids(id, offset) != Ordering::Greater
}

/// Handle to a spawned poller.
pub struct PollerHandle {
    token: CancellationToken,
    state: watch::Receiver<PollerState>,
    task: tokio::task::JoinHandle<Result<()>>,
}

impl PollerHandle {
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn state(&self) -> PollerState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollerState> {
        self.state.clone()
    }

    /// Waits for the loop to exit.
    pub async fn join(self) -> Result<()> {
        self.task
            .await
            .map_err(|e| RbotError::Runtime(format!("poller task failed: {e}")))?
    }
}
