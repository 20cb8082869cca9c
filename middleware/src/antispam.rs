//! Per-sender sliding-window rate limiter with timed punishment.
//!
//! Each identity owns a [`SpamRecord`] behind its own mutex; the map only hands out the
//! record, so checks for different senders never serialize on a shared lock.
//! Active punishments can be persisted to a JSON file so they survive restarts.
//! Idle records are swept every [`PRUNE_EVERY`] checks, so the map tracks recent senders only.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Checks between two sweeps of idle records.
pub const PRUNE_EVERY: usize = 1024;

#[derive(Error, Debug)]
pub enum AntiSpamConfigError {
    #[error("threshold must be at least 1")]
    ZeroThreshold,
    #[error("window must be greater than zero")]
    ZeroWindow,
    #[error("punish duration must be greater than zero")]
    ZeroPunishment,
    #[error("duration out of range: {0:?}")]
    OutOfRange(Duration),
}

/// Rate-limit settings. Defaults: 10 events per 10 s, 5 minutes of punishment.
#[derive(Debug, Clone)]
pub struct AntiSpamConfig {
    /// Events within `window` that trigger a punishment.
    pub threshold: usize,
    pub window: Duration,
    pub punish_duration: Duration,
    /// JSON file holding active punishments; `None` keeps them in memory only.
    pub punishments_path: Option<PathBuf>,
}

impl Default for AntiSpamConfig {
    fn default() -> Self {
        Self {
            threshold: 10,
            window: Duration::from_secs(10),
            punish_duration: Duration::from_secs(300),
            punishments_path: None,
        }
    }
}

impl AntiSpamConfig {
    pub fn new(threshold: usize, window: Duration, punish_duration: Duration) -> Self {
        Self {
            threshold,
            window,
            punish_duration,
            punishments_path: None,
        }
    }

    pub fn with_persistence(mut self, path: impl Into<PathBuf>) -> Self {
        self.punishments_path = Some(path.into());
        self
    }

    pub fn validate(&self) -> Result<(), AntiSpamConfigError> {
        if self.threshold == 0 {
            return Err(AntiSpamConfigError::ZeroThreshold);
        }
        if self.window.is_zero() {
            return Err(AntiSpamConfigError::ZeroWindow);
        }
        if self.punish_duration.is_zero() {
            return Err(AntiSpamConfigError::ZeroPunishment);
        }
        Ok(())
    }
}

/// What a single check decided for an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpamVerdict {
    Allowed,
    /// This event pushed the identity over the threshold.
    NewlyPunished,
    /// Still serving an earlier punishment.
    Punished,
}

impl SpamVerdict {
    pub fn is_blocked(self) -> bool {
        !matches!(self, SpamVerdict::Allowed)
    }
}

/// Recent event timestamps plus the current punishment expiry.
#[derive(Debug, Default)]
pub struct SpamRecord {
    timestamps: VecDeque<DateTime<Utc>>,
    punished_until: Option<DateTime<Utc>>,
}

impl SpamRecord {
    /// Appends `now` (clamped so timestamps never go backwards), drops entries older than
    /// `window` and keeps at most `cap` entries. Returns the effective timestamp.
    fn record(&mut self, now: DateTime<Utc>, window: TimeDelta, cap: usize) -> DateTime<Utc> {
        let now = match self.timestamps.back() {
            Some(last) if *last > now => *last,
            _ => now,
        };
        self.timestamps.push_back(now);
        let horizon = now - window;
        while self.timestamps.front().is_some_and(|t| *t < horizon) {
            self.timestamps.pop_front();
        }
        while self.timestamps.len() > cap {
            self.timestamps.pop_front();
        }
        now
    }

    /// Lazy expiry: an elapsed punishment is cleared, history is kept.
    fn punished_at(&mut self, now: DateTime<Utc>) -> bool {
        match self.punished_until {
            Some(until) if now < until => true,
            Some(_) => {
                self.punished_until = None;
                false
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn punished_until(&self) -> Option<DateTime<Utc>> {
        self.punished_until
    }

    /// No live punishment and no event inside the window ending at `now`.
    fn is_idle(&self, now: DateTime<Utc>, window: TimeDelta) -> bool {
        let punished = self.punished_until.is_some_and(|until| now < until);
        let recent = self.timestamps.back().is_some_and(|last| *last >= now - window);
        !punished && !recent
    }
}

pub struct AntiSpamManager {
    threshold: usize,
    window: TimeDelta,
    punish_duration: TimeDelta,
    punishments_path: Option<PathBuf>,
    records: DashMap<String, Arc<Mutex<SpamRecord>>>,
    checks: AtomicUsize,
    persist_lock: Mutex<()>,
}

impl AntiSpamManager {
    /// Validates the config and restores persisted punishments. Invalid settings are fatal.
    pub fn new(config: AntiSpamConfig) -> Result<Self, AntiSpamConfigError> {
        config.validate()?;
        let window = TimeDelta::from_std(config.window)
            .map_err(|_| AntiSpamConfigError::OutOfRange(config.window))?;
        let punish_duration = TimeDelta::from_std(config.punish_duration)
            .map_err(|_| AntiSpamConfigError::OutOfRange(config.punish_duration))?;

        let manager = Self {
            threshold: config.threshold,
            window,
            punish_duration,
            punishments_path: config.punishments_path,
            records: DashMap::new(),
            checks: AtomicUsize::new(0),
            persist_lock: Mutex::new(()),
        };
        manager.restore();
        Ok(manager)
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Records an event and reports whether it triggered a new punishment.
    pub fn check_and_punish(&self, identity: &str) -> bool {
        self.check_at(identity, Utc::now()) == SpamVerdict::NewlyPunished
    }

    pub fn is_punished(&self, identity: &str) -> bool {
        self.is_punished_at(identity, Utc::now())
    }

    /// Records an event and returns the full verdict in one atomic step.
    pub fn check(&self, identity: &str) -> SpamVerdict {
        self.check_at(identity, Utc::now())
    }

    pub fn check_at(&self, identity: &str, now: DateTime<Utc>) -> SpamVerdict {
        let record = self.record_for(identity);
        let verdict = {
            let mut record = record.lock();
            let was_punished = record.punished_until.is_some();
            let now = record.record(now, self.window, self.threshold);
            if record.punished_at(now) {
                SpamVerdict::Punished
            } else if record.len() >= self.threshold {
                record.punished_until = Some(now + self.punish_duration);
                SpamVerdict::NewlyPunished
            } else {
                if was_punished {
                    debug!(identity = %identity, "Punishment expired");
                }
                SpamVerdict::Allowed
            }
        };

        if verdict == SpamVerdict::NewlyPunished {
            warn!(
                identity = %identity,
                threshold = self.threshold,
                punish_secs = self.punish_duration.num_seconds(),
                "Sender exceeded message rate, punished"
            );
            self.persist();
        }
        if (self.checks.fetch_add(1, Ordering::Relaxed) + 1) % PRUNE_EVERY == 0 {
            self.prune_at(now);
        }
        verdict
    }

    /// Drops idle records and returns how many were removed. A record another check still
    /// holds is kept.
    pub fn prune_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| {
            Arc::strong_count(record) > 1 || !record.lock().is_idle(now, self.window)
        });
        let removed = before.saturating_sub(self.records.len());
        if removed > 0 {
            debug!(removed, tracked = self.records.len(), "Pruned idle spam records");
        }
        removed
    }

    /// Number of identities currently tracked.
    pub fn tracked(&self) -> usize {
        self.records.len()
    }

    pub fn is_punished_at(&self, identity: &str, now: DateTime<Utc>) -> bool {
        match self.records.get(identity).map(|r| Arc::clone(r.value())) {
            Some(record) => record.lock().punished_at(now),
            None => false,
        }
    }

    /// Number of events currently held in the identity's window.
    pub fn event_count(&self, identity: &str) -> usize {
        self.records
            .get(identity)
            .map(|r| r.value().lock().len())
            .unwrap_or(0)
    }

    fn record_for(&self, identity: &str) -> Arc<Mutex<SpamRecord>> {
        if let Some(record) = self.records.get(identity) {
            return Arc::clone(record.value());
        }
        Arc::clone(
            self.records
                .entry(identity.to_string())
                .or_default()
                .value(),
        )
    }

    fn restore(&self) {
        let Some(path) = &self.punishments_path else {
            return;
        };
        let punishments = match load_punishments(path) {
            Ok(p) => p,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable punishment file");
                return;
            }
        };
        let now = Utc::now();
        let mut restored = 0;
        for (identity, until) in punishments.into_iter().filter(|(_, until)| *until > now) {
            self.record_for(&identity).lock().punished_until = Some(until);
            restored += 1;
        }
        info!(path = %path.display(), restored, "Restored active punishments");
    }

    fn persist(&self) {
        let Some(path) = &self.punishments_path else {
            return;
        };
        let _guard = self.persist_lock.lock();
        let now = Utc::now();
        let active: HashMap<String, DateTime<Utc>> = self
            .records
            .iter()
            .filter_map(|entry| {
                let until = entry.value().lock().punished_until?;
                (until > now).then(|| (entry.key().clone(), until))
            })
            .collect();
        if let Err(e) = save_punishments(path, &active) {
            warn!(path = %path.display(), error = %e, "Failed to persist punishments");
        }
    }
}

fn load_punishments(path: &Path) -> anyhow::Result<HashMap<String, DateTime<Utc>>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(serde_json::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
        Err(e) => Err(e.into()),
    }
}

/// Writes through a temp file in the same directory and renames it over `path`, so a crash
/// leaves either the old file or the new one. Runs inline on the checking thread; it only
/// happens when a sender is newly punished.
fn save_punishments(path: &Path, active: &HashMap<String, DateTime<Utc>>) -> anyhow::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut tmp = NamedTempFile::new_in(&dir)?;
    serde_json::to_writer(&mut tmp, active)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
