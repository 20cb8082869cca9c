//! Unit tests for AntiSpamManager: thresholds, windows, lazy expiry, persistence, concurrency.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::{AntiSpamConfig, AntiSpamConfigError, AntiSpamManager, SpamVerdict, PRUNE_EVERY};

fn manager(threshold: usize, window_secs: u64, punish_secs: u64) -> AntiSpamManager {
    AntiSpamManager::new(AntiSpamConfig::new(
        threshold,
        Duration::from_secs(window_secs),
        Duration::from_secs(punish_secs),
    ))
    .expect("valid config")
}

fn at(base: DateTime<Utc>, secs: i64) -> DateTime<Utc> {
    base + TimeDelta::seconds(secs)
}

/// **Test: threshold=3, window=10s — the third event punishes; punishment lapses on its own.**
#[test]
fn test_third_event_in_window_triggers_punishment() {
    let spam = manager(3, 10, 60);
    let t0 = Utc::now();

    assert_eq!(spam.check_at("u1", at(t0, 0)), SpamVerdict::Allowed);
    assert_eq!(spam.check_at("u1", at(t0, 1)), SpamVerdict::Allowed);
    assert_eq!(spam.check_at("u1", at(t0, 2)), SpamVerdict::NewlyPunished);

    assert!(spam.is_punished_at("u1", at(t0, 3)));
    assert!(spam.is_punished_at("u1", at(t0, 61)));
    assert!(!spam.is_punished_at("u1", at(t0, 62)));
}

#[test]
fn test_check_and_punish_reports_only_the_transition() {
    let spam = manager(2, 10, 300);

    assert!(!spam.check_and_punish("u1"));
    assert!(spam.check_and_punish("u1"));
    assert!(!spam.check_and_punish("u1"));
    assert!(!spam.check_and_punish("u1"));
    assert!(spam.is_punished("u1"));
}

#[test]
fn test_repeated_checks_while_punished_are_blocked() {
    let spam = manager(2, 10, 60);
    let t0 = Utc::now();

    spam.check_at("u1", at(t0, 0));
    assert_eq!(spam.check_at("u1", at(t0, 1)), SpamVerdict::NewlyPunished);
    assert_eq!(spam.check_at("u1", at(t0, 2)), SpamVerdict::Punished);
    assert!(SpamVerdict::Punished.is_blocked());
    assert!(!SpamVerdict::Allowed.is_blocked());
}

#[test]
fn test_events_outside_window_are_evicted() {
    let spam = manager(3, 10, 60);
    let t0 = Utc::now();

    for i in 0..10 {
        assert_eq!(spam.check_at("u1", at(t0, i * 6)), SpamVerdict::Allowed);
    }
    assert!(spam.event_count("u1") <= 2);
    assert!(!spam.is_punished_at("u1", at(t0, 60)));
}

#[test]
fn test_identities_are_independent() {
    let spam = manager(2, 10, 60);
    let t0 = Utc::now();

    spam.check_at("u1", at(t0, 0));
    spam.check_at("u1", at(t0, 1));
    assert_eq!(spam.check_at("u2", at(t0, 1)), SpamVerdict::Allowed);

    assert!(spam.is_punished_at("u1", at(t0, 2)));
    assert!(!spam.is_punished_at("u2", at(t0, 2)));
    assert!(!spam.is_punished_at("never-seen", at(t0, 2)));
}

/// **Test: history survives punishment expiry; a burst right after expiry punishes again.**
#[test]
fn test_history_kept_after_expiry() {
    let spam = manager(2, 30, 10);
    let t0 = Utc::now();

    spam.check_at("u1", at(t0, 0));
    assert_eq!(spam.check_at("u1", at(t0, 1)), SpamVerdict::NewlyPunished);
    assert!(!spam.is_punished_at("u1", at(t0, 12)));
    assert_eq!(spam.event_count("u1"), 2);

    assert_eq!(spam.check_at("u1", at(t0, 13)), SpamVerdict::NewlyPunished);
}

#[test]
fn test_clock_going_backwards_is_clamped() {
    let spam = manager(3, 10, 60);
    let t0 = Utc::now();

    spam.check_at("u1", at(t0, 100));
    spam.check_at("u1", at(t0, 0));
    assert_eq!(spam.event_count("u1"), 2);
    assert_eq!(spam.check_at("u1", at(t0, 101)), SpamVerdict::NewlyPunished);
}

#[test]
fn test_invalid_config_fails_fast() {
    let zero_threshold = AntiSpamConfig::new(0, Duration::from_secs(1), Duration::from_secs(1));
    assert!(matches!(
        AntiSpamManager::new(zero_threshold),
        Err(AntiSpamConfigError::ZeroThreshold)
    ));

    let zero_window = AntiSpamConfig::new(1, Duration::ZERO, Duration::from_secs(1));
    assert!(matches!(
        AntiSpamManager::new(zero_window),
        Err(AntiSpamConfigError::ZeroWindow)
    ));

    let zero_punish = AntiSpamConfig::new(1, Duration::from_secs(1), Duration::ZERO);
    assert!(matches!(
        AntiSpamManager::new(zero_punish),
        Err(AntiSpamConfigError::ZeroPunishment)
    ));
}

/// **Test: active punishments are written to disk and restored by a new manager.**
#[test]
fn test_punishments_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("antispam.json");
    let config = AntiSpamConfig::new(2, Duration::from_secs(10), Duration::from_secs(300))
        .with_persistence(&path);

    let first = AntiSpamManager::new(config.clone()).unwrap();
    first.check("u1");
    first.check("u1");
    assert!(first.is_punished("u1"));
    assert!(path.exists());

    let second = AntiSpamManager::new(config).unwrap();
    assert!(second.is_punished("u1"));
    assert!(!second.is_punished("u2"));
}

#[test]
fn test_corrupt_punishment_file_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("antispam.json");
    std::fs::write(&path, "not json").unwrap();

    let config = AntiSpamConfig::default().with_persistence(&path);
    let spam = AntiSpamManager::new(config).unwrap();
    assert!(!spam.is_punished("u1"));
}

/// **Test: rewriting the punishment file leaves valid JSON and no temp files behind.**
///
/// **Setup:** threshold=1, persistence into an empty temp dir.
/// **Action:** punish two senders, one rewrite each.
/// **Expected:** the dir holds only `antispam.json`; it parses to both senders; a new manager
/// restores them.
#[test]
fn test_punishment_file_is_replaced_atomically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("antispam.json");
    let config = AntiSpamConfig::new(1, Duration::from_secs(10), Duration::from_secs(300))
        .with_persistence(&path);

    let spam = AntiSpamManager::new(config.clone()).unwrap();
    assert!(spam.check_and_punish("u1"));
    assert!(spam.check_and_punish("u2"));

    let names: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(names, vec!["antispam.json".to_string()]);

    let saved: HashMap<String, DateTime<Utc>> =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(saved.len(), 2);

    let restored = AntiSpamManager::new(config).unwrap();
    assert!(restored.is_punished("u1"));
    assert!(restored.is_punished("u2"));
}

/// **Test: pruning drops idle senders and keeps recent or punished ones.**
///
/// **Setup:** threshold=3, window=10s, punish=60s; one quiet sender at t0, one punished at t0+2.
/// **Expected:** nothing pruned at t0+5; the quiet sender goes at t0+20; the punished one only
/// after its punishment lapses.
#[test]
fn test_prune_drops_idle_records() {
    let spam = manager(3, 10, 60);
    let t0 = Utc::now();

    spam.check_at("quiet", at(t0, 0));
    for secs in 0..3 {
        spam.check_at("spammer", at(t0, secs));
    }
    assert_eq!(spam.tracked(), 2);

    assert_eq!(spam.prune_at(at(t0, 5)), 0);
    assert_eq!(spam.prune_at(at(t0, 20)), 1);
    assert_eq!(spam.event_count("quiet"), 0);
    assert!(spam.is_punished_at("spammer", at(t0, 20)));

    assert_eq!(spam.prune_at(at(t0, 100)), 1);
    assert_eq!(spam.tracked(), 0);
}

#[test]
fn test_checks_sweep_idle_records_periodically() {
    let spam = manager(1_000, 10, 60);
    let t0 = Utc::now();

    for i in 0..PRUNE_EVERY - 1 {
        spam.check_at(&format!("u{i}"), at(t0, 0));
    }
    assert_eq!(spam.tracked(), PRUNE_EVERY - 1);

    spam.check_at("late", at(t0, 60));
    assert_eq!(spam.tracked(), 1);
    assert_eq!(spam.event_count("late"), 1);
}

/// **Test: concurrent checks on disjoint identities plus one shared identity keep exact counts.**
///
/// **Setup:** threshold high enough that nobody is punished; 8 tasks, each with its own
/// identity (5 checks) and 5 checks against a shared identity.
/// **Expected:** each private identity holds 5 events; the shared one holds 40.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_checks_keep_records_separate() {
    let spam = Arc::new(manager(1_000, 60, 60));

    let mut tasks = Vec::new();
    for worker in 0..8 {
        let spam = spam.clone();
        tasks.push(tokio::spawn(async move {
            let own = format!("user-{worker}");
            for _ in 0..5 {
                spam.check(&own);
                spam.check("shared");
                tokio::task::yield_now().await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    for worker in 0..8 {
        assert_eq!(spam.event_count(&format!("user-{worker}")), 5);
    }
    assert_eq!(spam.event_count("shared"), 40);
}

/// **Test: concurrent bursts from one identity produce exactly one new punishment.**
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_same_identity_punished_once() {
    let spam = Arc::new(manager(5, 60, 300));

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let spam = spam.clone();
        tasks.push(tokio::spawn(async move { spam.check_and_punish("flooder") }));
    }
    let mut newly_punished = 0;
    for task in tasks {
        if task.await.unwrap() {
            newly_punished += 1;
        }
    }

    assert_eq!(newly_punished, 1);
    assert!(spam.is_punished("flooder"));
}
