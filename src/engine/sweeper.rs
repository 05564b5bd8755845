//! Liveness sweeper: demotes logged-in users and drivers whose last heartbeat
//! is older than the staleness threshold.
//!
//! The pure half ([`sweep_stale`]) turns a collection snapshot into one batch
//! of `"{id}/loggedIn": false` updates. The store-bound half ([`set_inactive`])
//! applies that batch with a single `update` call and never fails; the
//! periodic driver ([`spawn_presence_sweeper`]) runs it for every presence
//! collection until cancelled.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use futures::FutureExt;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::models::presence::{PresenceKind, PresenceRecord};
use crate::state::AppState;
use crate::store::{StoreError, decode_children};

pub const LOGGED_IN_FIELD: &str = "loggedIn";

const ZONED_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"];
const NAIVE_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Delay before the first sweep (default: 5 seconds).
    pub startup_delay: Duration,
    /// Interval between sweeps (default: 60 seconds).
    pub interval: Duration,
    /// Heartbeat age after which a record is demoted (default: 30 seconds).
    pub staleness_threshold: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            startup_delay: Duration::from_secs(5),
            interval: Duration::from_secs(60),
            staleness_threshold: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemotionReason {
    MissingTimestamp,
    MalformedTimestamp,
    Expired,
}

/// All demotions found in one collection snapshot.
#[derive(Debug, Clone, Default)]
pub struct SweepBatch {
    pub updates: Map<String, Value>,
    pub demoted: usize,
}

/// Parses an ISO-8601 timestamp and normalizes it to UTC. Timestamps without
/// an offset are taken to be UTC already.
pub fn parse_last_active(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in ZONED_FORMATS {
        if let Ok(parsed) = DateTime::parse_from_str(raw, format) {
            return Some(parsed.with_timezone(&Utc));
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
}

pub fn stale_cutoff(now: DateTime<Utc>, threshold: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(threshold)
        .ok()
        .and_then(|threshold| now.checked_sub_signed(threshold))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub fn demotion_reason(
    record: &PresenceRecord,
    stale_cutoff: DateTime<Utc>,
) -> Option<DemotionReason> {
    if !record.logged_in {
        return None;
    }

    let Some(raw) = record.last_active_at.as_deref() else {
        return Some(DemotionReason::MissingTimestamp);
    };

    match parse_last_active(raw) {
        None => Some(DemotionReason::MalformedTimestamp),
        Some(last_active) if last_active < stale_cutoff => Some(DemotionReason::Expired),
        Some(_) => None,
    }
}

pub fn sweep_stale(
    kind: PresenceKind,
    snapshot: Option<&Value>,
    stale_cutoff: DateTime<Utc>,
) -> SweepBatch {
    let mut batch = SweepBatch::default();

    for (id, record) in decode_children::<PresenceRecord>(kind.collection(), snapshot) {
        let Some(reason) = demotion_reason(&record, stale_cutoff) else {
            continue;
        };

        match reason {
            DemotionReason::MalformedTimestamp => warn!(
                collection = %kind,
                id = %id,
                last_active_at = record.last_active_at.as_deref().unwrap_or_default(),
                "unparseable lastActiveAt; demoting"
            ),
            DemotionReason::MissingTimestamp => {
                debug!(collection = %kind, id = %id, "missing lastActiveAt; demoting")
            }
            DemotionReason::Expired => debug!(collection = %kind, id = %id, "heartbeat expired"),
        }

        batch
            .updates
            .insert(format!("{id}/{LOGGED_IN_FIELD}"), Value::Bool(false));
        batch.demoted += 1;
    }

    batch
}

/// Demotes stale records in one collection and returns how many were demoted.
///
/// Store failures are logged and reported as zero demotions.
pub async fn set_inactive(
    state: &AppState,
    kind: PresenceKind,
    threshold: Duration,
    now: DateTime<Utc>,
) -> usize {
    let start = Instant::now();
    let result = try_set_inactive(state, kind, threshold, now).await;

    state
        .metrics
        .sweep_latency_seconds
        .with_label_values(&[kind.collection()])
        .observe(start.elapsed().as_secs_f64());

    match result {
        Ok(demoted) => {
            state
                .metrics
                .presence_sweeps_total
                .with_label_values(&[kind.collection(), "success"])
                .inc();
            state
                .metrics
                .presence_demotions_total
                .with_label_values(&[kind.collection()])
                .inc_by(demoted as u64);
            demoted
        }
        Err(err) => {
            state
                .metrics
                .presence_sweeps_total
                .with_label_values(&[kind.collection(), "error"])
                .inc();
            error!(collection = %kind, error = %err, "liveness sweep failed");
            0
        }
    }
}

async fn try_set_inactive(
    state: &AppState,
    kind: PresenceKind,
    threshold: Duration,
    now: DateTime<Utc>,
) -> Result<usize, StoreError> {
    let snapshot = state.store.get(kind.collection()).await?;
    let batch = sweep_stale(kind, snapshot.as_ref(), stale_cutoff(now, threshold));

    if batch.demoted > 0 {
        state.store.update(kind.collection(), batch.updates).await?;
        info!(collection = %kind, demoted = batch.demoted, "demoted stale sessions");
    }

    Ok(batch.demoted)
}

/// Sweeps every presence collection once.
pub async fn sweep_all(state: &AppState, config: &SweeperConfig) -> usize {
    let now = Utc::now();
    let mut total = 0;

    for kind in PresenceKind::ALL {
        total += set_inactive(state, kind, config.staleness_threshold, now).await;
    }

    total
}

/// Starts the periodic liveness sweeper. Cancelling the token stops the loop
/// after any in-flight sweep completes.
pub fn spawn_presence_sweeper(
    state: Arc<AppState>,
    config: SweeperConfig,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run_presence_sweeper(state, config, cancel))
}

pub async fn run_presence_sweeper(
    state: Arc<AppState>,
    config: SweeperConfig,
    cancel: CancellationToken,
) {
    info!(
        startup_delay_secs = config.startup_delay.as_secs_f64(),
        interval_secs = config.interval.as_secs_f64(),
        threshold_secs = config.staleness_threshold.as_secs_f64(),
        "presence sweeper started"
    );

    tokio::select! {
        _ = cancel.cancelled() => {
            info!("presence sweeper cancelled before first sweep");
            return;
        }
        _ = sleep(config.startup_delay) => {}
    }

    let mut ticker = interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("presence sweeper shutting down");
                break;
            }
            _ = ticker.tick() => {}
        }

        match AssertUnwindSafe(sweep_all(&state, &config))
            .catch_unwind()
            .await
        {
            Ok(demoted) => debug!(demoted, "presence sweep tick finished"),
            Err(panic) => error!(
                reason = panic_message(panic.as_ref()),
                "presence sweep tick panicked; continuing"
            ),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use tokio_util::sync::CancellationToken;
    use tracing::Level;
    use tracing_subscriber::fmt::MakeWriter;

    use super::{
        DemotionReason, SweeperConfig, demotion_reason, parse_last_active, set_inactive,
        spawn_presence_sweeper, stale_cutoff, sweep_stale,
    };
    use crate::models::presence::{PresenceKind, PresenceRecord};
    use crate::state::AppState;
    use crate::store::DocumentStore;
    use crate::store::memory::MemoryStore;

    const THRESHOLD: Duration = Duration::from_secs(30);

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn record(logged_in: bool, last_active_at: Option<&str>) -> PresenceRecord {
        PresenceRecord {
            id: "r1".to_string(),
            email: None,
            location: None,
            logged_in,
            last_active_at: last_active_at.map(str::to_string),
        }
    }

    #[test]
    fn parses_zoned_naive_and_date_only_timestamps() {
        let expected = Utc.with_ymd_and_hms(2025, 1, 10, 12, 0, 0).unwrap();

        assert_eq!(parse_last_active("2025-01-10T12:00:00Z"), Some(expected));
        assert_eq!(parse_last_active("2025-01-10T14:00:00+02:00"), Some(expected));
        assert_eq!(parse_last_active("2025-01-10T14:00:00+0200"), Some(expected));
        assert_eq!(parse_last_active("2025-01-10T12:00:00"), Some(expected));
        assert_eq!(parse_last_active("2025-01-10 12:00:00.000"), Some(expected));
        assert_eq!(
            parse_last_active("2025-01-10"),
            Some(Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap())
        );
        assert!(parse_last_active("not-a-date").is_none());
        assert!(parse_last_active("").is_none());
    }

    #[test]
    fn threshold_boundary() {
        let now = Utc::now();
        let cutoff = stale_cutoff(now, THRESHOLD);

        let just_stale = (now - chrono::Duration::seconds(31)).to_rfc3339();
        let just_fresh = (now - chrono::Duration::seconds(29)).to_rfc3339();

        assert_eq!(
            demotion_reason(&record(true, Some(&just_stale)), cutoff),
            Some(DemotionReason::Expired)
        );
        assert_eq!(demotion_reason(&record(true, Some(&just_fresh)), cutoff), None);
    }

    #[test]
    fn missing_or_malformed_timestamp_demotes() {
        let cutoff = stale_cutoff(Utc::now(), THRESHOLD);

        assert_eq!(
            demotion_reason(&record(true, None), cutoff),
            Some(DemotionReason::MissingTimestamp)
        );
        assert_eq!(
            demotion_reason(&record(true, Some("not-a-date")), cutoff),
            Some(DemotionReason::MalformedTimestamp)
        );
    }

    #[test]
    fn logged_out_records_are_never_demoted() {
        let cutoff = stale_cutoff(Utc::now(), THRESHOLD);

        assert_eq!(demotion_reason(&record(false, None), cutoff), None);
        assert_eq!(demotion_reason(&record(false, Some("garbage")), cutoff), None);
        assert_eq!(
            demotion_reason(&record(false, Some("2001-01-01T00:00:00Z")), cutoff),
            None
        );
    }

    #[test]
    fn naive_timestamps_are_treated_as_utc() {
        let now = Utc.with_ymd_and_hms(2025, 1, 10, 12, 0, 0).unwrap();
        let cutoff = stale_cutoff(now, THRESHOLD);

        // Ten seconds old in UTC; would be hours stale if read as a local offset.
        let fresh = record(true, Some("2025-01-10T11:59:50"));
        assert_eq!(demotion_reason(&fresh, cutoff), None);

        // Same wall-clock reading but explicitly two hours east of UTC.
        let shifted = record(true, Some("2025-01-10T11:59:50+02:00"));
        assert_eq!(demotion_reason(&shifted, cutoff), Some(DemotionReason::Expired));
    }

    #[test]
    fn sweep_batches_field_paths() {
        let now = Utc::now();
        let snapshot = json!({
            "stale": { "loggedIn": true, "lastActiveAt": (now - chrono::Duration::minutes(5)).to_rfc3339() },
            "fresh": { "loggedIn": true, "lastActiveAt": now.to_rfc3339() },
            "null": { "loggedIn": true, "lastActiveAt": null },
            "junk": { "loggedIn": true, "lastActiveAt": "not-a-date" },
            "offline": { "loggedIn": false },
        });

        let batch = sweep_stale(
            PresenceKind::Users,
            Some(&snapshot),
            stale_cutoff(now, THRESHOLD),
        );

        assert_eq!(batch.demoted, 3);
        assert_eq!(batch.updates.len(), 3);
        assert_eq!(batch.updates["stale/loggedIn"], json!(false));
        assert_eq!(batch.updates["null/loggedIn"], json!(false));
        assert_eq!(batch.updates["junk/loggedIn"], json!(false));
        assert!(!batch.updates.contains_key("fresh/loggedIn"));
        assert!(!batch.updates.contains_key("offline/loggedIn"));
    }

    #[test]
    fn malformed_timestamp_logs_a_warning() {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_max_level(Level::WARN)
            .with_ansi(false)
            .finish();
        let snapshot = json!({
            "junk": { "loggedIn": true, "lastActiveAt": "not-a-date" },
            "null": { "loggedIn": true, "lastActiveAt": null },
        });

        let batch = tracing::subscriber::with_default(subscriber, || {
            sweep_stale(
                PresenceKind::Users,
                Some(&snapshot),
                stale_cutoff(Utc::now(), THRESHOLD),
            )
        });

        assert_eq!(batch.demoted, 2);
        let output = logs.contents();
        assert!(output.contains("WARN"));
        assert!(output.contains("unparseable lastActiveAt"));
        assert!(output.contains("not-a-date"));
        // Missing timestamps demote quietly.
        assert_eq!(output.matches("WARN").count(), 1);
    }

    #[tokio::test]
    async fn set_inactive_applies_batch_to_store() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        store
            .set(
                "drivers",
                json!({
                    "d1": { "email": "d1@x.y", "loggedIn": true, "lastActiveAt": "2020-01-01T00:00:00" },
                    "d2": { "email": "d2@x.y", "loggedIn": true, "lastActiveAt": now.to_rfc3339() },
                }),
            )
            .await
            .unwrap();
        let state = AppState::with_default_target(store.clone());

        let demoted = set_inactive(&state, PresenceKind::Drivers, THRESHOLD, now).await;

        assert_eq!(demoted, 1);
        let drivers = store.get("drivers").await.unwrap().unwrap();
        assert_eq!(drivers["d1"]["loggedIn"], false);
        assert_eq!(drivers["d1"]["email"], "d1@x.y");
        assert_eq!(drivers["d2"]["loggedIn"], true);
    }

    #[tokio::test]
    async fn set_inactive_swallows_store_failure() {
        let store = Arc::new(MemoryStore::new());
        store.set_available(false);
        let state = AppState::with_default_target(store);

        let demoted = set_inactive(&state, PresenceKind::Users, THRESHOLD, Utc::now()).await;
        assert_eq!(demoted, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_sweeper_keeps_running_and_stops_on_cancel() {
        let store = Arc::new(MemoryStore::new());
        store.set_available(false);
        let state = Arc::new(AppState::with_default_target(store.clone()));
        let cancel = CancellationToken::new();
        let handle =
            spawn_presence_sweeper(state.clone(), SweeperConfig::default(), cancel.clone());

        // First tick fires after the 5s startup delay and fails on both collections.
        tokio::time::sleep(Duration::from_secs(6)).await;
        let failed = state
            .metrics
            .presence_sweeps_total
            .with_label_values(&["users", "error"])
            .get();
        assert_eq!(failed, 1);

        store.set_available(true);
        store
            .set("users/u1", json!({ "loggedIn": true, "lastActiveAt": null }))
            .await
            .unwrap();

        // Nothing happens until the next 60s tick.
        tokio::time::sleep(Duration::from_secs(30)).await;
        let user = store.get("users/u1").await.unwrap().unwrap();
        assert_eq!(user["loggedIn"], true);

        tokio::time::sleep(Duration::from_secs(30)).await;
        let user = store.get("users/u1").await.unwrap().unwrap();
        assert_eq!(user["loggedIn"], false);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper stops after cancellation")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancelling_during_startup_delay_skips_sweeping() {
        let store = Arc::new(MemoryStore::new());
        store
            .set("users/u1", json!({ "loggedIn": true, "lastActiveAt": null }))
            .await
            .unwrap();
        let state = Arc::new(AppState::with_default_target(store.clone()));
        let cancel = CancellationToken::new();
        let handle = spawn_presence_sweeper(state, SweeperConfig::default(), cancel.clone());

        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        handle.await.unwrap();

        let user = store.get("users/u1").await.unwrap().unwrap();
        assert_eq!(user["loggedIn"], true);
    }
}
