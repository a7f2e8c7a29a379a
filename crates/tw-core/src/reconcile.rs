//! One reconciliation cycle: fetch, convert, detect, upsert, prune.

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use thiserror::Error;

use crate::detect::detect_changes;
use crate::entry::Entry;
use crate::report::{FetchWindow, ReportSource, into_entries};
use crate::store::EntryStore;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that abort a reconciliation cycle.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The retention window is zero or cannot be represented.
    #[error("invalid window: {days} days")]
    InvalidWindow { days: u32 },
    /// The remote report could not be fetched.
    #[error("failed to fetch report")]
    Fetch(#[source] BoxError),
    /// The store could not be initialized.
    #[error("failed to initialize store")]
    StorageInit(#[source] BoxError),
    /// Looking up a stored entry failed.
    #[error("failed to read stored entry")]
    StorageRead(#[source] BoxError),
    /// Writing or pruning entries failed.
    #[error("failed to write store")]
    StorageWrite(#[source] BoxError),
}

/// Inputs of a single cycle.
#[derive(Debug, Clone, Copy)]
pub struct CycleOptions {
    /// Length of both the fetch window and the retention window.
    pub days: u32,
    pub now: DateTime<Utc>,
}

/// Outcome of a successful cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub window: FetchWindow,
    pub cutoff: i64,
    pub fetched: usize,
    pub upserted: usize,
    pub pruned: usize,
    /// Stored entries whose billable flag changed, as they were before
    /// this cycle overwrote them.
    pub changes: Vec<Entry>,
}

impl CycleReport {
    pub const fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }
}

/// Unix timestamp at or before which stored entries are pruned.
pub fn prune_cutoff(now: DateTime<Utc>, days: u32) -> Option<i64> {
    let window = TimeDelta::try_days(i64::from(days))?;
    now.checked_sub_signed(window).map(|cutoff| cutoff.timestamp())
}

/// Runs one cycle against `source` and `store`.
///
/// The fetch window covers calendar dates in `tz`. Change detection reads
/// the store strictly before the upsert. The prune cutoff is derived from
/// `options.now`, independently of what was fetched. Any error aborts the
/// cycle; a failed upsert leaves the store as it was.
pub fn run_cycle<R, S, Tz>(
    source: &R,
    store: &mut S,
    options: &CycleOptions,
    tz: &Tz,
) -> Result<CycleReport, ReconcileError>
where
    R: ReportSource,
    S: EntryStore,
    Tz: TimeZone,
{
    let invalid = || ReconcileError::InvalidWindow { days: options.days };
    if options.days == 0 {
        return Err(invalid());
    }
    let window = FetchWindow::trailing(options.now, options.days, tz).ok_or_else(invalid)?;
    let cutoff = prune_cutoff(options.now, options.days).ok_or_else(invalid)?;

    let records = source
        .fetch_window(&window)
        .map_err(|err| ReconcileError::Fetch(Box::new(err)))?;
    let entries = into_entries(records);
    tracing::debug!(
        fetched = entries.len(),
        since = %window.since,
        until = %window.until,
        "fetched report"
    );

    store
        .ensure_initialized()
        .map_err(|err| ReconcileError::StorageInit(Box::new(err)))?;

    let changes = detect_changes(&entries, &*store)
        .map_err(|err| ReconcileError::StorageRead(Box::new(err)))?;

    let upserted = store
        .upsert_all(&entries)
        .map_err(|err| ReconcileError::StorageWrite(Box::new(err)))?;

    let pruned = store
        .delete_older_than(cutoff)
        .map_err(|err| ReconcileError::StorageWrite(Box::new(err)))?;

    for change in &changes {
        tracing::warn!(
            id = change.id,
            was_billable = change.billable,
            "billable flag changed since last check"
        );
    }
    tracing::info!(
        fetched = entries.len(),
        upserted,
        pruned,
        changes = changes.len(),
        "reconciliation finished"
    );

    Ok(CycleReport {
        window,
        cutoff,
        fetched: entries.len(),
        upserted,
        pruned,
        changes,
    })
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use chrono::{DateTime, FixedOffset};
    use thiserror::Error;

    use super::*;
    use crate::report::ReportRecord;
    use crate::store::memory::MemoryStore;

    #[derive(Debug, Error)]
    #[error("source unavailable")]
    struct SourceDown;

    #[derive(Default)]
    struct StaticSource {
        records: Vec<ReportRecord>,
        fail: bool,
        calls: Cell<usize>,
        last_window: Cell<Option<FetchWindow>>,
    }

    impl StaticSource {
        fn new(records: Vec<ReportRecord>) -> Self {
            Self {
                records,
                ..Self::default()
            }
        }
    }

    impl ReportSource for StaticSource {
        type Error = SourceDown;

        fn fetch_window(&self, window: &FetchWindow) -> Result<Vec<ReportRecord>, Self::Error> {
            self.calls.set(self.calls.get() + 1);
            self.last_window.set(Some(*window));
            if self.fail {
                return Err(SourceDown);
            }
            Ok(self.records.clone())
        }
    }

    // 2024-05-15T12:00:00Z
    const NOW: i64 = 1_715_774_400;
    // 2024-05-10T09:00:00Z
    const T: i64 = 1_715_331_600;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(NOW, 0).unwrap()
    }

    fn options() -> CycleOptions {
        CycleOptions {
            days: 30,
            now: now(),
        }
    }

    fn record(id: i64, billable: bool, start: i64) -> ReportRecord {
        let start = DateTime::from_timestamp(start, 0)
            .unwrap()
            .with_timezone(&FixedOffset::east_opt(0).unwrap());
        ReportRecord {
            id,
            user: Some("ana".to_string()),
            description: Some(format!("task {id}")),
            project: Some("Website".to_string()),
            client: Some("Acme".to_string()),
            duration: 1_800_000,
            billable,
            start,
        }
    }

    fn entry(id: i64, billable: bool, date: i64) -> Entry {
        Entry::from(record(id, billable, date))
    }

    #[test]
    fn two_cycles_report_prior_billable_value() {
        let mut store = MemoryStore::default();

        let first = StaticSource::new(vec![record(42, true, T)]);
        let report = run_cycle(&first, &mut store, &options(), &Utc).unwrap();
        assert!(!report.has_changes());
        assert_eq!(store.rows.get(&42), Some(&entry(42, true, T)));

        let second = StaticSource::new(vec![record(42, false, T)]);
        let report = run_cycle(&second, &mut store, &options(), &Utc).unwrap();
        assert_eq!(report.changes, vec![entry(42, true, T)]);
        assert!(!store.rows[&42].billable);
    }

    #[test]
    fn repeated_cycle_is_idempotent() {
        let source = StaticSource::new(vec![record(1, true, T), record(2, false, T)]);
        let mut store = MemoryStore::default();

        run_cycle(&source, &mut store, &options(), &Utc).unwrap();
        let after_first = store.rows.clone();
        let report = run_cycle(&source, &mut store, &options(), &Utc).unwrap();

        assert_eq!(store.rows, after_first);
        assert_eq!(report.upserted, 2);
        assert!(report.changes.is_empty());
    }

    #[test]
    fn prunes_at_or_before_cutoff_only() {
        let cutoff = prune_cutoff(now(), 30).unwrap();
        let mut store = MemoryStore::with_entries([
            entry(1, true, cutoff),
            entry(2, true, cutoff + 1),
            entry(3, true, cutoff - 86_400),
        ]);

        let report = run_cycle(&StaticSource::default(), &mut store, &options(), &Utc).unwrap();
        assert_eq!(report.cutoff, cutoff);
        assert_eq!(report.pruned, 2);
        assert_eq!(store.rows.keys().copied().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn cutoff_follows_now_not_fetched_data() {
        // Entry fetched this cycle but older than the window is still pruned.
        let old = NOW - 40 * 86_400;
        let source = StaticSource::new(vec![record(5, true, old)]);
        let mut store = MemoryStore::default();

        let report = run_cycle(&source, &mut store, &options(), &Utc).unwrap();
        assert_eq!(report.upserted, 1);
        assert_eq!(report.pruned, 1);
        assert!(store.rows.is_empty());
    }

    #[test]
    fn fetch_window_ends_today() {
        let source = StaticSource::default();
        let mut store = MemoryStore::default();
        run_cycle(&source, &mut store, &options(), &Utc).unwrap();

        let window = source.last_window.get().unwrap();
        assert_eq!(window.until.to_string(), "2024-05-15");
        assert_eq!(window.since.to_string(), "2024-04-15");
    }

    #[test]
    fn fetch_window_follows_local_calendar() {
        // 2024-05-16T07:30:00+09:00
        let options = CycleOptions {
            days: 30,
            now: DateTime::from_timestamp(NOW + 10 * 3600 + 1800, 0).unwrap(),
        };
        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        let source = StaticSource::default();
        let mut store = MemoryStore::default();
        run_cycle(&source, &mut store, &options, &tokyo).unwrap();

        let window = source.last_window.get().unwrap();
        assert_eq!(window.until.to_string(), "2024-05-16");
        assert_eq!(window.since.to_string(), "2024-04-16");
    }

    #[test]
    fn fetch_failure_leaves_store_untouched() {
        let source = StaticSource {
            fail: true,
            ..StaticSource::new(vec![record(1, false, T)])
        };
        let mut store = MemoryStore::with_entries([entry(1, true, T)]);

        let err = run_cycle(&source, &mut store, &options(), &Utc).unwrap_err();
        assert!(matches!(err, ReconcileError::Fetch(_)));
        assert!(!store.initialized);
        assert_eq!(store.lookups.get(), 0);
        assert!(store.rows[&1].billable);
    }

    #[test]
    fn upsert_failure_skips_prune() {
        let source = StaticSource::new(vec![record(1, false, T)]);
        let cutoff = prune_cutoff(now(), 30).unwrap();
        let mut store = MemoryStore {
            fail_upsert: true,
            ..MemoryStore::with_entries([entry(1, true, T), entry(9, true, cutoff)])
        };

        let err = run_cycle(&source, &mut store, &options(), &Utc).unwrap_err();
        assert!(matches!(err, ReconcileError::StorageWrite(_)));
        assert!(store.rows[&1].billable);
        assert!(store.rows.contains_key(&9));
    }

    #[test]
    fn init_and_lookup_failures_are_classified() {
        let source = StaticSource::new(vec![record(1, false, T)]);

        let mut store = MemoryStore {
            fail_init: true,
            ..MemoryStore::default()
        };
        let err = run_cycle(&source, &mut store, &options(), &Utc).unwrap_err();
        assert!(matches!(err, ReconcileError::StorageInit(_)));

        let mut store = MemoryStore {
            fail_lookup: true,
            ..MemoryStore::default()
        };
        let err = run_cycle(&source, &mut store, &options(), &Utc).unwrap_err();
        assert!(matches!(err, ReconcileError::StorageRead(_)));
        assert!(store.rows.is_empty());
    }

    #[test]
    fn prune_failure_is_a_write_error() {
        let source = StaticSource::new(vec![record(1, true, T)]);
        let mut store = MemoryStore {
            fail_delete: true,
            ..MemoryStore::default()
        };
        let err = run_cycle(&source, &mut store, &options(), &Utc).unwrap_err();
        assert!(matches!(err, ReconcileError::StorageWrite(_)));
    }

    #[test]
    fn zero_day_window_is_rejected_before_fetch() {
        let source = StaticSource::default();
        let mut store = MemoryStore::default();
        let options = CycleOptions {
            days: 0,
            now: now(),
        };

        let err = run_cycle(&source, &mut store, &options, &Utc).unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidWindow { days: 0 }));
        assert_eq!(source.calls.get(), 0);
    }
}
