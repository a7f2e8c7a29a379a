//! Core domain logic for toggl-watch.
//!
//! This crate contains:
//! - The [`Entry`] model and its conversion from remote report records
//! - Billable change detection against a persisted [`EntryStore`]
//! - The reconciliation cycle tying fetch, upsert and prune together
//!
//! Nothing here touches the network, the filesystem, the clock or the
//! environment; those arrive through [`ReportSource`], [`EntryStore`] and
//! [`CycleOptions`].

pub mod detect;
pub mod entry;
pub mod reconcile;
pub mod report;
mod store;

pub use detect::detect_changes;
pub use entry::{Entry, local_date};
pub use reconcile::{CycleOptions, CycleReport, ReconcileError, prune_cutoff, run_cycle};
pub use report::{FetchWindow, ReportRecord, ReportSource, into_entries};
pub use store::EntryStore;
