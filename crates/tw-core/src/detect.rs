//! Billable-flag change detection.

use crate::entry::Entry;
use crate::store::EntryStore;

/// Returns the stored entries whose billable flag differs from the incoming
/// entry with the same id.
///
/// The *stored* version is reported, i.e. the value before it gets
/// overwritten. Ids the store has never seen are not changes. This must run
/// before the incoming entries are upserted, otherwise nothing can differ.
pub fn detect_changes<S: EntryStore>(
    incoming: &[Entry],
    store: &S,
) -> Result<Vec<Entry>, S::Error> {
    let mut changes = Vec::new();
    for entry in incoming {
        let Some(stored) = store.fetch_by_id(entry.id)? else {
            continue;
        };
        if stored.billable_differs(entry) {
            tracing::debug!(
                id = entry.id,
                was = stored.billable,
                now = entry.billable,
                "billable flag changed"
            );
            changes.push(stored);
        }
    }
    Ok(changes)
}
