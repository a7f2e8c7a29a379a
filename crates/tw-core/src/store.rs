//! Persistent entry store capability.

use crate::entry::Entry;

/// A keyed, persistent table of entries.
///
/// Implementations must make [`upsert_all`](Self::upsert_all) atomic: either
/// every entry in the batch is written or none is.
pub trait EntryStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Creates the backing table if it does not exist yet. Idempotent.
    fn ensure_initialized(&mut self) -> Result<(), Self::Error>;

    /// Returns the stored entry for `id`, or `None` if it has never been seen.
    fn fetch_by_id(&self, id: i64) -> Result<Option<Entry>, Self::Error>;

    /// Writes every entry, replacing any stored row with the same `id`.
    ///
    /// Returns the number of entries written.
    fn upsert_all(&mut self, entries: &[Entry]) -> Result<usize, Self::Error>;

    /// Deletes every entry whose `date` is at or before `cutoff`.
    ///
    /// Returns the number of entries removed.
    fn delete_older_than(&mut self, cutoff: i64) -> Result<usize, Self::Error>;
}
