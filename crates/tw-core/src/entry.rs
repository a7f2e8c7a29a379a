//! Canonical local representation of a time entry.

use chrono::{DateTime, NaiveDate, Offset, TimeZone};
use serde::{Deserialize, Serialize};

/// One time-tracking record as cached locally.
///
/// `id` is assigned by the remote system and is the primary key of the
/// local store. Storing an entry with an existing `id` replaces the prior
/// record wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: i64,
    pub user: String,
    pub description: String,
    pub project: String,
    pub client: String,
    /// Elapsed time in the provider's unit (milliseconds for Toggl reports).
    pub duration: i64,
    pub billable: bool,
    /// Unix timestamp (seconds) of when the entry started.
    pub date: i64,
}

impl Entry {
    /// Returns true if `other` carries a different billable flag.
    pub const fn billable_differs(&self, other: &Self) -> bool {
        self.billable != other.billable
    }

    /// Calendar date of the entry in the given time zone.
    ///
    /// Returns `None` if `date` is outside the range chrono can represent.
    pub fn date_in<Tz: TimeZone>(&self, tz: &Tz) -> Option<NaiveDate> {
        local_date(self.date, tz)
    }
}

/// Calendar date of a Unix timestamp (seconds) in the given time zone.
///
/// Returns `None` instead of panicking when the timestamp, or the local time
/// after applying the zone's offset, falls outside chrono's range.
pub fn local_date<Tz: TimeZone>(timestamp: i64, tz: &Tz) -> Option<NaiveDate> {
    let utc = DateTime::from_timestamp(timestamp, 0)?.naive_utc();
    let offset = tz.offset_from_utc_datetime(&utc).fix();
    utc.checked_add_offset(offset).map(|local| local.date())
}
