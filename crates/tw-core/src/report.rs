//! Remote report records and their conversion into [`Entry`] values.

use chrono::{DateTime, FixedOffset, NaiveDate, TimeDelta, TimeZone, Utc};
use serde::Deserialize;

use crate::entry::{Entry, local_date};

/// One row of a detailed report as returned by the remote source.
///
/// Field names follow the Toggl detailed report payload. Text fields the
/// provider may send as `null` are optional here and collapse to empty
/// strings on conversion.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReportRecord {
    pub id: i64,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub client: Option<String>,
    #[serde(rename = "dur")]
    pub duration: i64,
    #[serde(rename = "is_billable")]
    pub billable: bool,
    pub start: DateTime<FixedOffset>,
}

impl From<ReportRecord> for Entry {
    fn from(record: ReportRecord) -> Self {
        Self {
            id: record.id,
            user: record.user.unwrap_or_default(),
            description: record.description.unwrap_or_default(),
            project: record.project.unwrap_or_default(),
            client: record.client.unwrap_or_default(),
            duration: record.duration,
            billable: record.billable,
            date: record.start.timestamp(),
        }
    }
}

/// Converts report records into entries, one-to-one and in order.
pub fn into_entries(records: Vec<ReportRecord>) -> Vec<Entry> {
    records.into_iter().map(Entry::from).collect()
}

/// Inclusive range of calendar dates to request from the report source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub since: NaiveDate,
    pub until: NaiveDate,
}

impl FetchWindow {
    /// The trailing window of `days` days ending on the date of `now` in `tz`.
    ///
    /// Returns `None` if the start of the window cannot be represented.
    pub fn trailing<Tz: TimeZone>(now: DateTime<Utc>, days: u32, tz: &Tz) -> Option<Self> {
        let start = now.checked_sub_signed(TimeDelta::try_days(i64::from(days))?)?;
        Some(Self {
            since: local_date(start.timestamp(), tz)?,
            until: local_date(now.timestamp(), tz)?,
        })
    }
}

/// A remote source of report records.
pub trait ReportSource {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetches every report record whose start falls inside `window`.
    fn fetch_window(&self, window: &FetchWindow) -> Result<Vec<ReportRecord>, Self::Error>;
}
