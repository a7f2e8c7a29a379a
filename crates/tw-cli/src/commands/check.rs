//! Check command: one reconciliation cycle against Toggl.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, TimeZone, Utc};
use clap::Args;
use tw_core::{CycleOptions, CycleReport, EntryStore, ReportSource, run_cycle};
use tw_db::LazyDatabase;

use crate::Config;
use crate::source::TogglSource;

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Amount of days to check (and to keep cached).
    #[arg(short, long)]
    pub days: Option<u32>,
}

pub fn run<W: Write>(writer: &mut W, args: &CheckArgs, config: &Config) -> Result<CycleReport> {
    let token = config.api_token()?;
    let source = TogglSource::new(token, config)?;
    // Nothing touches the cache file until the report has been fetched.
    let mut db = LazyDatabase::new(&config.database_path);

    let options = CycleOptions {
        days: args.days.unwrap_or(config.days),
        now: Utc::now(),
    };
    reconcile(writer, &source, &mut db, &options, &Local)
}

/// Runs a cycle and writes the change report; nothing is written on failure.
pub fn reconcile<W, R, S, Tz>(
    writer: &mut W,
    source: &R,
    store: &mut S,
    options: &CycleOptions,
    tz: &Tz,
) -> Result<CycleReport>
where
    W: Write,
    R: ReportSource,
    S: EntryStore,
    Tz: TimeZone,
{
    let report = run_cycle(source, store, options, tz).context("reconciliation failed")?;
    render(writer, &report, tz)?;
    Ok(report)
}

/// Writes either the change lines or the all-clear message.
pub fn render<W: Write, Tz: TimeZone>(writer: &mut W, report: &CycleReport, tz: &Tz) -> Result<()> {
    if !report.has_changes() {
        writeln!(writer, "Finished checking, nothing suspicious")?;
        return Ok(());
    }

    writeln!(writer, "Something has changed, please double-check")?;
    for change in &report.changes {
        let date = change.date_in(tz).map_or_else(
            || format_raw_timestamp(change.date),
            |date| date.format("%Y-%m-%d").to_string(),
        );
        writeln!(
            writer,
            "Description: {}, project: {}, client: {}, billable: {}, date: {}",
            change.description, change.project, change.client, change.billable, date
        )?;
    }
    Ok(())
}

fn format_raw_timestamp(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map_or_else(|| format!("@{timestamp}"), |dt| dt.to_rfc3339())
}
