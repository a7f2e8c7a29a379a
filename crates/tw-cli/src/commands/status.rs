//! Status command for summarizing the local entry cache.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{Local, TimeZone};
use tw_core::local_date;
use tw_db::{Database, EntryStats};

use crate::Config;

pub fn run<W: Write>(writer: &mut W, config: &Config) -> Result<()> {
    let db = Database::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;
    let stats = db.entry_stats()?;
    render(writer, config, &stats, &Local)
}

fn render<W: Write, Tz: TimeZone>(
    writer: &mut W,
    config: &Config,
    stats: &EntryStats,
    tz: &Tz,
) -> Result<()> {
    writeln!(writer, "toggl-watch status")?;
    writeln!(writer, "Database: {}", config.database_path.display())?;
    writeln!(writer, "Window:   {} days", config.days)?;

    let (Some(oldest), Some(newest)) = (stats.oldest, stats.newest) else {
        writeln!(writer, "No entries cached.")?;
        return Ok(());
    };

    writeln!(
        writer,
        "Entries:  {} ({} billable)",
        stats.total, stats.billable
    )?;
    writeln!(
        writer,
        "Range:    {} .. {}",
        format_day(oldest, tz),
        format_day(newest, tz)
    )?;
    Ok(())
}

fn format_day<Tz: TimeZone>(timestamp: i64, tz: &Tz) -> String {
    local_date(timestamp, tz).map_or_else(
        || timestamp.to_string(),
        |date| date.format("%Y-%m-%d").to_string(),
    )
}
