//! Index statistics.
//!
//! A quick summary of what is indexed: entry counts by kind, the on-disk
//! size of the database, and when (and from where) it was last reconciled.
//! Used by `locatex stats` to confirm that updates are landing.

use anyhow::Result;

use crate::config::Config;
use crate::store::IndexStore;

/// Run the stats command: open the index and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let path = &config.index.path;
    if !path.exists() {
        println!("No index at {}. Run `locatex update` first.", path.display());
        return Ok(());
    }

    let store = IndexStore::from_config(&config.index).await?;
    let counts = store.count().await?;
    let last = store.last_reconciliation().await?;
    store.close().await;

    // The WAL holds committed pages not yet checkpointed into the main file
    let db_size = file_len(path) + file_len(&wal_path(path));

    println!("locatex index stats");
    println!("===================");
    println!();
    println!("  Index:        {}", path.display());
    println!("  Size:         {}", format_bytes(db_size));
    println!();
    println!("  Files:        {}", counts.files);
    println!("  Directories:  {}", counts.directories);
    println!("  Total:        {}", counts.total());
    println!();

    match last {
        Some(run) => {
            println!(
                "  Last update:  {} ({})",
                format_ts_relative(run.finished_at.timestamp()),
                run.source
            );
            println!(
                "                +{} ~{} -{} ={}",
                run.summary.inserted,
                run.summary.updated,
                run.summary.deleted,
                run.summary.unchanged
            );
        }
        None => println!("  Last update:  never"),
    }
    println!();

    Ok(())
}

fn file_len(path: &std::path::Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

fn wal_path(path: &std::path::Path) -> std::path::PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push("-wal");
    name.into()
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp relative to now (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;
    if delta < 0 {
        return format_ts_iso(ts);
    }

    let plural = |n: i64| if n == 1 { "" } else { "s" };
    match delta {
        0..=59 => "just now".to_string(),
        60..=3599 => format!("{} min{} ago", delta / 60, plural(delta / 60)),
        3600..=86399 => format!("{} hour{} ago", delta / 3600, plural(delta / 3600)),
        _ if delta < 86400 * 30 => format!("{} day{} ago", delta / 86400, plural(delta / 86400)),
        _ => format_ts_iso(ts),
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_thresholds() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn relative_timestamps() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 60), "1 min ago");
        assert_eq!(format_ts_relative(now - 7200), "2 hours ago");
        assert_eq!(format_ts_relative(now - 86400 * 3), "3 days ago");
        assert_eq!(format_ts_relative(0), "1970-01-01 00:00");
    }

    #[test]
    fn wal_sits_next_to_database() {
        let wal = wal_path(std::path::Path::new("/tmp/index.db"));
        assert_eq!(wal, std::path::PathBuf::from("/tmp/index.db-wal"));
    }
}
