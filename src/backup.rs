//! Scheduled copies of the per-guild database files.

use chrono::{NaiveDate, Timelike, Utc};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Loop that copies every guild database once a day at the configured UTC
/// hour. Spawned at startup when backups are enabled. Ticks every minute so a
/// tick drifting past the hour boundary (or a suspended host) cannot skip a
/// day; a tick landing after the hour still runs that day's backup, late.
pub async fn start_backup_task(database_dir: String, backup_dir: String, hour_utc: u32) {
    info!(
        "Backup task started, copying `{}` to `{}` daily at {:02}:00 UTC",
        database_dir, backup_dir, hour_utc
    );
    let mut ticker = tokio::time::interval(Duration::from_secs(60));
    let mut last_run: Option<NaiveDate> = None;
    loop {
        ticker.tick().await;
        let now = Utc::now();
        if !backup_due(now.hour(), hour_utc, now.date_naive(), last_run) {
            continue;
        }
        last_run = Some(now.date_naive());
        match run_backup(&database_dir, &backup_dir) {
            Ok(copied) => info!("Backup complete, {} file(s) copied", copied),
            Err(err) => warn!("Backup failed: {}", err),
        }
    }
}

/// Whether a backup should run now: at or past the configured hour, and not
/// already run today.
fn backup_due(
    hour_now: u32,
    hour_target: u32,
    today: NaiveDate,
    last_run: Option<NaiveDate>,
) -> bool {
    hour_now >= hour_target && last_run != Some(today)
}

/// Copies every `.db3` file into the backup directory with a timestamp
/// suffix. A file that fails to copy is logged and skipped so one bad file
/// does not abort the rest of the run.
pub fn run_backup(database_dir: &str, backup_dir: &str) -> std::io::Result<usize> {
    if !Path::new(database_dir).exists() {
        return Ok(0);
    }
    fs::create_dir_all(backup_dir)?;

    let stamp = Utc::now().format("%Y%m%d%H%M%S");
    let mut copied = 0;
    for entry in fs::read_dir(database_dir)? {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("db3") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        let dest = Path::new(backup_dir).join(format!("{stem}-{stamp}.db3"));
        match fs::copy(&path, &dest) {
            Ok(_) => copied += 1,
            Err(err) => warn!("Could not back up {}: {}", path.display(), err),
        }
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch_dir(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("flarebot-{}-{}", label, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_backup_copies_only_database_files() {
        let src = scratch_dir("backup-src");
        let dst = scratch_dir("backup-dst");
        fs::write(src.join("100.db3"), b"a").unwrap();
        fs::write(src.join("200.db3"), b"b").unwrap();
        fs::write(src.join("notes.txt"), b"c").unwrap();

        let copied = run_backup(src.to_str().unwrap(), dst.to_str().unwrap()).unwrap();
        assert_eq!(copied, 2);

        let names: Vec<String> = fs::read_dir(&dst)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.iter().all(|n| n.ends_with(".db3")));
        assert!(names.iter().any(|n| n.starts_with("100-")));

        let _ = fs::remove_dir_all(&src);
        let _ = fs::remove_dir_all(&dst);
    }

    #[test]
    fn test_backup_due_once_per_day() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 25).unwrap();
        let yesterday = today.pred_opt().unwrap();

        // Not yet the configured hour.
        assert!(!backup_due(4, 5, today, None));
        assert!(backup_due(5, 5, today, None));

        // A tick that drifted past the hour still fires that day.
        assert!(backup_due(7, 5, today, None));
        assert!(backup_due(23, 5, today, Some(yesterday)));

        // Never twice on the same day.
        assert!(!backup_due(5, 5, today, Some(today)));
        assert!(!backup_due(23, 5, today, Some(today)));
    }

    #[test]
    fn test_backup_missing_source_is_empty() {
        let dst = scratch_dir("backup-none");
        let copied = run_backup("/nonexistent/flarebot-src", dst.to_str().unwrap()).unwrap();
        assert_eq!(copied, 0);
        let _ = fs::remove_dir_all(&dst);
    }
}
