//! Daily scheduled backups.

use crate::backup::Backups;
use crate::record::DatabaseRecord;
use chrono::{DateTime, Duration, Local, LocalResult, NaiveDateTime, TimeZone};
use tracing::{error, info};

/// Returns the first `hours`:00:00 local time strictly after `now`.
///
/// When that wall-clock time is skipped by a daylight saving change, the first valid time after
/// it is used. When it occurs twice, the earlier one is used. `hours` above 23 is treated as 23.
pub fn next_run(now: DateTime<Local>, hours: u8) -> DateTime<Local> {
    let hours = u32::from(hours.min(23));
    let mut date = now.date_naive();
    loop {
        if let Some(naive) = date.and_hms_opt(hours, 0, 0) {
            if let Some(at) = resolve_local(naive) {
                if at > now {
                    return at;
                }
            }
        }
        date = date.succ_opt().unwrap_or(date);
    }
}

fn resolve_local(naive: NaiveDateTime) -> Option<DateTime<Local>> {
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(at) => Some(at),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        // Walk forward out of the gap a minute at a time; gaps are at most a few hours.
        LocalResult::None => (1..=24 * 60).find_map(|minutes| {
            Local
                .from_local_datetime(&(naive + Duration::minutes(minutes)))
                .earliest()
        }),
    }
}

/// Backs up `record` every day at its configured hour until the process is stopped. A failed
/// backup is logged and the next one is still scheduled.
pub async fn run(backups: Backups, record: DatabaseRecord) {
    info!(
        "Scheduling backups of '{}' with cron expression '{}'",
        record.name(),
        record.cron_expression()
    );
    loop {
        let now = Local::now();
        let at = next_run(now, record.hours());
        info!("Next backup of '{}' at {at}", record.name());
        let wait = (at - now).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        match backups.backup(&record).await {
            Ok(outcome) => info!(
                "Backup file created {}, {} old backup(s) removed",
                outcome.absolute_path.display(),
                outcome.trimmed
            ),
            Err(e) => error!("Scheduled backup of '{}' failed: {e}", record.name()),
        }
    }
}
