//! Cron-driven cleanup of per-job log files.
//!
//! Each pass lists the log directory, keeps every file whose job is still
//! running (or unknown), and deletes files of finished jobs once they are
//! older than the configured keep time. Job ids are the first standalone
//! 18-digit number in the file name (e.g. `job-862969647010611201.log`);
//! files without one are subject to the keep time alone.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use cron::Schedule;
use parking_lot::Mutex;
use regex::Regex;
use syncline_connectors::{ConfigError, ConnectorConfig};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::EngineError;
use crate::job_history::JobHistory;

/// Standalone 18-digit job id.
static JOB_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{18})\b").expect("job id pattern is valid"));

/// Log retention settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRetentionConfig {
    /// 5-field UNIX cron expression for clean passes.
    pub cron: String,
    /// Minimum age before a finished job's log file is deleted.
    pub keep_time: Duration,
    /// File name prefix of job log files.
    pub prefix: String,
    /// Log directory.
    pub path: PathBuf,
}

impl LogRetentionConfig {
    /// Default schedule: hourly, on the hour.
    pub const DEFAULT_CRON: &'static str = "0 * * * *";
    /// Default keep time: one day.
    pub const DEFAULT_KEEP_TIME: Duration = Duration::from_secs(24 * 60 * 60);
    /// Default file prefix.
    pub const DEFAULT_PREFIX: &'static str = "job";

    /// Creates a config for `path` with default schedule, keep time, and prefix.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            cron: Self::DEFAULT_CRON.to_string(),
            keep_time: Self::DEFAULT_KEEP_TIME,
            prefix: Self::DEFAULT_PREFIX.to_string(),
            path: path.into(),
        }
    }

    /// Parses `log.retention.*` properties.
    ///
    /// # Recognized keys
    ///
    /// - `log.retention.path` (required)
    /// - `log.retention.cron`
    /// - `log.retention.keep.time.ms`
    /// - `log.retention.prefix`
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Config` on missing or unparsable values and
    /// `EngineError::InvalidCron` on a bad schedule.
    pub fn from_config(config: &ConnectorConfig) -> Result<Self, EngineError> {
        let mut cfg = Self::new(config.require("log.retention.path")?);
        if let Some(cron) = config.get("log.retention.cron") {
            cfg.cron = cron.trim().to_string();
        }
        if let Some(ms) = config.get_parsed::<u64>("log.retention.keep.time.ms")? {
            cfg.keep_time = Duration::from_millis(ms);
        }
        if let Some(prefix) = config.get("log.retention.prefix") {
            if prefix.is_empty() {
                return Err(ConfigError::Invalid("log.retention.prefix must not be empty".into()).into());
            }
            cfg.prefix = prefix.to_string();
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates the cron expression.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidCron` if the expression does not parse.
    pub fn validate(&self) -> Result<(), EngineError> {
        parse_cron(&self.cron).map(|_| ())
    }
}

/// Parses a 5-field UNIX cron expression (minute hour day month weekday).
///
/// Weekdays follow UNIX numbering: `0` and `7` are Sunday, `1` is Monday.
///
/// # Errors
///
/// Returns `EngineError::InvalidCron` if the expression does not have five
/// fields or does not parse.
pub fn parse_cron(expression: &str) -> Result<Schedule, EngineError> {
    let invalid = |reason: String| EngineError::InvalidCron {
        expression: expression.to_string(),
        reason,
    };
    let mut fields: Vec<String> = expression.split_whitespace().map(String::from).collect();
    if fields.len() != 5 {
        return Err(invalid(format!("expected 5 fields, found {}", fields.len())));
    }
    fields[4] = unix_day_of_week(&fields[4]).map_err(invalid)?;
    // The parser expects a leading seconds field.
    Schedule::from_str(&format!("0 {}", fields.join(" "))).map_err(|e| invalid(e.to_string()))
}

/// Rewrites a numeric UNIX day-of-week field into the parser's numbering,
/// where Sunday is `1` and Saturday `7`. Day names pass through unchanged.
fn unix_day_of_week(field: &str) -> Result<String, String> {
    if field == "*" || field == "?" {
        return Ok(field.to_string());
    }

    let mut named = Vec::new();
    let mut days = BTreeSet::new();
    for item in field.split(',') {
        let (base, step) = match item.split_once('/') {
            Some((base, step)) => match step.parse::<usize>() {
                Ok(step) if step > 0 => (base, Some(step)),
                _ => return Err(format!("invalid step in day of week '{item}'")),
            },
            None => (item, None),
        };
        let range = if base == "*" {
            Some((0, 6))
        } else if let Some((start, end)) = base.split_once('-') {
            start.parse::<u8>().ok().zip(end.parse::<u8>().ok())
        } else {
            base.parse::<u8>()
                .ok()
                .map(|day| (day, if step.is_some() { 6 } else { day }))
        };
        let Some((start, end)) = range else {
            named.push(item.to_string());
            continue;
        };
        if start > end || end > 7 {
            return Err(format!("day of week out of range: '{item}'"));
        }
        for day in (start..=end).step_by(step.unwrap_or(1)) {
            days.insert(if day == 7 { 1 } else { day + 1 });
        }
    }

    named.extend(days.into_iter().map(|day| day.to_string()));
    Ok(named.join(","))
}

/// Outcome of one clean pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanReport {
    /// Files deleted.
    pub deleted: usize,
    /// Files kept because their job is running or unknown.
    pub skipped_running: usize,
    /// Files not yet older than the keep time.
    pub retained: usize,
    /// Files that could not be inspected or deleted.
    pub failed: usize,
}

/// One directory's clean pass, independent of any schedule.
#[derive(Clone)]
pub struct LogCleaner {
    dir: PathBuf,
    prefix: String,
    keep_time: Duration,
    history: Arc<dyn JobHistory>,
}

impl LogCleaner {
    /// Creates a cleaner for `config.path`.
    #[must_use]
    pub fn new(config: &LogRetentionConfig, history: Arc<dyn JobHistory>) -> Self {
        Self {
            dir: config.path.clone(),
            prefix: config.prefix.clone(),
            keep_time: config.keep_time,
            history,
        }
    }

    /// The directory this cleaner works on.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Extracts the job id from a log file name.
    #[must_use]
    pub fn job_id(file_name: &str) -> Option<u64> {
        JOB_ID
            .captures(file_name)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }

    /// Runs one pass against the current wall-clock time.
    ///
    /// # Errors
    ///
    /// `InvalidDirectory` if the directory is missing; `Io` if it cannot be listed.
    pub fn clean_once(&self) -> Result<CleanReport, EngineError> {
        self.clean_at(SystemTime::now())
    }

    /// Runs one pass treating `now` as the current time.
    ///
    /// # Errors
    ///
    /// `InvalidDirectory` if the directory is missing; `Io` if it cannot be listed.
    pub fn clean_at(&self, now: SystemTime) -> Result<CleanReport, EngineError> {
        if !self.dir.is_dir() {
            return Err(EngineError::InvalidDirectory(self.dir.clone()));
        }

        let mut report = CleanReport::default();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if !name.starts_with(&self.prefix) {
                continue;
            }
            let metadata = match entry.metadata() {
                Ok(m) if m.is_file() => m,
                Ok(_) => continue,
                Err(e) => {
                    warn!(file = name, error = %e, "cannot stat log file");
                    report.failed += 1;
                    continue;
                }
            };

            if let Some(job_id) = Self::job_id(name) {
                let status = self.history.job_status(job_id);
                if !status.is_some_and(|s| s.is_end_state()) {
                    debug!(file = name, job_id, status = ?status, "job not ended, keeping log file");
                    report.skipped_running += 1;
                    continue;
                }
            }

            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or(Duration::ZERO);
            if age <= self.keep_time {
                report.retained += 1;
                continue;
            }

            match std::fs::remove_file(entry.path()) {
                Ok(()) => {
                    info!(file = name, age_secs = age.as_secs(), "deleted log file");
                    report.deleted += 1;
                }
                Err(e) => {
                    error!(file = name, error = %e, "[SYN-7003] failed to delete log file");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }
}

/// Background service running [`LogCleaner`] passes on a cron schedule.
pub struct LogRetentionService {
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LogRetentionService {
    /// Validates `config` and spawns the scheduling task.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidCron` if the schedule does not parse.
    pub fn start(
        config: &LogRetentionConfig,
        history: Arc<dyn JobHistory>,
    ) -> Result<Self, EngineError> {
        let schedule = parse_cron(&config.cron)?;
        info!(
            cron = %config.cron,
            keep_secs = config.keep_time.as_secs(),
            prefix = %config.prefix,
            path = %config.path.display(),
            "starting log retention service"
        );

        let cancel = CancellationToken::new();
        let cleaner = LogCleaner::new(config, history);
        let task = tokio::spawn(run_schedule(schedule, cleaner, cancel.clone()));
        Ok(Self {
            cancel,
            task: Mutex::new(Some(task)),
        })
    }

    /// Whether the scheduling task is still alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Stops the schedule and waits for an in-progress pass to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "log retention task ended abnormally");
            }
        }
    }
}

impl Drop for LogRetentionService {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Time until the next fire of `schedule` after `now`.
pub(crate) fn next_delay(schedule: &Schedule, now: DateTime<Utc>) -> Option<Duration> {
    let next = schedule.after(&now).next()?;
    Some((next - now).to_std().unwrap_or(Duration::ZERO))
}

async fn run_schedule(schedule: Schedule, cleaner: LogCleaner, cancel: CancellationToken) {
    loop {
        let Some(delay) = next_delay(&schedule, Utc::now()) else {
            error!("[SYN-7004] log retention schedule has no future fire time, stopping");
            return;
        };
        debug!(delay_ms = delay.as_millis(), "next log clean pass scheduled");

        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(delay) => {}
        }

        let pass = cleaner.clone();
        match tokio::task::spawn_blocking(move || pass.clean_once()).await {
            Ok(Ok(report)) => info!(
                deleted = report.deleted,
                skipped_running = report.skipped_running,
                retained = report.retained,
                failed = report.failed,
                "log clean pass completed"
            ),
            Ok(Err(e)) => error!(dir = %cleaner.dir().display(), error = %e, "log clean pass failed"),
            Err(e) => error!(error = %e, "log clean pass panicked"),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::job_history::{InMemoryJobHistory, JobStatus};

    const FINISHED: u64 = 100_000_000_000_000_001;
    const RUNNING: u64 = 100_000_000_000_000_002;
    const CANCELED: u64 = 100_000_000_000_000_003;
    const UNKNOWN: u64 = 100_000_000_000_000_004;

    fn history() -> Arc<InMemoryJobHistory> {
        let history = Arc::new(InMemoryJobHistory::new());
        history.set_status(FINISHED, JobStatus::Finished);
        history.set_status(RUNNING, JobStatus::Running);
        history.set_status(CANCELED, JobStatus::Canceled);
        history
    }

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"log line\n").unwrap();
        path
    }

    #[test]
    fn test_parse_cron_accepts_unix_expressions() {
        assert!(parse_cron("0 * * * *").is_ok());
        assert!(parse_cron("*/15 2 * * *").is_ok());
    }

    #[test]
    fn test_parse_cron_rejects_bad_expressions() {
        let err = parse_cron("0 * * *").unwrap_err();
        assert!(matches!(err, EngineError::InvalidCron { .. }));
        assert!(err.to_string().contains("SYN-7001"));
        assert!(parse_cron("0 0 * * * *").is_err());
        assert!(parse_cron("61 * * * *").is_err());
    }

    fn next_fire(expression: &str, now: DateTime<Utc>) -> DateTime<Utc> {
        parse_cron(expression).unwrap().after(&now).next().unwrap()
    }

    #[test]
    fn test_parse_cron_uses_unix_weekdays() {
        // Saturday.
        let now = Utc.with_ymd_and_hms(2024, 3, 2, 10, 0, 0).unwrap();
        let sunday = Utc.with_ymd_and_hms(2024, 3, 3, 0, 0, 0).unwrap();
        let monday = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();

        assert_eq!(next_fire("0 0 * * 1", now), monday);
        assert_eq!(next_fire("0 0 * * 0", now), sunday);
        assert_eq!(next_fire("0 0 * * 7", now), sunday);
        assert_eq!(next_fire("0 0 * * 1-5", now), monday);
        assert_eq!(next_fire("0 0 * * 5-7", now), sunday);
        assert_eq!(next_fire("0 0 * * 1,3", now), monday);
        assert_eq!(next_fire("0 0 * * MON", now), monday);
        assert_eq!(next_fire("0 0 * * */2", now), sunday);
    }

    #[test]
    fn test_parse_cron_rejects_bad_weekdays() {
        assert!(parse_cron("0 0 * * 8").is_err());
        assert!(parse_cron("0 0 * * 5-2").is_err());
        assert!(parse_cron("0 0 * * 1/0").is_err());
    }

    #[test]
    fn test_next_delay_hourly() {
        let schedule = parse_cron("0 * * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 0).unwrap();
        assert_eq!(
            next_delay(&schedule, now),
            Some(Duration::from_secs(45 * 60))
        );
    }

    #[test]
    fn test_config_from_properties() {
        let props = ConnectorConfig::new("engine")
            .with_property("log.retention.path", "/var/log/syncline")
            .with_property("log.retention.cron", "30 3 * * *")
            .with_property("log.retention.keep.time.ms", "60000")
            .with_property("log.retention.prefix", "task");
        let cfg = LogRetentionConfig::from_config(&props).unwrap();
        assert_eq!(cfg.cron, "30 3 * * *");
        assert_eq!(cfg.keep_time, Duration::from_secs(60));
        assert_eq!(cfg.prefix, "task");
        assert_eq!(cfg.path, PathBuf::from("/var/log/syncline"));
    }

    #[test]
    fn test_config_defaults_and_errors() {
        let props = ConnectorConfig::new("engine").with_property("log.retention.path", "/tmp/logs");
        let cfg = LogRetentionConfig::from_config(&props).unwrap();
        assert_eq!(cfg.cron, LogRetentionConfig::DEFAULT_CRON);
        assert_eq!(cfg.keep_time, LogRetentionConfig::DEFAULT_KEEP_TIME);
        assert_eq!(cfg.prefix, "job");

        let missing = LogRetentionConfig::from_config(&ConnectorConfig::new("engine")).unwrap_err();
        assert_eq!(missing.code(), Some("SYN-0002"));

        let bad_cron = props.clone().with_property("log.retention.cron", "hourly");
        assert!(matches!(
            LogRetentionConfig::from_config(&bad_cron),
            Err(EngineError::InvalidCron { .. })
        ));
    }

    #[test]
    fn test_job_id_extraction() {
        assert_eq!(LogCleaner::job_id("job-100000000000000001.log"), Some(FINISHED));
        assert_eq!(LogCleaner::job_id("job-100000000000000001-2.log"), Some(FINISHED));
        assert_eq!(LogCleaner::job_id("job-12345.log"), None);
        assert_eq!(LogCleaner::job_id("job-1000000000000000012.log"), None);
    }

    #[test]
    fn test_clean_pass_deletes_expired_files_unless_job_is_live() {
        let dir = tempfile::tempdir().unwrap();
        let finished = touch(dir.path(), &format!("job-{FINISHED}.log"));
        let canceled = touch(dir.path(), &format!("job-{CANCELED}.log"));
        let running = touch(dir.path(), &format!("job-{RUNNING}.log"));
        let unknown = touch(dir.path(), &format!("job-{UNKNOWN}.log"));
        let no_id = touch(dir.path(), "job-console.log");
        let foreign = touch(dir.path(), &format!("gc-{FINISHED}.log"));
        std::fs::create_dir(dir.path().join(format!("job-{FINISHED}-archive"))).unwrap();

        let config = LogRetentionConfig {
            keep_time: Duration::from_secs(3600),
            ..LogRetentionConfig::new(dir.path())
        };
        let cleaner = LogCleaner::new(&config, history());

        // Nothing is old enough yet.
        let report = cleaner.clean_at(SystemTime::now()).unwrap();
        assert_eq!(
            report,
            CleanReport {
                deleted: 0,
                skipped_running: 2,
                retained: 3,
                failed: 0,
            }
        );
        assert!(no_id.exists());

        let later = SystemTime::now() + Duration::from_secs(2 * 3600);
        let report = cleaner.clean_at(later).unwrap();
        assert_eq!(report.deleted, 3);
        assert_eq!(report.skipped_running, 2);
        assert!(!finished.exists());
        assert!(!canceled.exists());
        assert!(!no_id.exists());
        assert!(running.exists());
        assert!(unknown.exists());
        assert!(foreign.exists());
    }

    #[test]
    fn test_clean_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let cleaner = LogCleaner::new(&LogRetentionConfig::new(dir.path().join("absent")), history());
        assert!(matches!(
            cleaner.clean_once(),
            Err(EngineError::InvalidDirectory(_))
        ));
    }

    #[tokio::test]
    async fn test_service_start_and_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let config = LogRetentionConfig::new(dir.path());
        let service = LogRetentionService::start(&config, history()).unwrap();
        assert!(service.is_running());

        service.shutdown().await;
        assert!(!service.is_running());
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_service_rejects_invalid_cron() {
        let config = LogRetentionConfig {
            cron: "every hour".into(),
            ..LogRetentionConfig::new("/tmp")
        };
        assert!(LogRetentionService::start(&config, history()).is_err());
    }
}
