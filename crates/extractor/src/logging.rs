//! Run log and log sinks
//!
//! User-facing progress lines flow through a [`LogSink`]. The worker's sink
//! forwards them over its event channel; the shell writes everything it
//! receives to an append-only [`RunLog`] file.

use chrono::{DateTime, Local};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Timestamp layout used for every run log line
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Severity of a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// Level name as written to the run log
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination for user-facing log lines
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);

    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    fn warn(&self, message: &str) {
        self.log(LogLevel::Warning, message);
    }

    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}

/// Sink that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LogSink for NullSink {
    fn log(&self, _level: LogLevel, _message: &str) {}
}

/// Format one run log line: `<timestamp> - <LEVEL> - <message>`
pub fn format_line(timestamp: DateTime<Local>, level: LogLevel, message: &str) -> String {
    format!(
        "{} - {} - {}",
        timestamp.format(TIMESTAMP_FORMAT),
        level.as_str(),
        message
    )
}

/// Outcome line for a step that succeeded
pub fn success_line(file_name: &str, track: &str, operation: &str, output: &Path) -> String {
    format!(
        "OK: file '{}' (track {}) - operation: '{}' - output: '{}'",
        file_name,
        track,
        operation,
        output.display()
    )
}

/// Outcome line for a step (or whole file) that failed
///
/// `track` and `output` are "N/A" when the failure is not tied to one track.
pub fn failure_line(file_name: &str, track: &str, reason: &str, output: &str) -> String {
    format!(
        "FAILED: file '{}' (track {}) - error: '{}' - attempted output: '{}'",
        file_name, track, reason, output
    )
}

/// Append-only, timestamped log file
///
/// The file is opened in append mode and never truncated or rotated.
pub struct RunLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl RunLog {
    /// Open (or create) `<dir>/<file_name>`, creating `dir` if needed
    pub fn open(dir: impl AsRef<Path>, file_name: &str) -> io::Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(file_name);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line stamped with the current local time
    pub fn append(&self, level: LogLevel, message: &str) -> io::Result<()> {
        let line = format_line(Local::now(), level, message);
        let mut file = self
            .file
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "run log lock poisoned"))?;
        writeln!(file, "{}", line)?;
        file.flush()
    }
}

impl LogSink for RunLog {
    fn log(&self, level: LogLevel, message: &str) {
        if let Err(e) = self.append(level, message) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to write run log");
        }
    }
}

/// Collects lines in memory; used by tests to assert on emitted log text.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct MemorySink {
    lines: Mutex<Vec<(LogLevel, String)>>,
}

#[cfg(test)]
impl MemorySink {
    pub(crate) fn lines(&self) -> Vec<(LogLevel, String)> {
        self.lines.lock().unwrap().clone()
    }

    pub(crate) fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|(_, line)| line.contains(needle))
    }
}

#[cfg(test)]
impl LogSink for MemorySink {
    fn log(&self, level: LogLevel, message: &str) {
        self.lines.lock().unwrap().push((level, message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_format_line_layout() {
        let ts = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let line = format_line(ts, LogLevel::Warning, "bitrate ignored");
        assert_eq!(line, "2024-03-09 07:05:01 - WARNING - bitrate ignored");
    }

    #[test]
    fn test_level_names() {
        assert_eq!(LogLevel::Debug.as_str(), "DEBUG");
        assert_eq!(LogLevel::Info.to_string(), "INFO");
        assert_eq!(LogLevel::Critical.as_str(), "CRITICAL");
        assert!(LogLevel::Error > LogLevel::Warning);
    }

    #[test]
    fn test_outcome_lines() {
        let ok = success_line("movie.mkv", "1", "copy AAC", Path::new("/m/output/movie-Track1.m4a"));
        assert_eq!(
            ok,
            "OK: file 'movie.mkv' (track 1) - operation: 'copy AAC' - output: '/m/output/movie-Track1.m4a'"
        );

        let failed = failure_line("movie.mkv", "N/A", "no audio track detected", "N/A");
        assert_eq!(
            failed,
            "FAILED: file 'movie.mkv' (track N/A) - error: 'no audio track detected' - attempted output: 'N/A'"
        );
    }

    #[test]
    fn test_run_log_appends_across_opens() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("logs");

        {
            let log = RunLog::open(&dir, "processing_log.txt").unwrap();
            log.info("first run");
        }
        let log = RunLog::open(&dir, "processing_log.txt").unwrap();
        log.error("second run");

        let content = fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" - INFO - first run"));
        assert!(lines[1].ends_with(" - ERROR - second run"));
    }

    #[test]
    fn test_memory_sink_records_levels() {
        let sink = MemorySink::default();
        sink.debug("a");
        sink.warn("b");
        assert_eq!(
            sink.lines(),
            vec![(LogLevel::Debug, "a".to_string()), (LogLevel::Warning, "b".to_string())]
        );
        assert!(sink.contains("b"));
    }
}
