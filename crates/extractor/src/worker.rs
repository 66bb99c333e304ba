//! Background batch worker
//!
//! One blocking thread per batch walks the selected files in order and runs
//! the per-file pipeline on each. Everything the shell needs to know (file
//! boundaries, log lines, the final tally) is sent back as [`WorkerEvent`]s
//! over an unbounded channel; the worker never touches shell state.

use crate::logging::{LogLevel, LogSink};
use crate::pipeline::{process_file, FileResult, ProcessingConfig};
use crate::runner::ToolRunner;
use crate::startup::ToolPaths;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Progress notification from the worker to the shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    BatchStarted { total: usize },
    FileStarted { index: usize, path: PathBuf },
    FileFinished { path: PathBuf, success: bool },
    Log { level: LogLevel, message: String },
    BatchFinished { succeeded: usize, failed: usize },
}

/// Tally of a finished batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub results: Vec<FileResult>,
}

impl BatchSummary {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}

/// Log sink that forwards lines as [`WorkerEvent::Log`]
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: UnboundedSender<WorkerEvent>,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<WorkerEvent>) -> Self {
        Self { tx }
    }

    fn send(&self, event: WorkerEvent) {
        // A dropped receiver only means nobody is listening any more
        let _ = self.tx.send(event);
    }
}

impl LogSink for ChannelSink {
    fn log(&self, level: LogLevel, message: &str) {
        self.send(WorkerEvent::Log {
            level,
            message: message.to_string(),
        });
    }
}

/// Process `files` sequentially, reporting through `sink`.
///
/// Runs to completion; a failed file never stops the batch.
pub fn run_batch<R: ToolRunner + ?Sized>(
    files: &[PathBuf],
    config: &ProcessingConfig,
    tools: &ToolPaths,
    runner: &R,
    sink: &ChannelSink,
) -> BatchSummary {
    let mut summary = BatchSummary::default();
    sink.send(WorkerEvent::BatchStarted { total: files.len() });
    sink.info(&format!(
        "Starting batch: {} file(s), mode {}, codec {}",
        files.len(),
        config.mode,
        config.codec
    ));

    for (index, path) in files.iter().enumerate() {
        debug!(file = %path.display(), index, "Processing file");
        sink.send(WorkerEvent::FileStarted {
            index,
            path: path.clone(),
        });
        sink.info(&format!("[INFO] Processing file: {}", path.display()));

        let result = process_file(path, config, tools, runner, sink);
        let success = result.success();
        if success {
            sink.info(&format!("[SUCCESS] Finished processing {}", result.file_name));
        } else {
            sink.error(&format!("[FAILED] Errors while processing {}", result.file_name));
        }

        sink.send(WorkerEvent::FileFinished {
            path: path.clone(),
            success,
        });
        summary.results.push(result);
    }

    let (succeeded, failed) = (summary.succeeded(), summary.failed());
    sink.info(&format!(
        "Batch finished: {} succeeded, {} failed",
        succeeded, failed
    ));
    sink.send(WorkerEvent::BatchFinished { succeeded, failed });
    info!(succeeded, failed, "Batch finished");
    summary
}

/// Handle to a running batch
pub struct BatchWorker {
    handle: JoinHandle<BatchSummary>,
}

impl BatchWorker {
    /// Start a batch on the blocking pool, returning the event stream
    pub fn spawn(
        files: Vec<PathBuf>,
        config: ProcessingConfig,
        tools: ToolPaths,
        runner: Arc<dyn ToolRunner>,
    ) -> (Self, UnboundedReceiver<WorkerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = ChannelSink::new(tx);
        let handle = tokio::task::spawn_blocking(move || {
            run_batch(&files, &config, &tools, &*runner, &sink)
        });
        (Self { handle }, rx)
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the worker thread to exit
    pub async fn join(self) -> Option<BatchSummary> {
        self.handle.await.ok()
    }
}
