//! Interactive session state
//!
//! The [`Session`] is owned by the shell's own task. It holds the file
//! selection and the probe cache, validates start requests, and drains the
//! running worker's events. Nothing here is shared with the worker thread
//! except the immutable batch inputs handed to it at spawn time.

use crate::codec::SourceCodec;
use crate::logging::LogSink;
use crate::pipeline::ProcessingConfig;
use crate::probe::{probe_audio_tracks, StreamDescriptor};
use crate::runner::ToolRunner;
use crate::startup::{check_tools_available, StartupError, ToolPaths};
use crate::worker::{BatchWorker, WorkerEvent};
use crate::ProcessingMode;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, warn};

/// Reasons a batch cannot start
#[derive(Debug, Error)]
pub enum StartError {
    #[error("no files selected")]
    NoFiles,

    #[error("a batch is already running")]
    AlreadyRunning,

    #[error("ffmpeg tools unavailable: {0}")]
    ToolsUnavailable(#[from] StartupError),
}

/// Probe results keyed by file path; `None` records a failed probe
#[derive(Debug, Default)]
pub struct ProbeCache {
    entries: HashMap<PathBuf, Option<Vec<StreamDescriptor>>>,
}

impl ProbeCache {
    /// Cached streams for `path`, probing on a miss or when `force` is set
    pub fn get_or_probe<F>(&mut self, path: &Path, force: bool, probe: F) -> Option<&[StreamDescriptor]>
    where
        F: FnOnce(&Path) -> Option<Vec<StreamDescriptor>>,
    {
        if force || !self.entries.contains_key(path) {
            let streams = probe(path);
            self.entries.insert(path.to_path_buf(), streams);
        }
        self.entries.get(path).and_then(|s| s.as_deref())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

struct ActiveBatch {
    worker: BatchWorker,
    events: UnboundedReceiver<WorkerEvent>,
}

pub struct Session {
    files: Vec<PathBuf>,
    cache: ProbeCache,
    tools: ToolPaths,
    runner: Arc<dyn ToolRunner>,
    /// `None` skips the tool availability check
    check_timeout: Option<Duration>,
    active: Option<ActiveBatch>,
}

impl Session {
    pub fn new(tools: ToolPaths, runner: Arc<dyn ToolRunner>, check_timeout: Duration) -> Self {
        Self {
            files: Vec::new(),
            cache: ProbeCache::default(),
            tools,
            runner,
            check_timeout: Some(check_timeout),
            active: None,
        }
    }

    /// Session that never runs the tool check. For testing only.
    pub fn without_tool_checks(tools: ToolPaths, runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            check_timeout: None,
            ..Self::new(tools, runner, Duration::ZERO)
        }
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn tools(&self) -> &ToolPaths {
        &self.tools
    }

    pub fn probe_cache(&self) -> &ProbeCache {
        &self.cache
    }

    /// Replace the selection
    pub fn select_files(&mut self, paths: Vec<PathBuf>) {
        self.files = paths;
        self.cache.clear();
    }

    /// Merge dropped paths into the selection; returns how many were new
    pub fn add_dropped<I>(&mut self, paths: I) -> usize
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut seen: HashSet<PathBuf> = self.files.iter().cloned().collect();
        let before = self.files.len();

        for path in paths {
            if path.is_file() && seen.insert(path.clone()) {
                self.files.push(path);
            }
        }

        self.cache.clear();
        self.files.len() - before
    }

    /// Audio streams of `file` through the probe cache; `None` if probing failed.
    /// Probe diagnostics go to `sink`.
    pub fn audio_tracks(
        &mut self,
        file: &Path,
        force: bool,
        sink: &dyn LogSink,
    ) -> Option<Vec<StreamDescriptor>> {
        let (tools, runner) = (&self.tools, &self.runner);
        self.cache
            .get_or_probe(file, force, |path| {
                probe_audio_tracks(&**runner, &tools.ffprobe, path, sink)
                    .map_err(|e| warn!(file = %path.display(), error = %e, "Probe failed"))
                    .ok()
            })
            .map(|streams| streams.iter().filter(|s| s.is_audio()).cloned().collect())
    }

    /// Whether the encoding fields matter for this selection.
    ///
    /// Direct extraction only recodes non-AAC tracks, so the selection is
    /// probed (through the cache) to find one.
    pub fn needs_encoding_params(&mut self, mode: ProcessingMode, sink: &dyn LogSink) -> bool {
        if mode == ProcessingMode::Recode {
            return true;
        }

        let files = self.files.clone();
        files.iter().any(|file| {
            self.audio_tracks(file, false, sink)
                .unwrap_or_default()
                .iter()
                .any(|s| SourceCodec::from_probe_name(&s.codec_name) != SourceCodec::Aac)
        })
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Validate and spawn a batch over the current selection
    pub async fn start_batch(&mut self, config: ProcessingConfig) -> Result<usize, StartError> {
        if self.is_running() {
            warn!("Processing is already running; start request ignored");
            return Err(StartError::AlreadyRunning);
        }
        if self.files.is_empty() {
            return Err(StartError::NoFiles);
        }
        if let Some(timeout) = self.check_timeout {
            check_tools_available(&self.tools, timeout).await?;
        }

        let total = self.files.len();
        let (worker, events) = BatchWorker::spawn(
            self.files.clone(),
            config,
            self.tools.clone(),
            Arc::clone(&self.runner),
        );
        debug!(total, "Batch worker spawned");
        self.active = Some(ActiveBatch { worker, events });
        Ok(total)
    }

    /// Drain whatever the worker has sent so far without waiting
    pub fn poll(&mut self) -> Vec<WorkerEvent> {
        let mut drained = Vec::new();
        let mut finished = false;

        if let Some(active) = self.active.as_mut() {
            loop {
                match active.events.try_recv() {
                    Ok(event) => drained.push(event),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        finished = true;
                        break;
                    }
                }
            }
            finished = finished && active.worker.is_finished();
        }

        if finished {
            self.active = None;
        }
        drained
    }

    /// Wait for the next worker event; `None` once the worker has exited
    pub async fn next_event(&mut self) -> Option<WorkerEvent> {
        let active = self.active.as_mut()?;
        match active.events.recv().await {
            Some(event) => Some(event),
            None => {
                // Channel closed: the worker has returned
                if let Some(active) = self.active.take() {
                    active.worker.join().await;
                }
                None
            }
        }
    }
}
