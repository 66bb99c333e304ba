//! Per-file track processing pipeline
//!
//! Probes one input file, then walks its audio streams in probe order and
//! decides per stream whether to copy it, extract it raw and recode the raw
//! file, or recode it straight from the source. One failed track marks the
//! file failed but never stops the remaining tracks.

use crate::codec::{raw_container, OutputCodec, SourceCodec};
use crate::command::{AudioCommands, RecodeOptions};
use crate::logging::{failure_line, success_line, LogLevel, LogSink};
use crate::probe::{probe_audio_tracks, StreamDescriptor};
use crate::runner::ToolRunner;
use crate::startup::ToolPaths;
use crate::ProcessingMode;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

/// Name of the directory (next to each input) that receives outputs
pub const OUTPUT_DIR_NAME: &str = "output";

/// Parameters of one batch run, fixed for its whole duration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingConfig {
    pub mode: ProcessingMode,
    pub codec: OutputCodec,
    pub options: RecodeOptions,
}

impl ProcessingConfig {
    pub fn new(mode: ProcessingMode, codec: OutputCodec) -> Self {
        Self {
            mode,
            codec,
            options: RecodeOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RecodeOptions) -> Self {
        self.options = options;
        self
    }

    /// Extension of recoded outputs, derived from the target codec
    pub fn output_extension(&self) -> &'static str {
        self.codec.extension()
    }
}

/// What happens to one audio track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackAction {
    /// Stream-copy an AAC track into an m4a
    CopyAac,
    /// Stream-copy into a raw container, then recode that file
    RawThenRecode,
    /// Recode straight from the source file
    Recode,
}

/// Choose the action for a track from the run mode and its probed codec
pub fn plan_track(mode: ProcessingMode, codec_name: &str) -> TrackAction {
    match (mode, SourceCodec::from_probe_name(codec_name)) {
        (ProcessingMode::DirectExtract, SourceCodec::Aac) => TrackAction::CopyAac,
        (ProcessingMode::DirectExtract, SourceCodec::Passthrough(_)) => TrackAction::RawThenRecode,
        (ProcessingMode::Recode, _) => TrackAction::Recode,
    }
}

/// Why a file (or one of its tracks) failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Probing worked but found no audio streams
    NoAudioTrack,
    /// Probing itself failed
    Probe(String),
    /// The output directory could not be created
    OutputDir(String),
    /// An ffmpeg step exited non-zero or could not be started
    OperationFailure { operation: String, output: PathBuf },
    /// Anything that escaped the normal error paths
    Unexpected(String),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::NoAudioTrack => write!(f, "no audio track detected"),
            FailureReason::Probe(msg) => write!(f, "no audio track detected ({})", msg),
            FailureReason::OutputDir(msg) => write!(f, "cannot create output directory: {}", msg),
            FailureReason::OperationFailure { operation, .. } => write!(f, "{} failed", operation),
            FailureReason::Unexpected(msg) => write!(f, "unexpected error: {}", msg),
        }
    }
}

/// Result of processing one audio track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackResult {
    /// Container-global stream index
    pub stream_index: u32,
    /// Position among the file's audio streams
    pub audio_index: usize,
    pub action: TrackAction,
    /// Files written by successful steps
    pub outputs: Vec<PathBuf>,
    /// First failing step, if any
    pub failure: Option<FailureReason>,
}

impl TrackResult {
    pub fn success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Result of processing one input file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileResult {
    pub path: PathBuf,
    pub file_name: String,
    pub tracks: Vec<TrackResult>,
    /// Set when the file failed before or outside track processing
    pub failure: Option<FailureReason>,
}

impl FileResult {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            file_name: display_name(path),
            tracks: Vec::new(),
            failure: None,
        }
    }

    fn failed(path: &Path, reason: FailureReason) -> Self {
        Self {
            failure: Some(reason),
            ..Self::new(path)
        }
    }

    /// AND of every track outcome; false on any file-level failure
    pub fn success(&self) -> bool {
        self.failure.is_none() && self.tracks.iter().all(TrackResult::success)
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// `<input dir>/output`
pub fn output_dir_for(input: &Path) -> PathBuf {
    input
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(OUTPUT_DIR_NAME)
}

/// `<dir>/<basename>-Track<stream index>.<extension>`
pub fn output_path(dir: &Path, basename: &str, stream_index: u32, extension: &str) -> PathBuf {
    dir.join(format!("{}-Track{}.{}", basename, stream_index, extension))
}

/// Recode target used when the raw copy already has the target extension
pub fn recoded_alongside(dir: &Path, basename: &str, stream_index: u32, extension: &str) -> PathBuf {
    dir.join(format!("{}-Track{}-recoded.{}", basename, stream_index, extension))
}

/// Processes a single file, never panicking past this boundary.
pub fn process_file<R: ToolRunner + ?Sized>(
    input: &Path,
    config: &ProcessingConfig,
    tools: &ToolPaths,
    runner: &R,
    sink: &dyn LogSink,
) -> FileResult {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        FilePipeline {
            input,
            config,
            tools,
            runner,
            sink,
        }
        .run()
    }));

    match outcome {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            let name = display_name(input);
            sink.log(
                LogLevel::Critical,
                &format!("[CRITICAL ERROR] Exception while processing {}: {}", name, message),
            );
            let reason = FailureReason::Unexpected(message);
            sink.error(&failure_line(&name, "N/A", &reason.to_string(), "N/A"));
            FileResult::failed(input, reason)
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

struct FilePipeline<'a, R: ToolRunner + ?Sized> {
    input: &'a Path,
    config: &'a ProcessingConfig,
    tools: &'a ToolPaths,
    runner: &'a R,
    sink: &'a dyn LogSink,
}

impl<'a, R: ToolRunner + ?Sized> FilePipeline<'a, R> {
    fn run(&self) -> FileResult {
        let name = display_name(self.input);

        let streams = match probe_audio_tracks(self.runner, &self.tools.ffprobe, self.input, self.sink) {
            Ok(streams) => streams,
            Err(e) => return self.fail_file(&name, FailureReason::Probe(e.to_string())),
        };

        let audio: Vec<StreamDescriptor> = streams.into_iter().filter(|s| s.is_audio()).collect();
        if audio.is_empty() {
            return self.fail_file(&name, FailureReason::NoAudioTrack);
        }

        let output_dir = output_dir_for(self.input);
        if let Err(e) = std::fs::create_dir_all(&output_dir) {
            return self.fail_file(&name, FailureReason::OutputDir(e.to_string()));
        }

        let basename = self
            .input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.clone());

        let mut result = FileResult::new(self.input);
        for (audio_index, stream) in audio.iter().enumerate() {
            result
                .tracks
                .push(self.process_track(&name, &basename, &output_dir, audio_index, stream));
        }
        result
    }

    fn fail_file(&self, name: &str, reason: FailureReason) -> FileResult {
        if reason == FailureReason::NoAudioTrack || matches!(reason, FailureReason::Probe(_)) {
            self.sink.warn(&format!(
                "[WARNING] No audio track detected in {}. Skipping.",
                name
            ));
        }
        self.sink.error(&failure_line(name, "N/A", &reason.to_string(), "N/A"));
        FileResult::failed(self.input, reason)
    }

    fn process_track(
        &self,
        name: &str,
        basename: &str,
        output_dir: &Path,
        audio_index: usize,
        stream: &StreamDescriptor,
    ) -> TrackResult {
        let action = plan_track(self.config.mode, &stream.codec_name);
        let track = stream.index.to_string();
        let commands = AudioCommands::new(self.runner, &self.tools.ffmpeg, self.sink);
        let recoded = output_path(output_dir, basename, stream.index, self.config.output_extension());

        self.sink.info(&format!(
            "[INFO] Processing track {} of {} (audio stream #{}, codec: {}, language: {})...",
            stream.index, name, audio_index, stream.codec_name, stream.language
        ));

        let mut result = TrackResult {
            stream_index: stream.index,
            audio_index,
            action,
            outputs: Vec::new(),
            failure: None,
        };

        match action {
            TrackAction::CopyAac => {
                let output = output_path(output_dir, basename, stream.index, OutputCodec::Aac.extension());
                let ok = commands.copy_audio_track(self.input, &output, audio_index);
                self.record(&mut result, name, &track, "direct AAC copy", output, ok);
            }
            TrackAction::RawThenRecode => {
                let raw_ext = raw_container(&stream.codec_name).extension;
                let raw = output_path(output_dir, basename, stream.index, raw_ext);
                self.sink.info(&format!(
                    "[INFO] Track {} ({}) is not AAC, extracting it losslessly to {} first",
                    stream.index,
                    stream.codec_name,
                    raw.display()
                ));
                let ok = commands.copy_raw_track(self.input, &raw, audio_index, &stream.codec_name);
                let operation = format!("raw copy {}", stream.codec_name);
                if !self.record(&mut result, name, &track, &operation, raw.clone(), ok) {
                    return result;
                }

                // Same codec in and out would make ffmpeg overwrite its own input
                let recoded = if recoded == raw {
                    recoded_alongside(output_dir, basename, stream.index, self.config.output_extension())
                } else {
                    recoded
                };
                let ok = commands.recode(&raw, &recoded, self.config.codec, &self.config.options, None);
                let operation = format!("recode to {}", self.config.codec);
                self.record(&mut result, name, &track, &operation, recoded, ok);
            }
            TrackAction::Recode => {
                let ok = commands.recode(
                    self.input,
                    &recoded,
                    self.config.codec,
                    &self.config.options,
                    Some(audio_index),
                );
                let operation = format!("recode to {}", self.config.codec);
                self.record(&mut result, name, &track, &operation, recoded, ok);
            }
        }

        result
    }

    /// Log one step outcome and fold it into the track result
    fn record(
        &self,
        result: &mut TrackResult,
        name: &str,
        track: &str,
        operation: &str,
        output: PathBuf,
        ok: bool,
    ) -> bool {
        if ok {
            self.sink.info(&success_line(name, track, operation, &output));
            result.outputs.push(output);
        } else {
            let reason = FailureReason::OperationFailure {
                operation: operation.to_string(),
                output: output.clone(),
            };
            self.sink.error(&failure_line(
                name,
                track,
                &reason.to_string(),
                &output.display().to_string(),
            ));
            result.failure.get_or_insert(reason);
        }
        ok
    }
}
