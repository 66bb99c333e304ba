//! Probe adapter
//!
//! Asks ffprobe for the audio streams of a file and turns its JSON answer
//! into [`StreamDescriptor`]s.

use crate::logging::LogSink;
use crate::runner::{display_command, ToolRunner};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Language reported when a stream carries no language tag
pub const UNKNOWN_LANGUAGE: &str = "unknown";

/// Error type for probe operations.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Input path does not exist; ffprobe was not started.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// ffprobe ran but exited non-zero.
    #[error("ffprobe exited with status {}", display_code(.code))]
    Execution {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    /// ffprobe output was not the expected JSON.
    #[error("failed to parse ffprobe output: {0}")]
    Parse(String),

    /// ffprobe could not be started at all.
    #[error("failed to launch ffprobe: {0}")]
    Launch(#[from] io::Error),
}

fn display_code(code: &Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string())
}

/// Stream type as reported in `codec_type`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamType {
    Audio,
    Other(String),
}

impl StreamType {
    fn from_codec_type(codec_type: Option<&str>) -> Self {
        match codec_type {
            None | Some("audio") => StreamType::Audio,
            Some(other) => StreamType::Other(other.to_string()),
        }
    }
}

/// One audio stream of a probed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// Position of the stream among all streams of the container.
    pub index: u32,
    /// Lowercase codec name (e.g. "aac", "ac3", "truehd").
    pub codec_name: String,
    pub stream_type: StreamType,
    /// `tags.language`, or [`UNKNOWN_LANGUAGE`].
    pub language: String,
}

impl StreamDescriptor {
    pub fn is_audio(&self) -> bool {
        self.stream_type == StreamType::Audio
    }
}

/// Raw ffprobe JSON structures for parsing.
mod ffprobe_json {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct FfprobeOutput {
        pub streams: Option<Vec<Stream>>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Stream {
        pub index: u32,
        pub codec_name: Option<String>,
        pub codec_type: Option<String>,
        pub tags: Option<Tags>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Tags {
        pub language: Option<String>,
    }
}

/// Arguments for the audio-only probe of `file`
pub fn probe_args(file: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-v",
        "error",
        "-select_streams",
        "a",
        "-show_entries",
        "stream=index,codec_name,codec_type,tags",
        "-of",
        "json",
    ]
    .iter()
    .map(OsString::from)
    .collect();
    args.push(file.as_os_str().to_owned());
    args
}

/// Probes `file` for its audio streams.
///
/// Streams are returned in ffprobe's order. An empty list is not an error;
/// callers decide what "no audio" means for them.
pub fn probe_audio_tracks<R: ToolRunner + ?Sized>(
    runner: &R,
    ffprobe: &Path,
    file: &Path,
    sink: &dyn LogSink,
) -> Result<Vec<StreamDescriptor>, ProbeError> {
    if !file.exists() {
        sink.error(&format!("[ERROR] File does not exist, cannot probe: {}", file.display()));
        return Err(ProbeError::FileNotFound(file.to_path_buf()));
    }

    let args = probe_args(file);
    tracing::debug!(command = %display_command(ffprobe, &args), "probing");

    let output = runner.run(ffprobe, &args).map_err(|e| {
        sink.error(&format!("[CRITICAL ERROR] Could not run ffprobe '{}': {}", ffprobe.display(), e));
        ProbeError::Launch(e)
    })?;

    if !output.success() {
        sink.error(&format!(
            "[ERROR] ffprobe failed on {}: exit status {}",
            file.display(),
            display_code(&output.code)
        ));
        sink.error(&format!("ffprobe stdout: {}", output.stdout.trim()));
        sink.error(&format!("ffprobe stderr: {}", output.stderr.trim()));
        return Err(ProbeError::Execution {
            code: output.code,
            stdout: output.stdout,
            stderr: output.stderr,
        });
    }

    parse_probe_output(&output.stdout).map_err(|e| {
        sink.error(&format!("[ERROR] {}", e));
        sink.error(&format!("ffprobe raw output: {}", output.stdout.trim()));
        e
    })
}

/// Parses ffprobe JSON output into stream descriptors.
pub fn parse_probe_output(json_str: &str) -> Result<Vec<StreamDescriptor>, ProbeError> {
    let ffprobe: ffprobe_json::FfprobeOutput =
        serde_json::from_str(json_str).map_err(|e| ProbeError::Parse(e.to_string()))?;

    let streams = ffprobe
        .streams
        .unwrap_or_default()
        .into_iter()
        .map(|stream| StreamDescriptor {
            index: stream.index,
            codec_name: stream
                .codec_name
                .map(|name| name.to_lowercase())
                .unwrap_or_else(|| "unknown".to_string()),
            stream_type: StreamType::from_codec_type(stream.codec_type.as_deref()),
            language: stream
                .tags
                .and_then(|tags| tags.language)
                .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string()),
        })
        .collect();

    Ok(streams)
}
