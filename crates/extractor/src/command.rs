//! Command builder for ffmpeg copy and recode operations
//!
//! Each operation builds its ffmpeg arguments and hands them to one shared
//! execution primitive, which prepends the tool path and `-y`, appends the
//! output path, runs the process to completion and classifies the result by
//! exit code alone.

use crate::codec::{raw_container, OutputCodec, QualityFlag};
use crate::logging::{LogLevel, LogSink};
use crate::runner::{display_command, ProcessOutput, ToolRunner};
use std::ffi::OsString;
use std::io;
use std::path::Path;
use thiserror::Error;

/// Substring of ffmpeg diagnostics that does not count as a suspicious error
const IGNORED_STDERR_ERROR: &str = "error reading";

/// Error type for one ffmpeg invocation
#[derive(Debug, Error)]
pub enum CommandError {
    /// ffmpeg could not be started (missing binary, permissions, ...)
    #[error("failed to launch ffmpeg: {0}")]
    Launch(#[from] io::Error),

    /// ffmpeg exited with non-zero status
    #[error("ffmpeg failed with exit code: {0}")]
    Failed(i32),

    /// ffmpeg was terminated by a signal
    #[error("ffmpeg process was terminated by signal")]
    Terminated,
}

/// Optional encoder settings for a recode
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecodeOptions {
    /// Bitrate as entered; bare integers are kbps
    pub bitrate: Option<String>,
    pub sample_rate_hz: Option<u32>,
    pub channels: Option<u32>,
    /// Quality or compression level, meaning depends on the codec
    pub quality: Option<String>,
}

/// Append the `k` unit to a bare integer bitrate; anything else passes through
pub fn normalize_bitrate(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
        format!("{}k", trimmed)
    } else {
        trimmed.to_string()
    }
}

fn push_str(args: &mut Vec<OsString>, values: &[&str]) {
    args.extend(values.iter().map(OsString::from));
}

fn map_audio(args: &mut Vec<OsString>, audio_index: usize) {
    push_str(args, &["-map", &format!("0:a:{}", audio_index)]);
}

/// Arguments for a stream copy of the Nth audio stream into an m4a
pub fn copy_audio_args(input: &Path, audio_index: usize) -> Vec<OsString> {
    let mut args = vec![OsString::from("-i"), input.as_os_str().to_owned()];
    map_audio(&mut args, audio_index);
    push_str(&mut args, &["-c:a", "copy", "-movflags", "faststart"]);
    args
}

/// Arguments for a verbatim copy of the Nth audio stream, forcing the muxer
/// for codecs whose container cannot be inferred from the extension
pub fn copy_raw_args(input: &Path, audio_index: usize, codec_name: &str) -> Vec<OsString> {
    let mut args = vec![OsString::from("-i"), input.as_os_str().to_owned()];
    map_audio(&mut args, audio_index);
    push_str(&mut args, &["-c:a", "copy"]);
    if let Some(format) = raw_container(codec_name).format {
        push_str(&mut args, &["-f", format]);
    }
    args
}

/// Arguments for re-encoding audio to `codec`
///
/// `track` restricts the recode to one input audio stream; it is `None` when
/// the input is an already-extracted single-track file.
pub fn recode_args(
    input: &Path,
    codec: OutputCodec,
    options: &RecodeOptions,
    track: Option<usize>,
    sink: &dyn LogSink,
) -> Vec<OsString> {
    let mut args = vec![OsString::from("-i"), input.as_os_str().to_owned()];

    if let Some(audio_index) = track {
        map_audio(&mut args, audio_index);
        sink.info(&format!("[INFO] Encoding from audio stream {}.", audio_index));
    }

    push_str(&mut args, &["-c:a", codec.encoder()]);

    if let Some(bitrate) = options.bitrate.as_deref().filter(|b| !b.trim().is_empty()) {
        if codec.uses_bitrate() {
            let bitrate = normalize_bitrate(bitrate);
            sink.info(&format!("[INFO] Bitrate: {}", bitrate));
            push_str(&mut args, &["-b:a", &bitrate]);
        } else {
            sink.warn(&format!(
                "[WARNING] Bitrate is ignored for lossless {} encoding.",
                codec
            ));
        }
    }

    if let Some(rate) = options.sample_rate_hz {
        sink.info(&format!("[INFO] Sample rate: {}", rate));
        push_str(&mut args, &["-ar", &rate.to_string()]);
    }

    if let Some(channels) = options.channels {
        sink.info(&format!("[INFO] Channels: {}", channels));
        push_str(&mut args, &["-ac", &channels.to_string()]);
    }

    if let Some(quality) = options.quality.as_deref().filter(|q| !q.trim().is_empty()) {
        let quality = quality.trim();
        match codec.quality_flag() {
            QualityFlag::VariableQuality => {
                push_str(&mut args, &["-q:a", quality]);
                sink.info(&format!("[INFO] {} uses quality -q:a {}", codec, quality));
            }
            QualityFlag::CompressionLevelVbr => {
                push_str(&mut args, &["-vbr", "on", "-compression_level", quality]);
                sink.info(&format!(
                    "[INFO] {} uses compression level -compression_level {}",
                    codec, quality
                ));
            }
            QualityFlag::CompressionLevel => {
                push_str(&mut args, &["-compression_level", quality]);
                sink.info(&format!(
                    "[INFO] {} uses compression level -compression_level {}",
                    codec, quality
                ));
            }
        }
    }

    args
}

/// Full processor argument list: overwrite flag, operation arguments, output
pub fn full_args(op_args: Vec<OsString>, output: &Path) -> Vec<OsString> {
    let mut args = Vec::with_capacity(op_args.len() + 2);
    args.push(OsString::from("-y"));
    args.extend(op_args);
    args.push(output.as_os_str().to_owned());
    args
}

/// True when a successful run still printed something that looks like an error
pub fn stderr_looks_suspicious(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("error") && !lower.contains(IGNORED_STDERR_ERROR)
}

/// Runs copy and recode operations through ffmpeg
pub struct AudioCommands<'a, R: ToolRunner + ?Sized> {
    runner: &'a R,
    ffmpeg: &'a Path,
    sink: &'a dyn LogSink,
}

impl<'a, R: ToolRunner + ?Sized> AudioCommands<'a, R> {
    pub fn new(runner: &'a R, ffmpeg: &'a Path, sink: &'a dyn LogSink) -> Self {
        Self {
            runner,
            ffmpeg,
            sink,
        }
    }

    /// Stream-copy the Nth audio stream (already AAC) into `output`
    pub fn copy_audio_track(&self, input: &Path, output: &Path, audio_index: usize) -> bool {
        self.execute(copy_audio_args(input, audio_index), output, "direct AAC copy")
    }

    /// Stream-copy the Nth audio stream verbatim into a codec-appropriate container
    pub fn copy_raw_track(
        &self,
        input: &Path,
        output: &Path,
        audio_index: usize,
        codec_name: &str,
    ) -> bool {
        let container = raw_container(codec_name);
        if let Some(format) = container.format {
            self.sink.info(&format!(
                "[INFO] {} needs an explicit container, forcing -f {}.",
                codec_name, format
            ));
        }
        self.execute(
            copy_raw_args(input, audio_index, codec_name),
            output,
            &format!("raw copy ({})", codec_name),
        )
    }

    /// Re-encode `input` (or one of its audio streams) to `codec`
    pub fn recode(
        &self,
        input: &Path,
        output: &Path,
        codec: OutputCodec,
        options: &RecodeOptions,
        track: Option<usize>,
    ) -> bool {
        let args = recode_args(input, codec, options, track, self.sink);
        self.execute(args, output, &format!("recode to {}", codec))
    }

    /// Run one ffmpeg invocation and classify it by exit code
    pub fn run_checked(
        &self,
        op_args: Vec<OsString>,
        output: &Path,
    ) -> Result<ProcessOutput, CommandError> {
        let args = full_args(op_args, output);
        self.sink
            .debug(&format!("[CMD] {}", display_command(self.ffmpeg, &args)));

        let result = self.runner.run(self.ffmpeg, &args)?;
        if result.success() {
            return Ok(result);
        }

        self.log_streams(LogLevel::Error, &result);
        match result.code {
            Some(code) => Err(CommandError::Failed(code)),
            None => Err(CommandError::Terminated),
        }
    }

    /// Shared execution primitive: success is exit code zero and nothing else
    fn execute(&self, op_args: Vec<OsString>, output: &Path, description: &str) -> bool {
        match self.run_checked(op_args, output) {
            Ok(result) => {
                self.sink.info(&format!(
                    "[INFO] ffmpeg {} succeeded ({})",
                    description,
                    output.display()
                ));
                self.log_streams(LogLevel::Debug, &result);
                if stderr_looks_suspicious(&result.stderr) {
                    self.sink.warn(&format!(
                        "[WARNING] ffmpeg succeeded but stderr mentions errors:\n{}",
                        result.stderr.trim()
                    ));
                }
                true
            }
            Err(CommandError::Launch(e)) => {
                self.sink.log(
                    LogLevel::Critical,
                    &format!(
                        "[CRITICAL ERROR] Could not run ffmpeg '{}' ({} {}): {}",
                        self.ffmpeg.display(),
                        description,
                        output.display(),
                        e
                    ),
                );
                false
            }
            Err(e) => {
                self.sink.error(&format!(
                    "[ERROR] ffmpeg {} failed ({}): {}",
                    description,
                    output.display(),
                    e
                ));
                false
            }
        }
    }

    fn log_streams(&self, level: LogLevel, result: &ProcessOutput) {
        self.sink
            .log(level, &format!("ffmpeg stdout:\n{}", result.stdout.trim()));
        self.sink
            .log(level, &format!("ffmpeg stderr:\n{}", result.stderr.trim()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{MemorySink, NullSink};
    use crate::runner::fake::FakeRunner;
    use proptest::prelude::*;
    use std::path::PathBuf;

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    fn has_flag_with_value(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|pair| pair[0] == flag && pair[1] == value)
    }

    fn has_flag(args: &[String], flag: &str) -> bool {
        args.iter().any(|arg| arg == flag)
    }

    #[test]
    fn test_normalize_bitrate() {
        assert_eq!(normalize_bitrate("128"), "128k");
        assert_eq!(normalize_bitrate(" 320 "), "320k");
        assert_eq!(normalize_bitrate("192k"), "192k");
        assert_eq!(normalize_bitrate("1M"), "1M");
        assert_eq!(normalize_bitrate("128Kbps"), "128Kbps");
    }

    #[test]
    fn test_copy_audio_args() {
        let args = strings(&copy_audio_args(Path::new("/m/movie.mkv"), 1));
        assert_eq!(
            args,
            vec!["-i", "/m/movie.mkv", "-map", "0:a:1", "-c:a", "copy", "-movflags", "faststart"]
        );
    }

    #[test]
    fn test_copy_raw_args_forces_container_when_needed() {
        let pcm = strings(&copy_raw_args(Path::new("in.mkv"), 0, "pcm_s16le"));
        assert_eq!(pcm, vec!["-i", "in.mkv", "-map", "0:a:0", "-c:a", "copy", "-f", "wav"]);

        let truehd = strings(&copy_raw_args(Path::new("in.mkv"), 2, "truehd"));
        assert!(has_flag_with_value(&truehd, "-f", "truehd"));

        let ac3 = strings(&copy_raw_args(Path::new("in.mkv"), 1, "ac3"));
        assert!(!has_flag(&ac3, "-f"));

        let mp2 = strings(&copy_raw_args(Path::new("in.ts"), 0, "mp2"));
        assert!(has_flag_with_value(&mp2, "-f", "matroska"));
    }

    #[test]
    fn test_recode_args_bare_bitrate_gets_k_suffix() {
        let options = RecodeOptions {
            bitrate: Some("128".to_string()),
            ..Default::default()
        };
        let args = strings(&recode_args(Path::new("in.ac3"), OutputCodec::Aac, &options, None, &NullSink));
        assert!(has_flag_with_value(&args, "-b:a", "128k"));
        assert!(has_flag_with_value(&args, "-c:a", "aac"));
        assert!(!has_flag(&args, "-map"));
    }

    #[test]
    fn test_recode_args_full_layout() {
        let options = RecodeOptions {
            bitrate: Some("320".to_string()),
            sample_rate_hz: Some(44100),
            channels: Some(2),
            quality: None,
        };
        let args = strings(&recode_args(Path::new("in.mkv"), OutputCodec::Mp3, &options, Some(1), &NullSink));
        assert_eq!(
            args,
            vec![
                "-i", "in.mkv", "-map", "0:a:1", "-c:a", "libmp3lame", "-b:a", "320k", "-ar",
                "44100", "-ac", "2",
            ]
        );
    }

    #[test]
    fn test_recode_args_flac_ignores_bitrate_with_warning() {
        let sink = MemorySink::default();
        let options = RecodeOptions {
            bitrate: Some("900".to_string()),
            quality: Some("5".to_string()),
            ..Default::default()
        };
        let args = strings(&recode_args(Path::new("in.dts"), OutputCodec::Flac, &options, None, &sink));

        assert!(!has_flag(&args, "-b:a"));
        assert!(has_flag_with_value(&args, "-compression_level", "5"));
        assert!(!has_flag(&args, "-vbr"));
        assert!(sink
            .lines()
            .iter()
            .any(|(level, line)| *level == LogLevel::Warning && line.contains("Bitrate is ignored")));
    }

    #[test]
    fn test_recode_args_quality_flags_per_codec() {
        let options = RecodeOptions {
            quality: Some("4".to_string()),
            ..Default::default()
        };

        let aac = strings(&recode_args(Path::new("a"), OutputCodec::Aac, &options, None, &NullSink));
        assert!(has_flag_with_value(&aac, "-q:a", "4"));

        let mp3 = strings(&recode_args(Path::new("a"), OutputCodec::Mp3, &options, None, &NullSink));
        assert!(has_flag_with_value(&mp3, "-q:a", "4"));

        let opus = strings(&recode_args(Path::new("a"), OutputCodec::Opus, &options, None, &NullSink));
        assert!(has_flag_with_value(&opus, "-c:a", "libopus"));
        assert!(has_flag_with_value(&opus, "-vbr", "on"));
        assert!(has_flag_with_value(&opus, "-compression_level", "4"));
        assert!(!has_flag(&opus, "-q:a"));
    }

    #[test]
    fn test_full_args_wraps_operation() {
        let args = strings(&full_args(copy_audio_args(Path::new("in.mp4"), 0), Path::new("out.m4a")));
        assert_eq!(args.first().map(String::as_str), Some("-y"));
        assert_eq!(args.last().map(String::as_str), Some("out.m4a"));
    }

    #[test]
    fn test_stderr_suspicion() {
        assert!(stderr_looks_suspicious("[aac] Error while decoding"));
        assert!(!stderr_looks_suspicious("Error reading header, skipping"));
        assert!(!stderr_looks_suspicious("size= 1024kB time=00:01:00"));
    }

    #[test]
    fn test_execute_runs_ffmpeg_with_overwrite_and_output() {
        let runner = FakeRunner::default();
        let ffmpeg = PathBuf::from("tools/ffmpeg");
        let commands = AudioCommands::new(&runner, &ffmpeg, &NullSink);

        assert!(commands.copy_audio_track(Path::new("in.mp4"), Path::new("out/in-Track1.m4a"), 0));

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, ffmpeg);
        assert_eq!(calls[0].args[0], "-y");
        assert_eq!(calls[0].last_arg(), "out/in-Track1.m4a");
        assert!(calls[0].has_flag_with_value("-map", "0:a:0"));
    }

    #[test]
    fn test_execute_nonzero_exit_is_failure() {
        let runner = FakeRunner::default().fail_outputs_containing("Track2");
        let ffmpeg = PathBuf::from("ffmpeg");
        let sink = MemorySink::default();
        let commands = AudioCommands::new(&runner, &ffmpeg, &sink);

        let ok = commands.copy_raw_track(Path::new("in.mkv"), Path::new("in-Track2.ac3"), 1, "ac3");

        assert!(!ok);
        assert!(sink.contains("failed with exit code: 1"));
        assert!(sink.contains("Invalid argument"));
    }

    #[test]
    fn test_execute_zero_exit_with_error_text_still_succeeds() {
        let runner = FakeRunner::default().processor_stderr("[mp3] Error parsing frame header");
        let ffmpeg = PathBuf::from("ffmpeg");
        let sink = MemorySink::default();
        let commands = AudioCommands::new(&runner, &ffmpeg, &sink);

        let ok = commands.recode(
            Path::new("in.ac3"),
            Path::new("in.m4a"),
            OutputCodec::Aac,
            &RecodeOptions::default(),
            None,
        );

        assert!(ok);
        assert!(sink
            .lines()
            .iter()
            .any(|(level, line)| *level == LogLevel::Warning && line.contains("stderr mentions errors")));
    }

    #[test]
    fn test_execute_launch_failure_is_reported_not_raised() {
        let runner = FakeRunner::default().launch_failure();
        let ffmpeg = PathBuf::from("missing/ffmpeg");
        let sink = MemorySink::default();
        let commands = AudioCommands::new(&runner, &ffmpeg, &sink);

        assert!(!commands.copy_audio_track(Path::new("in.mp4"), Path::new("out.m4a"), 0));
        assert!(sink
            .lines()
            .iter()
            .any(|(level, line)| *level == LogLevel::Critical && line.contains("missing/ffmpeg")));
    }

    // Property: for any codec and option set, the recode argument list selects
    // the mapped encoder, carries the bitrate only for lossy codecs (always with
    // a unit), and passes sample rate and channels through verbatim.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_recode_args_completeness(
            codec_idx in 0usize..4,
            bitrate in proptest::option::of(1u32..999_999),
            sample_rate in proptest::option::of(8_000u32..192_000),
            channels in proptest::option::of(1u32..=8),
            track in proptest::option::of(0usize..8),
        ) {
            let codec = OutputCodec::ALL[codec_idx];
            let options = RecodeOptions {
                bitrate: bitrate.map(|b| b.to_string()),
                sample_rate_hz: sample_rate,
                channels,
                quality: None,
            };

            let args = strings(&recode_args(Path::new("input.mkv"), codec, &options, track, &NullSink));

            prop_assert!(has_flag_with_value(&args, "-i", "input.mkv"));
            prop_assert!(has_flag_with_value(&args, "-c:a", codec.encoder()));

            match (bitrate, codec.uses_bitrate()) {
                (Some(b), true) => {
                    let expected = format!("{}k", b);
                    prop_assert!(has_flag_with_value(&args, "-b:a", &expected))
                }
                _ => prop_assert!(!has_flag(&args, "-b:a")),
            }

            match sample_rate {
                Some(rate) => prop_assert!(has_flag_with_value(&args, "-ar", &rate.to_string())),
                None => prop_assert!(!has_flag(&args, "-ar")),
            }

            match channels {
                Some(ch) => prop_assert!(has_flag_with_value(&args, "-ac", &ch.to_string())),
                None => prop_assert!(!has_flag(&args, "-ac")),
            }

            match track {
                Some(t) => {
                    let expected = format!("0:a:{}", t);
                    prop_assert!(has_flag_with_value(&args, "-map", &expected))
                }
                None => prop_assert!(!has_flag(&args, "-map")),
            }
        }
    }
}
