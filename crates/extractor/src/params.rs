//! Encoding parameter intake
//!
//! Turns the user's raw text fields (from config, environment or command
//! line) into a validated [`ProcessingConfig`], applying the per-codec
//! defaults.

use crate::codec::{CodecError, OutputCodec};
use crate::command::RecodeOptions;
use crate::config::EncodingConfig;
use crate::pipeline::ProcessingConfig;
use crate::ProcessingMode;
use thiserror::Error;

pub const BITRATE_RANGE: std::ops::RangeInclusive<u32> = 1..=999_999;
pub const SAMPLE_RATE_KHZ_RANGE: std::ops::RangeInclusive<f64> = 1.0..=192.0;
pub const CHANNELS_RANGE: std::ops::RangeInclusive<u32> = 1..=8;
pub const QUALITY_RANGE: std::ops::RangeInclusive<u32> = 0..=100;

/// Sample rate used when the field is left empty
pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 44_100;
pub const DEFAULT_CHANNELS: u32 = 2;

/// Rates libopus accepts, in Hz; the first is the default
pub const OPUS_SAMPLE_RATES_HZ: [u32; 5] = [48_000, 24_000, 16_000, 12_000, 8_000];

#[derive(Debug, Error, PartialEq)]
pub enum ParamError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("invalid bitrate '{0}' (expected 1-999999, optionally followed by k or m)")]
    Bitrate(String),

    #[error("invalid sample rate '{0}' (expected 1.0-192.0 kHz)")]
    SampleRate(String),

    #[error("opus only supports 48, 24, 16, 12 or 8 kHz, got '{0}'")]
    OpusSampleRate(String),

    #[error("invalid channel count '{0}' (expected 1-8)")]
    Channels(String),

    #[error("invalid quality '{0}' (expected 0-100)")]
    Quality(String),

    #[error("{codec} compression level must be 0-{max}, got {value}")]
    QualityForCodec { codec: OutputCodec, value: u32, max: u32 },
}

/// Raw, unvalidated encoding fields; empty strings mean "use the default"
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodingParams {
    pub mode: ProcessingMode,
    pub codec: String,
    pub bitrate: String,
    pub sample_rate_khz: String,
    pub channels: String,
    pub quality: String,
}

impl EncodingParams {
    pub fn from_config(cfg: &EncodingConfig) -> Self {
        Self {
            mode: cfg.mode,
            codec: cfg.codec.clone(),
            bitrate: cfg.bitrate.clone().unwrap_or_default(),
            sample_rate_khz: cfg.sample_rate_khz.map(|k| k.to_string()).unwrap_or_default(),
            channels: cfg.channels.map(|c| c.to_string()).unwrap_or_default(),
            quality: cfg.quality.clone().unwrap_or_default(),
        }
    }

    /// Validate every field and fill in codec defaults
    pub fn validate(&self) -> Result<ProcessingConfig, ParamError> {
        let codec = OutputCodec::parse(&self.codec)?;

        let bitrate = match non_empty(&self.bitrate) {
            Some(raw) => Some(parse_bitrate(raw)?),
            None => default_bitrate(codec).map(str::to_string),
        };

        let sample_rate_hz = match non_empty(&self.sample_rate_khz) {
            Some(raw) => {
                let hz = parse_sample_rate_hz(raw)?;
                if codec == OutputCodec::Opus && !OPUS_SAMPLE_RATES_HZ.contains(&hz) {
                    return Err(ParamError::OpusSampleRate(raw.to_string()));
                }
                hz
            }
            None if codec == OutputCodec::Opus => OPUS_SAMPLE_RATES_HZ[0],
            None => DEFAULT_SAMPLE_RATE_HZ,
        };

        let channels = match non_empty(&self.channels) {
            Some(raw) => parse_in_range(raw, CHANNELS_RANGE).ok_or_else(|| ParamError::Channels(raw.to_string()))?,
            None => DEFAULT_CHANNELS,
        };

        let quality = match non_empty(&self.quality) {
            Some(raw) => {
                let value = parse_in_range(raw, QUALITY_RANGE).ok_or_else(|| ParamError::Quality(raw.to_string()))?;
                // Only the compression-level codecs take the quality field
                match codec.max_quality() {
                    Some(max) if value > max => {
                        return Err(ParamError::QualityForCodec { codec, value, max });
                    }
                    Some(_) => Some(value.to_string()),
                    None => None,
                }
            }
            None => None,
        };

        Ok(ProcessingConfig::new(self.mode, codec).with_options(RecodeOptions {
            bitrate,
            sample_rate_hz: Some(sample_rate_hz),
            channels: Some(channels),
            quality,
        }))
    }
}

fn non_empty(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

pub fn default_bitrate(codec: OutputCodec) -> Option<&'static str> {
    match codec {
        OutputCodec::Aac | OutputCodec::Opus => Some("256"),
        OutputCodec::Mp3 => Some("320"),
        OutputCodec::Flac => None,
    }
}

fn parse_in_range(raw: &str, range: std::ops::RangeInclusive<u32>) -> Option<u32> {
    raw.parse::<u32>().ok().filter(|v| range.contains(v))
}

/// Accepts `128`, `128k` or `1m`; returns the value as ffmpeg expects it
pub fn parse_bitrate(raw: &str) -> Result<String, ParamError> {
    let (digits, unit) = match raw.char_indices().last() {
        Some((i, c)) if c.eq_ignore_ascii_case(&'k') || c.eq_ignore_ascii_case(&'m') => {
            (&raw[..i], Some(c.to_ascii_lowercase()))
        }
        _ => (raw, None),
    };

    parse_in_range(digits, BITRATE_RANGE)
        .map(|value| match unit {
            Some(unit) => format!("{}{}", value, unit),
            None => value.to_string(),
        })
        .ok_or_else(|| ParamError::Bitrate(raw.to_string()))
}

/// kHz text (`44.1`, `48k`) to whole Hz, truncating
pub fn parse_sample_rate_hz(raw: &str) -> Result<u32, ParamError> {
    let number = raw.strip_suffix(|c: char| c == 'k' || c == 'K').unwrap_or(raw);
    let khz: f64 = number
        .parse()
        .map_err(|_| ParamError::SampleRate(raw.to_string()))?;
    if !SAMPLE_RATE_KHZ_RANGE.contains(&khz) {
        return Err(ParamError::SampleRate(raw.to_string()));
    }
    // Small epsilon so 44.1 does not land on 44099.999...
    Ok((khz * 1000.0 + 1e-6).trunc() as u32)
}
