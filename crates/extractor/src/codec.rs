//! Codec tables
//!
//! Target codecs are a closed set; everything the tool needs to know about
//! one (encoder, container extension, how bitrate and quality are passed)
//! comes from [`OutputCodec::spec`]. Source codecs only matter for picking
//! a container when a track is stream-copied raw.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("unsupported output codec '{0}' (expected aac, mp3, opus or flac)")]
    Unsupported(String),
}

/// How the user's quality value reaches the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityFlag {
    /// `-q:a <value>`
    VariableQuality,
    /// `-vbr on -compression_level <value>`
    CompressionLevelVbr,
    /// `-compression_level <value>`
    CompressionLevel,
}

/// Static description of one target codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecSpec {
    /// Name the user picks
    pub name: &'static str,
    /// ffmpeg encoder identifier
    pub encoder: &'static str,
    /// Extension of recoded output files
    pub extension: &'static str,
    /// Lossless codecs ignore bitrate
    pub uses_bitrate: bool,
    pub quality: QualityFlag,
    /// Highest compression level the encoder accepts; `None` when the
    /// user's quality field is not forwarded for this codec
    pub max_quality: Option<u32>,
}

/// Target codec for recoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputCodec {
    Aac,
    Mp3,
    Opus,
    Flac,
}

const AAC: CodecSpec = CodecSpec {
    name: "aac",
    encoder: "aac",
    extension: "m4a",
    uses_bitrate: true,
    quality: QualityFlag::VariableQuality,
    max_quality: None,
};

const MP3: CodecSpec = CodecSpec {
    name: "mp3",
    encoder: "libmp3lame",
    extension: "mp3",
    uses_bitrate: true,
    quality: QualityFlag::VariableQuality,
    max_quality: None,
};

const OPUS: CodecSpec = CodecSpec {
    name: "opus",
    encoder: "libopus",
    extension: "opus",
    uses_bitrate: true,
    quality: QualityFlag::CompressionLevelVbr,
    max_quality: Some(10),
};

const FLAC: CodecSpec = CodecSpec {
    name: "flac",
    encoder: "flac",
    extension: "flac",
    uses_bitrate: false,
    quality: QualityFlag::CompressionLevel,
    max_quality: Some(8),
};

impl OutputCodec {
    pub const ALL: [OutputCodec; 4] = [
        OutputCodec::Aac,
        OutputCodec::Mp3,
        OutputCodec::Opus,
        OutputCodec::Flac,
    ];

    pub fn spec(self) -> &'static CodecSpec {
        match self {
            OutputCodec::Aac => &AAC,
            OutputCodec::Mp3 => &MP3,
            OutputCodec::Opus => &OPUS,
            OutputCodec::Flac => &FLAC,
        }
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }

    pub fn encoder(self) -> &'static str {
        self.spec().encoder
    }

    pub fn extension(self) -> &'static str {
        self.spec().extension
    }

    pub fn uses_bitrate(self) -> bool {
        self.spec().uses_bitrate
    }

    pub fn quality_flag(self) -> QualityFlag {
        self.spec().quality
    }

    pub fn max_quality(self) -> Option<u32> {
        self.spec().max_quality
    }

    /// Parse a user-facing codec name (case-insensitive)
    pub fn parse(s: &str) -> Result<Self, CodecError> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|codec| codec.name() == wanted)
            .ok_or_else(|| CodecError::Unsupported(s.trim().to_string()))
    }
}

impl std::fmt::Display for OutputCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for OutputCodec {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Codec of a probed source track, as far as branching is concerned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceCodec {
    /// Already AAC: can be stream-copied into an m4a directly
    Aac,
    /// Anything else; carries the lowercase probe name
    Passthrough(String),
}

impl SourceCodec {
    pub fn from_probe_name(name: &str) -> Self {
        let lower = name.trim().to_lowercase();
        if lower == "aac" {
            SourceCodec::Aac
        } else {
            SourceCodec::Passthrough(lower)
        }
    }
}

/// Container chosen for a raw stream copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawContainer {
    pub extension: &'static str,
    /// Muxer forced with `-f` when ffmpeg cannot infer it from the extension
    pub format: Option<&'static str>,
}

/// Extension used when a codec is not in the table
pub const UNKNOWN_RAW_EXTENSION: &str = "bin";

/// ffmpeg cannot pick a muxer from `.bin`; Matroska accepts any audio codec
pub const UNKNOWN_RAW_FORMAT: &str = "matroska";

const RAW_CONTAINERS: &[(&str, RawContainer)] = &[
    ("mp3", RawContainer { extension: "mp3", format: None }),
    ("aac", RawContainer { extension: "aac", format: None }),
    ("ac3", RawContainer { extension: "ac3", format: None }),
    ("eac3", RawContainer { extension: "eac3", format: None }),
    ("dts", RawContainer { extension: "dts", format: None }),
    ("dtshd", RawContainer { extension: "dts", format: None }),
    ("flac", RawContainer { extension: "flac", format: None }),
    ("alac", RawContainer { extension: "m4a", format: None }),
    ("pcm_s16le", RawContainer { extension: "wav", format: Some("wav") }),
    ("pcm_f32le", RawContainer { extension: "wav", format: Some("wav") }),
    ("pcm_s24le", RawContainer { extension: "wav", format: Some("wav") }),
    ("pcm_s32le", RawContainer { extension: "wav", format: Some("wav") }),
    ("opus", RawContainer { extension: "opus", format: None }),
    ("vorbis", RawContainer { extension: "ogg", format: None }),
    ("wmav1", RawContainer { extension: "wma", format: Some("asf") }),
    ("wmav2", RawContainer { extension: "wma", format: Some("asf") }),
    ("truehd", RawContainer { extension: "truehd", format: Some("truehd") }),
    ("mlp", RawContainer { extension: "mlp", format: None }),
];

/// Look up the raw-copy container for a probed codec name (case-insensitive)
pub fn raw_container(codec_name: &str) -> RawContainer {
    let lower = codec_name.trim().to_lowercase();
    RAW_CONTAINERS
        .iter()
        .find(|(name, _)| *name == lower)
        .map(|(_, container)| *container)
        .unwrap_or(RawContainer {
            extension: UNKNOWN_RAW_EXTENSION,
            format: Some(UNKNOWN_RAW_FORMAT),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_output_codec_table() {
        assert_eq!(OutputCodec::Aac.encoder(), "aac");
        assert_eq!(OutputCodec::Mp3.encoder(), "libmp3lame");
        assert_eq!(OutputCodec::Opus.encoder(), "libopus");
        assert_eq!(OutputCodec::Flac.encoder(), "flac");

        assert_eq!(OutputCodec::Aac.extension(), "m4a");
        assert_eq!(OutputCodec::Mp3.extension(), "mp3");
        assert_eq!(OutputCodec::Opus.extension(), "opus");
        assert_eq!(OutputCodec::Flac.extension(), "flac");

        assert!(!OutputCodec::Flac.uses_bitrate());
        assert_eq!(OutputCodec::Opus.quality_flag(), QualityFlag::CompressionLevelVbr);

        assert_eq!(OutputCodec::Opus.max_quality(), Some(10));
        assert_eq!(OutputCodec::Flac.max_quality(), Some(8));
        assert_eq!(OutputCodec::Aac.max_quality(), None);
    }

    #[test]
    fn test_output_codec_parse() {
        assert_eq!(OutputCodec::parse("AAC"), Ok(OutputCodec::Aac));
        assert_eq!(" opus ".parse::<OutputCodec>(), Ok(OutputCodec::Opus));
        assert_eq!(
            OutputCodec::parse("ac3"),
            Err(CodecError::Unsupported("ac3".to_string()))
        );
        assert_eq!(OutputCodec::Flac.to_string(), "flac");
    }

    #[test]
    fn test_source_codec_classification() {
        assert_eq!(SourceCodec::from_probe_name("AAC"), SourceCodec::Aac);
        assert_eq!(
            SourceCodec::from_probe_name("TrueHD"),
            SourceCodec::Passthrough("truehd".to_string())
        );
    }

    #[test]
    fn test_raw_container_lookup() {
        assert_eq!(raw_container("ac3").extension, "ac3");
        assert_eq!(raw_container("dtshd").extension, "dts");
        assert_eq!(raw_container("alac").extension, "m4a");
        assert_eq!(raw_container("vorbis").extension, "ogg");

        let pcm = raw_container("PCM_S24LE");
        assert_eq!(pcm.extension, "wav");
        assert_eq!(pcm.format, Some("wav"));

        let truehd = raw_container("truehd");
        assert_eq!(truehd.extension, "truehd");
        assert_eq!(truehd.format, Some("truehd"));

        assert_eq!(raw_container("eac3").format, None);

        let wma = raw_container("wmav2");
        assert_eq!(wma.extension, "wma");
        assert_eq!(wma.format, Some("asf"));
    }

    #[test]
    fn test_unlisted_codecs_get_an_explicit_muxer() {
        for name in ["mp2", "pcm_s16be", "wma"] {
            let container = raw_container(name);
            assert_eq!(container.extension, UNKNOWN_RAW_EXTENSION);
            assert_eq!(container.format, Some(UNKNOWN_RAW_FORMAT));
        }
    }

    // Property: any codec name outside the table maps to the generic binary
    // file with the catch-all muxer forced.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_unknown_codecs_fall_back_to_bin(name in "[a-z0-9_]{1,12}") {
            prop_assume!(!RAW_CONTAINERS.iter().any(|(known, _)| *known == name));

            let container = raw_container(&name);
            prop_assert_eq!(container.extension, UNKNOWN_RAW_EXTENSION);
            prop_assert_eq!(container.format, Some(UNKNOWN_RAW_FORMAT));
        }
    }
}
