//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// Value parsed but is unusable
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// How each audio track of a file is turned into an output file
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    /// Copy AAC tracks as-is; extract other codecs raw and recode them
    #[default]
    DirectExtract,
    /// Recode every track straight from the source file
    Recode,
}

impl ProcessingMode {
    /// Parse a mode name as written in config files and on the command line
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "direct_extract" | "direct" | "extract" => Some(ProcessingMode::DirectExtract),
            "recode" => Some(ProcessingMode::Recode),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingMode::DirectExtract => write!(f, "direct_extract"),
            ProcessingMode::Recode => write!(f, "recode"),
        }
    }
}

/// Location of the external ffmpeg/ffprobe executables
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolsConfig {
    /// Directory holding both executables (relative to the program unless absolute)
    #[serde(default = "default_tools_dir")]
    pub dir: PathBuf,
    /// Timeout for the `-version` availability check
    #[serde(default = "default_version_timeout_secs")]
    pub version_timeout_secs: u64,
}

fn default_tools_dir() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_version_timeout_secs() -> u64 {
    5
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            dir: default_tools_dir(),
            version_timeout_secs: default_version_timeout_secs(),
        }
    }
}

/// Default encoding parameters, overridable per run from the command line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncodingConfig {
    #[serde(default)]
    pub mode: ProcessingMode,
    /// Target codec name (aac, mp3, opus, flac)
    #[serde(default = "default_codec")]
    pub codec: String,
    /// Bitrate, bare integers are kbps
    pub bitrate: Option<String>,
    /// Sample rate in kHz (e.g. 44.1)
    pub sample_rate_khz: Option<f64>,
    pub channels: Option<u32>,
    /// Codec-specific quality or compression level
    pub quality: Option<String>,
}

fn default_codec() -> String {
    "aac".to_string()
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            mode: ProcessingMode::default(),
            codec: default_codec(),
            bitrate: None,
            sample_rate_khz: None,
            channels: None,
            quality: None,
        }
    }
}

/// Run log and diagnostics configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Directory for the run log (system temp dir when unset)
    pub dir: Option<PathBuf>,
    #[serde(default = "default_log_file_name")]
    pub file_name: String,
    /// Filter for stderr diagnostics when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_file_name() -> String {
    "processing_log.txt".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: None,
            file_name: default_log_file_name(),
            level: default_log_level(),
        }
    }
}

impl LoggingConfig {
    /// Directory the run log lives in
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| env::temp_dir().join("audio_extractor_logs"))
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub encoding: EncodingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the config.toml file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        if config.tools.version_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "tools.version_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - AUDIO_EXTRACTOR_TOOLS_DIR -> tools.dir
    /// - AUDIO_EXTRACTOR_MODE -> encoding.mode
    /// - AUDIO_EXTRACTOR_CODEC -> encoding.codec
    /// - AUDIO_EXTRACTOR_BITRATE -> encoding.bitrate
    /// - AUDIO_EXTRACTOR_SAMPLE_RATE_KHZ -> encoding.sample_rate_khz
    /// - AUDIO_EXTRACTOR_CHANNELS -> encoding.channels
    /// - AUDIO_EXTRACTOR_QUALITY -> encoding.quality
    /// - AUDIO_EXTRACTOR_LOG_DIR -> logging.dir
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("AUDIO_EXTRACTOR_TOOLS_DIR") {
            if !val.trim().is_empty() {
                self.tools.dir = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("AUDIO_EXTRACTOR_MODE") {
            if let Some(mode) = ProcessingMode::parse(&val) {
                self.encoding.mode = mode;
            }
        }

        if let Ok(val) = env::var("AUDIO_EXTRACTOR_CODEC") {
            if !val.trim().is_empty() {
                self.encoding.codec = val.trim().to_lowercase();
            }
        }

        if let Ok(val) = env::var("AUDIO_EXTRACTOR_BITRATE") {
            if !val.trim().is_empty() {
                self.encoding.bitrate = Some(val.trim().to_string());
            }
        }

        if let Ok(val) = env::var("AUDIO_EXTRACTOR_SAMPLE_RATE_KHZ") {
            if let Ok(khz) = val.trim().parse::<f64>() {
                self.encoding.sample_rate_khz = Some(khz);
            }
        }

        if let Ok(val) = env::var("AUDIO_EXTRACTOR_CHANNELS") {
            if let Ok(channels) = val.trim().parse::<u32>() {
                self.encoding.channels = Some(channels);
            }
        }

        if let Ok(val) = env::var("AUDIO_EXTRACTOR_QUALITY") {
            if !val.trim().is_empty() {
                self.encoding.quality = Some(val.trim().to_string());
            }
        }

        if let Ok(val) = env::var("AUDIO_EXTRACTOR_LOG_DIR") {
            if !val.trim().is_empty() {
                self.logging.dir = Some(PathBuf::from(val));
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = match Self::load_from_file(path) {
            Ok(config) => config,
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Config::default()
            }
            Err(e) => return Err(e),
        };
        config.apply_env_overrides();
        Ok(config)
    }
}
