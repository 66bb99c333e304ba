//! Configuration for the audio track extractor
//!
//! `[tools]`, `[encoding]` and `[logging]` sections of `config.toml`, with
//! `AUDIO_EXTRACTOR_*` environment variables layered on top.

pub mod config;

pub use config::*;
