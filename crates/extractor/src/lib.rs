//! Audio Track Extractor
//!
//! Pulls audio tracks out of media containers with ffprobe/ffmpeg: copies
//! AAC tracks as they are, extracts everything else losslessly, and recodes
//! to the chosen codec. Batches run on a background worker that reports
//! through an event channel.

pub mod codec;
pub mod command;
pub mod logging;
pub mod params;
pub mod pipeline;
pub mod probe;
pub mod runner;
pub mod scan;
pub mod session;
pub mod startup;
pub mod worker;

pub use audio_extractor_config as config;
pub use audio_extractor_config::{Config, ProcessingMode};
pub use codec::{raw_container, CodecError, OutputCodec, RawContainer, SourceCodec};
pub use command::{normalize_bitrate, AudioCommands, CommandError, RecodeOptions};
pub use logging::{LogLevel, LogSink, NullSink, RunLog};
pub use params::{EncodingParams, ParamError};
pub use pipeline::{
    output_path, plan_track, process_file, FailureReason, FileResult, ProcessingConfig,
    TrackAction, TrackResult,
};
pub use probe::{probe_audio_tracks, ProbeError, StreamDescriptor, StreamType};
pub use runner::{ProcessOutput, SystemRunner, ToolRunner};
pub use scan::{expand_inputs, is_media_file, MEDIA_EXTENSIONS};
pub use session::{ProbeCache, Session, StartError};
pub use startup::{check_tools_available, ToolPaths, StartupError};
pub use worker::{run_batch, BatchSummary, BatchWorker, ChannelSink, WorkerEvent};
