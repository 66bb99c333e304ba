//! CLI entry point for the audio track extractor
//!
//! Parses command line arguments, builds a session over the given files and
//! runs one extraction batch, mirroring every worker log line to the run log.

use audio_extractor::{
    expand_inputs, Config, EncodingParams, LogLevel, LogSink, ProcessingMode, RunLog, Session,
    SystemRunner, ToolPaths, WorkerEvent,
};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Audio Track Extractor - copy or recode every audio track of media files
#[derive(Parser, Debug)]
#[command(name = "audio-extractor")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Media files or directories to process
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Path to the configuration file (config.toml)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Processing mode: direct_extract or recode
    #[arg(short, long)]
    mode: Option<String>,

    /// Target codec: aac, mp3, opus or flac
    #[arg(long)]
    codec: Option<String>,

    /// Bitrate (1-999999, optionally suffixed k or m)
    #[arg(short, long)]
    bitrate: Option<String>,

    /// Sample rate in kHz (1.0-192.0)
    #[arg(short, long)]
    sample_rate: Option<String>,

    /// Channel count (1-8)
    #[arg(long)]
    channels: Option<String>,

    /// Quality or compression level (0-100, opus and flac only)
    #[arg(short, long)]
    quality: Option<String>,

    /// Directory containing ffmpeg and ffprobe
    #[arg(long)]
    tools_dir: Option<PathBuf>,

    /// List the audio tracks of every input and exit
    #[arg(long, default_value = "false")]
    list: bool,

    /// Skip the ffmpeg/ffprobe availability check. For testing only.
    #[arg(long, default_value = "false")]
    skip_checks: bool,
}

impl Args {
    fn encoding_params(&self, config: &Config) -> Result<EncodingParams, String> {
        let mut params = EncodingParams::from_config(&config.encoding);
        if let Some(mode) = &self.mode {
            params.mode = ProcessingMode::parse(mode)
                .ok_or_else(|| format!("unknown mode '{}' (expected direct_extract or recode)", mode))?;
        }
        let overrides = [
            (&self.codec, &mut params.codec),
            (&self.bitrate, &mut params.bitrate),
            (&self.sample_rate, &mut params.sample_rate_khz),
            (&self.channels, &mut params.channels),
            (&self.quality, &mut params.quality),
        ];
        for (arg, field) in overrides {
            if let Some(value) = arg {
                *field = value.clone();
            }
        }
        Ok(params)
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn list_tracks(session: &mut Session, sink: &dyn LogSink) {
    let files = session.files().to_vec();
    for file in &files {
        println!("{}", file.display());
        match session.audio_tracks(file, false, sink) {
            None => println!("  (probe failed)"),
            Some(tracks) if tracks.is_empty() => println!("  no audio track detected"),
            Some(tracks) => {
                for (audio_index, track) in tracks.iter().enumerate() {
                    println!(
                        "  #{} stream {}: {} [{}]",
                        audio_index, track.index, track.codec_name, track.language
                    );
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match Config::load_or_default(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.logging.level);

    let tools_dir = args.tools_dir.clone().unwrap_or_else(|| config.tools.dir.clone());
    let tools = ToolPaths::resolve(&tools_dir);

    let run_log = match RunLog::open(config.logging.resolved_dir(), &config.logging.file_name) {
        Ok(log) => log,
        Err(e) => {
            eprintln!("Failed to open run log: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let runner = Arc::new(SystemRunner);
    let mut session = if args.skip_checks {
        println!("WARNING: Skipping tool checks (--skip-checks enabled)");
        Session::without_tool_checks(tools, runner)
    } else {
        Session::new(
            tools,
            runner,
            Duration::from_secs(config.tools.version_timeout_secs),
        )
    };
    session.select_files(expand_inputs(&args.inputs));

    if args.list {
        list_tracks(&mut session, &run_log);
        return ExitCode::SUCCESS;
    }

    let processing = match args
        .encoding_params(&config)
        .and_then(|params| params.validate().map_err(|e| e.to_string()))
    {
        Ok(processing) => processing,
        Err(e) => {
            eprintln!("Invalid encoding parameters: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if !session.needs_encoding_params(processing.mode, &run_log) {
        println!("All selected tracks are AAC; encoding parameters are not used");
    }

    println!("Run log: {}", run_log.path().display());
    run_log.info(&format!(
        "Mode: {}, codec: {}, files: {}",
        processing.mode,
        processing.codec,
        session.files().len()
    ));

    if let Err(e) = session.start_batch(processing).await {
        run_log.warn(&format!("Cannot start processing: {}", e));
        eprintln!("Cannot start processing: {}", e);
        return ExitCode::FAILURE;
    }

    let mut total = 0;
    let mut failed = 0;
    while let Some(event) = session.next_event().await {
        match event {
            WorkerEvent::BatchStarted { total: n } => total = n,
            WorkerEvent::FileStarted { index, path } => {
                println!("[{}/{}] {}", index + 1, total, path.display());
            }
            WorkerEvent::FileFinished { path, success } => {
                let status = if success { "done" } else { "FAILED" };
                println!("  {}: {}", status, path.display());
            }
            WorkerEvent::Log { level, message } => {
                run_log.log(level, &message);
                if level >= LogLevel::Warning {
                    eprintln!("  {}", message);
                }
            }
            WorkerEvent::BatchFinished { succeeded, failed: f } => {
                failed = f;
                println!("Finished: {} succeeded, {} failed", succeeded, f);
            }
        }
    }

    if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
