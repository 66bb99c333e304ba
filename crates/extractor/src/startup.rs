//! Startup checks for the audio track extractor
//!
//! Locates the bundled ffprobe/ffmpeg executables and verifies they respond
//! to a version query before any batch is allowed to start.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

/// Error types for tool availability checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("{tool} not found at {}", .path.display())]
    ToolMissing { tool: &'static str, path: PathBuf },

    #[error("{tool} -version failed: {detail}")]
    ToolUnresponsive { tool: &'static str, detail: String },

    #[error("{tool} -version did not answer within {timeout:?}")]
    Timeout { tool: &'static str, timeout: Duration },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Platform file name of a tool (`ffmpeg` or `ffmpeg.exe`)
pub fn executable_name(tool: &str) -> String {
    if cfg!(windows) {
        format!("{}.exe", tool)
    } else {
        tool.to_string()
    }
}

/// Locations of the prober and the processor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub ffprobe: PathBuf,
    pub ffmpeg: PathBuf,
}

impl ToolPaths {
    /// Both tools inside `dir`
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            ffprobe: dir.join(executable_name("ffprobe")),
            ffmpeg: dir.join(executable_name("ffmpeg")),
        }
    }

    /// Resolve the tool directory; relative paths are taken from the
    /// directory holding the running executable.
    pub fn resolve(dir: &Path) -> Self {
        let base = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));
        Self::resolve_from(base.as_deref(), dir)
    }

    pub fn resolve_from(base: Option<&Path>, dir: &Path) -> Self {
        match base {
            Some(base) if dir.is_relative() => Self::in_dir(&base.join(dir)),
            _ => Self::in_dir(dir),
        }
    }
}

/// Extract the version token from `<tool> -version` output
///
/// Handles "ffmpeg version 6.1.1 ..." as well as git builds such as
/// "ffprobe version n7.0-12-gabcdef ...".
pub fn parse_version_line(output: &str) -> Option<String> {
    let line = output
        .lines()
        .find(|line| line.to_lowercase().contains(" version "))?;

    let version = line
        .split_whitespace()
        .skip_while(|word| !word.eq_ignore_ascii_case("version"))
        .nth(1)?;

    Some(version.trim_start_matches('n').to_string())
}

async fn query_version(
    tool: &'static str,
    path: &Path,
    timeout: Duration,
) -> Result<String, StartupError> {
    if !path.is_file() {
        return Err(StartupError::ToolMissing {
            tool,
            path: path.to_path_buf(),
        });
    }

    let mut cmd = Command::new(path);
    cmd.arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(windows)]
    {
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }

    let child = cmd.spawn().map_err(|e| StartupError::ToolUnresponsive {
        tool,
        detail: e.to_string(),
    })?;

    // Dropping the child on timeout kills it
    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| StartupError::Timeout { tool, timeout })??;

    if !output.status.success() {
        return Err(StartupError::ToolUnresponsive {
            tool,
            detail: format!(
                "exit status {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let version = parse_version_line(&stdout).unwrap_or_else(|| "unknown".to_string());
    debug!(tool, version = %version, "Tool answered version query");
    Ok(version)
}

/// Verify both tools exist and answer `-version` within `timeout`
pub async fn check_tools_available(paths: &ToolPaths, timeout: Duration) -> Result<(), StartupError> {
    let probe_version = query_version("ffprobe", &paths.ffprobe, timeout).await?;
    let ffmpeg_version = query_version("ffmpeg", &paths.ffmpeg, timeout).await?;
    info!(
        ffprobe = %probe_version,
        ffmpeg = %ffmpeg_version,
        "External tools available"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    #[cfg(unix)]
    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_resolve_relative_against_base() {
        let paths = ToolPaths::resolve_from(Some(Path::new("/opt/app")), Path::new("ffmpeg"));
        assert_eq!(paths.ffprobe, Path::new("/opt/app/ffmpeg").join(executable_name("ffprobe")));
        assert_eq!(paths.ffmpeg, Path::new("/opt/app/ffmpeg").join(executable_name("ffmpeg")));
    }

    #[test]
    fn test_resolve_absolute_ignores_base() {
        let paths = ToolPaths::resolve_from(Some(Path::new("/opt/app")), Path::new("/usr/bin"));
        assert_eq!(paths.ffmpeg, Path::new("/usr/bin").join(executable_name("ffmpeg")));
    }

    #[test]
    fn test_executable_name() {
        if cfg!(windows) {
            assert_eq!(executable_name("ffmpeg"), "ffmpeg.exe");
        } else {
            assert_eq!(executable_name("ffmpeg"), "ffmpeg");
        }
    }

    #[test]
    fn test_parse_version_line() {
        assert_eq!(
            parse_version_line("ffmpeg version 6.1.1 Copyright (c) 2000-2023"),
            Some("6.1.1".to_string())
        );
        assert_eq!(
            parse_version_line("ffprobe version n7.0-12-gabcdef Copyright\nbuilt with gcc"),
            Some("7.0-12-gabcdef".to_string())
        );
        assert_eq!(parse_version_line("not a tool"), None);
        assert_eq!(parse_version_line(""), None);
    }

    // Property: the version token is recovered from any "<tool> version X.Y"
    // banner, with or without the git-build `n` prefix.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_version_banner_parsing(
            tool in prop_oneof![Just("ffmpeg"), Just("ffprobe")],
            major in 1u32..20,
            minor in 0u32..10,
            prefixed in proptest::bool::ANY,
        ) {
            let banner = format!(
                "{} version {}{}.{} Copyright (c) 2000-2024 the FFmpeg developers\nconfiguration: --enable-gpl",
                tool,
                if prefixed { "n" } else { "" },
                major,
                minor
            );
            prop_assert_eq!(parse_version_line(&banner), Some(format!("{}.{}", major, minor)));
        }
    }

    #[tokio::test]
    async fn test_missing_tools_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let paths = ToolPaths::in_dir(temp_dir.path());

        let result = check_tools_available(&paths, Duration::from_secs(1)).await;
        assert!(matches!(
            result,
            Err(StartupError::ToolMissing { tool: "ffprobe", .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_responsive_tools_pass() {
        let temp_dir = TempDir::new().unwrap();
        write_script(temp_dir.path(), "ffprobe", "echo 'ffprobe version 6.0 Copyright'");
        write_script(temp_dir.path(), "ffmpeg", "echo 'ffmpeg version 6.0 Copyright'");
        let paths = ToolPaths::in_dir(temp_dir.path());

        let result = check_tools_available(&paths, Duration::from_secs(5)).await;
        assert!(result.is_ok(), "unexpected error: {:?}", result);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_tool_is_unresponsive() {
        let temp_dir = TempDir::new().unwrap();
        write_script(temp_dir.path(), "ffprobe", "echo 'ffprobe version 6.0'");
        write_script(temp_dir.path(), "ffmpeg", "echo 'broken build' >&2; exit 3");
        let paths = ToolPaths::in_dir(temp_dir.path());

        let result = check_tools_available(&paths, Duration::from_secs(5)).await;
        match result {
            Err(StartupError::ToolUnresponsive { tool, detail }) => {
                assert_eq!(tool, "ffmpeg");
                assert!(detail.contains("broken build"));
            }
            other => panic!("expected ToolUnresponsive, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hanging_tool_times_out() {
        let temp_dir = TempDir::new().unwrap();
        write_script(temp_dir.path(), "ffprobe", "sleep 10");
        write_script(temp_dir.path(), "ffmpeg", "echo 'ffmpeg version 6.0'");
        let paths = ToolPaths::in_dir(temp_dir.path());

        let result = check_tools_available(&paths, Duration::from_millis(200)).await;
        match result {
            Err(err @ StartupError::Timeout { tool: "ffprobe", .. }) => {
                assert!(err.to_string().ends_with("within 200ms"), "got: {}", err);
            }
            other => panic!("expected ffprobe Timeout, got {:?}", other),
        }
    }
}
