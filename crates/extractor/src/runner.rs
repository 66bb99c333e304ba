//! External process execution
//!
//! Every ffprobe/ffmpeg invocation goes through [`ToolRunner`], so the probe
//! adapter and the command builder can be exercised without the real tools.

use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::process::{Command, Stdio};

/// Fully captured result of one finished process
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessOutput {
    /// Exit code, `None` when the process was killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs an external program to completion and captures both output streams
pub trait ToolRunner: Send + Sync {
    fn run(&self, program: &Path, args: &[OsString]) -> io::Result<ProcessOutput>;
}

/// Runs programs with `std::process::Command`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ToolRunner for SystemRunner {
    fn run(&self, program: &Path, args: &[OsString]) -> io::Result<ProcessOutput> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        let output = cmd.output()?;
        Ok(ProcessOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Render a command line for logging
pub fn display_command(program: &Path, args: &[OsString]) -> String {
    std::iter::once(program.as_os_str().to_string_lossy())
        .chain(args.iter().map(|arg| arg.to_string_lossy()))
        .collect::<Vec<_>>()
        .join(" ")
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_process_output_success_only_on_zero() {
        let ok = ProcessOutput { code: Some(0), ..Default::default() };
        let failed = ProcessOutput { code: Some(1), ..Default::default() };
        let killed = ProcessOutput { code: None, ..Default::default() };
        assert!(ok.success());
        assert!(!failed.success());
        assert!(!killed.success());
    }

    #[test]
    fn test_display_command() {
        let args: Vec<OsString> = vec!["-y".into(), "-i".into(), "in file.mkv".into()];
        assert_eq!(
            display_command(&PathBuf::from("/opt/ffmpeg/ffmpeg"), &args),
            "/opt/ffmpeg/ffmpeg -y -i in file.mkv"
        );
    }

    #[test]
    fn test_system_runner_reports_missing_program() {
        let result = SystemRunner.run(Path::new("/nonexistent/bin/ffmpeg-missing"), &[]);
        assert!(result.is_err());
    }
}
