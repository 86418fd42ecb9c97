//! Runs the external Nuclei scanner against one target with one template.

use std::path::PathBuf;
use std::process::Stdio;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use forge_logging::{forge_info, forge_warn};

pub const DEFAULT_SCANNER: &str = "nuclei";

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("template file not found: {0}")]
    MissingTemplate(PathBuf),
    #[error("no scan target given")]
    MissingTarget,
    #[error("could not start {exe}: {message}")]
    Spawn { exe: String, message: String },
    #[error("execution failed (exit code {})", exit_code(.code))]
    ExecutionFailed { code: Option<i32> },
    #[error("scan cancelled")]
    Cancelled,
}

fn exit_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |code| code.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub exe: String,
    pub template: PathBuf,
    pub target: String,
    /// Per-request timeout in seconds, passed through to the scanner.
    pub timeout: Option<u32>,
    pub verbose: bool,
    pub debug: bool,
    pub no_color: bool,
}

impl ScanRequest {
    pub fn new(template: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        Self {
            exe: DEFAULT_SCANNER.to_string(),
            template: template.into(),
            target: target.into(),
            timeout: None,
            verbose: false,
            debug: false,
            no_color: false,
        }
    }

    /// Program followed by its arguments.
    pub fn command_line(&self) -> Vec<String> {
        let mut args = vec![
            self.exe.clone(),
            "-t".to_string(),
            self.template.to_string_lossy().into_owned(),
            "-u".to_string(),
            self.target.clone(),
        ];
        if let Some(timeout) = self.timeout {
            args.push("-timeout".to_string());
            args.push(timeout.to_string());
        }
        if self.verbose {
            args.push("-v".to_string());
        }
        if self.debug {
            args.push("-debug".to_string());
        }
        if self.no_color {
            args.push("-no-color".to_string());
        }
        args
    }

    fn check(&self) -> Result<(), ScanError> {
        if self.target.trim().is_empty() {
            return Err(ScanError::MissingTarget);
        }
        if !self.template.is_file() {
            return Err(ScanError::MissingTemplate(self.template.clone()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanLine {
    Stdout(String),
    Stderr(String),
}

/// Spawns the scanner and forwards its output line by line as it arrives.
#[derive(Debug, Clone, Default)]
pub struct ScanRunner {
    cancel: CancellationToken,
}

impl ScanRunner {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Returns once the process exits and both output streams are drained.
    pub async fn run(
        &self,
        request: &ScanRequest,
        lines: mpsc::UnboundedSender<ScanLine>,
    ) -> Result<(), ScanError> {
        request.check()?;
        let command_line = request.command_line();
        forge_info!("running {}", command_line.join(" "));

        let mut child = Command::new(&command_line[0])
            .args(&command_line[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| ScanError::Spawn {
                exe: request.exe.clone(),
                message: err.to_string(),
            })?;

        let stdout = child
            .stdout
            .take()
            .map(|out| tokio::spawn(forward(out, lines.clone(), ScanLine::Stdout)));
        let stderr = child
            .stderr
            .take()
            .map(|err| tokio::spawn(forward(err, lines, ScanLine::Stderr)));

        let status = tokio::select! {
            status = child.wait() => status.map_err(|err| ScanError::Spawn {
                exe: request.exe.clone(),
                message: err.to_string(),
            })?,
            _ = self.cancel.cancelled() => {
                if let Err(err) = child.kill().await {
                    forge_warn!("could not stop scanner: {err}");
                }
                return Err(ScanError::Cancelled);
            }
        };

        for reader in [stdout, stderr].into_iter().flatten() {
            let _ = reader.await;
        }

        if status.success() {
            forge_info!("scan finished");
            Ok(())
        } else {
            Err(ScanError::ExecutionFailed {
                code: status.code(),
            })
        }
    }
}

async fn forward<R>(
    reader: R,
    lines: mpsc::UnboundedSender<ScanLine>,
    wrap: fn(String) -> ScanLine,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader).lines();
    loop {
        match reader.next_line().await {
            Ok(Some(line)) => {
                if lines.send(wrap(line)).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(err) => {
                forge_warn!("scanner output unreadable: {err}");
                break;
            }
        }
    }
}
