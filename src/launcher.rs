//! Remote viewer process launch and stream wiring.
//!
//! The remote is started with a single positional argument, the session
//! title. Its stdout is decoded line by line into [`RemoteLine`]s; its
//! stderr is drained as diagnostics. Process death and stream closure
//! surface as [`RemoteEvent`]s so the exchange engine never hangs on a
//! dead remote.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use futures::stream::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::ChildStdin;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::protocol::{RemoteLine, decode_line};

/// Base name of the remote viewer application.
const REMOTE_BASE: &str = "HumanTest";

/// Install location of the packaged viewer.
const INSTALL_DIR: &str = "ht-app";

/// Location of viewer builds inside a development tree, preferred over
/// the install location when present.
const DEV_BUILD_PREFIX: &str = "viewer/release-builds";

/// Stderr lines containing this substring are known-benign toolkit noise
/// and are not logged.
const BENIGN_STDERR_MARKER: &str = "Font";

/// Errors from resolving or starting the remote executable.
///
/// These never reach harness callers as `Err`; the session converts them
/// into unattended mode with a reason comment.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("remote executable not found at {0}")]
    NotFound(PathBuf),

    #[error("failed to start remote executable: {0}")]
    Spawn(#[from] std::io::Error),
}

/// One line from either of the remote's output streams.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Lifecycle and protocol events from the running remote.
#[derive(Debug)]
pub enum RemoteEvent {
    /// One decoded stdout line.
    Line(RemoteLine),
    /// Stdout reached end of stream; no further protocol traffic can
    /// arrive.
    StdoutClosed,
    /// The process exited with the given code, if one was reported.
    Exited(Option<i32>),
}

/// Resolve the platform-specific path of the remote viewer executable.
///
/// Layout: `<release-dir>/HumanTest-<os>-<arch>/[HumanTest.app/Contents/MacOS/]HumanTest[.exe]`
/// where `<release-dir>` is the development build tree when it exists,
/// otherwise the packaged install directory.
pub fn resolve_remote_path() -> PathBuf {
    let dev_prefix = Path::new(DEV_BUILD_PREFIX);
    let release_dir = if dev_prefix.exists() {
        dev_prefix.to_path_buf()
    } else {
        PathBuf::from(INSTALL_DIR)
    };

    let app_dir = format!(
        "{REMOTE_BASE}-{}-{}",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    let mut path = release_dir.join(app_dir);

    if cfg!(target_os = "macos") {
        path = path
            .join(format!("{REMOTE_BASE}.app"))
            .join("Contents")
            .join("MacOS");
    }

    let binary = if cfg!(windows) {
        format!("{REMOTE_BASE}.exe")
    } else {
        REMOTE_BASE.to_string()
    };
    path.join(binary)
}

/// Handle to a running remote viewer process.
///
/// Owns the writable end of the exchange and the merged event stream.
/// Once the process dies or its streams close, `stdin` is dropped and
/// further writes become logged no-ops.
#[derive(Debug)]
pub struct Remote {
    stdin: Option<ChildStdin>,
    events: mpsc::UnboundedReceiver<RemoteEvent>,
}

impl Remote {
    /// Start the remote at `path` with `title` as its sole argument.
    ///
    /// Fails fast with [`LaunchError::NotFound`] when the executable is
    /// missing, without attempting a spawn.
    pub fn spawn(path: &Path, title: &str) -> Result<Remote, LaunchError> {
        if !path.exists() {
            return Err(LaunchError::NotFound(path.to_path_buf()));
        }

        let mut child = tokio::process::Command::new(path)
            .arg(title)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (tx, events) = mpsc::unbounded_channel();

        if let (Some(stdout), Some(stderr)) = (stdout, stderr) {
            let stdout_stream =
                tokio_stream::wrappers::LinesStream::new(BufReader::new(stdout).lines()).map(
                    |line: Result<String, std::io::Error>| {
                        OutputLine::Stdout(line.unwrap_or_default())
                    },
                );
            let stderr_stream =
                tokio_stream::wrappers::LinesStream::new(BufReader::new(stderr).lines()).map(
                    |line: Result<String, std::io::Error>| {
                        OutputLine::Stderr(line.unwrap_or_default())
                    },
                );

            // Merge stdout and stderr streams; only stdout carries
            // protocol traffic.
            let mut combined = futures::stream::select(stdout_stream, stderr_stream);

            let tx = tx.clone();
            tokio::spawn(async move {
                while let Some(line) = combined.next().await {
                    match line {
                        OutputLine::Stdout(line) => {
                            if tx.send(RemoteEvent::Line(decode_line(&line))).is_err() {
                                return;
                            }
                        }
                        OutputLine::Stderr(line) => {
                            if !line.contains(BENIGN_STDERR_MARKER) {
                                warn!("(remote err) {line}");
                            }
                        }
                    }
                }
                let _ = tx.send(RemoteEvent::StdoutClosed);
            });
        }

        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => {
                    debug!("remote exited: {status}");
                    let _ = tx.send(RemoteEvent::Exited(status.code()));
                }
                Err(e) => {
                    error!("failed waiting on remote: {e}");
                    let _ = tx.send(RemoteEvent::Exited(None));
                }
            }
        });

        Ok(Remote {
            stdin,
            events,
        })
    }

    /// True while the remote's stdin is still writable.
    pub fn attached(&self) -> bool {
        self.stdin.is_some()
    }

    /// Drop the writable end; subsequent writes become no-ops.
    pub fn detach(&mut self) {
        self.stdin = None;
    }

    /// Write one framed line to the remote.
    ///
    /// A write against a detached remote is logged and dropped, never an
    /// error to the caller.
    pub async fn write_line(&mut self, line: &str) {
        let Some(stdin) = self.stdin.as_mut() else {
            error!("remote not attached, dropping line");
            return;
        };
        let framed = format!("{line}\n");
        if let Err(e) = stdin.write_all(framed.as_bytes()).await {
            warn!("write to remote failed, detaching: {e}");
            self.stdin = None;
            return;
        }
        if let Err(e) = stdin.flush().await {
            warn!("flush to remote failed, detaching: {e}");
            self.stdin = None;
        }
    }

    /// Next lifecycle or protocol event, or `None` once all producers
    /// are gone.
    pub async fn next_event(&mut self) -> Option<RemoteEvent> {
        self.events.recv().await
    }
}
