//! Session lifecycle and the command exchange engine.
//!
//! A [`Session`] owns one remote viewer process for its whole lifetime.
//! Callers submit commands through the public surface (`view_file`,
//! `show_text`, ...); a single reactor task serializes them so exactly
//! one command is in flight at a time, correlates the remote's response
//! lines back to the right caller, and falls back to the watchdog when
//! the remote never answers.
//!
//! No exchange ever surfaces as `Err` to the caller: every failure mode
//! (missing executable, dead remote, timeout, malformed reply) resolves
//! as a [`TestResponse`] the calling test can inspect.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::launcher::{LaunchError, Remote, RemoteEvent, resolve_remote_path};
use crate::protocol::{
    CmdArg, Command, EXIT, RemoteLine, TestOptions, TestResponse, VERIFY_HUMAN,
    normalize_verify_human,
};
use crate::report::{ReportFormat, ReportLog};
use crate::watchdog::Watchdog;

/// Title shown when the caller does not supply one.
const DEFAULT_TITLE: &str = "Human Test";

/// Unattended reason once the remote process has died mid-session.
const REMOTE_TERMINATED: &str = "remote terminated";

/// Configuration for [`Session::start`].
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Initial display title; commands may change it via
    /// [`TestOptions::title`].
    pub title: Option<String>,

    /// Path of the remote viewer executable. Defaults to the platform
    /// resolution of [`resolve_remote_path`].
    pub executable: Option<PathBuf>,
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }
}

/// One queued command and the channel its caller is waiting on.
struct Exchange {
    command: Command,
    responder: oneshot::Sender<TestResponse>,
}

/// A running manual-testing session.
pub struct Session {
    queue: mpsc::UnboundedSender<Exchange>,
    unattended: Arc<Mutex<Option<String>>>,
    report: Arc<Mutex<ReportLog>>,
    seconds_left: watch::Receiver<u64>,
    launch_code: i32,
}

impl Session {
    /// Launch the remote viewer and start the exchange reactor.
    ///
    /// Launch failure is not an error: the session comes up latched in
    /// unattended mode with [`Session::launch_code`] negative, and every
    /// exchange resolves as skipped with the reason.
    pub async fn start(config: SessionConfig) -> Session {
        let title = config.title.unwrap_or_else(|| DEFAULT_TITLE.to_string());
        let path = config.executable.unwrap_or_else(resolve_remote_path);

        let unattended = Arc::new(Mutex::new(None));
        let report = Arc::new(Mutex::new(ReportLog::new(title.clone())));
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (countdown_tx, seconds_left) = watch::channel(0);

        let (remote, launch_code) = match Remote::spawn(&path, &title) {
            Ok(remote) => {
                info!("remote viewer launched: {}", path.display());
                (Some(remote), 0)
            }
            Err(LaunchError::NotFound(path)) => {
                error!("remote executable not found at {}", path.display());
                *unattended.lock().unwrap() = Some("Remote executable not found".to_string());
                (None, -1)
            }
            Err(LaunchError::Spawn(e)) => {
                error!("remote executable failed to run: {e}");
                *unattended.lock().unwrap() = Some("Remote executable failed to run".to_string());
                (None, -1)
            }
        };

        let reactor = Reactor {
            remote,
            queue: queue_rx,
            unattended: Arc::clone(&unattended),
            report: Arc::clone(&report),
            countdown: Arc::new(countdown_tx),
            ready_seen: false,
        };
        tokio::spawn(reactor.run());

        Session {
            queue: queue_tx,
            unattended,
            report,
            seconds_left,
            launch_code,
        }
    }

    /// 0 when the remote launched, negative on launch failure.
    pub fn launch_code(&self) -> i32 {
        self.launch_code
    }

    /// Live seconds-remaining countdown of the command in flight.
    pub fn countdown(&self) -> watch::Receiver<u64> {
        self.seconds_left.clone()
    }

    /// Verify that a human is available to conduct the tests.
    ///
    /// The prompt is forced empty. Any outcome other than a pass latches
    /// unattended mode: all subsequent commands auto-skip. A timeout
    /// here resolves as `{skipped: true, error: "timeout"}`.
    pub async fn verify_human(&self, options: Option<TestOptions>) -> TestResponse {
        let mut options = options.unwrap_or_default();
        options.prompt = Some(String::new());
        let command = Command::new(VERIFY_HUMAN).with_options(Some(options));
        self.submit(command).await
    }

    /// Display the contents of a text file and ask for a verdict.
    pub async fn view_file(
        &self,
        path: impl AsRef<Path>,
        options: Option<TestOptions>,
    ) -> TestResponse {
        let command = Command::new("viewFile")
            .with_arg0(CmdArg::file(path.as_ref().to_string_lossy()))
            .with_options(options);
        self.submit(command).await
    }

    /// Display literal text and ask for a verdict.
    pub async fn show_text(
        &self,
        text: impl Into<String>,
        options: Option<TestOptions>,
    ) -> TestResponse {
        let command = Command::new("showText")
            .with_arg0(CmdArg::text(text))
            .with_options(options);
        self.submit(command).await
    }

    /// Display two texts or text files side by side as a diff.
    ///
    /// Each argument is treated as a file when a file exists at that
    /// path, and as literal text otherwise.
    pub async fn diff(
        &self,
        left: impl Into<String>,
        right: impl Into<String>,
        options: Option<TestOptions>,
    ) -> TestResponse {
        let command = Command::new("diff")
            .with_arg0(CmdArg::file(left))
            .with_arg1(CmdArg::file(right))
            .with_options(options);
        self.submit(command).await
    }

    /// Display an image file and ask for a verdict. The `width`/`height`
    /// options are honored here.
    pub async fn view_image(
        &self,
        path: impl AsRef<Path>,
        options: Option<TestOptions>,
    ) -> TestResponse {
        let command = Command::new("viewImage")
            .with_arg0(CmdArg::file(path.as_ref().to_string_lossy()))
            .with_options(options);
        self.submit(command).await
    }

    /// Display two images for comparison and ask for a verdict.
    pub async fn compare_images(
        &self,
        first: impl AsRef<Path>,
        second: impl AsRef<Path>,
        options: Option<TestOptions>,
    ) -> TestResponse {
        let command = Command::new("compareImages")
            .with_arg0(CmdArg::file(first.as_ref().to_string_lossy()))
            .with_arg1(CmdArg::file(second.as_ref().to_string_lossy()))
            .with_options(options);
        self.submit(command).await
    }

    /// End the session by sending the implicit `exit` command.
    ///
    /// Clears the unattended latch first so a live remote still receives
    /// the shutdown even when the human went away mid-run.
    pub async fn end(&self) -> TestResponse {
        *self.unattended.lock().unwrap() = None;
        self.submit(Command::new(EXIT)).await
    }

    /// Render the accumulated report to `base` + the extension fixed by
    /// `format` (text → `.txt`, HTML → `.html`, Markdown → `.md`).
    pub fn produce_report(
        &self,
        base: impl AsRef<Path>,
        format: ReportFormat,
        heading_size: u8,
    ) -> anyhow::Result<PathBuf> {
        self.report
            .lock()
            .unwrap()
            .write_to(base.as_ref(), format, heading_size)
    }

    /// Render the accumulated report as plain text for the console.
    pub fn console_report(&self, colorize: bool) -> String {
        self.report
            .lock()
            .unwrap()
            .render(ReportFormat::Text, 1, colorize)
    }

    /// Queue one command for exchange with the remote.
    ///
    /// Unattended sessions resolve immediately without touching the
    /// queue; otherwise strict FIFO order is preserved and the previous
    /// command's full round trip completes before this one is written.
    async fn submit(&self, command: Command) -> TestResponse {
        let reason = self.unattended.lock().unwrap().clone();
        if let Some(reason) = reason {
            let response = TestResponse::skipped(reason);
            if command.cmd != EXIT {
                self.report
                    .lock()
                    .unwrap()
                    .record(&command.report_key(), response.clone());
            }
            return response;
        }

        let (responder, resolved) = oneshot::channel();
        if self
            .queue
            .send(Exchange { command, responder })
            .is_err()
        {
            warn!("exchange reactor is gone, skipping command");
            return TestResponse::skipped("session closed");
        }

        match resolved.await {
            Ok(response) => response,
            Err(_) => TestResponse::skipped("session closed"),
        }
    }
}

/// The single task that owns the remote's streams and the in-flight
/// exchange state machine (`Idle → AwaitingReady → AwaitingResponse →
/// Idle`). Commands reach it over the FIFO queue; nothing else writes
/// to the remote.
struct Reactor {
    remote: Option<Remote>,
    queue: mpsc::UnboundedReceiver<Exchange>,
    unattended: Arc<Mutex<Option<String>>>,
    report: Arc<Mutex<ReportLog>>,
    countdown: Arc<watch::Sender<u64>>,
    ready_seen: bool,
}

impl Reactor {
    async fn run(mut self) {
        loop {
            if self.remote.is_some() {
                tokio::select! {
                    exchange = self.queue.recv() => match exchange {
                        Some(exchange) => self.handle(exchange).await,
                        None => return,
                    },
                    event = self.remote.as_mut().unwrap().next_event() => {
                        self.absorb_idle(event);
                    }
                }
            } else {
                match self.queue.recv().await {
                    Some(exchange) => self.handle(exchange).await,
                    None => return,
                }
            }
        }
    }

    /// Process remote traffic while no exchange is in flight.
    fn absorb_idle(&mut self, event: Option<RemoteEvent>) {
        match event {
            Some(RemoteEvent::Line(RemoteLine::Ready)) => self.ready_seen = true,
            Some(RemoteEvent::Line(RemoteLine::Response(_))) => {
                warn!("response line with no pending exchange, dropped");
            }
            Some(RemoteEvent::Line(RemoteLine::Malformed(line))) => {
                error!("unparsable response line dropped: {line}");
            }
            Some(RemoteEvent::Line(RemoteLine::Info(line))) => debug!("(remote) {line}"),
            Some(RemoteEvent::StdoutClosed) => {
                self.latch(REMOTE_TERMINATED);
            }
            Some(RemoteEvent::Exited(code)) => {
                debug!("remote exited while idle, code {code:?}");
                self.latch(REMOTE_TERMINATED);
            }
            None => {
                self.latch(REMOTE_TERMINATED);
                self.remote = None;
            }
        }
    }

    async fn handle(&mut self, exchange: Exchange) {
        let Exchange {
            mut command,
            responder,
        } = exchange;

        // The latch may have been set while this exchange sat in the
        // queue.
        let reason = self.unattended.lock().unwrap().clone();
        if let Some(reason) = reason {
            let response = TestResponse::skipped(reason);
            if command.cmd != EXIT {
                self.record(&command.report_key(), response.clone());
            }
            let _ = responder.send(response);
            return;
        }

        if self.remote.is_none() {
            let response = TestResponse::skipped("Remote not attached");
            let _ = responder.send(response);
            return;
        }

        // AwaitingReady: nothing is written until the remote says so.
        while !self.ready_seen {
            let event = self.next_remote_event().await;
            let died = matches!(
                event,
                Some(RemoteEvent::StdoutClosed) | Some(RemoteEvent::Exited(_)) | None
            );
            self.absorb_idle(event);
            if died {
                // Degraded but resolved: the caller never hangs on a
                // dead remote.
                let _ = responder.send(TestResponse::default());
                return;
            }
        }
        self.ready_seen = false;

        if let Some(title) = command.options.as_ref().and_then(|o| o.title.clone()) {
            self.report.lock().unwrap().set_title(title);
        }

        let key = command.report_key();
        let is_verify = command.cmd == VERIFY_HUMAN;
        let dog = Watchdog::arm(command.timeout_secs());
        self.publish_countdown(&dog);

        resolve_file_args(&mut command).await;
        self.transmit(&command).await;

        // AwaitingResponse: first of remote response, remote death, or
        // watchdog expiry wins.
        let response = self.await_response(dog, is_verify).await;

        let response = if is_verify {
            normalize_verify_human(response)
        } else {
            response
        };
        if is_verify && !response.is_passed() {
            self.latch("unattended");
        }

        if command.cmd != EXIT {
            self.record(&key, response.clone());
        }
        if responder.send(response).is_err() {
            // Boundary failure delivering the result upstream; the
            // exchange itself completed.
            warn!("caller gone before response delivery");
        }
    }

    async fn await_response(&mut self, mut dog: Watchdog, is_verify: bool) -> TestResponse {
        loop {
            tokio::select! {
                _ = dog.expired() => {
                    return if is_verify {
                        TestResponse::unavailable()
                    } else {
                        TestResponse::timed_out()
                    };
                }
                event = self.next_remote_event() => match event {
                    Some(RemoteEvent::Line(RemoteLine::Response(response))) => {
                        return response;
                    }
                    Some(RemoteEvent::Line(RemoteLine::Ready)) => {
                        // The prompt for the *next* command can race
                        // ahead of our bookkeeping.
                        self.ready_seen = true;
                    }
                    Some(RemoteEvent::Line(RemoteLine::Malformed(line))) => {
                        // Fail open: no fabricated result, the watchdog
                        // will resolve this exchange.
                        error!("unparsable response line, waiting out the timeout: {line}");
                    }
                    Some(RemoteEvent::Line(RemoteLine::Info(line))) => debug!("(remote) {line}"),
                    Some(RemoteEvent::StdoutClosed) | Some(RemoteEvent::Exited(_)) | None => {
                        self.latch(REMOTE_TERMINATED);
                        if let Some(remote) = self.remote.as_mut() {
                            remote.detach();
                        }
                        return TestResponse::skipped(REMOTE_TERMINATED);
                    }
                }
            }
        }
    }

    async fn next_remote_event(&mut self) -> Option<RemoteEvent> {
        match self.remote.as_mut() {
            Some(remote) => remote.next_event().await,
            None => None,
        }
    }

    async fn transmit(&mut self, command: &Command) {
        let line = match command.to_wire() {
            Ok(line) => line,
            Err(e) => {
                // Leaves the exchange to its watchdog rather than
                // feeding the remote a broken line.
                error!("failed to serialize command: {e}");
                return;
            }
        };
        if let Some(remote) = self.remote.as_mut() {
            remote.write_line(&line).await;
        }
    }

    /// Mirror the armed watchdog's countdown onto the session-wide
    /// observer channel. The forwarder ends when the watchdog is
    /// disarmed or expires.
    fn publish_countdown(&self, dog: &Watchdog) {
        let mut ticks = dog.countdown();
        let publish = Arc::clone(&self.countdown);
        tokio::spawn(async move {
            while ticks.changed().await.is_ok() {
                let secs = *ticks.borrow();
                let _ = publish.send(secs);
            }
        });
    }

    fn latch(&self, reason: &str) {
        let mut unattended = self.unattended.lock().unwrap();
        if unattended.is_none() {
            info!("entering unattended mode: {reason}");
            *unattended = Some(reason.to_string());
        }
    }

    fn record(&self, key: &str, response: TestResponse) {
        self.report.lock().unwrap().record(key, response);
    }
}

/// Resolve `file` argument slots to their contents before transmission:
/// the remote never reads the caller's filesystem. A path with no file
/// behind it is passed through as literal text.
async fn resolve_file_args(command: &mut Command) {
    for slot in command.cmdargs.iter_mut() {
        let Some(path) = slot.file.clone() else {
            continue;
        };
        match tokio::fs::read(&path).await {
            Ok(contents) => slot.text = Some(String::from_utf8_lossy(&contents).into_owned()),
            Err(_) => slot.text = Some(path),
        }
        // Only one of text/file is meaningful; the path has served its
        // purpose and must not go over the wire.
        slot.file = None;
    }
}
