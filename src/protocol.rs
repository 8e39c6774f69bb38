//! Wire protocol shared with the remote viewer process.
//!
//! The exchange is line-oriented UTF-8 text over the remote's standard
//! streams:
//!
//! - Harness → remote: one line per dispatched command, containing the
//!   JSON-serialized [`Command`].
//! - Remote → harness: the exact line `HT>` means "ready for the next
//!   command"; a line starting with `[Response]: ` carries the
//!   JSON-serialized [`TestResponse`] for the command in flight.
//! - Every other stdout line is non-protocol chatter, and stderr never
//!   carries protocol traffic.

use serde::{Deserialize, Serialize};

/// Exact line the remote prints when it is ready for the next command.
pub const READY_MARKER: &str = "HT>";

/// Prefix of a remote response line; the remainder is the response JSON.
pub const RESPONSE_PREFIX: &str = "[Response]: ";

/// Command kind for the human-availability check.
pub const VERIFY_HUMAN: &str = "verifyHuman";

/// Command kind sent by `Session::end` to shut the remote down.
pub const EXIT: &str = "exit";

/// Prompt shown when the caller does not supply one.
pub const DEFAULT_PROMPT: &str = "Is this acceptable?";

/// Default per-command timeout, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Default timeout for `verifyHuman`, which waits for a human to show up.
pub const VERIFY_HUMAN_TIMEOUT_SECS: u64 = 120;

/// One argument slot of a [`Command`].
///
/// At most one of `text`/`file` is meaningful. A `file` slot is resolved
/// to the file's contents before transmission when the path exists on the
/// harness side; the remote never reads files itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CmdArg {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl CmdArg {
    /// Slot carrying literal text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            file: None,
        }
    }

    /// Slot carrying a file path to be resolved before transmission.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            text: None,
            file: Some(path.into()),
        }
    }
}

/// Options that may accompany any command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestOptions {
    /// Report grouping key; defaults to the command kind.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Prompt displayed to the human; defaults to [`DEFAULT_PROMPT`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,

    /// Seconds before the command is abandoned as timed out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Modal notice shown before the prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub special_notice: Option<String>,

    /// New session display title; persists until changed again.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Display width hint in pixels (image commands only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    /// Display height hint in pixels (image commands only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// A command as transmitted to the remote viewer.
///
/// `cmdargs` always has exactly two slots, even for command kinds that
/// use fewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub cmd: String,
    pub cmdargs: [CmdArg; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<TestOptions>,
}

impl Command {
    /// Create a command with empty argument slots.
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            cmdargs: [CmdArg::default(), CmdArg::default()],
            options: None,
        }
    }

    /// Attach options.
    pub fn with_options(mut self, options: Option<TestOptions>) -> Self {
        self.options = options;
        self
    }

    /// Set the first argument slot.
    pub fn with_arg0(mut self, arg: CmdArg) -> Self {
        self.cmdargs[0] = arg;
        self
    }

    /// Set the second argument slot.
    pub fn with_arg1(mut self, arg: CmdArg) -> Self {
        self.cmdargs[1] = arg;
        self
    }

    /// The name this command's outcome is recorded under.
    pub fn report_key(&self) -> String {
        self.options
            .as_ref()
            .and_then(|o| o.name.clone())
            .unwrap_or_else(|| self.cmd.clone())
    }

    /// The effective timeout for this command, applying the defaulting
    /// rule (60 s, or 120 s for `verifyHuman`).
    pub fn timeout_secs(&self) -> u64 {
        match self.options.as_ref().and_then(|o| o.timeout) {
            Some(secs) => secs,
            None if self.cmd == VERIFY_HUMAN => VERIFY_HUMAN_TIMEOUT_SECS,
            None => DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Serialize to the single framed line written to the remote's stdin
    /// (terminator not included).
    pub fn to_wire(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Outcome of one command exchange.
///
/// Exactly one of three shapes holds: *passed* (`passed` set,
/// `skipped`/`error` absent), *skipped* (`skipped == true`, `passed`
/// absent), or *errored* (`error` set, `passed == false`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TestResponse {
    /// A skipped outcome carrying a reason comment.
    pub fn skipped(comment: impl Into<String>) -> Self {
        Self {
            skipped: Some(true),
            comment: Some(comment.into()),
            ..Self::default()
        }
    }

    /// The outcome synthesized when an ordinary command times out.
    pub fn timed_out() -> Self {
        Self::skipped("timeout")
    }

    /// The outcome synthesized when the availability check times out:
    /// skipped *and* errored, so callers can tell "nobody answered" from
    /// an ordinary skip.
    pub fn unavailable() -> Self {
        Self {
            passed: Some(false),
            skipped: Some(true),
            comment: Some("unavailable".to_string()),
            error: Some("timeout".to_string()),
        }
    }

    /// True when the human approved.
    pub fn is_passed(&self) -> bool {
        self.passed == Some(true)
    }

    /// True when the exchange was skipped (timeout, unattended, or the
    /// human chose to skip).
    pub fn is_skipped(&self) -> bool {
        self.skipped == Some(true)
    }

    /// Classify for report rendering.
    pub fn verdict(&self) -> Verdict {
        if self.is_skipped() {
            Verdict::Skipped
        } else if self.is_passed() {
            Verdict::Passed
        } else {
            Verdict::Failed
        }
    }
}

/// Report-facing classification of a [`TestResponse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    Failed,
    Skipped,
}

impl Verdict {
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Passed => "Passed",
            Verdict::Failed => "Failed",
            Verdict::Skipped => "Skipped",
        }
    }
}

/// A `verifyHuman` outcome where the human rejected (neither skipped nor
/// passed) is reported as the error `"rejected"`.
pub fn normalize_verify_human(mut response: TestResponse) -> TestResponse {
    if !response.is_skipped() && !response.is_passed() {
        response.error = Some("rejected".to_string());
        response.passed = Some(false);
    }
    response
}

/// One decoded line of remote stdout.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteLine {
    /// The exact ready marker.
    Ready,
    /// A well-formed response line.
    Response(TestResponse),
    /// A response-prefixed line whose payload did not parse as JSON.
    /// The affected exchange is left to its timeout rather than fed a
    /// fabricated result.
    Malformed(String),
    /// Anything else; informational only.
    Info(String),
}

/// Decode one line of remote stdout into its protocol meaning.
///
/// This is the single place the wire framing is interpreted; everything
/// else works with [`RemoteLine`].
pub fn decode_line(line: &str) -> RemoteLine {
    if line == READY_MARKER {
        return RemoteLine::Ready;
    }
    if let Some(payload) = line.strip_prefix(RESPONSE_PREFIX) {
        return match serde_json::from_str::<TestResponse>(payload) {
            Ok(response) => RemoteLine::Response(response),
            Err(_) => RemoteLine::Malformed(line.to_string()),
        };
    }
    RemoteLine::Info(line.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_serializes_with_two_slots() {
        let cmd = Command::new("showText").with_arg0(CmdArg::text("hi"));
        let wire = cmd.to_wire().unwrap();
        assert_eq!(wire, r#"{"cmd":"showText","cmdargs":[{"text":"hi"},{}]}"#);
    }

    #[test]
    fn options_use_camel_case_on_the_wire() {
        let cmd = Command::new("compareImages").with_options(Some(TestOptions {
            special_notice: Some("use the blink tool".to_string()),
            ..TestOptions::default()
        }));
        let wire = cmd.to_wire().unwrap();
        assert!(wire.contains(r#""specialNotice":"use the blink tool""#));
        assert!(!wire.contains("special_notice"));
    }

    #[test]
    fn report_key_prefers_name_option() {
        let cmd = Command::new("viewFile");
        assert_eq!(cmd.report_key(), "viewFile");

        let named = Command::new("viewFile").with_options(Some(TestOptions {
            name: Some("My Test Name".to_string()),
            ..TestOptions::default()
        }));
        assert_eq!(named.report_key(), "My Test Name");
    }

    #[test]
    fn timeout_defaulting_rule() {
        assert_eq!(Command::new("viewFile").timeout_secs(), 60);
        assert_eq!(Command::new(VERIFY_HUMAN).timeout_secs(), 120);

        let explicit = Command::new(VERIFY_HUMAN).with_options(Some(TestOptions {
            timeout: Some(5),
            ..TestOptions::default()
        }));
        assert_eq!(explicit.timeout_secs(), 5);
    }

    #[test]
    fn decode_ready_marker_is_exact() {
        assert_eq!(decode_line("HT>"), RemoteLine::Ready);
        // The marker embedded in larger output is not a ready signal.
        assert!(matches!(decode_line("xxHT>"), RemoteLine::Info(_)));
        assert!(matches!(decode_line("HT> "), RemoteLine::Info(_)));
        assert!(matches!(decode_line(""), RemoteLine::Info(_)));
    }

    #[test]
    fn decode_response_line() {
        let line = r#"[Response]: {"passed":true,"comment":"ok"}"#;
        match decode_line(line) {
            RemoteLine::Response(r) => {
                assert!(r.is_passed());
                assert_eq!(r.comment.as_deref(), Some("ok"));
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn decode_prefix_without_valid_json_is_malformed() {
        assert!(matches!(
            decode_line("[Response]: not json at all"),
            RemoteLine::Malformed(_)
        ));
        assert!(matches!(
            decode_line("[Response]: "),
            RemoteLine::Malformed(_)
        ));
    }

    #[test]
    fn response_round_trip() {
        let resp = TestResponse {
            passed: Some(true),
            comment: Some("ok".to_string()),
            ..TestResponse::default()
        };
        let wire = format!("{}{}", RESPONSE_PREFIX, serde_json::to_string(&resp).unwrap());
        assert_eq!(decode_line(&wire), RemoteLine::Response(resp));
    }

    #[test]
    fn verify_human_rejection_is_normalized() {
        let rejected = TestResponse {
            passed: Some(false),
            ..TestResponse::default()
        };
        let normalized = normalize_verify_human(rejected);
        assert_eq!(normalized.error.as_deref(), Some("rejected"));
        assert_eq!(normalized.passed, Some(false));

        // A pass or a skip is left alone.
        let passed = TestResponse {
            passed: Some(true),
            ..TestResponse::default()
        };
        assert!(normalize_verify_human(passed.clone()).error.is_none());
        let skipped = TestResponse::skipped("timeout");
        assert!(normalize_verify_human(skipped).error.is_none());
    }

    #[test]
    fn verdict_classification() {
        assert_eq!(TestResponse::skipped("x").verdict(), Verdict::Skipped);
        assert_eq!(
            TestResponse {
                passed: Some(true),
                ..TestResponse::default()
            }
            .verdict(),
            Verdict::Passed
        );
        assert_eq!(
            TestResponse {
                error: Some("boom".to_string()),
                passed: Some(false),
                ..TestResponse::default()
            }
            .verdict(),
            Verdict::Failed
        );
        // The unavailable shape counts as skipped, not failed.
        assert_eq!(TestResponse::unavailable().verdict(), Verdict::Skipped);
    }
}
