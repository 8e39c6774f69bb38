//! vouch: a human-in-the-loop test harness.
//!
//! This crate lets an automated test suite delegate judgment calls
//! ("does this look right?") to a human. It drives a separate
//! interactive viewer process and exchanges JSON-framed commands and
//! results with it over the viewer's standard streams.
//!
//! # Architecture
//!
//! The main components are:
//!
//! - **Protocol**: wire shapes and line framing shared with the remote
//! - **Launcher**: resolves and starts the remote viewer, wires streams
//! - **Session**: serializes command dispatch and correlates responses
//! - **Watchdog**: per-command timeout with live countdown
//! - **Report**: accumulates outcomes and renders text/HTML/Markdown
//!
//! # Example
//!
//! ```no_run
//! use vouch::{Session, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let session = Session::start(SessionConfig::new().with_title("Verify Content")).await;
//!     session.verify_human(None).await;
//!     let verdict = session.view_file("README.md", None).await;
//!     if verdict.is_passed() {
//!         println!("looks okay!");
//!     }
//!     session.end().await;
//! }
//! ```

pub mod launcher;
pub mod protocol;
pub mod report;
pub mod session;
pub mod watchdog;

// Re-export commonly used types
pub use protocol::{CmdArg, Command, TestOptions, TestResponse, Verdict};
pub use report::{ReportFormat, ReportLog};
pub use session::{Session, SessionConfig};
