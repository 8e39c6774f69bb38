//! Result accumulation and report production.
//!
//! Every completed exchange is recorded under its report key. On demand
//! the accumulated results render as plain text, HTML, or Markdown, all
//! sharing one traversal (see [`render`]).

pub mod render;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use chrono::{DateTime, Local};

use crate::protocol::{TestResponse, VERIFY_HUMAN};

/// Output formats for a produced report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Text,
    Html,
    Markdown,
}

impl ReportFormat {
    /// File extension for this format, dot included.
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Text => ".txt",
            ReportFormat::Html => ".html",
            ReportFormat::Markdown => ".md",
        }
    }
}

impl std::str::FromStr for ReportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(ReportFormat::Text),
            "html" => Ok(ReportFormat::Html),
            "markdown" | "md" => Ok(ReportFormat::Markdown),
            other => anyhow::bail!("unknown report format: {other}"),
        }
    }
}

/// One named group of recorded outcomes, in completion order.
#[derive(Debug, Clone)]
pub(crate) struct Section {
    pub name: String,
    pub outcomes: Vec<TestResponse>,
}

/// Accumulates every completed result of a session, keyed by test name
/// in first-seen order.
pub struct ReportLog {
    title: String,
    started_at: DateTime<Local>,
    started: Instant,
    sections: Vec<Section>,
}

impl ReportLog {
    /// Empty log stamped with the session start time.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            started_at: Local::now(),
            started: Instant::now(),
            sections: Vec::new(),
        }
    }

    /// Update the display title (commands may change it mid-session).
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Append `response` to the section named `name`, creating the
    /// section on first sight.
    pub fn record(&mut self, name: &str, response: TestResponse) {
        match self.sections.iter_mut().find(|s| s.name == name) {
            Some(section) => section.outcomes.push(response),
            None => self.sections.push(Section {
                name: name.to_string(),
                outcomes: vec![response],
            }),
        }
    }

    /// True when the availability check was recorded with a lone skip,
    /// meaning no human ever answered and every test auto-skipped.
    pub(crate) fn all_skipped_unattended(&self) -> bool {
        self.sections
            .iter()
            .find(|s| s.name == VERIFY_HUMAN)
            .is_some_and(|s| s.outcomes.len() == 1 && s.outcomes[0].is_skipped())
    }

    /// Sections to render: everything except the reserved availability
    /// check, which only gates the banner.
    pub(crate) fn visible_sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter().filter(|s| s.name != VERIFY_HUMAN)
    }

    pub(crate) fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub(crate) fn elapsed(&self) -> std::time::Duration {
        self.started.elapsed()
    }

    /// Render the report as a string. `heading_size` shifts structural
    /// heading levels (HTML/Markdown only); `colorize` styles the plain
    /// text renderer for terminal display.
    pub fn render(&self, format: ReportFormat, heading_size: u8, colorize: bool) -> String {
        render::render(self, format, heading_size, colorize)
    }

    /// Write the report to `base` + the format's fixed extension and
    /// return the path written.
    pub fn write_to(
        &self,
        base: &Path,
        format: ReportFormat,
        heading_size: u8,
    ) -> anyhow::Result<PathBuf> {
        let mut file_name = base.as_os_str().to_os_string();
        file_name.push(format.extension());
        let path = PathBuf::from(file_name);
        let contents = self.render(format, heading_size, false);
        std::fs::write(&path, contents)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passed() -> TestResponse {
        TestResponse {
            passed: Some(true),
            ..TestResponse::default()
        }
    }

    #[test]
    fn sections_keep_first_seen_order() {
        let mut log = ReportLog::new("t");
        log.record("diff", passed());
        log.record("viewFile", passed());
        log.record("diff", TestResponse::skipped("timeout"));

        let names: Vec<_> = log.visible_sections().map(|s| s.name.clone()).collect();
        assert_eq!(names, ["diff", "viewFile"]);
        assert_eq!(log.sections[0].outcomes.len(), 2);
    }

    #[test]
    fn verify_human_is_never_a_visible_section() {
        let mut log = ReportLog::new("t");
        log.record(VERIFY_HUMAN, passed());
        log.record("diff", passed());
        let names: Vec<_> = log.visible_sections().map(|s| s.name.clone()).collect();
        assert_eq!(names, ["diff"]);
        assert!(!log.all_skipped_unattended());
    }

    #[test]
    fn lone_skipped_verify_human_means_unattended() {
        let mut log = ReportLog::new("t");
        log.record(VERIFY_HUMAN, TestResponse::unavailable());
        assert!(log.all_skipped_unattended());
    }

    #[test]
    fn extension_map_is_fixed() {
        assert_eq!(ReportFormat::Text.extension(), ".txt");
        assert_eq!(ReportFormat::Html.extension(), ".html");
        assert_eq!(ReportFormat::Markdown.extension(), ".md");
    }

    #[test]
    fn write_appends_extension_to_base() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = ReportLog::new("t");
        log.record("diff", passed());

        let base = dir.path().join("humanTest");
        let path = log.write_to(&base, ReportFormat::Markdown, 3).unwrap();
        assert_eq!(path, dir.path().join("humanTest.md"));
        let contents = std::fs::read_to_string(path).unwrap();
        assert!(contents.contains("diff"));
    }
}
