//! The three report renderers.
//!
//! Plain text, HTML, and Markdown share a single traversal of the
//! [`ReportLog`]; each format only supplies the surface syntax.

use std::time::Duration;

use crate::protocol::{TestResponse, Verdict};

use super::{ReportFormat, ReportLog};

/// Deepest structural heading level (HTML has no `<h7>`).
const MAX_HEADING: u8 = 6;

/// Banner shown instead of per-test detail when no human was available.
const UNATTENDED_BANNER: &str = "All tests skipped - no human available";

/// Render `log` in the requested format.
pub fn render(log: &ReportLog, format: ReportFormat, heading_size: u8, colorize: bool) -> String {
    match format {
        ReportFormat::Text => traverse(log, TextSurface::new(colorize)),
        ReportFormat::Html => traverse(log, HtmlSurface::new(heading_size)),
        ReportFormat::Markdown => traverse(log, MarkdownSurface::new(heading_size)),
    }
}

/// Format wall-clock elapsed time as `H:MM:SS`, `MM:SS`, or `N seconds`
/// depending on magnitude.
pub(crate) fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    if total >= 3600 {
        format!("{}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
    } else if total >= 60 {
        format!("{:02}:{:02}", total / 60, total % 60)
    } else if total == 1 {
        "1 second".to_string()
    } else {
        format!("{total} seconds")
    }
}

/// Comment/error text accompanying one outcome, if any.
fn detail(response: &TestResponse) -> Option<String> {
    match (&response.comment, &response.error) {
        (Some(comment), Some(error)) => Some(format!("{comment} (error: {error})")),
        (Some(comment), None) => Some(comment.clone()),
        (None, Some(error)) => Some(format!("error: {error}")),
        (None, None) => None,
    }
}

/// One output format's surface syntax. The traversal below is the only
/// caller.
trait Surface {
    fn begin(&mut self, title: &str, started: &str, elapsed: &str);
    fn section(&mut self, name: &str);
    fn outcome(&mut self, index: usize, verdict: Verdict, detail: Option<&str>);
    fn banner(&mut self, text: &str);
    fn end(self) -> String;
}

fn traverse<S: Surface>(log: &ReportLog, mut surface: S) -> String {
    let started = log.started_at().format("%Y-%m-%d %H:%M:%S").to_string();
    surface.begin(log.title(), &started, &format_elapsed(log.elapsed()));

    if log.all_skipped_unattended() {
        surface.banner(UNATTENDED_BANNER);
    } else {
        for section in log.visible_sections() {
            surface.section(&section.name);
            for (i, response) in section.outcomes.iter().enumerate() {
                surface.outcome(i + 1, response.verdict(), detail(response).as_deref());
            }
        }
    }

    surface.end()
}

struct TextSurface {
    out: String,
    colorize: bool,
}

impl TextSurface {
    fn new(colorize: bool) -> Self {
        Self {
            out: String::new(),
            colorize,
        }
    }

    fn label(&self, verdict: Verdict) -> String {
        if !self.colorize {
            return verdict.label().to_string();
        }
        let styled = match verdict {
            Verdict::Passed => console::style(verdict.label()).green(),
            Verdict::Failed => console::style(verdict.label()).red(),
            Verdict::Skipped => console::style(verdict.label()).yellow(),
        };
        styled.to_string()
    }
}

impl Surface for TextSurface {
    fn begin(&mut self, title: &str, started: &str, elapsed: &str) {
        self.out.push_str(title);
        self.out.push('\n');
        self.out.push_str(&"=".repeat(title.chars().count().max(1)));
        self.out.push('\n');
        self.out.push_str(&format!("Started: {started}\n"));
        self.out.push_str(&format!("Elapsed: {elapsed}\n"));
    }

    fn section(&mut self, name: &str) {
        self.out.push_str(&format!("\n{name}\n"));
        self.out.push_str(&"-".repeat(name.chars().count().max(1)));
        self.out.push('\n');
    }

    fn outcome(&mut self, index: usize, verdict: Verdict, detail: Option<&str>) {
        match detail {
            Some(text) => {
                self.out
                    .push_str(&format!("  {index}. {} - {text}\n", self.label(verdict)));
            }
            None => self.out.push_str(&format!("  {index}. {}\n", self.label(verdict))),
        }
    }

    fn banner(&mut self, text: &str) {
        self.out.push_str(&format!("\n{text}\n"));
    }

    fn end(mut self) -> String {
        self.out.push_str("\nEnd of report\n");
        self.out
    }
}

struct HtmlSurface {
    out: String,
    heading: u8,
}

impl HtmlSurface {
    fn new(heading_size: u8) -> Self {
        Self {
            out: String::new(),
            heading: heading_size.clamp(1, MAX_HEADING),
        }
    }

    fn subheading(&self) -> u8 {
        (self.heading + 1).min(MAX_HEADING)
    }
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

impl Surface for HtmlSurface {
    fn begin(&mut self, title: &str, started: &str, elapsed: &str) {
        let h = self.heading;
        self.out.push_str("<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\">");
        self.out
            .push_str(&format!("<title>{}</title></head>\n<body>\n", html_escape(title)));
        self.out
            .push_str(&format!("<h{h}>{}</h{h}>\n", html_escape(title)));
        self.out.push_str(&format!(
            "<p>Started: {}<br>\nElapsed: {}</p>\n",
            html_escape(started),
            html_escape(elapsed)
        ));
    }

    fn section(&mut self, name: &str) {
        let h = self.subheading();
        // A previous section leaves its list open.
        if self.out.ends_with("</li>\n") {
            self.out.push_str("</ol>\n");
        }
        self.out
            .push_str(&format!("<h{h}>{}</h{h}>\n<ol>\n", html_escape(name)));
    }

    fn outcome(&mut self, _index: usize, verdict: Verdict, detail: Option<&str>) {
        match detail {
            Some(text) => self.out.push_str(&format!(
                "<li>{} - {}</li>\n",
                verdict.label(),
                html_escape(text)
            )),
            None => self.out.push_str(&format!("<li>{}</li>\n", verdict.label())),
        }
    }

    fn banner(&mut self, text: &str) {
        self.out
            .push_str(&format!("<p><em>{}</em></p>\n", html_escape(text)));
    }

    fn end(mut self) -> String {
        if self.out.ends_with("</li>\n") {
            self.out.push_str("</ol>\n");
        }
        self.out.push_str("<hr>\n<p>End of report</p>\n</body>\n</html>\n");
        self.out
    }
}

struct MarkdownSurface {
    out: String,
    heading: u8,
}

impl MarkdownSurface {
    fn new(heading_size: u8) -> Self {
        Self {
            out: String::new(),
            heading: heading_size.clamp(1, MAX_HEADING),
        }
    }
}

impl Surface for MarkdownSurface {
    fn begin(&mut self, title: &str, started: &str, elapsed: &str) {
        let marks = "#".repeat(self.heading as usize);
        self.out.push_str(&format!("{marks} {title}\n\n"));
        self.out
            .push_str(&format!("Started: {started}  \nElapsed: {elapsed}\n"));
    }

    fn section(&mut self, name: &str) {
        let marks = "#".repeat(((self.heading + 1).min(MAX_HEADING)) as usize);
        self.out.push_str(&format!("\n{marks} {name}\n\n"));
    }

    fn outcome(&mut self, index: usize, verdict: Verdict, detail: Option<&str>) {
        match detail {
            Some(text) => self
                .out
                .push_str(&format!("{index}. {} - {text}\n", verdict.label())),
            None => self.out.push_str(&format!("{index}. {}\n", verdict.label())),
        }
    }

    fn banner(&mut self, text: &str) {
        self.out.push_str(&format!("\n*{text}*\n"));
    }

    fn end(mut self) -> String {
        self.out.push_str("\n---\nEnd of report\n");
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::VERIFY_HUMAN;

    fn sample_log() -> ReportLog {
        let mut log = ReportLog::new("Verify Content");
        log.record(
            "diff",
            TestResponse {
                passed: Some(true),
                ..TestResponse::default()
            },
        );
        log.record(
            "diff",
            TestResponse {
                passed: Some(false),
                comment: Some("mismatch".to_string()),
                ..TestResponse::default()
            },
        );
        log
    }

    #[test]
    fn elapsed_formats_by_magnitude() {
        assert_eq!(format_elapsed(Duration::from_secs(0)), "0 seconds");
        assert_eq!(format_elapsed(Duration::from_secs(1)), "1 second");
        assert_eq!(format_elapsed(Duration::from_secs(34)), "34 seconds");
        assert_eq!(format_elapsed(Duration::from_secs(60)), "01:00");
        assert_eq!(format_elapsed(Duration::from_secs(605)), "10:05");
        assert_eq!(format_elapsed(Duration::from_secs(3600)), "1:00:00");
        assert_eq!(format_elapsed(Duration::from_secs(3723)), "1:02:03");
    }

    #[test]
    fn text_report_numbers_outcomes_in_order() {
        let text = sample_log().render(ReportFormat::Text, 1, false);
        assert!(text.contains("Verify Content"));
        assert!(text.contains("diff"));
        let passed_at = text.find("1. Passed").unwrap();
        let failed_at = text.find("2. Failed - mismatch").unwrap();
        assert!(passed_at < failed_at);
    }

    #[test]
    fn markdown_report_shifts_headings() {
        let md = sample_log().render(ReportFormat::Markdown, 3, false);
        assert!(md.contains("### Verify Content"));
        assert!(md.contains("#### diff"));
        assert!(md.contains("1. Passed"));
        assert!(md.contains("2. Failed - mismatch"));
    }

    #[test]
    fn heading_levels_clamp_at_six() {
        let md = sample_log().render(ReportFormat::Markdown, 6, false);
        assert!(md.contains("###### Verify Content"));
        assert!(md.contains("###### diff"));
        assert!(!md.contains("#######"));
    }

    #[test]
    fn html_report_lists_outcomes() {
        let html = sample_log().render(ReportFormat::Html, 3, false);
        assert!(html.contains("<h3>Verify Content</h3>"));
        assert!(html.contains("<h4>diff</h4>"));
        assert!(html.contains("<li>Passed</li>"));
        assert!(html.contains("<li>Failed - mismatch</li>"));
        assert!(html.contains("</ol>"));
    }

    #[test]
    fn html_escapes_markup_in_comments() {
        let mut log = ReportLog::new("t");
        log.record(
            "showText",
            TestResponse {
                passed: Some(false),
                comment: Some("<b> & <i>".to_string()),
                ..TestResponse::default()
            },
        );
        let html = log.render(ReportFormat::Html, 1, false);
        assert!(html.contains("&lt;b&gt; &amp; &lt;i&gt;"));
    }

    #[test]
    fn unattended_banner_replaces_sections() {
        let mut log = ReportLog::new("t");
        log.record(VERIFY_HUMAN, TestResponse::unavailable());
        log.record("diff", TestResponse::skipped("unattended"));

        assert!(log.all_skipped_unattended());
        let text = log.render(ReportFormat::Text, 1, false);
        assert!(text.contains(UNATTENDED_BANNER));
        assert!(!text.contains("1. Skipped"));
    }

    #[test]
    fn colorized_text_still_contains_labels() {
        let text = sample_log().render(ReportFormat::Text, 1, true);
        assert!(text.contains("Passed"));
        assert!(text.contains("Failed"));
    }
}
