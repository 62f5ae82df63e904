// SPDX-License-Identifier: MIT OR Apache-2.0
//! Rendering a [`RunReport`](crate::RunReport) to one of the three output
//! formats `run` supports (§4.9, §6.3): human-readable text, a JSON array of
//! outcomes, or JUnit XML.
//!
//! JUnit XML is written by hand rather than through a crate: the surface is
//! small (one `<testsuite>`, one `<testcase>` per outcome, an optional
//! `<failure>`) and stable enough that a dependency would buy little.

use crate::{RunOutcome, RunReport};
use std::fmt;
use std::str::FromStr;

/// Output format for a run report (`run --output`, §6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// One line per outcome plus a pass/fail summary.
    Text,
    /// A JSON array of [`RunOutcome`].
    Json,
    /// JUnit XML with one `<testcase>` per outcome.
    Junit,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Text => "text",
            Self::Json => "json",
            Self::Junit => "junit",
        };
        f.write_str(s)
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "junit" => Ok(Self::Junit),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

impl RunReport {
    /// Render this report in `format`.
    pub fn render(&self, format: OutputFormat) -> String {
        match format {
            OutputFormat::Text => render_text(self),
            OutputFormat::Json => render_json(self),
            OutputFormat::Junit => render_junit(self),
        }
    }
}

fn render_text(report: &RunReport) -> String {
    let mut lines = Vec::with_capacity(report.outcomes.len() + 1);
    for outcome in &report.outcomes {
        let mark = if outcome.success { "PASS" } else { "FAIL" };
        let status = outcome.status_code.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string());
        lines.push(format!("{mark}  {:<28} {:<9} {:>4}  {}ms", outcome.name, outcome.protocol, status, outcome.duration_ms));
        if let Some(err) = &outcome.error {
            lines.push(format!("     {err}"));
        }
    }
    let passed = report.outcomes.iter().filter(|o| o.success).count();
    lines.push(format!("{passed}/{} passed", report.outcomes.len()));
    lines.join("\n")
}

fn render_json(report: &RunReport) -> String {
    serde_json::to_string_pretty(&report.outcomes).unwrap_or_default()
}

fn render_junit(report: &RunReport) -> String {
    let failures = report.outcomes.iter().filter(|o| !o.success).count();
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str(&format!("<testsuite name=\"gottp\" tests=\"{}\" failures=\"{failures}\">\n", report.outcomes.len()));
    for outcome in &report.outcomes {
        xml.push_str(&testcase_xml(outcome));
    }
    xml.push_str("</testsuite>\n");
    xml
}

fn testcase_xml(outcome: &RunOutcome) -> String {
    let seconds = outcome.duration_ms as f64 / 1000.0;
    let mut xml = format!(
        "  <testcase name=\"{}\" classname=\"{}\" time=\"{seconds:.3}\">\n",
        xml_escape(&outcome.name),
        xml_escape(&outcome.protocol),
    );
    if !outcome.success {
        let message = outcome.error.as_deref().unwrap_or("request failed");
        xml.push_str(&format!("    <failure message=\"{}\"/>\n", xml_escape(message)));
    }
    xml.push_str("  </testcase>\n");
    xml
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> RunReport {
        RunReport {
            outcomes: vec![
                RunOutcome { name: "Login".into(), path: "Auth/Login".into(), protocol: "http".into(), success: true, status_code: Some(200), duration_ms: 42, error: None },
                RunOutcome { name: "Broken".into(), path: "Broken".into(), protocol: "http".into(), success: false, status_code: Some(500), duration_ms: 11, error: Some("server error".into()) },
            ],
        }
    }

    #[test]
    fn output_format_roundtrips_through_display_and_from_str() {
        for fmt in [OutputFormat::Text, OutputFormat::Json, OutputFormat::Junit] {
            let parsed: OutputFormat = fmt.to_string().parse().unwrap();
            assert_eq!(parsed, fmt);
        }
    }

    #[test]
    fn output_format_rejects_unknown() {
        assert!("yaml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn text_render_includes_pass_fail_marks_and_summary() {
        let rendered = sample_report().render(OutputFormat::Text);
        assert!(rendered.contains("PASS"));
        assert!(rendered.contains("FAIL"));
        assert!(rendered.contains("server error"));
        assert!(rendered.contains("1/2 passed"));
    }

    #[test]
    fn json_render_is_a_valid_array_of_outcomes() {
        let rendered = sample_report().render(OutputFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert!(value.is_array());
        assert_eq!(value.as_array().unwrap().len(), 2);
    }

    #[test]
    fn junit_render_has_one_testcase_per_outcome_and_a_failure_element() {
        let rendered = sample_report().render(OutputFormat::Junit);
        assert_eq!(rendered.matches("<testcase").count(), 2);
        assert_eq!(rendered.matches("<failure").count(), 1);
        assert!(rendered.contains("tests=\"2\""));
        assert!(rendered.contains("failures=\"1\""));
    }

    #[test]
    fn junit_escapes_special_characters_in_failure_message() {
        let report = RunReport {
            outcomes: vec![RunOutcome { name: "A&B".into(), path: "A&B".into(), protocol: "http".into(), success: false, status_code: None, duration_ms: 1, error: Some("<broken> \"quote\"".into()) }],
        };
        let rendered = report.render(OutputFormat::Junit);
        assert!(rendered.contains("A&amp;B"));
        assert!(rendered.contains("&lt;broken&gt;"));
        assert!(rendered.contains("&quot;quote&quot;"));
    }
}
