//! Parsing of pylint reports into analysis issues.
//!
//! Accepts both the `json` reporter (a bare message array) and the `json2`
//! reporter (`{"messages": [...], "statistics": {"score": ..}}`). When the
//! score is not part of the JSON, it is recovered from the text
//! `rated at X/10` line if present.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

static SCORE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"rated at (-?\d+(?:\.\d+)?)/10").expect("score regex is valid")
});

/// A single finding reported by the analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Message category (`convention`, `warning`, `error`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    pub line: u32,
    pub column: u32,
    pub message: String,
    pub symbol: String,
}

/// Parsed pylint report.
#[derive(Debug, Clone, PartialEq)]
pub struct PylintReport {
    pub issues: Vec<Issue>,
    pub score: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawReport {
    Messages(Vec<RawMessage>),
    Structured {
        messages: Vec<RawMessage>,
        #[serde(default)]
        statistics: Option<RawStatistics>,
    },
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    line: Option<u32>,
    #[serde(default)]
    column: Option<u32>,
    message: String,
    symbol: String,
}

#[derive(Debug, Deserialize)]
struct RawStatistics {
    #[serde(default)]
    score: Option<f64>,
}

impl From<RawMessage> for Issue {
    fn from(raw: RawMessage) -> Self {
        Self {
            kind: raw.kind,
            line: raw.line.unwrap_or(0),
            column: raw.column.unwrap_or(0),
            message: raw.message,
            symbol: raw.symbol,
        }
    }
}

/// Parse pylint stdout. `extra_text` (usually stderr) is searched for a score line.
pub fn parse_report(stdout: &str, extra_text: &str) -> Result<PylintReport> {
    let trimmed = stdout.trim();
    let mut values = serde_json::Deserializer::from_str(trimmed).into_iter::<RawReport>();
    let raw = match values.next() {
        Some(parsed) => parsed.context("parse pylint json output")?,
        None => RawReport::Messages(Vec::new()),
    };
    let trailer = &trimmed[values.byte_offset()..];

    let (messages, json_score) = match raw {
        RawReport::Messages(messages) => (messages, None),
        RawReport::Structured {
            messages,
            statistics,
        } => (messages, statistics.and_then(|stats| stats.score)),
    };

    let score = json_score
        .or_else(|| parse_score(trailer))
        .or_else(|| parse_score(extra_text));

    Ok(PylintReport {
        issues: messages.into_iter().map(Issue::from).collect(),
        score,
    })
}

/// Extract the `rated at X/10` score from pylint's text summary.
pub fn parse_score(text: &str) -> Option<f64> {
    SCORE_LINE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON_REPORT: &str = r#"[
        {"type": "convention", "module": "a", "obj": "", "line": 1, "column": 0,
         "endLine": null, "endColumn": null, "path": "a.py", "symbol": "missing-module-docstring",
         "message": "Missing module docstring", "message-id": "C0114"}
    ]"#;

    #[test]
    fn parses_json_reporter() {
        let report = parse_report(JSON_REPORT, "").expect("parse");
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].symbol, "missing-module-docstring");
        assert_eq!(report.issues[0].kind, "convention");
        assert_eq!(report.score, None);
    }

    #[test]
    fn parses_json2_reporter_score() {
        let stdout = r#"{"messages": [{"type": "warning", "line": 3, "column": 4,
            "message": "Unused variable 'x'", "symbol": "unused-variable"}],
            "statistics": {"messageTypeCount": {}, "modulesLinted": 1, "score": 7.5}}"#;
        let report = parse_report(stdout, "").expect("parse");
        assert_eq!(report.issues[0].line, 3);
        assert_eq!(report.score, Some(7.5));
    }

    #[test]
    fn score_falls_back_to_text_summary() {
        let stdout = format!(
            "{JSON_REPORT}\n\nYour code has been rated at 8.33/10 (previous run: 8.00/10, +0.33)\n"
        );
        let report = parse_report(&stdout, "").expect("parse");
        assert_eq!(report.score, Some(8.33));
    }

    /// Brackets after the report belong to the trailer, not the JSON.
    #[test]
    fn trailer_with_brackets_is_not_json() {
        let stdout = format!(
            "{JSON_REPORT}\nYour code has been rated at 9.00/10 [cached] {{run 2}}\n"
        );
        let report = parse_report(&stdout, "").expect("parse");
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.score, Some(9.0));
    }

    #[test]
    fn empty_output_has_no_issues() {
        let report = parse_report("", "").expect("parse");
        assert!(report.issues.is_empty());
        assert_eq!(parse_score("rated at -2.5/10"), Some(-2.5));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_report("Traceback: boom]", "").is_err());
    }
}
