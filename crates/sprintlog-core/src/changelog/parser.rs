//! JSON-lines changelog parser.
//!
//! One changelog item per line:
//!
//! ```text
//! {"issue_id": 10, "field": "Sprint", "from": "1,2", "to": "2,3", "created": "2021-06-01T10:00:00Z"}
//! ```
//!
//! - Comment lines start with `#` and are returned as [`ParsedLine::Comment`].
//! - Blank/whitespace-only lines are returned as [`ParsedLine::Blank`].
//! - A bad line never aborts a document parse; it is collected as a
//!   [`LineError`] and the caller decides what to do with it.

use std::io::BufRead;

use tracing::warn;

use super::ChangeEvent;

/// Errors that can occur while parsing one changelog line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The line is not a JSON object.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    /// The object is missing a field or a field has the wrong type.
    #[error("changelog item schema mismatch: {0}")]
    SchemaMismatch(String),
}

/// Result of parsing a single line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine<'a> {
    Event(Box<ChangeEvent>),
    Comment(&'a str),
    Blank,
}

/// A parse failure tied to its 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineError {
    pub line_no: usize,
    pub error: ParseError,
}

/// Every event that parsed, plus every line that did not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedChangelog {
    pub events: Vec<ChangeEvent>,
    pub errors: Vec<LineError>,
}

/// Parse a single changelog line.
///
/// # Errors
///
/// Returns [`ParseError`] if the line is neither blank, a comment, nor a
/// valid changelog item.
pub fn parse_line(line: &str) -> Result<ParsedLine<'_>, ParseError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(ParsedLine::Blank);
    }
    if trimmed.starts_with('#') {
        return Ok(ParsedLine::Comment(trimmed));
    }

    let value: serde_json::Value =
        serde_json::from_str(trimmed).map_err(|e| ParseError::InvalidJson(e.to_string()))?;
    if !value.is_object() {
        return Err(ParseError::InvalidJson("expected a JSON object".into()));
    }
    let event: ChangeEvent =
        serde_json::from_value(value).map_err(|e| ParseError::SchemaMismatch(e.to_string()))?;
    Ok(ParsedLine::Event(Box::new(event)))
}

/// Parse a whole in-memory document.
#[must_use]
pub fn parse_document(text: &str) -> ParsedChangelog {
    let mut parsed = ParsedChangelog::default();
    for (idx, line) in text.lines().enumerate() {
        collect(&mut parsed, idx + 1, line);
    }
    parsed
}

/// Parse from a buffered reader, line by line.
///
/// # Errors
///
/// Returns an I/O error if reading fails. Malformed lines are not errors;
/// they land in [`ParsedChangelog::errors`].
pub fn parse_reader<R: BufRead>(reader: R) -> std::io::Result<ParsedChangelog> {
    let mut parsed = ParsedChangelog::default();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        collect(&mut parsed, idx + 1, &line);
    }
    Ok(parsed)
}

fn collect(parsed: &mut ParsedChangelog, line_no: usize, line: &str) {
    match parse_line(line) {
        Ok(ParsedLine::Event(event)) => parsed.events.push(*event),
        Ok(ParsedLine::Comment(_) | ParsedLine::Blank) => {}
        Err(error) => {
            warn!(line_no, error = %error, "skipping malformed changelog line");
            parsed.errors.push(LineError { line_no, error });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changelog::ChangeField;

    #[test]
    fn blank_and_comment_lines() {
        assert_eq!(parse_line("   "), Ok(ParsedLine::Blank));
        assert_eq!(
            parse_line("# exported 2021-06-01"),
            Ok(ParsedLine::Comment("# exported 2021-06-01"))
        );
    }

    #[test]
    fn parses_event_line() {
        let line = r#"{"issue_id": 3, "field": "status", "from": "Open", "to": "Done", "created": "2021-06-01T10:00:00Z"}"#;
        let Ok(ParsedLine::Event(event)) = parse_line(line) else {
            panic!("expected event line");
        };
        assert_eq!(event.issue_source_id, 3);
        assert_eq!(event.field, ChangeField::Status);
        assert_eq!(event.to_value, "Done");
    }

    #[test]
    fn rejects_non_object_json() {
        assert!(matches!(
            parse_line("[1, 2, 3]"),
            Err(ParseError::InvalidJson(_))
        ));
    }

    #[test]
    fn rejects_missing_timestamp() {
        let line = r#"{"issue_id": 3, "field": "status"}"#;
        assert!(matches!(
            parse_line(line),
            Err(ParseError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn rejects_negative_issue_id() {
        let line = r#"{"issue_id": -1, "field": "status", "created": "2021-06-01T10:00:00Z"}"#;
        assert!(parse_line(line).is_err());
    }

    #[test]
    fn document_collects_errors_with_line_numbers() {
        let text = "\
# header
{\"issue_id\": 1, \"field\": \"status\", \"to\": \"Open\", \"created\": \"2021-06-01T10:00:00Z\"}
not json

{\"issue_id\": 1, \"field\": \"status\", \"to\": \"Done\", \"created\": \"2021-06-02T10:00:00Z\"}
";
        let parsed = parse_document(text);
        assert_eq!(parsed.events.len(), 2);
        assert_eq!(parsed.errors.len(), 1);
        assert_eq!(parsed.errors[0].line_no, 3);
    }

    #[test]
    fn reader_matches_document() {
        let text = "{\"issue_id\": 9, \"field\": \"Sprint\", \"to\": \"4\", \"created\": \"2021-06-01T10:00:00Z\"}\n";
        let from_reader = parse_reader(std::io::Cursor::new(text)).expect("read");
        assert_eq!(from_reader, parse_document(text));
    }
}
