//! Record parsing
//!
//! Turns one delimited row or one structured (JSON object) line into an
//! [`ActivityRecord`]. Every failure is returned as a [`ParseFault`] value;
//! nothing in here panics on bad input.

use serde_json::Value;

use crate::models::{Action, ActivityRecord, ThreatLabel};

/// Positional schema of a delimited row
pub const FIELD_NAMES: [&str; 10] = [
    "timestamp",
    "source_ip",
    "dest_ip",
    "protocol",
    "action",
    "threat_label",
    "log_type",
    "bytes_transferred",
    "user_agent",
    "request_path",
];

/// Fields that must be present and non-empty
const REQUIRED_FIELDS: [&str; 6] = [
    "timestamp",
    "source_ip",
    "action",
    "threat_label",
    "user_agent",
    "request_path",
];

/// Key lookup order for structured lines.
///
/// Each pair is (key in the input object, canonical field). Pairs are tried
/// in order and the first key present wins for its canonical field.
const STRUCTURED_KEYS: [(&str, &str); 12] = [
    ("timestamp", "timestamp"),
    ("source_ip", "source_ip"),
    ("dest_ip", "dest_ip"),
    ("protocol", "protocol"),
    ("action", "action"),
    ("threat_label", "threat_label"),
    ("label", "threat_label"),
    ("log_type", "log_type"),
    ("bytes_transferred", "bytes_transferred"),
    ("user_agent", "user_agent"),
    ("request_path", "request_path"),
    ("file_name", "request_path"),
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseFault {
    #[error("Empty input")]
    Empty,

    #[error("Expected 10 fields but found {found}; missing: {}", fields_after(.found))]
    TooFewFields { found: usize },

    #[error("Expected 10 fields but found {found}; quote values that contain commas")]
    TooManyFields { found: usize },

    #[error("Unterminated quoted value in field {field} ({})", field_name(.field))]
    UnterminatedQuote { field: usize },

    #[error("Unexpected text after closing quote in field {field} ({})", field_name(.field))]
    TextAfterQuote { field: usize },

    #[error("Row contains a line break outside quoted values")]
    LineBreak,

    #[error("Invalid structured record: {0}")]
    InvalidStructure(String),

    #[error("Structured record must be an object, found {0}")]
    NotAnObject(&'static str),

    #[error("Missing required fields: {}", join_fields(.0))]
    MissingFields(Vec<&'static str>),

    #[error("Invalid {field}: '{value}'")]
    InvalidValue { field: &'static str, value: String },
}

fn fields_after(found: &usize) -> String {
    FIELD_NAMES[(*found).min(FIELD_NAMES.len())..].join(", ")
}

fn field_name(position: &usize) -> &'static str {
    position
        .checked_sub(1)
        .and_then(|idx| FIELD_NAMES.get(idx))
        .copied()
        .unwrap_or("extra field")
}

fn join_fields(fields: &[&'static str]) -> String {
    fields.join(", ")
}

/// Field values keyed by canonical position, before validation
#[derive(Debug, Default)]
struct RawRecord {
    values: [String; 10],
}

impl RawRecord {
    fn get(&self, field: &str) -> &str {
        FIELD_NAMES
            .iter()
            .position(|name| *name == field)
            .map(|idx| self.values[idx].as_str())
            .unwrap_or("")
    }

    fn set(&mut self, field: &str, value: String) {
        if let Some(idx) = FIELD_NAMES.iter().position(|name| *name == field) {
            self.values[idx] = value;
        }
    }

    fn into_record(self) -> Result<ActivityRecord, ParseFault> {
        let missing: Vec<&'static str> = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|field| self.get(field).is_empty())
            .collect();
        if !missing.is_empty() {
            return Err(ParseFault::MissingFields(missing));
        }

        let action = Action::parse(self.get("action")).ok_or_else(|| ParseFault::InvalidValue {
            field: "action",
            value: self.get("action").to_string(),
        })?;

        let threat_label =
            ThreatLabel::parse(self.get("threat_label")).ok_or_else(|| ParseFault::InvalidValue {
                field: "threat_label",
                value: self.get("threat_label").to_string(),
            })?;

        let bytes = self.get("bytes_transferred");
        let bytes_transferred = if bytes.is_empty() {
            None
        } else {
            Some(
                bytes
                    .parse::<u64>()
                    .map_err(|_| ParseFault::InvalidValue {
                        field: "bytes_transferred",
                        value: bytes.to_string(),
                    })?,
            )
        };

        let [
            timestamp,
            source_ip,
            dest_ip,
            protocol,
            _,
            _,
            log_type,
            _,
            user_agent,
            request_path,
        ] = self.values;

        Ok(ActivityRecord {
            timestamp,
            source_ip,
            dest_ip,
            protocol,
            action,
            threat_label,
            log_type,
            bytes_transferred,
            user_agent,
            request_path,
        })
    }
}

/// Split one row on commas with RFC 4180 quoting.
///
/// A field is quoted when its first byte is `"`; its unescaped content is
/// kept verbatim. Unquoted values are trimmed. The csv reader accepts stray
/// text after a closing quote and a quote left open at the end of the row,
/// so each quoted value is checked against the raw bytes it came from.
pub fn split_row(row: &str) -> Result<Vec<String>, ParseFault> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(row.as_bytes());

    let mut record = csv::StringRecord::new();
    let found = reader
        .read_record(&mut record)
        .map_err(|e| ParseFault::InvalidStructure(e.to_string()))?;
    if !found {
        return Err(ParseFault::Empty);
    }

    let raw = row.as_bytes();
    let mut cursor = 0;
    let mut fields = Vec::with_capacity(record.len());
    for (idx, value) in record.iter().enumerate() {
        let field = idx + 1;
        if raw.get(cursor) == Some(&b'"') {
            // opening and closing quotes plus one extra byte per escaped quote
            let end = cursor + value.len() + value.matches('"').count() + 2;
            if end > raw.len() {
                return Err(ParseFault::UnterminatedQuote { field });
            }
            let closed = raw[end - 1] == b'"';
            if !closed || !matches!(raw.get(end), None | Some(b',' | b'\r' | b'\n')) {
                return Err(ParseFault::TextAfterQuote { field });
            }
            fields.push(value.to_string());
            cursor = end + 1;
        } else {
            fields.push(value.trim().to_string());
            cursor += value.len() + 1;
        }
    }

    if cursor <= raw.len() {
        return Err(ParseFault::LineBreak);
    }
    Ok(fields)
}

/// Parse one delimited row against the 10-column schema.
///
/// A header row carries no record and yields `Ok(None)`.
pub fn parse_delimited_row(
    row: &str,
    is_header_row: bool,
) -> Result<Option<ActivityRecord>, ParseFault> {
    if is_header_row {
        return Ok(None);
    }

    let row = row.trim();
    if row.is_empty() {
        return Err(ParseFault::Empty);
    }

    let fields = split_row(row)?;
    if fields.len() < FIELD_NAMES.len() {
        return Err(ParseFault::TooFewFields {
            found: fields.len(),
        });
    }
    if fields.len() > FIELD_NAMES.len() {
        return Err(ParseFault::TooManyFields {
            found: fields.len(),
        });
    }

    let mut raw = RawRecord::default();
    for (idx, value) in fields.into_iter().enumerate() {
        raw.values[idx] = value;
    }
    raw.into_record().map(Some)
}

/// Parse one self-describing JSON object line
pub fn parse_structured_line(line: &str) -> Result<ActivityRecord, ParseFault> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ParseFault::Empty);
    }

    let value: Value =
        serde_json::from_str(line).map_err(|e| ParseFault::InvalidStructure(e.to_string()))?;

    let object = match &value {
        Value::Object(map) => map,
        Value::Array(_) => return Err(ParseFault::NotAnObject("an array")),
        Value::String(_) => return Err(ParseFault::NotAnObject("a string")),
        Value::Number(_) => return Err(ParseFault::NotAnObject("a number")),
        Value::Bool(_) => return Err(ParseFault::NotAnObject("a boolean")),
        Value::Null => return Err(ParseFault::NotAnObject("null")),
    };

    let mut raw = RawRecord::default();
    let mut resolved = [false; 10];
    for (key, canonical) in STRUCTURED_KEYS {
        let Some(idx) = FIELD_NAMES.iter().position(|name| *name == canonical) else {
            continue;
        };
        if resolved[idx] {
            continue;
        }
        if let Some(text) = object.get(key).and_then(value_text) {
            raw.set(canonical, text);
            resolved[idx] = true;
        }
    }

    raw.into_record()
}

/// Parse a single free-standing input: structured when it looks like an
/// object, delimited otherwise.
pub fn parse_input(input: &str) -> Result<ActivityRecord, ParseFault> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ParseFault::Empty);
    }
    if input.starts_with('{') {
        return parse_structured_line(input);
    }
    parse_delimited_row(input, false)?.ok_or(ParseFault::Empty)
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}
