//! Batch ingestion
//!
//! Streams the lines of one submitted file through the parser and the rule
//! engine. A bad line becomes an Error result for that line only; the file
//! as a whole fails only when its content cannot be decoded or read.

use std::io::{BufRead, Cursor};

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::Deserialize;
use validator::Validate;

use crate::classifier::{classify, fault_result, parse_delimited_row, parse_structured_line};
use crate::models::{FileFormat, FileReport, PerRecordResult};
use crate::utils::{file_extension, sha256_hex};

const UTF8_BOM: char = '\u{feff}';

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentEncoding {
    #[default]
    Text,
    Base64,
}

/// One file of a batch submission
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmittedFile {
    #[validate(length(min = 1, max = 255, message = "filename must be 1-255 characters"))]
    pub filename: String,
    pub content: String,
    #[serde(default)]
    pub encoding: ContentEncoding,
}

impl SubmittedFile {
    pub fn text(filename: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
            encoding: ContentEncoding::Text,
        }
    }
}

/// Stream-level failure of one file. Aborts the enclosing task.
#[derive(Debug, thiserror::Error)]
pub enum FileFault {
    #[error("Failed to read '{filename}' at line {line}: {source}")]
    Read {
        filename: String,
        line: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode '{filename}': {message}")]
    Decode { filename: String, message: String },

    #[error("Worker failed while processing '{filename}': {message}")]
    Worker { filename: String, message: String },
}

/// Everything produced by one fully read file
#[derive(Debug)]
pub struct IngestedFile {
    pub report: FileReport,
    pub results: Vec<PerRecordResult>,
}

/// Format from the file extension, falling back to sniffing the first
/// non-blank line for an object opener.
pub fn detect_format(filename: &str, content: &[u8]) -> FileFormat {
    match file_extension(filename).as_deref() {
        Some("json" | "jsonl" | "ndjson") => return FileFormat::Structured,
        Some("csv" | "txt" | "log") => return FileFormat::Delimited,
        _ => {}
    }

    let first = content
        .split(|b| *b == b'\n')
        .map(|line| String::from_utf8_lossy(line).trim().trim_start_matches(UTF8_BOM).to_string())
        .find(|line| !line.is_empty());

    match first {
        Some(line) if line.starts_with('{') => FileFormat::Structured,
        _ => FileFormat::Delimited,
    }
}

fn decode(file: &SubmittedFile) -> Result<Vec<u8>, FileFault> {
    match file.encoding {
        ContentEncoding::Text => Ok(file.content.as_bytes().to_vec()),
        ContentEncoding::Base64 => {
            BASE64
                .decode(file.content.trim())
                .map_err(|e| FileFault::Decode {
                    filename: file.filename.clone(),
                    message: e.to_string(),
                })
        }
    }
}

/// Read, parse and classify every line of one file.
///
/// `has_header` only applies to delimited files: their first non-blank line
/// is skipped without producing a result. Line numbers are physical and
/// 1-based, so the header and blank lines still count.
pub fn process_file(file: &SubmittedFile, has_header: bool) -> Result<IngestedFile, FileFault> {
    let bytes = decode(file)?;
    let format = detect_format(&file.filename, &bytes);
    let sha256 = sha256_hex(&bytes);

    let mut results = Vec::new();
    let mut header_pending = has_header && format == FileFormat::Delimited;
    let mut lines = 0;

    for (idx, line) in Cursor::new(bytes).lines().enumerate() {
        let line_number = idx + 1;
        let line = line.map_err(|source| FileFault::Read {
            filename: file.filename.clone(),
            line: line_number,
            source,
        })?;
        lines = line_number;

        let text = if idx == 0 {
            line.trim_start_matches(UTF8_BOM)
        } else {
            line.as_str()
        };
        if text.trim().is_empty() {
            continue;
        }

        let parsed = match format {
            FileFormat::Delimited => {
                let is_header_row = header_pending;
                header_pending = false;
                match parse_delimited_row(text, is_header_row) {
                    Ok(None) => continue,
                    Ok(Some(record)) => Ok(record),
                    Err(fault) => Err(fault),
                }
            }
            FileFormat::Structured => parse_structured_line(text),
        };

        let result = match parsed {
            Ok(record) => classify(&record),
            Err(fault) => fault_result(&fault),
        };
        results.push(PerRecordResult {
            filename: file.filename.clone(),
            line_number,
            result,
        });
    }

    tracing::debug!(
        filename = %file.filename,
        format = format.as_str(),
        lines,
        records = results.len(),
        "File processed"
    );

    Ok(IngestedFile {
        report: FileReport {
            filename: file.filename.clone(),
            format,
            lines,
            sha256,
        },
        results,
    })
}
