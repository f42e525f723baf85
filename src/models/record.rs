use serde::{Deserialize, Serialize};

/// Outcome recorded by the sensor for the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Allowed,
    Blocked,
    Failed,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Allowed => "allowed",
            Action::Blocked => "blocked",
            Action::Failed => "failed",
        }
    }

    /// Case-insensitive lookup. Returns `None` on unrecognised values.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "allowed" => Some(Action::Allowed),
            "blocked" => Some(Action::Blocked),
            "failed" => Some(Action::Failed),
            _ => None,
        }
    }
}

/// Label attached upstream by the IDS / log pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLabel {
    Benign,
    Suspicious,
    Unknown,
}

impl ThreatLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatLabel::Benign => "benign",
            ThreatLabel::Suspicious => "suspicious",
            ThreatLabel::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "benign" => Some(ThreatLabel::Benign),
            "suspicious" => Some(ThreatLabel::Suspicious),
            "unknown" => Some(ThreatLabel::Unknown),
            _ => None,
        }
    }
}

/// Canonical form of one exported log row.
///
/// Built only by the record parser; nothing mutates it afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityRecord {
    pub timestamp: String,
    pub source_ip: String,
    pub dest_ip: String,
    pub protocol: String,
    pub action: Action,
    pub threat_label: ThreatLabel,
    pub log_type: String,
    pub bytes_transferred: Option<u64>,
    pub user_agent: String,
    pub request_path: String,
}

/// How the lines of an evidence file are laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    /// One comma-separated row per line, fixed 10-column schema
    Delimited,
    /// One JSON object per line
    Structured,
}

impl FileFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Delimited => "delimited",
            FileFormat::Structured => "structured",
        }
    }
}
