//! Indicator patterns
//!
//! The ordered indicator table maps substrings of `request_path` and
//! `user_agent` to an attack type. Rules 1 and 2 both resolve their attack
//! type through [`match_indicator`], so overlapping matches are always
//! broken the same way: the earliest entry wins.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{ActivityRecord, AttackType, ThreatLabel};

pub const BACKUP_MARKERS: &[&str] = &[
    "backup.sql",
    "backup.zip",
    "backup.db",
    "backup.tar",
    "/backup",
    "?backup",
];

pub const TRAVERSAL_MARKERS: &[&str] = &["../", "..\\", "%2e%2e", "/etc/", "\\etc\\"];

/// Subset of the traversal markers naming concrete system files
pub const SYSTEM_FILE_MARKERS: &[&str] = &[
    "/etc/passwd",
    "/etc/shadow",
    "/etc/sudoers",
    "\\etc\\passwd",
    "\\etc\\shadow",
];

pub const ADMIN_MARKERS: &[&str] = &["/admin", "?admin", "/wp-admin", "/administrator"];

const LOGIN_MARKERS: &[&str] = &["/login", "?login", "/wp-login", "/signin", "/auth"];

const UPLOAD_MARKERS: &[&str] = &["/upload"];

const RISKY_UPLOAD_MARKERS: &[&str] = &[
    ".php", ".phtml", ".jsp", ".asp", ".exe", ".bat", ".ps1", ".sh", "phpmyadmin",
];

const SQL_INJECTION_AGENTS: &[&str] = &["sqlmap"];

const SCANNER_AGENTS: &[&str] = &["nmap", "nikto", "nessus", "masscan", "zmap"];

const FETCH_TOOL_AGENTS: &[&str] = &["curl/", "wget/", "python-requests", "go-http-client"];

/// Paths worth flagging when a scripted client reaches them
const SENSITIVE_PATH_MARKERS: &[&str] = &[
    "/admin",
    "/backup",
    "backup.sql",
    "/etc/",
    "phpmyadmin",
    "/upload",
    "/download",
    "/config",
    ".env",
];

static SQL_INJECTION_PAYLOAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)union(\s|\+|%20)+(all(\s|\+|%20)+)?select|drop(\s|\+|%20)+table|'\s*or\s+1\s*=\s*1",
    )
    .expect("SQL injection pattern is valid")
});

/// Lower-cased views of the fields the rules inspect
#[derive(Debug)]
pub struct Evidence<'a> {
    pub record: &'a ActivityRecord,
    pub path: String,
    pub agent: String,
    pub protocol: String,
}

impl<'a> Evidence<'a> {
    pub fn new(record: &'a ActivityRecord) -> Self {
        Self {
            record,
            path: record.request_path.to_lowercase(),
            agent: record.user_agent.to_lowercase(),
            protocol: record.protocol.trim().to_ascii_uppercase(),
        }
    }

    pub fn path_marker(&self, markers: &[&'static str]) -> Option<&'static str> {
        first_marker(&self.path, markers)
    }

    pub fn agent_marker(&self, markers: &[&'static str]) -> Option<&'static str> {
        first_marker(&self.agent, markers)
    }

    pub fn is_sensitive_path(&self) -> Option<&'static str> {
        self.path_marker(SENSITIVE_PATH_MARKERS)
    }
}

fn first_marker(haystack: &str, markers: &[&'static str]) -> Option<&'static str> {
    markers.iter().copied().find(|marker| haystack.contains(marker))
}

/// A hit in the indicator table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorMatch {
    pub attack_type: AttackType,
    pub field: &'static str,
    pub pattern: String,
}

impl IndicatorMatch {
    fn new(attack_type: AttackType, field: &'static str, pattern: impl Into<String>) -> Self {
        Self {
            attack_type,
            field,
            pattern: pattern.into(),
        }
    }

    pub fn describe(&self) -> String {
        format!(
            "{} (matched '{}' in {})",
            self.attack_type.as_str().to_lowercase(),
            self.pattern,
            self.field
        )
    }
}

#[derive(Debug, Clone, Copy)]
enum Indicator {
    BackupAccess,
    PathTraversal,
    AdminPath,
    LoginWithSignal,
    RiskyUpload,
    SqlInjection,
    Scanner,
    FetchToolOnSensitivePath,
}

/// Evaluation order of the indicator table
const INDICATOR_TABLE: [Indicator; 8] = [
    Indicator::BackupAccess,
    Indicator::PathTraversal,
    Indicator::AdminPath,
    Indicator::LoginWithSignal,
    Indicator::RiskyUpload,
    Indicator::SqlInjection,
    Indicator::Scanner,
    Indicator::FetchToolOnSensitivePath,
];

impl Indicator {
    fn check(&self, evidence: &Evidence<'_>) -> Option<IndicatorMatch> {
        match self {
            Indicator::BackupAccess => evidence.path_marker(BACKUP_MARKERS).map(|m| {
                IndicatorMatch::new(AttackType::UnauthorizedBackupAccess, "request_path", m)
            }),
            Indicator::PathTraversal => evidence
                .path_marker(TRAVERSAL_MARKERS)
                .map(|m| IndicatorMatch::new(AttackType::PathTraversal, "request_path", m)),
            Indicator::AdminPath => evidence
                .path_marker(ADMIN_MARKERS)
                .map(|m| IndicatorMatch::new(AttackType::PrivilegeEscalation, "request_path", m)),
            Indicator::LoginWithSignal => {
                let marker = evidence.path_marker(LOGIN_MARKERS)?;
                let signalled = evidence.record.threat_label == ThreatLabel::Suspicious
                    || offensive_tool(evidence).is_some();
                signalled
                    .then(|| IndicatorMatch::new(AttackType::SuspiciousLogin, "request_path", marker))
            }
            Indicator::RiskyUpload => {
                let upload = evidence.path_marker(UPLOAD_MARKERS)?;
                let payload = evidence.path_marker(RISKY_UPLOAD_MARKERS)?;
                Some(IndicatorMatch::new(
                    AttackType::MalwareUpload,
                    "request_path",
                    format!("{upload} + {payload}"),
                ))
            }
            Indicator::SqlInjection => {
                if let Some(m) = evidence.agent_marker(SQL_INJECTION_AGENTS) {
                    return Some(IndicatorMatch::new(AttackType::SqlInjection, "user_agent", m));
                }
                SQL_INJECTION_PAYLOAD
                    .find(&evidence.record.request_path)
                    .map(|m| {
                        IndicatorMatch::new(AttackType::SqlInjection, "request_path", m.as_str())
                    })
            }
            Indicator::Scanner => evidence.agent_marker(SCANNER_AGENTS).map(|m| {
                IndicatorMatch::new(AttackType::NetworkReconnaissance, "user_agent", m)
            }),
            Indicator::FetchToolOnSensitivePath => {
                let tool = evidence.agent_marker(FETCH_TOOL_AGENTS)?;
                let path = evidence.is_sensitive_path()?;
                Some(IndicatorMatch::new(
                    AttackType::SuspiciousActivity,
                    "user_agent",
                    format!("{tool} against {path}"),
                ))
            }
        }
    }
}

/// First matching entry of the indicator table, if any
pub fn match_indicator(evidence: &Evidence<'_>) -> Option<IndicatorMatch> {
    INDICATOR_TABLE
        .iter()
        .find_map(|indicator| indicator.check(evidence))
}

/// Known offensive-tool signature in the user agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSignature {
    pub marker: &'static str,
    pub attack_type: AttackType,
    /// Generic fetch tools only count against a sensitive path
    pub requires_sensitive_path: bool,
}

pub fn offensive_tool(evidence: &Evidence<'_>) -> Option<ToolSignature> {
    if let Some(marker) = evidence.agent_marker(SQL_INJECTION_AGENTS) {
        return Some(ToolSignature {
            marker,
            attack_type: AttackType::SqlInjection,
            requires_sensitive_path: false,
        });
    }
    if let Some(marker) = evidence.agent_marker(SCANNER_AGENTS) {
        return Some(ToolSignature {
            marker,
            attack_type: AttackType::NetworkReconnaissance,
            requires_sensitive_path: false,
        });
    }
    evidence
        .agent_marker(FETCH_TOOL_AGENTS)
        .map(|marker| ToolSignature {
            marker,
            attack_type: AttackType::SuspiciousActivity,
            requires_sensitive_path: true,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Action;

    fn record(path: &str, agent: &str, label: ThreatLabel) -> ActivityRecord {
        ActivityRecord {
            timestamp: "2024-07-31T00:00:00".to_string(),
            source_ip: "10.0.0.1".to_string(),
            dest_ip: "10.0.0.2".to_string(),
            protocol: "HTTP".to_string(),
            action: Action::Blocked,
            threat_label: label,
            log_type: "ids".to_string(),
            bytes_transferred: None,
            user_agent: agent.to_string(),
            request_path: path.to_string(),
        }
    }

    fn attack(path: &str, agent: &str, label: ThreatLabel) -> Option<AttackType> {
        let r = record(path, agent, label);
        match_indicator(&Evidence::new(&r)).map(|m| m.attack_type)
    }

    #[test]
    fn table_order_breaks_overlaps() {
        // backup beats login
        assert_eq!(
            attack("/login?backup.sql", "Mozilla/5.0", ThreatLabel::Suspicious),
            Some(AttackType::UnauthorizedBackupAccess)
        );
        // traversal beats admin
        assert_eq!(
            attack("/admin/../../etc/passwd", "Mozilla/5.0", ThreatLabel::Benign),
            Some(AttackType::PathTraversal)
        );
        // path indicators beat agent indicators
        assert_eq!(
            attack("/wp-admin", "sqlmap/1.6-dev", ThreatLabel::Benign),
            Some(AttackType::PrivilegeEscalation)
        );
    }

    #[test]
    fn windows_style_traversal_matches() {
        assert_eq!(
            attack(r"/?..\..\etc\passwd", "SQLMap/1.6-dev", ThreatLabel::Suspicious),
            Some(AttackType::PathTraversal)
        );
    }

    #[test]
    fn login_needs_a_suspicious_signal() {
        assert_eq!(attack("/login", "Mozilla/5.0", ThreatLabel::Benign), None);
        assert_eq!(
            attack("/login", "Mozilla/5.0", ThreatLabel::Suspicious),
            Some(AttackType::SuspiciousLogin)
        );
        assert_eq!(
            attack("/api/login", "curl/7.64.1", ThreatLabel::Benign),
            Some(AttackType::SuspiciousLogin)
        );
    }

    #[test]
    fn upload_needs_risky_payload() {
        assert_eq!(attack("/upload/avatar.png", "Mozilla/5.0", ThreatLabel::Benign), None);
        assert_eq!(
            attack("/upload?phpmyadmin", "Mozilla/5.0", ThreatLabel::Benign),
            Some(AttackType::MalwareUpload)
        );
        assert_eq!(
            attack("/upload/shell.php", "Mozilla/5.0", ThreatLabel::Benign),
            Some(AttackType::MalwareUpload)
        );
    }

    #[test]
    fn agent_and_payload_markers() {
        assert_eq!(
            attack("/api/test", "SQLMap/1.6-dev", ThreatLabel::Benign),
            Some(AttackType::SqlInjection)
        );
        assert_eq!(
            attack("/items?id=1 UNION SELECT password", "Mozilla/5.0", ThreatLabel::Benign),
            Some(AttackType::SqlInjection)
        );
        assert_eq!(
            attack("/", "Nmap Scripting Engine", ThreatLabel::Benign),
            Some(AttackType::NetworkReconnaissance)
        );
        assert_eq!(attack("/", "Mozilla/5.0", ThreatLabel::Benign), None);
    }

    #[test]
    fn fetch_tool_is_an_indicator_only_on_sensitive_paths() {
        assert_eq!(
            attack("/download/report.pdf", "curl/7.64.1", ThreatLabel::Benign),
            Some(AttackType::SuspiciousActivity)
        );
        assert_eq!(attack("/index.html", "curl/7.64.1", ThreatLabel::Benign), None);
    }

    #[test]
    fn describe_names_pattern_and_field() {
        let r = record("/download?backup.sql", "Mozilla/5.0", ThreatLabel::Benign);
        let hit = match_indicator(&Evidence::new(&r)).unwrap();
        assert_eq!(
            hit.describe(),
            "unauthorized backup access (matched 'backup.sql' in request_path)"
        );
    }

    #[test]
    fn fetch_tools_require_sensitive_path() {
        let r = record("/config/app.yaml", "curl/7.64.1", ThreatLabel::Benign);
        let evidence = Evidence::new(&r);
        let tool = offensive_tool(&evidence).unwrap();
        assert!(tool.requires_sensitive_path);
        assert_eq!(tool.attack_type, AttackType::SuspiciousActivity);
        assert_eq!(evidence.is_sensitive_path(), Some("/config"));
    }
}
