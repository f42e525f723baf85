use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ClassificationStatus {
    #[serde(rename = "Malicious")]
    Malicious,
    #[serde(rename = "Non-malicious")]
    NonMalicious,
    #[serde(rename = "Error")]
    Error,
}

impl ClassificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationStatus::Malicious => "Malicious",
            ClassificationStatus::NonMalicious => "Non-malicious",
            ClassificationStatus::Error => "Error",
        }
    }
}

/// Attack technique attributed to a malicious record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AttackType {
    #[serde(rename = "Unauthorized backup access")]
    UnauthorizedBackupAccess,
    #[serde(rename = "Path traversal attempt")]
    PathTraversal,
    #[serde(rename = "Privilege escalation attempt")]
    PrivilegeEscalation,
    #[serde(rename = "Suspicious login attempt")]
    SuspiciousLogin,
    #[serde(rename = "Malware upload attempt")]
    MalwareUpload,
    #[serde(rename = "SQL injection attempt")]
    SqlInjection,
    #[serde(rename = "Network reconnaissance")]
    NetworkReconnaissance,
    #[serde(rename = "Suspicious activity detected")]
    SuspiciousActivity,
}

impl AttackType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttackType::UnauthorizedBackupAccess => "Unauthorized backup access",
            AttackType::PathTraversal => "Path traversal attempt",
            AttackType::PrivilegeEscalation => "Privilege escalation attempt",
            AttackType::SuspiciousLogin => "Suspicious login attempt",
            AttackType::MalwareUpload => "Malware upload attempt",
            AttackType::SqlInjection => "SQL injection attempt",
            AttackType::NetworkReconnaissance => "Network reconnaissance",
            AttackType::SuspiciousActivity => "Suspicious activity detected",
        }
    }
}

impl std::fmt::Display for AttackType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const NO_INDICATORS_REASON: &str = "No malicious indicators detected";

/// Verdict for one record.
///
/// Only constructible through `malicious`, `non_malicious` and `error`, which
/// keep the status / attack type / reason combination consistent:
/// non-malicious and error results never carry an attack type, and every
/// result carries a non-empty reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationResult {
    status: ClassificationStatus,
    attack_type: Option<AttackType>,
    reason: String,
}

impl ClassificationResult {
    pub fn malicious(attack_type: AttackType, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            status: ClassificationStatus::Malicious,
            attack_type: Some(attack_type),
            reason: if reason.trim().is_empty() {
                format!("Malicious activity: {}", attack_type.as_str().to_lowercase())
            } else {
                reason
            },
        }
    }

    pub fn non_malicious() -> Self {
        Self {
            status: ClassificationStatus::NonMalicious,
            attack_type: None,
            reason: NO_INDICATORS_REASON.to_string(),
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            status: ClassificationStatus::Error,
            attack_type: None,
            reason: if reason.trim().is_empty() {
                "Record could not be processed".to_string()
            } else {
                reason
            },
        }
    }

    pub fn status(&self) -> ClassificationStatus {
        self.status
    }

    pub fn attack_type(&self) -> Option<AttackType> {
        self.attack_type
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn is_malicious(&self) -> bool {
        self.status == ClassificationStatus::Malicious
    }

    pub fn is_error(&self) -> bool {
        self.status == ClassificationStatus::Error
    }
}

/// One classified (or rejected) line of a submitted file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PerRecordResult {
    pub filename: String,
    /// 1-based, the header line counts when present
    pub line_number: usize,
    #[serde(flatten)]
    pub result: ClassificationResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_malicious_has_no_attack_type() {
        let result = ClassificationResult::non_malicious();
        assert_eq!(result.status(), ClassificationStatus::NonMalicious);
        assert_eq!(result.attack_type(), None);
        assert_eq!(result.reason(), NO_INDICATORS_REASON);
    }

    #[test]
    fn error_keeps_fault_message_and_drops_attack_type() {
        let result = ClassificationResult::error("Missing required fields: action");
        assert!(result.is_error());
        assert_eq!(result.attack_type(), None);
        assert_eq!(result.reason(), "Missing required fields: action");

        let blank = ClassificationResult::error("  ");
        assert!(!blank.reason().trim().is_empty());
    }

    #[test]
    fn malicious_reason_is_never_empty() {
        let result = ClassificationResult::malicious(AttackType::SqlInjection, "");
        assert!(result.is_malicious());
        assert!(result.reason().contains("sql injection"));
    }

    #[test]
    fn per_record_result_serializes_flat() {
        let record = PerRecordResult {
            filename: "ids.csv".to_string(),
            line_number: 3,
            result: ClassificationResult::malicious(
                AttackType::PathTraversal,
                "Event labeled as 'suspicious'",
            ),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["filename"], "ids.csv");
        assert_eq!(json["line_number"], 3);
        assert_eq!(json["status"], "Malicious");
        assert_eq!(json["attack_type"], "Path traversal attempt");

        let clean = PerRecordResult {
            filename: "ids.csv".to_string(),
            line_number: 4,
            result: ClassificationResult::non_malicious(),
        };
        let json = serde_json::to_value(&clean).unwrap();
        assert_eq!(json["status"], "Non-malicious");
        assert!(json["attack_type"].is_null());
    }
}
