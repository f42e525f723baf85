//! Rule engine
//!
//! Five rules evaluated in a fixed order; the first one that fires decides
//! the verdict. The last rule always fires, so classification is total.

use super::indicators::{
    ADMIN_MARKERS, BACKUP_MARKERS, Evidence, SYSTEM_FILE_MARKERS, TRAVERSAL_MARKERS,
    match_indicator, offensive_tool,
};
use crate::models::{Action, ActivityRecord, AttackType, ClassificationResult, ThreatLabel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    SuspiciousLabel,
    BlockedWithIndicator,
    AllowedHighRisk,
    OffensiveTool,
    Default,
}

/// Evaluation order. Never reordered at runtime.
pub const RULES: [Rule; 5] = [
    Rule::SuspiciousLabel,
    Rule::BlockedWithIndicator,
    Rule::AllowedHighRisk,
    Rule::OffensiveTool,
    Rule::Default,
];

impl Rule {
    pub fn name(&self) -> &'static str {
        match self {
            Rule::SuspiciousLabel => "suspicious_label",
            Rule::BlockedWithIndicator => "blocked_with_indicator",
            Rule::AllowedHighRisk => "allowed_high_risk",
            Rule::OffensiveTool => "offensive_tool",
            Rule::Default => "default",
        }
    }

    fn evaluate(&self, evidence: &Evidence<'_>) -> Option<ClassificationResult> {
        let record = evidence.record;
        match self {
            Rule::SuspiciousLabel => {
                if record.threat_label != ThreatLabel::Suspicious {
                    return None;
                }
                Some(match match_indicator(evidence) {
                    Some(hit) => ClassificationResult::malicious(
                        hit.attack_type,
                        format!(
                            "Event labeled as 'suspicious' with indicators: {}",
                            hit.describe()
                        ),
                    ),
                    None => ClassificationResult::malicious(
                        AttackType::SuspiciousActivity,
                        "Event labeled as 'suspicious'; no specific attack indicator matched",
                    ),
                })
            }
            Rule::BlockedWithIndicator => {
                if !matches!(record.action, Action::Blocked | Action::Failed) {
                    return None;
                }
                let hit = match_indicator(evidence)?;
                Some(ClassificationResult::malicious(
                    hit.attack_type,
                    format!(
                        "Event was {} and contains suspicious indicators: {}",
                        record.action.as_str(),
                        hit.describe()
                    ),
                ))
            }
            Rule::AllowedHighRisk => {
                if record.action != Action::Allowed {
                    return None;
                }
                let (attack_type, combination) = high_risk_combination(evidence)?;
                Some(ClassificationResult::malicious(
                    attack_type,
                    format!(
                        "Allowed event contains high-risk pattern: {} ({})",
                        combination,
                        attack_type.as_str().to_lowercase()
                    ),
                ))
            }
            Rule::OffensiveTool => {
                let tool = offensive_tool(evidence)?;
                if !tool.requires_sensitive_path {
                    return Some(ClassificationResult::malicious(
                        tool.attack_type,
                        format!(
                            "Suspicious user agent '{}' matches offensive tool signature '{}': {}",
                            record.user_agent,
                            tool.marker,
                            tool.attack_type.as_str().to_lowercase()
                        ),
                    ));
                }
                let path = evidence.is_sensitive_path()?;
                Some(ClassificationResult::malicious(
                    tool.attack_type,
                    format!(
                        "Suspicious user agent '{}' accessing sensitive path '{}': {}",
                        record.user_agent,
                        path,
                        tool.attack_type.as_str().to_lowercase()
                    ),
                ))
            }
            Rule::Default => Some(ClassificationResult::non_malicious()),
        }
    }
}

/// Combinations that are dangerous even though the sensor let them through
fn high_risk_combination(evidence: &Evidence<'_>) -> Option<(AttackType, String)> {
    let protocol = evidence.protocol.as_str();

    if matches!(protocol, "FTP" | "FTPS" | "SFTP") {
        if let Some(marker) = evidence.path_marker(BACKUP_MARKERS) {
            return Some((
                AttackType::UnauthorizedBackupAccess,
                format!("{protocol} transfer of backup artefact '{marker}'"),
            ));
        }
    }

    if matches!(protocol, "SSH" | "SCP") {
        if let Some(marker) = evidence.path_marker(SYSTEM_FILE_MARKERS) {
            return Some((
                AttackType::PrivilegeEscalation,
                format!("{protocol} access to system file '{marker}'"),
            ));
        }
    }

    if let Some(marker) = evidence.path_marker(BACKUP_MARKERS) {
        return Some((
            AttackType::UnauthorizedBackupAccess,
            format!("backup artefact '{marker}' served to client"),
        ));
    }

    if let Some(marker) = evidence.path_marker(TRAVERSAL_MARKERS) {
        return Some((
            AttackType::PathTraversal,
            format!("traversal sequence '{marker}' in request path"),
        ));
    }

    evidence.path_marker(ADMIN_MARKERS).map(|marker| {
        (
            AttackType::PrivilegeEscalation,
            format!("admin path '{marker}' reached"),
        )
    })
}

/// Classify one record, returning the rule that decided it
pub fn classify_with_rule(record: &ActivityRecord) -> (Rule, ClassificationResult) {
    let evidence = Evidence::new(record);
    RULES
        .iter()
        .find_map(|rule| rule.evaluate(&evidence).map(|result| (*rule, result)))
        .unwrap_or_else(|| (Rule::Default, ClassificationResult::non_malicious()))
}

/// Classify one record. Pure: the same record always gets the same result.
pub fn classify(record: &ActivityRecord) -> ClassificationResult {
    classify_with_rule(record).1
}
