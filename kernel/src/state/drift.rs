// Drift Detection & Classification
//
// Compares the desired association with the view derived from the
// catalog and classifies every difference by severity.

use serde::Serialize;

use crate::catalog::PolicyId;
use crate::state::{AccountView, DesiredAssociation};

/// Severity of detected drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum DriftSeverity {
    /// Informational drift (no immediate risk).
    Info,

    /// Expected leftover that the operator should know about.
    Warning,

    /// Realized defaults disagree with what was declared.
    Critical,
}

/// Types of drift that can occur.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DriftType {
    /// A declared default is not in place.
    MissingDefault,

    /// A non-WAF default is in place but was not declared.
    UnexpectedDefault,

    /// A WAF default other than the declared one is still attached.
    RetainedWafDefault,

    /// More than one WAF policy is default for the account.
    MultipleWafDefaults,
}

/// A single drift finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriftFinding {
    pub drift_type: DriftType,
    pub severity: DriftSeverity,
    pub policy_id: Option<PolicyId>,
    pub message: String,
}

/// Full drift report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriftReport {
    pub findings: Vec<DriftFinding>,
}

impl DriftReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn highest_severity(&self) -> Option<DriftSeverity> {
        self.findings.iter().map(|f| f.severity).max()
    }

    /// True when nothing above `Warning` was found.
    pub fn is_converged(&self) -> bool {
        self.highest_severity()
            .map_or(true, |s| s < DriftSeverity::Critical)
    }
}

/// Detect and classify drift between declared and realized defaults.
pub fn detect_drift(desired: &DesiredAssociation, actual: &AccountView) -> DriftReport {
    let mut findings = Vec::new();

    if let Some(waf) = desired.waf_policy_id {
        if !actual.waf_policy_ids.contains(&waf) {
            findings.push(DriftFinding {
                drift_type: DriftType::MissingDefault,
                severity: DriftSeverity::Critical,
                policy_id: Some(waf),
                message: format!("WAF policy {waf} is not the default"),
            });
        }
    }

    // WAF defaults are only ever added, so a replaced or cleared one lingers.
    for &retained in &actual.waf_policy_ids {
        if desired.waf_policy_id != Some(retained) {
            findings.push(DriftFinding {
                drift_type: DriftType::RetainedWafDefault,
                severity: DriftSeverity::Warning,
                policy_id: Some(retained),
                message: format!("WAF policy {retained} is still default but was not declared"),
            });
        }
    }

    if actual.waf_policy_ids.len() > 1 {
        findings.push(DriftFinding {
            drift_type: DriftType::MultipleWafDefaults,
            severity: DriftSeverity::Critical,
            policy_id: None,
            message: format!(
                "{} WAF policies are default for account {}",
                actual.waf_policy_ids.len(),
                actual.account_id
            ),
        });
    }

    for &missing in desired
        .non_mandatory_policy_ids
        .difference(&actual.non_mandatory_policy_ids)
    {
        findings.push(DriftFinding {
            drift_type: DriftType::MissingDefault,
            severity: DriftSeverity::Critical,
            policy_id: Some(missing),
            message: format!("policy {missing} is not default"),
        });
    }

    for &extra in actual
        .non_mandatory_policy_ids
        .difference(&desired.non_mandatory_policy_ids)
    {
        findings.push(DriftFinding {
            drift_type: DriftType::UnexpectedDefault,
            severity: DriftSeverity::Critical,
            policy_id: Some(extra),
            message: format!("policy {extra} is default but was not declared"),
        });
    }

    DriftReport { findings }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::AccountId;
    use std::collections::BTreeSet;

    fn view(waf: &[u64], others: &[u64]) -> AccountView {
        AccountView {
            account_id: AccountId(7),
            waf_policy_ids: waf.iter().copied().map(PolicyId).collect(),
            non_mandatory_policy_ids: others.iter().copied().map(PolicyId).collect(),
        }
    }

    fn desired(waf: Option<u64>, others: &[u64]) -> DesiredAssociation {
        DesiredAssociation {
            account_id: AccountId(7),
            waf_policy_id: waf.map(PolicyId),
            non_mandatory_policy_ids: others.iter().copied().map(PolicyId).collect::<BTreeSet<_>>(),
        }
    }

    #[test]
    fn matching_state_is_clean() {
        let report = detect_drift(&desired(Some(1), &[2, 3]), &view(&[1], &[2, 3]));
        assert!(report.is_clean());
        assert!(report.highest_severity().is_none());
        assert!(report.is_converged());
    }

    #[test]
    fn missing_and_unexpected_are_critical() {
        let report = detect_drift(&desired(None, &[2]), &view(&[], &[3]));

        let types: Vec<_> = report.findings.iter().map(|f| &f.drift_type).collect();
        assert_eq!(
            types,
            vec![&DriftType::MissingDefault, &DriftType::UnexpectedDefault]
        );
        assert_eq!(report.highest_severity(), Some(DriftSeverity::Critical));
        assert!(!report.is_converged());
    }

    #[test]
    fn retained_waf_default_is_only_a_warning() {
        let report = detect_drift(&desired(None, &[]), &view(&[1], &[]));

        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].drift_type, DriftType::RetainedWafDefault);
        assert_eq!(report.highest_severity(), Some(DriftSeverity::Warning));
        assert!(report.is_converged());
    }

    #[test]
    fn switched_waf_leaves_two_defaults() {
        let report = detect_drift(&desired(Some(5), &[]), &view(&[1, 5], &[]));

        let types: Vec<_> = report.findings.iter().map(|f| &f.drift_type).collect();
        assert_eq!(
            types,
            vec![&DriftType::RetainedWafDefault, &DriftType::MultipleWafDefaults]
        );
        assert_eq!(report.findings[0].policy_id, Some(PolicyId(1)));
        assert!(!report.is_converged());
    }
}
