// Read-Back Verification
//
// Re-reads the catalog after a run, derives the realized association and
// compares it with what was declared.

use serde::Serialize;
use tracing::warn;

use crate::catalog::{AccountId, CatalogError, PolicyCatalog};
use crate::state::drift::{detect_drift, DriftReport};
use crate::state::{AccountView, DesiredAssociation};

/// Realized state plus its drift from the declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verification {
    pub view: AccountView,
    pub drift: DriftReport,
}

/// Fetch the catalog and derive which policies are default for `account`.
///
/// This is the only supported way to learn the realized state; nothing is
/// cached between calls.
pub fn read_back<C: PolicyCatalog + ?Sized>(
    client: &C,
    account: AccountId,
) -> Result<AccountView, CatalogError> {
    let catalog = client.fetch_all_for_account(account)?;
    Ok(AccountView::derive(account, &catalog))
}

/// Read back and classify drift against `desired`.
pub fn verify<C: PolicyCatalog + ?Sized>(
    client: &C,
    desired: &DesiredAssociation,
) -> Result<Verification, CatalogError> {
    let view = read_back(client, desired.account_id)?;
    let drift = detect_drift(desired, &view);

    if !drift.is_clean() {
        warn!(
            account_id = %desired.account_id,
            findings = drift.findings.len(),
            severity = ?drift.highest_severity(),
            "realized defaults differ from declaration"
        );
    }

    Ok(Verification { view, drift })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{InMemoryCatalog, Policy, PolicyId, PolicyType};
    use crate::reconcile::{reconcile, ReconcileOptions};
    use crate::state::drift::DriftType;

    const ACCOUNT: AccountId = AccountId(7);

    fn policy(id: u64, kind: PolicyType, default_for_account: bool) -> Policy {
        let mut p = Policy::new(PolicyId(id), kind);
        if default_for_account {
            p.attach_default(ACCOUNT);
        }
        p
    }

    #[test]
    fn verification_is_clean_after_reconcile() {
        let catalog = InMemoryCatalog::new([
            policy(1, PolicyType::WafRules, false),
            policy(2, PolicyType::Whitelist, false),
            policy(3, PolicyType::Acl, true),
        ]);
        let desired = DesiredAssociation::new(ACCOUNT)
            .with_waf(PolicyId(1))
            .with_non_mandatory([PolicyId(2)]);

        let before = verify(&catalog, &desired).unwrap();
        assert!(!before.drift.is_clean());

        reconcile(&catalog, &desired, &ReconcileOptions::default()).unwrap();

        let after = verify(&catalog, &desired).unwrap();
        assert!(after.drift.is_clean());
        assert_eq!(after.view.to_association(), desired);
    }

    #[test]
    fn cleared_waf_shows_up_as_retained() {
        let catalog = InMemoryCatalog::new([policy(1, PolicyType::WafRules, true)]);
        let desired = DesiredAssociation::new(ACCOUNT);

        reconcile(&catalog, &desired, &ReconcileOptions::default()).unwrap();
        let verification = verify(&catalog, &desired).unwrap();

        assert_eq!(verification.drift.findings.len(), 1);
        assert_eq!(
            verification.drift.findings[0].drift_type,
            DriftType::RetainedWafDefault
        );
        assert!(verification.drift.is_converged());
    }

    #[test]
    fn read_back_ignores_other_accounts() {
        let mut shared = Policy::new(PolicyId(2), PolicyType::Whitelist);
        shared.attach_default(AccountId(8));
        let catalog = InMemoryCatalog::new([shared]);

        let view = read_back(&catalog, ACCOUNT).unwrap();
        assert!(view.all_policy_ids().is_empty());
    }
}
