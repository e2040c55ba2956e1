// Dry-Run Reconciliation
//
// Runs the real reconciler against a staging wrapper:
// fetch → classify → staged replaces → projected read-back
//
// Reads go to the wrapped catalog; writes are kept locally and never
// forwarded, so the remote service is left untouched.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

use crate::catalog::{AccountId, CatalogError, Policy, PolicyCatalog, PolicyId};
use crate::readback::{verify, Verification};
use crate::reconcile::{reconcile, AppliedMutation, ReconcileError, ReconcileOptions};
use crate::state::DesiredAssociation;

/// Result of a dry run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationResult {
    /// Replaces a real run would issue, in order.
    pub planned: Vec<AppliedMutation>,

    /// State the catalog would be in afterwards.
    pub projected: Verification,
}

/// Catalog wrapper that stages replaces instead of sending them.
pub struct DryRunCatalog<'a, C: ?Sized> {
    inner: &'a C,
    staged: Mutex<BTreeMap<PolicyId, Policy>>,
}

impl<'a, C: PolicyCatalog + ?Sized> DryRunCatalog<'a, C> {
    pub fn new(inner: &'a C) -> Self {
        Self {
            inner,
            staged: Mutex::new(BTreeMap::new()),
        }
    }

    fn staged(&self) -> MutexGuard<'_, BTreeMap<PolicyId, Policy>> {
        self.staged.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Policies that would be replaced, with their projected contents.
    pub fn staged_policies(&self) -> Vec<Policy> {
        self.staged().values().cloned().collect()
    }
}

impl<C: PolicyCatalog + ?Sized> PolicyCatalog for DryRunCatalog<'_, C> {
    fn fetch_all_for_account(&self, account: AccountId) -> Result<Vec<Policy>, CatalogError> {
        let mut policies = self.inner.fetch_all_for_account(account)?;
        let staged = self.staged();
        for policy in policies.iter_mut() {
            if let Some(projected) = staged.get(&policy.id) {
                *policy = projected.clone();
            }
        }
        Ok(policies)
    }

    fn fetch(&self, policy: PolicyId, account: AccountId) -> Result<Policy, CatalogError> {
        if let Some(projected) = self.staged().get(&policy) {
            return Ok(projected.clone());
        }
        self.inner.fetch(policy, account)
    }

    fn replace(&self, policy: &Policy, _account: AccountId) -> Result<Policy, CatalogError> {
        self.staged().insert(policy.id, policy.clone());
        Ok(policy.clone())
    }
}

/// Plan a reconciliation without applying it.
///
/// Fails exactly where a real run would fail.
pub fn simulate<C: PolicyCatalog + ?Sized>(
    client: &C,
    desired: &DesiredAssociation,
    options: &ReconcileOptions,
) -> Result<SimulationResult, ReconcileError> {
    let staging = DryRunCatalog::new(client);

    let report = reconcile(&staging, desired, options)?;
    let projected = verify(&staging, desired)?;

    Ok(SimulationResult {
        planned: report.mutations,
        projected,
    })
}
