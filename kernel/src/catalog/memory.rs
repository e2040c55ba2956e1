// In-Memory Policy Catalog
//
// Holds policies in a map and records every replace call, so the
// reconciler can be driven without a remote service.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::{AccountId, CatalogError, Policy, PolicyCatalog, PolicyId};

#[derive(Debug, Default)]
struct Inner {
    policies: BTreeMap<PolicyId, Policy>,
    replaced: Vec<PolicyId>,
    fail_on_replace: Option<PolicyId>,
}

/// Catalog backed by process memory.
///
/// Every policy is visible to every account. Replaces are appended to a
/// call log that tests inspect through [`InMemoryCatalog::replaced`].
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    inner: Mutex<Inner>,
}

impl InMemoryCatalog {
    pub fn new(policies: impl IntoIterator<Item = Policy>) -> Self {
        let policies = policies.into_iter().map(|p| (p.id, p)).collect();
        Self {
            inner: Mutex::new(Inner {
                policies,
                ..Inner::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Ids passed to `replace`, in call order.
    pub fn replaced(&self) -> Vec<PolicyId> {
        self.lock().replaced.clone()
    }

    #[cfg(test)]
    pub fn clear_replaced(&self) {
        self.lock().replaced.clear();
    }

    pub fn get(&self, id: PolicyId) -> Option<Policy> {
        self.lock().policies.get(&id).cloned()
    }

    /// Overwrite a record without counting it as a replace call.
    #[cfg(test)]
    pub fn put(&self, policy: Policy) {
        self.lock().policies.insert(policy.id, policy);
    }

    /// Make the next replace of `id` fail with a remote error.
    #[cfg(test)]
    pub fn fail_replace_of(&self, id: PolicyId) {
        self.lock().fail_on_replace = Some(id);
    }
}

impl PolicyCatalog for InMemoryCatalog {
    fn fetch_all_for_account(&self, _account: AccountId) -> Result<Vec<Policy>, CatalogError> {
        Ok(self.lock().policies.values().cloned().collect())
    }

    fn fetch(&self, policy: PolicyId, _account: AccountId) -> Result<Policy, CatalogError> {
        self.lock()
            .policies
            .get(&policy)
            .cloned()
            .ok_or(CatalogError::NotFound(policy))
    }

    fn replace(&self, policy: &Policy, _account: AccountId) -> Result<Policy, CatalogError> {
        let mut inner = self.lock();

        if inner.fail_on_replace == Some(policy.id) {
            inner.fail_on_replace = None;
            return Err(CatalogError::Remote {
                status: 500,
                body: format!("replace of policy {} rejected", policy.id),
            });
        }
        if !inner.policies.contains_key(&policy.id) {
            return Err(CatalogError::NotFound(policy.id));
        }

        inner.replaced.push(policy.id);
        inner.policies.insert(policy.id, policy.clone());
        Ok(policy.clone())
    }
}
