// Default Association Reconciler
//
// Fetches the catalog once, classifies every policy against the desired
// association and issues one whole-record replace per policy whose
// membership changes. Policies that are already correct are never written.
//
// Fail-fast: the first error aborts the run and earlier writes stay applied.
// Re-running converges because correct policies classify as no-ops.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::catalog::{AccountId, CatalogError, Policy, PolicyCatalog, PolicyId, PolicyType};
use crate::state::classify::{classify, Classification};
use crate::state::DesiredAssociation;

/// Which slot a policy was requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DefaultRole {
    Mandatory,
    NonMandatory,
}

impl fmt::Display for DefaultRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultRole::Mandatory => f.write_str("the default WAF policy"),
            DefaultRole::NonMandatory => f.write_str("a non-mandatory default"),
        }
    }
}

/// Errors that abort a reconciliation.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("policy {0} does not exist in the account's catalog")]
    PolicyNotFound(PolicyId),

    #[error("cannot set policy {policy_id} of type {policy_type} as {role}")]
    InvalidPolicyType {
        policy_id: PolicyId,
        policy_type: PolicyType,
        role: DefaultRole,
    },

    #[error("policies not visible to account {account_id}: {}", join_ids(.ids))]
    UnknownPolicyIds {
        account_id: AccountId,
        ids: Vec<PolicyId>,
    },

    #[error("remote catalog call failed: {0}")]
    Remote(#[from] CatalogError),

    /// A run that failed after some replaces had already gone out.
    #[error("{source} ({} change(s) already applied)", .applied.len())]
    Partial {
        applied: Vec<AppliedMutation>,
        source: Box<ReconcileError>,
    },
}

impl ReconcileError {
    /// Mutations that were applied before the run failed.
    pub fn applied(&self) -> &[AppliedMutation] {
        match self {
            ReconcileError::Partial { applied, .. } => applied,
            _ => &[],
        }
    }

    /// The failure itself, without the partial-progress wrapper.
    pub fn root(&self) -> &ReconcileError {
        match self {
            ReconcileError::Partial { source, .. } => source.root(),
            other => other,
        }
    }
}

fn join_ids(ids: &[PolicyId]) -> String {
    ids.iter()
        .map(PolicyId::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Tunables for a reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOptions {
    /// Re-read each policy right before replacing it and rebuild its entry
    /// list from that copy instead of the catalog snapshot.
    #[serde(default = "default_true")]
    pub refresh_before_write: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            refresh_before_write: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MutationAction {
    Attach,
    Detach,
}

/// One replace call that changed a policy's membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedMutation {
    pub policy_id: PolicyId,
    pub policy_type: PolicyType,
    pub action: MutationAction,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub run_id: Uuid,
    pub account_id: AccountId,
    pub mutations: Vec<AppliedMutation>,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.mutations.is_empty()
    }
}

/// Fetch the account's catalog and converge it to `desired`.
pub fn reconcile<C: PolicyCatalog + ?Sized>(
    client: &C,
    desired: &DesiredAssociation,
    options: &ReconcileOptions,
) -> Result<ReconcileReport, ReconcileError> {
    let run_id = Uuid::new_v4();
    let span = info_span!("reconcile", %run_id, account_id = %desired.account_id);
    let _guard = span.enter();

    let catalog = client.fetch_all_for_account(desired.account_id)?;
    debug!(policies = catalog.len(), "fetched policy catalog");

    let mutations = reconcile_snapshot(client, desired, catalog, options)?;
    info!(mutations = mutations.len(), "reconciliation complete");

    Ok(ReconcileReport {
        run_id,
        account_id: desired.account_id,
        mutations,
    })
}

/// Tear down an account's association.
///
/// Every non-WAF default for the account is detached; the WAF default is
/// left in place, as it is whenever the declared WAF id is cleared.
pub fn release<C: PolicyCatalog + ?Sized>(
    client: &C,
    account: AccountId,
    options: &ReconcileOptions,
) -> Result<ReconcileReport, ReconcileError> {
    reconcile(client, &DesiredAssociation::new(account), options)
}

/// Converge an already fetched `catalog` to `desired`.
///
/// Returns the mutations issued, in order. If the run fails after writes
/// went out, the error is `ReconcileError::Partial` listing them.
pub fn reconcile_snapshot<C: PolicyCatalog + ?Sized>(
    client: &C,
    desired: &DesiredAssociation,
    catalog: Vec<Policy>,
    options: &ReconcileOptions,
) -> Result<Vec<AppliedMutation>, ReconcileError> {
    let mut sweep = Sweep {
        client,
        account: desired.account_id,
        options,
        applied: Vec::new(),
    };

    match sweep.converge(desired, catalog) {
        Ok(()) => Ok(sweep.applied),
        Err(error) if sweep.applied.is_empty() => Err(error),
        Err(error) => {
            warn!(
                applied = sweep.applied.len(),
                %error,
                "reconciliation aborted after partial changes"
            );
            Err(ReconcileError::Partial {
                applied: sweep.applied,
                source: Box::new(error),
            })
        }
    }
}

struct Sweep<'a, C: ?Sized> {
    client: &'a C,
    account: AccountId,
    options: &'a ReconcileOptions,
    applied: Vec<AppliedMutation>,
}

impl<C: PolicyCatalog + ?Sized> Sweep<'_, C> {
    fn converge(
        &mut self,
        desired: &DesiredAssociation,
        mut catalog: Vec<Policy>,
    ) -> Result<(), ReconcileError> {
        let account = self.account;

        // 1. Mandatory WAF default (add only)
        if let Some(waf_id) = desired.waf_policy_id {
            let policy = catalog
                .iter_mut()
                .find(|p| p.id == waf_id)
                .ok_or(ReconcileError::PolicyNotFound(waf_id))?;

            if !policy.policy_type.is_waf() {
                return Err(ReconcileError::InvalidPolicyType {
                    policy_id: policy.id,
                    policy_type: policy.policy_type.clone(),
                    role: DefaultRole::Mandatory,
                });
            }

            if policy.is_default_for(account) {
                debug!(policy_id = %waf_id, "WAF policy already default");
            } else {
                self.apply(policy, MutationAction::Attach)?;
            }
        }

        // 2. Non-mandatory set
        let wanted = &desired.non_mandatory_policy_ids;
        let mut remaining: BTreeSet<PolicyId> = wanted.clone();

        for policy in catalog.iter_mut() {
            remaining.remove(&policy.id);

            match classify(policy, account, wanted) {
                Classification::Attach => self.apply(policy, MutationAction::Attach)?,
                Classification::Detach => self.apply(policy, MutationAction::Detach)?,
                Classification::WafInNonMandatorySet => {
                    return Err(ReconcileError::InvalidPolicyType {
                        policy_id: policy.id,
                        policy_type: policy.policy_type.clone(),
                        role: DefaultRole::NonMandatory,
                    });
                }
                Classification::Unchanged => {
                    if policy.policy_type.is_waf()
                        && policy.is_default_for(account)
                        && desired.waf_policy_id != Some(policy.id)
                    {
                        warn!(policy_id = %policy.id, "undeclared WAF default left in place");
                    }
                }
            }
        }

        // 3. Ids that never showed up during the sweep
        if !remaining.is_empty() {
            return Err(ReconcileError::UnknownPolicyIds {
                account_id: account,
                ids: remaining.into_iter().collect(),
            });
        }

        Ok(())
    }

    /// Read-modify-write one policy. `policy` is updated to what was stored.
    fn apply(&mut self, policy: &mut Policy, action: MutationAction) -> Result<(), CatalogError> {
        let mut target = if self.options.refresh_before_write {
            self.client.fetch(policy.id, self.account)?
        } else {
            policy.clone()
        };

        let changed = match action {
            MutationAction::Attach => target.attach_default(self.account),
            MutationAction::Detach => target.detach_default(self.account),
        };

        if !changed {
            warn!(
                policy_id = %policy.id,
                ?action,
                "policy already changed remotely, skipping write"
            );
            *policy = target;
            return Ok(());
        }

        let stored = self.client.replace(&target, self.account)?;
        info!(
            policy_id = %stored.id,
            account_id = %self.account,
            ?action,
            "updated default association"
        );

        self.applied.push(AppliedMutation {
            policy_id: stored.id,
            policy_type: stored.policy_type.clone(),
            action,
        });
        *policy = stored;
        Ok(())
    }
}
