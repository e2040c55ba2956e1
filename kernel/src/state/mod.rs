// Default Association State
//
// Desired and realized default associations for a single account.
// This module is pure, deterministic, and side-effect free.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::catalog::{AccountId, Policy, PolicyId};

pub mod classify;
pub mod drift;

/// Defaults an operator wants in place for one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesiredAssociation {
    pub account_id: AccountId,

    /// The mandatory default; must name a `WAF_RULES` policy.
    #[serde(default)]
    pub waf_policy_id: Option<PolicyId>,

    /// Additional non-WAF defaults.
    #[serde(default)]
    pub non_mandatory_policy_ids: BTreeSet<PolicyId>,
}

impl DesiredAssociation {
    pub fn new(account_id: AccountId) -> Self {
        Self {
            account_id,
            waf_policy_id: None,
            non_mandatory_policy_ids: BTreeSet::new(),
        }
    }

    pub fn with_waf(mut self, policy: PolicyId) -> Self {
        self.waf_policy_id = Some(policy);
        self
    }

    pub fn with_non_mandatory(mut self, policies: impl IntoIterator<Item = PolicyId>) -> Self {
        self.non_mandatory_policy_ids.extend(policies);
        self
    }

    /// Every policy that should end up default for the account.
    pub fn all_policy_ids(&self) -> BTreeSet<PolicyId> {
        let mut all = self.non_mandatory_policy_ids.clone();
        all.extend(self.waf_policy_id);
        all
    }
}

/// Which policies are currently default for one account.
///
/// Derived from a catalog snapshot; never cached between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    pub account_id: AccountId,

    /// Normally zero or one entry.
    pub waf_policy_ids: BTreeSet<PolicyId>,
    pub non_mandatory_policy_ids: BTreeSet<PolicyId>,
}

impl AccountView {
    pub fn derive(account_id: AccountId, catalog: &[Policy]) -> Self {
        let mut view = Self {
            account_id,
            waf_policy_ids: BTreeSet::new(),
            non_mandatory_policy_ids: BTreeSet::new(),
        };

        for policy in catalog.iter().filter(|p| p.is_default_for(account_id)) {
            if policy.policy_type.is_waf() {
                view.waf_policy_ids.insert(policy.id);
            } else {
                view.non_mandatory_policy_ids.insert(policy.id);
            }
        }

        view
    }

    pub fn all_policy_ids(&self) -> BTreeSet<PolicyId> {
        self.waf_policy_ids
            .union(&self.non_mandatory_policy_ids)
            .copied()
            .collect()
    }

    /// Express the realized state in the same shape operators declare.
    ///
    /// With several WAF defaults the lowest id is reported; drift detection
    /// flags the situation separately.
    pub fn to_association(&self) -> DesiredAssociation {
        DesiredAssociation {
            account_id: self.account_id,
            waf_policy_id: self.waf_policy_ids.iter().next().copied(),
            non_mandatory_policy_ids: self.non_mandatory_policy_ids.clone(),
        }
    }
}
