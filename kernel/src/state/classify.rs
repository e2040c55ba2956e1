// Per-Policy Classification
//
// Decides, for one catalog policy, what the non-mandatory sweep must do
// to bring it in line with the desired set.

use std::collections::BTreeSet;

use crate::catalog::{AccountId, Policy, PolicyId};

/// Outcome of classifying a single policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Wanted but not yet default: add the account's entry.
    Attach,

    /// Default but no longer wanted: strip the account's entry.
    Detach,

    /// Already correct, or irrelevant to this account.
    Unchanged,

    /// A `WAF_RULES` policy was requested as a non-mandatory default.
    WafInNonMandatorySet,
}

/// Classify `policy` against the account's desired non-mandatory set.
///
/// WAF policies never fall into the "already default" branch, so an
/// existing WAF default is never detached here.
pub fn classify(
    policy: &Policy,
    account: AccountId,
    desired: &BTreeSet<PolicyId>,
) -> Classification {
    let wanted = desired.contains(&policy.id);
    let is_waf = policy.policy_type.is_waf();

    if policy.is_default_for(account) && !is_waf {
        return if wanted {
            Classification::Unchanged
        } else {
            Classification::Detach
        };
    }

    match (wanted, is_waf) {
        (true, true) => Classification::WafInNonMandatorySet,
        (true, false) => Classification::Attach,
        (false, _) => Classification::Unchanged,
    }
}
