// Policy Catalog
//
// Domain model for policies and their per-account default associations,
// plus the storage contract used to read and replace them.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

mod ids;
mod memory;
mod store;

pub use ids::{AccountId, IdRepr, ParseIdError, PolicyId};
pub use memory::InMemoryCatalog;
pub use store::{CatalogError, PolicyCatalog};

/// Asset type recorded on every default entry created here.
pub const WEBSITE_ASSET_TYPE: &str = "WEBSITE";

/// Kind of a policy.
///
/// Only `WafRules` may be an account's mandatory default. Kinds this crate
/// does not know are carried as `Other` so they survive a replace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PolicyType {
    WafRules,
    Acl,
    Whitelist,
    Other(String),
}

impl PolicyType {
    pub fn as_str(&self) -> &str {
        match self {
            PolicyType::WafRules => "WAF_RULES",
            PolicyType::Acl => "ACL",
            PolicyType::Whitelist => "WHITELIST",
            PolicyType::Other(raw) => raw,
        }
    }

    pub fn is_waf(&self) -> bool {
        matches!(self, PolicyType::WafRules)
    }
}

impl From<String> for PolicyType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "WAF_RULES" => PolicyType::WafRules,
            "ACL" => PolicyType::Acl,
            "WHITELIST" => PolicyType::Whitelist,
            _ => PolicyType::Other(raw),
        }
    }
}

impl From<PolicyType> for String {
    fn from(kind: PolicyType) -> String {
        kind.as_str().to_string()
    }
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Marks a policy as default for one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultPolicyEntry {
    pub account_id: AccountId,
    pub asset_type: String,
    pub policy_id: PolicyId,

    /// Fields this crate does not interpret, written back as received.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DefaultPolicyEntry {
    pub fn website(account_id: AccountId, policy_id: PolicyId) -> Self {
        Self {
            account_id,
            asset_type: WEBSITE_ASSET_TYPE.to_string(),
            policy_id,
            extra: Map::new(),
        }
    }
}

/// Authoritative policy record as owned by the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub id: PolicyId,
    pub policy_type: PolicyType,

    /// Default entries for every account, not only the one being reconciled.
    #[serde(default)]
    pub default_policy_config: Vec<DefaultPolicyEntry>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Policy {
    pub fn new(id: PolicyId, policy_type: PolicyType) -> Self {
        Self {
            id,
            policy_type,
            default_policy_config: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn is_default_for(&self, account: AccountId) -> bool {
        self.default_policy_config
            .iter()
            .any(|entry| entry.account_id == account)
    }

    /// Add a website entry for `account`. Returns false if one was present.
    pub fn attach_default(&mut self, account: AccountId) -> bool {
        if self.is_default_for(account) {
            return false;
        }
        self.default_policy_config
            .push(DefaultPolicyEntry::website(account, self.id));
        true
    }

    /// Drop every entry for `account`. Returns false if there were none.
    pub fn detach_default(&mut self, account: AccountId) -> bool {
        let before = self.default_policy_config.len();
        self.default_policy_config
            .retain(|entry| entry.account_id != account);
        self.default_policy_config.len() != before
    }
}
