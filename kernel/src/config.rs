// Provider Configuration
//
// Connection settings for the policy service and reconciliation tunables,
// loaded from JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::reconcile::ReconcileOptions;

/// Provider configuration loaded from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Root of the policy service API, without a trailing path.
    pub base_url: String,

    /// Extra headers sent with every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub reconcile: ReconcileOptions,
}

fn default_timeout_secs() -> u64 {
    30
}

impl ProviderConfig {
    /// Built-in configuration (used if no config file is provided).
    pub fn default_config() -> Self {
        Self {
            base_url: "http://localhost:8080".into(),
            headers: BTreeMap::new(),
            timeout_secs: default_timeout_secs(),
            reconcile: ReconcileOptions::default(),
        }
    }
}
