// Policy Catalog Storage Abstraction
//
// Defines the contract for the service that owns policy records.
// Implementations may talk HTTP, hold policies in memory, or stage writes.
//
// This module defines *interfaces only*.

use super::{AccountId, Policy, PolicyId};

/// Errors surfaced by a catalog implementation.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered with a failure; `body` is its message verbatim.
    #[error("remote service returned {status}: {body}")]
    Remote { status: u16, body: String },

    #[error("malformed catalog response: {0}")]
    Decode(String),

    #[error("policy {0} does not exist")]
    NotFound(PolicyId),
}

/// Source of truth for policies visible to an account.
///
/// Properties required from implementations:
/// - `fetch_all_for_account` returns every visible policy with its full,
///   cross-account `default_policy_config`
/// - `replace` persists the whole record, not a patch
///
/// Implementations MUST NOT:
/// - Drop entries belonging to other accounts
/// - Rewrite fields they do not understand
pub trait PolicyCatalog: Send + Sync {
    /// Read every policy the account can see.
    fn fetch_all_for_account(&self, account: AccountId) -> Result<Vec<Policy>, CatalogError>;

    /// Read a single policy.
    ///
    /// Used to refresh a record right before a read-modify-write.
    fn fetch(&self, policy: PolicyId, account: AccountId) -> Result<Policy, CatalogError>;

    /// Persist `policy` as a whole and return what the service stored.
    fn replace(&self, policy: &Policy, account: AccountId) -> Result<Policy, CatalogError>;
}

impl<C: PolicyCatalog + ?Sized> PolicyCatalog for &C {
    fn fetch_all_for_account(&self, account: AccountId) -> Result<Vec<Policy>, CatalogError> {
        (**self).fetch_all_for_account(account)
    }

    fn fetch(&self, policy: PolicyId, account: AccountId) -> Result<Policy, CatalogError> {
        (**self).fetch(policy, account)
    }

    fn replace(&self, policy: &Policy, account: AccountId) -> Result<Policy, CatalogError> {
        (**self).replace(policy, account)
    }
}
