// Policy Defaults Kernel
//
// Keeps an account's default security policies in sync with the remote
// policy service.

pub mod adapters;
pub mod catalog;
pub mod config;
pub mod readback;
pub mod reconcile;
pub mod simulate;
pub mod state;
