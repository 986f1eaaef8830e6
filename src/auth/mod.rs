//! Outbound credentials
//!
//! The engine only needs "a valid bearer token for user X". Token storage
//! and the OAuth refresh flow live behind `CredentialProvider`.

pub mod credentials;

pub use credentials::StoredTokenProvider;

use async_trait::async_trait;

use crate::error::CredentialError;

/// Resolves a bearer token for a task owner
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// A token valid for outbound catalog calls on behalf of `user_id`
    async fn valid_bearer_for(&self, user_id: &str) -> Result<String, CredentialError>;
}
