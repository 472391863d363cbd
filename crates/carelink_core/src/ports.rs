//! crates/carelink_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete document store, identity provider and
//! secret storage.

use crate::fields::{FieldValue, Fields};
use async_trait::async_trait;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Write precondition failed: {0}")]
    Conflict(String),
    #[error("Timed out: {0}")]
    Timeout(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Document Store
//=========================================================================================

/// CRUD access to typed documents addressed by collection + id.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fails with `PortError::NotFound` when the document does not exist.
    async fn get_document(&self, collection: &str, id: &str) -> PortResult<Fields>;

    /// Creates or fully replaces a document.
    async fn upsert_document(&self, collection: &str, id: &str, fields: Fields) -> PortResult<()>;

    /// Merges `fields` into an existing document.
    async fn patch_document(&self, collection: &str, id: &str, fields: Fields) -> PortResult<()>;

    /// Merges `fields` only if `guard_field` currently equals `guard_value`;
    /// otherwise fails with `PortError::Conflict` and writes nothing.
    async fn update_if(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
        guard_field: &str,
        guard_value: &FieldValue,
    ) -> PortResult<()>;

    /// Returns whether a document was actually removed.
    async fn delete_document(&self, collection: &str, id: &str) -> PortResult<bool>;

    async fn query_equals(
        &self,
        collection: &str,
        field: &str,
        value: &FieldValue,
    ) -> PortResult<Vec<(String, Fields)>>;

    /// Adds each value to a string-array field unless already present.
    async fn array_union(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        values: &[String],
    ) -> PortResult<()>;

    /// Removes every occurrence of each value from a string-array field.
    async fn array_remove(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        values: &[String],
    ) -> PortResult<()>;
}

//=========================================================================================
// Identity Gateway
//=========================================================================================

/// What the identity provider hands back on a successful sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthGrant {
    pub user_id: String,
    pub id_token: String,
    pub email: String,
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// The provider refused the request; `code` is provider-specific
    /// (e.g. `INVALID_PASSWORD`, `USER_DISABLED`).
    #[error("Identity provider rejected the request: {code}")]
    Rejected { code: String },
    #[error(transparent)]
    Port(#[from] PortError),
}

#[async_trait]
pub trait IdentityGateway: Send + Sync {
    async fn register(&self, email: &str, password: &str) -> Result<AuthGrant, IdentityError>;

    async fn login(&self, email: &str, password: &str) -> Result<AuthGrant, IdentityError>;

    /// Resolves a bearer token previously issued by `register` or `login`.
    async fn verify(&self, id_token: &str) -> Result<AuthGrant, IdentityError>;

    async fn logout(&self, id_token: &str) -> PortResult<()>;

    /// Removes the credentials of a user, revoking all of their tokens.
    async fn delete_user(&self, user_id: &str) -> PortResult<()>;
}

//=========================================================================================
// Secret Store
//=========================================================================================

/// Key-value storage for session secrets that must survive restarts.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn set(&self, key: &str, value: &str) -> PortResult<()>;
    async fn get(&self, key: &str) -> PortResult<Option<String>>;
    async fn remove(&self, key: &str) -> PortResult<()>;
}
