//! crates/carelink_core/src/profiles.rs
//!
//! Profile Repository: `UserProfile` and `UserPublicProfile` documents.

use crate::codec::{save, StoredDocument, PUBLIC_PROFILES, USERS};
use crate::domain::{Role, UserProfile, UserPublicProfile};
use crate::error::{CareError, CareResult};
use crate::fields::FieldValue;
use crate::ports::{DocumentStore, PortError};
use std::sync::Arc;

/// Emails are stored and compared lower-cased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Clone)]
pub struct ProfileRepository {
    store: Arc<dyn DocumentStore>,
}

impl ProfileRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Writes the profile and its public discoverability record.
    pub async fn create(&self, profile: &UserProfile) -> CareResult<()> {
        save(self.store.as_ref(), profile).await?;
        let public = UserPublicProfile::from(profile);
        save(self.store.as_ref(), &public).await?;
        Ok(())
    }

    pub async fn get(&self, user_id: &str) -> CareResult<UserProfile> {
        self.find(user_id)
            .await?
            .ok_or_else(|| CareError::NotFound(format!("profile {}", user_id)))
    }

    pub async fn find(&self, user_id: &str) -> CareResult<Option<UserProfile>> {
        match self.store.get_document(USERS, user_id).await {
            Ok(doc) => Ok(Some(UserProfile::from_fields(user_id, &doc)?)),
            Err(PortError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn find_public(&self, user_id: &str) -> CareResult<Option<UserPublicProfile>> {
        match self.store.get_document(PUBLIC_PROFILES, user_id).await {
            Ok(doc) => Ok(Some(UserPublicProfile::from_fields(user_id, &doc)?)),
            Err(PortError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn find_public_by_email(&self, email: &str) -> CareResult<Option<UserPublicProfile>> {
        let email = normalize_email(email);
        let mut matches = self
            .store
            .query_equals(PUBLIC_PROFILES, "email", &FieldValue::from(email))
            .await?;
        match matches.pop() {
            Some((id, doc)) => Ok(Some(UserPublicProfile::from_fields(&id, &doc)?)),
            None => Ok(None),
        }
    }

    /// Adds `peer_id` to the array `user_id` keeps while acting as `role`.
    pub async fn link(&self, user_id: &str, role: Role, peer_id: &str) -> CareResult<()> {
        self.store
            .array_union(USERS, user_id, role.peers_field(), &[peer_id.to_string()])
            .await?;
        Ok(())
    }

    pub async fn unlink(&self, user_id: &str, role: Role, peer_id: &str) -> CareResult<()> {
        self.store
            .array_remove(USERS, user_id, role.peers_field(), &[peer_id.to_string()])
            .await?;
        Ok(())
    }

    pub async fn delete(&self, user_id: &str) -> CareResult<()> {
        self.store.delete_document(USERS, user_id).await?;
        self.store.delete_document(PUBLIC_PROFILES, user_id).await?;
        Ok(())
    }
}
