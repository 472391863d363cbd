//! services/api/src/adapters/identity.rs
//!
//! An `IdentityGateway` backed by the document store itself: argon2 password hashes
//! live in `credentials` (keyed by email) and opaque session tokens in `authSessions`.
//! Rejections carry the same provider codes a hosted identity service would return.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use carelink_core::fields::{fields, FieldReader, FieldValue, Fields};
use carelink_core::ports::{
    AuthGrant, DocumentStore, IdentityError, IdentityGateway, PortError, PortResult,
};
use carelink_core::validation::MIN_PASSWORD_LEN;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

pub const CREDENTIALS: &str = "credentials";
pub const AUTH_SESSIONS: &str = "authSessions";

fn rejected(code: &str) -> IdentityError {
    IdentityError::Rejected {
        code: code.to_string(),
    }
}

#[derive(Clone)]
pub struct DocumentIdentityGateway {
    store: Arc<dyn DocumentStore>,
    session_days: i64,
}

impl DocumentIdentityGateway {
    pub fn new(store: Arc<dyn DocumentStore>, session_days: i64) -> Self {
        Self {
            store,
            session_days,
        }
    }

    /// Issues a fresh session token for `user_id`.
    async fn open_session(&self, user_id: &str, email: &str) -> PortResult<AuthGrant> {
        let token = Uuid::new_v4().to_string();
        let expires_at = Utc::now() + Duration::days(self.session_days);
        self.store
            .upsert_document(
                AUTH_SESSIONS,
                &token,
                fields([
                    ("userId", FieldValue::from(user_id)),
                    ("email", FieldValue::from(email)),
                    ("expiresAt", FieldValue::from(expires_at)),
                ]),
            )
            .await?;
        Ok(AuthGrant {
            user_id: user_id.to_string(),
            id_token: token,
            email: email.to_string(),
        })
    }

    async fn credentials(&self, email: &str) -> PortResult<Option<Fields>> {
        match self.store.get_document(CREDENTIALS, email).await {
            Ok(doc) => Ok(Some(doc)),
            Err(PortError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn hash_password(password: &str) -> PortResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            PortError::Unexpected("failed to hash password".to_string())
        })
}

fn verify_password(password: &str, stored_hash: &str) -> PortResult<bool> {
    let parsed_hash = PasswordHash::new(stored_hash).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        PortError::Unexpected("stored password hash is unreadable".to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[async_trait]
impl IdentityGateway for DocumentIdentityGateway {
    async fn register(&self, email: &str, password: &str) -> Result<AuthGrant, IdentityError> {
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(rejected("WEAK_PASSWORD"));
        }
        if self.credentials(email).await?.is_some() {
            return Err(rejected("EMAIL_EXISTS"));
        }

        let user_id = Uuid::new_v4().to_string();
        let password_hash = hash_password(password)?;
        self.store
            .upsert_document(
                CREDENTIALS,
                email,
                fields([
                    ("userId", FieldValue::from(user_id.as_str())),
                    ("email", FieldValue::from(email)),
                    ("passwordHash", FieldValue::from(password_hash)),
                    ("disabled", FieldValue::from(false)),
                    ("createdAt", FieldValue::from(Utc::now())),
                ]),
            )
            .await?;
        info!(user_id = %user_id, "identity created");
        Ok(self.open_session(&user_id, email).await?)
    }

    async fn login(&self, email: &str, password: &str) -> Result<AuthGrant, IdentityError> {
        let doc = self
            .credentials(email)
            .await?
            .ok_or_else(|| rejected("EMAIL_NOT_FOUND"))?;
        let reader = FieldReader::new("credentials", &doc);
        if reader.boolean("disabled").unwrap_or(false) {
            return Err(rejected("USER_DISABLED"));
        }
        if !verify_password(password, &reader.string("passwordHash")?)? {
            return Err(rejected("INVALID_PASSWORD"));
        }
        let user_id = reader.string("userId")?;
        Ok(self.open_session(&user_id, email).await?)
    }

    async fn verify(&self, id_token: &str) -> Result<AuthGrant, IdentityError> {
        let doc = match self.store.get_document(AUTH_SESSIONS, id_token).await {
            Ok(doc) => doc,
            Err(PortError::NotFound(_)) => return Err(rejected("INVALID_ID_TOKEN")),
            Err(e) => return Err(e.into()),
        };
        let reader = FieldReader::new("auth session", &doc);
        if reader.timestamp("expiresAt")? <= Utc::now() {
            debug!("expired session token presented");
            self.store.delete_document(AUTH_SESSIONS, id_token).await?;
            return Err(rejected("TOKEN_EXPIRED"));
        }
        Ok(AuthGrant {
            user_id: reader.string("userId")?,
            id_token: id_token.to_string(),
            email: reader.string("email")?,
        })
    }

    async fn logout(&self, id_token: &str) -> PortResult<()> {
        self.store.delete_document(AUTH_SESSIONS, id_token).await?;
        Ok(())
    }

    async fn delete_user(&self, user_id: &str) -> PortResult<()> {
        let owner = FieldValue::from(user_id);
        for collection in [AUTH_SESSIONS, CREDENTIALS] {
            for (id, _) in self.store.query_equals(collection, "userId", &owner).await? {
                self.store.delete_document(collection, &id).await?;
            }
        }
        info!(user_id = %user_id, "identity deleted");
        Ok(())
    }
}
