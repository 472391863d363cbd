//! crates/carelink_core/src/session.rs
//!
//! The signed-in user's identity, passed explicitly to every core operation.

use crate::ports::{AuthGrant, PortResult, SecretStore};
use tracing::debug;

const USER_ID_KEY: &str = "userId";
const ID_TOKEN_KEY: &str = "idToken";
const EMAIL_KEY: &str = "email";

/// Who is calling. Built once at sign-in and threaded through every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub user_id: String,
    pub id_token: String,
    pub email: String,
}

impl From<AuthGrant> for SessionContext {
    fn from(grant: AuthGrant) -> Self {
        Self {
            user_id: grant.user_id,
            id_token: grant.id_token,
            email: grant.email,
        }
    }
}

impl SessionContext {
    pub fn new(user_id: impl Into<String>, id_token: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            id_token: id_token.into(),
            email: email.into(),
        }
    }

    /// Saves the session so it can be restored after a restart.
    pub async fn persist(&self, secrets: &dyn SecretStore) -> PortResult<()> {
        secrets.set(USER_ID_KEY, &self.user_id).await?;
        secrets.set(ID_TOKEN_KEY, &self.id_token).await?;
        secrets.set(EMAIL_KEY, &self.email).await?;
        debug!(user_id = %self.user_id, "session persisted");
        Ok(())
    }

    /// Restores a saved session. A partially saved session counts as none.
    pub async fn restore(secrets: &dyn SecretStore) -> PortResult<Option<Self>> {
        let user_id = secrets.get(USER_ID_KEY).await?;
        let id_token = secrets.get(ID_TOKEN_KEY).await?;
        let email = secrets.get(EMAIL_KEY).await?;
        Ok(match (user_id, id_token, email) {
            (Some(user_id), Some(id_token), Some(email)) => Some(Self {
                user_id,
                id_token,
                email,
            }),
            _ => None,
        })
    }

    pub async fn clear(secrets: &dyn SecretStore) -> PortResult<()> {
        secrets.remove(USER_ID_KEY).await?;
        secrets.remove(ID_TOKEN_KEY).await?;
        secrets.remove(EMAIL_KEY).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemorySecretStore;

    #[tokio::test]
    async fn persisted_session_survives_restore() {
        let secrets = InMemorySecretStore::new();
        let ctx = SessionContext::new("u1", "tok", "ada@example.com");
        ctx.persist(&secrets).await.unwrap();

        let restored = SessionContext::restore(&secrets).await.unwrap();
        assert_eq!(restored, Some(ctx));
    }

    #[tokio::test]
    async fn clear_forgets_the_session() {
        let secrets = InMemorySecretStore::new();
        SessionContext::new("u1", "tok", "ada@example.com")
            .persist(&secrets)
            .await
            .unwrap();
        SessionContext::clear(&secrets).await.unwrap();
        assert_eq!(SessionContext::restore(&secrets).await.unwrap(), None);
    }

    #[tokio::test]
    async fn partial_session_is_not_restored() {
        let secrets = InMemorySecretStore::new();
        secrets.set("userId", "u1").await.unwrap();
        assert_eq!(SessionContext::restore(&secrets).await.unwrap(), None);
    }
}
