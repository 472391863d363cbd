//! crates/carelink_core/src/accounts.rs
//!
//! Registration, sign-in and account deletion on top of the Identity Gateway.

use crate::codec::CARETAKER_QUESTIONS;
use crate::domain::{ProfileDraft, Role, UserProfile};
use crate::error::{CareError, CareResult};
use crate::invitations::InvitationRepository;
use crate::ports::{DocumentStore, IdentityGateway};
use crate::profiles::{normalize_email, ProfileRepository};
use crate::session::SessionContext;
use crate::validation::{require_text, validate_email, validate_password};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityGateway>,
    profiles: ProfileRepository,
    invitations: InvitationRepository,
}

impl AccountService {
    pub fn new(store: Arc<dyn DocumentStore>, identity: Arc<dyn IdentityGateway>) -> Self {
        Self {
            profiles: ProfileRepository::new(store.clone()),
            invitations: InvitationRepository::new(store.clone()),
            store,
            identity,
        }
    }

    /// Creates the identity, then the profile and its public record.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        draft: ProfileDraft,
    ) -> CareResult<(SessionContext, UserProfile)> {
        let email = normalize_email(email);
        validate_email(&email)?;
        validate_password(password)?;
        require_text("first name", &draft.first_name)?;
        if draft.age < 0 {
            return Err(CareError::Validation("age cannot be negative".to_string()));
        }

        let grant = self.identity.register(&email, password).await?;
        let profile = UserProfile {
            user_id: grant.user_id.clone(),
            first_name: draft.first_name.trim().to_string(),
            last_name: draft.last_name.trim().to_string(),
            age: draft.age,
            sex: draft.sex,
            phone_number: draft.phone_number,
            email: email.clone(),
            created_at: Utc::now(),
            is_caregiver: draft.is_caregiver,
            caretakers_id: Vec::new(),
            caregivers_id: Vec::new(),
        };
        if let Err(e) = self.profiles.create(&profile).await {
            error!(user_id = %profile.user_id, "profile creation failed after identity was created: {}", e);
            if let Err(cleanup) = self.identity.delete_user(&profile.user_id).await {
                warn!(user_id = %profile.user_id, "could not roll back identity: {}", cleanup);
            }
            return Err(e);
        }
        info!(user_id = %profile.user_id, role = profile.role().as_str(), "user registered");
        Ok((SessionContext::from(grant), profile))
    }

    pub async fn login(&self, email: &str, password: &str) -> CareResult<SessionContext> {
        let grant = self
            .identity
            .login(&normalize_email(email), password)
            .await?;
        info!(user_id = %grant.user_id, "user signed in");
        Ok(grant.into())
    }

    /// Resolves a bearer token into the caller's session.
    pub async fn authenticate(&self, id_token: &str) -> CareResult<SessionContext> {
        Ok(self.identity.verify(id_token).await?.into())
    }

    pub async fn logout(&self, ctx: &SessionContext) -> CareResult<()> {
        self.identity.logout(&ctx.id_token).await?;
        info!(user_id = %ctx.user_id, "user signed out");
        Ok(())
    }

    pub async fn profile(&self, ctx: &SessionContext) -> CareResult<UserProfile> {
        self.profiles.get(&ctx.user_id).await
    }

    /// Deletes the caller's account and every trace of it in peers' profiles.
    pub async fn delete_account(&self, ctx: &SessionContext) -> CareResult<()> {
        let me = self.profiles.get(&ctx.user_id).await?;

        // My caretakers keep me in their caregiver array and the other way round.
        let peers = me
            .caretakers_id
            .iter()
            .map(|id| (id, Role::Caretaker))
            .chain(me.caregivers_id.iter().map(|id| (id, Role::Caregiver)));
        for (peer_id, peer_role) in peers {
            match self.profiles.unlink(peer_id, peer_role, &me.user_id).await {
                Ok(()) | Err(CareError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        for invitation in self.invitations.involving(&me.user_id).await? {
            self.invitations.delete(&invitation.id).await?;
        }
        self.store.delete_document(CARETAKER_QUESTIONS, &me.user_id).await?;
        self.profiles.delete(&me.user_id).await?;
        self.identity.delete_user(&me.user_id).await?;
        info!(user_id = %me.user_id, "account deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthErrorKind;
    use crate::memory::InMemoryDocumentStore;
    use crate::ports::{AuthGrant, IdentityError, PortResult};
    use crate::relationships::RelationshipEngine;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Plain-text identity fake: email -> (user id, password).
    #[derive(Default)]
    struct FakeIdentity {
        users: Mutex<HashMap<String, (String, String)>>,
    }

    impl FakeIdentity {
        fn grant(user_id: &str, email: &str) -> AuthGrant {
            AuthGrant {
                user_id: user_id.to_string(),
                id_token: format!("token-{}", user_id),
                email: email.to_string(),
            }
        }
    }

    #[async_trait]
    impl IdentityGateway for FakeIdentity {
        async fn register(&self, email: &str, password: &str) -> Result<AuthGrant, IdentityError> {
            let mut users = self.users.lock().unwrap();
            if users.contains_key(email) {
                return Err(IdentityError::Rejected { code: "EMAIL_EXISTS".into() });
            }
            let user_id = format!("uid-{}", users.len() + 1);
            users.insert(email.to_string(), (user_id.clone(), password.to_string()));
            Ok(Self::grant(&user_id, email))
        }

        async fn login(&self, email: &str, password: &str) -> Result<AuthGrant, IdentityError> {
            match self.users.lock().unwrap().get(email) {
                Some((id, pw)) if pw == password => Ok(Self::grant(id, email)),
                Some(_) => Err(IdentityError::Rejected { code: "INVALID_PASSWORD".into() }),
                None => Err(IdentityError::Rejected { code: "EMAIL_NOT_FOUND".into() }),
            }
        }

        async fn verify(&self, _id_token: &str) -> Result<AuthGrant, IdentityError> {
            Err(IdentityError::Rejected { code: "INVALID_ID_TOKEN".into() })
        }

        async fn logout(&self, _id_token: &str) -> PortResult<()> {
            Ok(())
        }

        async fn delete_user(&self, user_id: &str) -> PortResult<()> {
            self.users.lock().unwrap().retain(|_, entry| entry.0 != user_id);
            Ok(())
        }
    }

    fn draft(first: &str, is_caregiver: bool) -> ProfileDraft {
        ProfileDraft {
            first_name: first.into(),
            last_name: "Kowalska".into(),
            age: 70,
            is_caregiver,
            ..ProfileDraft::default()
        }
    }

    fn service() -> (Arc<InMemoryDocumentStore>, AccountService) {
        let store = Arc::new(InMemoryDocumentStore::new());
        let accounts = AccountService::new(store.clone(), Arc::new(FakeIdentity::default()));
        (store, accounts)
    }

    #[tokio::test]
    async fn registration_creates_profile_and_public_record() {
        let (store, accounts) = service();
        let (ctx, profile) = accounts
            .register("Ela@Example.com", "secret1", draft("Ela", false))
            .await
            .unwrap();

        assert_eq!(ctx.email, "ela@example.com");
        assert_eq!(profile.role(), Role::Caretaker);
        let public = ProfileRepository::new(store)
            .find_public_by_email("ela@example.com")
            .await
            .unwrap();
        assert_eq!(public.map(|p| p.user_id), Some(ctx.user_id));
    }

    #[tokio::test]
    async fn weak_password_never_reaches_the_provider() {
        let (store, accounts) = service();
        let err = accounts
            .register("ela@example.com", "123", draft("Ela", false))
            .await
            .unwrap_err();
        assert!(matches!(err, CareError::Auth(AuthErrorKind::WeakPassword)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn provider_codes_surface_as_auth_kinds() {
        let (_store, accounts) = service();
        accounts.register("ela@example.com", "secret1", draft("Ela", false)).await.unwrap();

        let taken = accounts
            .register("ela@example.com", "secret2", draft("Ela", false))
            .await
            .unwrap_err();
        assert!(matches!(taken, CareError::Auth(AuthErrorKind::EmailTaken)));

        let wrong = accounts.login("ela@example.com", "nope!!").await.unwrap_err();
        assert!(matches!(wrong, CareError::Auth(AuthErrorKind::InvalidCredentials)));
        assert!(accounts.login("ELA@example.com", "secret1").await.is_ok());
    }

    #[tokio::test]
    async fn deleting_an_account_cascades_to_peers() {
        let (store, accounts) = service();
        let engine = RelationshipEngine::new(store.clone());
        let (t, _) = accounts.register("t@example.com", "secret1", draft("Tom", false)).await.unwrap();
        let (g, _) = accounts.register("g@example.com", "secret1", draft("Gina", true)).await.unwrap();
        let invitation = engine.send_invitation(&t, "g@example.com").await.unwrap();
        engine.accept_invitation(&g, &invitation.id, &t.user_id).await.unwrap();

        accounts.delete_account(&g).await.unwrap();

        let tom = engine.profiles().get(&t.user_id).await.unwrap();
        assert!(tom.caregivers_id.is_empty());
        assert!(engine.invitations().involving(&t.user_id).await.unwrap().is_empty());
        assert!(engine.profiles().find(&g.user_id).await.unwrap().is_none());
        assert!(accounts.login("g@example.com", "secret1").await.is_err());
    }
}
