//! crates/carelink_core/src/invitations.rs
//!
//! Invitation Repository: CRUD and status-filtered queries over `CaregiverInvitation`.

use crate::codec::{save, StoredDocument, INVITATIONS};
use crate::domain::{CaregiverInvitation, InvitationStatus};
use crate::error::{CareError, CareResult};
use crate::fields::{fields, FieldValue};
use crate::ports::{DocumentStore, PortError};
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[derive(Clone)]
pub struct InvitationRepository {
    store: Arc<dyn DocumentStore>,
}

impl InvitationRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, invitation: &CaregiverInvitation) -> CareResult<()> {
        save(self.store.as_ref(), invitation).await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> CareResult<CaregiverInvitation> {
        match self.store.get_document(INVITATIONS, id).await {
            Ok(doc) => Ok(CaregiverInvitation::from_fields(id, &doc)?),
            Err(PortError::NotFound(_)) => Err(CareError::NotFound(format!("invitation {}", id))),
            Err(e) => Err(e.into()),
        }
    }

    async fn by_field(&self, field: &str, user_id: &str) -> CareResult<Vec<CaregiverInvitation>> {
        let docs = self
            .store
            .query_equals(INVITATIONS, field, &FieldValue::from(user_id))
            .await?;
        let mut invitations = docs
            .iter()
            .map(|(id, doc)| CaregiverInvitation::from_fields(id, doc))
            .collect::<Result<Vec<_>, _>>()?;
        invitations.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(invitations)
    }

    /// Invitations addressed to `user_id`, oldest first.
    pub async fn received(&self, user_id: &str) -> CareResult<Vec<CaregiverInvitation>> {
        self.by_field("toUserId", user_id).await
    }

    /// Invitations sent by `user_id`, oldest first.
    pub async fn sent(&self, user_id: &str) -> CareResult<Vec<CaregiverInvitation>> {
        self.by_field("fromUserId", user_id).await
    }

    /// Every invitation `user_id` sent or received.
    pub async fn involving(&self, user_id: &str) -> CareResult<Vec<CaregiverInvitation>> {
        let mut all = self.received(user_id).await?;
        all.extend(self.sent(user_id).await?);
        Ok(all)
    }

    /// First invitation between the two parties, in either direction, with `status`.
    pub async fn find_between(
        &self,
        a: &str,
        b: &str,
        status: InvitationStatus,
    ) -> CareResult<Option<CaregiverInvitation>> {
        Ok(self
            .involving(a)
            .await?
            .into_iter()
            .find(|i| i.status == status && i.involves(a, b)))
    }

    /// Moves `invitation` to `status`, provided nobody changed it since it was read.
    ///
    /// Records written before versioning carry no `version` field and decode as
    /// version 0; their first transition is guarded on the status instead. Every
    /// transition leaves `pending`, so two racing responses still cannot both win.
    pub async fn transition(
        &self,
        invitation: &CaregiverInvitation,
        status: InvitationStatus,
        at: DateTime<Utc>,
    ) -> CareResult<CaregiverInvitation> {
        let next_version = invitation.version + 1;
        let changes = fields([
            ("status", FieldValue::from(status.as_str())),
            ("respondedAt", FieldValue::from(at)),
            ("version", FieldValue::from(next_version)),
        ]);
        let (guard_field, guard_value) = if invitation.version == 0 {
            ("status", FieldValue::from(invitation.status.as_str()))
        } else {
            ("version", FieldValue::from(invitation.version))
        };
        let result = self
            .store
            .update_if(INVITATIONS, &invitation.id, changes, guard_field, &guard_value)
            .await;
        match result {
            Ok(()) => Ok(CaregiverInvitation {
                status,
                responded_at: Some(at),
                version: next_version,
                ..invitation.clone()
            }),
            Err(PortError::Conflict(_)) => Err(CareError::Conflict(format!(
                "invitation {} was changed by another session",
                invitation.id
            ))),
            Err(PortError::NotFound(_)) => {
                Err(CareError::NotFound(format!("invitation {}", invitation.id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete(&self, id: &str) -> CareResult<bool> {
        Ok(self.store.delete_document(INVITATIONS, id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryDocumentStore;
    use chrono::Duration;

    fn invitation(id: &str, from: &str, to: &str, status: InvitationStatus, age_minutes: i64) -> CaregiverInvitation {
        CaregiverInvitation {
            id: id.into(),
            from_user_id: from.into(),
            to_user_id: to.into(),
            to_user_email: format!("{}@example.com", to),
            from_user_name: "Some One".into(),
            status,
            created_at: Utc::now() - Duration::minutes(age_minutes),
            responded_at: None,
            version: 0,
        }
    }

    #[tokio::test]
    async fn queries_split_by_direction_oldest_first() {
        let repo = InvitationRepository::new(Arc::new(InMemoryDocumentStore::new()));
        repo.create(&invitation("2", "c", "b", InvitationStatus::Rejected, 2)).await.unwrap();
        repo.create(&invitation("1", "a", "b", InvitationStatus::Pending, 3)).await.unwrap();
        repo.create(&invitation("3", "b", "d", InvitationStatus::Pending, 1)).await.unwrap();

        let received: Vec<_> = repo
            .received("b")
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(received, vec!["1", "2"]);

        let sent = repo.sent("b").await.unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id, "3");

        let found = repo.find_between("b", "c", InvitationStatus::Rejected).await.unwrap();
        assert_eq!(found.map(|i| i.id), Some("2".to_string()));
    }

    #[tokio::test]
    async fn stale_transition_is_a_conflict() {
        let repo = InvitationRepository::new(Arc::new(InMemoryDocumentStore::new()));
        let original = invitation("1", "a", "b", InvitationStatus::Pending, 0);
        repo.create(&original).await.unwrap();

        let accepted = repo
            .transition(&original, InvitationStatus::Accepted, Utc::now())
            .await
            .unwrap();
        assert_eq!(accepted.version, 1);

        let err = repo
            .transition(&original, InvitationStatus::Rejected, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, CareError::Conflict(_)));
        assert_eq!(repo.get("1").await.unwrap().status, InvitationStatus::Accepted);
    }

    #[tokio::test]
    async fn unversioned_record_transitions_once() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let repo = InvitationRepository::new(store.clone());
        let mut doc = invitation("1", "a", "b", InvitationStatus::Pending, 0).to_fields();
        doc.remove("version");
        store.upsert_document(INVITATIONS, "1", doc).await.unwrap();

        let legacy = repo.get("1").await.unwrap();
        assert_eq!(legacy.version, 0);
        let rejected = repo
            .transition(&legacy, InvitationStatus::Rejected, Utc::now())
            .await
            .unwrap();
        assert_eq!(rejected.version, 1);
        assert_eq!(repo.get("1").await.unwrap().version, 1);

        let err = repo
            .transition(&legacy, InvitationStatus::Accepted, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, CareError::Conflict(_)));
    }

    #[tokio::test]
    async fn missing_invitation_is_not_found() {
        let repo = InvitationRepository::new(Arc::new(InMemoryDocumentStore::new()));
        assert!(matches!(repo.get("nope").await, Err(CareError::NotFound(_))));
        assert!(!repo.delete("nope").await.unwrap());
    }
}
