//! crates/carelink_core/src/relationships.rs
//!
//! The Relationship Reconciliation Engine.
//!
//! Accepted relationships live in the profiles' `caretakersID`/`caregiversID`
//! arrays; everything still in flight lives in invitation documents. This module
//! merges both into one deduplicated view per user and drives the transitions:
//!
//! ```text
//! pending  -> accepted   (recipient only)
//! pending  -> rejected   (recipient only)
//! pending  -> [deleted]  (either party, withdrawal)
//! rejected -> [deleted]  (either party, cleanup)
//! accepted -> [deleted]  (relationship removal)
//! ```
//!
//! Mutations spanning several documents are not transactional. A failure midway is
//! reported as `CareError::PartialWrite`, and `repair_relationships` later settles
//! the profiles using the accepted invitation as the tiebreaker: an accepted
//! invitation means "linked", its absence means "unlinked".

use crate::domain::{
    CaregiverInfo, CaregiverInvitation, InvitationStatus, Role, UserProfile,
};
use crate::error::{CareError, CareResult, WriteStep};
use crate::invitations::InvitationRepository;
use crate::ports::DocumentStore;
use crate::profiles::{normalize_email, ProfileRepository};
use crate::session::SessionContext;
use crate::validation::validate_email;
use chrono::Utc;
use futures::future::try_join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// What `remove_relationship_or_invitation` ended up removing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal {
    Relationship { peer_id: String },
    Invitation { invitation_id: String, status: InvitationStatus },
}

/// Changes made by one `repair_relationships` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Peers whose missing half of the link was written back.
    pub restored: Vec<String>,
    /// Peers whose dangling link was dropped.
    pub dropped: Vec<String>,
}

impl RepairReport {
    pub fn is_clean(&self) -> bool {
        self.restored.is_empty() && self.dropped.is_empty()
    }
}

#[derive(Clone)]
pub struct RelationshipEngine {
    profiles: ProfileRepository,
    invitations: InvitationRepository,
}

impl RelationshipEngine {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            profiles: ProfileRepository::new(store.clone()),
            invitations: InvitationRepository::new(store),
        }
    }

    pub fn profiles(&self) -> &ProfileRepository {
        &self.profiles
    }

    pub fn invitations(&self) -> &InvitationRepository {
        &self.invitations
    }

    //=====================================================================================
    // Read side
    //=====================================================================================

    /// Every peer the caller is linked with or shares an invitation thread with.
    ///
    /// Order: accepted, received-pending, received-rejected, sent-pending, sent-rejected.
    /// At most one entry per `(peer, status, is_sent_by_me)`, and an accepted peer never
    /// shows up again through a stale invitation.
    pub async fn build_relationship_view(
        &self,
        ctx: &SessionContext,
        role: Role,
    ) -> CareResult<Vec<CaregiverInfo>> {
        let me = self.profiles.get(&ctx.user_id).await?;

        let (accepted, received, sent) = futures::try_join!(
            self.accepted_peers(&me, role),
            self.invitations.received(&ctx.user_id),
            self.invitations.sent(&ctx.user_id),
        )?;

        let senders: Vec<&str> = received.iter().map(|i| i.from_user_id.as_str()).collect();
        let sender_emails = try_join_all(senders.iter().map(|id| self.profiles.find_public(id))).await?;

        let mut view = ViewBuilder::default();
        for peer in &accepted {
            view.push_accepted(peer);
        }
        for status in [InvitationStatus::Pending, InvitationStatus::Rejected] {
            for (invitation, public) in received.iter().zip(&sender_emails) {
                if invitation.status == status {
                    let email = public.as_ref().map(|p| p.email.clone()).unwrap_or_default();
                    view.push_received(invitation, email);
                }
            }
        }
        for status in [InvitationStatus::Pending, InvitationStatus::Rejected] {
            for invitation in sent.iter().filter(|i| i.status == status) {
                view.push_sent(invitation);
            }
        }
        Ok(view.finish())
    }

    async fn accepted_peers(&self, me: &UserProfile, role: Role) -> CareResult<Vec<UserProfile>> {
        let peers = try_join_all(me.peers(role).iter().map(|id| self.profiles.find(id))).await?;
        Ok(me
            .peers(role)
            .iter()
            .zip(peers)
            .filter_map(|(id, peer)| {
                if peer.is_none() {
                    warn!(user_id = %me.user_id, peer_id = %id, "accepted peer has no profile");
                }
                peer
            })
            .collect())
    }

    //=====================================================================================
    // Invitation lifecycle
    //=====================================================================================

    /// Creates a pending invitation from the caller to the user registered under `to_email`.
    pub async fn send_invitation(
        &self,
        ctx: &SessionContext,
        to_email: &str,
    ) -> CareResult<CaregiverInvitation> {
        let to_email = normalize_email(to_email);
        validate_email(&to_email)?;
        if to_email == normalize_email(&ctx.email) {
            return Err(CareError::Validation("you cannot invite yourself".to_string()));
        }

        let target = self
            .profiles
            .find_public_by_email(&to_email)
            .await?
            .ok_or_else(|| CareError::UserNotFound(to_email.clone()))?;
        if target.user_id == ctx.user_id {
            return Err(CareError::Validation("you cannot invite yourself".to_string()));
        }

        let me = self.profiles.get(&ctx.user_id).await?;
        let recipient = self.profiles.get(&target.user_id).await?;
        ensure_opposite_roles(&me, &recipient)?;
        if me.is_linked_with(&target.user_id) {
            return Err(CareError::Validation(format!(
                "you are already connected with {}",
                to_email
            )));
        }
        if self
            .invitations
            .find_between(&ctx.user_id, &target.user_id, InvitationStatus::Pending)
            .await?
            .is_some()
        {
            return Err(CareError::Validation(format!(
                "an invitation with {} is already pending",
                to_email
            )));
        }

        let invitation = CaregiverInvitation {
            id: Uuid::new_v4().to_string(),
            from_user_id: ctx.user_id.clone(),
            to_user_id: target.user_id,
            to_user_email: to_email,
            from_user_name: me.display_name(),
            status: InvitationStatus::Pending,
            created_at: Utc::now(),
            responded_at: None,
            version: 0,
        };
        self.invitations.create(&invitation).await?;
        info!(invitation_id = %invitation.id, from = %invitation.from_user_id, to = %invitation.to_user_id, "invitation sent");
        Ok(invitation)
    }

    /// Loads an invitation the caller received and may still respond to.
    async fn pending_for_recipient(
        &self,
        ctx: &SessionContext,
        invitation_id: &str,
    ) -> CareResult<CaregiverInvitation> {
        let invitation = self.invitations.get(invitation_id).await?;
        if invitation.to_user_id != ctx.user_id {
            return Err(CareError::Forbidden(
                "only the recipient can respond to an invitation".to_string(),
            ));
        }
        if invitation.status != InvitationStatus::Pending {
            return Err(CareError::NotPending(invitation.id));
        }
        Ok(invitation)
    }

    /// Accepts a pending invitation and links both profiles.
    ///
    /// Writes, in order: invitation status, the accepter's array, the counterparty's array.
    pub async fn accept_invitation(
        &self,
        ctx: &SessionContext,
        invitation_id: &str,
        counterparty_id: &str,
    ) -> CareResult<CaregiverInvitation> {
        let invitation = self.pending_for_recipient(ctx, invitation_id).await?;
        if invitation.from_user_id != counterparty_id {
            return Err(CareError::Validation(format!(
                "invitation {} was not sent by {}",
                invitation_id, counterparty_id
            )));
        }
        let accepter = self.profiles.get(&ctx.user_id).await?;
        let counterparty = self.profiles.get(counterparty_id).await?;
        ensure_opposite_roles(&accepter, &counterparty)?;
        let role = accepter.role();

        let mut applied = Vec::new();
        let accepted = self
            .invitations
            .transition(&invitation, InvitationStatus::Accepted, Utc::now())
            .await
            .map_err(|e| CareError::partial(&applied, WriteStep::InvitationStatus, e))?;
        applied.push(WriteStep::InvitationStatus);

        self.profiles
            .link(&ctx.user_id, role, counterparty_id)
            .await
            .map_err(|e| CareError::partial(&applied, WriteStep::CallerLink, e))?;
        applied.push(WriteStep::CallerLink);

        self.profiles
            .link(counterparty_id, role.counterpart(), &ctx.user_id)
            .await
            .map_err(|e| CareError::partial(&applied, WriteStep::PeerLink, e))?;

        info!(invitation_id, accepter = %ctx.user_id, counterparty = counterparty_id, "invitation accepted");
        Ok(accepted)
    }

    pub async fn reject_invitation(
        &self,
        ctx: &SessionContext,
        invitation_id: &str,
    ) -> CareResult<CaregiverInvitation> {
        let invitation = self.pending_for_recipient(ctx, invitation_id).await?;
        let rejected = self
            .invitations
            .transition(&invitation, InvitationStatus::Rejected, Utc::now())
            .await?;
        info!(invitation_id, rejecter = %ctx.user_id, "invitation rejected");
        Ok(rejected)
    }

    /// Withdraws a pending invitation or cleans up a rejected one, from either side.
    pub async fn delete_invitation(
        &self,
        ctx: &SessionContext,
        invitation_id: &str,
    ) -> CareResult<()> {
        let invitation = self.invitations.get(invitation_id).await?;
        if invitation.from_user_id != ctx.user_id && invitation.to_user_id != ctx.user_id {
            return Err(CareError::Forbidden(
                "only the two parties can delete an invitation".to_string(),
            ));
        }
        if invitation.status == InvitationStatus::Accepted {
            return Err(CareError::Validation(
                "an accepted invitation is removed together with the relationship".to_string(),
            ));
        }
        if !self.invitations.delete(invitation_id).await? {
            return Err(CareError::NotFound(format!("invitation {}", invitation_id)));
        }
        info!(invitation_id, by = %ctx.user_id, "invitation deleted");
        Ok(())
    }

    /// Removes whatever currently connects the caller with `peer_id`.
    ///
    /// An accepted relationship is unlinked on both sides; otherwise the first open or
    /// rejected invitation thread, in view order, is deleted. With nothing left to
    /// remove the call fails with `NotFound`.
    pub async fn remove_relationship_or_invitation(
        &self,
        ctx: &SessionContext,
        peer_id: &str,
    ) -> CareResult<Removal> {
        let me = self.profiles.get(&ctx.user_id).await?;
        let role = me.role();

        if me.peers(role).iter().any(|id| id == peer_id) {
            self.unlink_both(&ctx.user_id, role, peer_id).await?;
            info!(user_id = %ctx.user_id, peer_id, "relationship removed");
            return Ok(Removal::Relationship {
                peer_id: peer_id.to_string(),
            });
        }

        let view = self.build_relationship_view(ctx, role).await?;
        let entry = view
            .into_iter()
            .find(|e| e.user_id == peer_id && e.invitation_id.is_some())
            .ok_or_else(|| {
                CareError::NotFound(format!("no relationship or invitation with {}", peer_id))
            })?;
        let invitation_id = entry.invitation_id.unwrap_or_default();
        if !self.invitations.delete(&invitation_id).await? {
            return Err(CareError::NotFound(format!("invitation {}", invitation_id)));
        }
        info!(user_id = %ctx.user_id, peer_id, invitation_id = %invitation_id, status = entry.status.as_str(), "invitation removed");
        Ok(Removal::Invitation {
            invitation_id,
            status: entry.status,
        })
    }

    /// Deletes the accepted invitation(s) first so an interrupted removal is never
    /// mistaken for an interrupted acceptance by the repair pass.
    async fn unlink_both(&self, user_id: &str, role: Role, peer_id: &str) -> CareResult<()> {
        let mut applied = Vec::new();

        let stale: Vec<CaregiverInvitation> = self
            .invitations
            .involving(user_id)
            .await?
            .into_iter()
            .filter(|i| i.status == InvitationStatus::Accepted && i.involves(user_id, peer_id))
            .collect();
        for invitation in &stale {
            self.invitations
                .delete(&invitation.id)
                .await
                .map_err(|e| CareError::partial(&applied, WriteStep::InvitationDelete, e))?;
        }
        if !stale.is_empty() {
            applied.push(WriteStep::InvitationDelete);
        }

        self.profiles
            .unlink(user_id, role, peer_id)
            .await
            .map_err(|e| CareError::partial(&applied, WriteStep::CallerLink, e))?;
        applied.push(WriteStep::CallerLink);

        match self.profiles.unlink(peer_id, role.counterpart(), user_id).await {
            Ok(()) => Ok(()),
            Err(CareError::NotFound(_)) => {
                warn!(user_id, peer_id, "peer profile is gone; only the caller's side was unlinked");
                Ok(())
            }
            Err(e) => Err(CareError::partial(&applied, WriteStep::PeerLink, e)),
        }
    }

    //=====================================================================================
    // Repair
    //=====================================================================================

    /// Settles asymmetric links left behind by interrupted accepts and removals.
    ///
    /// A link backed by an accepted invitation is completed on both sides; a one-sided
    /// link without one is dropped.
    pub async fn repair_relationships(&self, ctx: &SessionContext) -> CareResult<RepairReport> {
        let me = self.profiles.get(&ctx.user_id).await?;
        let role = me.role();
        let mine: HashSet<&str> = me.peers(role).iter().map(String::as_str).collect();
        let mut report = RepairReport::default();

        let accepted: Vec<CaregiverInvitation> = self
            .invitations
            .involving(&ctx.user_id)
            .await?
            .into_iter()
            .filter(|i| i.status == InvitationStatus::Accepted)
            .collect();
        let backed: HashSet<&str> = accepted.iter().map(|i| i.peer_of(&ctx.user_id)).collect();

        for peer_id in &backed {
            let Some(peer) = self.profiles.find(peer_id).await? else {
                warn!(user_id = %ctx.user_id, peer_id, "accepted invitation points at a deleted profile");
                if mine.contains(peer_id) {
                    self.profiles.unlink(&ctx.user_id, role, peer_id).await?;
                    report.dropped.push(peer_id.to_string());
                }
                continue;
            };
            let mut restored = false;
            if !mine.contains(peer_id) {
                self.profiles.link(&ctx.user_id, role, peer_id).await?;
                restored = true;
            }
            if !peer.peers(role.counterpart()).iter().any(|id| id == &ctx.user_id) {
                self.profiles.link(peer_id, role.counterpart(), &ctx.user_id).await?;
                restored = true;
            }
            if restored {
                warn!(user_id = %ctx.user_id, peer_id, "restored half-written relationship");
                report.restored.push(peer_id.to_string());
            }
        }

        for peer_id in mine.iter().filter(|id| !backed.contains(*id)) {
            let reverse = match self.profiles.find(peer_id).await? {
                Some(peer) => peer.peers(role.counterpart()).iter().any(|id| id == &ctx.user_id),
                None => false,
            };
            if !reverse {
                warn!(user_id = %ctx.user_id, peer_id, "dropping one-sided relationship");
                self.profiles.unlink(&ctx.user_id, role, peer_id).await?;
                report.dropped.push(peer_id.to_string());
            }
        }

        report.restored.sort();
        report.dropped.sort();
        Ok(report)
    }
}

//=========================================================================================
// View assembly
//=========================================================================================

#[derive(Default)]
struct ViewBuilder {
    entries: Vec<CaregiverInfo>,
    accepted: HashSet<String>,
}

impl ViewBuilder {
    fn push_accepted(&mut self, peer: &UserProfile) {
        if !self.accepted.insert(peer.user_id.clone()) {
            return;
        }
        self.entries.push(CaregiverInfo {
            user_id: peer.user_id.clone(),
            email: peer.email.clone(),
            first_name: peer.first_name.clone(),
            last_name: peer.last_name.clone(),
            status: InvitationStatus::Accepted,
            added_at: peer.created_at,
            is_sent_by_me: false,
            invitation_id: None,
        });
    }

    fn push_received(&mut self, invitation: &CaregiverInvitation, email: String) {
        let (first_name, last_name) = split_name(&invitation.from_user_name);
        self.push_invitation(CaregiverInfo {
            user_id: invitation.from_user_id.clone(),
            email,
            first_name,
            last_name,
            status: invitation.status,
            added_at: invitation.created_at,
            is_sent_by_me: false,
            invitation_id: Some(invitation.id.clone()),
        });
    }

    fn push_sent(&mut self, invitation: &CaregiverInvitation) {
        self.push_invitation(CaregiverInfo {
            user_id: invitation.to_user_id.clone(),
            email: invitation.to_user_email.clone(),
            first_name: local_part(&invitation.to_user_email).to_string(),
            last_name: String::new(),
            status: invitation.status,
            added_at: invitation.created_at,
            is_sent_by_me: true,
            invitation_id: Some(invitation.id.clone()),
        });
    }

    fn push_invitation(&mut self, entry: CaregiverInfo) {
        if entry.status == InvitationStatus::Accepted || self.accepted.contains(&entry.user_id) {
            return;
        }
        let duplicate = self.entries.iter().any(|e| {
            e.user_id == entry.user_id
                && e.status == entry.status
                && e.is_sent_by_me == entry.is_sent_by_me
        });
        if !duplicate {
            self.entries.push(entry);
        }
    }

    fn finish(self) -> Vec<CaregiverInfo> {
        self.entries
    }
}

/// Splits a display name on its first space into first and last name.
fn split_name(full_name: &str) -> (String, String) {
    match full_name.trim().split_once(' ') {
        Some((first, last)) => (first.to_string(), last.trim().to_string()),
        None => (full_name.trim().to_string(), String::new()),
    }
}

fn local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

/// A relationship always pairs one caretaker with one caregiver.
fn ensure_opposite_roles(a: &UserProfile, b: &UserProfile) -> CareResult<()> {
    if a.role() == b.role() {
        return Err(CareError::Validation(format!(
            "{} and {} are both {}s",
            a.email,
            b.email,
            a.role().as_str()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{save, INVITATIONS};
    use crate::memory::InMemoryDocumentStore;
    use chrono::Duration;

    struct Fixture {
        store: Arc<InMemoryDocumentStore>,
        engine: RelationshipEngine,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(InMemoryDocumentStore::new());
            let engine = RelationshipEngine::new(store.clone());
            Self { store, engine }
        }

        async fn user(&self, id: &str, name: &str, is_caregiver: bool) -> SessionContext {
            let (first, last) = split_name(name);
            let email = format!("{}@example.com", id);
            let profile = UserProfile {
                user_id: id.into(),
                first_name: first,
                last_name: last,
                age: 50,
                sex: "F".into(),
                phone_number: String::new(),
                email: email.clone(),
                created_at: Utc::now(),
                is_caregiver,
                caretakers_id: vec![],
                caregivers_id: vec![],
            };
            self.engine.profiles().create(&profile).await.unwrap();
            SessionContext::new(id, format!("token-{}", id), email)
        }

        async fn profile(&self, id: &str) -> UserProfile {
            self.engine.profiles().get(id).await.unwrap()
        }

        async fn stale_invitation(&self, id: &str, from: &str, to: &str, status: InvitationStatus) {
            let invitation = CaregiverInvitation {
                id: id.into(),
                from_user_id: from.into(),
                to_user_id: to.into(),
                to_user_email: format!("{}@example.com", to),
                from_user_name: "Old Record".into(),
                status,
                created_at: Utc::now() - Duration::days(30),
                responded_at: None,
                version: 0,
            };
            save(self.store.as_ref(), &invitation).await.unwrap();
        }
    }

    /// T (caretaker) invites G (caregiver); G accepts.
    async fn linked_pair(fx: &Fixture) -> (SessionContext, SessionContext, CaregiverInvitation) {
        let t = fx.user("t", "Tom Caretaker", false).await;
        let g = fx.user("g", "Gina Caregiver", true).await;
        let invitation = fx.engine.send_invitation(&t, "g@example.com").await.unwrap();
        let accepted = fx
            .engine
            .accept_invitation(&g, &invitation.id, "t")
            .await
            .unwrap();
        (t, g, accepted)
    }

    #[tokio::test]
    async fn accepted_invitation_links_both_profiles() {
        let fx = Fixture::new();
        let (t, _g, accepted) = linked_pair(&fx).await;

        assert_eq!(accepted.status, InvitationStatus::Accepted);
        assert!(accepted.responded_at.is_some());
        assert_eq!(fx.profile("t").await.caregivers_id, vec!["g".to_string()]);
        assert_eq!(fx.profile("g").await.caretakers_id, vec!["t".to_string()]);
        let stored = fx.engine.invitations().get(&accepted.id).await.unwrap();
        assert_eq!(stored.status, InvitationStatus::Accepted);

        let view = fx.engine.build_relationship_view(&t, Role::Caretaker).await.unwrap();
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].user_id, "g");
        assert_eq!(view[0].status, InvitationStatus::Accepted);
        assert_eq!(view[0].first_name, "Gina");
    }

    #[tokio::test]
    async fn self_invitation_fails_before_any_write() {
        let fx = Fixture::new();
        let t = fx.user("t", "Tom Caretaker", false).await;
        let writes = fx.store.write_count();

        let err = fx.engine.send_invitation(&t, " T@Example.com").await.unwrap_err();

        assert!(matches!(err, CareError::Validation(_)));
        assert_eq!(fx.store.write_count(), writes);
    }

    #[tokio::test]
    async fn unknown_email_is_user_not_found() {
        let fx = Fixture::new();
        let t = fx.user("t", "Tom Caretaker", false).await;
        let err = fx.engine.send_invitation(&t, "nobody@example.com").await.unwrap_err();
        assert!(matches!(err, CareError::UserNotFound(email) if email == "nobody@example.com"));
    }

    #[tokio::test]
    async fn second_pending_invitation_is_refused() {
        let fx = Fixture::new();
        let t = fx.user("t", "Tom Caretaker", false).await;
        let g = fx.user("g", "Gina Caregiver", true).await;
        fx.engine.send_invitation(&t, "g@example.com").await.unwrap();

        let err = fx.engine.send_invitation(&g, "t@example.com").await.unwrap_err();
        assert!(matches!(err, CareError::Validation(_)));
    }

    #[tokio::test]
    async fn accepting_twice_is_not_pending_and_writes_nothing() {
        let fx = Fixture::new();
        let (_t, g, accepted) = linked_pair(&fx).await;
        let writes = fx.store.write_count();

        let err = fx
            .engine
            .accept_invitation(&g, &accepted.id, "t")
            .await
            .unwrap_err();

        assert!(matches!(err, CareError::NotPending(id) if id == accepted.id));
        assert_eq!(fx.store.write_count(), writes);
    }

    #[tokio::test]
    async fn only_the_recipient_may_respond() {
        let fx = Fixture::new();
        let t = fx.user("t", "Tom Caretaker", false).await;
        fx.user("g", "Gina Caregiver", true).await;
        let invitation = fx.engine.send_invitation(&t, "g@example.com").await.unwrap();

        let err = fx.engine.reject_invitation(&t, &invitation.id).await.unwrap_err();
        assert!(matches!(err, CareError::Forbidden(_)));
        let err = fx.engine.accept_invitation(&t, &invitation.id, "t").await.unwrap_err();
        assert!(matches!(err, CareError::Forbidden(_)));
    }

    #[tokio::test]
    async fn rejection_leaves_arrays_untouched() {
        let fx = Fixture::new();
        let t = fx.user("t", "Tom Caretaker", false).await;
        let g = fx.user("g", "Gina Caregiver", true).await;
        let invitation = fx.engine.send_invitation(&t, "g@example.com").await.unwrap();

        let rejected = fx.engine.reject_invitation(&g, &invitation.id).await.unwrap();

        assert_eq!(rejected.status, InvitationStatus::Rejected);
        assert!(fx.profile("t").await.caregivers_id.is_empty());
        assert!(fx.profile("g").await.caretakers_id.is_empty());

        let view = fx.engine.build_relationship_view(&t, Role::Caretaker).await.unwrap();
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].status, InvitationStatus::Rejected);
        assert!(view[0].is_sent_by_me);
        assert_eq!(view[0].first_name, "g");
        assert_eq!(view[0].last_name, "");
    }

    #[tokio::test]
    async fn view_orders_and_names_invitation_entries() {
        let fx = Fixture::new();
        let g = fx.user("g", "Gina Caregiver", true).await;
        let a = fx.user("a", "Anna Maria Nowak", false).await;
        let b = fx.user("b", "Bob", false).await;
        fx.user("c", "Carl Caretaker", false).await;
        fx.user("d", "Dora Caretaker", false).await;

        fx.engine.send_invitation(&a, "g@example.com").await.unwrap();
        let from_b = fx.engine.send_invitation(&b, "g@example.com").await.unwrap();
        fx.engine.reject_invitation(&g, &from_b.id).await.unwrap();
        fx.engine.send_invitation(&g, "c@example.com").await.unwrap();
        let to_d = fx.engine.send_invitation(&g, "d@example.com").await.unwrap();
        let d = SessionContext::new("d", "token-d", "d@example.com");
        fx.engine.reject_invitation(&d, &to_d.id).await.unwrap();

        let view = fx.engine.build_relationship_view(&g, Role::Caregiver).await.unwrap();
        let summary: Vec<_> = view
            .iter()
            .map(|e| (e.user_id.as_str(), e.status, e.is_sent_by_me))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("a", InvitationStatus::Pending, false),
                ("b", InvitationStatus::Rejected, false),
                ("c", InvitationStatus::Pending, true),
                ("d", InvitationStatus::Rejected, true),
            ]
        );
        assert_eq!((view[0].first_name.as_str(), view[0].last_name.as_str()), ("Anna", "Maria Nowak"));
        assert_eq!(view[0].email, "a@example.com");
        assert_eq!((view[1].first_name.as_str(), view[1].last_name.as_str()), ("Bob", ""));
    }

    #[tokio::test]
    async fn accepted_peer_shadows_stale_invitations() {
        let fx = Fixture::new();
        let (t, _g, _) = linked_pair(&fx).await;
        fx.stale_invitation("old-1", "g", "t", InvitationStatus::Pending).await;
        fx.stale_invitation("old-2", "t", "g", InvitationStatus::Rejected).await;

        let view = fx.engine.build_relationship_view(&t, Role::Caretaker).await.unwrap();

        assert_eq!(view.len(), 1);
        assert_eq!(view[0].status, InvitationStatus::Accepted);
    }

    #[tokio::test]
    async fn duplicate_invitation_records_collapse_to_one_entry() {
        let fx = Fixture::new();
        let t = fx.user("t", "Tom Caretaker", false).await;
        fx.user("g", "Gina Caregiver", true).await;
        fx.stale_invitation("dup-1", "g", "t", InvitationStatus::Pending).await;
        fx.stale_invitation("dup-2", "g", "t", InvitationStatus::Pending).await;

        let view = fx.engine.build_relationship_view(&t, Role::Caretaker).await.unwrap();

        assert_eq!(view.len(), 1);
        assert_eq!(view[0].invitation_id.as_deref(), Some("dup-1"));
    }

    #[tokio::test]
    async fn removing_twice_is_not_found_and_view_is_stable() {
        let fx = Fixture::new();
        let (t, g, accepted) = linked_pair(&fx).await;

        let removal = fx.engine.remove_relationship_or_invitation(&t, "g").await.unwrap();
        assert_eq!(removal, Removal::Relationship { peer_id: "g".into() });
        assert!(fx.profile("t").await.caregivers_id.is_empty());
        assert!(fx.profile("g").await.caretakers_id.is_empty());
        assert!(matches!(
            fx.engine.invitations().get(&accepted.id).await,
            Err(CareError::NotFound(_))
        ));

        let before = fx.engine.build_relationship_view(&g, Role::Caregiver).await.unwrap();
        let err = fx.engine.remove_relationship_or_invitation(&t, "g").await.unwrap_err();
        assert!(matches!(err, CareError::NotFound(_)));
        let after = fx.engine.build_relationship_view(&g, Role::Caregiver).await.unwrap();
        assert_eq!(before, after);
        assert!(after.is_empty());
    }

    #[tokio::test]
    async fn removing_a_pending_peer_withdraws_the_invitation() {
        let fx = Fixture::new();
        let t = fx.user("t", "Tom Caretaker", false).await;
        let g = fx.user("g", "Gina Caregiver", true).await;
        let invitation = fx.engine.send_invitation(&t, "g@example.com").await.unwrap();

        let removal = fx.engine.remove_relationship_or_invitation(&g, "t").await.unwrap();

        assert_eq!(
            removal,
            Removal::Invitation {
                invitation_id: invitation.id,
                status: InvitationStatus::Pending
            }
        );
        assert!(fx.engine.build_relationship_view(&t, Role::Caretaker).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn same_role_invitation_is_refused_before_any_write() {
        let fx = Fixture::new();
        let a = fx.user("a", "Anna Caretaker", false).await;
        fx.user("b", "Bob Caretaker", false).await;
        let writes = fx.store.write_count();

        let err = fx.engine.send_invitation(&a, "b@example.com").await.unwrap_err();

        assert!(matches!(err, CareError::Validation(_)));
        assert_eq!(fx.store.write_count(), writes);
        assert!(fx.engine.invitations().involving("a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn same_role_invitation_on_record_cannot_be_accepted() {
        let fx = Fixture::new();
        fx.user("a", "Anna Caretaker", false).await;
        let b = fx.user("b", "Bob Caretaker", false).await;
        fx.stale_invitation("old", "a", "b", InvitationStatus::Pending).await;
        let writes = fx.store.write_count();

        let err = fx.engine.accept_invitation(&b, "old", "a").await.unwrap_err();

        assert!(matches!(err, CareError::Validation(_)));
        assert_eq!(fx.store.write_count(), writes);
        let (a_profile, b_profile) = (fx.profile("a").await, fx.profile("b").await);
        assert!(a_profile.caretakers_id.is_empty() && a_profile.caregivers_id.is_empty());
        assert!(b_profile.caretakers_id.is_empty() && b_profile.caregivers_id.is_empty());
        let stored = fx.engine.invitations().get("old").await.unwrap();
        assert_eq!(stored.status, InvitationStatus::Pending);
    }

    #[tokio::test]
    async fn unversioned_invitation_can_still_be_answered() {
        let fx = Fixture::new();
        let t = fx.user("t", "Tom Caretaker", false).await;
        let g = fx.user("g", "Gina Caregiver", true).await;
        fx.user("h", "Hanna Caregiver", true).await;
        for (id, to) in [("legacy-g", "g"), ("legacy-h", "h")] {
            fx.stale_invitation(id, "t", to, InvitationStatus::Pending).await;
            let mut doc = fx.store.get_document(INVITATIONS, id).await.unwrap();
            doc.remove("version");
            fx.store.upsert_document(INVITATIONS, id, doc).await.unwrap();
        }

        let accepted = fx.engine.accept_invitation(&g, "legacy-g", "t").await.unwrap();
        assert_eq!(accepted.status, InvitationStatus::Accepted);
        assert_eq!(accepted.version, 1);
        assert_eq!(fx.profile("t").await.caregivers_id, vec!["g".to_string()]);

        let h = SessionContext::new("h", "token-h", "h@example.com");
        let rejected = fx.engine.reject_invitation(&h, "legacy-h").await.unwrap();
        assert_eq!(rejected.status, InvitationStatus::Rejected);

        let view = fx.engine.build_relationship_view(&t, Role::Caretaker).await.unwrap();
        let summary: Vec<_> = view.iter().map(|e| (e.user_id.as_str(), e.status)).collect();
        assert_eq!(
            summary,
            vec![("g", InvitationStatus::Accepted), ("h", InvitationStatus::Rejected)]
        );
    }

    #[tokio::test]
    async fn sender_can_withdraw_a_pending_invitation() {
        let fx = Fixture::new();
        let t = fx.user("t", "Tom Caretaker", false).await;
        let g = fx.user("g", "Gina Caregiver", true).await;
        let invitation = fx.engine.send_invitation(&t, "g@example.com").await.unwrap();

        fx.engine.delete_invitation(&t, &invitation.id).await.unwrap();

        assert!(fx.engine.build_relationship_view(&g, Role::Caregiver).await.unwrap().is_empty());
        let err = fx.engine.delete_invitation(&t, &invitation.id).await.unwrap_err();
        assert!(matches!(err, CareError::NotFound(_)));
    }

    #[tokio::test]
    async fn recipient_can_clean_up_a_rejected_invitation() {
        let fx = Fixture::new();
        let t = fx.user("t", "Tom Caretaker", false).await;
        let g = fx.user("g", "Gina Caregiver", true).await;
        let invitation = fx.engine.send_invitation(&t, "g@example.com").await.unwrap();
        fx.engine.reject_invitation(&g, &invitation.id).await.unwrap();

        fx.engine.delete_invitation(&g, &invitation.id).await.unwrap();

        assert!(fx.engine.build_relationship_view(&t, Role::Caretaker).await.unwrap().is_empty());
        assert!(matches!(
            fx.engine.invitations().get(&invitation.id).await,
            Err(CareError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn outsiders_cannot_delete_an_invitation() {
        let fx = Fixture::new();
        let t = fx.user("t", "Tom Caretaker", false).await;
        fx.user("g", "Gina Caregiver", true).await;
        let x = fx.user("x", "Xena Caregiver", true).await;
        let invitation = fx.engine.send_invitation(&t, "g@example.com").await.unwrap();
        let writes = fx.store.write_count();

        let err = fx.engine.delete_invitation(&x, &invitation.id).await.unwrap_err();

        assert!(matches!(err, CareError::Forbidden(_)));
        assert_eq!(fx.store.write_count(), writes);
        assert!(fx.engine.invitations().get(&invitation.id).await.is_ok());
    }

    #[tokio::test]
    async fn accepted_invitation_cannot_be_deleted_directly() {
        let fx = Fixture::new();
        let (t, _g, accepted) = linked_pair(&fx).await;
        let err = fx.engine.delete_invitation(&t, &accepted.id).await.unwrap_err();
        assert!(matches!(err, CareError::Validation(_)));
    }

    #[tokio::test]
    async fn interrupted_accept_reports_the_applied_half_and_repairs() {
        let fx = Fixture::new();
        let t = fx.user("t", "Tom Caretaker", false).await;
        let g = fx.user("g", "Gina Caregiver", true).await;
        let invitation = fx.engine.send_invitation(&t, "g@example.com").await.unwrap();

        fx.store.fail_writes_after(2);
        let err = fx
            .engine
            .accept_invitation(&g, &invitation.id, "t")
            .await
            .unwrap_err();
        match err {
            CareError::PartialWrite { applied, failed, .. } => {
                assert_eq!(applied, vec![WriteStep::InvitationStatus, WriteStep::CallerLink]);
                assert_eq!(failed, WriteStep::PeerLink);
            }
            other => panic!("expected partial write, got {other:?}"),
        }
        assert_eq!(fx.profile("g").await.caretakers_id, vec!["t".to_string()]);
        assert!(fx.profile("t").await.caregivers_id.is_empty());

        fx.store.clear_write_failures();
        let report = fx.engine.repair_relationships(&t).await.unwrap();
        assert_eq!(report.restored, vec!["g".to_string()]);
        assert_eq!(fx.profile("t").await.caregivers_id, vec!["g".to_string()]);
        assert!(fx.engine.repair_relationships(&g).await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn interrupted_removal_is_finished_by_repair() {
        let fx = Fixture::new();
        let (t, g, _) = linked_pair(&fx).await;

        // Invitation delete and caller unlink succeed, the peer unlink fails.
        fx.store.fail_writes_after(2);
        let err = fx.engine.remove_relationship_or_invitation(&t, "g").await.unwrap_err();
        assert!(matches!(err, CareError::PartialWrite { failed: WriteStep::PeerLink, .. }));
        fx.store.clear_write_failures();

        let report = fx.engine.repair_relationships(&g).await.unwrap();
        assert_eq!(report.dropped, vec!["t".to_string()]);
        assert!(fx.profile("g").await.caretakers_id.is_empty());
        assert!(fx.engine.build_relationship_view(&t, Role::Caretaker).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn lost_race_on_accept_writes_no_arrays() {
        let fx = Fixture::new();
        let t = fx.user("t", "Tom Caretaker", false).await;
        let g = fx.user("g", "Gina Caregiver", true).await;
        let invitation = fx.engine.send_invitation(&t, "g@example.com").await.unwrap();

        // Another session rejects between our read and our write.
        let snapshot = fx.engine.invitations().get(&invitation.id).await.unwrap();
        fx.engine.reject_invitation(&g, &invitation.id).await.unwrap();
        let err = fx
            .engine
            .invitations()
            .transition(&snapshot, InvitationStatus::Accepted, Utc::now())
            .await
            .unwrap_err();

        assert!(matches!(err, CareError::Conflict(_)));
        assert!(fx.profile("g").await.caretakers_id.is_empty());
    }

    #[test]
    fn names_split_on_first_space() {
        assert_eq!(split_name("Jan Maria Rokita"), ("Jan".into(), "Maria Rokita".into()));
        assert_eq!(split_name("Cher"), ("Cher".into(), String::new()));
        assert_eq!(local_part("ola.k@example.com"), "ola.k");
    }
}
