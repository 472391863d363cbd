//! crates/carelink_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any storage or serialization format;
//! the mapping onto typed document fields lives in `codec.rs`.

use chrono::{DateTime, Utc};

//=========================================================================================
// Roles
//=========================================================================================

/// Which side of a care relationship a user is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// The monitored user; answers surveys.
    Caretaker,
    /// The monitoring user; authors surveys and receives results.
    Caregiver,
}

impl Role {
    pub fn from_is_caregiver(is_caregiver: bool) -> Self {
        if is_caregiver {
            Role::Caregiver
        } else {
            Role::Caretaker
        }
    }

    pub fn counterpart(self) -> Self {
        match self {
            Role::Caretaker => Role::Caregiver,
            Role::Caregiver => Role::Caretaker,
        }
    }

    /// Name of the profile array holding the accepted peers of a user viewing as `self`.
    ///
    /// A caretaker's peers are its caregivers and vice versa.
    pub fn peers_field(self) -> &'static str {
        match self {
            Role::Caretaker => "caregiversID",
            Role::Caregiver => "caretakersID",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Caretaker => "caretaker",
            Role::Caregiver => "caregiver",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "caretaker" => Some(Role::Caretaker),
            "caregiver" => Some(Role::Caregiver),
            _ => None,
        }
    }
}

//=========================================================================================
// Profiles
//=========================================================================================

/// One per registered user.
///
/// `caretakers_id` and `caregivers_id` only ever hold *accepted* relationships.
#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    pub age: i64,
    pub sex: String,
    pub phone_number: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub is_caregiver: bool,
    pub caretakers_id: Vec<String>,
    pub caregivers_id: Vec<String>,
}

impl UserProfile {
    pub fn role(&self) -> Role {
        Role::from_is_caregiver(self.is_caregiver)
    }

    /// The accepted peers as seen from `role`.
    pub fn peers(&self, role: Role) -> &[String] {
        match role {
            Role::Caretaker => &self.caregivers_id,
            Role::Caregiver => &self.caretakers_id,
        }
    }

    pub fn is_linked_with(&self, peer_id: &str) -> bool {
        self.caretakers_id.iter().any(|id| id == peer_id)
            || self.caregivers_id.iter().any(|id| id == peer_id)
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Discoverability record used for email -> user id lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct UserPublicProfile {
    pub user_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,
}

impl From<&UserProfile> for UserPublicProfile {
    fn from(profile: &UserProfile) -> Self {
        Self {
            user_id: profile.user_id.clone(),
            email: profile.email.clone(),
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
            created_at: profile.created_at,
        }
    }
}

/// Personal details supplied at registration.
#[derive(Debug, Clone, Default)]
pub struct ProfileDraft {
    pub first_name: String,
    pub last_name: String,
    pub age: i64,
    pub sex: String,
    pub phone_number: String,
    pub is_caregiver: bool,
}

//=========================================================================================
// Invitations
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Rejected,
}

impl InvitationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Accepted => "accepted",
            InvitationStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(InvitationStatus::Pending),
            "accepted" => Some(InvitationStatus::Accepted),
            "rejected" => Some(InvitationStatus::Rejected),
            _ => None,
        }
    }
}

/// A proposal to form a caregiver <-> caretaker relationship.
#[derive(Debug, Clone, PartialEq)]
pub struct CaregiverInvitation {
    pub id: String,
    pub from_user_id: String,
    pub to_user_id: String,
    pub to_user_email: String,
    pub from_user_name: String,
    pub status: InvitationStatus,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    /// Bumped on every status transition; transitions are compare-and-set on it.
    pub version: i64,
}

impl CaregiverInvitation {
    /// The party on the other side of this invitation from `user_id`'s perspective.
    pub fn peer_of(&self, user_id: &str) -> &str {
        if self.from_user_id == user_id {
            &self.to_user_id
        } else {
            &self.from_user_id
        }
    }

    pub fn involves(&self, a: &str, b: &str) -> bool {
        (self.from_user_id == a && self.to_user_id == b)
            || (self.from_user_id == b && self.to_user_id == a)
    }
}

/// Derived, non-persisted display projection of one peer.
#[derive(Debug, Clone, PartialEq)]
pub struct CaregiverInfo {
    pub user_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub status: InvitationStatus,
    pub added_at: DateTime<Utc>,
    pub is_sent_by_me: bool,
    /// The invitation behind a pending/rejected entry; `None` for accepted peers.
    pub invitation_id: Option<String>,
}

//=========================================================================================
// Surveys
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionKind {
    Closed,
    Open,
}

impl QuestionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionKind::Closed => "closed",
            QuestionKind::Open => "open",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "closed" => Some(QuestionKind::Closed),
            "open" => Some(QuestionKind::Open),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuestionOption {
    pub text: String,
    pub points: f64,
    pub order: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    pub id: String,
    pub caretaker_id: String,
    pub caregiver_id: String,
    pub text: String,
    pub description: String,
    pub kind: QuestionKind,
    pub options: Vec<QuestionOption>,
    pub is_active: bool,
    pub order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Question {
    /// Best achievable score for this question. Open questions score nothing.
    pub fn max_points(&self) -> f64 {
        match self.kind {
            QuestionKind::Open => 0.0,
            QuestionKind::Closed => self
                .options
                .iter()
                .map(|o| o.points)
                .reduce(f64::max)
                .unwrap_or(0.0),
        }
    }

    pub fn option(&self, text: &str) -> Option<&QuestionOption> {
        self.options.iter().find(|o| o.text == text)
    }
}

/// All questions authored for one caretaker, stored as a single document.
#[derive(Debug, Clone, PartialEq)]
pub struct CareTakerQuestions {
    pub caretaker_id: String,
    pub questions: Vec<Question>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuestionAnswer {
    pub id: String,
    pub question_id: String,
    pub caretaker_id: String,
    pub caregiver_id: String,
    pub selected_option: String,
    pub selected_option_points: f64,
    pub open_answer: String,
    pub answered_at: DateTime<Utc>,
}

/// One completed, immutably scored pass through a caretaker's active questions.
#[derive(Debug, Clone, PartialEq)]
pub struct TestSession {
    pub id: String,
    pub caretaker_id: String,
    pub caregiver_id: String,
    pub total_points: f64,
    pub max_points: f64,
    pub percentage_score: f64,
    pub completed_at: DateTime<Utc>,
    pub answers: Vec<QuestionAnswer>,
}
