//! crates/carelink_core/src/codec.rs
//!
//! Conversions between the pure domain structs and their typed-field documents.
//! Field names follow the stored documents (camelCase, `caretakersID`, ...).

use crate::domain::{
    CareTakerQuestions, CaregiverInvitation, InvitationStatus, Question, QuestionAnswer,
    QuestionKind, QuestionOption, TestSession, UserProfile, UserPublicProfile,
};
use crate::fields::{fields, FieldReader, FieldValue, Fields};
use crate::ports::{DocumentStore, PortError, PortResult};

pub const USERS: &str = "users";
pub const PUBLIC_PROFILES: &str = "publicProfiles";
pub const INVITATIONS: &str = "caregiverInvitations";
pub const CARETAKER_QUESTIONS: &str = "caretakerQuestions";
pub const ANSWERS: &str = "questionAnswers";
pub const TEST_SESSIONS: &str = "testSessions";

/// A domain type persisted as one document.
pub trait StoredDocument: Sized {
    const COLLECTION: &'static str;

    fn document_id(&self) -> &str;
    fn to_fields(&self) -> Fields;
    fn from_fields(id: &str, fields: &Fields) -> PortResult<Self>;
}

/// Writes `doc` under its own collection and id, replacing any previous version.
pub async fn save<T: StoredDocument>(store: &dyn DocumentStore, doc: &T) -> PortResult<()> {
    store
        .upsert_document(T::COLLECTION, doc.document_id(), doc.to_fields())
        .await
}

impl StoredDocument for UserProfile {
    const COLLECTION: &'static str = USERS;

    fn document_id(&self) -> &str {
        &self.user_id
    }

    fn to_fields(&self) -> Fields {
        fields([
            ("firstName", self.first_name.clone().into()),
            ("lastName", self.last_name.clone().into()),
            ("age", self.age.into()),
            ("sex", self.sex.clone().into()),
            ("phoneNumber", self.phone_number.clone().into()),
            ("email", self.email.clone().into()),
            ("createdAt", self.created_at.into()),
            ("isCaregiver", self.is_caregiver.into()),
            ("caretakersID", self.caretakers_id.clone().into()),
            ("caregiversID", self.caregivers_id.clone().into()),
        ])
    }

    fn from_fields(id: &str, doc: &Fields) -> PortResult<Self> {
        let r = FieldReader::new("user profile", doc);
        Ok(Self {
            user_id: id.to_string(),
            first_name: r.string("firstName")?,
            last_name: r.string_or_empty("lastName")?,
            age: r.integer("age")?,
            sex: r.string_or_empty("sex")?,
            phone_number: r.string_or_empty("phoneNumber")?,
            email: r.string("email")?,
            created_at: r.timestamp("createdAt")?,
            is_caregiver: r.boolean("isCaregiver")?,
            caretakers_id: r.string_array("caretakersID")?,
            caregivers_id: r.string_array("caregiversID")?,
        })
    }
}

impl StoredDocument for UserPublicProfile {
    const COLLECTION: &'static str = PUBLIC_PROFILES;

    fn document_id(&self) -> &str {
        &self.user_id
    }

    fn to_fields(&self) -> Fields {
        fields([
            ("userId", self.user_id.clone().into()),
            ("email", self.email.clone().into()),
            ("firstName", self.first_name.clone().into()),
            ("lastName", self.last_name.clone().into()),
            ("createdAt", self.created_at.into()),
        ])
    }

    fn from_fields(id: &str, doc: &Fields) -> PortResult<Self> {
        let r = FieldReader::new("public profile", doc);
        Ok(Self {
            user_id: r.string("userId").unwrap_or_else(|_| id.to_string()),
            email: r.string("email")?,
            first_name: r.string_or_empty("firstName")?,
            last_name: r.string_or_empty("lastName")?,
            created_at: r.timestamp("createdAt")?,
        })
    }
}

impl StoredDocument for CaregiverInvitation {
    const COLLECTION: &'static str = INVITATIONS;

    fn document_id(&self) -> &str {
        &self.id
    }

    fn to_fields(&self) -> Fields {
        let mut doc = fields([
            ("fromUserId", self.from_user_id.clone().into()),
            ("toUserId", self.to_user_id.clone().into()),
            ("toUserEmail", self.to_user_email.clone().into()),
            ("fromUserName", self.from_user_name.clone().into()),
            ("status", self.status.as_str().into()),
            ("createdAt", self.created_at.into()),
            ("version", self.version.into()),
        ]);
        if let Some(responded_at) = self.responded_at {
            doc.insert("respondedAt".into(), responded_at.into());
        }
        doc
    }

    fn from_fields(id: &str, doc: &Fields) -> PortResult<Self> {
        let r = FieldReader::new("invitation", doc);
        let raw_status = r.string("status")?;
        let status = InvitationStatus::parse(&raw_status).ok_or_else(|| {
            PortError::Unexpected(format!("invitation {}: unknown status '{}'", id, raw_status))
        })?;
        Ok(Self {
            id: id.to_string(),
            from_user_id: r.string("fromUserId")?,
            to_user_id: r.string("toUserId")?,
            to_user_email: r.string_or_empty("toUserEmail")?,
            from_user_name: r.string_or_empty("fromUserName")?,
            status,
            created_at: r.timestamp("createdAt")?,
            responded_at: r.optional_timestamp("respondedAt")?,
            // Absent on records written before versioning.
            version: r.integer("version").unwrap_or(0),
        })
    }
}

fn option_to_fields(option: &QuestionOption) -> Fields {
    fields([
        ("text", option.text.clone().into()),
        ("points", option.points.into()),
        ("order", option.order.into()),
    ])
}

fn option_from_fields(doc: &Fields) -> PortResult<QuestionOption> {
    let r = FieldReader::new("question option", doc);
    Ok(QuestionOption {
        text: r.string("text")?,
        points: r.double("points")?,
        order: r.integer("order")?,
    })
}

fn question_to_fields(q: &Question) -> Fields {
    fields([
        ("id", q.id.clone().into()),
        ("caretakerId", q.caretaker_id.clone().into()),
        ("caregiverId", q.caregiver_id.clone().into()),
        ("text", q.text.clone().into()),
        ("description", q.description.clone().into()),
        ("type", q.kind.as_str().into()),
        (
            "options",
            FieldValue::ObjectArrayValue(q.options.iter().map(option_to_fields).collect()),
        ),
        ("isActive", q.is_active.into()),
        ("order", q.order.into()),
        ("createdAt", q.created_at.into()),
        ("updatedAt", q.updated_at.into()),
    ])
}

fn question_from_fields(doc: &Fields) -> PortResult<Question> {
    let r = FieldReader::new("question", doc);
    let raw_kind = r.string("type")?;
    let kind = QuestionKind::parse(&raw_kind)
        .ok_or_else(|| PortError::Unexpected(format!("question: unknown type '{}'", raw_kind)))?;
    let options = r
        .object_array("options")?
        .iter()
        .map(option_from_fields)
        .collect::<PortResult<Vec<_>>>()?;
    Ok(Question {
        id: r.string("id")?,
        caretaker_id: r.string("caretakerId")?,
        caregiver_id: r.string("caregiverId")?,
        text: r.string("text")?,
        description: r.string_or_empty("description")?,
        kind,
        options,
        is_active: r.boolean("isActive")?,
        order: r.integer("order")?,
        created_at: r.timestamp("createdAt")?,
        updated_at: r.timestamp("updatedAt")?,
    })
}

impl StoredDocument for CareTakerQuestions {
    const COLLECTION: &'static str = CARETAKER_QUESTIONS;

    fn document_id(&self) -> &str {
        &self.caretaker_id
    }

    fn to_fields(&self) -> Fields {
        fields([
            ("caretakerId", self.caretaker_id.clone().into()),
            (
                "questions",
                FieldValue::ObjectArrayValue(self.questions.iter().map(question_to_fields).collect()),
            ),
            ("createdAt", self.created_at.into()),
            ("updatedAt", self.updated_at.into()),
        ])
    }

    fn from_fields(id: &str, doc: &Fields) -> PortResult<Self> {
        let r = FieldReader::new("caretaker questions", doc);
        let questions = r
            .object_array("questions")?
            .iter()
            .map(question_from_fields)
            .collect::<PortResult<Vec<_>>>()?;
        Ok(Self {
            caretaker_id: id.to_string(),
            questions,
            created_at: r.timestamp("createdAt")?,
            updated_at: r.timestamp("updatedAt")?,
        })
    }
}

impl StoredDocument for QuestionAnswer {
    const COLLECTION: &'static str = ANSWERS;

    fn document_id(&self) -> &str {
        &self.id
    }

    fn to_fields(&self) -> Fields {
        fields([
            ("questionId", self.question_id.clone().into()),
            ("caretakerId", self.caretaker_id.clone().into()),
            ("caregiverId", self.caregiver_id.clone().into()),
            ("selectedOption", self.selected_option.clone().into()),
            ("selectedOptionPoints", self.selected_option_points.into()),
            ("openAnswer", self.open_answer.clone().into()),
            ("answeredAt", self.answered_at.into()),
        ])
    }

    fn from_fields(id: &str, doc: &Fields) -> PortResult<Self> {
        let r = FieldReader::new("answer", doc);
        Ok(Self {
            id: id.to_string(),
            question_id: r.string("questionId")?,
            caretaker_id: r.string("caretakerId")?,
            caregiver_id: r.string_or_empty("caregiverId")?,
            selected_option: r.string_or_empty("selectedOption")?,
            selected_option_points: r.double("selectedOptionPoints")?,
            open_answer: r.string_or_empty("openAnswer")?,
            answered_at: r.timestamp("answeredAt")?,
        })
    }
}

/// A stored session references its answers by id; `session.answers` is left empty
/// until the caller resolves `answer_ids`.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session: TestSession,
    pub answer_ids: Vec<String>,
}

impl StoredDocument for SessionRecord {
    const COLLECTION: &'static str = TEST_SESSIONS;

    fn document_id(&self) -> &str {
        &self.session.id
    }

    fn to_fields(&self) -> Fields {
        let s = &self.session;
        fields([
            ("caretakerId", s.caretaker_id.clone().into()),
            ("caregiverId", s.caregiver_id.clone().into()),
            ("totalPoints", s.total_points.into()),
            ("maxPoints", s.max_points.into()),
            ("percentageScore", s.percentage_score.into()),
            ("completedAt", s.completed_at.into()),
            ("answerIds", self.answer_ids.clone().into()),
        ])
    }

    fn from_fields(id: &str, doc: &Fields) -> PortResult<Self> {
        let r = FieldReader::new("test session", doc);
        Ok(Self {
            session: TestSession {
                id: id.to_string(),
                caretaker_id: r.string("caretakerId")?,
                caregiver_id: r.string_or_empty("caregiverId")?,
                total_points: r.double("totalPoints")?,
                max_points: r.double("maxPoints")?,
                percentage_score: r.double("percentageScore")?,
                completed_at: r.timestamp("completedAt")?,
                answers: Vec::new(),
            },
            answer_ids: r.string_array("answerIds")?,
        })
    }
}
