//! crates/carelink_core/src/survey.rs
//!
//! The Survey Scoring Engine: caregiver-authored questions, one answer per active
//! question, and immutable scored sessions.
//!
//! Only closed questions are scored. An open question adds 0 to both the achieved
//! and the maximum total.

use crate::codec::{save, SessionRecord, StoredDocument, ANSWERS, CARETAKER_QUESTIONS, TEST_SESSIONS};
use crate::domain::{
    CareTakerQuestions, Question, QuestionAnswer, QuestionKind, QuestionOption, Role, TestSession,
};
use crate::error::{CareError, CareResult};
use crate::fields::FieldValue;
use crate::ports::{DocumentStore, PortError};
use crate::profiles::ProfileRepository;
use crate::session::SessionContext;
use crate::validation::require_text;
use chrono::Utc;
use futures::future::try_join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

//=========================================================================================
// Scoring
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    pub total_points: f64,
    pub max_points: f64,
    pub percentage_score: f64,
}

/// Scores `answers` against `questions`. A zero maximum yields a 0% score.
pub fn score(questions: &[Question], answers: &[QuestionAnswer]) -> Score {
    let total_points: f64 = answers.iter().map(|a| a.selected_option_points).sum();
    let max_points: f64 = questions.iter().map(Question::max_points).sum();
    let percentage_score = if max_points > 0.0 {
        total_points / max_points * 100.0
    } else {
        0.0
    };
    Score {
        total_points,
        max_points,
        percentage_score,
    }
}

//=========================================================================================
// Answer collection
//=========================================================================================

/// One pass through a caretaker's active questions, collecting answers.
#[derive(Debug, Clone)]
pub struct SurveyDraft {
    caretaker_id: String,
    questions: Vec<Question>,
    answers: Vec<QuestionAnswer>,
}

impl SurveyDraft {
    pub fn new(caretaker_id: impl Into<String>, questions: Vec<Question>) -> Self {
        Self {
            caretaker_id: caretaker_id.into(),
            questions,
            answers: Vec::new(),
        }
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn answers(&self) -> &[QuestionAnswer] {
        &self.answers
    }

    /// Records the answer to `question_id`, replacing any earlier one.
    ///
    /// For a closed question `response` must be the text of one of its options and
    /// the option's points are copied over. For an open question `response` is the
    /// free-text answer and scores 0.
    pub fn record_answer(&mut self, question_id: &str, response: &str) -> CareResult<QuestionAnswer> {
        let question = self
            .questions
            .iter()
            .find(|q| q.id == question_id)
            .ok_or_else(|| CareError::NotFound(format!("question {}", question_id)))?;

        let (selected_option, selected_option_points, open_answer) = match question.kind {
            QuestionKind::Closed => {
                let option = question.option(response).ok_or_else(|| {
                    CareError::Validation(format!(
                        "'{}' is not an option of question {}",
                        response, question_id
                    ))
                })?;
                (option.text.clone(), option.points, String::new())
            }
            QuestionKind::Open => (String::new(), 0.0, response.to_string()),
        };

        let answer = QuestionAnswer {
            id: Uuid::new_v4().to_string(),
            question_id: question.id.clone(),
            caretaker_id: self.caretaker_id.clone(),
            caregiver_id: question.caregiver_id.clone(),
            selected_option,
            selected_option_points,
            open_answer,
            answered_at: Utc::now(),
        };
        self.answers.retain(|a| a.question_id != question_id);
        self.answers.push(answer.clone());
        Ok(answer)
    }

    /// Fails unless every question has exactly one answer.
    pub fn ensure_complete(&self) -> CareResult<()> {
        let known: HashSet<&str> = self.questions.iter().map(|q| q.id.as_str()).collect();
        let answered: HashSet<&str> = self
            .answers
            .iter()
            .map(|a| a.question_id.as_str())
            .filter(|id| known.contains(id))
            .collect();
        if self.answers.len() != self.questions.len() || answered.len() != known.len() {
            return Err(CareError::IncompleteSubmission {
                answered: answered.len(),
                expected: self.questions.len(),
            });
        }
        Ok(())
    }
}

//=========================================================================================
// Question authoring input
//=========================================================================================

#[derive(Debug, Clone)]
pub struct OptionDraft {
    pub text: String,
    pub points: f64,
}

/// A question to create (`id: None`) or update.
#[derive(Debug, Clone)]
pub struct QuestionDraft {
    pub id: Option<String>,
    pub text: String,
    pub description: String,
    pub kind: QuestionKind,
    pub options: Vec<OptionDraft>,
    pub is_active: bool,
}

impl QuestionDraft {
    fn validate(&self) -> CareResult<Vec<QuestionOption>> {
        require_text("question text", &self.text)?;
        if self.kind == QuestionKind::Open {
            return Ok(Vec::new());
        }
        if self.options.is_empty() {
            return Err(CareError::Validation(
                "a closed question needs at least one option".to_string(),
            ));
        }
        self.options
            .iter()
            .enumerate()
            .map(|(i, o)| {
                require_text("option text", &o.text)?;
                if !o.points.is_finite() {
                    return Err(CareError::Validation(format!(
                        "option '{}' has invalid points",
                        o.text
                    )));
                }
                Ok(QuestionOption {
                    text: o.text.trim().to_string(),
                    points: o.points,
                    order: i as i64,
                })
            })
            .collect()
    }
}

//=========================================================================================
// Engine
//=========================================================================================

#[derive(Clone)]
pub struct SurveyEngine {
    store: Arc<dyn DocumentStore>,
    profiles: ProfileRepository,
}

impl SurveyEngine {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            profiles: ProfileRepository::new(store.clone()),
            store,
        }
    }

    /// Fails unless the caller is a caregiver linked with `caretaker_id`.
    async fn ensure_author(&self, ctx: &SessionContext, caretaker_id: &str) -> CareResult<()> {
        let me = self.profiles.get(&ctx.user_id).await?;
        if me.role() == Role::Caregiver && me.peers(Role::Caregiver).iter().any(|id| id == caretaker_id) {
            return Ok(());
        }
        Err(CareError::Forbidden(format!(
            "you are not a caregiver of {}",
            caretaker_id
        )))
    }

    /// The caretaker themself or any of their linked caregivers.
    async fn ensure_reader(&self, ctx: &SessionContext, caretaker_id: &str) -> CareResult<()> {
        if ctx.user_id == caretaker_id {
            return Ok(());
        }
        self.ensure_author(ctx, caretaker_id).await
    }

    async fn load_batch(&self, caretaker_id: &str) -> CareResult<Option<CareTakerQuestions>> {
        match self.store.get_document(CARETAKER_QUESTIONS, caretaker_id).await {
            Ok(doc) => Ok(Some(CareTakerQuestions::from_fields(caretaker_id, &doc)?)),
            Err(PortError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save_batch(&self, batch: &CareTakerQuestions) -> CareResult<()> {
        save(self.store.as_ref(), batch).await?;
        Ok(())
    }

    /// All questions for a caretaker, active or not, by `order`.
    pub async fn list_questions(
        &self,
        ctx: &SessionContext,
        caretaker_id: &str,
    ) -> CareResult<Vec<Question>> {
        self.ensure_reader(ctx, caretaker_id).await?;
        let mut questions = self
            .load_batch(caretaker_id)
            .await?
            .map(|b| b.questions)
            .unwrap_or_default();
        questions.sort_by_key(|q| q.order);
        Ok(questions)
    }

    /// The active questions for a caretaker, by `order`. No questions yet is not an error.
    pub async fn load_active_questions(
        &self,
        ctx: &SessionContext,
        caretaker_id: &str,
    ) -> CareResult<Vec<Question>> {
        let mut questions = self.list_questions(ctx, caretaker_id).await?;
        questions.retain(|q| q.is_active);
        Ok(questions)
    }

    pub async fn add_or_edit_question(
        &self,
        ctx: &SessionContext,
        caretaker_id: &str,
        draft: QuestionDraft,
    ) -> CareResult<Question> {
        let options = draft.validate()?;
        self.ensure_author(ctx, caretaker_id).await?;

        let now = Utc::now();
        let mut batch = self.load_batch(caretaker_id).await?.unwrap_or_else(|| CareTakerQuestions {
            caretaker_id: caretaker_id.to_string(),
            questions: Vec::new(),
            created_at: now,
            updated_at: now,
        });

        let question = match &draft.id {
            Some(id) => {
                let existing = batch
                    .questions
                    .iter_mut()
                    .find(|q| &q.id == id)
                    .ok_or_else(|| CareError::NotFound(format!("question {}", id)))?;
                existing.caregiver_id = ctx.user_id.clone();
                existing.text = draft.text.trim().to_string();
                existing.description = draft.description.trim().to_string();
                existing.kind = draft.kind;
                existing.options = options;
                existing.is_active = draft.is_active;
                existing.updated_at = now;
                existing.clone()
            }
            None => {
                let question = Question {
                    id: Uuid::new_v4().to_string(),
                    caretaker_id: caretaker_id.to_string(),
                    caregiver_id: ctx.user_id.clone(),
                    text: draft.text.trim().to_string(),
                    description: draft.description.trim().to_string(),
                    kind: draft.kind,
                    options,
                    is_active: draft.is_active,
                    order: batch.questions.len() as i64,
                    created_at: now,
                    updated_at: now,
                };
                batch.questions.push(question.clone());
                question
            }
        };
        batch.updated_at = now;
        self.save_batch(&batch).await?;
        info!(caretaker_id, question_id = %question.id, author = %ctx.user_id, "question saved");
        Ok(question)
    }

    /// Deletes a question and closes the gap in `order`.
    pub async fn remove_question(
        &self,
        ctx: &SessionContext,
        caretaker_id: &str,
        question_id: &str,
    ) -> CareResult<()> {
        self.ensure_author(ctx, caretaker_id).await?;
        let mut batch = self
            .load_batch(caretaker_id)
            .await?
            .ok_or_else(|| CareError::NotFound(format!("question {}", question_id)))?;
        let before = batch.questions.len();
        batch.questions.retain(|q| q.id != question_id);
        if batch.questions.len() == before {
            return Err(CareError::NotFound(format!("question {}", question_id)));
        }
        batch.questions.sort_by_key(|q| q.order);
        for (i, q) in batch.questions.iter_mut().enumerate() {
            q.order = i as i64;
        }
        batch.updated_at = Utc::now();
        self.save_batch(&batch).await?;
        info!(caretaker_id, question_id, "question removed");
        Ok(())
    }

    /// Starts answering the caretaker's currently active questions.
    pub async fn start_survey(&self, ctx: &SessionContext, caretaker_id: &str) -> CareResult<SurveyDraft> {
        let questions = self.load_active_questions(ctx, caretaker_id).await?;
        Ok(SurveyDraft::new(caretaker_id, questions))
    }

    /// Scores a complete draft and stores its answers, then the session referencing them.
    pub async fn submit_session(&self, ctx: &SessionContext, draft: &SurveyDraft) -> CareResult<TestSession> {
        if ctx.user_id != draft.caretaker_id {
            return Err(CareError::Forbidden(
                "only the caretaker can submit their survey".to_string(),
            ));
        }
        if draft.questions.is_empty() {
            return Err(CareError::Validation(
                "there are no active questions to answer".to_string(),
            ));
        }
        draft.ensure_complete()?;

        let Score {
            total_points,
            max_points,
            percentage_score,
        } = score(&draft.questions, &draft.answers);

        for answer in &draft.answers {
            save(self.store.as_ref(), answer).await?;
        }

        let session = TestSession {
            id: Uuid::new_v4().to_string(),
            caretaker_id: draft.caretaker_id.clone(),
            caregiver_id: draft
                .questions
                .first()
                .map(|q| q.caregiver_id.clone())
                .unwrap_or_default(),
            total_points,
            max_points,
            percentage_score,
            completed_at: Utc::now(),
            answers: draft.answers.clone(),
        };
        let record = SessionRecord {
            answer_ids: session.answers.iter().map(|a| a.id.clone()).collect(),
            session: TestSession {
                answers: Vec::new(),
                ..session.clone()
            },
        };
        save(self.store.as_ref(), &record).await?;
        info!(session_id = %session.id, caretaker_id = %session.caretaker_id, percentage_score, "survey session stored");
        Ok(session)
    }

    /// Every stored session of a caretaker with answers resolved, newest first.
    pub async fn list_sessions(
        &self,
        ctx: &SessionContext,
        caretaker_id: &str,
    ) -> CareResult<Vec<TestSession>> {
        self.ensure_reader(ctx, caretaker_id).await?;
        let docs = self
            .store
            .query_equals(TEST_SESSIONS, "caretakerId", &FieldValue::from(caretaker_id))
            .await?;
        let records = docs
            .iter()
            .map(|(id, doc)| SessionRecord::from_fields(id, doc))
            .collect::<Result<Vec<_>, _>>()?;
        let mut sessions = try_join_all(records.into_iter().map(|r| self.resolve_answers(r))).await?;
        sessions.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        Ok(sessions)
    }

    async fn resolve_answers(&self, record: SessionRecord) -> CareResult<TestSession> {
        let mut session = record.session;
        for id in &record.answer_ids {
            let doc = self.store.get_document(ANSWERS, id).await?;
            session.answers.push(QuestionAnswer::from_fields(id, &doc)?);
        }
        Ok(session)
    }
}
