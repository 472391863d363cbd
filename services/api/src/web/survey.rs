//! services/api/src/web/survey.rs
//!
//! Question authoring and survey session endpoints, scoped to one caretaker.

use crate::error::ApiError;
use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use carelink_core::{
    OptionDraft, Question, QuestionAnswer, QuestionDraft, QuestionKind, SessionContext,
    TestSession,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

//=========================================================================================
// Payloads
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct OptionRequest {
    pub text: String,
    pub points: f64,
}

/// Creates a question when `id` is absent, otherwise replaces it.
#[derive(Deserialize, ToSchema)]
pub struct QuestionRequest {
    pub id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub description: String,
    /// `closed` or `open`.
    pub kind: String,
    #[serde(default)]
    pub options: Vec<OptionRequest>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl QuestionRequest {
    fn into_draft(self) -> Result<QuestionDraft, ApiError> {
        let kind = QuestionKind::parse(&self.kind)
            .ok_or_else(|| ApiError::BadRequest(format!("unknown question kind '{}'", self.kind)))?;
        Ok(QuestionDraft {
            id: self.id,
            text: self.text,
            description: self.description,
            kind,
            options: self
                .options
                .into_iter()
                .map(|o| OptionDraft {
                    text: o.text,
                    points: o.points,
                })
                .collect(),
            is_active: self.is_active,
        })
    }
}

#[derive(Serialize, ToSchema)]
pub struct OptionResponse {
    pub text: String,
    pub points: f64,
    pub order: i64,
}

#[derive(Serialize, ToSchema)]
pub struct QuestionResponse {
    pub id: String,
    pub caretaker_id: String,
    pub caregiver_id: String,
    pub text: String,
    pub description: String,
    pub kind: String,
    pub options: Vec<OptionResponse>,
    pub max_points: f64,
    pub is_active: bool,
    pub order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Question> for QuestionResponse {
    fn from(q: Question) -> Self {
        Self {
            max_points: q.max_points(),
            kind: q.kind.as_str().to_string(),
            id: q.id,
            caretaker_id: q.caretaker_id,
            caregiver_id: q.caregiver_id,
            text: q.text,
            description: q.description,
            options: q
                .options
                .into_iter()
                .map(|o| OptionResponse {
                    text: o.text,
                    points: o.points,
                    order: o.order,
                })
                .collect(),
            is_active: q.is_active,
            order: q.order,
            created_at: q.created_at,
            updated_at: q.updated_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct AnswerRequest {
    pub question_id: String,
    /// The chosen option's text for closed questions, free text for open ones.
    pub response: String,
}

#[derive(Deserialize, ToSchema)]
pub struct SubmitSessionRequest {
    pub answers: Vec<AnswerRequest>,
}

#[derive(Serialize, ToSchema)]
pub struct AnswerResponse {
    pub id: String,
    pub question_id: String,
    pub caregiver_id: String,
    pub selected_option: String,
    pub selected_option_points: f64,
    pub open_answer: String,
    pub answered_at: DateTime<Utc>,
}

impl From<QuestionAnswer> for AnswerResponse {
    fn from(a: QuestionAnswer) -> Self {
        Self {
            id: a.id,
            question_id: a.question_id,
            caregiver_id: a.caregiver_id,
            selected_option: a.selected_option,
            selected_option_points: a.selected_option_points,
            open_answer: a.open_answer,
            answered_at: a.answered_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct SessionResponse {
    pub id: String,
    pub caretaker_id: String,
    pub caregiver_id: String,
    pub total_points: f64,
    pub max_points: f64,
    pub percentage_score: f64,
    pub completed_at: DateTime<Utc>,
    pub answers: Vec<AnswerResponse>,
}

impl From<TestSession> for SessionResponse {
    fn from(s: TestSession) -> Self {
        Self {
            id: s.id,
            caretaker_id: s.caretaker_id,
            caregiver_id: s.caregiver_id,
            total_points: s.total_points,
            max_points: s.max_points,
            percentage_score: s.percentage_score,
            completed_at: s.completed_at,
            answers: s.answers.into_iter().map(AnswerResponse::from).collect(),
        }
    }
}

fn questions_json(questions: Vec<Question>) -> Json<Vec<QuestionResponse>> {
    Json(questions.into_iter().map(QuestionResponse::from).collect())
}

//=========================================================================================
// Question Handlers
//=========================================================================================

/// Every question authored for a caretaker, active or not.
#[utoipa::path(
    get,
    path = "/caretakers/{id}/questions",
    params(("id" = String, Path, description = "Caretaker user id")),
    responses(
        (status = 200, description = "Questions by order", body = [QuestionResponse]),
        (status = 403, description = "Caller is neither the caretaker nor a linked caregiver")
    )
)]
pub async fn list_questions_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<SessionContext>,
    Path(caretaker_id): Path<String>,
) -> Result<Json<Vec<QuestionResponse>>, ApiError> {
    let questions = state.surveys.list_questions(&ctx, &caretaker_id).await?;
    Ok(questions_json(questions))
}

/// The questions a survey pass would ask right now.
#[utoipa::path(
    get,
    path = "/caretakers/{id}/questions/active",
    params(("id" = String, Path, description = "Caretaker user id")),
    responses(
        (status = 200, description = "Active questions by order", body = [QuestionResponse]),
        (status = 403, description = "Caller is neither the caretaker nor a linked caregiver")
    )
)]
pub async fn active_questions_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<SessionContext>,
    Path(caretaker_id): Path<String>,
) -> Result<Json<Vec<QuestionResponse>>, ApiError> {
    let questions = state
        .surveys
        .load_active_questions(&ctx, &caretaker_id)
        .await?;
    Ok(questions_json(questions))
}

/// Add a question, or edit one when the body carries its id.
#[utoipa::path(
    post,
    path = "/caretakers/{id}/questions",
    request_body = QuestionRequest,
    params(("id" = String, Path, description = "Caretaker user id")),
    responses(
        (status = 200, description = "The saved question", body = QuestionResponse),
        (status = 400, description = "Missing text or options"),
        (status = 403, description = "Caller is not a caregiver of this caretaker"),
        (status = 404, description = "Edited question does not exist")
    )
)]
pub async fn save_question_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<SessionContext>,
    Path(caretaker_id): Path<String>,
    Json(req): Json<QuestionRequest>,
) -> Result<Json<QuestionResponse>, ApiError> {
    let draft = req.into_draft()?;
    let question = state
        .surveys
        .add_or_edit_question(&ctx, &caretaker_id, draft)
        .await?;
    Ok(Json(question.into()))
}

#[utoipa::path(
    delete,
    path = "/caretakers/{id}/questions/{question_id}",
    params(
        ("id" = String, Path, description = "Caretaker user id"),
        ("question_id" = String, Path, description = "Question id")
    ),
    responses(
        (status = 204, description = "Question removed"),
        (status = 403, description = "Caller is not a caregiver of this caretaker"),
        (status = 404, description = "Question not found")
    )
)]
pub async fn remove_question_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<SessionContext>,
    Path((caretaker_id, question_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state
        .surveys
        .remove_question(&ctx, &caretaker_id, &question_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Session Handlers
//=========================================================================================

/// Answer every active question once and store the scored session.
#[utoipa::path(
    post,
    path = "/caretakers/{id}/sessions",
    request_body = SubmitSessionRequest,
    params(("id" = String, Path, description = "Caretaker user id")),
    responses(
        (status = 201, description = "Scored session", body = SessionResponse),
        (status = 400, description = "Unknown option or no active questions"),
        (status = 403, description = "Only the caretaker submits their survey"),
        (status = 422, description = "Not every active question was answered")
    )
)]
pub async fn submit_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<SessionContext>,
    Path(caretaker_id): Path<String>,
    Json(req): Json<SubmitSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut draft = state.surveys.start_survey(&ctx, &caretaker_id).await?;
    for answer in &req.answers {
        draft.record_answer(&answer.question_id, &answer.response)?;
    }
    let session = state.surveys.submit_session(&ctx, &draft).await?;
    Ok((StatusCode::CREATED, Json(SessionResponse::from(session))))
}

/// Past sessions, newest first, with their answers.
#[utoipa::path(
    get,
    path = "/caretakers/{id}/sessions",
    params(("id" = String, Path, description = "Caretaker user id")),
    responses(
        (status = 200, description = "Completed sessions", body = [SessionResponse]),
        (status = 403, description = "Caller is neither the caretaker nor a linked caregiver")
    )
)]
pub async fn list_sessions_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<SessionContext>,
    Path(caretaker_id): Path<String>,
) -> Result<Json<Vec<SessionResponse>>, ApiError> {
    let sessions = state.surveys.list_sessions(&ctx, &caretaker_id).await?;
    Ok(Json(sessions.into_iter().map(SessionResponse::from).collect()))
}
