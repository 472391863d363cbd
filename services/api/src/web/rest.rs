//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the invitation and relationship endpoints and the
//! master definition for the OpenAPI specification.

use crate::error::ApiError;
use crate::web::{auth, state::AppState, survey};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use carelink_core::{
    CaregiverInfo, CaregiverInvitation, Removal, RepairReport, Role, SessionContext,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use utoipa::{IntoParams, OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::signup_handler,
        auth::login_handler,
        auth::logout_handler,
        auth::profile_handler,
        auth::delete_account_handler,
        send_invitation_handler,
        accept_invitation_handler,
        reject_invitation_handler,
        delete_invitation_handler,
        list_relationships_handler,
        remove_relationship_handler,
        repair_relationships_handler,
        survey::list_questions_handler,
        survey::active_questions_handler,
        survey::save_question_handler,
        survey::remove_question_handler,
        survey::submit_session_handler,
        survey::list_sessions_handler,
    ),
    components(
        schemas(
            auth::SignupRequest, auth::LoginRequest, auth::AuthResponse, auth::ProfileResponse,
            SendInvitationRequest, AcceptInvitationRequest, InvitationResponse,
            RelationshipEntry, RemovalResponse, RepairResponse,
            survey::QuestionRequest, survey::OptionRequest, survey::QuestionResponse,
            survey::OptionResponse, survey::SubmitSessionRequest, survey::AnswerRequest,
            survey::SessionResponse, survey::AnswerResponse,
        )
    ),
    tags(
        (name = "Carelink API", description = "Caregiver/caretaker relationships and survey scoring.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SendInvitationRequest {
    pub to_email: String,
}

#[derive(Deserialize, ToSchema, Default)]
pub struct AcceptInvitationRequest {
    /// Defaults to the invitation's sender.
    pub counterparty_id: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct InvitationResponse {
    pub id: String,
    pub from_user_id: String,
    pub to_user_id: String,
    pub to_user_email: String,
    pub from_user_name: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl From<CaregiverInvitation> for InvitationResponse {
    fn from(i: CaregiverInvitation) -> Self {
        Self {
            status: i.status.as_str().to_string(),
            id: i.id,
            from_user_id: i.from_user_id,
            to_user_id: i.to_user_id,
            to_user_email: i.to_user_email,
            from_user_name: i.from_user_name,
            created_at: i.created_at,
            responded_at: i.responded_at,
            version: i.version,
        }
    }
}

/// One row of the relationship view.
#[derive(Serialize, ToSchema)]
pub struct RelationshipEntry {
    pub user_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub status: String,
    pub added_at: DateTime<Utc>,
    pub is_sent_by_me: bool,
    pub invitation_id: Option<String>,
}

impl From<CaregiverInfo> for RelationshipEntry {
    fn from(c: CaregiverInfo) -> Self {
        Self {
            status: c.status.as_str().to_string(),
            user_id: c.user_id,
            email: c.email,
            first_name: c.first_name,
            last_name: c.last_name,
            added_at: c.added_at,
            is_sent_by_me: c.is_sent_by_me,
            invitation_id: c.invitation_id,
        }
    }
}

#[derive(Deserialize, IntoParams)]
pub struct RelationshipQuery {
    /// `caretaker` or `caregiver`; defaults to the caller's own role.
    pub role: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct RemovalResponse {
    /// `relationship` or `invitation`.
    pub removed: String,
    pub peer_id: String,
    pub invitation_id: Option<String>,
    pub invitation_status: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct RepairResponse {
    pub restored: Vec<String>,
    pub dropped: Vec<String>,
}

impl From<RepairReport> for RepairResponse {
    fn from(r: RepairReport) -> Self {
        Self {
            restored: r.restored,
            dropped: r.dropped,
        }
    }
}

//=========================================================================================
// Invitation Handlers
//=========================================================================================

/// Invite the user registered under `to_email`.
#[utoipa::path(
    post,
    path = "/invitations",
    request_body = SendInvitationRequest,
    responses(
        (status = 201, description = "Invitation created", body = InvitationResponse),
        (status = 400, description = "Invalid email, self-invitation, or duplicate"),
        (status = 404, description = "No user with that email")
    )
)]
pub async fn send_invitation_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<SessionContext>,
    Json(req): Json<SendInvitationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let invitation = state
        .relationships
        .send_invitation(&ctx, &req.to_email)
        .await?;
    Ok((StatusCode::CREATED, Json(InvitationResponse::from(invitation))))
}

/// Accept a pending invitation addressed to the caller.
#[utoipa::path(
    post,
    path = "/invitations/{id}/accept",
    request_body = AcceptInvitationRequest,
    params(("id" = String, Path, description = "Invitation id")),
    responses(
        (status = 200, description = "Invitation accepted, both profiles linked", body = InvitationResponse),
        (status = 403, description = "Caller is not the recipient"),
        (status = 404, description = "Invitation not found"),
        (status = 409, description = "Invitation no longer pending or changed concurrently"),
        (status = 500, description = "Only some of the writes were applied")
    )
)]
pub async fn accept_invitation_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<SessionContext>,
    Path(invitation_id): Path<String>,
    body: Option<Json<AcceptInvitationRequest>>,
) -> Result<Json<InvitationResponse>, ApiError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let counterparty_id = match req.counterparty_id {
        Some(id) => id,
        None => {
            state
                .relationships
                .invitations()
                .get(&invitation_id)
                .await?
                .from_user_id
        }
    };
    let accepted = state
        .relationships
        .accept_invitation(&ctx, &invitation_id, &counterparty_id)
        .await?;
    Ok(Json(accepted.into()))
}

/// Reject a pending invitation addressed to the caller.
#[utoipa::path(
    post,
    path = "/invitations/{id}/reject",
    params(("id" = String, Path, description = "Invitation id")),
    responses(
        (status = 200, description = "Invitation rejected", body = InvitationResponse),
        (status = 403, description = "Caller is not the recipient"),
        (status = 404, description = "Invitation not found"),
        (status = 409, description = "Invitation no longer pending or changed concurrently")
    )
)]
pub async fn reject_invitation_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<SessionContext>,
    Path(invitation_id): Path<String>,
) -> Result<Json<InvitationResponse>, ApiError> {
    let rejected = state
        .relationships
        .reject_invitation(&ctx, &invitation_id)
        .await?;
    Ok(Json(rejected.into()))
}

/// Withdraw a pending invitation or clean up a rejected one.
#[utoipa::path(
    delete,
    path = "/invitations/{id}",
    params(("id" = String, Path, description = "Invitation id")),
    responses(
        (status = 204, description = "Invitation deleted"),
        (status = 400, description = "Accepted invitations go through relationship removal"),
        (status = 403, description = "Caller is not a party to the invitation"),
        (status = 404, description = "Invitation not found")
    )
)]
pub async fn delete_invitation_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<SessionContext>,
    Path(invitation_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .relationships
        .delete_invitation(&ctx, &invitation_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Relationship Handlers
//=========================================================================================

/// The caller's deduplicated list of peers and invitation threads.
#[utoipa::path(
    get,
    path = "/relationships",
    params(RelationshipQuery),
    responses(
        (status = 200, description = "Relationship view", body = [RelationshipEntry]),
        (status = 400, description = "Unknown role")
    )
)]
pub async fn list_relationships_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<SessionContext>,
    Query(query): Query<RelationshipQuery>,
) -> Result<Json<Vec<RelationshipEntry>>, ApiError> {
    if state.config.repair_on_load {
        match state.relationships.repair_relationships(&ctx).await {
            Ok(report) if !report.is_clean() => {
                warn!(user_id = %ctx.user_id, ?report, "relationship arrays repaired on load");
            }
            Ok(_) => {}
            Err(e) => warn!(user_id = %ctx.user_id, "repair on load failed: {}", e),
        }
    }

    let role = match query.role.as_deref() {
        Some(raw) => Role::parse(raw)
            .ok_or_else(|| ApiError::BadRequest(format!("unknown role '{}'", raw)))?,
        None => state.accounts.profile(&ctx).await?.role(),
    };
    let view = state
        .relationships
        .build_relationship_view(&ctx, role)
        .await?;
    Ok(Json(view.into_iter().map(RelationshipEntry::from).collect()))
}

/// Remove the relationship with a peer, or the invitation thread if there is none.
#[utoipa::path(
    delete,
    path = "/relationships/{peer_id}",
    params(("peer_id" = String, Path, description = "The other party's user id")),
    responses(
        (status = 200, description = "What was removed", body = RemovalResponse),
        (status = 404, description = "Nothing connects the caller with this peer"),
        (status = 500, description = "Only some of the writes were applied")
    )
)]
pub async fn remove_relationship_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<SessionContext>,
    Path(peer_id): Path<String>,
) -> Result<Json<RemovalResponse>, ApiError> {
    let removal = state
        .relationships
        .remove_relationship_or_invitation(&ctx, &peer_id)
        .await?;
    let response = match removal {
        Removal::Relationship { peer_id } => RemovalResponse {
            removed: "relationship".to_string(),
            peer_id,
            invitation_id: None,
            invitation_status: None,
        },
        Removal::Invitation {
            invitation_id,
            status,
        } => RemovalResponse {
            removed: "invitation".to_string(),
            peer_id,
            invitation_id: Some(invitation_id),
            invitation_status: Some(status.as_str().to_string()),
        },
    };
    Ok(Json(response))
}

/// Bring both sides of every link of the caller back in agreement.
#[utoipa::path(
    post,
    path = "/relationships/repair",
    responses(
        (status = 200, description = "What was restored or dropped", body = RepairResponse)
    )
)]
pub async fn repair_relationships_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<SessionContext>,
) -> Result<Json<RepairResponse>, ApiError> {
    let report = state.relationships.repair_relationships(&ctx).await?;
    Ok(Json(report.into()))
}
