pub mod auth;
pub mod middleware;
pub mod rest;
pub mod state;
pub mod survey;

pub use middleware::require_auth;

use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use state::AppState;
use std::sync::Arc;

/// Builds every API route onto `state`. CORS and Swagger UI are layered on by the binary.
pub fn router(state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/signup", post(auth::signup_handler))
        .route("/auth/login", post(auth::login_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/auth/logout", post(auth::logout_handler))
        .route("/profile", get(auth::profile_handler))
        .route("/account", delete(auth::delete_account_handler))
        .route("/invitations", post(rest::send_invitation_handler))
        .route("/invitations/{id}", delete(rest::delete_invitation_handler))
        .route("/invitations/{id}/accept", post(rest::accept_invitation_handler))
        .route("/invitations/{id}/reject", post(rest::reject_invitation_handler))
        .route("/relationships", get(rest::list_relationships_handler))
        .route("/relationships/repair", post(rest::repair_relationships_handler))
        .route("/relationships/{peer_id}", delete(rest::remove_relationship_handler))
        .route(
            "/caretakers/{id}/questions",
            get(survey::list_questions_handler).post(survey::save_question_handler),
        )
        .route(
            "/caretakers/{id}/questions/active",
            get(survey::active_questions_handler),
        )
        .route(
            "/caretakers/{id}/questions/{question_id}",
            delete(survey::remove_question_handler),
        )
        .route(
            "/caretakers/{id}/sessions",
            get(survey::list_sessions_handler).post(survey::submit_session_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
