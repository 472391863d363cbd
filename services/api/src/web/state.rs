//! services/api/src/web/state.rs
//!
//! Defines the application state shared by every request handler.

use crate::config::Config;
use carelink_core::ports::{DocumentStore, IdentityGateway};
use carelink_core::{AccountService, RelationshipEngine, SurveyEngine};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub accounts: AccountService,
    pub relationships: RelationshipEngine,
    pub surveys: SurveyEngine,
}

impl AppState {
    /// Wires the core services onto one store and identity provider.
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityGateway>,
    ) -> Self {
        Self {
            config,
            accounts: AccountService::new(store.clone(), identity),
            relationships: RelationshipEngine::new(store.clone()),
            surveys: SurveyEngine::new(store),
        }
    }
}
