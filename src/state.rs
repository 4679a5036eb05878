use axum::extract::FromRef;
use std::sync::Arc;

use crate::auth::TokenService;
use crate::database::Store;
use crate::middleware::Gate;
use crate::services::Services;
use crate::storage::ImageStorage;

/// Shared by every handler; cloning is cheap
#[derive(Clone)]
pub struct AppState {
    pub gate: Gate,
    pub services: Services,
    pub store: Store,
}

impl AppState {
    pub fn new(store: Store, storage: Arc<dyn ImageStorage>, tokens: TokenService) -> Self {
        Self {
            gate: Gate::new(tokens, store.clone()),
            services: Services::new(store.clone(), storage),
            store,
        }
    }
}

impl FromRef<AppState> for Gate {
    fn from_ref(state: &AppState) -> Self {
        state.gate.clone()
    }
}
