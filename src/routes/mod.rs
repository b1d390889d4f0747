pub mod health;
pub mod internal;

use axum::Router;

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest("/internal", internal::router())
        .with_state(state)
}
