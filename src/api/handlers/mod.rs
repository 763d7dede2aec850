//! REST endpoint handlers organized by resource.

pub mod pipeline;
pub mod records;
pub mod rewards;
pub mod system;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(rewards::routes())
        .merge(records::routes())
        .merge(pipeline::routes())
}
