//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::config::RunMode;
use crate::domain::EventBus;
use crate::persistence::Records;
use crate::service::{Orchestrator, Reconciler};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Typed record store access for the read endpoints.
    pub records: Records,
    /// Manual pipeline runs.
    pub orchestrator: Arc<Orchestrator>,
    /// Manual reconciliation passes.
    pub reconciler: Arc<Reconciler>,
    /// Event bus for WebSocket subscriptions.
    pub event_bus: EventBus,
    /// Capability mode reported by the health endpoint.
    pub run_mode: RunMode,
}
