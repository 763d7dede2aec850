//! # reward-burner
//!
//! Claims protocol rewards from a vault, swaps the proceeds into a target
//! token, burns the tokens, and records every step in a durable record
//! store so interrupted runs can be resumed without double-claiming,
//! double-spending or double-burning.
//!
//! ## Architecture
//!
//! ```text
//! Scheduler ─────────────┐        Clients (HTTP, WebSocket)
//!     │                  │            │
//!     ├── Orchestrator   │            ├── REST Handlers (api/)
//!     │     ├── VaultMonitor          ├── WS Handler (ws/)
//!     │     ├── ClaimExecutor         │
//!     │     ├── SwapExecutor          │
//!     │     └── BurnExecutor          │
//!     └── Reconciler                  │
//!            │                        │
//!            ├── Capabilities (capability/): ledger, swap service, oracle
//!            ├── EventBus (domain/) ──┘
//!            └── Records (persistence/): memory, file or PostgreSQL
//! ```
//!
//! The record store is the single source of truth. A reward record moves
//! `pending → claimed → bought → burned` (or to `failed`) and never moves
//! backwards; every transaction reference is persisted before the run
//! waits for its confirmation.

pub mod api;
pub mod app_state;
pub mod capability;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod service;
pub mod ws;
