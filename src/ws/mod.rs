//! WebSocket layer: live pipeline event feed.
//!
//! The endpoint at `/ws` streams [`crate::domain::PipelineEvent`]s.
//! Clients choose which event types they receive with `subscribe` and
//! `unsubscribe` commands; a new connection receives nothing until it
//! subscribes.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod subscription;
