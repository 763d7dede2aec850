//! Data Transfer Objects for REST responses.
//!
//! All token and lamport amounts are serialized as JSON strings to
//! prevent precision loss on u64 values.

pub mod common_dto;
pub mod pipeline_dto;
pub mod record_dto;

pub use common_dto::*;
pub use pipeline_dto::*;
pub use record_dto::*;
