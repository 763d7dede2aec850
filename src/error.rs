//! Pipeline error taxonomy with HTTP status code mapping.
//!
//! [`PipelineError`] is the central error type. Each variant carries a
//! retry classification used by the orchestrator and scheduler, and maps
//! to a numeric code and HTTP status for the read API.

use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{Address, RecordId, TransitionError, TxRef};
use crate::persistence::StoreError;

/// Structured JSON error response body.
///
/// ```json
/// {
///   "error": {
///     "code": 4090,
///     "message": "a pipeline run is already in progress",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Errors produced by pipeline steps, the reconciler and the read API.
///
/// # Error Code Ranges
///
/// | Range     | Category                 | HTTP Status               |
/// |-----------|--------------------------|---------------------------|
/// | 1000–1999 | Expected outcomes / input | 400 / 422                |
/// | 2000–2999 | Records                  | 404 / 409                 |
/// | 3000–3999 | Internal / storage       | 500                       |
/// | 5000–5999 | External capabilities    | 502 / 504                 |
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The vault holds nothing claimable. Expected, not a fault.
    #[error("no rewards available to claim")]
    NoRewardsAvailable,

    /// Claimable amount is under the configured minimum. Expected abort.
    #[error("available {available} lamports is below threshold {threshold}")]
    BelowThreshold {
        /// Observed claimable lamports.
        available: u64,
        /// Configured minimum lamports.
        threshold: u64,
    },

    /// Ledger gateway read or submission failed. Retryable.
    #[error("ledger gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// Quote or swap-transaction service failed or returned garbage. Retryable.
    #[error("swap service error: {0}")]
    SwapService(String),

    /// The swap would fill or did fill outside the slippage tolerance.
    #[error("slippage tolerance exceeded: {0}")]
    SlippageExceeded(String),

    /// The ledger reports the transaction as failed.
    #[error("transaction {tx_ref} failed: {reason}")]
    TransactionFailed {
        /// Failed transaction.
        tx_ref: TxRef,
        /// Ledger-provided reason.
        reason: String,
    },

    /// Submitted but unconfirmed within the timeout. Outcome unknown.
    #[error("transaction {tx_ref} not confirmed within {waited_secs}s")]
    ConfirmationTimeout {
        /// Submitted transaction.
        tx_ref: TxRef,
        /// Seconds waited.
        waited_secs: u64,
    },

    /// The token account holds nothing to burn.
    #[error("nothing to burn in {account}")]
    NothingToBurn {
        /// Inspected token account.
        account: Address,
    },

    /// A stored document could not be decoded. Needs manual intervention.
    #[error("record store corruption in {collection}: {reason}")]
    RecordStoreCorruption {
        /// Affected collection.
        collection: String,
        /// Decoder message.
        reason: String,
        /// Where the corrupt document was copied, if it was.
        backup: Option<PathBuf>,
    },

    /// Record store I/O or database failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// A status transition was rejected.
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    /// Referenced record does not exist.
    #[error("record not found: {0}")]
    RecordNotFound(RecordId),

    /// Another pipeline run holds the run lock.
    #[error("a pipeline run is already in progress")]
    RunInProgress,

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Malformed API input.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Whether the next scheduled tick may simply try again.
    ///
    /// Confirmation timeouts are not retryable: the transaction may have
    /// landed and must be reconciled instead of resubmitted.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::GatewayUnavailable(_)
                | Self::SwapService(_)
                | Self::SlippageExceeded(_)
                | Self::Persistence(_)
        )
    }

    /// Expected non-error outcomes that abort a run without side effects.
    #[must_use]
    pub const fn is_expected_abort(&self) -> bool {
        matches!(self, Self::NoRewardsAvailable | Self::BelowThreshold { .. })
    }

    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::NoRewardsAvailable => 1001,
            Self::BelowThreshold { .. } => 1002,
            Self::InvalidRequest(_) => 1003,
            Self::NothingToBurn { .. } => 1004,
            Self::RecordNotFound(_) => 2001,
            Self::InvalidTransition(_) => 2002,
            Self::RunInProgress => 2003,
            Self::Internal(_) => 3000,
            Self::Persistence(_) => 3001,
            Self::RecordStoreCorruption { .. } => 3002,
            Self::Configuration(_) => 3003,
            Self::GatewayUnavailable(_) => 5001,
            Self::SwapService(_) => 5002,
            Self::SlippageExceeded(_) => 5003,
            Self::TransactionFailed { .. } => 5004,
            Self::ConfirmationTimeout { .. } => 5005,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::NoRewardsAvailable | Self::BelowThreshold { .. } | Self::NothingToBurn { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::RecordNotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidTransition(_) | Self::RunInProgress => StatusCode::CONFLICT,
            Self::Internal(_)
            | Self::Persistence(_)
            | Self::RecordStoreCorruption { .. }
            | Self::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::GatewayUnavailable(_)
            | Self::SwapService(_)
            | Self::SlippageExceeded(_)
            | Self::TransactionFailed { .. } => StatusCode::BAD_GATEWAY,
            Self::ConfirmationTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { id, .. } => Self::RecordNotFound(id),
            StoreError::Corrupted {
                collection,
                reason,
                backup,
            } => Self::RecordStoreCorruption {
                collection: collection.to_string(),
                reason,
                backup,
            },
            StoreError::InvalidTransition(inner) => Self::InvalidTransition(inner),
            other => Self::Persistence(other.to_string()),
        }
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let details = match &self {
            Self::RecordStoreCorruption {
                backup: Some(path), ..
            } => Some(format!("backup written to {}", path.display())),
            _ => None,
        };
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
