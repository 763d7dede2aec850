//! Price oracle capability and fallback valuation.
//!
//! Callers never receive a fallback rate silently: [`PriceFeed`] returns
//! a [`Valuation`] that says whether the rate is live or degraded.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::PipelineError;

/// Symbol of the native asset.
pub const SOL: &str = "SOL";

/// Symbol of the valuation currency.
pub const USD: &str = "USD";

/// Conversion-rate source.
#[async_trait]
pub trait PriceOracle: Send + Sync + fmt::Debug {
    /// Units of `quote` per one unit of `base`.
    async fn get_rate(&self, base: &str, quote: &str) -> Result<f64, PipelineError>;
}

/// A rate together with its provenance.
#[derive(Debug, Clone, PartialEq)]
pub enum Valuation {
    /// Fresh oracle rate.
    Live {
        /// Oracle rate.
        rate: f64,
    },
    /// Configured fallback used because the oracle failed.
    Degraded {
        /// Fallback rate.
        rate: f64,
        /// Why the oracle rate was not used.
        reason: String,
    },
}

impl Valuation {
    /// The rate regardless of provenance.
    #[must_use]
    pub const fn rate(&self) -> f64 {
        match self {
            Self::Live { rate } | Self::Degraded { rate, .. } => *rate,
        }
    }

    /// `true` when the fallback rate was used.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

/// Oracle wrapper applying the configured SOL/USD fallback.
#[derive(Debug, Clone)]
pub struct PriceFeed {
    oracle: Arc<dyn PriceOracle>,
    fallback_sol_usd: f64,
}

impl PriceFeed {
    /// Creates a feed over `oracle` with the given fallback rate.
    #[must_use]
    pub fn new(oracle: Arc<dyn PriceOracle>, fallback_sol_usd: f64) -> Self {
        Self {
            oracle,
            fallback_sol_usd,
        }
    }

    /// Current SOL/USD valuation. Never fails; degraded results are logged.
    pub async fn sol_usd(&self) -> Valuation {
        let reason = match self.oracle.get_rate(SOL, USD).await {
            Ok(rate) if rate.is_finite() && rate > 0.0 => return Valuation::Live { rate },
            Ok(rate) => format!("oracle returned unusable rate {rate}"),
            Err(e) => e.to_string(),
        };
        tracing::warn!(
            fallback = self.fallback_sol_usd,
            %reason,
            "price oracle degraded, using fallback SOL/USD rate"
        );
        Valuation::Degraded {
            rate: self.fallback_sol_usd,
            reason,
        }
    }
}
