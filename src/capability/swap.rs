//! Swap aggregator capability.
//!
//! The aggregator prices a swap and returns a ready-to-sign transaction
//! for the accepted quote.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::Address;
use crate::error::PipelineError;

/// Aggregator price quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    /// Input mint.
    pub input_mint: Address,
    /// Output mint.
    pub output_mint: Address,
    /// Input amount in base units.
    pub in_amount: u64,
    /// Expected output in base units.
    pub expected_out: u64,
    /// Minimum acceptable output under the slippage tolerance.
    pub min_out: u64,
    /// Slippage tolerance the quote was built with.
    pub slippage_bps: u16,
    /// Raw aggregator payload, passed back when building the transaction.
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl Quote {
    /// Rejects quotes that do not describe the requested swap.
    ///
    /// A malformed quote is reported as a swap-service error, the same
    /// class as a network failure.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::SwapService`] describing the mismatch.
    pub fn validate(&self, requested_in: u64) -> Result<(), PipelineError> {
        if self.in_amount != requested_in {
            return Err(PipelineError::SwapService(format!(
                "quote input {} does not match requested {requested_in}",
                self.in_amount
            )));
        }
        if self.expected_out == 0 {
            return Err(PipelineError::SwapService(
                "quote has zero expected output".to_string(),
            ));
        }
        if self.min_out > self.expected_out {
            return Err(PipelineError::SwapService(format!(
                "quote minimum {} exceeds expected {}",
                self.min_out, self.expected_out
            )));
        }
        Ok(())
    }
}

/// Serialized transaction returned by the aggregator, still unsigned.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsignedTx {
    /// Wire encoding as produced by the aggregator.
    pub encoded: String,
    /// Block height after which the transaction expires.
    pub last_valid_block_height: Option<u64>,
}

impl fmt::Debug for UnsignedTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnsignedTx")
            .field("encoded_len", &self.encoded.len())
            .field("last_valid_block_height", &self.last_valid_block_height)
            .finish()
    }
}

/// Quote and transaction builder.
#[async_trait]
pub trait SwapService: Send + Sync + fmt::Debug {
    /// Prices swapping `amount` of `input` into `output`.
    async fn quote(
        &self,
        input: &Address,
        output: &Address,
        amount: u64,
        max_slippage_bps: u16,
    ) -> Result<Quote, PipelineError>;

    /// Builds the swap transaction for `quote`, paid and signed by `signer`.
    async fn build_swap_transaction(
        &self,
        quote: &Quote,
        signer: &Address,
    ) -> Result<UnsignedTx, PipelineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote() -> Quote {
        Quote {
            input_mint: Address::new("in"),
            output_mint: Address::new("out"),
            in_amount: 1_000,
            expected_out: 500,
            min_out: 490,
            slippage_bps: 200,
            raw: serde_json::Value::Null,
        }
    }

    #[test]
    fn well_formed_quote_passes() {
        assert!(quote().validate(1_000).is_ok());
    }

    #[test]
    fn malformed_quotes_are_service_errors() {
        assert!(matches!(
            quote().validate(999),
            Err(PipelineError::SwapService(_))
        ));
        let mut q = quote();
        q.expected_out = 0;
        q.min_out = 0;
        assert!(matches!(q.validate(1_000), Err(PipelineError::SwapService(_))));
        let mut q = quote();
        q.min_out = 600;
        assert!(q.validate(1_000).is_err());
    }
}
