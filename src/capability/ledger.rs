//! Ledger gateway capability.
//!
//! The core treats the ledger as an opaque service that reports
//! balances, accepts signed transactions and answers idempotent
//! confirmation lookups. Concrete RPC bindings implement
//! [`LedgerGateway`]; the simulated binding lives in
//! [`super::simulated`].

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::swap::UnsignedTx;
use crate::domain::{Address, SignerRef, TxRef};
use crate::error::PipelineError;

/// SPL token program.
pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

/// Associated token account program.
pub const ASSOCIATED_TOKEN_PROGRAM_ID: &str = "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL";

/// Seed prefix of the per-authority reward vault.
pub const VAULT_SEED: &[u8] = b"creator-vault";

/// Seed of the reward program's event authority.
pub const EVENT_AUTHORITY_SEED: &[u8] = b"__event_authority";

/// Transaction kinds the pipeline submits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    /// Reward vault withdrawal.
    Claim,
    /// Aggregator swap.
    Swap,
    /// Token burn.
    Burn,
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Claim => "claim",
            Self::Swap => "swap",
            Self::Burn => "burn",
        })
    }
}

/// A transaction the gateway should sign with the given signer and submit.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionRequest {
    /// Withdraw accumulated rewards from the vault to the authority.
    ClaimRewards {
        /// Reward program.
        program_id: Address,
        /// Vault owner and destination.
        authority: Address,
        /// Derived vault account.
        vault: Address,
        /// Derived event authority.
        event_authority: Address,
    },
    /// Pre-built aggregator swap.
    Swap {
        /// Unsigned transaction from the swap service.
        transaction: UnsignedTx,
    },
    /// Burn tokens held in `token_account`.
    Burn {
        /// Token mint.
        mint: Address,
        /// Holder's token account.
        token_account: Address,
        /// Token account owner.
        owner: Address,
        /// Base units to destroy.
        amount: u64,
    },
}

impl TransactionRequest {
    /// Kind of this request.
    #[must_use]
    pub const fn kind(&self) -> TxKind {
        match self {
            Self::ClaimRewards { .. } => TxKind::Claim,
            Self::Swap { .. } => TxKind::Swap,
            Self::Burn { .. } => TxKind::Burn,
        }
    }
}

/// Execution metadata of a confirmed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxDetails {
    /// Slot the transaction landed in.
    pub slot: u64,
    /// Fee paid in lamports.
    pub fee_lamports: u64,
}

/// Why the ledger rejected a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxFailure {
    /// Swap output fell below the quoted minimum.
    SlippageExceeded,
    /// Payer or token account could not cover the transfer.
    InsufficientFunds,
    /// Any other program error.
    Program(String),
}

impl fmt::Display for TxFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SlippageExceeded => f.write_str("slippage tolerance exceeded"),
            Self::InsufficientFunds => f.write_str("insufficient funds"),
            Self::Program(msg) => write!(f, "program error: {msg}"),
        }
    }
}

/// Result of a confirmation lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    /// The ledger has no record of the reference.
    NotFound,
    /// Seen but not yet at the required commitment.
    Processing,
    /// Confirmed successfully.
    Confirmed(TxDetails),
    /// Landed and failed.
    Failed(TxFailure),
}

impl TxStatus {
    /// `true` only for [`TxStatus::Confirmed`].
    #[must_use]
    pub const fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed(_))
    }
}

/// Ledger access used by every pipeline step.
///
/// Reads and confirmation lookups are idempotent and safe to retry.
/// `submit_transaction` is not: callers retry it only when no reference
/// came back.
#[async_trait]
pub trait LedgerGateway: Send + Sync + fmt::Debug {
    /// Balance of `account`: lamports for system accounts, base units for
    /// token accounts. Missing accounts report zero.
    async fn get_balance(&self, account: &Address) -> Result<u64, PipelineError>;

    /// Whether `account` exists on the ledger.
    async fn get_account_exists(&self, account: &Address) -> Result<bool, PipelineError>;

    /// Signs `tx` with `signer` and submits it.
    async fn submit_transaction(
        &self,
        tx: &TransactionRequest,
        signer: &SignerRef,
    ) -> Result<TxRef, PipelineError>;

    /// Looks up the status of a previously submitted transaction.
    async fn confirm(&self, tx_ref: &TxRef) -> Result<TxStatus, PipelineError>;

    /// Deterministically derives a program address. Pure.
    fn derive_program_address(&self, seeds: &[&[u8]], program_id: &Address) -> Address;
}

/// Accounts the claim instruction needs, derived from the authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimAccounts {
    /// Reward vault holding claimable lamports.
    pub vault: Address,
    /// Program event authority.
    pub event_authority: Address,
}

impl ClaimAccounts {
    /// Derives the claim accounts for `authority` under `program_id`.
    #[must_use]
    pub fn derive(gateway: &dyn LedgerGateway, program_id: &Address, authority: &Address) -> Self {
        let vault = gateway.derive_program_address(
            &[VAULT_SEED, authority.as_str().as_bytes()],
            program_id,
        );
        let event_authority = gateway.derive_program_address(&[EVENT_AUTHORITY_SEED], program_id);
        Self {
            vault,
            event_authority,
        }
    }
}

/// Associated token account of `owner` for `mint`.
#[must_use]
pub fn associated_token_account(
    gateway: &dyn LedgerGateway,
    owner: &Address,
    mint: &Address,
) -> Address {
    gateway.derive_program_address(
        &[
            owner.as_str().as_bytes(),
            TOKEN_PROGRAM_ID.as_bytes(),
            mint.as_str().as_bytes(),
        ],
        &Address::new(ASSOCIATED_TOKEN_PROGRAM_ID),
    )
}
