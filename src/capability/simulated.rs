//! In-process capability bindings.
//!
//! The simulated ledger keeps balances in memory and applies claim, swap
//! and burn effects at submission time. Confirmation behaviour is
//! configurable per transaction kind so callers can exercise timeouts,
//! failures and late confirmations without a network.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ledger::{
    LedgerGateway, TransactionRequest, TxDetails, TxFailure, TxKind, TxStatus,
    associated_token_account,
};
use super::oracle::PriceOracle;
use super::swap::{Quote, SwapService, UnsignedTx};
use crate::domain::amount::{LAMPORTS_PER_SOL, apply_bps};
use crate::domain::{Address, SignerRef, TxRef};
use crate::error::PipelineError;

/// Default simulated transaction fee.
pub const DEFAULT_FEE_LAMPORTS: u64 = 5_000;

/// How the simulated ledger answers confirmation lookups for a kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmMode {
    /// Effects apply and the transaction confirms at once.
    Immediate,
    /// Effects apply but lookups report `Processing` until released.
    Withhold,
    /// The transaction lands and fails; no effects apply.
    Fail(TxFailure),
    /// A reference is returned but the ledger never sees the transaction.
    Drop,
}

#[derive(Debug)]
struct TxEntry {
    seq: u64,
    kind: TxKind,
    verdict: TxStatus,
    released: bool,
}

#[derive(Debug)]
struct LedgerState {
    balances: HashMap<Address, u64>,
    txs: HashMap<TxRef, TxEntry>,
    modes: HashMap<TxKind, ConfirmMode>,
    next_seq: u64,
    slot: u64,
    fail_reads: u32,
    fail_submits: u32,
    fill_bps: u16,
}

/// Swap instructions carried inside a simulated [`UnsignedTx`].
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapPayload {
    user: Address,
    output_mint: Address,
    in_amount: u64,
    expected_out: u64,
    min_out: u64,
}

/// In-memory ledger.
#[derive(Debug)]
pub struct SimulatedLedger {
    rent_reserve: u64,
    fee_lamports: u64,
    state: Mutex<LedgerState>,
}

impl SimulatedLedger {
    /// Creates an empty ledger whose vaults keep `rent_reserve` lamports
    /// after a claim.
    #[must_use]
    pub fn new(rent_reserve: u64) -> Self {
        Self {
            rent_reserve,
            fee_lamports: DEFAULT_FEE_LAMPORTS,
            state: Mutex::new(LedgerState {
                balances: HashMap::new(),
                txs: HashMap::new(),
                modes: HashMap::new(),
                next_seq: 0,
                slot: 1_000,
                fail_reads: 0,
                fail_submits: 0,
                fill_bps: 10_000,
            }),
        }
    }

    /// Overrides the per-transaction fee.
    #[must_use]
    pub fn with_fee(mut self, fee_lamports: u64) -> Self {
        self.fee_lamports = fee_lamports;
        self
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the balance of `account`, creating it.
    pub fn set_balance(&self, account: &Address, amount: u64) {
        self.state().balances.insert(account.clone(), amount);
    }

    /// Adds `amount` to `account`, creating it.
    pub fn credit(&self, account: &Address, amount: u64) {
        let mut state = self.state();
        let balance = state.balances.entry(account.clone()).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    /// Current balance of `account`, zero when missing.
    #[must_use]
    pub fn balance_of(&self, account: &Address) -> u64 {
        self.state().balances.get(account).copied().unwrap_or(0)
    }

    /// Confirmation behaviour for transactions of `kind` submitted from now on.
    pub fn set_confirm_mode(&self, kind: TxKind, mode: ConfirmMode) {
        self.state().modes.insert(kind, mode);
    }

    /// Share of the quoted output a swap actually delivers, in bps.
    pub fn set_fill_bps(&self, fill_bps: u16) {
        self.state().fill_bps = fill_bps;
    }

    /// Makes the next `count` reads fail with a gateway error.
    pub fn fail_next_reads(&self, count: u32) {
        self.state().fail_reads = count;
    }

    /// Makes the next `count` submissions fail without returning a reference.
    pub fn fail_next_submissions(&self, count: u32) {
        self.state().fail_submits = count;
    }

    /// Lets a withheld transaction report its verdict. Returns `false` for
    /// unknown references.
    pub fn release(&self, tx_ref: &TxRef) -> bool {
        match self.state().txs.get_mut(tx_ref) {
            Some(entry) => {
                entry.released = true;
                true
            }
            None => false,
        }
    }

    /// Releases every withheld transaction.
    pub fn release_all(&self) {
        for entry in self.state().txs.values_mut() {
            entry.released = true;
        }
    }

    /// Accepted submissions in submission order.
    #[must_use]
    pub fn submitted(&self) -> Vec<(TxRef, TxKind)> {
        let state = self.state();
        let mut entries: Vec<_> = state
            .txs
            .iter()
            .map(|(tx_ref, entry)| (entry.seq, tx_ref.clone(), entry.kind))
            .collect();
        entries.sort_by_key(|(seq, _, _)| *seq);
        entries
            .into_iter()
            .map(|(_, tx_ref, kind)| (tx_ref, kind))
            .collect()
    }

    /// Number of accepted submissions.
    #[must_use]
    pub fn submission_count(&self) -> usize {
        self.state().txs.len()
    }

    /// Number of accepted submissions of `kind`.
    #[must_use]
    pub fn submissions_of(&self, kind: TxKind) -> usize {
        self.state()
            .txs
            .values()
            .filter(|entry| entry.kind == kind)
            .count()
    }

    fn take_read_failure(state: &mut LedgerState) -> Result<(), PipelineError> {
        if state.fail_reads > 0 {
            state.fail_reads -= 1;
            return Err(PipelineError::GatewayUnavailable(
                "simulated read failure".to_string(),
            ));
        }
        Ok(())
    }

    fn debit(state: &mut LedgerState, account: &Address, amount: u64) -> Result<(), TxFailure> {
        let balance = state.balances.entry(account.clone()).or_insert(0);
        *balance = balance
            .checked_sub(amount)
            .ok_or(TxFailure::InsufficientFunds)?;
        Ok(())
    }

    fn add(state: &mut LedgerState, account: &Address, amount: u64) {
        let balance = state.balances.entry(account.clone()).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    fn execute(
        &self,
        state: &mut LedgerState,
        tx: &TransactionRequest,
    ) -> Result<TxDetails, TxFailure> {
        match tx {
            TransactionRequest::ClaimRewards {
                authority, vault, ..
            } => {
                let held = state.balances.get(vault).copied().unwrap_or(0);
                let claimable = held.saturating_sub(self.rent_reserve);
                if claimable == 0 {
                    return Err(TxFailure::Program("vault has nothing to claim".to_string()));
                }
                Self::debit(state, vault, claimable)?;
                Self::add(state, authority, claimable);
                Self::debit(state, authority, self.fee_lamports)?;
            }
            TransactionRequest::Swap { transaction } => {
                let payload: SwapPayload = serde_json::from_str(&transaction.encoded)
                    .map_err(|e| TxFailure::Program(format!("undecodable transaction: {e}")))?;
                let filled = apply_bps(payload.expected_out, state.fill_bps);
                if filled < payload.min_out {
                    return Err(TxFailure::SlippageExceeded);
                }
                let cost = payload.in_amount.saturating_add(self.fee_lamports);
                Self::debit(state, &payload.user, cost)?;
                let ata = associated_token_account(self, &payload.user, &payload.output_mint);
                Self::add(state, &ata, filled);
            }
            TransactionRequest::Burn {
                token_account,
                owner,
                amount,
                ..
            } => {
                let held = state.balances.get(token_account).copied().unwrap_or(0);
                if held < *amount {
                    return Err(TxFailure::InsufficientFunds);
                }
                Self::debit(state, owner, self.fee_lamports)?;
                Self::debit(state, token_account, *amount)?;
            }
        }
        state.slot += 1;
        Ok(TxDetails {
            slot: state.slot,
            fee_lamports: self.fee_lamports,
        })
    }
}

#[async_trait]
impl LedgerGateway for SimulatedLedger {
    async fn get_balance(&self, account: &Address) -> Result<u64, PipelineError> {
        let mut state = self.state();
        Self::take_read_failure(&mut state)?;
        Ok(state.balances.get(account).copied().unwrap_or(0))
    }

    async fn get_account_exists(&self, account: &Address) -> Result<bool, PipelineError> {
        let mut state = self.state();
        Self::take_read_failure(&mut state)?;
        Ok(state.balances.contains_key(account))
    }

    async fn submit_transaction(
        &self,
        tx: &TransactionRequest,
        _signer: &SignerRef,
    ) -> Result<TxRef, PipelineError> {
        let mut state = self.state();
        if state.fail_submits > 0 {
            state.fail_submits -= 1;
            return Err(PipelineError::GatewayUnavailable(
                "simulated submission failure".to_string(),
            ));
        }

        let kind = tx.kind();
        state.next_seq += 1;
        let seq = state.next_seq;
        let tx_ref = TxRef::new(format!("sim-{kind}-{seq:06}"));
        let mode = state
            .modes
            .get(&kind)
            .cloned()
            .unwrap_or(ConfirmMode::Immediate);

        let verdict = match &mode {
            ConfirmMode::Fail(failure) => TxStatus::Failed(failure.clone()),
            ConfirmMode::Drop => TxStatus::NotFound,
            ConfirmMode::Immediate | ConfirmMode::Withhold => {
                match self.execute(&mut state, tx) {
                    Ok(details) => TxStatus::Confirmed(details),
                    Err(failure) => TxStatus::Failed(failure),
                }
            }
        };
        tracing::debug!(%tx_ref, %kind, ?verdict, "simulated submission");

        state.txs.insert(
            tx_ref.clone(),
            TxEntry {
                seq,
                kind,
                verdict,
                released: mode != ConfirmMode::Withhold,
            },
        );
        Ok(tx_ref)
    }

    async fn confirm(&self, tx_ref: &TxRef) -> Result<TxStatus, PipelineError> {
        let mut state = self.state();
        Self::take_read_failure(&mut state)?;
        Ok(match state.txs.get(tx_ref) {
            None => TxStatus::NotFound,
            Some(entry) if !entry.released => TxStatus::Processing,
            Some(entry) => entry.verdict.clone(),
        })
    }

    fn derive_program_address(&self, seeds: &[&[u8]], program_id: &Address) -> Address {
        let parts: Vec<_> = seeds
            .iter()
            .map(|seed| String::from_utf8_lossy(seed).into_owned())
            .collect();
        Address::new(format!("{program_id}:{}", parts.join("/")))
    }
}

#[derive(Debug, Default)]
struct SwapState {
    fail_quotes: u32,
    malformed_quotes: u32,
    quotes_served: u32,
}

/// Fixed-rate swap aggregator.
#[derive(Debug)]
pub struct SimulatedSwapService {
    tokens_per_sol: u64,
    state: Mutex<SwapState>,
}

impl SimulatedSwapService {
    /// Creates an aggregator pricing one SOL at `tokens_per_sol` base units.
    #[must_use]
    pub fn new(tokens_per_sol: u64) -> Self {
        Self {
            tokens_per_sol,
            state: Mutex::new(SwapState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, SwapState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes the next `count` quote requests fail.
    pub fn fail_next_quotes(&self, count: u32) {
        self.state().fail_quotes = count;
    }

    /// Makes the next `count` quotes come back malformed.
    pub fn malform_next_quotes(&self, count: u32) {
        self.state().malformed_quotes = count;
    }

    /// Quotes served so far, including failed ones.
    #[must_use]
    pub fn quotes_served(&self) -> u32 {
        self.state().quotes_served
    }
}

#[async_trait]
impl SwapService for SimulatedSwapService {
    async fn quote(
        &self,
        input: &Address,
        output: &Address,
        amount: u64,
        max_slippage_bps: u16,
    ) -> Result<Quote, PipelineError> {
        let mut state = self.state();
        state.quotes_served += 1;
        if state.fail_quotes > 0 {
            state.fail_quotes -= 1;
            return Err(PipelineError::SwapService(
                "simulated aggregator outage".to_string(),
            ));
        }

        let out = u128::from(amount) * u128::from(self.tokens_per_sol) / u128::from(LAMPORTS_PER_SOL);
        let mut expected_out = u64::try_from(out).unwrap_or(u64::MAX);
        if state.malformed_quotes > 0 {
            state.malformed_quotes -= 1;
            expected_out = 0;
        }
        let min_out = expected_out - apply_bps(expected_out, max_slippage_bps);

        Ok(Quote {
            input_mint: input.clone(),
            output_mint: output.clone(),
            in_amount: amount,
            expected_out,
            min_out,
            slippage_bps: max_slippage_bps,
            raw: serde_json::json!({ "simulated": true }),
        })
    }

    async fn build_swap_transaction(
        &self,
        quote: &Quote,
        signer: &Address,
    ) -> Result<UnsignedTx, PipelineError> {
        let payload = SwapPayload {
            user: signer.clone(),
            output_mint: quote.output_mint.clone(),
            in_amount: quote.in_amount,
            expected_out: quote.expected_out,
            min_out: quote.min_out,
        };
        let encoded = serde_json::to_string(&payload)
            .map_err(|e| PipelineError::SwapService(e.to_string()))?;
        Ok(UnsignedTx {
            encoded,
            last_valid_block_height: None,
        })
    }
}

/// Oracle returning a fixed rate, or failing when none is set.
#[derive(Debug)]
pub struct StaticPriceOracle {
    rate: Mutex<Option<f64>>,
}

impl StaticPriceOracle {
    /// Creates an oracle answering `rate`, or unreachable for `None`.
    #[must_use]
    pub const fn new(rate: Option<f64>) -> Self {
        Self {
            rate: Mutex::new(rate),
        }
    }

    /// Changes the answered rate.
    pub fn set_rate(&self, rate: Option<f64>) {
        *self.rate.lock().unwrap_or_else(PoisonError::into_inner) = rate;
    }
}

#[async_trait]
impl PriceOracle for StaticPriceOracle {
    async fn get_rate(&self, base: &str, quote: &str) -> Result<f64, PipelineError> {
        let rate = *self.rate.lock().unwrap_or_else(PoisonError::into_inner);
        rate.ok_or_else(|| {
            PipelineError::GatewayUnavailable(format!("no {base}/{quote} rate available"))
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::capability::ledger::ClaimAccounts;

    fn claim(ledger: &SimulatedLedger, authority: &Address) -> TransactionRequest {
        let program = Address::new("program");
        let accounts = ClaimAccounts::derive(ledger, &program, authority);
        TransactionRequest::ClaimRewards {
            program_id: program,
            authority: authority.clone(),
            vault: accounts.vault,
            event_authority: accounts.event_authority,
        }
    }

    #[tokio::test]
    async fn claim_moves_everything_above_rent() {
        let ledger = SimulatedLedger::new(1_000).with_fee(10);
        let authority = Address::new("auth");
        let tx = claim(&ledger, &authority);
        let TransactionRequest::ClaimRewards { vault, .. } = &tx else {
            panic!("claim request expected");
        };
        ledger.set_balance(vault, 51_000);

        let Ok(tx_ref) = ledger.submit_transaction(&tx, &SignerRef::new("k")).await else {
            panic!("submission should succeed");
        };
        let Ok(status) = ledger.confirm(&tx_ref).await else {
            panic!("lookup should succeed");
        };
        assert!(status.is_confirmed());
        assert_eq!(ledger.balance_of(vault), 1_000);
        assert_eq!(ledger.balance_of(&authority), 49_990);
    }

    #[tokio::test]
    async fn withheld_transactions_confirm_after_release() {
        let ledger = SimulatedLedger::new(0).with_fee(0);
        ledger.set_confirm_mode(TxKind::Burn, ConfirmMode::Withhold);
        let ata = Address::new("ata");
        ledger.set_balance(&ata, 10);
        let tx = TransactionRequest::Burn {
            mint: Address::new("mint"),
            token_account: ata.clone(),
            owner: Address::new("owner"),
            amount: 4,
        };
        let Ok(tx_ref) = ledger.submit_transaction(&tx, &SignerRef::new("k")).await else {
            panic!("submission should succeed");
        };
        assert!(matches!(ledger.confirm(&tx_ref).await, Ok(TxStatus::Processing)));
        assert_eq!(ledger.balance_of(&ata), 6);
        assert!(ledger.release(&tx_ref));
        assert!(matches!(ledger.confirm(&tx_ref).await, Ok(TxStatus::Confirmed(_))));
    }

    #[tokio::test]
    async fn swap_credits_owner_token_account() {
        let ledger = SimulatedLedger::new(0).with_fee(0);
        let swap = SimulatedSwapService::new(2_000);
        let user = Address::new("user");
        let mint = Address::new("mint");
        ledger.set_balance(&user, LAMPORTS_PER_SOL);

        let Ok(quote) = swap
            .quote(&Address::new("sol"), &mint, LAMPORTS_PER_SOL / 2, 100)
            .await
        else {
            panic!("quote should succeed");
        };
        assert_eq!(quote.expected_out, 1_000);
        assert_eq!(quote.min_out, 990);
        let Ok(unsigned) = swap.build_swap_transaction(&quote, &user).await else {
            panic!("build should succeed");
        };
        let tx = TransactionRequest::Swap {
            transaction: unsigned,
        };
        assert!(ledger.submit_transaction(&tx, &SignerRef::new("k")).await.is_ok());

        let ata = associated_token_account(&ledger, &user, &mint);
        assert_eq!(ledger.balance_of(&ata), 1_000);
        assert_eq!(ledger.balance_of(&user), LAMPORTS_PER_SOL / 2);
    }

    #[tokio::test]
    async fn short_fill_below_minimum_fails_with_slippage() {
        let ledger = SimulatedLedger::new(0).with_fee(0);
        ledger.set_fill_bps(9_000);
        let swap = SimulatedSwapService::new(2_000);
        let user = Address::new("user");
        ledger.set_balance(&user, LAMPORTS_PER_SOL);
        let Ok(quote) = swap
            .quote(&Address::new("sol"), &Address::new("mint"), LAMPORTS_PER_SOL, 100)
            .await
        else {
            panic!("quote should succeed");
        };
        let Ok(unsigned) = swap.build_swap_transaction(&quote, &user).await else {
            panic!("build should succeed");
        };
        let tx = TransactionRequest::Swap {
            transaction: unsigned,
        };
        let Ok(tx_ref) = ledger.submit_transaction(&tx, &SignerRef::new("k")).await else {
            panic!("submission should succeed");
        };
        assert_eq!(
            ledger.confirm(&tx_ref).await.ok(),
            Some(TxStatus::Failed(TxFailure::SlippageExceeded))
        );
        assert_eq!(ledger.balance_of(&user), LAMPORTS_PER_SOL);
    }

    #[tokio::test]
    async fn dropped_transactions_are_never_found() {
        let ledger = SimulatedLedger::new(0);
        ledger.set_confirm_mode(TxKind::Claim, ConfirmMode::Drop);
        let tx = claim(&ledger, &Address::new("auth"));
        let Ok(tx_ref) = ledger.submit_transaction(&tx, &SignerRef::new("k")).await else {
            panic!("submission should succeed");
        };
        assert!(matches!(ledger.confirm(&tx_ref).await, Ok(TxStatus::NotFound)));
    }

    #[tokio::test]
    async fn read_failures_are_consumed() {
        let ledger = SimulatedLedger::new(0);
        ledger.fail_next_reads(1);
        let account = Address::new("a");
        assert!(ledger.get_balance(&account).await.is_err());
        assert!(matches!(ledger.get_balance(&account).await, Ok(0)));
    }
}
