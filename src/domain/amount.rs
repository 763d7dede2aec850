//! Ledger-native amount helpers.
//!
//! Native balances are carried as `u64` lamports and token balances as
//! `u64` base units throughout the crate. Fractions are expressed in
//! basis points and applied with widened integer math so they never
//! round up past the input.

/// Lamports per whole SOL.
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Basis-point denominator (100%).
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Converts lamports to a floating SOL value for display and valuation.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}

/// Converts a SOL value to lamports, truncating sub-lamport dust.
///
/// Negative and non-finite inputs map to zero.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn sol_to_lamports(sol: f64) -> u64 {
    if !sol.is_finite() || sol <= 0.0 {
        return 0;
    }
    (sol * LAMPORTS_PER_SOL as f64).round() as u64
}

/// Returns `amount * bps / 10_000`, rounded down.
///
/// `bps` values above 10 000 are clamped to 100%.
#[must_use]
pub fn apply_bps(amount: u64, bps: u16) -> u64 {
    let bps = u128::from(u64::from(bps).min(BPS_DENOMINATOR));
    let scaled = u128::from(amount) * bps / u128::from(BPS_DENOMINATOR);
    u64::try_from(scaled).unwrap_or(u64::MAX)
}

/// Values a lamport amount in USD at the given SOL/USD rate.
#[must_use]
pub fn lamports_to_usd(lamports: u64, sol_usd: f64) -> f64 {
    lamports_to_sol(lamports) * sol_usd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sol_lamport_conversion() {
        assert_eq!(sol_to_lamports(0.3), 300_000_000);
        assert!((lamports_to_sol(200_000_000) - 0.2).abs() < f64::EPSILON);
        assert_eq!(sol_to_lamports(-1.0), 0);
        assert_eq!(sol_to_lamports(f64::NAN), 0);
    }

    #[test]
    fn bps_rounds_down() {
        assert_eq!(apply_bps(1_000, 9_500), 950);
        assert_eq!(apply_bps(999, 9_900), 989);
        assert_eq!(apply_bps(u64::MAX, 10_000), u64::MAX);
        assert_eq!(apply_bps(100, 20_000), 100);
    }

    #[test]
    fn usd_valuation() {
        let usd = lamports_to_usd(2 * LAMPORTS_PER_SOL, 150.0);
        assert!((usd - 300.0).abs() < 1e-9);
    }
}
