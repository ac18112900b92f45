//! Transfer-fee arithmetic.
//!
//! A fee-bearing transfer withholds `floor(amount * bps / 10_000)`, capped by
//! the configured maximum (0 = uncapped). The withheld amount accrues on the
//! recipient account and is drawable only by the withdraw-withheld authority;
//! the recipient is credited the remainder.

use serde::{Deserialize, Serialize};

use crate::error::{LifecycleError, Result};

/// 100% in basis points.
pub const MAX_FEE_BASIS_POINTS: u16 = 10_000;

/// Fee rate and cap, set at most once per mint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferFeeParams {
    /// Fee rate in basis points (1/100 of a percent).
    pub fee_basis_points: u16,
    /// Maximum fee per transfer in raw units; 0 means no cap.
    pub max_fee: u64,
}

impl TransferFeeParams {
    pub fn new(fee_basis_points: u16, max_fee: u64) -> Result<Self> {
        if fee_basis_points > MAX_FEE_BASIS_POINTS {
            return Err(LifecycleError::config(format!(
                "fee rate {fee_basis_points} exceeds {MAX_FEE_BASIS_POINTS} basis points"
            )));
        }
        Ok(Self {
            fee_basis_points,
            max_fee,
        })
    }

    /// Amount withheld from a transfer of `amount` raw units.
    pub fn withheld(&self, amount: u64) -> u64 {
        // u128 intermediate: amount * 10_000 would overflow u64.
        let fee = (amount as u128 * self.fee_basis_points as u128 / 10_000) as u64;
        if self.max_fee == 0 {
            fee
        } else {
            fee.min(self.max_fee)
        }
    }

    /// Amount credited to the recipient after the fee is withheld.
    pub fn net_of_fee(&self, amount: u64) -> u64 {
        amount - self.withheld(amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_rejects_rate_over_hundred_percent() {
        assert!(TransferFeeParams::new(10_001, 0).is_err());
        assert!(TransferFeeParams::new(10_000, 0).is_ok());
    }

    #[test]
    fn test_five_percent_uncapped() {
        let fee = TransferFeeParams::new(500, 0).unwrap();
        // 10,000 tokens at 6 decimals.
        let amount = 10_000 * 1_000_000;
        assert_eq!(fee.withheld(amount), 500 * 1_000_000);
        assert_eq!(fee.net_of_fee(amount), 9_500 * 1_000_000);
    }

    #[test]
    fn test_rounding_floors() {
        let fee = TransferFeeParams::new(1, 0).unwrap();
        // 1 bps of 9,999 = 0.9999, floors to 0.
        assert_eq!(fee.withheld(9_999), 0);
        assert_eq!(fee.withheld(10_000), 1);
        assert_eq!(fee.withheld(19_999), 1);
    }

    #[test]
    fn test_cap_applies() {
        let fee = TransferFeeParams::new(500, 1_000).unwrap();
        assert_eq!(fee.withheld(1_000_000), 1_000);
        assert_eq!(fee.net_of_fee(1_000_000), 999_000);
        // Below the cap the rate applies unchanged.
        assert_eq!(fee.withheld(10_000), 500);
    }

    #[test]
    fn test_full_rate_confiscates_everything() {
        let fee = TransferFeeParams::new(10_000, 0).unwrap();
        assert_eq!(fee.withheld(1_234), 1_234);
        assert_eq!(fee.net_of_fee(1_234), 0);
    }

    proptest! {
        /// For every rate in [0, 10000] with no cap: withheld is exactly
        /// floor(amount*bps/10000) and net + withheld reassembles the amount.
        #[test]
        fn prop_uncapped_fee_partitions_amount(
            bps in 0u16..=MAX_FEE_BASIS_POINTS,
            amount in 0u64..=u64::MAX,
        ) {
            let fee = TransferFeeParams::new(bps, 0).unwrap();
            let withheld = fee.withheld(amount);
            let expected = (amount as u128 * bps as u128 / 10_000) as u64;
            prop_assert_eq!(withheld, expected);
            prop_assert_eq!(fee.net_of_fee(amount) as u128 + withheld as u128, amount as u128);
            prop_assert!(withheld <= amount);
        }

        #[test]
        fn prop_capped_fee_never_exceeds_cap(
            bps in 1u16..=MAX_FEE_BASIS_POINTS,
            amount in 0u64..=u64::MAX,
            cap in 1u64..=u64::MAX,
        ) {
            let fee = TransferFeeParams::new(bps, cap).unwrap();
            prop_assert!(fee.withheld(amount) <= cap);
        }
    }
}
