use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{LoanError, Result};

/// asset quantity in the smallest denomination
pub type Amount = u128;

/// basis point denominator for fee splits
pub const FEE_BPS_DENOMINATOR: u128 = 10_000;

/// annual percentage rate with 2 decimal places of precision (1% = 100)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Apr(pub u32);

impl Apr {
    pub const ZERO: Apr = Apr(0);

    /// unit denominator: APR is expressed in hundredths of a percent
    pub const DENOMINATOR: u128 = 10_000;

    /// create from whole percent (e.g., 5 for 5%)
    pub fn from_percent(p: u32) -> Self {
        Apr(p * 100)
    }

    /// get as percentage
    pub fn as_percentage(&self) -> Decimal {
        Decimal::from(self.0) / Decimal::from(100)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Apr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.as_percentage())
    }
}

/// split an amount into a protocol fee and the remainder
///
/// `fee = floor(amount * fee_bps / 10000)`; the split always conserves the
/// input: `fee + remainder == amount`. The wide product keeps the split
/// exact for amounts all the way up to `u128::MAX`.
pub fn fee_split(amount: Amount, fee_bps: u16) -> Result<(Amount, Amount)> {
    if u128::from(fee_bps) > FEE_BPS_DENOMINATOR {
        return Err(LoanError::CalculationError {
            message: format!("fee of {} bps exceeds {}", fee_bps, FEE_BPS_DENOMINATOR),
        });
    }
    let fee = mul_div_floor(amount, u128::from(fee_bps), FEE_BPS_DENOMINATOR)?;
    Ok((fee, amount - fee))
}

/// compute `floor(a * b / d)` with a 256-bit intermediate product
///
/// Settlement arithmetic must be exact even when `a * b` exceeds `u128`
/// (the elastic collateral ratio is scaled by 10^18). Fails on a zero
/// divisor or when the quotient itself does not fit in an `Amount`.
pub fn mul_div_floor(a: Amount, b: Amount, d: Amount) -> Result<Amount> {
    if d == 0 {
        return Err(LoanError::CalculationError {
            message: "division by zero".to_string(),
        });
    }
    let (hi, lo) = mul_wide(a, b);
    if hi == 0 {
        return Ok(lo / d);
    }
    // 256/128 long division, shift-subtract over the full product
    let mut rem: u128 = 0;
    let mut quo_hi: u128 = 0;
    let mut quo_lo: u128 = 0;
    for i in (0..256u32).rev() {
        let bit = if i >= 128 {
            (hi >> (i - 128)) & 1
        } else {
            (lo >> i) & 1
        };
        let carry = rem >> 127;
        rem = (rem << 1) | bit;
        if carry == 1 || rem >= d {
            rem = rem.wrapping_sub(d);
            if i >= 128 {
                quo_hi |= 1 << (i - 128);
            } else {
                quo_lo |= 1 << i;
            }
        }
    }
    if quo_hi != 0 {
        return Err(LoanError::CalculationError {
            message: format!("quotient overflow in {} * {} / {}", a, b, d),
        });
    }
    Ok(quo_lo)
}

/// full 256-bit product of two u128 values as (high, low) halves
fn mul_wide(a: u128, b: u128) -> (u128, u128) {
    const MASK: u128 = (1u128 << 64) - 1;
    let (ah, al) = (a >> 64, a & MASK);
    let (bh, bl) = (b >> 64, b & MASK);

    let ll = al * bl;
    let lh = al * bh;
    let hl = ah * bl;
    let hh = ah * bh;

    let mid = (ll >> 64) + (lh & MASK) + (hl & MASK);
    let lo = (mid << 64) | (ll & MASK);
    let hi = hh + (lh >> 64) + (hl >> 64) + (mid >> 64);
    (hi, lo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_apr_percentage() {
        assert_eq!(Apr::from_percent(5).as_percentage(), dec!(5));
        assert_eq!(Apr(150).as_percentage(), dec!(1.5));
        assert_eq!(Apr::ZERO.as_percentage(), dec!(0));
    }

    #[test]
    fn test_fee_split_conservation() {
        for (amount, bps) in [
            (0u128, 100u16),
            (1, 1),
            (100, 50),
            (10_000, 10_000),
            (u128::MAX / FEE_BPS_DENOMINATOR, 9_999),
            (123_456_789, 37),
        ] {
            let (fee, remainder) = fee_split(amount, bps).unwrap();
            assert_eq!(fee + remainder, amount);
            assert_eq!(fee, amount * u128::from(bps) / 10_000);
        }
    }

    #[test]
    fn test_fee_split_of_max_amount() {
        // the product exceeds u128 but the split stays exact
        let (fee, remainder) = fee_split(u128::MAX, 100).unwrap();
        assert_eq!(fee, u128::MAX / 100);
        assert_eq!(fee + remainder, u128::MAX);

        let (fee, remainder) = fee_split(u128::MAX, 10_000).unwrap();
        assert_eq!(fee, u128::MAX);
        assert_eq!(remainder, 0);
    }

    #[test]
    fn test_fee_split_rejects_over_100_percent() {
        assert!(fee_split(100, 10_001).is_err());
    }

    #[test]
    fn test_fee_split_rounds_down() {
        // 99 * 100 / 10000 = 0.99 -> 0
        let (fee, remainder) = fee_split(99, 100).unwrap();
        assert_eq!(fee, 0);
        assert_eq!(remainder, 99);
    }

    #[test]
    fn test_mul_div_small() {
        assert_eq!(mul_div_floor(10, 20, 4).unwrap(), 50);
        assert_eq!(mul_div_floor(7, 3, 2).unwrap(), 10); // floor(10.5)
        assert_eq!(mul_div_floor(0, 123, 7).unwrap(), 0);
    }

    #[test]
    fn test_mul_div_wide_intermediate() {
        // 70 * 10^38 overflows u128 but the quotient is exact
        let scale = 10u128.pow(38);
        assert_eq!(mul_div_floor(70, scale, scale / 10).unwrap(), 700);

        // max-value identity
        assert_eq!(mul_div_floor(u128::MAX, 7, 7).unwrap(), u128::MAX);
    }

    #[test]
    fn test_mul_div_floors() {
        let scale = 10u128.pow(38);
        // 5 * 10^38 / (3 * 10^38) = 1.66.. -> 1
        assert_eq!(mul_div_floor(5, scale, 3 * scale).unwrap(), 1);
    }

    #[test]
    fn test_mul_div_zero_divisor() {
        assert!(mul_div_floor(1, 1, 0).is_err());
    }

    #[test]
    fn test_mul_div_quotient_overflow() {
        assert!(mul_div_floor(u128::MAX, 3, 2).is_err());
    }

    #[test]
    fn test_mul_wide() {
        let (hi, lo) = mul_wide(u128::MAX, 2);
        assert_eq!(hi, 1);
        assert_eq!(lo, u128::MAX - 1);

        let (hi, lo) = mul_wide(1 << 127, 4);
        assert_eq!(hi, 2);
        assert_eq!(lo, 0);
    }
}
