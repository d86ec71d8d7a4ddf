use chrono::{DateTime, Utc};

use crate::amount::{mul_div_floor, Amount};
use crate::errors::Result;

/// declining debt ceiling for installment-style loans
///
/// The ceiling falls in a straight line from the initial debt at
/// `default_timestamp - postponement` down to zero at `default_timestamp`.
/// The loan is in default the instant the total owed exceeds the ceiling,
/// independent of elapsed real time alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebtCeiling {
    /// principal plus fixed interest at the start of the decline window
    pub initial_debt: Amount,
    pub default_timestamp: DateTime<Utc>,
    pub postponement_secs: u64,
}

impl DebtCeiling {
    pub fn new(initial_debt: Amount, default_timestamp: DateTime<Utc>, postponement_secs: u64) -> Self {
        Self {
            initial_debt,
            default_timestamp,
            postponement_secs,
        }
    }

    /// the highest total owed permitted at `now`
    pub fn ceiling(&self, now: DateTime<Utc>) -> Result<Amount> {
        if now >= self.default_timestamp {
            return Ok(0);
        }
        // compared in integer seconds so an arbitrarily long postponement
        // never has to be materialized as a timestamp offset
        let remaining_secs = (self.default_timestamp - now).num_seconds() as u128;
        if remaining_secs >= u128::from(self.postponement_secs) {
            return Ok(self.initial_debt);
        }
        mul_div_floor(
            self.initial_debt,
            remaining_secs,
            u128::from(self.postponement_secs),
        )
    }

    pub fn is_in_default(&self, total_owed: Amount, now: DateTime<Utc>) -> Result<bool> {
        Ok(total_owed > self.ceiling(now)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn deadline() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn ceiling() -> DebtCeiling {
        // 10 day window
        DebtCeiling::new(100_000, deadline(), 10 * 86_400)
    }

    #[test]
    fn test_full_ceiling_before_window() {
        let c = ceiling();
        let before = deadline() - Duration::days(30);
        assert_eq!(c.ceiling(before).unwrap(), 100_000);
    }

    #[test]
    fn test_ceiling_declines_linearly() {
        let c = ceiling();
        assert_eq!(c.ceiling(deadline() - Duration::days(5)).unwrap(), 50_000);
        assert_eq!(c.ceiling(deadline() - Duration::days(1)).unwrap(), 10_000);
    }

    #[test]
    fn test_zero_ceiling_at_default_timestamp() {
        let c = ceiling();
        assert_eq!(c.ceiling(deadline()).unwrap(), 0);
        assert_eq!(c.ceiling(deadline() + Duration::seconds(1)).unwrap(), 0);
    }

    #[test]
    fn test_default_triggers_on_ceiling_crossing() {
        let c = ceiling();
        let midway = deadline() - Duration::days(5);
        // owing half the initial debt is fine exactly at the midpoint
        assert!(!c.is_in_default(50_000, midway).unwrap());
        // one unit over the midpoint ceiling is a default even though the
        // default timestamp is days away
        assert!(c.is_in_default(50_001, midway).unwrap());
    }

    #[test]
    fn test_enormous_postponement_window() {
        // a window longer than representable time still evaluates
        let c = DebtCeiling::new(100_000, deadline(), u64::MAX);
        let owed_at = deadline() - Duration::days(1);
        // 100_000 * 86_400 / u64::MAX floors to zero
        assert_eq!(c.ceiling(owed_at).unwrap(), 0);
        assert!(c.is_in_default(1, owed_at).unwrap());
    }

    #[test]
    fn test_any_debt_defaults_past_deadline() {
        let c = ceiling();
        assert!(c.is_in_default(1, deadline()).unwrap());
        assert!(!c.is_in_default(0, deadline()).unwrap());
    }
}
