use chrono::{DateTime, Utc};

use crate::amount::{mul_div_floor, Amount, Apr};
use crate::errors::Result;

/// minutes in a non-leap year, the discretization basis for accruing rates
pub const MINUTES_IN_YEAR: u128 = 525_600;

/// minutes in a day, the step granularity of the overtime penalty policy
pub const MINUTES_IN_DAY: u128 = 1_440;

/// interest accrued under a continuously accruing APR, discretized to
/// whole minutes
///
/// `interest = floor(principal * apr * minutes / (525600 * 10000))`; the
/// denominator preserves the APR's two decimal places exactly. Accrual is
/// monotonic in `now` and zero before the start instant.
pub fn accruing_interest(
    principal: Amount,
    apr: Apr,
    start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Amount> {
    if apr.is_zero() || now <= start {
        return Ok(0);
    }
    let minutes = (now - start).num_minutes().max(0) as u128;
    mul_div_floor(
        principal,
        u128::from(apr.0) * minutes,
        MINUTES_IN_YEAR * Apr::DENOMINATOR,
    )
}

/// stable interest locked until a fixation deadline, with a stepped
/// overtime penalty afterwards
///
/// Past the deadline the effective APR increases by `step` for each
/// additional full day, each overtime day accruing at that day's stepped
/// rate and the final partial day prorated by minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StableInterest {
    pub fixed_amount: Amount,
    pub fixation_deadline: DateTime<Utc>,
    pub step: Apr,
}

impl StableInterest {
    pub fn new(fixed_amount: Amount, fixation_deadline: DateTime<Utc>, step: Apr) -> Self {
        Self {
            fixed_amount,
            fixation_deadline,
            step,
        }
    }

    /// total interest owed on `principal` at `now`
    pub fn owed(&self, principal: Amount, now: DateTime<Utc>) -> Result<Amount> {
        if now <= self.fixation_deadline {
            return Ok(self.fixed_amount);
        }
        let overtime_minutes = (now - self.fixation_deadline).num_minutes().max(0) as u128;
        let full_days = overtime_minutes / MINUTES_IN_DAY;
        let partial_minutes = overtime_minutes % MINUTES_IN_DAY;

        let mut penalty: Amount = 0;
        for day in 0..full_days {
            let rate = u128::from(self.step.0) * (day + 1);
            penalty += mul_div_floor(
                principal,
                rate * MINUTES_IN_DAY,
                MINUTES_IN_YEAR * Apr::DENOMINATOR,
            )?;
        }
        if partial_minutes > 0 {
            let rate = u128::from(self.step.0) * (full_days + 1);
            penalty += mul_div_floor(
                principal,
                rate * partial_minutes,
                MINUTES_IN_YEAR * Apr::DENOMINATOR,
            )?;
        }
        Ok(self.fixed_amount + penalty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_zero_apr_accrues_nothing() {
        let now = start() + Duration::days(365);
        assert_eq!(accruing_interest(100_000, Apr::ZERO, start(), now).unwrap(), 0);
    }

    #[test]
    fn test_full_year_at_ten_percent() {
        let now = start() + Duration::minutes(525_600);
        let interest = accruing_interest(100_000, Apr::from_percent(10), start(), now).unwrap();
        assert_eq!(interest, 10_000);
    }

    #[test]
    fn test_half_year_is_half_interest() {
        let now = start() + Duration::minutes(262_800);
        let interest = accruing_interest(100_000, Apr::from_percent(10), start(), now).unwrap();
        assert_eq!(interest, 5_000);
    }

    #[test]
    fn test_sub_minute_elapsed_accrues_nothing() {
        let now = start() + Duration::seconds(59);
        let interest = accruing_interest(100_000, Apr::from_percent(10), start(), now).unwrap();
        assert_eq!(interest, 0);
    }

    #[test]
    fn test_before_start_accrues_nothing() {
        let now = start() - Duration::days(1);
        assert_eq!(
            accruing_interest(100_000, Apr::from_percent(10), start(), now).unwrap(),
            0
        );
    }

    #[test]
    fn test_accrual_is_monotonic() {
        let apr = Apr(777);
        let mut last = 0;
        for minutes in [0i64, 1, 59, 60, 1_440, 10_000, 525_600, 1_051_200] {
            let now = start() + Duration::minutes(minutes);
            let interest = accruing_interest(123_456_789, apr, start(), now).unwrap();
            assert!(interest >= last);
            last = interest;
        }
    }

    #[test]
    fn test_huge_principal_does_not_overflow() {
        let now = start() + Duration::minutes(525_600);
        let interest =
            accruing_interest(u128::MAX / 100, Apr::from_percent(1), start(), now).unwrap();
        assert_eq!(interest, u128::MAX / 100 / 100);
    }

    #[test]
    fn test_stable_interest_fixed_until_deadline() {
        let stable = StableInterest::new(10_000, start() + Duration::days(30), Apr::from_percent(1));
        assert_eq!(stable.owed(1_000_000, start()).unwrap(), 10_000);
        assert_eq!(
            stable.owed(1_000_000, start() + Duration::days(30)).unwrap(),
            10_000
        );
    }

    #[test]
    fn test_stable_interest_steps_per_overtime_day() {
        let deadline = start() + Duration::days(30);
        let stable = StableInterest::new(10_000, deadline, Apr::from_percent(1));
        let principal = 1_000_000;

        // day 1 overtime at 1%: floor(1e6 * 100 * 1440 / 5_256_000_000) = 27
        let one_day = stable.owed(principal, deadline + Duration::days(1)).unwrap();
        assert_eq!(one_day, 10_000 + 27);

        // day 2 overtime at 2%: 27 + floor(1e6 * 200 * 1440 / 5_256_000_000) = 27 + 54
        let two_days = stable.owed(principal, deadline + Duration::days(2)).unwrap();
        assert_eq!(two_days, 10_000 + 27 + 54);

        // half of day 3 prorated at 3%: + floor(1e6 * 300 * 720 / 5_256_000_000) = 41
        let half_into_third = stable
            .owed(principal, deadline + Duration::days(2) + Duration::hours(12))
            .unwrap();
        assert_eq!(half_into_third, 10_000 + 27 + 54 + 41);
    }

    #[test]
    fn test_stable_interest_is_monotonic() {
        let deadline = start() + Duration::days(7);
        let stable = StableInterest::new(500, deadline, Apr(250));
        let mut last = 0;
        for hours in [0i64, 24, 168, 169, 180, 200, 400, 1_000] {
            let owed = stable.owed(2_000_000, start() + Duration::hours(hours)).unwrap();
            assert!(owed >= last);
            last = owed;
        }
    }
}
