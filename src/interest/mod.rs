pub mod accrual;
pub mod ceiling;

pub use accrual::{accruing_interest, StableInterest, MINUTES_IN_DAY, MINUTES_IN_YEAR};
pub use ceiling::DebtCeiling;
