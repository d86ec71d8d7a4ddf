use serde::{Deserialize, Serialize};

use crate::amount::Apr;
use crate::types::Address;

/// protocol parameters of one loan engine instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// network the engine is deployed on, bound into every signed hash
    pub network_id: u64,
    /// protocol fee in basis points, deducted from every credit draw
    pub fee_bps: u16,
    /// identity receiving the protocol fee
    pub fee_collector: Address,
    /// shortest loan the engine will create
    pub min_loan_duration_secs: u64,
    /// longest loan the engine will create
    pub max_loan_duration_secs: u64,
    /// highest accruing interest rate the engine will accept
    pub max_accruing_apr: Apr,
    /// shortest single extension of a default timestamp
    pub min_extension_secs: u64,
    /// longest single extension of a default timestamp
    pub max_extension_secs: u64,
    /// oldest price observation the oracle variant will accept
    pub max_price_age_secs: u64,
}

impl EngineConfig {
    /// minimum loan duration: 10 minutes
    pub const MIN_LOAN_DURATION_SECS: u64 = 600;
    /// maximum loan duration: 10 years
    pub const MAX_LOAN_DURATION_SECS: u64 = 10 * 365 * 86_400;
    /// maximum accruing APR: 1600%
    pub const MAX_ACCRUING_APR: Apr = Apr(160_000);
    /// minimum extension: 1 day
    pub const MIN_EXTENSION_SECS: u64 = 86_400;
    /// maximum extension: 90 days
    pub const MAX_EXTENSION_SECS: u64 = 90 * 86_400;

    pub fn new(network_id: u64, fee_collector: Address) -> Self {
        Self {
            network_id,
            fee_bps: 0,
            fee_collector,
            min_loan_duration_secs: Self::MIN_LOAN_DURATION_SECS,
            max_loan_duration_secs: Self::MAX_LOAN_DURATION_SECS,
            max_accruing_apr: Self::MAX_ACCRUING_APR,
            min_extension_secs: Self::MIN_EXTENSION_SECS,
            max_extension_secs: Self::MAX_EXTENSION_SECS,
            max_price_age_secs: 3_600,
        }
    }

    pub fn with_fee(mut self, fee_bps: u16) -> Self {
        self.fee_bps = fee_bps;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(1, Address::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.min_loan_duration_secs, 600);
        assert_eq!(config.max_loan_duration_secs, 315_360_000);
        assert_eq!(config.max_accruing_apr, Apr(160_000));
        assert_eq!(config.min_extension_secs, 86_400);
        assert_eq!(config.max_extension_secs, 7_776_000);
        assert_eq!(config.fee_bps, 0);
    }

    #[test]
    fn test_with_fee() {
        let config = EngineConfig::default().with_fee(25);
        assert_eq!(config.fee_bps, 25);
    }
}
