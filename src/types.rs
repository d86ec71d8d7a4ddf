use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::amount::{Amount, Apr};
use crate::errors::Result;
use crate::hashing::{structured_hash, Hash, SignatureDomain};

/// unique identifier for a loan
pub type LoanId = Uuid;

/// unique identifier for a repayment receipt token
pub type ReceiptId = Uuid;

/// a 32-byte on-ledger identity
///
/// When an identity has to prove authorship of a proposal its bytes are
/// interpreted as an Ed25519 verifying key; otherwise it is an opaque id
/// (asset contracts, pools, the engine itself).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Address(pub [u8; 32]);

impl Address {
    pub const ZERO: Address = Address([0u8; 32]);
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// asset transfer-standard category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetKind {
    /// divisible balance, no token id
    Fungible,
    /// a single non-divisible token identified by its id
    Unique,
    /// a divisible balance under a token id
    SemiFungible,
}

/// a typed asset: category, contract address, token id, and quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub kind: AssetKind,
    pub address: Address,
    pub token_id: u128,
    pub amount: Amount,
}

impl Asset {
    pub fn fungible(address: Address, amount: Amount) -> Self {
        Self {
            kind: AssetKind::Fungible,
            address,
            token_id: 0,
            amount,
        }
    }

    pub fn unique(address: Address, token_id: u128) -> Self {
        Self {
            kind: AssetKind::Unique,
            address,
            token_id,
            amount: 1,
        }
    }

    pub fn semi_fungible(address: Address, token_id: u128, amount: Amount) -> Self {
        Self {
            kind: AssetKind::SemiFungible,
            address,
            token_id,
            amount,
        }
    }

    /// same asset with a different quantity
    pub fn with_amount(&self, amount: Amount) -> Self {
        Self { amount, ..*self }
    }

    /// category-consistency check used by the default registry
    pub fn is_well_formed(&self) -> bool {
        match self.kind {
            AssetKind::Fungible => self.token_id == 0 && self.amount > 0,
            AssetKind::Unique => self.amount == 1,
            AssetKind::SemiFungible => self.amount > 0,
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {} (id {}) x{}",
            self.kind, self.address, self.token_id, self.amount
        )
    }
}

/// loan status as observed at a point in time
///
/// Only `Running` and `Repaid` are ever stored; `None` means no record
/// exists and `Defaulted` is derived from `Running` plus elapsed time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanStatus {
    None,
    Running,
    Repaid,
    Defaulted,
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// concrete loan terms resolved from an accepted proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Terms {
    pub lender: Address,
    pub borrower: Address,
    pub duration_secs: u64,
    pub collateral: Asset,
    pub credit: Asset,
    pub fixed_interest: Amount,
    pub accruing_apr: Apr,
    pub lender_spec_hash: Hash,
}

/// lender-side settlement parameters committed to by an offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LenderSpec {
    /// identity actually debited for credit; equals the lender for
    /// directly funded loans, a pool address otherwise
    pub source_of_funds: Address,
}

impl LenderSpec {
    pub fn direct(lender: Address) -> Self {
        Self {
            source_of_funds: lender,
        }
    }

    pub fn hash(&self, domain: &SignatureDomain) -> Result<Hash> {
        structured_hash(domain, "lender-spec", self)
    }
}

/// capability tags answered by the access registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CapabilityTag {
    /// may resolve proposals into loan terms for the engine
    LoanProposal,
    /// may move funds in and out of a pool-style source of funds
    PoolAdapter,
}

impl fmt::Display for CapabilityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
