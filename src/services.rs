use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::errors::{LoanError, Result};
use crate::ledger::AssetTransfer;
use crate::types::{Address, Asset, CapabilityTag, ReceiptId};

/// access and asset-category authority consumed by the loan engine
pub trait CapabilityRegistry {
    fn has_capability(&self, address: Address, tag: CapabilityTag) -> bool;

    /// category-consistency check applied to collateral and credit assets
    fn is_valid_asset(&self, asset: &Asset) -> bool;

    /// adapter authorized to move funds for a pool-style source of funds
    fn pool_adapter(&self, pool: Address) -> Option<Address>;
}

/// in-memory capability registry
#[derive(Debug, Default)]
pub struct AccessRegistry {
    capabilities: HashSet<(Address, CapabilityTag)>,
    adapters: HashMap<Address, Address>,
}

impl AccessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&mut self, address: Address, tag: CapabilityTag) {
        self.capabilities.insert((address, tag));
    }

    pub fn revoke(&mut self, address: Address, tag: CapabilityTag) {
        self.capabilities.remove(&(address, tag));
    }

    pub fn register_pool_adapter(&mut self, pool: Address, adapter: Address) {
        self.adapters.insert(pool, adapter);
        self.grant(adapter, CapabilityTag::PoolAdapter);
    }
}

impl CapabilityRegistry for AccessRegistry {
    fn has_capability(&self, address: Address, tag: CapabilityTag) -> bool {
        self.capabilities.contains(&(address, tag))
    }

    fn is_valid_asset(&self, asset: &Asset) -> bool {
        asset.is_well_formed()
    }

    fn pool_adapter(&self, pool: Address) -> Option<Address> {
        self.adapters.get(&pool).copied()
    }
}

/// transferable claim on a loan's repayment or collateral
pub trait ReceiptTokenService {
    fn mint(&mut self, owner: Address) -> ReceiptId;
    fn burn(&mut self, id: ReceiptId) -> Result<()>;
    fn owner_of(&self, id: ReceiptId) -> Result<Address>;
    fn transfer(&mut self, id: ReceiptId, to: Address) -> Result<()>;
}

/// in-memory receipt token book
#[derive(Debug, Default)]
pub struct ReceiptBook {
    owners: HashMap<ReceiptId, Address>,
}

impl ReceiptBook {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReceiptTokenService for ReceiptBook {
    fn mint(&mut self, owner: Address) -> ReceiptId {
        let id = Uuid::new_v4();
        self.owners.insert(id, owner);
        id
    }

    fn burn(&mut self, id: ReceiptId) -> Result<()> {
        self.owners
            .remove(&id)
            .map(|_| ())
            .ok_or(LoanError::UnknownReceipt { id })
    }

    fn owner_of(&self, id: ReceiptId) -> Result<Address> {
        self.owners
            .get(&id)
            .copied()
            .ok_or(LoanError::UnknownReceipt { id })
    }

    fn transfer(&mut self, id: ReceiptId, to: Address) -> Result<()> {
        match self.owners.get_mut(&id) {
            Some(owner) => {
                *owner = to;
                Ok(())
            }
            None => Err(LoanError::UnknownReceipt { id }),
        }
    }
}

/// one observed price of `base` denominated in `quote`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceQuote {
    pub price: Decimal,
    pub observed_at: DateTime<Utc>,
}

/// external price source consumed by the oracle proposal variant
pub trait ValuationOracle {
    fn price(&self, base: Address, quote: Address) -> Option<PriceQuote>;
}

/// fixed-price oracle for tests and simulations
#[derive(Debug, Default)]
pub struct StaticOracle {
    feeds: HashMap<(Address, Address), PriceQuote>,
}

impl StaticOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(
        &mut self,
        base: Address,
        quote: Address,
        price: Decimal,
        observed_at: DateTime<Utc>,
    ) {
        self.feeds
            .insert((base, quote), PriceQuote { price, observed_at });
    }
}

impl ValuationOracle for StaticOracle {
    fn price(&self, base: Address, quote: Address) -> Option<PriceQuote> {
        self.feeds.get(&(base, quote)).copied()
    }
}

/// the external services one engine operation works against
pub struct Collaborators<'a> {
    pub ledger: &'a mut dyn AssetTransfer,
    pub registry: &'a dyn CapabilityRegistry,
    pub receipts: &'a mut dyn ReceiptTokenService,
    pub oracle: &'a dyn ValuationOracle,
}
