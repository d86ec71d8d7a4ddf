use std::collections::HashMap;

use crate::amount::Amount;
use crate::errors::{LoanError, Result};
use crate::types::{Address, Asset};

/// asset movement primitive consumed by the loan engine
///
/// Implementations are untrusted: every movement the engine issues is
/// delta-checked against `balance_of` so a ledger that skims part of a
/// transfer fails the operation instead of silently shorting a party.
pub trait AssetTransfer {
    fn balance_of(&self, owner: Address, asset: &Asset) -> Amount;

    fn transfer(&mut self, from: Address, to: Address, asset: &Asset) -> Result<()>;

    /// draw credit out of a pool-style source of funds via its adapter
    fn withdraw_from_pool(
        &mut self,
        asset: &Asset,
        adapter: Address,
        pool: Address,
        to: Address,
    ) -> Result<()>;

    /// return credit into a pool-style source of funds via its adapter
    fn supply_to_pool(
        &mut self,
        asset: &Asset,
        adapter: Address,
        pool: Address,
        from: Address,
    ) -> Result<()>;
}

/// one executed asset movement, recorded so an aborted settlement can be
/// unwound in reverse order
#[derive(Debug, Clone, PartialEq, Eq)]
enum TransferLeg {
    Transfer {
        from: Address,
        to: Address,
        asset: Asset,
    },
    PoolWithdraw {
        asset: Asset,
        adapter: Address,
        pool: Address,
        to: Address,
    },
    PoolSupply {
        asset: Asset,
        adapter: Address,
        pool: Address,
        from: Address,
    },
}

/// log of executed settlement legs for a single operation
#[derive(Debug, Default)]
pub struct TransferLog {
    legs: Vec<TransferLeg>,
}

impl TransferLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }

    /// undo every recorded leg, most recent first
    ///
    /// The unwind path moves assets back to where this log took them from,
    /// so individual inverse failures are not propagated.
    pub fn unwind(self, ledger: &mut dyn AssetTransfer) {
        for leg in self.legs.into_iter().rev() {
            let _ = match leg {
                TransferLeg::Transfer { from, to, asset } => ledger.transfer(to, from, &asset),
                TransferLeg::PoolWithdraw {
                    asset,
                    adapter,
                    pool,
                    to,
                } => ledger.supply_to_pool(&asset, adapter, pool, to),
                TransferLeg::PoolSupply {
                    asset,
                    adapter,
                    pool,
                    from,
                } => ledger.withdraw_from_pool(&asset, adapter, pool, from),
            };
        }
    }
}

/// delta-checked transfer from one party to another
pub fn push_from(
    ledger: &mut dyn AssetTransfer,
    log: &mut TransferLog,
    from: Address,
    to: Address,
    asset: &Asset,
) -> Result<()> {
    if asset.amount == 0 || from == to {
        return Ok(());
    }
    let before = ledger.balance_of(to, asset);
    ledger.transfer(from, to, asset)?;
    let received = ledger.balance_of(to, asset).saturating_sub(before);
    if received != asset.amount {
        return Err(LoanError::IncompleteTransfer {
            asset: *asset,
            expected: asset.amount,
            actual: received,
        });
    }
    log.legs.push(TransferLeg::Transfer {
        from,
        to,
        asset: *asset,
    });
    Ok(())
}

/// delta-checked pool withdrawal
pub fn withdraw_from_pool(
    ledger: &mut dyn AssetTransfer,
    log: &mut TransferLog,
    asset: &Asset,
    adapter: Address,
    pool: Address,
    to: Address,
) -> Result<()> {
    if asset.amount == 0 {
        return Ok(());
    }
    let before = ledger.balance_of(to, asset);
    ledger.withdraw_from_pool(asset, adapter, pool, to)?;
    let received = ledger.balance_of(to, asset).saturating_sub(before);
    if received != asset.amount {
        return Err(LoanError::IncompleteTransfer {
            asset: *asset,
            expected: asset.amount,
            actual: received,
        });
    }
    log.legs.push(TransferLeg::PoolWithdraw {
        asset: *asset,
        adapter,
        pool,
        to,
    });
    Ok(())
}

/// delta-checked pool supply
pub fn supply_to_pool(
    ledger: &mut dyn AssetTransfer,
    log: &mut TransferLog,
    asset: &Asset,
    adapter: Address,
    pool: Address,
    from: Address,
) -> Result<()> {
    if asset.amount == 0 {
        return Ok(());
    }
    let before = ledger.balance_of(pool, asset);
    ledger.supply_to_pool(asset, adapter, pool, from)?;
    let received = ledger.balance_of(pool, asset).saturating_sub(before);
    if received != asset.amount {
        return Err(LoanError::IncompleteTransfer {
            asset: *asset,
            expected: asset.amount,
            actual: received,
        });
    }
    log.legs.push(TransferLeg::PoolSupply {
        asset: *asset,
        adapter,
        pool,
        from,
    });
    Ok(())
}

/// in-memory asset ledger keyed by (contract, token id, owner)
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    balances: HashMap<(Address, u128, Address), Amount>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mint(&mut self, owner: Address, asset: &Asset) {
        *self
            .balances
            .entry((asset.address, asset.token_id, owner))
            .or_insert(0) += asset.amount;
    }

    fn move_balance(&mut self, from: Address, to: Address, asset: &Asset) -> Result<()> {
        let from_key = (asset.address, asset.token_id, from);
        let available = self.balances.get(&from_key).copied().unwrap_or(0);
        if available < asset.amount {
            return Err(LoanError::InsufficientBalance {
                available,
                requested: asset.amount,
            });
        }
        self.balances.insert(from_key, available - asset.amount);
        *self
            .balances
            .entry((asset.address, asset.token_id, to))
            .or_insert(0) += asset.amount;
        Ok(())
    }
}

impl AssetTransfer for InMemoryLedger {
    fn balance_of(&self, owner: Address, asset: &Asset) -> Amount {
        self.balances
            .get(&(asset.address, asset.token_id, owner))
            .copied()
            .unwrap_or(0)
    }

    fn transfer(&mut self, from: Address, to: Address, asset: &Asset) -> Result<()> {
        self.move_balance(from, to, asset)
    }

    fn withdraw_from_pool(
        &mut self,
        asset: &Asset,
        _adapter: Address,
        pool: Address,
        to: Address,
    ) -> Result<()> {
        self.move_balance(pool, to, asset)
    }

    fn supply_to_pool(
        &mut self,
        asset: &Asset,
        _adapter: Address,
        pool: Address,
        from: Address,
    ) -> Result<()> {
        self.move_balance(from, pool, asset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> Address {
        Address([1u8; 32])
    }

    fn alice() -> Address {
        Address([2u8; 32])
    }

    fn bob() -> Address {
        Address([3u8; 32])
    }

    #[test]
    fn test_transfer_moves_balance() {
        let mut ledger = InMemoryLedger::new();
        let asset = Asset::fungible(token(), 100);
        ledger.mint(alice(), &asset);

        let mut log = TransferLog::new();
        push_from(&mut ledger, &mut log, alice(), bob(), &asset.with_amount(40)).unwrap();
        assert_eq!(ledger.balance_of(alice(), &asset), 60);
        assert_eq!(ledger.balance_of(bob(), &asset), 40);
    }

    #[test]
    fn test_insufficient_balance() {
        let mut ledger = InMemoryLedger::new();
        let asset = Asset::fungible(token(), 100);
        ledger.mint(alice(), &asset.with_amount(10));

        let mut log = TransferLog::new();
        let err = push_from(&mut ledger, &mut log, alice(), bob(), &asset).unwrap_err();
        assert_eq!(
            err,
            LoanError::InsufficientBalance {
                available: 10,
                requested: 100
            }
        );
    }

    #[test]
    fn test_self_transfer_is_a_noop() {
        let mut ledger = InMemoryLedger::new();
        let asset = Asset::fungible(token(), 100);
        ledger.mint(alice(), &asset);

        let mut log = TransferLog::new();
        push_from(&mut ledger, &mut log, alice(), alice(), &asset).unwrap();
        assert_eq!(ledger.balance_of(alice(), &asset), 100);
        assert!(log.is_empty());
    }

    #[test]
    fn test_unwind_restores_balances() {
        let mut ledger = InMemoryLedger::new();
        let asset = Asset::fungible(token(), 100);
        ledger.mint(alice(), &asset);

        let mut log = TransferLog::new();
        push_from(&mut ledger, &mut log, alice(), bob(), &asset.with_amount(30)).unwrap();
        push_from(&mut ledger, &mut log, bob(), alice(), &asset.with_amount(5)).unwrap();

        log.unwind(&mut ledger);
        assert_eq!(ledger.balance_of(alice(), &asset), 100);
        assert_eq!(ledger.balance_of(bob(), &asset), 0);
    }

    #[test]
    fn test_pool_roundtrip_and_unwind() {
        let mut ledger = InMemoryLedger::new();
        let asset = Asset::fungible(token(), 500);
        let pool = Address([7u8; 32]);
        let adapter = Address([8u8; 32]);
        ledger.mint(pool, &asset);

        let mut log = TransferLog::new();
        withdraw_from_pool(
            &mut ledger,
            &mut log,
            &asset.with_amount(200),
            adapter,
            pool,
            alice(),
        )
        .unwrap();
        assert_eq!(ledger.balance_of(alice(), &asset), 200);
        assert_eq!(ledger.balance_of(pool, &asset), 300);

        log.unwind(&mut ledger);
        assert_eq!(ledger.balance_of(alice(), &asset), 0);
        assert_eq!(ledger.balance_of(pool, &asset), 500);
    }

    /// a ledger that delivers one unit less than requested
    struct SkimmingLedger(InMemoryLedger);

    impl AssetTransfer for SkimmingLedger {
        fn balance_of(&self, owner: Address, asset: &Asset) -> Amount {
            self.0.balance_of(owner, asset)
        }

        fn transfer(&mut self, from: Address, to: Address, asset: &Asset) -> Result<()> {
            self.0.transfer(from, to, &asset.with_amount(asset.amount - 1))
        }

        fn withdraw_from_pool(
            &mut self,
            asset: &Asset,
            adapter: Address,
            pool: Address,
            to: Address,
        ) -> Result<()> {
            self.0
                .withdraw_from_pool(&asset.with_amount(asset.amount - 1), adapter, pool, to)
        }

        fn supply_to_pool(
            &mut self,
            asset: &Asset,
            adapter: Address,
            pool: Address,
            from: Address,
        ) -> Result<()> {
            self.0
                .supply_to_pool(&asset.with_amount(asset.amount - 1), adapter, pool, from)
        }
    }

    #[test]
    fn test_skimming_ledger_fails_delta_check() {
        let mut ledger = SkimmingLedger(InMemoryLedger::new());
        let asset = Asset::fungible(token(), 100);
        ledger.0.mint(alice(), &asset);

        let mut log = TransferLog::new();
        let err = push_from(&mut ledger, &mut log, alice(), bob(), &asset).unwrap_err();
        assert_eq!(
            err,
            LoanError::IncompleteTransfer {
                asset,
                expected: 100,
                actual: 99
            }
        );
        assert!(log.is_empty());
    }
}
