use std::collections::{HashMap, HashSet};

use crate::errors::{LoanError, Result};
use crate::types::Address;

/// per-identity, per-space replay protection
///
/// Every proposal and extension commits to a `(space, nonce)` pair. A nonce
/// is usable iff its space is the owner's current space and it has not been
/// individually revoked; bumping the space pointer therefore invalidates
/// every outstanding nonce in the old space in O(1).
#[derive(Debug, Default)]
pub struct NonceAuthority {
    current_space: HashMap<Address, u64>,
    revoked: HashSet<(Address, u64, u64)>,
}

impl NonceAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    /// the space new nonces of this owner are issued in
    pub fn current_space(&self, owner: Address) -> u64 {
        self.current_space.get(&owner).copied().unwrap_or(0)
    }

    pub fn is_usable(&self, owner: Address, space: u64, nonce: u64) -> bool {
        space == self.current_space(owner) && !self.revoked.contains(&(owner, space, nonce))
    }

    /// consume a single nonce; a consumed nonce is consumed forever
    pub fn revoke(&mut self, owner: Address, space: u64, nonce: u64) -> Result<()> {
        if !self.revoked.insert((owner, space, nonce)) {
            return Err(LoanError::NonceAlreadyRevoked {
                owner,
                space,
                nonce,
            });
        }
        Ok(())
    }

    /// consume a nonce in the owner's current space
    pub fn revoke_current(&mut self, owner: Address, nonce: u64) -> Result<()> {
        let space = self.current_space(owner);
        self.revoke(owner, space, nonce)
    }

    /// bulk-revoke every nonce in the owner's current space; returns the
    /// new current space
    pub fn revoke_space(&mut self, owner: Address) -> u64 {
        let next = self.current_space(owner) + 1;
        self.current_space.insert(owner, next);
        next
    }

    /// undo a revocation when the enclosing operation aborts after the
    /// consumption point (the library equivalent of a ledger revert)
    pub(crate) fn restore(&mut self, owner: Address, space: u64, nonce: u64) {
        self.revoked.remove(&(owner, space, nonce));
    }
}
