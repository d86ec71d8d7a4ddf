use ed25519_dalek::{Signer, SigningKey, VerifyingKey};

use crate::errors::{LoanError, Result};
use crate::hashing::Hash;
use crate::types::Address;

/// detached Ed25519 signature over a domain-separated hash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; 64]);

/// sign a content hash with a proposer's key
pub fn sign(key: &SigningKey, hash: &Hash) -> Signature {
    Signature(key.sign(&hash.0).to_bytes())
}

/// the on-ledger identity corresponding to a signing key
pub fn signing_address(key: &SigningKey) -> Address {
    Address(key.verifying_key().to_bytes())
}

/// verify that `signer` authored `signature` over `hash`
///
/// Any failure (malformed key bytes included) maps to `InvalidSignature`
/// carrying the offending signer and hash.
pub fn verify(signer: Address, hash: &Hash, signature: &Signature) -> Result<()> {
    let invalid = || LoanError::InvalidSignature {
        signer,
        hash: *hash,
    };
    let key = VerifyingKey::from_bytes(&signer.0).map_err(|_| invalid())?;
    let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
    key.verify_strict(&hash.0, &sig).map_err(|_| invalid())
}
