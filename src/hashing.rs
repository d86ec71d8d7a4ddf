use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::errors::{LoanError, Result};
use crate::types::Address;

/// a 32-byte content hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    pub const ZERO: Hash = Hash([0u8; 32]);

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// domain separator for the structured hashing scheme
///
/// Binds every hash to the scheme name and version, the network, and the
/// concrete engine instance, so a signature can never be replayed against a
/// different deployment, proposal variant, or network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureDomain {
    pub scheme: String,
    pub version: String,
    pub network_id: u64,
    pub engine: Address,
}

impl SignatureDomain {
    pub const SCHEME: &'static str = "loan-protocol";
    pub const VERSION: &'static str = "1.0";

    pub fn new(network_id: u64, engine: Address) -> Self {
        Self {
            scheme: Self::SCHEME.to_string(),
            version: Self::VERSION.to_string(),
            network_id,
            engine,
        }
    }

    fn absorb(&self, hasher: &mut Sha256) {
        absorb_bytes(hasher, self.scheme.as_bytes());
        absorb_bytes(hasher, self.version.as_bytes());
        hasher.update(self.network_id.to_be_bytes());
        hasher.update(self.engine.0);
    }
}

fn absorb_bytes(hasher: &mut Sha256, bytes: &[u8]) {
    // length-prefixed so adjacent fields cannot be reparsed into each other
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

/// deterministic content hash of a structured value under a domain and type tag
///
/// The value's canonical JSON encoding is hashed; struct field order makes
/// the encoding deterministic for a given type.
pub fn structured_hash<T: Serialize>(
    domain: &SignatureDomain,
    type_tag: &str,
    value: &T,
) -> Result<Hash> {
    let body = serde_json::to_vec(value).map_err(|err| LoanError::CalculationError {
        message: format!("hash serialization failed: {}", err),
    })?;
    let mut hasher = Sha256::new();
    domain.absorb(&mut hasher);
    absorb_bytes(&mut hasher, type_tag.as_bytes());
    absorb_bytes(&mut hasher, &body);
    Ok(Hash(hasher.finalize().into()))
}

/// hash of a signed batch root: one signature over this value authorizes
/// every proposal proven to be a leaf of `root`
pub fn multiproposal_hash(domain: &SignatureDomain, root: Hash) -> Result<Hash> {
    structured_hash(domain, "multiproposal", &root)
}

/// hash raw bytes (merkle leaves)
pub fn hash_bytes(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    Hash(hasher.finalize().into())
}

/// commutative parent hash of two merkle nodes
pub fn hash_pair(a: Hash, b: Hash) -> Hash {
    let (lo, hi) = if a.0 <= b.0 { (a, b) } else { (b, a) };
    let mut hasher = Sha256::new();
    hasher.update(lo.0);
    hasher.update(hi.0);
    Hash(hasher.finalize().into())
}

/// merkle inclusion proof: sibling hashes from leaf to root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MerkleProof {
    pub siblings: Vec<Hash>,
}

impl MerkleProof {
    pub fn new(siblings: Vec<Hash>) -> Self {
        Self { siblings }
    }

    /// fold the proof over a leaf; inclusion holds iff the result equals
    /// the committed root
    pub fn compute_root(&self, leaf: Hash) -> Hash {
        self.siblings
            .iter()
            .fold(leaf, |node, sibling| hash_pair(node, *sibling))
    }
}

/// build a merkle root over leaves with commutative pair hashing,
/// duplicating the last node on odd levels
pub fn merkle_root(leaves: &[Hash]) -> Hash {
    if leaves.is_empty() {
        return Hash::ZERO;
    }
    let mut level = leaves.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let parent = if pair.len() == 2 {
                hash_pair(pair[0], pair[1])
            } else {
                hash_pair(pair[0], pair[0])
            };
            next.push(parent);
        }
        level = next;
    }
    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain() -> SignatureDomain {
        SignatureDomain::new(1, Address([9u8; 32]))
    }

    #[test]
    fn test_structured_hash_is_deterministic() {
        let d = domain();
        let a = structured_hash(&d, "simple-proposal", &(1u64, "x")).unwrap();
        let b = structured_hash(&d, "simple-proposal", &(1u64, "x")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_domain_separation() {
        let value = (42u64, "terms");
        let base = structured_hash(&domain(), "simple-proposal", &value).unwrap();

        let other_network = SignatureDomain::new(2, Address([9u8; 32]));
        assert_ne!(
            base,
            structured_hash(&other_network, "simple-proposal", &value).unwrap()
        );

        let other_engine = SignatureDomain::new(1, Address([8u8; 32]));
        assert_ne!(
            base,
            structured_hash(&other_engine, "simple-proposal", &value).unwrap()
        );

        assert_ne!(
            base,
            structured_hash(&domain(), "list-proposal", &value).unwrap()
        );
    }

    #[test]
    fn test_pair_hash_is_commutative() {
        let a = hash_bytes(b"a");
        let b = hash_bytes(b"b");
        assert_eq!(hash_pair(a, b), hash_pair(b, a));
    }

    #[test]
    fn test_merkle_inclusion() {
        let leaves: Vec<Hash> = (0u8..5).map(|i| hash_bytes(&[i])).collect();
        let root = merkle_root(&leaves);

        // proof for leaf 2 in a 5-leaf tree:
        // level 0: [0 1] [2 3] [4 4]
        // level 1: [01 23] [44 44]
        // level 2: [0123 4444]
        let l01 = hash_pair(leaves[0], leaves[1]);
        let l44 = hash_pair(leaves[4], leaves[4]);
        let l4444 = hash_pair(l44, l44);
        let proof = MerkleProof::new(vec![leaves[3], l01, l4444]);
        assert_eq!(proof.compute_root(leaves[2]), root);

        // wrong leaf does not verify
        assert_ne!(proof.compute_root(leaves[0]), root);
    }

    #[test]
    fn test_empty_proof_is_identity() {
        let leaf = hash_bytes(b"only");
        assert_eq!(MerkleProof::default().compute_root(leaf), leaf);
    }
}
