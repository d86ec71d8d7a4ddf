use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::amount::Amount;
use crate::errors::{LoanError, Result};
use crate::hashing::{multiproposal_hash, Hash, MerkleProof, SignatureDomain};
use crate::nonce::NonceAuthority;
use crate::signature::{self, Signature};
use crate::types::Address;

/// everything `validate` needs to judge one acceptance of one proposal
#[derive(Debug)]
pub struct ValidationRequest<'a> {
    pub proposal_hash: Hash,
    pub proposer: Address,
    pub acceptor: Address,
    /// credit drawn by this acceptance
    pub credit_amount: Amount,
    /// 0 means single-use; nonzero means partially fillable up to the limit
    pub available_credit_limit: Amount,
    /// bucket shared between proposals drawing on one limit; a zero key
    /// defaults the bucket to the proposal hash
    pub utilized_credit_key: Hash,
    pub nonce_space: u64,
    pub nonce: u64,
    pub expiration: DateTime<Utc>,
    pub signature: Option<&'a Signature>,
    pub inclusion_proof: Option<&'a MerkleProof>,
}

/// record of what `validate` consumed, so an aborted operation can restore
/// authorization state exactly
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Consumption {
    Nonce {
        owner: Address,
        space: u64,
        nonce: u64,
    },
    Credit {
        bucket: (Address, Hash),
        amount: Amount,
    },
}

/// authenticity, replay, and credit-limit authority for proposals
///
/// This is the sole consumption point: a successful `validate` either
/// revokes the proposal's nonce (single-use) or increments its utilized
/// credit (partial fill), and it does so before any asset transfer in the
/// enclosing operation is attempted.
#[derive(Debug)]
pub struct ProposalAuthorization {
    domain: SignatureDomain,
    intents: HashMap<Hash, Address>,
    credit_used: HashMap<(Address, Hash), Amount>,
}

impl ProposalAuthorization {
    pub fn new(domain: SignatureDomain) -> Self {
        Self {
            domain,
            intents: HashMap::new(),
            credit_used: HashMap::new(),
        }
    }

    pub fn domain(&self) -> &SignatureDomain {
        &self.domain
    }

    /// mark a proposal as authentic by on-ledger submission: the proposer's
    /// own act of recording is the proof, no signature needed later
    pub fn record_intent(&mut self, proposer: Address, proposal_hash: Hash) {
        self.intents.insert(proposal_hash, proposer);
    }

    pub fn is_recorded(&self, proposal_hash: Hash, proposer: Address) -> bool {
        self.intents.get(&proposal_hash) == Some(&proposer)
    }

    /// cumulative credit drawn against a limit bucket
    pub fn credit_used(&self, proposer: Address, key: Hash) -> Amount {
        self.credit_used
            .get(&(proposer, key))
            .copied()
            .unwrap_or(0)
    }

    /// composite acceptance check; see module docs for the consumption
    /// side effect
    pub fn validate(
        &mut self,
        nonces: &mut NonceAuthority,
        now: DateTime<Utc>,
        req: &ValidationRequest<'_>,
    ) -> Result<()> {
        self.validate_consuming(nonces, now, req).map(|_| ())
    }

    pub(crate) fn validate_consuming(
        &mut self,
        nonces: &mut NonceAuthority,
        now: DateTime<Utc>,
        req: &ValidationRequest<'_>,
    ) -> Result<Consumption> {
        self.check_authenticity(req)?;

        if req.proposer == req.acceptor {
            return Err(LoanError::AcceptorIsProposer {
                address: req.acceptor,
            });
        }

        if now >= req.expiration {
            return Err(LoanError::Expired {
                current: now,
                expiration: req.expiration,
            });
        }

        if !nonces.is_usable(req.proposer, req.nonce_space, req.nonce) {
            return Err(LoanError::NonceNotUsable {
                owner: req.proposer,
                space: req.nonce_space,
                nonce: req.nonce,
            });
        }

        if req.available_credit_limit == 0 {
            // single-use: consume the nonce
            nonces.revoke(req.proposer, req.nonce_space, req.nonce)?;
            return Ok(Consumption::Nonce {
                owner: req.proposer,
                space: req.nonce_space,
                nonce: req.nonce,
            });
        }

        // partial fill: charge the shared limit bucket
        let key = if req.utilized_credit_key.is_zero() {
            req.proposal_hash
        } else {
            req.utilized_credit_key
        };
        let bucket = (req.proposer, key);
        let used = self.credit_used.get(&bucket).copied().unwrap_or(0);
        let requested = used.checked_add(req.credit_amount).ok_or_else(|| {
            LoanError::CalculationError {
                message: "utilized credit overflow".to_string(),
            }
        })?;
        if requested > req.available_credit_limit {
            return Err(LoanError::AvailableCreditLimitExceeded {
                used,
                requested: req.credit_amount,
                limit: req.available_credit_limit,
            });
        }
        self.credit_used.insert(bucket, requested);
        Ok(Consumption::Credit {
            bucket,
            amount: req.credit_amount,
        })
    }

    fn check_authenticity(&self, req: &ValidationRequest<'_>) -> Result<()> {
        // on-ledger recorded intent
        if self.is_recorded(req.proposal_hash, req.proposer) {
            return Ok(());
        }
        // individually signed proposal
        if let Some(sig) = req.signature {
            if req.inclusion_proof.is_none() {
                return signature::verify(req.proposer, &req.proposal_hash, sig);
            }
            // signed batch: the hash must be a leaf of a signed root
            if let Some(proof) = req.inclusion_proof {
                let root = proof.compute_root(req.proposal_hash);
                let signed = multiproposal_hash(&self.domain, root)?;
                return signature::verify(req.proposer, &signed, sig);
            }
        }
        Err(LoanError::InvalidSignature {
            signer: req.proposer,
            hash: req.proposal_hash,
        })
    }

    /// restore consumed state when the enclosing operation aborts after
    /// the consumption point
    pub(crate) fn rollback(&mut self, nonces: &mut NonceAuthority, consumption: Consumption) {
        match consumption {
            Consumption::Nonce {
                owner,
                space,
                nonce,
            } => nonces.restore(owner, space, nonce),
            Consumption::Credit { bucket, amount } => {
                if let Some(used) = self.credit_used.get_mut(&bucket) {
                    *used = used.saturating_sub(amount);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::{hash_bytes, merkle_root};
    use crate::signature::{sign, signing_address};
    use chrono::{Duration, TimeZone};
    use ed25519_dalek::SigningKey;

    fn domain() -> SignatureDomain {
        SignatureDomain::new(1, Address([9u8; 32]))
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn keypair(seed: u8) -> (SigningKey, Address) {
        let key = SigningKey::from_bytes(&[seed; 32]);
        let address = signing_address(&key);
        (key, address)
    }

    fn request<'a>(
        hash: Hash,
        proposer: Address,
        acceptor: Address,
        signature: Option<&'a Signature>,
    ) -> ValidationRequest<'a> {
        ValidationRequest {
            proposal_hash: hash,
            proposer,
            acceptor,
            credit_amount: 100,
            available_credit_limit: 0,
            utilized_credit_key: Hash::ZERO,
            nonce_space: 0,
            nonce: 1,
            expiration: now() + Duration::days(1),
            signature,
            inclusion_proof: None,
        }
    }

    #[test]
    fn test_recorded_intent_authenticates() {
        let mut auth = ProposalAuthorization::new(domain());
        let mut nonces = NonceAuthority::new();
        let (_, proposer) = keypair(1);
        let acceptor = Address([2u8; 32]);
        let hash = hash_bytes(b"proposal");

        auth.record_intent(proposer, hash);
        auth.validate(&mut nonces, now(), &request(hash, proposer, acceptor, None))
            .unwrap();
    }

    #[test]
    fn test_signed_proposal_authenticates() {
        let mut auth = ProposalAuthorization::new(domain());
        let mut nonces = NonceAuthority::new();
        let (key, proposer) = keypair(1);
        let acceptor = Address([2u8; 32]);
        let hash = hash_bytes(b"proposal");
        let sig = sign(&key, &hash);

        auth.validate(
            &mut nonces,
            now(),
            &request(hash, proposer, acceptor, Some(&sig)),
        )
        .unwrap();
    }

    #[test]
    fn test_unsigned_unrecorded_rejected() {
        let mut auth = ProposalAuthorization::new(domain());
        let mut nonces = NonceAuthority::new();
        let (_, proposer) = keypair(1);
        let acceptor = Address([2u8; 32]);
        let hash = hash_bytes(b"proposal");

        let err = auth
            .validate(&mut nonces, now(), &request(hash, proposer, acceptor, None))
            .unwrap_err();
        assert_eq!(
            err,
            LoanError::InvalidSignature {
                signer: proposer,
                hash
            }
        );
    }

    #[test]
    fn test_batch_signature_authenticates_every_leaf() {
        let mut auth = ProposalAuthorization::new(domain());
        let mut nonces = NonceAuthority::new();
        let (key, proposer) = keypair(1);
        let acceptor = Address([2u8; 32]);

        let leaves: Vec<Hash> = (0u8..4).map(|i| hash_bytes(&[i])).collect();
        let root = merkle_root(&leaves);
        let signed = multiproposal_hash(&domain(), root).unwrap();
        let sig = sign(&key, &signed);

        // prove leaf 1: sibling leaf 0, then the other pair's parent
        let other_parent = crate::hashing::hash_pair(leaves[2], leaves[3]);
        let proof = MerkleProof::new(vec![leaves[0], other_parent]);

        let mut req = request(leaves[1], proposer, acceptor, Some(&sig));
        req.inclusion_proof = Some(&proof);
        auth.validate(&mut nonces, now(), &req).unwrap();

        // a leaf outside the tree does not verify
        let mut bad = request(hash_bytes(b"forged"), proposer, acceptor, Some(&sig));
        bad.inclusion_proof = Some(&proof);
        bad.nonce = 2;
        assert!(matches!(
            auth.validate(&mut nonces, now(), &bad),
            Err(LoanError::InvalidSignature { .. })
        ));
    }

    #[test]
    fn test_acceptor_must_differ_from_proposer() {
        let mut auth = ProposalAuthorization::new(domain());
        let mut nonces = NonceAuthority::new();
        let (_, proposer) = keypair(1);
        let hash = hash_bytes(b"proposal");
        auth.record_intent(proposer, hash);

        let err = auth
            .validate(&mut nonces, now(), &request(hash, proposer, proposer, None))
            .unwrap_err();
        assert_eq!(err, LoanError::AcceptorIsProposer { address: proposer });
    }

    #[test]
    fn test_expired_proposal_rejected() {
        let mut auth = ProposalAuthorization::new(domain());
        let mut nonces = NonceAuthority::new();
        let (_, proposer) = keypair(1);
        let acceptor = Address([2u8; 32]);
        let hash = hash_bytes(b"proposal");
        auth.record_intent(proposer, hash);

        let mut req = request(hash, proposer, acceptor, None);
        req.expiration = now() - Duration::seconds(1);
        assert!(matches!(
            auth.validate(&mut nonces, now(), &req),
            Err(LoanError::Expired { .. })
        ));

        // expiration is exclusive: at exactly the deadline the proposal is dead
        let mut at = request(hash, proposer, acceptor, None);
        at.expiration = now();
        assert!(matches!(
            auth.validate(&mut nonces, now(), &at),
            Err(LoanError::Expired { .. })
        ));
    }

    #[test]
    fn test_single_use_consumes_nonce() {
        let mut auth = ProposalAuthorization::new(domain());
        let mut nonces = NonceAuthority::new();
        let (_, proposer) = keypair(1);
        let acceptor = Address([2u8; 32]);
        let hash = hash_bytes(b"proposal");
        auth.record_intent(proposer, hash);

        auth.validate(&mut nonces, now(), &request(hash, proposer, acceptor, None))
            .unwrap();
        assert!(!nonces.is_usable(proposer, 0, 1));

        // second use of the same nonce fails
        let err = auth
            .validate(&mut nonces, now(), &request(hash, proposer, acceptor, None))
            .unwrap_err();
        assert_eq!(
            err,
            LoanError::NonceNotUsable {
                owner: proposer,
                space: 0,
                nonce: 1
            }
        );
    }

    #[test]
    fn test_partial_fill_tracks_credit_and_keeps_nonce() {
        let mut auth = ProposalAuthorization::new(domain());
        let mut nonces = NonceAuthority::new();
        let (_, proposer) = keypair(1);
        let acceptor = Address([2u8; 32]);
        let hash = hash_bytes(b"proposal");
        auth.record_intent(proposer, hash);

        let mut req = request(hash, proposer, acceptor, None);
        req.available_credit_limit = 250;
        req.credit_amount = 100;

        auth.validate(&mut nonces, now(), &req).unwrap();
        auth.validate(&mut nonces, now(), &req).unwrap();
        assert_eq!(auth.credit_used(proposer, hash), 200);
        assert!(nonces.is_usable(proposer, 0, 1));

        // a third fill would exceed the limit
        let err = auth.validate(&mut nonces, now(), &req).unwrap_err();
        assert_eq!(
            err,
            LoanError::AvailableCreditLimitExceeded {
                used: 200,
                requested: 100,
                limit: 250
            }
        );
        assert_eq!(auth.credit_used(proposer, hash), 200);
    }

    #[test]
    fn test_shared_credit_bucket() {
        let mut auth = ProposalAuthorization::new(domain());
        let mut nonces = NonceAuthority::new();
        let (_, proposer) = keypair(1);
        let acceptor = Address([2u8; 32]);
        let shared_key = hash_bytes(b"bucket");

        let hash_a = hash_bytes(b"proposal-a");
        let hash_b = hash_bytes(b"proposal-b");
        auth.record_intent(proposer, hash_a);
        auth.record_intent(proposer, hash_b);

        let mut a = request(hash_a, proposer, acceptor, None);
        a.available_credit_limit = 150;
        a.utilized_credit_key = shared_key;
        a.credit_amount = 100;
        auth.validate(&mut nonces, now(), &a).unwrap();

        let mut b = request(hash_b, proposer, acceptor, None);
        b.available_credit_limit = 150;
        b.utilized_credit_key = shared_key;
        b.credit_amount = 100;
        b.nonce = 2;
        let err = auth.validate(&mut nonces, now(), &b).unwrap_err();
        assert_eq!(
            err,
            LoanError::AvailableCreditLimitExceeded {
                used: 100,
                requested: 100,
                limit: 150
            }
        );
    }

    #[test]
    fn test_rollback_restores_consumption() {
        let mut auth = ProposalAuthorization::new(domain());
        let mut nonces = NonceAuthority::new();
        let (_, proposer) = keypair(1);
        let acceptor = Address([2u8; 32]);
        let hash = hash_bytes(b"proposal");
        auth.record_intent(proposer, hash);

        let consumption = auth
            .validate_consuming(&mut nonces, now(), &request(hash, proposer, acceptor, None))
            .unwrap();
        assert!(!nonces.is_usable(proposer, 0, 1));

        auth.rollback(&mut nonces, consumption);
        assert!(nonces.is_usable(proposer, 0, 1));

        // partial fill rollback
        let mut req = request(hash, proposer, acceptor, None);
        req.available_credit_limit = 200;
        req.credit_amount = 80;
        let consumption = auth
            .validate_consuming(&mut nonces, now(), &req)
            .unwrap();
        assert_eq!(auth.credit_used(proposer, hash), 80);
        auth.rollback(&mut nonces, consumption);
        assert_eq!(auth.credit_used(proposer, hash), 0);
    }
}
