use serde::{Deserialize, Serialize};

use crate::amount::{Amount, Apr};
use crate::errors::{LoanError, Result};
use crate::hashing::{hash_bytes, structured_hash, Hash, MerkleProof, SignatureDomain};
use crate::types::{Address, Asset, AssetKind};

use super::{
    check_acceptance, decode_json, encode_json, terms_for, AcceptContext, Acceptance,
    ProposalBase, ProposalVariant,
};

const TAG: &str = "list-proposal";

/// proposal over a merkle-committed whitelist of collateral token ids
///
/// The proposer commits to a root over the acceptable ids; the acceptor
/// picks one and proves its inclusion. An absent root leaves the choice
/// unrestricted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListProposal {
    pub base: ProposalBase,
    pub collateral_kind: AssetKind,
    pub collateral_address: Address,
    pub collateral_amount: Amount,
    pub collateral_ids_root: Option<Hash>,
    pub credit_address: Address,
    pub credit_amount: Amount,
    pub fixed_interest: Amount,
    pub accruing_apr: Apr,
    pub duration_secs: u64,
}

impl ListProposal {
    pub fn proposal_hash(&self, domain: &SignatureDomain) -> Result<Hash> {
        structured_hash(domain, TAG, self)
    }
}

/// acceptor-supplied collateral choice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListValues {
    pub collateral_id: u128,
    pub inclusion_proof: MerkleProof,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListProposalData {
    pub proposal: ListProposal,
    pub values: ListValues,
}

impl ListProposalData {
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_json(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode_json(bytes)
    }
}

/// whitelist leaf of one collateral id
pub(crate) fn collateral_id_leaf(id: u128) -> Hash {
    hash_bytes(&id.to_be_bytes())
}

#[derive(Debug, Clone, Copy)]
pub struct ListVariant {
    address: Address,
}

impl ListVariant {
    pub fn new(address: Address) -> Self {
        Self { address }
    }
}

impl ProposalVariant for ListVariant {
    fn address(&self) -> Address {
        self.address
    }

    fn tag(&self) -> &'static str {
        TAG
    }

    fn accept(&self, ctx: &mut AcceptContext<'_>, data: &[u8]) -> Result<Acceptance> {
        let data = ListProposalData::decode(data)?;
        let proposal = data.proposal;
        let values = data.values;
        let proposal_hash = proposal.proposal_hash(ctx.domain)?;

        if let Some(root) = proposal.collateral_ids_root {
            let leaf = collateral_id_leaf(values.collateral_id);
            if values.inclusion_proof.compute_root(leaf) != root {
                return Err(LoanError::CollateralIdNotWhitelisted {
                    id: values.collateral_id,
                });
            }
        }

        let collateral = Asset {
            kind: proposal.collateral_kind,
            address: proposal.collateral_address,
            token_id: values.collateral_id,
            amount: proposal.collateral_amount,
        };
        let credit = Asset::fungible(proposal.credit_address, proposal.credit_amount);
        let terms = terms_for(
            &proposal.base,
            ctx.acceptor,
            collateral,
            credit,
            proposal.fixed_interest,
            proposal.accruing_apr,
            proposal.duration_secs,
        );

        let consumption = check_acceptance(&proposal.base, proposal_hash, credit.amount, ctx)?;
        Ok(Acceptance {
            proposal_hash,
            terms,
            refinancing_loan_id: ctx.refinancing_loan,
            consumption,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::{hash_pair, merkle_root};
    use crate::proposals::harness::Harness;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn engine() -> Address {
        Address([9u8; 32])
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn proposal(root: Option<Hash>) -> ListProposal {
        ListProposal {
            base: ProposalBase {
                proposer: Address([1u8; 32]),
                is_offer: true,
                lender_spec_hash: Hash::ZERO,
                allowed_acceptor: None,
                refinancing_loan_id: None,
                available_credit_limit: 0,
                utilized_credit_key: Hash::ZERO,
                expiration: now() + Duration::days(1),
                nonce_space: 0,
                nonce: 1,
                loan_engine: engine(),
            },
            collateral_kind: AssetKind::Unique,
            collateral_address: Address([3u8; 32]),
            collateral_amount: 1,
            collateral_ids_root: root,
            credit_address: Address([4u8; 32]),
            credit_amount: 500,
            fixed_interest: 25,
            accruing_apr: Apr::ZERO,
            duration_secs: 14 * 86_400,
        }
    }

    fn accept(proposal: ListProposal, values: ListValues) -> Result<Acceptance> {
        let mut harness = Harness::new(engine());
        let hash = proposal.proposal_hash(&harness.domain).unwrap();
        harness.record_intent(proposal.base.proposer, hash);
        let data = ListProposalData { proposal, values }.encode().unwrap();
        let mut ctx = harness.context(Address([2u8; 32]), now());
        ListVariant::new(Address([8u8; 32])).accept(&mut ctx, &data)
    }

    #[test]
    fn test_whitelisted_id_accepted() {
        let ids = [11u128, 22, 33, 44];
        let leaves: Vec<Hash> = ids.iter().map(|id| collateral_id_leaf(*id)).collect();
        let root = merkle_root(&leaves);

        // prove id 33 (leaf index 2)
        let proof = MerkleProof::new(vec![leaves[3], hash_pair(leaves[0], leaves[1])]);
        let acceptance = accept(
            proposal(Some(root)),
            ListValues {
                collateral_id: 33,
                inclusion_proof: proof,
            },
        )
        .unwrap();
        assert_eq!(acceptance.terms.collateral.token_id, 33);
        assert_eq!(acceptance.terms.collateral.kind, AssetKind::Unique);
    }

    #[test]
    fn test_unlisted_id_rejected() {
        let leaves: Vec<Hash> = [11u128, 22].iter().map(|id| collateral_id_leaf(*id)).collect();
        let root = merkle_root(&leaves);

        let err = accept(
            proposal(Some(root)),
            ListValues {
                collateral_id: 99,
                inclusion_proof: MerkleProof::new(vec![leaves[1]]),
            },
        )
        .unwrap_err();
        assert_eq!(err, LoanError::CollateralIdNotWhitelisted { id: 99 });
    }

    #[test]
    fn test_absent_root_is_unrestricted() {
        let acceptance = accept(
            proposal(None),
            ListValues {
                collateral_id: 123_456,
                inclusion_proof: MerkleProof::default(),
            },
        )
        .unwrap();
        assert_eq!(acceptance.terms.collateral.token_id, 123_456);
    }

    #[test]
    fn test_single_id_whitelist() {
        let leaf = collateral_id_leaf(7);
        let root = merkle_root(&[leaf]);
        let acceptance = accept(
            proposal(Some(root)),
            ListValues {
                collateral_id: 7,
                inclusion_proof: MerkleProof::default(),
            },
        )
        .unwrap();
        assert_eq!(acceptance.terms.collateral.token_id, 7);
    }
}
