use serde::{Deserialize, Serialize};

use crate::amount::{Amount, Apr};
use crate::errors::Result;
use crate::hashing::{structured_hash, Hash, SignatureDomain};
use crate::types::{Address, Asset};

use super::{
    check_acceptance, decode_json, encode_json, terms_for, AcceptContext, Acceptance,
    ProposalBase, ProposalVariant,
};

const TAG: &str = "simple-proposal";

/// proposal with literal terms: what you see is what you get
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleProposal {
    pub base: ProposalBase,
    pub collateral: Asset,
    pub credit_address: Address,
    pub credit_amount: Amount,
    pub fixed_interest: Amount,
    pub accruing_apr: Apr,
    pub duration_secs: u64,
}

impl SimpleProposal {
    pub fn proposal_hash(&self, domain: &SignatureDomain) -> Result<Hash> {
        structured_hash(domain, TAG, self)
    }
}

/// wire format exchanged off-ledger; the simple variant carries no
/// acceptor-supplied values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleProposalData {
    pub proposal: SimpleProposal,
}

impl SimpleProposalData {
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_json(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode_json(bytes)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SimpleVariant {
    address: Address,
}

impl SimpleVariant {
    pub fn new(address: Address) -> Self {
        Self { address }
    }
}

impl ProposalVariant for SimpleVariant {
    fn address(&self) -> Address {
        self.address
    }

    fn tag(&self) -> &'static str {
        TAG
    }

    fn accept(&self, ctx: &mut AcceptContext<'_>, data: &[u8]) -> Result<Acceptance> {
        let data = SimpleProposalData::decode(data)?;
        let proposal = data.proposal;
        let proposal_hash = proposal.proposal_hash(ctx.domain)?;

        let credit = Asset::fungible(proposal.credit_address, proposal.credit_amount);
        let terms = terms_for(
            &proposal.base,
            ctx.acceptor,
            proposal.collateral,
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
