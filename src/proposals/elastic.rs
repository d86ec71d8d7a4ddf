use serde::{Deserialize, Serialize};

use crate::amount::{mul_div_floor, Amount, Apr};
use crate::errors::{LoanError, Result};
use crate::hashing::{structured_hash, Hash, SignatureDomain};
use crate::types::{Address, Asset};

use super::{
    check_acceptance, decode_json, encode_json, terms_for, AcceptContext, Acceptance,
    ProposalBase, ProposalVariant,
};

const TAG: &str = "elastic-proposal";

/// fixed-point scale of the credit-per-collateral-unit ratio
///
/// 18 decimal places leave room in `u128` for ratios up to ~3.4 * 10^20
/// credit units per collateral unit.
pub const ELASTIC_SCALE: u128 = 10u128.pow(18);

/// proposal defining a price ratio instead of a fixed size
///
/// The acceptor picks the credit amount; the collateral quantity follows
/// from the committed ratio. Naturally combined with a nonzero credit
/// limit so one proposal serves many partial fills.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElasticProposal {
    pub base: ProposalBase,
    pub collateral_address: Address,
    pub credit_address: Address,
    /// credit units per collateral unit, scaled by `ELASTIC_SCALE`
    pub credit_per_collateral_unit: Amount,
    pub min_credit_amount: Amount,
    pub fixed_interest: Amount,
    pub accruing_apr: Apr,
    pub duration_secs: u64,
}

impl ElasticProposal {
    pub fn proposal_hash(&self, domain: &SignatureDomain) -> Result<Hash> {
        structured_hash(domain, TAG, self)
    }

    /// collateral quantity backing a chosen credit amount
    pub fn collateral_amount(&self, credit_amount: Amount) -> Result<Amount> {
        if self.credit_per_collateral_unit == 0 {
            return Err(LoanError::InvalidCreditPerCollateralUnit);
        }
        mul_div_floor(credit_amount, ELASTIC_SCALE, self.credit_per_collateral_unit)
    }
}

/// acceptor-supplied fill size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElasticValues {
    pub credit_amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElasticProposalData {
    pub proposal: ElasticProposal,
    pub values: ElasticValues,
}

impl ElasticProposalData {
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_json(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode_json(bytes)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ElasticVariant {
    address: Address,
}

impl ElasticVariant {
    pub fn new(address: Address) -> Self {
        Self { address }
    }
}

impl ProposalVariant for ElasticVariant {
    fn address(&self) -> Address {
        self.address
    }

    fn tag(&self) -> &'static str {
        TAG
    }

    fn accept(&self, ctx: &mut AcceptContext<'_>, data: &[u8]) -> Result<Acceptance> {
        let data = ElasticProposalData::decode(data)?;
        let proposal = data.proposal;
        let credit_amount = data.values.credit_amount;
        let proposal_hash = proposal.proposal_hash(ctx.domain)?;

        if credit_amount < proposal.min_credit_amount {
            return Err(LoanError::InsufficientCreditAmount {
                current: credit_amount,
                minimum: proposal.min_credit_amount,
            });
        }
        let collateral_amount = proposal.collateral_amount(credit_amount)?;

        let collateral = Asset::fungible(proposal.collateral_address, collateral_amount);
        let credit = Asset::fungible(proposal.credit_address, credit_amount);
        let terms = terms_for(
            &proposal.base,
            ctx.acceptor,
            collateral,
            credit,
            proposal.fixed_interest,
            proposal.accruing_apr,
            proposal.duration_secs,
        );

        let consumption = check_acceptance(&proposal.base, proposal_hash, credit_amount, ctx)?;
        Ok(Acceptance {
            proposal_hash,
            terms,
            refinancing_loan_id: ctx.refinancing_loan,
            consumption,
        })
    }
}
