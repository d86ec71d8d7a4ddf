use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::amount::{mul_div_floor, Amount, Apr};
use crate::errors::{LoanError, Result};
use crate::hashing::{structured_hash, Hash, SignatureDomain};
use crate::types::{Address, Asset};

use super::{
    check_acceptance, decode_json, encode_json, terms_for, AcceptContext, Acceptance,
    ProposalBase, ProposalVariant,
};

const TAG: &str = "dutch-auction-proposal";

/// longest auction window accepted, 10 years; keeps the auction end
/// representable as a timestamp
const MAX_AUCTION_DURATION_SECS: u64 = 10 * 365 * 86_400;

/// proposal whose credit amount is a linear function of time within an
/// auction window
///
/// A lender-proposed auction rises from the minimum to the maximum; a
/// borrower-proposed one falls from the maximum to the minimum. Time is
/// discretized to whole minutes and the auction logically runs one minute
/// past its duration so the end value is attainable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DutchAuctionProposal {
    pub base: ProposalBase,
    pub collateral: Asset,
    pub credit_address: Address,
    pub min_credit_amount: Amount,
    pub max_credit_amount: Amount,
    pub auction_start: DateTime<Utc>,
    pub auction_duration_secs: u64,
    pub fixed_interest: Amount,
    pub accruing_apr: Apr,
    pub duration_secs: u64,
}

impl DutchAuctionProposal {
    pub fn proposal_hash(&self, domain: &SignatureDomain) -> Result<Hash> {
        structured_hash(domain, TAG, self)
    }

    /// the auction's credit amount at `now`
    pub fn credit_amount_at(&self, now: DateTime<Utc>) -> Result<Amount> {
        if self.max_credit_amount <= self.min_credit_amount {
            return Err(LoanError::InvalidAuctionTerms {
                minimum: self.min_credit_amount,
                maximum: self.max_credit_amount,
            });
        }
        let duration_minutes = u128::from(self.auction_duration_secs / 60);
        if duration_minutes == 0 {
            return Err(LoanError::MalformedProposalData {
                message: "auction duration shorter than one minute".to_string(),
            });
        }
        if self.auction_duration_secs > MAX_AUCTION_DURATION_SECS {
            return Err(LoanError::MalformedProposalData {
                message: format!(
                    "auction duration {} s exceeds {} s",
                    self.auction_duration_secs, MAX_AUCTION_DURATION_SECS
                ),
            });
        }
        if now < self.auction_start {
            return Err(LoanError::AuctionNotStarted {
                current: now,
                start: self.auction_start,
            });
        }
        let end = self.auction_start
            + Duration::seconds(self.auction_duration_secs as i64)
            + Duration::minutes(1);
        if now >= end {
            return Err(LoanError::AuctionEnded { current: now, end });
        }

        let elapsed_minutes =
            ((now - self.auction_start).num_minutes() as u128).min(duration_minutes);
        let delta = mul_div_floor(
            self.max_credit_amount - self.min_credit_amount,
            elapsed_minutes,
            duration_minutes,
        )?;
        Ok(if self.base.is_offer {
            self.min_credit_amount + delta
        } else {
            self.max_credit_amount - delta
        })
    }
}

/// acceptor-supplied price expectation guarding against timing drift
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DutchAuctionValues {
    pub intended_credit_amount: Amount,
    pub slippage: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DutchAuctionProposalData {
    pub proposal: DutchAuctionProposal,
    pub values: DutchAuctionValues,
}

impl DutchAuctionProposalData {
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_json(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode_json(bytes)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DutchAuctionVariant {
    address: Address,
}

impl DutchAuctionVariant {
    pub fn new(address: Address) -> Self {
        Self { address }
    }
}

impl ProposalVariant for DutchAuctionVariant {
    fn address(&self) -> Address {
        self.address
    }

    fn tag(&self) -> &'static str {
        TAG
    }

    fn accept(&self, ctx: &mut AcceptContext<'_>, data: &[u8]) -> Result<Acceptance> {
        let data = DutchAuctionProposalData::decode(data)?;
        let proposal = data.proposal;
        let values = data.values;
        let proposal_hash = proposal.proposal_hash(ctx.domain)?;

        let credit_amount = proposal.credit_amount_at(ctx.now)?;
        let in_window = if proposal.base.is_offer {
            // rising price: the acceptor is the borrower and tolerates
            // paying up to `slippage` more than intended
            credit_amount >= values.intended_credit_amount
                && credit_amount <= values.intended_credit_amount + values.slippage
        } else {
            credit_amount <= values.intended_credit_amount
                && credit_amount >= values.intended_credit_amount.saturating_sub(values.slippage)
        };
        if !in_window {
            return Err(LoanError::InvalidCreditAmount {
                auction: credit_amount,
                intended: values.intended_credit_amount,
                slippage: values.slippage,
            });
        }

        let credit = Asset::fungible(proposal.credit_address, credit_amount);
        let terms = terms_for(
            &proposal.base,
            ctx.acceptor,
            proposal.collateral,
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
