use chrono::Duration;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::amount::{Amount, Apr};
use crate::errors::{LoanError, Result};
use crate::hashing::{structured_hash, Hash, SignatureDomain};
use crate::types::{Address, Asset};

use super::{
    check_acceptance, decode_json, encode_json, terms_for, AcceptContext, Acceptance,
    ProposalBase, ProposalVariant,
};

const TAG: &str = "oracle-proposal";

/// one conversion step of a chained price lookup
///
/// A non-inverted leg multiplies by the feed pricing the current
/// denomination in `quote`; an inverted leg divides by the feed pricing
/// `quote` in the current denomination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLeg {
    pub quote: Address,
    pub invert: bool,
}

/// proposal whose credit amount is derived from an oracle valuation of the
/// collateral, discounted by a loan-to-value ratio
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleProposal {
    pub base: ProposalBase,
    pub collateral: Asset,
    pub credit_address: Address,
    /// conversion path from the collateral denomination to the credit
    /// denomination
    pub price_legs: Vec<PriceLeg>,
    /// loan-to-value ratio in basis points
    pub ltv_bps: u32,
    pub min_credit_amount: Amount,
    pub fixed_interest: Amount,
    pub accruing_apr: Apr,
    pub duration_secs: u64,
}

impl OracleProposal {
    pub fn proposal_hash(&self, domain: &SignatureDomain) -> Result<Hash> {
        structured_hash(domain, TAG, self)
    }
}

/// the oracle variant carries no acceptor-supplied values; the valuation
/// is fully determined by the proposal and the current prices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleProposalData {
    pub proposal: OracleProposal,
}

impl OracleProposalData {
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_json(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode_json(bytes)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OracleVariant {
    address: Address,
}

impl OracleVariant {
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    fn credit_amount(&self, proposal: &OracleProposal, ctx: &AcceptContext<'_>) -> Result<Amount> {
        let mut denomination = proposal.collateral.address;
        let mut value =
            Decimal::from_u128(proposal.collateral.amount).ok_or_else(|| {
                LoanError::CalculationError {
                    message: "collateral amount exceeds decimal range".to_string(),
                }
            })?;

        for leg in &proposal.price_legs {
            let (base, quote) = if leg.invert {
                (leg.quote, denomination)
            } else {
                (denomination, leg.quote)
            };
            let feed = ctx
                .oracle
                .price(base, quote)
                .ok_or(LoanError::MissingPriceFeed { base, quote })?;
            if ctx.now - feed.observed_at > Duration::seconds(ctx.max_price_age_secs as i64) {
                return Err(LoanError::StalePrice {
                    base,
                    quote,
                    observed_at: feed.observed_at,
                    current: ctx.now,
                });
            }
            if leg.invert {
                if feed.price.is_zero() {
                    return Err(LoanError::CalculationError {
                        message: format!("zero price for {} in {}", base, quote),
                    });
                }
                value /= feed.price;
            } else {
                value *= feed.price;
            }
            denomination = leg.quote;
        }

        if denomination != proposal.credit_address {
            return Err(LoanError::PriceConversionMismatch {
                current: denomination,
                expected: proposal.credit_address,
            });
        }

        let discounted =
            value * Decimal::from(proposal.ltv_bps) / Decimal::from(10_000u32);
        let credit_amount =
            discounted
                .trunc()
                .to_u128()
                .ok_or_else(|| LoanError::CalculationError {
                    message: "valuation does not fit an asset amount".to_string(),
                })?;
        if credit_amount < proposal.min_credit_amount {
            return Err(LoanError::InsufficientCreditAmount {
                current: credit_amount,
                minimum: proposal.min_credit_amount,
            });
        }
        Ok(credit_amount)
    }
}

impl ProposalVariant for OracleVariant {
    fn address(&self) -> Address {
        self.address
    }

    fn tag(&self) -> &'static str {
        TAG
    }

    fn accept(&self, ctx: &mut AcceptContext<'_>, data: &[u8]) -> Result<Acceptance> {
        let data = OracleProposalData::decode(data)?;
        let proposal = data.proposal;
        let proposal_hash = proposal.proposal_hash(ctx.domain)?;

        let credit_amount = self.credit_amount(&proposal, ctx)?;
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
