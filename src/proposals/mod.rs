pub mod dutch;
pub mod elastic;
pub mod list;
pub mod oracle;
pub mod simple;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::amount::{Amount, Apr};
use crate::authorization::{Consumption, ProposalAuthorization, ValidationRequest};
use crate::errors::{LoanError, Result};
use crate::hashing::{Hash, MerkleProof, SignatureDomain};
use crate::nonce::NonceAuthority;
use crate::services::ValuationOracle;
use crate::signature::Signature;
use crate::types::{Address, Asset, LoanId, Terms};

pub use dutch::{DutchAuctionProposal, DutchAuctionProposalData, DutchAuctionValues, DutchAuctionVariant};
pub use elastic::{ElasticProposal, ElasticProposalData, ElasticValues, ElasticVariant, ELASTIC_SCALE};
pub use list::{ListProposal, ListProposalData, ListValues, ListVariant};
pub use oracle::{OracleProposal, OracleProposalData, OracleVariant, PriceLeg};
pub use simple::{SimpleProposal, SimpleProposalData, SimpleVariant};

/// fields shared by every proposal variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalBase {
    pub proposer: Address,
    /// true when the proposer is the lender (an offer), false when the
    /// proposer is the borrower (a request)
    pub is_offer: bool,
    /// hash of the lender-side settlement parameters the lender commits to
    pub lender_spec_hash: Hash,
    /// restricts who may accept; `None` leaves the proposal open
    pub allowed_acceptor: Option<Address>,
    /// `Some(id)` pins the proposal to refinancing that loan; `None` allows
    /// a new loan, and for offers also any refinancing the acceptor picks
    pub refinancing_loan_id: Option<LoanId>,
    /// 0 means single-use; nonzero allows partial fills up to the limit
    pub available_credit_limit: Amount,
    /// bucket key shared between proposals drawing on one limit; zero
    /// defaults the bucket to the proposal's own hash
    pub utilized_credit_key: Hash,
    pub expiration: DateTime<Utc>,
    pub nonce_space: u64,
    pub nonce: u64,
    /// engine the proposal is addressed to
    pub loan_engine: Address,
}

/// everything a variant needs to resolve one acceptance
pub struct AcceptContext<'a> {
    pub acceptor: Address,
    /// loan the acceptor wants this acceptance to refinance
    pub refinancing_loan: Option<LoanId>,
    pub now: DateTime<Utc>,
    pub engine: Address,
    pub domain: &'a SignatureDomain,
    pub max_price_age_secs: u64,
    pub authorization: &'a mut ProposalAuthorization,
    pub nonces: &'a mut NonceAuthority,
    pub oracle: &'a dyn ValuationOracle,
    pub signature: Option<&'a Signature>,
    pub inclusion_proof: Option<&'a MerkleProof>,
}

/// result of a successful proposal acceptance
#[derive(Debug)]
pub struct Acceptance {
    pub proposal_hash: Hash,
    pub terms: Terms,
    pub refinancing_loan_id: Option<LoanId>,
    pub(crate) consumption: Consumption,
}

/// a proposal variant resolves encoded proposal data plus acceptor-supplied
/// values into concrete loan terms, consuming the proposal's authorization
pub trait ProposalVariant {
    /// on-ledger identity of the variant, gated by the proposal capability
    fn address(&self) -> Address;

    /// type tag bound into the structured hash
    fn tag(&self) -> &'static str;

    fn accept(&self, ctx: &mut AcceptContext<'_>, data: &[u8]) -> Result<Acceptance>;
}

/// generic acceptance checks shared by all variants, run after the variant
/// computed its concrete credit amount
///
/// This is the consumption point: success revokes the proposal's nonce or
/// charges its credit limit.
pub(crate) fn check_acceptance(
    base: &ProposalBase,
    proposal_hash: Hash,
    credit_amount: Amount,
    ctx: &mut AcceptContext<'_>,
) -> Result<Consumption> {
    if base.loan_engine != ctx.engine {
        return Err(LoanError::InvalidEngineAddress {
            current: base.loan_engine,
            expected: ctx.engine,
        });
    }
    if let Some(allowed) = base.allowed_acceptor {
        if ctx.acceptor != allowed {
            return Err(LoanError::CallerNotAllowedAcceptor {
                current: ctx.acceptor,
                allowed,
            });
        }
    }
    check_refinancing_target(base, ctx.refinancing_loan)?;

    let request = ValidationRequest {
        proposal_hash,
        proposer: base.proposer,
        acceptor: ctx.acceptor,
        credit_amount,
        available_credit_limit: base.available_credit_limit,
        utilized_credit_key: base.utilized_credit_key,
        nonce_space: base.nonce_space,
        nonce: base.nonce,
        expiration: base.expiration,
        signature: ctx.signature,
        inclusion_proof: ctx.inclusion_proof,
    };
    ctx.authorization
        .validate_consuming(ctx.nonces, ctx.now, &request)
}

/// a proposal pinned to a loan id refinances only that loan; an unpinned
/// offer may refinance any loan the acceptor picks, an unpinned request
/// only originates new loans
fn check_refinancing_target(base: &ProposalBase, requested: Option<LoanId>) -> Result<()> {
    match (base.refinancing_loan_id, requested) {
        (None, None) => Ok(()),
        (None, Some(_)) if base.is_offer => Ok(()),
        (Some(proposed), Some(target)) if proposed == target => Ok(()),
        (proposed, requested) => Err(LoanError::InvalidRefinancingLoanId {
            proposed,
            requested,
        }),
    }
}

/// assemble loan terms from a base proposal and the resolved assets
pub(crate) fn terms_for(
    base: &ProposalBase,
    acceptor: Address,
    collateral: Asset,
    credit: Asset,
    fixed_interest: Amount,
    accruing_apr: Apr,
    duration_secs: u64,
) -> Terms {
    let (lender, borrower) = if base.is_offer {
        (base.proposer, acceptor)
    } else {
        (acceptor, base.proposer)
    };
    Terms {
        lender,
        borrower,
        duration_secs,
        collateral,
        credit,
        fixed_interest,
        accruing_apr,
        lender_spec_hash: base.lender_spec_hash,
    }
}

pub(crate) fn decode_json<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|err| LoanError::MalformedProposalData {
        message: err.to_string(),
    })
}

pub(crate) fn encode_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|err| LoanError::MalformedProposalData {
        message: err.to_string(),
    })
}
