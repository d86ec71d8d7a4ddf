use chrono::{DateTime, Duration, Utc};
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::amount::{fee_split, Amount, Apr};
use crate::authorization::ProposalAuthorization;
use crate::config::EngineConfig;
use crate::errors::{LoanError, Result};
use crate::events::{Event, EventStore};
use crate::hashing::{structured_hash, Hash, MerkleProof, SignatureDomain};
use crate::interest::accruing_interest;
use crate::ledger::{self, TransferLog};
use crate::nonce::NonceAuthority;
use crate::proposals::{AcceptContext, Acceptance, ProposalVariant};
use crate::services::Collaborators;
use crate::signature::Signature;
use crate::types::{
    Address, Asset, CapabilityTag, LenderSpec, LoanId, LoanStatus, ReceiptId, Terms,
};

/// a persisted loan record
///
/// Only `Running` and `Repaid` are ever stored in `status`; default is
/// derived from the default timestamp at read time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loan {
    pub id: LoanId,
    pub status: LoanStatus,
    pub borrower: Address,
    pub original_lender: Address,
    /// identity actually debited at origination; a pool address for
    /// pool-funded loans, otherwise the lender
    pub original_source_of_funds: Address,
    pub receipt_id: ReceiptId,
    pub credit_address: Address,
    pub principal: Amount,
    /// minimum interest owed; after repayment this freezes the full
    /// accrued total so claims stay exact
    pub fixed_interest: Amount,
    /// zeroed on repayment so accrual stops exactly there
    pub accruing_apr: Apr,
    pub start: DateTime<Utc>,
    pub default_timestamp: DateTime<Utc>,
    pub collateral: Asset,
}

impl Loan {
    /// status as observed at `now`
    pub fn status_at(&self, now: DateTime<Utc>) -> LoanStatus {
        match self.status {
            LoanStatus::Repaid => LoanStatus::Repaid,
            _ if now >= self.default_timestamp => LoanStatus::Defaulted,
            status => status,
        }
    }

    pub fn accrued_interest(&self, now: DateTime<Utc>) -> Result<Amount> {
        Ok(self.fixed_interest
            + accruing_interest(self.principal, self.accruing_apr, self.start, now)?)
    }

    /// total credit owed at `now`
    pub fn repayment_amount(&self, now: DateTime<Utc>) -> Result<Amount> {
        Ok(self.principal + self.accrued_interest(now)?)
    }
}

/// caller-supplied inputs for one loan creation
#[derive(Debug, Clone)]
pub struct CreateLoanSpec<'a> {
    /// encoded proposal data of the chosen variant
    pub proposal_data: &'a [u8],
    pub signature: Option<Signature>,
    pub inclusion_proof: Option<MerkleProof>,
    /// lender-side settlement parameters; checked against the proposal's
    /// committed hash unless the caller is the lender
    pub lender_spec: Option<LenderSpec>,
    /// loan this creation refinances, if any
    pub refinancing_loan_id: Option<LoanId>,
    /// nonce of the caller's to revoke in the same operation
    pub revoke_nonce: Option<u64>,
}

impl<'a> CreateLoanSpec<'a> {
    pub fn new(proposal_data: &'a [u8]) -> Self {
        Self {
            proposal_data,
            signature: None,
            inclusion_proof: None,
            lender_spec: None,
            refinancing_loan_id: None,
            revoke_nonce: None,
        }
    }
}

/// cross-signed request to push a loan's default timestamp forward
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionProposal {
    pub loan_id: LoanId,
    pub compensation_address: Address,
    pub compensation_amount: Amount,
    /// extra duration added to the default timestamp
    pub duration_secs: u64,
    pub expiration: DateTime<Utc>,
    pub proposer: Address,
    pub nonce_space: u64,
    pub nonce: u64,
    pub loan_engine: Address,
}

impl ExtensionProposal {
    pub fn proposal_hash(&self, domain: &SignatureDomain) -> Result<Hash> {
        structured_hash(domain, "extension-proposal", self)
    }
}

/// amounts resolved by a refinancing settlement
struct RefinanceSettlement {
    holder: Address,
    repayment: Amount,
    fee: Amount,
    common: Amount,
    surplus: Amount,
    shortage: Amount,
    should_transfer_common: bool,
}

/// the loan lifecycle state machine
///
/// Owns the loan records, the nonce and proposal authorities, and the
/// event store; asset movement, receipts, capabilities, and prices are
/// injected per operation through `Collaborators`. Every operation reads
/// the clock exactly once.
pub struct LoanEngine {
    address: Address,
    config: EngineConfig,
    domain: SignatureDomain,
    loans: HashMap<LoanId, Loan>,
    nonces: NonceAuthority,
    authorization: ProposalAuthorization,
    extension_intents: HashMap<Hash, Address>,
    events: EventStore,
}

impl LoanEngine {
    pub fn new(address: Address, config: EngineConfig) -> Self {
        let domain = SignatureDomain::new(config.network_id, address);
        Self {
            address,
            config,
            domain: domain.clone(),
            loans: HashMap::new(),
            nonces: NonceAuthority::new(),
            authorization: ProposalAuthorization::new(domain),
            extension_intents: HashMap::new(),
            events: EventStore::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn domain(&self) -> &SignatureDomain {
        &self.domain
    }

    pub fn loan(&self, loan_id: LoanId) -> Option<&Loan> {
        self.loans.get(&loan_id)
    }

    /// status of a loan id as observed now; `None` for ids never used or
    /// already fully settled
    pub fn status(&self, loan_id: LoanId, time: &SafeTimeProvider) -> LoanStatus {
        match self.loans.get(&loan_id) {
            Some(loan) => loan.status_at(time.now()),
            None => LoanStatus::None,
        }
    }

    pub fn repayment_amount(&self, loan_id: LoanId, time: &SafeTimeProvider) -> Result<Amount> {
        let loan = self
            .loans
            .get(&loan_id)
            .ok_or(LoanError::NonExistingLoan { id: loan_id })?;
        loan.repayment_amount(time.now())
    }

    pub fn authorization(&self) -> &ProposalAuthorization {
        &self.authorization
    }

    pub fn nonces(&self) -> &NonceAuthority {
        &self.nonces
    }

    pub fn events(&self) -> &[Event] {
        self.events.events()
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        self.events.take_events()
    }

    /// mark a proposal authentic by the proposer's own on-ledger submission
    pub fn record_proposal_intent(&mut self, caller: Address, proposal_hash: Hash) {
        self.authorization.record_intent(caller, proposal_hash);
        self.events.emit(Event::ProposalMade {
            proposal_hash,
            proposer: caller,
        });
    }

    /// mark an extension proposal authentic the same way
    pub fn record_extension_intent(
        &mut self,
        caller: Address,
        proposal: &ExtensionProposal,
    ) -> Result<Hash> {
        if caller != proposal.proposer {
            return Err(LoanError::CallerNotProposer {
                caller,
                proposer: proposal.proposer,
            });
        }
        let proposal_hash = proposal.proposal_hash(&self.domain)?;
        self.extension_intents.insert(proposal_hash, caller);
        self.events.emit(Event::ExtensionProposalMade {
            proposal_hash,
            proposer: caller,
        });
        Ok(proposal_hash)
    }

    /// revoke one nonce in the caller's current space
    pub fn revoke_nonce(&mut self, caller: Address, nonce: u64) -> Result<()> {
        let space = self.nonces.current_space(caller);
        self.nonces.revoke(caller, space, nonce)?;
        self.events.emit(Event::NonceRevoked {
            owner: caller,
            space,
            nonce,
        });
        Ok(())
    }

    /// revoke every nonce in the caller's current space
    pub fn revoke_nonce_space(&mut self, caller: Address) -> u64 {
        let new_space = self.nonces.revoke_space(caller);
        self.events.emit(Event::NonceSpaceRevoked {
            owner: caller,
            new_space,
        });
        new_space
    }

    /// resolve a proposal into a running loan, settling all asset legs
    ///
    /// Authorization consumption happens before any transfer; if a later
    /// step fails, the consumption and every executed leg are rolled back
    /// so the operation leaves no trace.
    pub fn create_loan(
        &mut self,
        caller: Address,
        variant: &dyn ProposalVariant,
        spec: CreateLoanSpec<'_>,
        collab: &mut Collaborators<'_>,
        time: &SafeTimeProvider,
    ) -> Result<LoanId> {
        let now = time.now();

        if !collab
            .registry
            .has_capability(variant.address(), CapabilityTag::LoanProposal)
        {
            return Err(LoanError::AddressMissingCapability {
                address: variant.address(),
                tag: CapabilityTag::LoanProposal,
            });
        }

        // the caller's own revocation is part of the operation: it must not
        // survive an abort, and its event must not precede a failure
        let revoked_nonce = match spec.revoke_nonce {
            Some(nonce) => {
                let space = self.nonces.current_space(caller);
                self.nonces.revoke(caller, space, nonce)?;
                Some((space, nonce))
            }
            None => None,
        };

        match self.accept_and_settle(caller, variant, spec, collab, now) {
            Ok(loan_id) => {
                if let Some((space, nonce)) = revoked_nonce {
                    self.events.emit(Event::NonceRevoked {
                        owner: caller,
                        space,
                        nonce,
                    });
                }
                Ok(loan_id)
            }
            Err(err) => {
                if let Some((space, nonce)) = revoked_nonce {
                    self.nonces.restore(caller, space, nonce);
                }
                Err(err)
            }
        }
    }

    fn accept_and_settle(
        &mut self,
        caller: Address,
        variant: &dyn ProposalVariant,
        spec: CreateLoanSpec<'_>,
        collab: &mut Collaborators<'_>,
        now: DateTime<Utc>,
    ) -> Result<LoanId> {
        if let Some(old_id) = spec.refinancing_loan_id {
            let old = self
                .loans
                .get(&old_id)
                .ok_or(LoanError::NonExistingLoan { id: old_id })?;
            match old.status_at(now) {
                LoanStatus::Running => {}
                LoanStatus::Repaid => return Err(LoanError::LoanRepaid { id: old_id }),
                _ => {
                    return Err(LoanError::LoanDefaulted {
                        default_timestamp: old.default_timestamp,
                    })
                }
            }
        }

        let acceptance = {
            let mut ctx = AcceptContext {
                acceptor: caller,
                refinancing_loan: spec.refinancing_loan_id,
                now,
                engine: self.address,
                domain: &self.domain,
                max_price_age_secs: self.config.max_price_age_secs,
                authorization: &mut self.authorization,
                nonces: &mut self.nonces,
                oracle: collab.oracle,
                signature: spec.signature.as_ref(),
                inclusion_proof: spec.inclusion_proof.as_ref(),
            };
            variant.accept(&mut ctx, spec.proposal_data)?
        };

        // the proposal is consumed; any failure from here must restore it
        let consumption = acceptance.consumption.clone();
        match self.settle_created_loan(caller, &spec, acceptance, collab, now) {
            Ok(loan_id) => Ok(loan_id),
            Err(err) => {
                self.authorization.rollback(&mut self.nonces, consumption);
                Err(err)
            }
        }
    }

    fn settle_created_loan(
        &mut self,
        caller: Address,
        spec: &CreateLoanSpec<'_>,
        acceptance: Acceptance,
        collab: &mut Collaborators<'_>,
        now: DateTime<Utc>,
    ) -> Result<LoanId> {
        let terms = acceptance.terms;

        // the upper bound also keeps the default timestamp representable
        if terms.duration_secs < self.config.min_loan_duration_secs
            || terms.duration_secs > self.config.max_loan_duration_secs
        {
            return Err(LoanError::InvalidDuration {
                current: terms.duration_secs,
                minimum: self.config.min_loan_duration_secs,
                maximum: self.config.max_loan_duration_secs,
            });
        }
        if terms.accruing_apr > self.config.max_accruing_apr {
            return Err(LoanError::InterestAprOutOfBounds {
                current: terms.accruing_apr,
                maximum: self.config.max_accruing_apr,
            });
        }

        let provided_spec_hash = match &spec.lender_spec {
            Some(lender_spec) => lender_spec.hash(&self.domain)?,
            None => Hash::ZERO,
        };
        if caller != terms.lender && provided_spec_hash != terms.lender_spec_hash {
            return Err(LoanError::InvalidLenderSpecHash {
                current: provided_spec_hash,
                expected: terms.lender_spec_hash,
            });
        }
        let source_of_funds = spec
            .lender_spec
            .as_ref()
            .map(|lender_spec| lender_spec.source_of_funds)
            .unwrap_or(terms.lender);

        if !collab.registry.is_valid_asset(&terms.collateral) {
            return Err(LoanError::InvalidAsset {
                asset: terms.collateral,
            });
        }
        if !collab.registry.is_valid_asset(&terms.credit) {
            return Err(LoanError::InvalidAsset {
                asset: terms.credit,
            });
        }

        if let Some(old_id) = acceptance.refinancing_loan_id {
            let old = &self.loans[&old_id];
            if terms.credit.address != old.credit_address {
                return Err(LoanError::RefinanceCreditMismatch {
                    current: terms.credit.address,
                    expected: old.credit_address,
                });
            }
            if terms.collateral != old.collateral {
                return Err(LoanError::RefinanceCollateralMismatch {
                    current: terms.collateral,
                    expected: old.collateral,
                });
            }
            if terms.borrower != old.borrower {
                return Err(LoanError::RefinanceBorrowerMismatch {
                    current: terms.borrower,
                    expected: old.borrower,
                });
            }
        }

        let receipt_id = collab.receipts.mint(terms.lender);
        let loan_id = Uuid::new_v4();
        self.loans.insert(
            loan_id,
            Loan {
                id: loan_id,
                status: LoanStatus::Running,
                borrower: terms.borrower,
                original_lender: terms.lender,
                original_source_of_funds: source_of_funds,
                receipt_id,
                credit_address: terms.credit.address,
                principal: terms.credit.amount,
                fixed_interest: terms.fixed_interest,
                accruing_apr: terms.accruing_apr,
                start: now,
                default_timestamp: now + Duration::seconds(terms.duration_secs as i64),
                collateral: terms.collateral,
            },
        );

        let mut log = TransferLog::new();
        let settled = match acceptance.refinancing_loan_id {
            None => self
                .settle_new_loan(&terms, source_of_funds, collab, &mut log)
                .map(|fee| (fee, None)),
            Some(old_id) => {
                let old = &self.loans[&old_id];
                self.settle_refinance(old, &terms, source_of_funds, collab, &mut log, now)
                    .map(|settlement| (settlement.fee, Some((old_id, settlement))))
            }
        };

        let (fee, refinance) = match settled {
            Ok(result) => result,
            Err(err) => {
                log.unwind(collab.ledger);
                self.loans.remove(&loan_id);
                let _ = collab.receipts.burn(receipt_id);
                return Err(err);
            }
        };

        self.events.emit(Event::LoanCreated {
            loan_id,
            proposal_hash: acceptance.proposal_hash,
            borrower: terms.borrower,
            lender: terms.lender,
            principal: terms.credit.amount,
            collateral: terms.collateral,
            start: now,
            default_timestamp: now + Duration::seconds(terms.duration_secs as i64),
        });
        if fee > 0 {
            self.events.emit(Event::FeeCollected {
                loan_id,
                amount: fee,
                collector: self.config.fee_collector,
            });
        }

        if let Some((old_id, settlement)) = refinance {
            if let Some(old) = self.loans.get_mut(&old_id) {
                old.fixed_interest = settlement.repayment - old.principal;
                old.accruing_apr = Apr::ZERO;
                old.status = LoanStatus::Repaid;
            }
            self.events.emit(Event::LoanRefinanced {
                loan_id,
                refinanced_loan_id: old_id,
                common: settlement.common,
                surplus: settlement.surplus,
                shortage: settlement.shortage,
            });
            // custody holds the full repayment only when common flowed
            // through it; otherwise just the shortage
            let forwardable = if settlement.should_transfer_common {
                settlement.repayment
            } else {
                settlement.shortage
            };
            if let Err(err) =
                self.try_claim_repaid_loan(old_id, settlement.holder, forwardable, collab)
            {
                self.events.emit(Event::RepaymentForwardingFailed {
                    loan_id: old_id,
                    holder: settlement.holder,
                    reason: err.to_string(),
                });
            }
        }

        Ok(loan_id)
    }

    /// collateral into custody, credit (minus fee) to the borrower
    fn settle_new_loan(
        &self,
        terms: &Terms,
        source_of_funds: Address,
        collab: &mut Collaborators<'_>,
        log: &mut TransferLog,
    ) -> Result<Amount> {
        ledger::push_from(collab.ledger, log, terms.borrower, self.address, &terms.collateral)?;

        if source_of_funds != terms.lender {
            let adapter = collab
                .registry
                .pool_adapter(source_of_funds)
                .ok_or(LoanError::MissingPoolAdapter {
                    pool: source_of_funds,
                })?;
            ledger::withdraw_from_pool(
                collab.ledger,
                log,
                &terms.credit,
                adapter,
                source_of_funds,
                terms.lender,
            )?;
        }

        let (fee, remainder) = fee_split(terms.credit.amount, self.config.fee_bps)?;
        ledger::push_from(
            collab.ledger,
            log,
            terms.lender,
            self.config.fee_collector,
            &terms.credit.with_amount(fee),
        )?;
        ledger::push_from(
            collab.ledger,
            log,
            terms.lender,
            terms.borrower,
            &terms.credit.with_amount(remainder),
        )?;
        Ok(fee)
    }

    /// split the new draw into fee, common repayment, surplus, and
    /// shortage; collateral stays in custody throughout
    fn settle_refinance(
        &self,
        old: &Loan,
        terms: &Terms,
        source_of_funds: Address,
        collab: &mut Collaborators<'_>,
        log: &mut TransferLog,
        now: DateTime<Utc>,
    ) -> Result<RefinanceSettlement> {
        let repayment = old.repayment_amount(now)?;
        let (fee, after_fee) = fee_split(terms.credit.amount, self.config.fee_bps)?;
        let common = repayment.min(after_fee);
        let surplus = after_fee.saturating_sub(repayment);
        let shortage = repayment.saturating_sub(after_fee);
        let holder = collab.receipts.owner_of(old.receipt_id)?;

        // the common amount is elided when the new lender already holds
        // the receipt and draws from the loan's original source of funds
        let should_transfer_common =
            terms.lender != holder || source_of_funds != old.original_source_of_funds;

        if source_of_funds != terms.lender {
            let draw = fee + if should_transfer_common { common } else { 0 } + surplus;
            let adapter = collab
                .registry
                .pool_adapter(source_of_funds)
                .ok_or(LoanError::MissingPoolAdapter {
                    pool: source_of_funds,
                })?;
            ledger::withdraw_from_pool(
                collab.ledger,
                log,
                &terms.credit.with_amount(draw),
                adapter,
                source_of_funds,
                terms.lender,
            )?;
        }

        ledger::push_from(
            collab.ledger,
            log,
            terms.lender,
            self.config.fee_collector,
            &terms.credit.with_amount(fee),
        )?;
        if should_transfer_common {
            ledger::push_from(
                collab.ledger,
                log,
                terms.lender,
                self.address,
                &terms.credit.with_amount(common),
            )?;
        }
        ledger::push_from(
            collab.ledger,
            log,
            terms.lender,
            terms.borrower,
            &terms.credit.with_amount(surplus),
        )?;
        ledger::push_from(
            collab.ledger,
            log,
            terms.borrower,
            self.address,
            &terms.credit.with_amount(shortage),
        )?;

        Ok(RefinanceSettlement {
            holder,
            repayment,
            fee,
            common,
            surplus,
            shortage,
            should_transfer_common,
        })
    }

    /// repay a running loan, freezing interest and returning collateral
    ///
    /// Any caller may repay. When the receipt still sits with the original
    /// lender the repayment is forwarded directly and the loan deleted;
    /// a forwarding failure leaves the loan `Repaid` for later claim.
    pub fn repay(
        &mut self,
        caller: Address,
        loan_id: LoanId,
        collab: &mut Collaborators<'_>,
        time: &SafeTimeProvider,
    ) -> Result<()> {
        let now = time.now();

        let (repayment, holder, borrower, credit_address, collateral, frozen);
        {
            let loan = self
                .loans
                .get_mut(&loan_id)
                .ok_or(LoanError::NonExistingLoan { id: loan_id })?;
            match loan.status_at(now) {
                LoanStatus::Running => {}
                LoanStatus::Repaid => return Err(LoanError::LoanRepaid { id: loan_id }),
                _ => {
                    return Err(LoanError::LoanDefaulted {
                        default_timestamp: loan.default_timestamp,
                    })
                }
            }
            repayment = loan.repayment_amount(now)?;
            holder = collab.receipts.owner_of(loan.receipt_id)?;
            borrower = loan.borrower;
            credit_address = loan.credit_address;
            collateral = loan.collateral;
            frozen = (loan.fixed_interest, loan.accruing_apr);

            // freeze accrual before moving assets
            loan.fixed_interest = repayment - loan.principal;
            loan.accruing_apr = Apr::ZERO;
            loan.status = LoanStatus::Repaid;
        }

        let credit = Asset::fungible(credit_address, repayment);
        let mut log = TransferLog::new();
        let moved = ledger::push_from(collab.ledger, &mut log, caller, self.address, &credit)
            .and_then(|_| {
                ledger::push_from(collab.ledger, &mut log, self.address, borrower, &collateral)
            });
        if let Err(err) = moved {
            log.unwind(collab.ledger);
            if let Some(loan) = self.loans.get_mut(&loan_id) {
                loan.fixed_interest = frozen.0;
                loan.accruing_apr = frozen.1;
                loan.status = LoanStatus::Running;
            }
            return Err(err);
        }

        self.events.emit(Event::LoanRepaid {
            loan_id,
            repayment,
            timestamp: now,
        });

        if let Err(err) = self.try_claim_repaid_loan(loan_id, holder, repayment, collab) {
            self.events.emit(Event::RepaymentForwardingFailed {
                loan_id,
                holder,
                reason: err.to_string(),
            });
        }
        Ok(())
    }

    /// best-effort direct forwarding of a repaid loan's credit to the
    /// original lender; skipped when the receipt changed hands
    fn try_claim_repaid_loan(
        &mut self,
        loan_id: LoanId,
        holder: Address,
        credit_amount: Amount,
        collab: &mut Collaborators<'_>,
    ) -> Result<()> {
        let (receipt_id, destination_pool, credit) = {
            let loan = self
                .loans
                .get(&loan_id)
                .ok_or(LoanError::NonExistingLoan { id: loan_id })?;
            if holder != loan.original_lender {
                return Ok(());
            }
            let pool = (loan.original_source_of_funds != loan.original_lender)
                .then_some(loan.original_source_of_funds);
            (
                loan.receipt_id,
                pool,
                Asset::fungible(loan.credit_address, credit_amount),
            )
        };

        let mut log = TransferLog::new();
        match destination_pool {
            None => ledger::push_from(collab.ledger, &mut log, self.address, holder, &credit)?,
            Some(pool) => {
                let adapter = collab
                    .registry
                    .pool_adapter(pool)
                    .ok_or(LoanError::MissingPoolAdapter { pool })?;
                ledger::supply_to_pool(collab.ledger, &mut log, &credit, adapter, pool, self.address)?;
            }
        }

        if let Err(err) = collab.receipts.burn(receipt_id) {
            log.unwind(collab.ledger);
            return Err(err);
        }
        self.loans.remove(&loan_id);
        self.events.emit(Event::LoanClaimed {
            loan_id,
            defaulted: false,
        });
        Ok(())
    }

    /// claim a repaid loan's credit, or a defaulted loan's collateral
    pub fn claim(
        &mut self,
        caller: Address,
        loan_id: LoanId,
        collab: &mut Collaborators<'_>,
        time: &SafeTimeProvider,
    ) -> Result<()> {
        let now = time.now();
        let (receipt_id, defaulted, payout) = {
            let loan = self
                .loans
                .get(&loan_id)
                .ok_or(LoanError::NonExistingLoan { id: loan_id })?;
            let holder = collab.receipts.owner_of(loan.receipt_id)?;
            if caller != holder {
                return Err(LoanError::CallerNotReceiptHolder { caller, holder });
            }
            match loan.status_at(now) {
                LoanStatus::Repaid => (
                    loan.receipt_id,
                    false,
                    Asset::fungible(loan.credit_address, loan.principal + loan.fixed_interest),
                ),
                LoanStatus::Defaulted => (loan.receipt_id, true, loan.collateral),
                _ => return Err(LoanError::LoanRunning { id: loan_id }),
            }
        };

        let mut log = TransferLog::new();
        ledger::push_from(collab.ledger, &mut log, self.address, caller, &payout)?;

        if let Err(err) = collab.receipts.burn(receipt_id) {
            log.unwind(collab.ledger);
            return Err(err);
        }
        self.loans.remove(&loan_id);
        self.events.emit(Event::LoanClaimed { loan_id, defaulted });
        Ok(())
    }

    /// push a running loan's default timestamp forward
    ///
    /// The request must be cross-signed: the receipt holder extends with
    /// the borrower's proposal and vice versa, never self-signed.
    pub fn extend(
        &mut self,
        caller: Address,
        proposal: &ExtensionProposal,
        signature: Option<&Signature>,
        collab: &mut Collaborators<'_>,
        time: &SafeTimeProvider,
    ) -> Result<()> {
        let now = time.now();
        let loan_id = proposal.loan_id;

        let (borrower, receipt_id, old_default) = {
            let loan = self
                .loans
                .get(&loan_id)
                .ok_or(LoanError::NonExistingLoan { id: loan_id })?;
            match loan.status_at(now) {
                LoanStatus::Running => {}
                LoanStatus::Repaid => return Err(LoanError::LoanRepaid { id: loan_id }),
                _ => {
                    return Err(LoanError::LoanDefaulted {
                        default_timestamp: loan.default_timestamp,
                    })
                }
            }
            (loan.borrower, loan.receipt_id, loan.default_timestamp)
        };

        if proposal.duration_secs < self.config.min_extension_secs
            || proposal.duration_secs > self.config.max_extension_secs
        {
            return Err(LoanError::InvalidExtensionDuration {
                current: proposal.duration_secs,
                minimum: self.config.min_extension_secs,
                maximum: self.config.max_extension_secs,
            });
        }
        if now >= proposal.expiration {
            return Err(LoanError::Expired {
                current: now,
                expiration: proposal.expiration,
            });
        }
        if proposal.loan_engine != self.address {
            return Err(LoanError::InvalidEngineAddress {
                current: proposal.loan_engine,
                expected: self.address,
            });
        }

        let holder = collab.receipts.owner_of(receipt_id)?;
        let expected_proposer = if caller == holder {
            borrower
        } else if caller == borrower {
            holder
        } else {
            return Err(LoanError::InvalidExtensionCaller { caller });
        };
        if proposal.proposer != expected_proposer {
            return Err(LoanError::InvalidExtensionProposer {
                current: proposal.proposer,
                expected: expected_proposer,
            });
        }

        let proposal_hash = proposal.proposal_hash(&self.domain)?;
        let recorded = self.extension_intents.get(&proposal_hash) == Some(&proposal.proposer);
        if !recorded {
            match signature {
                Some(sig) => crate::signature::verify(proposal.proposer, &proposal_hash, sig)?,
                None => {
                    return Err(LoanError::InvalidSignature {
                        signer: proposal.proposer,
                        hash: proposal_hash,
                    })
                }
            }
        }

        if !self
            .nonces
            .is_usable(proposal.proposer, proposal.nonce_space, proposal.nonce)
        {
            return Err(LoanError::NonceNotUsable {
                owner: proposal.proposer,
                space: proposal.nonce_space,
                nonce: proposal.nonce,
            });
        }
        self.nonces
            .revoke(proposal.proposer, proposal.nonce_space, proposal.nonce)?;

        let new_default = old_default + Duration::seconds(proposal.duration_secs as i64);
        if let Some(loan) = self.loans.get_mut(&loan_id) {
            loan.default_timestamp = new_default;
        }

        if proposal.compensation_amount > 0 {
            let compensation =
                Asset::fungible(proposal.compensation_address, proposal.compensation_amount);
            let mut log = TransferLog::new();
            let paid = if collab.registry.is_valid_asset(&compensation) {
                ledger::push_from(collab.ledger, &mut log, borrower, holder, &compensation)
            } else {
                Err(LoanError::InvalidAsset {
                    asset: compensation,
                })
            };
            if let Err(err) = paid {
                if let Some(loan) = self.loans.get_mut(&loan_id) {
                    loan.default_timestamp = old_default;
                }
                self.nonces
                    .restore(proposal.proposer, proposal.nonce_space, proposal.nonce);
                return Err(err);
            }
        }

        self.events.emit(Event::LoanExtended {
            loan_id,
            original_default_timestamp: old_default,
            extended_default_timestamp: new_default,
        });
        Ok(())
    }
}
