use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::hashing::Hash;
use crate::types::{Address, Asset, LoanId};

/// all events that can be emitted by the loan engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    // lifecycle events
    LoanCreated {
        loan_id: LoanId,
        proposal_hash: Hash,
        borrower: Address,
        lender: Address,
        principal: Amount,
        collateral: Asset,
        start: DateTime<Utc>,
        default_timestamp: DateTime<Utc>,
    },
    LoanRefinanced {
        loan_id: LoanId,
        refinanced_loan_id: LoanId,
        common: Amount,
        surplus: Amount,
        shortage: Amount,
    },
    LoanRepaid {
        loan_id: LoanId,
        repayment: Amount,
        timestamp: DateTime<Utc>,
    },
    LoanClaimed {
        loan_id: LoanId,
        defaulted: bool,
    },
    LoanExtended {
        loan_id: LoanId,
        original_default_timestamp: DateTime<Utc>,
        extended_default_timestamp: DateTime<Utc>,
    },
    /// the direct-forwarding sub-operation failed; the loan remains claimable
    RepaymentForwardingFailed {
        loan_id: LoanId,
        holder: Address,
        reason: String,
    },

    // fee events
    FeeCollected {
        loan_id: LoanId,
        amount: Amount,
        collector: Address,
    },

    // proposal authorization events
    ProposalMade {
        proposal_hash: Hash,
        proposer: Address,
    },
    ExtensionProposalMade {
        proposal_hash: Hash,
        proposer: Address,
    },
    NonceRevoked {
        owner: Address,
        space: u64,
        nonce: u64,
    },
    NonceSpaceRevoked {
        owner: Address,
        new_space: u64,
    },
}

/// event store for collecting events during operations
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
