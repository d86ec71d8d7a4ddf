use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::amount::{Amount, Apr};
use crate::hashing::Hash;
use crate::types::{Address, Asset, LoanId, LoanStatus, ReceiptId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoanError {
    // --- authorization ---
    #[error("invalid signature by {signer} over {hash}")]
    InvalidSignature { signer: Address, hash: Hash },

    #[error("proposal expired: current time {current}, expiration {expiration}")]
    Expired {
        current: DateTime<Utc>,
        expiration: DateTime<Utc>,
    },

    #[error("nonce not usable: owner {owner}, space {space}, nonce {nonce}")]
    NonceNotUsable {
        owner: Address,
        space: u64,
        nonce: u64,
    },

    #[error("nonce already revoked: owner {owner}, space {space}, nonce {nonce}")]
    NonceAlreadyRevoked {
        owner: Address,
        space: u64,
        nonce: u64,
    },

    #[error("available credit limit exceeded: used {used}, requested {requested}, limit {limit}")]
    AvailableCreditLimitExceeded {
        used: Amount,
        requested: Amount,
        limit: Amount,
    },

    #[error("acceptor is the proposer: {address}")]
    AcceptorIsProposer { address: Address },

    #[error("caller {current} is not the allowed acceptor {allowed}")]
    CallerNotAllowedAcceptor { current: Address, allowed: Address },

    #[error("caller {caller} is not the proposer {proposer}")]
    CallerNotProposer { caller: Address, proposer: Address },

    #[error("address {address} is missing capability {tag}")]
    AddressMissingCapability {
        address: Address,
        tag: crate::types::CapabilityTag,
    },

    #[error("proposal addressed to engine {current}, expected {expected}")]
    InvalidEngineAddress { current: Address, expected: Address },

    #[error("invalid refinancing loan id: proposal commits to {proposed:?}, acceptance targets {requested:?}")]
    InvalidRefinancingLoanId {
        proposed: Option<LoanId>,
        requested: Option<LoanId>,
    },

    // --- state machine ---
    #[error("loan does not exist: {id}")]
    NonExistingLoan { id: LoanId },

    #[error("loan {id} is not running: current status {status}")]
    LoanNotRunning { id: LoanId, status: LoanStatus },

    #[error("loan defaulted at {default_timestamp}")]
    LoanDefaulted {
        default_timestamp: DateTime<Utc>,
    },

    #[error("loan {id} is already repaid")]
    LoanRepaid { id: LoanId },

    #[error("loan {id} is still running and not defaulted")]
    LoanRunning { id: LoanId },

    #[error("caller {caller} is not the receipt holder {holder}")]
    CallerNotReceiptHolder { caller: Address, holder: Address },

    #[error("invalid loan duration: {current} s, allowed {minimum}..={maximum} s")]
    InvalidDuration {
        current: u64,
        minimum: u64,
        maximum: u64,
    },

    #[error("accruing interest apr out of bounds: {current}, maximum {maximum}")]
    InterestAprOutOfBounds { current: Apr, maximum: Apr },

    #[error("invalid lender spec hash: provided {current}, expected {expected}")]
    InvalidLenderSpecHash { current: Hash, expected: Hash },

    #[error("invalid extension duration: {current} s, allowed {minimum}..={maximum} s")]
    InvalidExtensionDuration {
        current: u64,
        minimum: u64,
        maximum: u64,
    },

    #[error("extension caller {caller} is neither the borrower nor the receipt holder")]
    InvalidExtensionCaller { caller: Address },

    #[error("extension proposer {current} must be {expected}")]
    InvalidExtensionProposer { current: Address, expected: Address },

    // --- refinancing consistency ---
    #[error("refinance credit mismatch: new {current}, original {expected}")]
    RefinanceCreditMismatch { current: Address, expected: Address },

    #[error("refinance collateral mismatch: new {current}, original {expected}")]
    RefinanceCollateralMismatch { current: Asset, expected: Asset },

    #[error("refinance borrower mismatch: new {current}, original {expected}")]
    RefinanceBorrowerMismatch { current: Address, expected: Address },

    // --- settlement ---
    #[error("invalid asset: {asset}")]
    InvalidAsset { asset: Asset },

    #[error("incomplete transfer of {asset}: expected {expected}, received {actual}")]
    IncompleteTransfer {
        asset: Asset,
        expected: Amount,
        actual: Amount,
    },

    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance {
        available: Amount,
        requested: Amount,
    },

    #[error("no pool adapter registered for pool {pool}")]
    MissingPoolAdapter { pool: Address },

    #[error("unknown receipt token: {id}")]
    UnknownReceipt { id: ReceiptId },

    // --- proposal term computation ---
    #[error("collateral id {id} is not on the proposal whitelist")]
    CollateralIdNotWhitelisted { id: u128 },

    #[error("credit per collateral unit must be nonzero")]
    InvalidCreditPerCollateralUnit,

    #[error("auction terms invalid: min {minimum} must be below max {maximum}")]
    InvalidAuctionTerms { minimum: Amount, maximum: Amount },

    #[error("auction not started: current time {current}, start {start}")]
    AuctionNotStarted {
        current: DateTime<Utc>,
        start: DateTime<Utc>,
    },

    #[error("auction ended: current time {current}, end {end}")]
    AuctionEnded {
        current: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("auction credit amount {auction} outside intended {intended} with slippage {slippage}")]
    InvalidCreditAmount {
        auction: Amount,
        intended: Amount,
        slippage: Amount,
    },

    #[error("insufficient credit amount: computed {current}, minimum {minimum}")]
    InsufficientCreditAmount { current: Amount, minimum: Amount },

    #[error("no price feed for {base} in {quote}")]
    MissingPriceFeed { base: Address, quote: Address },

    #[error("stale price for {base} in {quote}: observed {observed_at}, current time {current}")]
    StalePrice {
        base: Address,
        quote: Address,
        observed_at: DateTime<Utc>,
        current: DateTime<Utc>,
    },

    #[error("price conversion ends in {current}, credit is denominated in {expected}")]
    PriceConversionMismatch { current: Address, expected: Address },

    // --- encoding / arithmetic ---
    #[error("malformed proposal data: {message}")]
    MalformedProposalData { message: String },

    #[error("calculation error: {message}")]
    CalculationError { message: String },
}

pub type Result<T> = std::result::Result<T, LoanError>;
