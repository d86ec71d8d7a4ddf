pub mod amount;
pub mod authorization;
pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod hashing;
pub mod interest;
pub mod ledger;
pub mod nonce;
pub mod proposals;
pub mod services;
pub mod signature;
pub mod types;

// re-export key types
pub use amount::{fee_split, mul_div_floor, Amount, Apr};
pub use authorization::{ProposalAuthorization, ValidationRequest};
pub use config::EngineConfig;
pub use engine::{CreateLoanSpec, ExtensionProposal, Loan, LoanEngine};
pub use errors::{LoanError, Result};
pub use events::{Event, EventStore};
pub use hashing::{merkle_root, Hash, MerkleProof, SignatureDomain};
pub use interest::{accruing_interest, DebtCeiling, StableInterest};
pub use ledger::{AssetTransfer, InMemoryLedger, TransferLog};
pub use nonce::NonceAuthority;
pub use proposals::{
    Acceptance, DutchAuctionProposal, DutchAuctionProposalData, DutchAuctionValues,
    DutchAuctionVariant, ElasticProposal, ElasticProposalData, ElasticValues, ElasticVariant,
    ListProposal, ListProposalData, ListValues, ListVariant, OracleProposal, OracleProposalData,
    OracleVariant, PriceLeg, ProposalBase, ProposalVariant, SimpleProposal, SimpleProposalData,
    SimpleVariant, ELASTIC_SCALE,
};
pub use services::{
    AccessRegistry, CapabilityRegistry, Collaborators, PriceQuote, ReceiptBook,
    ReceiptTokenService, StaticOracle, ValuationOracle,
};
pub use signature::{sign, signing_address, verify, Signature};
pub use types::{
    Address, Asset, AssetKind, CapabilityTag, LenderSpec, LoanId, LoanStatus, ReceiptId, Terms,
};

// re-export external dependencies that users will need
pub use chrono;
pub use ed25519_dalek::SigningKey;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
