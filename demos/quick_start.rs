//! originate a simple loan, let a week pass, repay it

use chrono::{Duration, TimeZone, Utc};
use loan_protocol_rs::{
    Address, Apr, Asset, AssetTransfer, CapabilityTag, Collaborators, CreateLoanSpec,
    EngineConfig, Hash, InMemoryLedger, LenderSpec, LoanEngine, ProposalBase, ReceiptBook,
    SafeTimeProvider, SimpleProposal, SimpleProposalData, SimpleVariant, StaticOracle, TimeSource,
};

fn main() {
    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    ));

    let engine_address = Address([0xee; 32]);
    let lender = Address([0x01; 32]);
    let borrower = Address([0x02; 32]);
    let token = Address([0x10; 32]);
    let nft = Address([0x11; 32]);

    let mut engine = LoanEngine::new(engine_address, EngineConfig::new(1, Address([0xfc; 32])));

    let mut ledger = InMemoryLedger::new();
    ledger.mint(lender, &Asset::fungible(token, 1_000));
    ledger.mint(borrower, &Asset::unique(nft, 7));
    ledger.mint(borrower, &Asset::fungible(token, 100));

    let mut registry = loan_protocol_rs::AccessRegistry::new();
    let variant = SimpleVariant::new(Address([0xaa; 32]));
    registry.grant(Address([0xaa; 32]), CapabilityTag::LoanProposal);

    let mut receipts = ReceiptBook::new();
    let oracle = StaticOracle::new();

    // the lender publishes an offer: 1000 against nft 7, 50 fixed interest
    let proposal = SimpleProposal {
        base: ProposalBase {
            proposer: lender,
            is_offer: true,
            lender_spec_hash: LenderSpec::direct(lender).hash(engine.domain()).unwrap(),
            allowed_acceptor: None,
            refinancing_loan_id: None,
            available_credit_limit: 0,
            utilized_credit_key: Hash::ZERO,
            expiration: time.now() + Duration::days(30),
            nonce_space: 0,
            nonce: 1,
            loan_engine: engine_address,
        },
        collateral: Asset::unique(nft, 7),
        credit_address: token,
        credit_amount: 1_000,
        fixed_interest: 50,
        accruing_apr: Apr::ZERO,
        duration_secs: 30 * 86_400,
    };
    let hash = proposal.proposal_hash(engine.domain()).unwrap();
    engine.record_proposal_intent(lender, hash);

    let data = SimpleProposalData { proposal }.encode().unwrap();
    let mut spec = CreateLoanSpec::new(&data);
    spec.lender_spec = Some(LenderSpec::direct(lender));

    let loan_id = {
        let mut collab = Collaborators {
            ledger: &mut ledger,
            registry: &registry,
            receipts: &mut receipts,
            oracle: &oracle,
        };
        engine
            .create_loan(borrower, &variant, spec, &mut collab, &time)
            .unwrap()
    };
    println!("loan {} created", loan_id);
    println!(
        "borrower token balance: {}",
        ledger.balance_of(borrower, &Asset::fungible(token, 1))
    );

    let control = time.test_control().unwrap();
    control.advance(Duration::days(7));
    println!(
        "owed after a week: {}",
        engine.repayment_amount(loan_id, &time).unwrap()
    );

    {
        let mut collab = Collaborators {
            ledger: &mut ledger,
            registry: &registry,
            receipts: &mut receipts,
            oracle: &oracle,
        };
        engine.repay(borrower, loan_id, &mut collab, &time).unwrap();
    }
    println!(
        "repaid; lender token balance: {}",
        ledger.balance_of(lender, &Asset::fungible(token, 1))
    );
    for event in engine.take_events() {
        println!("event: {:?}", event);
    }
}
