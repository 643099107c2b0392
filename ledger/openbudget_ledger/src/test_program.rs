use crate::address::{milestone_address, platform_address, program_id, project_address, Pubkey};
use crate::bank::Bank;
use crate::codec::{decode_milestone, decode_platform, decode_project};
use crate::invariants;
use crate::tx::{sign_transaction, Instruction, TxReceipt, LOG_RELEASE_FUNDS};
use crate::LedgerError;

fn setup() -> (Bank, Pubkey) {
    let bank = Bank::new(program_id("openbudget"));
    let authority = Pubkey::from_seed("ministry-of-health");
    (bank, authority)
}

fn setup_with_platform() -> (Bank, Pubkey) {
    let (mut bank, authority) = setup();
    let admin = Pubkey::from_seed("platform-admin");
    init_platform(&mut bank, admin).unwrap();
    (bank, authority)
}

fn init_platform(bank: &mut Bank, admin: Pubkey) -> Result<TxReceipt, LedgerError> {
    bank.execute(&sign_transaction(Instruction::InitializePlatform, admin, 0))
}

fn create_project(
    bank: &mut Bank,
    authority: Pubkey,
    id: &str,
    budget: u64,
) -> Result<TxReceipt, LedgerError> {
    bank.execute(&sign_transaction(
        Instruction::InitializeProject {
            project_id: id.to_string(),
            title: "Rural clinics programme".to_string(),
            ministry: "Ministry of Health".to_string(),
            total_budget: budget,
        },
        authority,
        1,
    ))
}

fn add_milestone(
    bank: &mut Bank,
    authority: Pubkey,
    project: &str,
    index: u8,
    amount: u64,
) -> Result<TxReceipt, LedgerError> {
    bank.execute(&sign_transaction(
        Instruction::AddMilestone {
            project_id: project.to_string(),
            index,
            description: format!("Tranche {index}"),
            amount,
        },
        authority,
        100 + index as u64,
    ))
}

fn release(
    bank: &mut Bank,
    authority: Pubkey,
    project: &str,
    index: u8,
    nonce: u64,
) -> Result<TxReceipt, LedgerError> {
    bank.execute(&sign_transaction(
        Instruction::ReleaseFunds {
            project_id: project.to_string(),
            index,
            proof_url: "https://proofs.example/doc.pdf".to_string(),
        },
        authority,
        nonce,
    ))
}

fn load_project(bank: &Bank, id: &str) -> crate::types::Project {
    let addr = project_address(&bank.program_id(), id);
    decode_project(bank.account(&addr).unwrap()).unwrap()
}

fn load_milestone(bank: &Bank, id: &str, index: u8) -> crate::types::Milestone {
    let addr = milestone_address(&bank.program_id(), id, index);
    decode_milestone(bank.account(&addr).unwrap()).unwrap()
}

#[test]
fn platform_initializes_once() {
    let (mut bank, _) = setup();
    let admin = Pubkey::from_seed("platform-admin");
    init_platform(&mut bank, admin).unwrap();

    let addr = platform_address(&bank.program_id());
    let platform = decode_platform(bank.account(&addr).unwrap()).unwrap();
    assert_eq!(platform.admin, admin);
    assert_eq!(platform.project_count, 0);

    let again = bank.execute(&sign_transaction(
        Instruction::InitializePlatform,
        Pubkey::from_seed("someone-else"),
        9,
    ));
    assert_eq!(again, Err(LedgerError::AlreadyInitialized));
}

#[test]
fn project_creation_validates_inputs() {
    let (mut bank, authority) = setup_with_platform();

    let too_long = "X".repeat(33);
    assert_eq!(
        create_project(&mut bank, authority, &too_long, 1),
        Err(LedgerError::ProjectIdTooLong)
    );

    let empty_title = bank.execute(&sign_transaction(
        Instruction::InitializeProject {
            project_id: "P-1".to_string(),
            title: String::new(),
            ministry: "Health".to_string(),
            total_budget: 1,
        },
        authority,
        2,
    ));
    assert_eq!(empty_title, Err(LedgerError::InvalidTitle));

    assert_eq!(
        create_project(&mut bank, authority, "P-1", 0),
        Err(LedgerError::InvalidBudget)
    );

    // Nothing was created by the rejected attempts.
    let addr = project_address(&bank.program_id(), "P-1");
    assert!(bank.account(&addr).is_none());
}

#[test]
fn project_creation_increments_platform_counter() {
    let (mut bank, authority) = setup_with_platform();
    create_project(&mut bank, authority, "KEMENKES-2025-001", 5_000_000_000).unwrap();

    let platform = decode_platform(
        bank.account(&platform_address(&bank.program_id()))
            .unwrap(),
    )
    .unwrap();
    assert_eq!(platform.project_count, 1);

    let project = load_project(&bank, "KEMENKES-2025-001");
    assert_eq!(project.total_allocated, 0);
    assert_eq!(project.total_released, 0);
    assert_eq!(project.milestone_count, 0);
    assert_eq!(project.authority, authority);
    invariants::assert_all_project_invariants(&project);
}

#[test]
fn duplicate_project_id_is_rejected() {
    let (mut bank, authority) = setup_with_platform();
    create_project(&mut bank, authority, "P-1", 100).unwrap();

    let dup = bank.execute(&sign_transaction(
        Instruction::InitializeProject {
            project_id: "P-1".to_string(),
            title: "Another".to_string(),
            ministry: "Health".to_string(),
            total_budget: 50,
        },
        authority,
        77,
    ));
    let expected = project_address(&bank.program_id(), "P-1");
    assert_eq!(dup, Err(LedgerError::AccountInUse(expected)));

    // The counter did not move on the failed attempt.
    let platform = decode_platform(
        bank.account(&platform_address(&bank.program_id()))
            .unwrap(),
    )
    .unwrap();
    assert_eq!(platform.project_count, 1);
}

#[test]
fn add_milestone_requires_project_authority() {
    let (mut bank, authority) = setup_with_platform();
    create_project(&mut bank, authority, "P-1", 100).unwrap();

    let intruder = Pubkey::from_seed("intruder");
    assert_eq!(
        add_milestone(&mut bank, intruder, "P-1", 0, 10),
        Err(LedgerError::UnauthorizedAccess)
    );
}

#[test]
fn add_milestone_enforces_budget_and_uniqueness() {
    let (mut bank, authority) = setup_with_platform();
    create_project(&mut bank, authority, "P-1", 100).unwrap();

    add_milestone(&mut bank, authority, "P-1", 0, 60).unwrap();
    let before = load_project(&bank, "P-1");

    assert_eq!(
        add_milestone(&mut bank, authority, "P-1", 1, 41),
        Err(LedgerError::InsufficientBudget)
    );
    // Failed allocation changed nothing.
    assert_eq!(load_project(&bank, "P-1"), before);

    let dup_addr = milestone_address(&bank.program_id(), "P-1", 0);
    assert_eq!(
        add_milestone(&mut bank, authority, "P-1", 0, 10),
        Err(LedgerError::AccountInUse(dup_addr))
    );

    add_milestone(&mut bank, authority, "P-1", 1, 40).unwrap();
    let project = load_project(&bank, "P-1");
    assert_eq!(project.total_allocated, 100);
    assert_eq!(project.milestone_count, 2);
    invariants::assert_all_project_invariants(&project);
    invariants::assert_project_immutable_fields(&before, &project);
}

#[test]
fn release_transitions_exactly_once() {
    let (mut bank, authority) = setup_with_platform();
    create_project(&mut bank, authority, "P-1", 100).unwrap();
    add_milestone(&mut bank, authority, "P-1", 0, 60).unwrap();

    let before = load_milestone(&bank, "P-1", 0);
    invariants::assert_release_fields_consistent(&before);

    release(&mut bank, authority, "P-1", 0, 500).unwrap();

    let milestone = load_milestone(&bank, "P-1", 0);
    assert!(milestone.is_released);
    assert!(milestone.released_at.is_some());
    assert_eq!(milestone.proof_url, "https://proofs.example/doc.pdf");
    invariants::assert_release_fields_consistent(&milestone);

    let project = load_project(&bank, "P-1");
    assert_eq!(project.total_released, 60);

    // Second release attempt fails and does not double-count.
    assert_eq!(
        release(&mut bank, authority, "P-1", 0, 501),
        Err(LedgerError::MilestoneAlreadyReleased)
    );
    assert_eq!(load_project(&bank, "P-1").total_released, 60);
}

#[test]
fn release_requires_authority() {
    let (mut bank, authority) = setup_with_platform();
    create_project(&mut bank, authority, "P-1", 100).unwrap();
    add_milestone(&mut bank, authority, "P-1", 0, 60).unwrap();

    assert_eq!(
        release(&mut bank, Pubkey::from_seed("intruder"), "P-1", 0, 7),
        Err(LedgerError::UnauthorizedAccess)
    );
}

#[test]
fn duplicate_submission_is_rejected_without_state_change() {
    let (mut bank, authority) = setup_with_platform();
    create_project(&mut bank, authority, "P-1", 100).unwrap();
    add_milestone(&mut bank, authority, "P-1", 0, 60).unwrap();

    let tx = sign_transaction(
        Instruction::ReleaseFunds {
            project_id: "P-1".to_string(),
            index: 0,
            proof_url: "https://proof".to_string(),
        },
        authority,
        42,
    );
    let receipt = bank.execute(&tx).unwrap();
    assert_eq!(
        bank.execute(&tx),
        Err(LedgerError::AlreadyProcessed(receipt.signature))
    );
    assert_eq!(load_project(&bank, "P-1").total_released, 60);
}

#[test]
fn history_scan_finds_the_release_transaction() {
    let (mut bank, authority) = setup_with_platform();
    create_project(&mut bank, authority, "P-1", 100).unwrap();
    add_milestone(&mut bank, authority, "P-1", 0, 60).unwrap();
    add_milestone(&mut bank, authority, "P-1", 1, 40).unwrap();
    let receipt = release(&mut bank, authority, "P-1", 0, 9).unwrap();

    let ms_addr = milestone_address(&bank.program_id(), "P-1", 0);
    let records = bank.transactions_for(&ms_addr, 10);
    // Newest first: the release precedes the AddMilestone in the listing.
    assert_eq!(records.len(), 2);
    assert!(records[0].has_log_marker(LOG_RELEASE_FUNDS));
    assert_eq!(records[0].signature, receipt.signature);
    assert!(!records[1].has_log_marker(LOG_RELEASE_FUNDS));

    // The other milestone's history does not contain the release.
    let other = milestone_address(&bank.program_id(), "P-1", 1);
    assert!(bank
        .transactions_for(&other, 10)
        .iter()
        .all(|rec| !rec.has_log_marker(LOG_RELEASE_FUNDS)));

    assert_eq!(
        bank.transaction(&receipt.signature).unwrap().signature,
        receipt.signature
    );
}

/// The worked budget scenario: 5B budget, 2B + rejected 4B + 3B milestones,
/// then a single release of milestone 0.
#[test]
fn budget_lifecycle_scenario() {
    let (mut bank, authority) = setup_with_platform();
    create_project(&mut bank, authority, "KEMENKES-2025-001", 5_000_000_000).unwrap();

    add_milestone(&mut bank, authority, "KEMENKES-2025-001", 0, 2_000_000_000).unwrap();
    assert_eq!(
        load_project(&bank, "KEMENKES-2025-001").total_allocated,
        2_000_000_000
    );

    assert_eq!(
        add_milestone(&mut bank, authority, "KEMENKES-2025-001", 99, 4_000_000_000),
        Err(LedgerError::InsufficientBudget)
    );
    assert_eq!(
        load_project(&bank, "KEMENKES-2025-001").total_allocated,
        2_000_000_000
    );

    add_milestone(&mut bank, authority, "KEMENKES-2025-001", 1, 3_000_000_000).unwrap();
    let project = load_project(&bank, "KEMENKES-2025-001");
    assert_eq!(project.total_allocated, 5_000_000_000);
    invariants::assert_all_project_invariants(&project);

    release(&mut bank, authority, "KEMENKES-2025-001", 0, 900).unwrap();
    assert_eq!(
        load_project(&bank, "KEMENKES-2025-001").total_released,
        2_000_000_000
    );

    assert_eq!(
        release(&mut bank, authority, "KEMENKES-2025-001", 0, 901),
        Err(LedgerError::MilestoneAlreadyReleased)
    );
    let final_state = load_project(&bank, "KEMENKES-2025-001");
    assert_eq!(final_state.total_released, 2_000_000_000);
    invariants::assert_all_project_invariants(&final_state);
}
