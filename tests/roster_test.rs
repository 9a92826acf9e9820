mod support;

use std::sync::Arc;
use std::time::Duration;

use oa_scheduler::cache::ManualClock;
use oa_scheduler::config::SchedulerConfig;
use oa_scheduler::roster::{RosterIndex, RosterLoader, canonicalize, load_roster_from, roster_from_values};
use oa_scheduler::sheets::CellValue;
use oa_scheduler::sheets::memory::{InMemorySheets, SheetsOp};
use oa_scheduler::{RemoteError, SchedulerError};

use support::{SHEET_URL, provider, schedule_book, schedule_book_without_roster};

const ALIASES: [&str; 3] = ["Name", "Full Name", "OA"];

fn grid(rows: &[&[&str]]) -> Vec<Vec<CellValue>> {
    rows.iter()
        .map(|row| row.iter().map(|cell| CellValue::from(*cell)).collect())
        .collect()
}

#[test]
fn alias_header_and_trimmed_names() {
    let values = grid(&[&["Full Name", "Role"], &[" Alice Smith ", "OA"]]);
    assert_eq!(roster_from_values(&values, "OA Name", &ALIASES), vec!["Alice Smith"]);
}

#[test]
fn primary_header_wins_over_aliases() {
    let values = grid(&[
        &["Name", "oa name"],
        &["Nickname", "Alice Smith"],
        &["Bobby", "Bob Jones"],
    ]);
    assert_eq!(
        roster_from_values(&values, "OA Name", &ALIASES),
        vec!["Alice Smith", "Bob Jones"]
    );
}

#[test]
fn falls_back_to_header_starting_with_name() {
    let values = grid(&[&["Email", "Name (legal)"], &["a@x.edu", "Alice Smith"]]);
    assert_eq!(roster_from_values(&values, "OA Name", &ALIASES), vec!["Alice Smith"]);
}

#[test]
fn no_name_column_means_empty_roster() {
    let values = grid(&[&["Email", "Role"], &["a@x.edu", "OA"]]);
    assert!(roster_from_values(&values, "OA Name", &ALIASES).is_empty());
    assert!(roster_from_values(&[], "OA Name", &ALIASES).is_empty());
}

#[test]
fn keeps_order_and_duplicates_but_skips_non_text() {
    let values = vec![
        vec![CellValue::from("OA Name")],
        vec![CellValue::from("Cara Diaz")],
        vec![CellValue::Number(42.0)],
        vec![CellValue::from("   ")],
        vec![],
        vec![CellValue::from("Alice Smith")],
        vec![CellValue::from("cara  diaz")],
    ];
    assert_eq!(
        roster_from_values(&values, "OA Name", &ALIASES),
        vec!["Cara Diaz", "Alice Smith", "cara  diaz"]
    );
}

#[test]
fn canonicalize_ignores_case_and_spacing() {
    assert_eq!(canonicalize("ALICE   smith", &["Alice Smith"]).unwrap(), "Alice Smith");
    assert_eq!(canonicalize("\talice smith\n", &["Alice Smith"]).unwrap(), "Alice Smith");

    let err = canonicalize("Bob", &["Alice Smith"]).unwrap_err();
    assert!(matches!(err, SchedulerError::NotInRoster { ref input } if input == "Bob"));
    assert!(!err.is_fatal());
}

#[test]
fn canonicalize_rejects_blank_input() {
    assert!(matches!(
        canonicalize("   ", &["Alice Smith"]),
        Err(SchedulerError::NotInRoster { .. })
    ));
}

#[test]
fn later_duplicate_key_wins() {
    let index = RosterIndex::new(&["alice smith", "Alice Smith", "Bob Jones"]);
    assert_eq!(index.len(), 2);
    assert!(index.contains("ALICE SMITH"));
    assert_eq!(index.canonicalize("alice smith").unwrap(), "Alice Smith");
}

#[tokio::test]
async fn loads_roster_tab_from_spreadsheet() {
    let sessions = provider(Arc::new(schedule_book()));
    let handle = sessions.open_spreadsheet(SHEET_URL).await.unwrap();

    let roster = load_roster_from(&handle, &SchedulerConfig::default()).await.unwrap();
    assert_eq!(roster, vec!["Alice Smith", "Bob Jones"]);
}

#[tokio::test]
async fn missing_roster_tab_is_empty_not_an_error() {
    let sessions = provider(Arc::new(schedule_book_without_roster()));
    let handle = sessions.open_spreadsheet(SHEET_URL).await.unwrap();

    let roster = load_roster_from(&handle, &SchedulerConfig::default()).await.unwrap();
    assert!(roster.is_empty());
}

#[tokio::test]
async fn unreadable_roster_tab_is_an_error() {
    let sheets = Arc::new(schedule_book());
    let sessions = provider(Arc::clone(&sheets));
    let handle = sessions.open_spreadsheet(SHEET_URL).await.unwrap();

    sheets.fail_next(
        SheetsOp::Values,
        RemoteError::with_status(403, "The caller does not have permission"),
    );
    let err = load_roster_from(&handle, &SchedulerConfig::default()).await.unwrap_err();
    assert!(matches!(err, SchedulerError::PermanentRemote(ref e) if e.status == Some(403)));
}

#[tokio::test(start_paused = true)]
async fn failed_roster_read_is_not_cached() {
    let sheets = Arc::new(schedule_book());
    let loader = RosterLoader::new(
        provider(Arc::clone(&sheets)),
        SchedulerConfig::default(),
        Arc::new(ManualClock::new()),
    );

    for _ in 0..6 {
        sheets.fail_next(SheetsOp::Values, RemoteError::with_status(429, "Quota exceeded"));
    }
    let err = loader.load_roster(SHEET_URL).await.unwrap_err();
    assert!(matches!(err, SchedulerError::TransientRemote(_)));
    assert_eq!(sheets.calls(SheetsOp::Values), 6);

    // No clock movement: a cached empty roster would be returned here
    let roster = loader.load_roster(SHEET_URL).await.unwrap();
    assert_eq!(roster.as_slice(), ["Alice Smith", "Bob Jones"]);
    assert_eq!(sheets.calls(SheetsOp::Values), 7);
}

#[tokio::test]
async fn roster_is_cached_until_ttl() {
    let sheets = Arc::new(schedule_book());
    let clock = ManualClock::new();
    let config = SchedulerConfig {
        roster_ttl_secs: 300,
        ..SchedulerConfig::default()
    };
    let loader = RosterLoader::new(provider(Arc::clone(&sheets)), config, Arc::new(clock.clone()));

    let first = loader.load_roster(SHEET_URL).await.unwrap();
    assert_eq!(first.as_slice(), ["Alice Smith", "Bob Jones"]);
    let reads = sheets.calls(SheetsOp::Values);

    sheets.set_values(
        SHEET_URL,
        "Hired OAs",
        grid(&[&["OA Name"], &["Alice Smith"], &["Bob Jones"], &["Cara Diaz"]]),
    );
    clock.advance(Duration::from_secs(299));
    let cached = loader.load_roster(SHEET_URL).await.unwrap();
    assert!(Arc::ptr_eq(&first, &cached));
    assert_eq!(sheets.calls(SheetsOp::Values), reads);

    clock.advance(Duration::from_secs(1));
    let fresh = loader.load_roster(SHEET_URL).await.unwrap();
    assert_eq!(fresh.len(), 3);
    assert_eq!(sheets.calls(SheetsOp::Values), reads + 1);
}

#[tokio::test]
async fn unknown_spreadsheet_fails_the_load() {
    let loader = RosterLoader::new(
        provider(Arc::new(InMemorySheets::new())),
        SchedulerConfig::default(),
        Arc::new(ManualClock::new()),
    );
    let err = loader.load_roster(SHEET_URL).await.unwrap_err();
    assert!(matches!(err, SchedulerError::PermanentRemote(ref e) if e.status == Some(404)));
}
