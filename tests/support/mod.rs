//! Shared fixture: a scheduling spreadsheet held in memory.
#![allow(dead_code)]

use std::sync::Arc;

use oa_scheduler::cache::Clock;
use oa_scheduler::config::SchedulerConfig;
use oa_scheduler::retry::RetryPolicy;
use oa_scheduler::session::SessionProvider;
use oa_scheduler::sheets::CellValue;
use oa_scheduler::sheets::memory::InMemorySheets;
use oa_scheduler::view::Dashboard;

pub const SHEET_URL: &str =
    "https://docs.google.com/spreadsheets/d/1TestSheetKey_abcdefghijklmnop/edit#gid=0";

/// Tabs a user may browse in [`schedule_book`]
pub const SELECTABLE: [&str; 3] = ["UNH Week 1", "MC Week 1", "On-Call Jan"];

fn text(s: &str) -> CellValue {
    CellValue::from(s)
}

/// The full fixture spreadsheet
///
/// Alice Smith works 3.5 h in "UNH Week 1", 4 h in "MC Week 1" and 6 h in
/// "On-Call Jan" (13.5 h). Bob Jones works 3.5 h + 2.5 h (6 h).
pub fn schedule_book() -> InMemorySheets {
    book(true)
}

/// Same spreadsheet without the roster tab
pub fn schedule_book_without_roster() -> InMemorySheets {
    book(false)
}

fn book(with_roster: bool) -> InMemorySheets {
    let sheets = InMemorySheets::new();
    sheets
        .add_spreadsheet(SHEET_URL, "OA Schedule Spring")
        .add_tab(SHEET_URL, "Cover", &[&["OA Schedule"], &["Read me first"]]);
    if with_roster {
        sheets.add_tab(
            SHEET_URL,
            "Hired OAs",
            &[
                &["OA Name", "Email"],
                &["Alice Smith", "alice@example.edu"],
                &["Bob Jones", "bob@example.edu"],
                &["", ""],
            ],
        );
    }
    add_schedule_tabs(&sheets);
    sheets
}

pub fn add_schedule_tabs(sheets: &InMemorySheets) {
    sheets
        .add_tab(
            SHEET_URL,
            "UNH Week 1",
            &[
                &["Time", "Mon", "Tue"],
                &["9:00 AM - 11:00 AM", "Alice Smith", "Bob Jones"],
                &["11:00 AM - 12:30 PM", "alice smith / Bob Jones", ""],
                &["Notes", "Alice Smith", ""],
            ],
        )
        .add_tab(
            SHEET_URL,
            "MC Week 1",
            &[&["Time", "Wed"], &["13:00-17:00", "Alice Smith"]],
        )
        .add_tab_values(
            SHEET_URL,
            "On-Call Jan",
            false,
            vec![
                vec![text("Name"), text("Hours")],
                vec![text("Alice Smith"), CellValue::Number(6.0)],
                vec![text("Bob Jones"), text("2.5")],
                vec![text("Alice Smith"), text("n/a")],
            ],
        )
        .add_tab(SHEET_URL, "Audit Log", &[&["When", "Who"]])
        .add_tab(SHEET_URL, "Locks", &[&["Tab", "Holder"]])
        .add_hidden_tab(SHEET_URL, "UNH Old")
        .add_tab(SHEET_URL, "Budget", &[&["Item", "Cost"]]);
}

/// Policy without sleeps, for tests that never see transient errors
pub fn no_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 1,
        base_delay_ms: 0,
        max_jitter_ms: 0,
    }
}

pub fn provider(sheets: Arc<InMemorySheets>) -> Arc<SessionProvider<InMemorySheets>> {
    Arc::new(SessionProvider::with_backend(sheets, RetryPolicy::default()))
}

pub fn dashboard(sheets: Arc<InMemorySheets>) -> Dashboard<InMemorySheets> {
    Dashboard::new(
        SchedulerConfig::default(),
        Ok(SHEET_URL.to_string()),
        provider(sheets),
    )
}

pub fn dashboard_with_clock(
    sheets: Arc<InMemorySheets>,
    clock: Arc<dyn Clock>,
) -> Dashboard<InMemorySheets> {
    Dashboard::with_clock(
        SchedulerConfig::default(),
        Ok(SHEET_URL.to_string()),
        provider(sheets),
        clock,
    )
}
