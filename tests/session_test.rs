mod support;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use oa_scheduler::retry::RetryPolicy;
use oa_scheduler::session::SessionProvider;
use oa_scheduler::sheets::memory::{InMemorySheets, SheetsOp};
use oa_scheduler::{RemoteError, SchedulerError};

use support::{SHEET_URL, no_retry, provider, schedule_book};

#[tokio::test]
async fn client_is_built_once() {
    let connects = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&connects);
    let sessions = SessionProvider::new(
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(schedule_book())
        },
        no_retry(),
    );

    let a = sessions.get_client().await.unwrap();
    let b = sessions.get_client().await.unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    sessions.open_spreadsheet(SHEET_URL).await.unwrap();
    assert_eq!(connects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn spreadsheet_handle_is_reused() {
    let sheets = Arc::new(schedule_book());
    let sessions = provider(Arc::clone(&sheets));

    let first = sessions.open_spreadsheet(SHEET_URL).await.unwrap();
    let second = sessions.open_spreadsheet(&format!("  {}  ", SHEET_URL)).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(sheets.calls(SheetsOp::Open), 1);
    assert_eq!(first.title(), "OA Schedule Spring");
    assert_eq!(first.id(), "1TestSheetKey_abcdefghijklmnop");
}

#[tokio::test]
async fn missing_credentials_are_a_configuration_error() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let sessions: SessionProvider<InMemorySheets> = SessionProvider::new(
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(SchedulerError::configuration(
                "Missing service account in secrets (gcp_service_account).",
                "Add the key.",
            ))
        },
        no_retry(),
    );

    let err = sessions.open_spreadsheet(SHEET_URL).await.unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(err.to_string(), "Missing service account in secrets (gcp_service_account).");
    assert_eq!(err.hint(), Some("Add the key."));

    // Failures are not cached; the next request tries again
    assert!(sessions.get_client().await.is_err());
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn recovers_once_credentials_appear() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let sessions = SessionProvider::new(
        move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(SchedulerError::configuration("no key yet", "add it"))
            } else {
                Ok(schedule_book())
            }
        },
        no_retry(),
    );

    assert!(sessions.open_spreadsheet(SHEET_URL).await.is_err());
    assert!(sessions.open_spreadsheet(SHEET_URL).await.is_ok());
}

#[tokio::test]
async fn non_url_locator_is_a_configuration_error() {
    let sheets = Arc::new(schedule_book());
    let sessions = provider(Arc::clone(&sheets));

    let err = sessions.open_spreadsheet("my schedule").await.unwrap_err();
    assert!(matches!(err, SchedulerError::Configuration { .. }));
    assert_eq!(sheets.calls(SheetsOp::Open), 0);
}

#[tokio::test]
async fn unknown_spreadsheet_is_permanent() {
    let sheets = Arc::new(InMemorySheets::new());
    let sessions = provider(Arc::clone(&sheets));

    let err = sessions.open_spreadsheet(SHEET_URL).await.unwrap_err();
    assert!(matches!(err, SchedulerError::PermanentRemote(_)));
    assert!(!err.is_fatal());
    assert_eq!(sheets.calls(SheetsOp::Open), 1);
}

#[tokio::test(start_paused = true)]
async fn open_retries_quota_bursts() {
    let sheets = Arc::new(schedule_book());
    let sessions = provider(Arc::clone(&sheets));
    for _ in 0..3 {
        sheets.fail_next(SheetsOp::Open, RemoteError::with_status(429, "Quota exceeded"));
    }

    let handle = sessions.open_spreadsheet(SHEET_URL).await.unwrap();
    assert_eq!(handle.title(), "OA Schedule Spring");
    assert_eq!(sheets.calls(SheetsOp::Open), 4);
}

#[tokio::test(start_paused = true)]
async fn open_gives_up_after_the_attempt_ceiling() {
    let sheets = Arc::new(schedule_book());
    let sessions = SessionProvider::with_backend(Arc::clone(&sheets), RetryPolicy::default());
    for _ in 0..6 {
        sheets.fail_next(SheetsOp::Open, RemoteError::with_status(503, "Service unavailable"));
    }

    let err = sessions.open_spreadsheet(SHEET_URL).await.unwrap_err();
    assert!(matches!(err, SchedulerError::TransientRemote(_)));
    assert_eq!(err.hint(), Some("Reload the page to try again."));
    assert_eq!(sheets.calls(SheetsOp::Open), 6);

    // Nothing was cached, the next open succeeds
    assert!(sessions.open_spreadsheet(SHEET_URL).await.is_ok());
}
