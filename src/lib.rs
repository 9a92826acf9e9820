/*!
# OA Scheduler

A small web dashboard where on-call staff ("OAs") look up their schedule in
the shared scheduling spreadsheet.

## Overview

The application authenticates to the spreadsheet service with a service
account, loads the roster of hired OA names, validates the name a user types,
and shows a read-only peek of the selected schedule tab together with the
hours that OA is scheduled for.

## Architecture

### Remote Layer
- **sheets**: [`SheetsBackend`](sheets::SheetsBackend) capability with a
  Google Sheets implementation and an in-memory one
- **retry**: exponential backoff with jitter for quota bursts and 5xx errors
- **session**: authenticated client and per-locator spreadsheet handles, built
  once and shared

### Domain Layer
- **roster**: name column detection, roster loading and name canonicalization
- **tabs**: which tabs a user may browse
- **hours**: hours worked per OA against the weekly target
- **peek**: tabs rendered as-is
- **view**: the Schedule page view model

### Web Layer (`web` feature)
- **app**: routing and per-browser UI sessions

## Error Handling

Every failure is a [`SchedulerError`](error::SchedulerError). Only
configuration problems (no credentials, no spreadsheet URL) halt the Schedule
view; everything else degrades to a notice.

## Routes

- `/` - Home
- `/schedule` - Schedule view, `?name=` and `?tab=` update the session
- `/schedule/hours/refresh` - recompute the hours total
- `/api/schedule` - Schedule view model as JSON
*/

pub mod cache;
pub mod config;
pub mod error;
pub mod hours;
pub mod peek;
pub mod retry;
pub mod roster;
pub mod session;
pub mod sheets;
pub mod tabs;
pub mod view;

#[cfg(feature = "web")]
pub mod app;

pub use error::{RemoteError, Result, SchedulerError};
