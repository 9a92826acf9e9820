use std::collections::{HashMap, VecDeque};
use std::future::{Future, ready};
use std::sync::Mutex;

use super::{CellValue, SheetsBackend, SpreadsheetMeta, WorksheetTab, spreadsheet_key};
use crate::error::RemoteError;

/// Backend operation, used to inject failures and count calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SheetsOp {
    Open,
    Worksheets,
    Values,
}

#[derive(Default)]
struct Book {
    title: String,
    tabs: Vec<(WorksheetTab, Vec<Vec<CellValue>>)>,
}

#[derive(Default)]
struct State {
    books: HashMap<String, Book>,
    failures: HashMap<SheetsOp, VecDeque<RemoteError>>,
    tab_failures: HashMap<String, VecDeque<RemoteError>>,
    calls: HashMap<SheetsOp, usize>,
}

/// Spreadsheet service held entirely in memory
///
/// Used by the tests and for local runs without credentials. Failures queued
/// with [`InMemorySheets::fail_next`] are returned before any real answer.
#[derive(Default)]
pub struct InMemorySheets {
    state: Mutex<State>,
}

impl InMemorySheets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a spreadsheet under the key found in `locator`
    pub fn add_spreadsheet(&self, locator: &str, title: &str) -> &Self {
        let key = spreadsheet_key(locator).unwrap_or(locator).to_string();
        let mut state = self.lock();
        state.books.entry(key).or_default().title = title.to_string();
        self
    }

    /// Append a visible tab filled with text cells; `""` becomes an empty cell
    pub fn add_tab(&self, locator: &str, title: &str, rows: &[&[&str]]) -> &Self {
        let values = rows
            .iter()
            .map(|row| row.iter().map(|cell| CellValue::from(*cell)).collect())
            .collect();
        self.add_tab_values(locator, title, false, values)
    }

    pub fn add_hidden_tab(&self, locator: &str, title: &str) -> &Self {
        self.add_tab_values(locator, title, true, Vec::new())
    }

    pub fn add_tab_values(
        &self,
        locator: &str,
        title: &str,
        hidden: bool,
        values: Vec<Vec<CellValue>>,
    ) -> &Self {
        let key = spreadsheet_key(locator).unwrap_or(locator).to_string();
        let mut state = self.lock();
        let book = state.books.entry(key).or_default();
        let mut tab = WorksheetTab::new(title, book.tabs.len());
        tab.hidden = hidden;
        book.tabs.push((tab, values));
        self
    }

    /// Replace the values of an existing tab
    pub fn set_values(&self, locator: &str, title: &str, values: Vec<Vec<CellValue>>) {
        let key = spreadsheet_key(locator).unwrap_or(locator);
        let mut state = self.lock();
        if let Some(book) = state.books.get_mut(key) {
            if let Some((_, existing)) = book.tabs.iter_mut().find(|(tab, _)| tab.title == title) {
                *existing = values;
            }
        }
    }

    /// Queue `err` to be returned by the next call to `op`
    pub fn fail_next(&self, op: SheetsOp, err: RemoteError) {
        self.lock().failures.entry(op).or_default().push_back(err);
    }

    /// Queue `err` for the next values read of the tab `title` only
    pub fn fail_values(&self, title: &str, err: RemoteError) {
        self.lock()
            .tab_failures
            .entry(title.to_string())
            .or_default()
            .push_back(err);
    }

    pub fn calls(&self, op: SheetsOp) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn begin(&self, op: SheetsOp) -> Result<std::sync::MutexGuard<'_, State>, RemoteError> {
        let mut state = self.lock();
        *state.calls.entry(op).or_default() += 1;
        let queued = state.failures.get_mut(&op).and_then(|queue| queue.pop_front());
        match queued {
            Some(err) => Err(err),
            None => Ok(state),
        }
    }

    fn not_found(what: &str) -> RemoteError {
        RemoteError::with_status(404, format!("Requested entity was not found: {}", what))
    }

    fn do_open(&self, locator: &str) -> Result<SpreadsheetMeta, RemoteError> {
        let state = self.begin(SheetsOp::Open)?;
        let key = spreadsheet_key(locator).unwrap_or(locator);
        let book = state.books.get(key).ok_or_else(|| Self::not_found(locator))?;
        Ok(SpreadsheetMeta {
            id: key.to_string(),
            title: book.title.clone(),
        })
    }

    fn do_worksheets(&self, id: &str) -> Result<Vec<WorksheetTab>, RemoteError> {
        let state = self.begin(SheetsOp::Worksheets)?;
        let book = state.books.get(id).ok_or_else(|| Self::not_found(id))?;
        Ok(book.tabs.iter().map(|(tab, _)| tab.clone()).collect())
    }

    fn do_values(&self, id: &str, title: &str) -> Result<Vec<Vec<CellValue>>, RemoteError> {
        let mut state = self.begin(SheetsOp::Values)?;
        if let Some(err) = state.tab_failures.get_mut(title).and_then(|q| q.pop_front()) {
            return Err(err);
        }
        let book = state.books.get(id).ok_or_else(|| Self::not_found(id))?;
        book.tabs
            .iter()
            .find(|(tab, _)| tab.title == title)
            .map(|(_, values)| values.clone())
            .ok_or_else(|| {
                RemoteError::with_status(400, format!("Unable to parse range: '{}'", title))
            })
    }
}

impl SheetsBackend for InMemorySheets {
    fn open_by_url(
        &self,
        locator: &str,
    ) -> impl Future<Output = Result<SpreadsheetMeta, RemoteError>> + Send {
        ready(self.do_open(locator))
    }

    fn worksheets(
        &self,
        spreadsheet_id: &str,
    ) -> impl Future<Output = Result<Vec<WorksheetTab>, RemoteError>> + Send {
        ready(self.do_worksheets(spreadsheet_id))
    }

    fn values(
        &self,
        spreadsheet_id: &str,
        title: &str,
    ) -> impl Future<Output = Result<Vec<Vec<CellValue>>, RemoteError>> + Send {
        ready(self.do_values(spreadsheet_id, title))
    }
}
