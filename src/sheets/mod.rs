//! Read-only access to a remote spreadsheet.
//!
//! [`SheetsBackend`] is the capability the rest of the crate calls; the
//! Google implementation lives in [`google`] and an in-memory one in
//! [`memory`]. [`SpreadsheetHandle`] wraps a backend plus one opened
//! spreadsheet and routes every call through [`with_backoff`].

#[cfg(feature = "web")]
pub mod google;
pub mod memory;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::error::RemoteError;
use crate::retry::{RetryPolicy, with_backoff};

lazy_static! {
    static ref URL_KEY_REGEX: Regex = Regex::new(r"/spreadsheets/d/([A-Za-z0-9_-]+)").unwrap();
    static ref BARE_KEY_REGEX: Regex = Regex::new(r"^[A-Za-z0-9_-]{20,}$").unwrap();
}

/// Extract the spreadsheet key from a sharing URL, or accept a bare key
///
/// # Examples
/// ```
/// use oa_scheduler::sheets::spreadsheet_key;
///
/// let url = "https://docs.google.com/spreadsheets/d/1AbCdEfGhIjKlMnOpQrStUvWxYz/edit#gid=0";
/// assert_eq!(spreadsheet_key(url), Some("1AbCdEfGhIjKlMnOpQrStUvWxYz"));
/// assert_eq!(spreadsheet_key("not a sheet"), None);
/// ```
pub fn spreadsheet_key(locator: &str) -> Option<&str> {
    let locator = locator.trim();
    if let Some(caps) = URL_KEY_REGEX.captures(locator) {
        return caps.get(1).map(|m| m.as_str());
    }
    if BARE_KEY_REGEX.is_match(locator) {
        return Some(locator);
    }
    None
}

/// Metadata of an opened spreadsheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadsheetMeta {
    pub id: String,
    pub title: String,
}

/// One sheet tab inside a spreadsheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorksheetTab {
    pub title: String,
    pub hidden: bool,
    /// Ordinal position, 0 is the leftmost tab
    pub index: usize,
}

impl WorksheetTab {
    pub fn new(title: impl Into<String>, index: usize) -> Self {
        WorksheetTab {
            title: title.into(),
            hidden: false,
            index,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
}

/// Cell content as returned by a read; formatted reads are mostly text
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Empty,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl CellValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric reading of the cell; text is parsed leniently
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) if n.is_finite() => Some(*n),
            CellValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(s.to_string())
        }
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<&serde_json::Value> for CellValue {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => CellValue::Empty,
            serde_json::Value::Bool(b) => CellValue::Bool(*b),
            serde_json::Value::Number(n) => n.as_f64().map(CellValue::Number).unwrap_or_default(),
            serde_json::Value::String(s) if s.is_empty() => CellValue::Empty,
            serde_json::Value::String(s) => CellValue::Text(s.clone()),
            other => CellValue::Text(other.to_string()),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Bool(true) => write!(f, "TRUE"),
            CellValue::Bool(false) => write!(f, "FALSE"),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// A data row keyed by its header text
pub type Record = HashMap<String, CellValue>;

/// Turn a value grid into header-keyed records
///
/// The first row is the header, trimmed. Cells past the header width are
/// dropped and short rows are filled with [`CellValue::Empty`].
pub fn records_from_values(values: &[Vec<CellValue>]) -> Vec<Record> {
    let Some((header, rows)) = values.split_first() else {
        return Vec::new();
    };
    let header: Vec<String> = header.iter().map(|h| h.to_string().trim().to_string()).collect();

    rows.iter()
        .map(|row| {
            header
                .iter()
                .enumerate()
                .filter(|(_, h)| !h.is_empty())
                .map(|(i, h)| (h.clone(), row.get(i).cloned().unwrap_or_default()))
                .collect()
        })
        .collect()
}

/// Remote spreadsheet capability
///
/// Implementations report failures as [`RemoteError`] with the HTTP status
/// when one exists, so [`with_backoff`] can classify them.
pub trait SheetsBackend: Send + Sync + 'static {
    /// Resolve a locator (URL or key) to spreadsheet metadata
    fn open_by_url(
        &self,
        locator: &str,
    ) -> impl Future<Output = Result<SpreadsheetMeta, RemoteError>> + Send;

    /// List every tab in sheet order
    fn worksheets(
        &self,
        spreadsheet_id: &str,
    ) -> impl Future<Output = Result<Vec<WorksheetTab>, RemoteError>> + Send;

    /// Read all values of one tab, row-major
    fn values(
        &self,
        spreadsheet_id: &str,
        title: &str,
    ) -> impl Future<Output = Result<Vec<Vec<CellValue>>, RemoteError>> + Send;
}

/// An opened spreadsheet bound to the backend that opened it
pub struct SpreadsheetHandle<B> {
    backend: Arc<B>,
    meta: SpreadsheetMeta,
    locator: String,
    retry: RetryPolicy,
}

impl<B> Clone for SpreadsheetHandle<B> {
    fn clone(&self) -> Self {
        SpreadsheetHandle {
            backend: Arc::clone(&self.backend),
            meta: self.meta.clone(),
            locator: self.locator.clone(),
            retry: self.retry.clone(),
        }
    }
}

impl<B> fmt::Debug for SpreadsheetHandle<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpreadsheetHandle")
            .field("meta", &self.meta)
            .field("locator", &self.locator)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl<B: SheetsBackend> SpreadsheetHandle<B> {
    pub fn new(backend: Arc<B>, meta: SpreadsheetMeta, locator: &str, retry: RetryPolicy) -> Self {
        SpreadsheetHandle {
            backend,
            meta,
            locator: locator.to_string(),
            retry,
        }
    }

    pub fn id(&self) -> &str {
        &self.meta.id
    }

    pub fn title(&self) -> &str {
        &self.meta.title
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub async fn worksheets(&self) -> Result<Vec<WorksheetTab>, RemoteError> {
        with_backoff(&self.retry, || self.backend.worksheets(&self.meta.id)).await
    }

    /// Look a tab up by exact title; `Ok(None)` when it does not exist
    pub async fn worksheet(&self, title: &str) -> Result<Option<WorksheetTab>, RemoteError> {
        let tabs = self.worksheets().await?;
        Ok(tabs.into_iter().find(|tab| tab.title == title))
    }

    pub async fn values(&self, title: &str) -> Result<Vec<Vec<CellValue>>, RemoteError> {
        with_backoff(&self.retry, || self.backend.values(&self.meta.id, title)).await
    }

    /// Values of one 1-based row, empty when the row is past the data
    pub async fn row_values(&self, title: &str, row: usize) -> Result<Vec<CellValue>, RemoteError> {
        let values = self.values(title).await?;
        Ok(row
            .checked_sub(1)
            .and_then(|i| values.into_iter().nth(i))
            .unwrap_or_default())
    }

    pub async fn get_all_records(&self, title: &str) -> Result<Vec<Record>, RemoteError> {
        let values = self.values(title).await?;
        Ok(records_from_values(&values))
    }
}
