use serde::Serialize;

use crate::error::Result;
use crate::sheets::{CellValue, SheetsBackend, SpreadsheetHandle};
use crate::tabs::is_on_call;

/// A tab rendered as-is, every cell as display text
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TabPeek {
    pub title: String,
    pub on_call: bool,
    /// Width of the widest row; every row is padded to it
    pub width: usize,
    pub rows: Vec<Vec<String>>,
}

impl TabPeek {
    pub fn from_values(title: &str, values: &[Vec<CellValue>]) -> Self {
        let mut rows: Vec<Vec<String>> = values
            .iter()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect();

        while rows
            .last()
            .is_some_and(|row| row.iter().all(|cell| cell.trim().is_empty()))
        {
            rows.pop();
        }

        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        for row in rows.iter_mut() {
            row.resize(width, String::new());
        }

        TabPeek {
            title: title.to_string(),
            on_call: is_on_call(title),
            width,
            rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Read one tab for display
pub async fn peek_tab<B: SheetsBackend>(handle: &SpreadsheetHandle<B>, title: &str) -> Result<TabPeek> {
    let values = handle.values(title).await?;
    Ok(TabPeek::from_values(title, &values))
}
