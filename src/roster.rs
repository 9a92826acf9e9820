//! Hired OA roster: loading names and canonicalizing typed input.

use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::cache::{Clock, TtlCache};
use crate::config::SchedulerConfig;
use crate::error::{Result, SchedulerError};
use crate::session::SessionProvider;
use crate::sheets::{CellValue, SheetsBackend, SpreadsheetHandle, records_from_values};

/// Normalization key of a name: lowercase, runs of whitespace collapsed
///
/// # Examples
/// ```
/// use oa_scheduler::roster::name_key;
///
/// assert_eq!(name_key("  ALICE \t smith "), "alice smith");
/// ```
pub fn name_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Find the header of the name column
///
/// Exact case-insensitive match against `primary` then each alias, in that
/// order; failing that, the first header starting with "name".
pub fn resolve_name_header<S: AsRef<str>>(
    header: &[CellValue],
    primary: &str,
    aliases: &[S],
) -> Option<String> {
    let mut by_low: Vec<(String, String)> = Vec::new();
    for cell in header {
        let actual = cell.to_string().trim().to_string();
        if actual.is_empty() {
            continue;
        }
        let low = actual.to_lowercase();
        if !by_low.iter().any(|(l, _)| *l == low) {
            by_low.push((low, actual));
        }
    }

    let wanted = std::iter::once(primary).chain(aliases.iter().map(|a| a.as_ref()));
    for want in wanted {
        let want = want.trim().to_lowercase();
        if let Some((_, actual)) = by_low.iter().find(|(low, _)| *low == want) {
            return Some(actual.clone());
        }
    }

    by_low
        .into_iter()
        .find(|(low, _)| low.starts_with("name"))
        .map(|(_, actual)| actual)
}

/// Names found in a roster value grid, in row order
pub fn roster_from_values<S: AsRef<str>>(
    values: &[Vec<CellValue>],
    primary: &str,
    aliases: &[S],
) -> Vec<String> {
    let Some(header) = values.first() else {
        return Vec::new();
    };
    let Some(name_header) = resolve_name_header(header, primary, aliases) else {
        return Vec::new();
    };

    records_from_values(values)
        .iter()
        .filter_map(|row| row.get(&name_header).and_then(CellValue::as_text))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Read the roster tab of an opened spreadsheet
///
/// A roster tab that does not exist yields an empty list so the rest of the
/// Schedule view stays usable. A tab that exists but cannot be read is an
/// error.
pub async fn load_roster_from<B: SheetsBackend>(
    handle: &SpreadsheetHandle<B>,
    config: &SchedulerConfig,
) -> Result<Vec<String>> {
    if handle.worksheet(&config.roster_sheet).await?.is_none() {
        warn!("roster tab '{}' not found", config.roster_sheet);
        return Ok(Vec::new());
    }

    let values = handle.values(&config.roster_sheet).await?;
    let roster = roster_from_values(
        &values,
        &config.roster_name_header,
        &config.roster_name_aliases,
    );
    if roster.is_empty() {
        warn!("roster tab '{}' has no usable name column", config.roster_sheet);
    }
    Ok(roster)
}

/// Known name keys and the key → display name map
#[derive(Debug, Clone, Default)]
pub struct RosterIndex {
    keys: HashSet<String>,
    canon_by_key: HashMap<String, String>,
}

impl RosterIndex {
    /// Later entries win when two names share a key; each shadowing is logged
    pub fn new<S: AsRef<str>>(roster: &[S]) -> Self {
        let mut index = RosterIndex::default();
        for name in roster {
            let name = name.as_ref();
            let key = name_key(name);
            if key.is_empty() {
                continue;
            }
            if let Some(previous) = index.canon_by_key.insert(key.clone(), name.to_string()) {
                if previous != name {
                    warn!(
                        "roster names '{}' and '{}' collapse to the same key, using '{}'",
                        previous, name, name
                    );
                }
            }
            index.keys.insert(key);
        }
        index
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn contains(&self, input: &str) -> bool {
        self.keys.contains(&name_key(input))
    }

    /// Roster display name for `input`
    pub fn canonicalize(&self, input: &str) -> Result<String> {
        let key = name_key(input);
        self.canon_by_key
            .get(&key)
            .filter(|_| !key.is_empty())
            .cloned()
            .ok_or_else(|| SchedulerError::NotInRoster {
                input: input.to_string(),
            })
    }
}

/// Roster display name for `input`, see [`RosterIndex::canonicalize`]
pub fn canonicalize<S: AsRef<str>>(input: &str, roster: &[S]) -> Result<String> {
    RosterIndex::new(roster).canonicalize(input)
}

/// Roster reads cached per locator
pub struct RosterLoader<B> {
    sessions: Arc<SessionProvider<B>>,
    config: SchedulerConfig,
    cache: TtlCache<String, Arc<Vec<String>>>,
}

impl<B: SheetsBackend> RosterLoader<B> {
    pub fn new(sessions: Arc<SessionProvider<B>>, config: SchedulerConfig, clock: Arc<dyn Clock>) -> Self {
        let ttl = config.roster_ttl();
        RosterLoader {
            sessions,
            config,
            cache: TtlCache::new(ttl, clock),
        }
    }

    /// Ordered roster names of the spreadsheet at `locator`
    ///
    /// A missing roster tab is an empty roster. Failures are returned and
    /// never cached, so the next request reads the tab again.
    pub async fn load_roster(&self, locator: &str) -> Result<Arc<Vec<String>>> {
        let key = locator.trim().to_string();
        if let Some(roster) = self.cache.get(&key) {
            return Ok(roster);
        }

        let handle = self.sessions.open_spreadsheet(locator).await?;
        let roster = Arc::new(load_roster_from(&handle, &self.config).await?);
        debug!("loaded {} roster names", roster.len());
        self.cache.insert(key, Arc::clone(&roster));
        Ok(roster)
    }
}
