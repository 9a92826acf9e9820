//! Hours worked per OA, summed over the schedule and on-call tabs.
//!
//! Two tab layouts are understood:
//!
//! * **records**: the header row has a name column and an hours column; each
//!   row naming the OA adds its hours.
//! * **grid**: the first cell of a row is a time span such as
//!   `9:00 AM - 10:30 AM`; every other cell naming the OA adds the span.
//!
//! Rows that fit neither shape are skipped, as are tabs that cannot be read.

use chrono::NaiveTime;
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use serde::Serialize;
use std::sync::Arc;

use crate::cache::{Clock, TtlCache};
use crate::config::SchedulerConfig;
use crate::roster::{name_key, resolve_name_header};
use crate::sheets::{CellValue, SheetsBackend, SpreadsheetHandle};

lazy_static! {
    static ref SPAN_REGEX: Regex = Regex::new(
        r"(?i)^\s*(\d{1,2})(?::(\d{2}))?\s*(?:([ap])\.?\s*m\.?)?\s*(?:-|–|—|to)\s*(\d{1,2})(?::(\d{2}))?\s*(?:([ap])\.?\s*m\.?)?\s*$"
    )
    .unwrap();
    static ref NAME_SPLIT_REGEX: Regex = Regex::new(r"[/,&+;\n]").unwrap();
}

const HOURS_HEADERS: [&str; 3] = ["hours", "hrs", "total hours"];

#[derive(Clone, Copy, PartialEq)]
enum Meridiem {
    Am,
    Pm,
}

fn to_time(hour: u32, minute: u32, meridiem: Option<Meridiem>) -> Option<NaiveTime> {
    let hour = match meridiem {
        Some(_) if !(1..=12).contains(&hour) => return None,
        Some(Meridiem::Am) => hour % 12,
        Some(Meridiem::Pm) => hour % 12 + 12,
        // "24:00" closes a day
        None if hour == 24 && minute == 0 => 0,
        None => hour,
    };
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn minutes_between(start: NaiveTime, end: NaiveTime) -> i64 {
    let minutes = (end - start).num_minutes();
    if minutes <= 0 { minutes + 24 * 60 } else { minutes }
}

/// Length in hours of a time span label
///
/// Accepts 12-hour (`9am - 1:30 PM`) and 24-hour (`09:00-17:00`) forms. A
/// start without am/pm borrows the end's, unless that would put it after the
/// end. Spans ending before they start run past midnight.
///
/// # Examples
/// ```
/// use oa_scheduler::hours::parse_time_span;
///
/// assert_eq!(parse_time_span("9:00 AM - 10:30 AM"), Some(1.5));
/// assert_eq!(parse_time_span("11-1pm"), Some(2.0));
/// assert_eq!(parse_time_span("22:00-02:00"), Some(4.0));
/// assert_eq!(parse_time_span("Monday"), None);
/// ```
pub fn parse_time_span(label: &str) -> Option<f64> {
    let caps = SPAN_REGEX.captures(label)?;
    let number = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
    let meridiem = |i: usize| {
        caps.get(i).map(|m| {
            if m.as_str().eq_ignore_ascii_case("a") {
                Meridiem::Am
            } else {
                Meridiem::Pm
            }
        })
    };

    let (start_h, start_m, start_mer) = (number(1)?, number(2).unwrap_or(0), meridiem(3));
    let (end_h, end_m, end_mer) = (number(4)?, number(5).unwrap_or(0), meridiem(6));

    let end = to_time(end_h, end_m, end_mer)?;
    let start = match (start_mer, end_mer) {
        (None, Some(borrowed)) => {
            let same = to_time(start_h, start_m, Some(borrowed))?;
            if same > end {
                let other = if borrowed == Meridiem::Am { Meridiem::Pm } else { Meridiem::Am };
                to_time(start_h, start_m, Some(other))?
            } else {
                same
            }
        }
        _ => to_time(start_h, start_m, start_mer)?,
    };

    if start == end {
        return None;
    }
    Some(minutes_between(start, end) as f64 / 60.0)
}

/// Normalized name keys listed in one cell
pub fn cell_name_keys(cell: &str) -> Vec<String> {
    NAME_SPLIT_REGEX
        .split(cell)
        .map(name_key)
        .filter(|key| !key.is_empty())
        .collect()
}

fn names_person(cell: &CellValue, key: &str) -> usize {
    match cell.as_text() {
        Some(text) => cell_name_keys(text).iter().filter(|k| *k == key).count(),
        None => 0,
    }
}

fn resolve_hours_column(header: &[CellValue]) -> Option<usize> {
    header.iter().position(|cell| {
        let low = cell.to_string().trim().to_lowercase();
        HOURS_HEADERS.contains(&low.as_str()) || low.starts_with("hours")
    })
}

/// Hours attributed to the person with normalization key `key` in one tab
pub fn hours_in_values<S: AsRef<str>>(
    values: &[Vec<CellValue>],
    key: &str,
    name_header: &str,
    name_aliases: &[S],
) -> f64 {
    let Some(header) = values.first() else {
        return 0.0;
    };

    let name_col = resolve_name_header(header, name_header, name_aliases).and_then(|name| {
        header
            .iter()
            .position(|cell| cell.to_string().trim() == name)
    });
    if let (Some(name_col), Some(hours_col)) = (name_col, resolve_hours_column(header)) {
        return values
            .iter()
            .skip(1)
            .filter(|row| {
                row.get(name_col)
                    .and_then(CellValue::as_text)
                    .is_some_and(|name| name_key(name) == key)
            })
            .filter_map(|row| row.get(hours_col).and_then(CellValue::as_number))
            .filter(|hours| *hours >= 0.0)
            .fold(0.0, |acc, hours| acc + hours);
    }

    values
        .iter()
        .filter_map(|row| {
            let (label, cells) = row.split_first()?;
            let span = parse_time_span(&label.to_string())?;
            let hits: usize = cells.iter().map(|cell| names_person(cell, key)).sum();
            Some(span * hits as f64)
        })
        .fold(0.0, |acc, hours| acc + hours)
}

/// Hours from one tab
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TabHours {
    pub title: String,
    pub hours: f64,
}

/// Hours total for one OA against the weekly target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoursReport {
    pub name: String,
    pub total_hours: f64,
    pub target_hours: f64,
    /// `total_hours / target_hours`, not capped
    pub ratio: f64,
    pub by_tab: Vec<TabHours>,
    /// Tabs that could not be read and were left out of the total
    pub skipped_tabs: Vec<String>,
    pub epoch: u64,
}

impl HoursReport {
    /// Ratio clamped to `[0, 1]` for a progress bar
    pub fn progress(&self) -> f64 {
        self.ratio.clamp(0.0, 1.0)
    }
}

/// Sum `name`'s hours over `tabs` of an opened spreadsheet
///
/// # Arguments
/// * `handle` - Spreadsheet to read
/// * `name` - Canonical display name of the OA
/// * `tabs` - Schedule and on-call tab titles to scan
/// * `config` - Name column labels and the hours target
/// * `epoch` - Copied into the report, never affects the total
///
/// # Returns
/// * `HoursReport` - Per-tab hours, the total, and any tab that could not be read
pub async fn compute_hours<B: SheetsBackend>(
    handle: &SpreadsheetHandle<B>,
    name: &str,
    tabs: &[String],
    config: &SchedulerConfig,
    epoch: u64,
) -> HoursReport {
    let key = name_key(name);
    let mut by_tab = Vec::new();
    let mut skipped_tabs = Vec::new();

    for title in tabs {
        match handle.values(title).await {
            Ok(values) => {
                let hours = hours_in_values(
                    &values,
                    &key,
                    &config.roster_name_header,
                    &config.roster_name_aliases,
                );
                if hours > 0.0 {
                    by_tab.push(TabHours {
                        title: title.clone(),
                        hours,
                    });
                }
            }
            Err(e) => {
                warn!("skipping tab '{}' in hours total: {}", title, e);
                skipped_tabs.push(title.clone());
            }
        }
    }

    let total_hours = by_tab.iter().fold(0.0, |acc, t| acc + t.hours);
    let target_hours = config.hours_target;
    let ratio = if target_hours > 0.0 {
        total_hours / target_hours
    } else {
        0.0
    };

    HoursReport {
        name: name.to_string(),
        total_hours,
        target_hours,
        ratio,
        by_tab,
        skipped_tabs,
        epoch,
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct HoursKey {
    locator: String,
    name_key: String,
    tabs: Vec<String>,
    epoch: u64,
}

/// Memoized [`compute_hours`]
///
/// The epoch is only part of the cache key: bumping it forces a fresh read,
/// the value for unchanged data stays the same. Reports with skipped tabs are
/// not cached.
pub struct HoursAggregator {
    config: SchedulerConfig,
    cache: TtlCache<HoursKey, Arc<HoursReport>>,
}

impl HoursAggregator {
    pub fn new(config: SchedulerConfig, clock: Arc<dyn Clock>) -> Self {
        let ttl = config.hours_ttl();
        HoursAggregator {
            config,
            cache: TtlCache::new(ttl, clock),
        }
    }

    pub async fn hours_for<B: SheetsBackend>(
        &self,
        handle: &SpreadsheetHandle<B>,
        name: &str,
        tabs: &[String],
        epoch: u64,
    ) -> Arc<HoursReport> {
        let key = HoursKey {
            locator: handle.locator().to_string(),
            name_key: name_key(name),
            tabs: tabs.to_vec(),
            epoch,
        };
        if let Some(report) = self.cache.get(&key) {
            return report;
        }

        debug!("computing hours for '{}' over {} tabs (epoch {})", name, tabs.len(), epoch);
        let report = Arc::new(compute_hours(handle, name, tabs, &self.config, epoch).await);
        self.cache.purge_expired();
        // A partial total is shown once, then read again on the next request
        if report.skipped_tabs.is_empty() {
            self.cache.insert(key, Arc::clone(&report));
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twelve_hour_spans() {
        assert_eq!(parse_time_span("9:00 AM - 10:30 AM"), Some(1.5));
        assert_eq!(parse_time_span("9am to 5pm"), Some(8.0));
        assert_eq!(parse_time_span("9-5pm"), Some(8.0));
        assert_eq!(parse_time_span("12pm-1pm"), Some(1.0));
        assert_eq!(parse_time_span("11:30 p.m. – 1:00 a.m."), Some(1.5));
    }

    #[test]
    fn twenty_four_hour_spans() {
        assert_eq!(parse_time_span("08:00-12:00"), Some(4.0));
        assert_eq!(parse_time_span("20:00-24:00"), Some(4.0));
        assert_eq!(parse_time_span("23:00-01:00"), Some(2.0));
    }

    #[test]
    fn rejects_non_spans() {
        assert_eq!(parse_time_span("Time"), None);
        assert_eq!(parse_time_span("9:00"), None);
        assert_eq!(parse_time_span("13pm-2pm"), None);
        assert_eq!(parse_time_span("10:00-10:00"), None);
        assert_eq!(parse_time_span("25:00-26:00"), None);
    }

    #[test]
    fn cells_can_list_several_names() {
        assert_eq!(
            cell_name_keys("Alice Smith / BOB  jones\nCara"),
            vec!["alice smith", "bob jones", "cara"]
        );
        assert!(cell_name_keys(" , ").is_empty());
    }
}
