use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

use crate::config::SchedulerConfig;
use crate::sheets::WorksheetTab;

lazy_static! {
    static ref ON_CALL_REGEX: Regex = Regex::new(r"(?i)\bon\s*[- ]?call\b").unwrap();
}

/// True for "On Call", "on-call", "ONCALL" and similar titles
pub fn is_on_call(title: &str) -> bool {
    ON_CALL_REGEX.is_match(title)
}

/// Which tabs a user may browse
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabRules {
    /// Lowercased, trimmed tab names never shown
    deny: HashSet<String>,
    /// Lowercased first words of the schedule tab templates
    prefixes: HashSet<String>,
}

impl TabRules {
    pub fn new<D, P>(deny: D, schedule_templates: P) -> Self
    where
        D: IntoIterator,
        D::Item: AsRef<str>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        let deny = deny
            .into_iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        let prefixes = schedule_templates
            .into_iter()
            .filter_map(|t| t.as_ref().split_whitespace().next().map(str::to_lowercase))
            .collect();
        TabRules { deny, prefixes }
    }

    /// Rules from the audit tab, lock tab, extra denylist and templates
    pub fn from_config(config: &SchedulerConfig) -> Self {
        let deny = [config.audit_sheet.as_str(), config.locks_sheet.as_str()]
            .into_iter()
            .chain(config.deny_tabs.iter().map(String::as_str));
        Self::new(deny, &config.schedule_sheets)
    }

    /// Title-only part of the filter
    pub fn is_selectable(&self, title: &str) -> bool {
        let low = title.trim().to_lowercase();
        if low.is_empty() || self.deny.contains(&low) {
            return false;
        }
        if is_on_call(title) {
            return true;
        }
        low.split_whitespace()
            .next()
            .is_some_and(|first| self.prefixes.contains(first))
    }
}

/// Titles of the tabs a user may browse, in sheet order
///
/// The first tab is the cover sheet and never qualifies; hidden tabs never
/// qualify either.
pub fn select_tabs(tabs: &[WorksheetTab], rules: &TabRules) -> Vec<String> {
    tabs.iter()
        .skip(1)
        .filter(|tab| !tab.hidden)
        .filter(|tab| rules.is_selectable(&tab.title))
        .map(|tab| tab.title.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn on_call_spellings() {
        assert!(is_on_call("On Call Week 3"));
        assert!(is_on_call("on-call jan"));
        assert!(is_on_call("ONCALL"));
        assert!(!is_on_call("Phone calls"));
        assert!(!is_on_call("Moncall"));
    }

    #[test]
    fn deny_wins_over_prefix() {
        let rules = TabRules::new(["UNH Locks"], ["UNH (OA)"]);
        assert!(!rules.is_selectable("  unh locks "));
        assert!(rules.is_selectable("UNH Week 2"));
        assert!(!rules.is_selectable(""));
    }
}
