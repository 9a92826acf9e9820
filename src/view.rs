//! Schedule view model: everything the Schedule page shows for one session.

use log::warn;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::cache::{Clock, SystemClock, TtlCache};
use crate::config::SchedulerConfig;
use crate::error::{Result, SchedulerError};
use crate::hours::{HoursAggregator, HoursReport};
use crate::peek::{TabPeek, peek_tab};
use crate::roster::{RosterIndex, RosterLoader};
use crate::session::SessionProvider;
use crate::sheets::{SheetsBackend, SpreadsheetHandle};
use crate::tabs::{TabRules, select_tabs};

/// Per-browser state, dropped when the session ends
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UiSession {
    /// Name as typed
    pub oa_name: String,

    pub active_tab: Option<String>,

    /// Bumped to force the hours total to be read again
    pub hours_epoch: u64,
}

impl UiSession {
    pub fn bump_hours_epoch(&mut self) -> u64 {
        self.hours_epoch = self.hours_epoch.wrapping_add(1);
        self.hours_epoch
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Error,
    Warning,
    Info,
}

/// A message shown above or beside the view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub hint: Option<String>,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Notice {
            level: NoticeLevel::Info,
            message: message.into(),
            hint: None,
        }
    }
}

impl From<&SchedulerError> for Notice {
    fn from(err: &SchedulerError) -> Self {
        let level = match err {
            SchedulerError::Configuration { .. } | SchedulerError::PermanentRemote(_) => {
                NoticeLevel::Error
            }
            SchedulerError::TransientRemote(_) => NoticeLevel::Warning,
            SchedulerError::NotInRoster { .. } | SchedulerError::MissingData(_) => {
                NoticeLevel::Info
            }
        };
        Notice {
            level,
            message: err.to_string(),
            hint: err.hint().map(str::to_string),
        }
    }
}

/// Everything the Schedule page renders
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScheduleView {
    /// Stop-and-fix message; when set nothing else is rendered
    pub fatal: Option<Notice>,
    pub spreadsheet_title: Option<String>,
    pub oa_name: String,
    pub canonical_name: Option<String>,
    /// Inline hint next to the name field
    pub name_notice: Option<Notice>,
    pub roster_size: usize,
    pub tabs: Vec<String>,
    pub active_tab: Option<String>,
    pub peek: Option<TabPeek>,
    pub hours: Option<HoursReport>,
    pub hours_epoch: u64,
    pub notices: Vec<Notice>,
}

impl ScheduleView {
    fn for_session(ui: &UiSession) -> Self {
        ScheduleView {
            oa_name: ui.oa_name.clone(),
            hours_epoch: ui.hours_epoch,
            ..ScheduleView::default()
        }
    }

    fn halted(ui: &UiSession, err: &SchedulerError) -> Self {
        ScheduleView {
            fatal: Some(Notice::from(err)),
            ..Self::for_session(ui)
        }
    }
}

/// Roster, tab, peek and hours lookups behind the Schedule page
pub struct Dashboard<B> {
    config: SchedulerConfig,
    locator: Result<String>,
    sessions: Arc<SessionProvider<B>>,
    roster: RosterLoader<B>,
    hours: HoursAggregator,
    tabs_cache: TtlCache<String, Arc<Vec<String>>>,
    rules: TabRules,
}

impl<B: SheetsBackend> Dashboard<B> {
    /// `locator` is the resolved spreadsheet URL, or the configuration error
    /// explaining why there is none
    pub fn new(config: SchedulerConfig, locator: Result<String>, sessions: Arc<SessionProvider<B>>) -> Self {
        Self::with_clock(config, locator, sessions, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: SchedulerConfig,
        locator: Result<String>,
        sessions: Arc<SessionProvider<B>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Dashboard {
            roster: RosterLoader::new(Arc::clone(&sessions), config.clone(), Arc::clone(&clock)),
            hours: HoursAggregator::new(config.clone(), Arc::clone(&clock)),
            tabs_cache: TtlCache::new(config.tabs_ttl(), clock),
            rules: TabRules::from_config(&config),
            config,
            locator,
            sessions,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionProvider<B> {
        &self.sessions
    }

    /// Browsable tabs of an opened spreadsheet, cached for the tab TTL
    pub async fn list_tabs(&self, handle: &SpreadsheetHandle<B>) -> Result<Arc<Vec<String>>> {
        let key = handle.locator().to_string();
        if let Some(tabs) = self.tabs_cache.get(&key) {
            return Ok(tabs);
        }
        let worksheets = handle.worksheets().await?;
        let tabs = Arc::new(select_tabs(&worksheets, &self.rules));
        self.tabs_cache.insert(key, Arc::clone(&tabs));
        Ok(tabs)
    }

    /// Build the Schedule view for one session
    ///
    /// Only a configuration problem halts the view; every other failure
    /// becomes a notice and the rest still renders.
    pub async fn schedule_view(&self, ui: &UiSession) -> ScheduleView {
        let locator = match &self.locator {
            Ok(locator) => locator.as_str(),
            Err(e) => return ScheduleView::halted(ui, e),
        };

        let handle = match self.sessions.open_spreadsheet(locator).await {
            Ok(handle) => handle,
            Err(e) if e.is_fatal() => return ScheduleView::halted(ui, &e),
            Err(e) => {
                warn!("could not open spreadsheet: {}", e);
                let mut view = ScheduleView::for_session(ui);
                view.notices.push(Notice::from(&e));
                return view;
            }
        };

        let mut view = ScheduleView::for_session(ui);
        view.spreadsheet_title = Some(handle.title().to_string());

        // `None` when the roster could not be read: names stay unvalidated
        let index = match self.roster.load_roster(locator).await {
            Ok(roster) => Some(RosterIndex::new(roster.as_slice())),
            Err(e) => {
                warn!("could not load roster: {}", e);
                view.notices.push(Notice {
                    message: format!("Could not read the roster: {}", e),
                    ..Notice::from(&e)
                });
                None
            }
        };
        if let Some(index) = &index {
            view.roster_size = index.len();
            if index.is_empty() {
                view.notices.push(Notice::from(&SchedulerError::MissingData(format!(
                    "No names found in the '{}' tab; name validation is off.",
                    self.config.roster_sheet
                ))));
            }
        }

        let typed = ui.oa_name.trim();
        if !typed.is_empty() {
            match &index {
                Some(index) if index.is_empty() => view.canonical_name = Some(typed.to_string()),
                Some(index) => match index.canonicalize(typed) {
                    Ok(canonical) => view.canonical_name = Some(canonical),
                    Err(e) => view.name_notice = Some(Notice::from(&e)),
                },
                None => {
                    view.name_notice = Some(Notice {
                        level: NoticeLevel::Warning,
                        message: "Your name could not be checked against the roster.".to_string(),
                        hint: Some("Reload the page to try again.".to_string()),
                    })
                }
            }
        }

        let tabs = match self.list_tabs(&handle).await {
            Ok(tabs) => tabs,
            Err(e) => {
                view.notices.push(Notice {
                    message: format!("Could not list worksheets: {}", e),
                    ..Notice::from(&e)
                });
                Arc::new(Vec::new())
            }
        };
        view.tabs = tabs.as_ref().clone();

        if view.tabs.is_empty() {
            view.notices.push(Notice::from(&SchedulerError::MissingData(
                "No schedule tabs found.".to_string(),
            )));
        }

        view.active_tab = ui
            .active_tab
            .as_ref()
            .filter(|tab| view.tabs.contains(*tab))
            .or_else(|| view.tabs.first())
            .cloned();

        match &view.active_tab {
            Some(tab) => match peek_tab(&handle, tab).await {
                Ok(peek) => view.peek = Some(peek),
                Err(e) => view.notices.push(Notice::from(&e)),
            },
            None if !view.tabs.is_empty() => {
                view.notices.push(Notice::info("Select a tab on the left to peek."));
            }
            None => {}
        }

        if let Some(name) = &view.canonical_name {
            if !view.tabs.is_empty() {
                let report = self
                    .hours
                    .hours_for(&handle, name, &view.tabs, ui.hours_epoch)
                    .await;
                if !report.skipped_tabs.is_empty() {
                    view.notices.push(Notice {
                        level: NoticeLevel::Warning,
                        message: format!(
                            "Hours leave out tabs that could not be read: {}.",
                            report.skipped_tabs.join(", ")
                        ),
                        hint: Some("Reload the page to try again.".to_string()),
                    });
                }
                view.hours = Some(report.as_ref().clone());
            }
        }

        view
    }
}
