use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, SchedulerError};
use crate::retry::RetryPolicy;

// Constants
pub const DEFAULT_SHEET_URL: &str = "";
pub const DEFAULT_SECRETS_PATH: &str = ".secrets/secrets.json";
pub const ROSTER_SHEET: &str = "Hired OAs";
pub const ROSTER_NAME_COLUMN_HEADER: &str = "OA Name";
pub const ROSTER_NAME_HEADER_ALIASES: [&str; 3] = ["Name", "Full Name", "OA"];
pub const OA_SCHEDULE_SHEETS: [&str; 2] = ["UNH (OA)", "MC (OA)"];
pub const AUDIT_SHEET: &str = "Audit Log";
pub const LOCKS_SHEET: &str = "Locks";
pub const HOURS_TARGET: f64 = 20.0;
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Tunable constants of the scheduler
///
/// Every field has a default, so a secrets file may override any subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Tab holding the hired OA list
    pub roster_sheet: String,

    /// Preferred header of the roster's name column
    pub roster_name_header: String,

    /// Other accepted headers for the name column
    pub roster_name_aliases: Vec<String>,

    /// Schedule tab templates; only the first word of each is matched
    pub schedule_sheets: Vec<String>,

    pub audit_sheet: String,
    pub locks_sheet: String,

    /// Extra tab names hidden from the tab selector
    pub deny_tabs: Vec<String>,

    /// Weekly hours shown as 100% on the progress bar
    pub hours_target: f64,

    pub roster_ttl_secs: u64,
    pub tabs_ttl_secs: u64,
    pub hours_ttl_secs: u64,

    pub retry: RetryPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            roster_sheet: ROSTER_SHEET.to_string(),
            roster_name_header: ROSTER_NAME_COLUMN_HEADER.to_string(),
            roster_name_aliases: ROSTER_NAME_HEADER_ALIASES.iter().map(|s| s.to_string()).collect(),
            schedule_sheets: OA_SCHEDULE_SHEETS.iter().map(|s| s.to_string()).collect(),
            audit_sheet: AUDIT_SHEET.to_string(),
            locks_sheet: LOCKS_SHEET.to_string(),
            deny_tabs: Vec::new(),
            hours_target: HOURS_TARGET,
            roster_ttl_secs: 300,
            tabs_ttl_secs: 60,
            hours_ttl_secs: 300,
            retry: RetryPolicy::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn roster_ttl(&self) -> Option<Duration> {
        ttl(self.roster_ttl_secs)
    }

    pub fn tabs_ttl(&self) -> Option<Duration> {
        ttl(self.tabs_ttl_secs)
    }

    pub fn hours_ttl(&self) -> Option<Duration> {
        ttl(self.hours_ttl_secs)
    }
}

// 0 means "keep for the life of the process"
fn ttl(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Service account key material
///
/// Only the fields needed to mint an access token are kept.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

/// Deployment secrets file
///
/// ```json
/// {
///   "SHEET_URL": "https://docs.google.com/spreadsheets/d/<key>/edit",
///   "gcp_service_account": { "client_email": "...", "private_key": "..." },
///   "scheduler": { "hours_target": 20 }
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(rename = "SHEET_URL", default)]
    pub sheet_url: Option<String>,

    #[serde(default)]
    pub gcp_service_account: Option<serde_json::Value>,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(skip)]
    pub source: PathBuf,
}

impl Secrets {
    /// Read the secrets file; a missing file yields empty secrets
    ///
    /// Absence is reported later, by whichever value turns out to be needed,
    /// so the Home view keeps working without any secrets.
    pub fn load(path: impl AsRef<Path>) -> Result<Secrets> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(Secrets {
                    source: path.to_path_buf(),
                    ..Secrets::default()
                });
            }
            Err(e) => {
                return Err(SchedulerError::configuration(
                    format!("Could not read secrets file {}: {}", path.display(), e),
                    "Check the file permissions or point --secrets at a readable file.",
                ));
            }
        };

        let mut secrets: Secrets = serde_json::from_str(&contents).map_err(|e| {
            SchedulerError::configuration(
                format!("Secrets file {} is not valid JSON: {}", path.display(), e),
                "Fix the JSON syntax in the secrets file.",
            )
        })?;
        secrets.source = path.to_path_buf();
        Ok(secrets)
    }

    /// Parse the credential bundle
    pub fn service_account(&self) -> Result<ServiceAccountKey> {
        let hint = format!(
            "Add the service account JSON key under \"gcp_service_account\" in {}.",
            self.source.display()
        );
        let value = match &self.gcp_service_account {
            Some(v) if v.as_object().is_some_and(|o| !o.is_empty()) => v,
            _ => {
                return Err(SchedulerError::configuration(
                    "Missing service account in secrets (gcp_service_account).",
                    hint,
                ));
            }
        };
        let key: ServiceAccountKey = serde_json::from_value(value.clone()).map_err(|e| {
            SchedulerError::configuration(
                format!("Service account in secrets is malformed: {}", e),
                hint.clone(),
            )
        })?;
        if !key.private_key.contains("PRIVATE KEY") {
            return Err(SchedulerError::configuration(
                "Service account private_key is not a PEM key.",
                hint,
            ));
        }
        Ok(key)
    }

    /// Pick the spreadsheet locator: explicit override, then secrets, then default
    pub fn sheet_url(&self, override_url: Option<&str>) -> Result<String> {
        [override_url, self.sheet_url.as_deref(), Some(DEFAULT_SHEET_URL)]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|url| !url.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                SchedulerError::configuration(
                    "Missing SHEET_URL in secrets and no DEFAULT_SHEET_URL set.",
                    format!(
                        "Set \"SHEET_URL\" in {} or pass --sheet-url.",
                        self.source.display()
                    ),
                )
            })
    }
}

/// Scheduler settings and spreadsheet locator for startup
///
/// A secrets file that cannot be read or parsed becomes the locator error,
/// so the Schedule view halts on the real problem and its hint. The defaults
/// are used for everything else in that case.
pub fn load_settings(
    secrets_path: impl AsRef<Path>,
    sheet_url_override: Option<&str>,
) -> (SchedulerConfig, Result<String>) {
    match Secrets::load(secrets_path) {
        Ok(secrets) => {
            let locator = secrets.sheet_url(sheet_url_override);
            (secrets.scheduler, locator)
        }
        Err(e) => (SchedulerConfig::default(), Err(e)),
    }
}
