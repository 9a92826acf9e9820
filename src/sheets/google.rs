//! Google Sheets API v4 backend.
//!
//! Authenticates with a service-account JWT bearer grant and only ever
//! requests read-only scopes.

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use log::debug;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

use super::{CellValue, SheetsBackend, SpreadsheetMeta, WorksheetTab, spreadsheet_key};
use crate::config::ServiceAccountKey;
use crate::error::{RemoteError, Result, SchedulerError};

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const SCOPES: &str = "https://www.googleapis.com/auth/spreadsheets.readonly https://www.googleapis.com/auth/drive.readonly";
// Cells come back as the sheet displays them: dates, times and currency
// stay text, numbers are parsed leniently downstream
const VALUES_QUERY: [(&str, &str); 2] = [
    ("majorDimension", "ROWS"),
    ("valueRenderOption", "FORMATTED_VALUE"),
];
const TOKEN_LIFETIME_SECS: u64 = 3600;
// Refresh a little early so a token never expires mid-request
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpreadsheetResponse {
    #[serde(default)]
    spreadsheet_id: String,
    #[serde(default)]
    properties: Option<SpreadsheetProperties>,
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Deserialize)]
struct SpreadsheetProperties {
    #[serde(default)]
    title: String,
}

#[derive(Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct SheetProperties {
    #[serde(default)]
    title: String,
    #[serde(default)]
    index: usize,
    #[serde(default)]
    hidden: bool,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

impl ValueRange {
    fn into_cells(self) -> Vec<Vec<CellValue>> {
        self.values
            .iter()
            .map(|row| row.iter().map(CellValue::from).collect())
            .collect()
    }
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Authenticated Google Sheets client
pub struct GoogleSheets {
    http: reqwest::Client,
    key: ServiceAccountKey,
    signing_key: EncodingKey,
    token: Mutex<Option<CachedToken>>,
}

impl GoogleSheets {
    /// Build a client from the credential bundle
    ///
    /// No network traffic happens here; the first request mints a token.
    pub fn new(key: ServiceAccountKey) -> Result<Self> {
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes()).map_err(|e| {
            SchedulerError::configuration(
                format!("Service account private_key could not be parsed: {}", e),
                "Paste the private_key exactly as it appears in the downloaded JSON key.",
            )
        })?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("oa-scheduler/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                SchedulerError::configuration(
                    format!("Could not build HTTP client: {}", e),
                    "Check the TLS setup of the host.",
                )
            })?;

        Ok(GoogleSheets {
            http,
            key,
            signing_key,
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String, RemoteError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() + TOKEN_REFRESH_MARGIN {
                return Ok(token.token.clone());
            }
        }

        debug!("requesting access token for {}", self.key.client_email);
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let claims = Claims {
            iss: &self.key.client_email,
            scope: SCOPES,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + TOKEN_LIFETIME_SECS,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();
        let assertion = jsonwebtoken::encode(&header, &claims, &self.signing_key)
            .map_err(|e| RemoteError::transport(format!("could not sign token request: {}", e)))?;

        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(transport_error)?;
        let body: TokenResponse = read_json(response).await?;

        let lifetime = body.expires_in.unwrap_or(TOKEN_LIFETIME_SECS);
        *cached = Some(CachedToken {
            token: body.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(lifetime),
        });
        Ok(body.access_token)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, RemoteError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .map_err(transport_error)?;
        read_json(response).await
    }
}

fn transport_error(err: reqwest::Error) -> RemoteError {
    RemoteError::new(err.status().map(|s| s.as_u16()), err.to_string())
}

async fn read_json<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return response.json::<T>().await.map_err(transport_error);
    }

    let text = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ApiErrorBody>(&text) {
        Ok(body) => (body.error.code.unwrap_or(status.as_u16()), body.error.message),
        Err(_) => (status.as_u16(), text),
    };
    Err(RemoteError::with_status(code, message))
}

/// Quote a tab title for A1 notation
fn a1_range(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

impl SheetsBackend for GoogleSheets {
    fn open_by_url(
        &self,
        locator: &str,
    ) -> impl Future<Output = Result<SpreadsheetMeta, RemoteError>> + Send {
        async move {
            let id = spreadsheet_key(locator)
                .ok_or_else(|| RemoteError::with_status(404, "No valid key found in URL"))?;
            let url = format!("{}/{}", SHEETS_API, id);
            let body: SpreadsheetResponse = self
                .get_json(&url, &[("fields", "spreadsheetId,properties.title")])
                .await?;
            Ok(SpreadsheetMeta {
                id: if body.spreadsheet_id.is_empty() {
                    id.to_string()
                } else {
                    body.spreadsheet_id
                },
                title: body.properties.map(|p| p.title).unwrap_or_default(),
            })
        }
    }

    fn worksheets(
        &self,
        spreadsheet_id: &str,
    ) -> impl Future<Output = Result<Vec<WorksheetTab>, RemoteError>> + Send {
        async move {
            let url = format!("{}/{}", SHEETS_API, spreadsheet_id);
            let body: SpreadsheetResponse = self
                .get_json(&url, &[("fields", "sheets.properties(title,index,hidden)")])
                .await?;
            let mut tabs: Vec<WorksheetTab> = body
                .sheets
                .into_iter()
                .map(|s| WorksheetTab {
                    title: s.properties.title,
                    hidden: s.properties.hidden,
                    index: s.properties.index,
                })
                .collect();
            tabs.sort_by_key(|t| t.index);
            Ok(tabs)
        }
    }

    fn values(
        &self,
        spreadsheet_id: &str,
        title: &str,
    ) -> impl Future<Output = Result<Vec<Vec<CellValue>>, RemoteError>> + Send {
        async move {
            let url = format!(
                "{}/{}/values/{}",
                SHEETS_API,
                spreadsheet_id,
                urlencoding::encode(&a1_range(title))
            );
            let body: ValueRange = self
                .get_json(&url, &VALUES_QUERY)
                .await?;
            Ok(body.into_cells())
        }
    }
}
