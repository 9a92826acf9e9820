use log::{debug, info};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

use crate::cache::{SystemClock, TtlCache};
use crate::error::{Result, SchedulerError};
use crate::retry::{RetryPolicy, with_backoff};
use crate::sheets::{SheetsBackend, SpreadsheetHandle, spreadsheet_key};

type Connector<B> = Box<dyn Fn() -> Result<B> + Send + Sync>;

/// Authenticated client plus the spreadsheets opened with it
///
/// Built once at startup and shared by reference. The client is created on
/// first use; a failed attempt is not cached, so fixing the credentials and
/// reloading is enough to recover.
pub struct SessionProvider<B> {
    connect: Connector<B>,
    retry: RetryPolicy,
    client: OnceCell<Arc<B>>,
    handles: TtlCache<String, Arc<SpreadsheetHandle<B>>>,
    opening: Mutex<()>,
}

impl<B: SheetsBackend> SessionProvider<B> {
    /// Provider that builds its client lazily with `connect`
    pub fn new<F>(connect: F, retry: RetryPolicy) -> Self
    where
        F: Fn() -> Result<B> + Send + Sync + 'static,
    {
        SessionProvider {
            connect: Box::new(connect),
            retry,
            client: OnceCell::new(),
            handles: TtlCache::new(None, Arc::new(SystemClock)),
            opening: Mutex::new(()),
        }
    }

    /// Provider around an already connected backend
    pub fn with_backend(backend: Arc<B>, retry: RetryPolicy) -> Self {
        let provider = Self::new(
            || {
                Err(SchedulerError::configuration(
                    "client already set",
                    "unreachable",
                ))
            },
            retry,
        );
        // A fresh OnceCell always accepts the first value
        let _ = provider.client.set(backend);
        provider
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Authenticated client, built once per provider
    pub async fn get_client(&self) -> Result<Arc<B>> {
        let client = self
            .client
            .get_or_try_init(|| async {
                info!("connecting to the spreadsheet service");
                (self.connect)().map(Arc::new)
            })
            .await?;
        Ok(Arc::clone(client))
    }

    /// Open the spreadsheet at `locator`, reusing the cached handle if any
    pub async fn open_spreadsheet(&self, locator: &str) -> Result<Arc<SpreadsheetHandle<B>>> {
        let locator = locator.trim();
        if let Some(handle) = self.handles.get(&locator.to_string()) {
            return Ok(handle);
        }

        let _guard = self.opening.lock().await;
        if let Some(handle) = self.handles.get(&locator.to_string()) {
            return Ok(handle);
        }

        if spreadsheet_key(locator).is_none() {
            return Err(SchedulerError::configuration(
                format!("'{}' is not a spreadsheet URL.", locator),
                "Use the full sharing URL, https://docs.google.com/spreadsheets/d/<key>/edit.",
            ));
        }

        let client = self.get_client().await?;
        debug!("opening spreadsheet {}", locator);
        let meta = with_backoff(&self.retry, || client.open_by_url(locator)).await?;
        info!("opened spreadsheet '{}' ({})", meta.title, meta.id);

        let handle = Arc::new(SpreadsheetHandle::new(
            client,
            meta,
            locator,
            self.retry.clone(),
        ));
        self.handles.insert(locator.to_string(), Arc::clone(&handle));
        Ok(handle)
    }
}
