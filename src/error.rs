use thiserror::Error;

/// HTTP-like status codes that mark a remote failure as transient
pub const TRANSIENT_STATUS_CODES: [u16; 5] = [429, 500, 502, 503, 504];

/// Lowercase text markers that mark a remote failure as quota related
pub const QUOTA_MARKERS: [&str; 3] = ["429", "quota exceeded", "rate limit"];

/// A failure reported by the spreadsheet service
///
/// Carries the HTTP status when the service answered, and the service's own
/// description of the problem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", display_remote(.status, .message))]
pub struct RemoteError {
    /// HTTP status of the failed response, if one was received
    pub status: Option<u16>,

    /// Text reported by the service or the transport
    pub message: String,
}

fn display_remote(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("APIError [{}]: {}", code, message),
        None => message.to_string(),
    }
}

impl RemoteError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        RemoteError {
            status,
            message: message.into(),
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self::new(Some(status), message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(None, message)
    }

    /// True when the status or text marks this as a quota burst or 5xx
    pub fn is_transient(&self) -> bool {
        if let Some(code) = self.status {
            if TRANSIENT_STATUS_CODES.contains(&code) {
                return true;
            }
        }
        let text = self.to_string().to_lowercase();
        QUOTA_MARKERS.iter().any(|marker| text.contains(marker))
    }
}

/// Application error taxonomy
///
/// Every variant maps to one way the Schedule view degrades; see
/// [`SchedulerError::is_fatal`].
#[derive(Debug, Clone, Error)]
pub enum SchedulerError {
    /// Missing or invalid credentials or spreadsheet locator
    #[error("{message}")]
    Configuration { message: String, hint: String },

    /// Rate-limit or 5xx failure that survived every retry
    #[error("the spreadsheet service is busy, reload to retry ({0})")]
    TransientRemote(RemoteError),

    /// Auth failure, not-found or malformed request
    #[error("{0}")]
    PermanentRemote(RemoteError),

    /// Typed name has no roster match
    #[error(
        "Your name is not in the hired OA list. Please use the exact name from the roster sheet."
    )]
    NotInRoster { input: String },

    /// Roster empty, tabs missing and similar gaps in the data
    #[error("{0}")]
    MissingData(String),
}

impl SchedulerError {
    pub fn configuration(message: impl Into<String>, hint: impl Into<String>) -> Self {
        SchedulerError::Configuration {
            message: message.into(),
            hint: hint.into(),
        }
    }

    /// Only configuration problems are allowed to halt the view
    pub fn is_fatal(&self) -> bool {
        matches!(self, SchedulerError::Configuration { .. })
    }

    pub fn hint(&self) -> Option<&str> {
        match self {
            SchedulerError::Configuration { hint, .. } => Some(hint),
            SchedulerError::TransientRemote(_) => Some("Reload the page to try again."),
            _ => None,
        }
    }
}

impl From<RemoteError> for SchedulerError {
    fn from(err: RemoteError) -> Self {
        if err.is_transient() {
            SchedulerError::TransientRemote(err)
        } else {
            SchedulerError::PermanentRemote(err)
        }
    }
}

pub type Result<T, E = SchedulerError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_classify_transient() {
        for code in TRANSIENT_STATUS_CODES {
            assert!(RemoteError::with_status(code, "boom").is_transient());
        }
        assert!(!RemoteError::with_status(403, "forbidden").is_transient());
        assert!(!RemoteError::with_status(404, "not found").is_transient());
    }

    #[test]
    fn quota_text_classifies_transient() {
        assert!(RemoteError::transport("Quota exceeded for quota metric 'Read requests'").is_transient());
        assert!(RemoteError::with_status(400, "RATE LIMIT hit").is_transient());
        assert!(!RemoteError::transport("connection reset").is_transient());
    }

    #[test]
    fn remote_errors_split_into_taxonomy() {
        let err: SchedulerError = RemoteError::with_status(503, "unavailable").into();
        assert!(matches!(err, SchedulerError::TransientRemote(_)));

        let err: SchedulerError = RemoteError::with_status(404, "Requested entity was not found.").into();
        assert!(matches!(err, SchedulerError::PermanentRemote(_)));
        assert!(!err.is_fatal());
    }
}
