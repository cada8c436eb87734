use crate::settings::PreferenceKey;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Remote unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Login required to change {0}")]
    UnauthenticatedMutation(PreferenceKey),

    #[error("Unknown preference: {0}")]
    UnknownPreference(String),

    #[error("Preference {key} expects a {expected} value")]
    TypeMismatch { key: PreferenceKey, expected: &'static str },

    #[error("A page request is already in flight")]
    FetchInFlight,

    #[error("Feed was disposed")]
    FeedDisposed,

    #[error("Database error: {0}")]
    Database(String),

    #[error("JSON serialization error: {0}")]
    Json(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("URL parse error: {0}")]
    UrlParse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// True for failures reported by the remote side or the transport.
    pub fn is_remote(&self) -> bool {
        matches!(self, Error::RemoteUnavailable(_) | Error::MalformedResponse(_))
    }

    /// True when re-invoking the same entry point may succeed.
    pub fn is_retryable(&self) -> bool {
        self.is_remote() || matches!(self, Error::FetchInFlight)
    }

    /// Short tag used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::RemoteUnavailable(_) => "remote_unavailable",
            Error::MalformedResponse(_) => "malformed_response",
            Error::UnauthenticatedMutation(_) => "unauthenticated_mutation",
            Error::UnknownPreference(_) => "unknown_preference",
            Error::TypeMismatch { .. } => "type_mismatch",
            Error::FetchInFlight => "fetch_in_flight",
            Error::FeedDisposed => "feed_disposed",
            Error::Database(_) => "database",
            Error::Json(_) => "json",
            Error::Io(_) => "io",
            Error::UrlParse(_) => "url_parse",
            Error::Config(_) => "config",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::UrlParse(err.to_string())
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::Database(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Error::MalformedResponse(err.to_string())
        } else {
            Error::RemoteUnavailable(err.to_string())
        }
    }
}
