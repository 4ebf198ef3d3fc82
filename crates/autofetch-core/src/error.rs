use std::time::Duration;

use autofetch_session::ProviderError;

/// Everything that can go wrong while processing addresses.
///
/// Only [`FetchError::SessionEstablish`] and [`FetchError::Cancelled`] end a
/// run; every other variant is recorded as a per-address failure.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("could not infer a filename from the address")]
    UnresolvableName,
    #[error("no download trigger found: {0}")]
    NoTriggerFound(String),
    #[error("interaction session died: {0}")]
    SessionDead(String),
    #[error("no finished download within {}s", .0.as_secs())]
    CompletionTimeout(Duration),
    #[error("filesystem error: {0}")]
    Filesystem(String),
    #[error("could not establish an interaction session: {0}")]
    SessionEstablish(String),
    #[error("cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, FetchError::SessionEstablish(_) | FetchError::Cancelled)
    }

    pub fn slug(&self) -> &'static str {
        match self {
            FetchError::UnresolvableName => "unresolvable_name",
            FetchError::NoTriggerFound(_) => "no_trigger_found",
            FetchError::SessionDead(_) => "session_dead",
            FetchError::CompletionTimeout(_) => "completion_timeout",
            FetchError::Filesystem(_) => "filesystem_error",
            FetchError::SessionEstablish(_) => "session_establish_failure",
            FetchError::Cancelled => "cancelled",
        }
    }
}

impl From<ProviderError> for FetchError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NoTriggerFound(msg) => FetchError::NoTriggerFound(msg),
            ProviderError::SessionDead(msg) => FetchError::SessionDead(msg),
            ProviderError::Establish(msg) => FetchError::SessionEstablish(msg),
            // the session survived; only this page could not be driven
            ProviderError::Unavailable(msg) => FetchError::NoTriggerFound(msg),
            ProviderError::Io(msg) => FetchError::Filesystem(msg),
        }
    }
}

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        FetchError::Filesystem(err.to_string())
    }
}
