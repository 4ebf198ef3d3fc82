use autofetch_session::ProviderError;

/// Failure talking to the driver endpoint.
#[derive(thiserror::Error, Debug)]
pub enum DriverError {
    #[error("driver unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{error}: {message}")]
    Command { error: String, message: String },
    #[error("unexpected driver response: {0}")]
    Protocol(String),
}

impl DriverError {
    /// True when the session behind the request can no longer be used.
    ///
    /// A dropped connection counts: the driver process is gone and the
    /// session with it.
    pub fn is_session_dead(&self) -> bool {
        match self {
            DriverError::Transport(_) => true,
            DriverError::Command { error, message } => {
                matches!(error.as_str(), "invalid session id" | "no such window")
                    || message.to_ascii_lowercase().contains("session")
            }
            DriverError::Protocol(_) => false,
        }
    }

    pub fn is_no_such_element(&self) -> bool {
        matches!(self, DriverError::Command { error, .. } if error == "no such element")
    }

    /// Map onto the provider taxonomy; `context` names the failed step.
    pub fn into_provider(self, context: &str) -> ProviderError {
        if self.is_session_dead() {
            ProviderError::SessionDead(format!("{context}: {self}"))
        } else {
            ProviderError::Unavailable(format!("{context}: {self}"))
        }
    }
}
