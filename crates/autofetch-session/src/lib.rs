use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

pub type SessionId = String;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Expired,
    Refreshing,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Active => "active",
            SessionState::Expired => "expired",
            SessionState::Refreshing => "refreshing",
        }
    }
}

/// Live handle to an interaction session. Handles are opaque to the engine;
/// only the provider that issued one knows how to use it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionHandle {
    pub id: SessionId,
    pub established_at: DateTime<Utc>,
}

impl SessionHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            established_at: Utc::now(),
        }
    }

    /// Wall-clock time since the session was established.
    pub fn age(&self) -> TimeDelta {
        Utc::now() - self.established_at
    }
}

/// What a provider observed while opening an address and invoking its trigger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TriggerReport {
    pub triggered: bool,
    pub session_alive: bool,
}

impl TriggerReport {
    pub fn triggered() -> Self {
        Self {
            triggered: true,
            session_alive: true,
        }
    }

    pub fn not_found() -> Self {
        Self {
            triggered: false,
            session_alive: true,
        }
    }

    pub fn session_lost() -> Self {
        Self {
            triggered: false,
            session_alive: false,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("no trigger element found: {0}")]
    NoTriggerFound(String),
    #[error("session is no longer usable: {0}")]
    SessionDead(String),
    #[error("failed to establish session: {0}")]
    Establish(String),
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("io error: {0}")]
    Io(String),
}

impl ProviderError {
    /// True when the error means the session handle itself must be replaced.
    pub fn is_session_dead(&self) -> bool {
        matches!(self, ProviderError::SessionDead(_))
    }
}

/// Capability interface for the component that drives pages on the engine's
/// behalf. Exactly one session is held at a time; calls are strictly sequential.
pub trait InteractionProvider {
    fn id(&self) -> &'static str;

    /// Establish a fresh session.
    fn establish(&mut self) -> Result<SessionHandle, ProviderError>;

    /// Liveness probe; `false` means the handle must not be used again.
    fn probe(&mut self, handle: &SessionHandle) -> bool;

    /// Open `address` and invoke its retrieval trigger. May start a write in
    /// the download directory as a side effect.
    fn open_and_trigger(
        &mut self,
        handle: &SessionHandle,
        address: &str,
    ) -> Result<TriggerReport, ProviderError>;

    fn dispose(&mut self, handle: SessionHandle) -> Result<(), ProviderError>;
}

pub type BoxedProvider = Box<dyn InteractionProvider>;

impl<P: InteractionProvider + ?Sized> InteractionProvider for Box<P> {
    fn id(&self) -> &'static str {
        (**self).id()
    }

    fn establish(&mut self) -> Result<SessionHandle, ProviderError> {
        (**self).establish()
    }

    fn probe(&mut self, handle: &SessionHandle) -> bool {
        (**self).probe(handle)
    }

    fn open_and_trigger(
        &mut self,
        handle: &SessionHandle,
        address: &str,
    ) -> Result<TriggerReport, ProviderError> {
        (**self).open_and_trigger(handle, address)
    }

    fn dispose(&mut self, handle: SessionHandle) -> Result<(), ProviderError> {
        (**self).dispose(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_state_labels_match_snake_case() {
        assert_eq!(SessionState::Active.as_str(), "active");
        assert_eq!(SessionState::Expired.as_str(), "expired");
        assert_eq!(SessionState::Refreshing.as_str(), "refreshing");
    }

    #[test]
    fn handle_age_counts_from_establishment() {
        let mut handle = SessionHandle::new("s1");
        assert!(handle.age() >= TimeDelta::zero());
        handle.established_at -= TimeDelta::seconds(90);
        assert!(handle.age().num_seconds() >= 90);
    }

    #[test]
    fn session_state_serializes_as_slug() {
        let value = serde_json::to_value(SessionState::Expired).expect("serialize state");
        assert_eq!(value, serde_json::json!("expired"));
        let parsed: SessionState =
            serde_json::from_value(serde_json::json!("refreshing")).expect("parse state");
        assert_eq!(parsed, SessionState::Refreshing);
    }

    #[test]
    fn trigger_report_constructors() {
        assert!(TriggerReport::triggered().triggered);
        assert!(TriggerReport::not_found().session_alive);
        assert!(!TriggerReport::session_lost().session_alive);
    }

    #[test]
    fn only_session_dead_requests_replacement() {
        assert!(ProviderError::SessionDead("invalid session id".into()).is_session_dead());
        assert!(!ProviderError::NoTriggerFound("button".into()).is_session_dead());
        assert!(!ProviderError::Establish("driver".into()).is_session_dead());
    }
}
