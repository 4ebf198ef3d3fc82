use std::time::Duration;

use autofetch_session::{InteractionProvider, SessionHandle, SessionState};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::FetchError;

/// Owns the current interaction session and decides when to rotate it.
///
/// `Active -> Expired` on [`mark_expired`](Self::mark_expired); `Active ->
/// Refreshing` once `threshold` successes were recorded; `Expired ->
/// Refreshing -> Active` inside [`refresh`](Self::refresh), which resets the
/// success counter. A threshold of zero disables proactive rotation.
#[derive(Debug)]
pub struct SessionLifecycleManager {
    state: SessionState,
    handle: Option<SessionHandle>,
    successes_since_refresh: u32,
    threshold: u32,
    refreshes: u32,
    restart_pause: Duration,
}

impl SessionLifecycleManager {
    pub fn new(threshold: u32) -> Self {
        Self {
            // no handle yet; the first refresh establishes one
            state: SessionState::Expired,
            handle: None,
            successes_since_refresh: 0,
            threshold,
            refreshes: 0,
            restart_pause: Duration::ZERO,
        }
    }

    /// Pause between discarding an old session and establishing the next.
    pub fn with_restart_pause(mut self, pause: Duration) -> Self {
        self.restart_pause = pause;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn handle(&self) -> Option<&SessionHandle> {
        self.handle.as_ref()
    }

    pub fn successes_since_refresh(&self) -> u32 {
        self.successes_since_refresh
    }

    /// Number of sessions established after the first one.
    pub fn refresh_count(&self) -> u32 {
        self.refreshes.saturating_sub(1)
    }

    /// True once the success-count threshold has been reached.
    pub fn should_refresh(&self) -> bool {
        self.threshold > 0 && self.successes_since_refresh >= self.threshold
    }

    /// True when the next address needs a new session before it can proceed.
    pub fn needs_session(&self) -> bool {
        self.handle.is_none() || self.state != SessionState::Active || self.should_refresh()
    }

    pub fn mark_expired(&mut self) {
        if self.state != SessionState::Expired {
            debug!(target: "autofetch::session", from = self.state.as_str(), "session expired");
        }
        self.state = SessionState::Expired;
    }

    pub fn record_success(&mut self) {
        self.successes_since_refresh = self.successes_since_refresh.saturating_add(1);
    }

    /// Discard the current session (best effort) and establish a new one.
    ///
    /// Safe to call again after a failed attempt: the old handle is released
    /// only once, and establishment failure leaves the manager without a
    /// session in the `Refreshing` state.
    pub fn refresh(
        &mut self,
        provider: &mut dyn InteractionProvider,
        clock: &dyn Clock,
    ) -> Result<&SessionHandle, FetchError> {
        self.state = SessionState::Refreshing;
        if let Some(old) = self.handle.take() {
            let old_id = old.id.clone();
            if let Err(err) = provider.dispose(old) {
                warn!(target: "autofetch::session", session = %old_id, error = %err, "ignoring failure while disposing session");
            }
            clock.sleep(self.restart_pause);
        }

        let handle = provider
            .establish()
            .map_err(|err| FetchError::SessionEstablish(err.to_string()))?;
        info!(target: "autofetch::session", provider = provider.id(), session = %handle.id, "session established");
        self.successes_since_refresh = 0;
        self.refreshes = self.refreshes.saturating_add(1);
        self.state = SessionState::Active;
        let handle = self.handle.insert(handle);
        Ok(&*handle)
    }

    /// Release the session at the end of a run.
    pub fn shutdown(&mut self, provider: &mut dyn InteractionProvider) {
        if let Some(handle) = self.handle.take() {
            if let Err(err) = provider.dispose(handle) {
                warn!(target: "autofetch::session", error = %err, "ignoring failure while closing session");
            }
        }
        self.state = SessionState::Expired;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use autofetch_session::{ProviderError, TriggerReport};

    #[derive(Default)]
    struct CountingProvider {
        established: u32,
        disposed: Vec<String>,
        fail_establish: bool,
        fail_dispose: bool,
    }

    impl InteractionProvider for CountingProvider {
        fn id(&self) -> &'static str {
            "counting"
        }

        fn establish(&mut self) -> Result<SessionHandle, ProviderError> {
            if self.fail_establish {
                return Err(ProviderError::Establish("driver missing".into()));
            }
            self.established += 1;
            Ok(SessionHandle::new(format!("s{}", self.established)))
        }

        fn probe(&mut self, _handle: &SessionHandle) -> bool {
            true
        }

        fn open_and_trigger(
            &mut self,
            _handle: &SessionHandle,
            _address: &str,
        ) -> Result<TriggerReport, ProviderError> {
            Ok(TriggerReport::triggered())
        }

        fn dispose(&mut self, handle: SessionHandle) -> Result<(), ProviderError> {
            self.disposed.push(handle.id);
            if self.fail_dispose {
                return Err(ProviderError::Io("already closed".into()));
            }
            Ok(())
        }
    }

    #[test]
    fn new_manager_starts_expired_without_a_session() {
        let manager = SessionLifecycleManager::new(3);
        assert_eq!(manager.state(), SessionState::Expired);
        assert!(manager.handle().is_none());
        assert!(manager.needs_session());
    }

    #[test]
    fn threshold_reached_after_exactly_n_successes() {
        let mut provider = CountingProvider::default();
        let clock = ManualClock::new();
        let mut manager = SessionLifecycleManager::new(3);
        manager.refresh(&mut provider, &clock).expect("establish");
        assert_eq!(manager.state(), SessionState::Active);

        for _ in 0..2 {
            manager.record_success();
            assert!(!manager.should_refresh());
        }
        manager.record_success();
        assert!(manager.should_refresh());
        // stays due until a refresh happens
        manager.record_success();
        assert!(manager.should_refresh());
        assert!(manager.needs_session());

        manager.refresh(&mut provider, &clock).expect("refresh");
        assert!(!manager.should_refresh());
        assert_eq!(manager.successes_since_refresh(), 0);
        assert_eq!(provider.disposed, vec!["s1".to_string()]);
        assert_eq!(manager.handle().map(|h| h.id.as_str()), Some("s2"));
        assert_eq!(manager.refresh_count(), 1);
    }

    #[test]
    fn zero_threshold_disables_rotation() {
        let mut provider = CountingProvider::default();
        let clock = ManualClock::new();
        let mut manager = SessionLifecycleManager::new(0);
        manager.refresh(&mut provider, &clock).expect("establish");
        for _ in 0..50 {
            manager.record_success();
        }
        assert!(!manager.should_refresh());
        assert!(!manager.needs_session());
    }

    #[test]
    fn expired_session_needs_refresh_and_dispose_errors_are_ignored() {
        let mut provider = CountingProvider {
            fail_dispose: true,
            ..Default::default()
        };
        let clock = ManualClock::new();
        let mut manager = SessionLifecycleManager::new(10);
        manager.refresh(&mut provider, &clock).expect("establish");
        manager.mark_expired();
        assert_eq!(manager.state(), SessionState::Expired);
        assert!(manager.needs_session());

        manager.refresh(&mut provider, &clock).expect("refresh despite dispose error");
        assert_eq!(manager.state(), SessionState::Active);
        assert_eq!(provider.disposed, vec!["s1".to_string()]);
    }

    #[test]
    fn establish_failure_is_fatal_and_repeatable() {
        let mut provider = CountingProvider::default();
        let clock = ManualClock::new();
        let mut manager = SessionLifecycleManager::new(2);
        manager.refresh(&mut provider, &clock).expect("establish");

        provider.fail_establish = true;
        let err = manager.refresh(&mut provider, &clock).expect_err("establish fails");
        assert!(matches!(err, FetchError::SessionEstablish(_)));
        assert_eq!(manager.state(), SessionState::Refreshing);
        assert!(manager.handle().is_none());

        // second attempt does not dispose anything again
        let _ = manager.refresh(&mut provider, &clock);
        assert_eq!(provider.disposed.len(), 1);

        provider.fail_establish = false;
        manager.refresh(&mut provider, &clock).expect("recovers");
        assert_eq!(manager.state(), SessionState::Active);
    }

    #[test]
    fn shutdown_releases_handle() {
        let mut provider = CountingProvider::default();
        let clock = ManualClock::new();
        let mut manager = SessionLifecycleManager::new(2);
        manager.refresh(&mut provider, &clock).expect("establish");
        manager.shutdown(&mut provider);
        assert!(manager.handle().is_none());
        assert_eq!(provider.disposed, vec!["s1".to_string()]);
    }
}
