//! Sequential per-address driver composing matcher, session manager,
//! provider and completion watcher.

use std::time::Duration;

use autofetch_session::{InteractionProvider, SessionHandle};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cancel::CancelFlag;
use crate::clock::Clock;
use crate::error::FetchError;
use crate::filename::ResolvedName;
use crate::fsview::{DirectorySnapshot, DirectoryView};
use crate::matcher::ExistingFileMatcher;
use crate::session::SessionLifecycleManager;
use crate::util::truncate_chars;
use crate::watcher::{Completion, DownloadCompletionWatcher, Recheck, WatcherConfig};

const LABEL_MAX_CHARS: usize = 60;

#[derive(Clone, Debug, PartialEq)]
pub struct LoopConfig {
    /// Successful downloads before the session is rotated (0 disables).
    pub session_refresh: u32,
    pub delay_between: Duration,
    /// Pause after discarding a session, before establishing the next one.
    pub restart_pause: Duration,
    pub watcher: WatcherConfig,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            session_refresh: 10,
            delay_between: Duration::from_secs(2),
            restart_pause: Duration::from_secs(1),
            watcher: WatcherConfig::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Skipped { existing: String },
    Succeeded { filename: String },
    Failed { reason: String, kind: &'static str },
}

impl Outcome {
    fn failed(err: &FetchError) -> Self {
        Outcome::Failed {
            reason: err.to_string(),
            kind: err.slug(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl Tally {
    pub fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Skipped { .. } => self.skipped += 1,
            Outcome::Succeeded { .. } => self.succeeded += 1,
            Outcome::Failed { .. } => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }

    /// Addresses whose file is on disk after the run.
    pub fn available(&self) -> usize {
        self.succeeded + self.skipped
    }

    pub fn percent(count: usize, of: usize) -> f64 {
        if of == 0 {
            0.0
        } else {
            count as f64 / of as f64 * 100.0
        }
    }
}

/// One entry of the outcome stream.
#[derive(Clone, Debug, Serialize)]
pub struct ItemReport {
    pub index: usize,
    pub total: usize,
    pub address: String,
    pub label: String,
    pub outcome: Outcome,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum Abort {
    Cancelled,
    SessionEstablish(String),
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct RunReport {
    pub outcomes: Vec<(String, Outcome)>,
    pub tally: Tally,
    pub planned: usize,
    pub aborted: Option<Abort>,
}

impl RunReport {
    fn push(&mut self, address: &str, outcome: Outcome) {
        self.tally.record(&outcome);
        self.outcomes.push((address.to_string(), outcome));
    }
}

enum TriggerAttempt {
    Triggered,
    SessionDead(String),
    Failed(FetchError),
}

pub struct OrchestrationLoop<'a> {
    config: LoopConfig,
    view: &'a dyn DirectoryView,
    clock: &'a dyn Clock,
    matcher: &'a ExistingFileMatcher,
    watcher: DownloadCompletionWatcher,
    sessions: SessionLifecycleManager,
    cancel: CancelFlag,
}

impl<'a> OrchestrationLoop<'a> {
    pub fn new(
        config: LoopConfig,
        view: &'a dyn DirectoryView,
        clock: &'a dyn Clock,
        matcher: &'a ExistingFileMatcher,
        cancel: CancelFlag,
    ) -> Self {
        let watcher = DownloadCompletionWatcher::new(config.watcher.clone());
        let sessions = SessionLifecycleManager::new(config.session_refresh)
            .with_restart_pause(config.restart_pause);
        Self {
            config,
            view,
            clock,
            matcher,
            watcher,
            sessions,
            cancel,
        }
    }

    pub fn sessions(&self) -> &SessionLifecycleManager {
        &self.sessions
    }

    /// Resolve once per address; matching, labelling and the watcher recheck
    /// all reuse the result.
    fn resolve(&self, address: &str) -> Option<ResolvedName> {
        let resolved = self.matcher.resolver().resolve(address).into_name();
        if resolved.is_none() {
            debug!(target: "autofetch::loop", address, error = %FetchError::UnresolvableName, "matching and labelling fall back to the address");
        }
        resolved
    }

    /// Process every address in order. The report always carries the tally of
    /// what was recorded, including after a fatal abort.
    pub fn run(
        &mut self,
        addresses: &[String],
        provider: &mut dyn InteractionProvider,
        on_item: &mut dyn FnMut(&ItemReport),
    ) -> RunReport {
        let mut report = RunReport {
            planned: addresses.len(),
            ..RunReport::default()
        };
        let total = addresses.len();

        for (idx, address) in addresses.iter().enumerate() {
            if self.cancel.is_cancelled() {
                report.aborted = Some(Abort::Cancelled);
                break;
            }

            let resolved = self.resolve(address);
            let label = label_for(address, resolved.as_ref());
            info!(target: "autofetch::loop", index = idx + 1, total, %label, "processing address");

            let (outcome, interrupted) = match self.process(address, resolved.as_ref(), provider) {
                Ok(outcome) => (outcome, false),
                Err(FetchError::SessionEstablish(msg)) => {
                    warn!(target: "autofetch::loop", error = %msg, "cannot establish a session; aborting run");
                    report.aborted = Some(Abort::SessionEstablish(msg));
                    break;
                }
                Err(err) => (Outcome::failed(&err), err.is_fatal()),
            };
            // skipped addresses never reached the target service
            let paced = !matches!(outcome, Outcome::Skipped { .. });

            if matches!(outcome, Outcome::Succeeded { .. }) {
                self.sessions.record_success();
            }
            info!(target: "autofetch::loop", %label, outcome = ?outcome, "address finished");
            on_item(&ItemReport {
                index: idx + 1,
                total,
                address: address.clone(),
                label,
                outcome: outcome.clone(),
            });
            report.push(address, outcome);

            if interrupted || self.cancel.is_cancelled() {
                report.aborted = Some(Abort::Cancelled);
                break;
            }
            if paced && idx + 1 < total {
                self.clock.sleep(self.config.delay_between);
            }
        }

        self.sessions.shutdown(provider);
        report
    }

    fn process(
        &mut self,
        address: &str,
        resolved: Option<&ResolvedName>,
        provider: &mut dyn InteractionProvider,
    ) -> Result<Outcome, FetchError> {
        if let Some(existing) =
            resolved.and_then(|name| self.matcher.find_existing_named(self.view, name))
        {
            return Ok(Outcome::Skipped { existing });
        }

        if self.sessions.needs_session() {
            if let Some(handle) = self.sessions.handle() {
                info!(
                    target: "autofetch::loop",
                    session = %handle.id,
                    age_secs = handle.age().num_seconds(),
                    successes = self.sessions.successes_since_refresh(),
                    state = self.sessions.state().as_str(),
                    "rotating session"
                );
            }
            self.restart_session(provider)?;
        }

        let snapshot = self.trigger_with_retry(address, provider)?;
        let recheck = resolved.map(|name| Recheck {
            matcher: self.matcher,
            name,
        });
        match self
            .watcher
            .wait(self.view, self.clock, &snapshot, recheck, &self.cancel)
        {
            Completion::Finished(filename) | Completion::AlreadyPresent(filename) => {
                Ok(Outcome::Succeeded { filename })
            }
            Completion::TimedOut => Err(FetchError::CompletionTimeout(self.watcher.config().timeout)),
            Completion::Cancelled => Err(FetchError::Cancelled),
        }
    }

    /// Trigger the address, refreshing the session and retrying exactly once
    /// if the provider reports the session dead. Returns the pre-trigger
    /// snapshot of the attempt that succeeded.
    fn trigger_with_retry(
        &mut self,
        address: &str,
        provider: &mut dyn InteractionProvider,
    ) -> Result<DirectorySnapshot, FetchError> {
        let mut retried = false;
        loop {
            let snapshot = DirectorySnapshot::capture(self.view)?;
            let handle = self.current_handle()?;
            match self.attempt_trigger(&handle, address, provider) {
                TriggerAttempt::Triggered => return Ok(snapshot),
                TriggerAttempt::Failed(err) => return Err(err),
                TriggerAttempt::SessionDead(msg) => {
                    self.sessions.mark_expired();
                    if retried {
                        return Err(FetchError::SessionDead(msg));
                    }
                    warn!(target: "autofetch::loop", address, error = %msg, "session died; restarting and retrying once");
                    self.restart_session(provider)?;
                    retried = true;
                }
            }
        }
    }

    fn attempt_trigger(
        &self,
        handle: &SessionHandle,
        address: &str,
        provider: &mut dyn InteractionProvider,
    ) -> TriggerAttempt {
        if !provider.probe(handle) {
            return TriggerAttempt::SessionDead("liveness probe failed".to_string());
        }
        match provider.open_and_trigger(handle, address) {
            Ok(report) if !report.session_alive => {
                TriggerAttempt::SessionDead("provider reported session loss".to_string())
            }
            Ok(report) if !report.triggered => TriggerAttempt::Failed(FetchError::NoTriggerFound(
                format!("no actionable element on {address}"),
            )),
            Ok(_) => TriggerAttempt::Triggered,
            Err(err) if err.is_session_dead() => TriggerAttempt::SessionDead(err.to_string()),
            Err(err) => TriggerAttempt::Failed(err.into()),
        }
    }

    fn restart_session(&mut self, provider: &mut dyn InteractionProvider) -> Result<(), FetchError> {
        let handle = self.sessions.refresh(provider, self.clock)?;
        debug!(target: "autofetch::loop", session = %handle.id, "session ready");
        Ok(())
    }

    fn current_handle(&self) -> Result<SessionHandle, FetchError> {
        self.sessions
            .handle()
            .cloned()
            .ok_or_else(|| FetchError::SessionDead("no active session".to_string()))
    }
}

/// Display label for an address: its resolved filename, or a prefix of the
/// address itself.
fn label_for(address: &str, resolved: Option<&ResolvedName>) -> String {
    match resolved {
        Some(name) => name.as_str().to_string(),
        None => truncate_chars(address, LABEL_MAX_CHARS),
    }
}
