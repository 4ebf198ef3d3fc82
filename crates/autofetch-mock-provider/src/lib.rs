//! Deterministic stand-ins for the browser and the download directory.
//!
//! [`SimulatedDirectory`] applies scheduled file events against a shared
//! [`ManualClock`]; [`ScriptedProvider`] replays per-address steps and feeds
//! download timelines into that directory when a trigger fires.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use autofetch_core::{CancelFlag, DirectoryView, ManualClock};
use autofetch_session::{InteractionProvider, ProviderError, SessionHandle, TriggerReport};
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DirEvent {
    Create { name: String, size: u64 },
    Resize { name: String, size: u64 },
    Rename { from: String, to: String },
    Remove { name: String },
}

impl DirEvent {
    pub fn create(name: &str, size: u64) -> Self {
        DirEvent::Create {
            name: name.to_string(),
            size,
        }
    }

    pub fn resize(name: &str, size: u64) -> Self {
        DirEvent::Resize {
            name: name.to_string(),
            size,
        }
    }

    pub fn rename(from: &str, to: &str) -> Self {
        DirEvent::Rename {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn remove(name: &str) -> Self {
        DirEvent::Remove {
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct DirState {
    files: BTreeMap<String, u64>,
    pending: Vec<(Duration, DirEvent)>,
    fail_listing: bool,
}

impl DirState {
    fn apply_due(&mut self, now: Duration) {
        if self.pending.is_empty() {
            return;
        }
        // stable sort keeps insertion order for events scheduled at the same instant
        self.pending.sort_by_key(|(at, _)| *at);
        let due = self.pending.iter().take_while(|(at, _)| *at <= now).count();
        for (_, event) in self.pending.drain(..due) {
            match event {
                DirEvent::Create { name, size } | DirEvent::Resize { name, size } => {
                    self.files.insert(name, size);
                }
                DirEvent::Rename { from, to } => {
                    if let Some(size) = self.files.remove(&from) {
                        self.files.insert(to, size);
                    }
                }
                DirEvent::Remove { name } => {
                    self.files.remove(&name);
                }
            }
        }
    }
}

/// In-memory download directory driven by a [`ManualClock`]. Clones share
/// state, so the provider can schedule events the loop later observes.
#[derive(Clone, Debug)]
pub struct SimulatedDirectory {
    root: PathBuf,
    clock: ManualClock,
    state: Arc<Mutex<DirState>>,
}

impl SimulatedDirectory {
    pub fn new(clock: &ManualClock) -> Self {
        Self {
            root: PathBuf::from("/simulated/downloads"),
            clock: clock.clone(),
            state: Arc::new(Mutex::new(DirState::default())),
        }
    }

    pub fn with_file(self, name: &str, size: u64) -> Self {
        self.lock().files.insert(name.to_string(), size);
        self
    }

    /// Queue `event` to happen `delay` after the current simulated time.
    pub fn schedule_after(&self, delay: Duration, event: DirEvent) {
        let at = self.clock.elapsed() + delay;
        self.lock().pending.push((at, event));
    }

    /// Make every listing fail until switched back.
    pub fn set_listing_failure(&self, failing: bool) {
        self.lock().fail_listing = failing;
    }

    /// Current file names with due events applied.
    pub fn files(&self) -> Vec<String> {
        self.current().files.keys().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, DirState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current(&self) -> MutexGuard<'_, DirState> {
        let mut state = self.lock();
        state.apply_due(self.clock.elapsed());
        state
    }
}

impl DirectoryView for SimulatedDirectory {
    fn root(&self) -> &Path {
        &self.root
    }

    fn list(&self) -> io::Result<BTreeSet<String>> {
        let state = self.current();
        if state.fail_listing {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "listing denied"));
        }
        Ok(state.files.keys().cloned().collect())
    }

    fn size(&self, name: &str) -> io::Result<u64> {
        self.current()
            .files
            .get(name)
            .copied()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, name.to_string()))
    }

    fn exists(&self, name: &str) -> bool {
        self.current().files.contains_key(name)
    }
}

/// What the provider does the next time a given address is triggered.
#[derive(Clone, Debug)]
pub enum Step {
    /// Trigger succeeds and the events are scheduled relative to that moment.
    Download(Vec<(Duration, DirEvent)>),
    /// Trigger succeeds but nothing ever lands on disk.
    Nothing,
    /// Page opened but no trigger element was found.
    NoTrigger,
    /// The driver reports the session as gone.
    SessionDead,
    /// Trigger call returns normally but flags the session as lost.
    SessionLost,
    /// Trigger succeeds and the run is cancelled while waiting.
    Interrupt(CancelFlag),
}

/// Provider that replays [`Step`]s per address. The last step of an
/// address repeats once its queue is down to one entry.
#[derive(Debug)]
pub struct ScriptedProvider {
    directory: SimulatedDirectory,
    scripts: HashMap<String, VecDeque<Step>>,
    live: HashSet<String>,
    next_session: u32,
    establish_budget: Option<u32>,
    pub established: u32,
    pub disposed: Vec<String>,
    pub triggered: Vec<String>,
    pub probes: u32,
}

impl ScriptedProvider {
    pub fn new(directory: &SimulatedDirectory) -> Self {
        Self {
            directory: directory.clone(),
            scripts: HashMap::new(),
            live: HashSet::new(),
            next_session: 0,
            establish_budget: None,
            established: 0,
            disposed: Vec::new(),
            triggered: Vec::new(),
            probes: 0,
        }
    }

    pub fn script(mut self, address: &str, steps: Vec<Step>) -> Self {
        self.scripts
            .insert(address.to_string(), steps.into_iter().collect());
        self
    }

    /// Allow only `count` successful establishments; later ones fail.
    pub fn establish_limit(mut self, count: u32) -> Self {
        self.establish_budget = Some(count);
        self
    }

    pub fn live_sessions(&self) -> usize {
        self.live.len()
    }

    fn next_step(&mut self, address: &str) -> Step {
        match self.scripts.get_mut(address) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(Step::NoTrigger),
            Some(queue) => queue.front().cloned().unwrap_or(Step::NoTrigger),
            None => Step::NoTrigger,
        }
    }
}

impl InteractionProvider for ScriptedProvider {
    fn id(&self) -> &'static str {
        "scripted"
    }

    fn establish(&mut self) -> Result<SessionHandle, ProviderError> {
        if let Some(budget) = self.establish_budget {
            if self.established >= budget {
                return Err(ProviderError::Establish("driver binary not found".into()));
            }
        }
        self.next_session += 1;
        self.established += 1;
        let handle = SessionHandle::new(format!("sim-{}", self.next_session));
        self.live.insert(handle.id.clone());
        debug!(target: "autofetch::mock", session = %handle.id, "session established");
        Ok(handle)
    }

    fn probe(&mut self, handle: &SessionHandle) -> bool {
        self.probes += 1;
        self.live.contains(&handle.id)
    }

    fn open_and_trigger(
        &mut self,
        handle: &SessionHandle,
        address: &str,
    ) -> Result<TriggerReport, ProviderError> {
        if !self.live.contains(&handle.id) {
            return Err(ProviderError::SessionDead("invalid session id".into()));
        }
        self.triggered.push(address.to_string());
        match self.next_step(address) {
            Step::Download(events) => {
                for (delay, event) in events {
                    self.directory.schedule_after(delay, event);
                }
                Ok(TriggerReport::triggered())
            }
            Step::Nothing => Ok(TriggerReport::triggered()),
            Step::NoTrigger => Ok(TriggerReport::not_found()),
            Step::SessionDead => {
                self.live.remove(&handle.id);
                Err(ProviderError::SessionDead("no such window".into()))
            }
            Step::SessionLost => {
                self.live.remove(&handle.id);
                Ok(TriggerReport::session_lost())
            }
            Step::Interrupt(cancel) => {
                cancel.cancel();
                Ok(TriggerReport::triggered())
            }
        }
    }

    fn dispose(&mut self, handle: SessionHandle) -> Result<(), ProviderError> {
        self.live.remove(&handle.id);
        self.disposed.push(handle.id);
        Ok(())
    }
}

/// Timeline of a browser download: partial file, growth, then rename to
/// the final name.
pub fn browser_download(final_name: &str, size: u64) -> Vec<(Duration, DirEvent)> {
    let partial = format!("{final_name}.crdownload");
    vec![
        (Duration::from_millis(500), DirEvent::create(&partial, size / 4)),
        (Duration::from_secs(2), DirEvent::resize(&partial, size / 2)),
        (Duration::from_secs(4), DirEvent::resize(&partial, size)),
        (Duration::from_secs(5), DirEvent::rename(&partial, final_name)),
    ]
}
