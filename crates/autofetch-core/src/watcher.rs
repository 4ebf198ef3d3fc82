use std::collections::BTreeSet;
use std::time::Duration;

use tracing::{debug, trace};

use crate::cancel::CancelFlag;
use crate::clock::Clock;
use crate::filename::ResolvedName;
use crate::fsview::{is_temp_name, DirectorySnapshot, DirectoryView};
use crate::matcher::ExistingFileMatcher;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatcherConfig {
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// Pause used while a temp-suffixed entry is still present.
    pub temp_backoff: Duration,
    /// Consecutive equal-size samples required before a file counts as done.
    pub stability_checks: u32,
    pub stability_interval: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(150),
            poll_interval: Duration::from_secs(1),
            temp_backoff: Duration::from_millis(1500),
            stability_checks: 3,
            stability_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Completion {
    /// A new, non-temporary entry held its size across the stability window.
    Finished(String),
    /// A complete file representing the address was already on disk.
    AlreadyPresent(String),
    TimedOut,
    Cancelled,
}

/// Optional existing-file recheck performed when nothing new is stable yet.
#[derive(Clone, Copy)]
pub struct Recheck<'a> {
    pub matcher: &'a ExistingFileMatcher,
    pub name: &'a ResolvedName,
}

enum StableScan {
    Stable(String),
    Growing(String),
    Nothing,
}

/// Polls the download directory until a retrieval started after `snapshot`
/// has finished writing.
#[derive(Clone, Debug, Default)]
pub struct DownloadCompletionWatcher {
    config: WatcherConfig,
}

impl DownloadCompletionWatcher {
    pub fn new(config: WatcherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    pub fn wait(
        &self,
        view: &dyn DirectoryView,
        clock: &dyn Clock,
        snapshot: &DirectorySnapshot,
        recheck: Option<Recheck<'_>>,
        cancel: &CancelFlag,
    ) -> Completion {
        let deadline = clock.deadline(self.config.timeout);
        let mut cycle: u64 = 0;

        while !clock.reached(deadline) {
            if cancel.is_cancelled() {
                return Completion::Cancelled;
            }
            cycle += 1;

            let current = match view.list() {
                Ok(current) => current,
                Err(err) => {
                    debug!(target: "autofetch::watcher", cycle, error = %err, "listing failed; no new information this cycle");
                    BTreeSet::new()
                }
            };
            let fresh = snapshot.new_entries(&current);

            if let Some(pending) = fresh.iter().find(|name| is_temp_name(name)) {
                trace!(target: "autofetch::watcher", cycle, pending = %pending, "download still in progress");
                clock.sleep(self.config.temp_backoff);
                continue;
            }

            match self.first_stable(view, clock, &fresh) {
                StableScan::Stable(name) => {
                    debug!(target: "autofetch::watcher", cycle, file = %name, "download finished");
                    return Completion::Finished(name);
                }
                StableScan::Growing(name) => {
                    trace!(target: "autofetch::watcher", cycle, file = %name, "size changed during stability window");
                    continue;
                }
                StableScan::Nothing => {}
            }

            if let Some(Recheck { matcher, name: target }) = recheck {
                if let Some(name) = matcher.find_existing_named(view, target) {
                    let is_fresh = fresh.iter().any(|entry| **entry == name);
                    if !is_fresh && !is_temp_name(&name) {
                        debug!(target: "autofetch::watcher", cycle, file = %name, "target already present");
                        return Completion::AlreadyPresent(name);
                    }
                }
            }

            clock.sleep(self.config.poll_interval);
        }

        Completion::TimedOut
    }

    fn first_stable(
        &self,
        view: &dyn DirectoryView,
        clock: &dyn Clock,
        fresh: &[&String],
    ) -> StableScan {
        'candidates: for name in fresh {
            if !view.exists(name) {
                continue;
            }
            let Ok(size) = view.size(name) else {
                continue;
            };
            for _ in 0..self.config.stability_checks {
                clock.sleep(self.config.stability_interval);
                match view.size(name) {
                    Ok(sampled) if sampled == size => {}
                    Ok(_) => return StableScan::Growing(name.to_string()),
                    // vanished mid-window (renamed or removed)
                    Err(_) => continue 'candidates,
                }
            }
            return StableScan::Stable(name.to_string());
        }
        StableScan::Nothing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::filename::FilenameResolver;
    use std::io;
    use std::path::Path;

    /// Directory whose contents follow a timeline of frames on a manual clock.
    struct TimelineDir {
        clock: ManualClock,
        frames: Vec<(Duration, Vec<(&'static str, u64)>)>,
        broken: bool,
    }

    impl TimelineDir {
        fn new(clock: &ManualClock, frames: Vec<(u64, Vec<(&'static str, u64)>)>) -> Self {
            Self {
                clock: clock.clone(),
                frames: frames
                    .into_iter()
                    .map(|(ms, files)| (Duration::from_millis(ms), files))
                    .collect(),
                broken: false,
            }
        }

        fn frame(&self) -> &[(&'static str, u64)] {
            let now = self.clock.elapsed();
            self.frames
                .iter()
                .rev()
                .find(|(at, _)| *at <= now)
                .map(|(_, files)| files.as_slice())
                .unwrap_or(&[])
        }
    }

    impl DirectoryView for TimelineDir {
        fn root(&self) -> &Path {
            Path::new("/sim")
        }

        fn list(&self) -> io::Result<BTreeSet<String>> {
            if self.broken {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
            }
            Ok(self.frame().iter().map(|(n, _)| n.to_string()).collect())
        }

        fn size(&self, name: &str) -> io::Result<u64> {
            self.frame()
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, s)| *s)
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, name.to_string()))
        }

        fn exists(&self, name: &str) -> bool {
            self.frame().iter().any(|(n, _)| *n == name)
        }
    }

    fn watcher(timeout_secs: u64) -> DownloadCompletionWatcher {
        DownloadCompletionWatcher::new(WatcherConfig {
            timeout: Duration::from_secs(timeout_secs),
            ..WatcherConfig::default()
        })
    }

    #[test]
    fn temp_file_then_stable_final_file_is_reported() {
        let clock = ManualClock::new();
        let dir = TimelineDir::new(
            &clock,
            vec![
                (0, vec![("old.zip", 10)]),
                (500, vec![("old.zip", 10), ("movie.rar.crdownload", 100)]),
                (2_000, vec![("old.zip", 10), ("movie.rar.crdownload", 4_000)]),
                (4_000, vec![("old.zip", 10), ("movie.rar", 5_000)]),
            ],
        );
        let snapshot = DirectorySnapshot::from_names(["old.zip"]);

        let outcome = watcher(150).wait(&dir, &clock, &snapshot, None, &CancelFlag::new());
        assert_eq!(outcome, Completion::Finished("movie.rar".into()));
        assert!(clock.elapsed() >= Duration::from_secs(7));
    }

    #[test]
    fn unbounded_timeout_still_reports_finished_file() {
        let clock = ManualClock::new();
        let dir = TimelineDir::new(
            &clock,
            vec![(0, vec![]), (1_000, vec![("movie.rar", 5_000)])],
        );
        let outcome = DownloadCompletionWatcher::new(WatcherConfig {
            timeout: Duration::from_secs(u64::MAX),
            ..WatcherConfig::default()
        })
        .wait(
            &dir,
            &clock,
            &DirectorySnapshot::default(),
            None,
            &CancelFlag::new(),
        );
        assert_eq!(outcome, Completion::Finished("movie.rar".into()));
    }

    #[test]
    fn size_change_during_window_delays_completion() {
        let clock = ManualClock::new();
        let dir = TimelineDir::new(
            &clock,
            vec![
                (0, vec![]),
                (1_000, vec![("movie.rar", 1_000)]),
                (2_500, vec![("movie.rar", 2_000)]),
                (6_000, vec![("movie.rar", 3_000)]),
            ],
        );
        let snapshot = DirectorySnapshot::default();

        let outcome = watcher(150).wait(&dir, &clock, &snapshot, None, &CancelFlag::new());
        assert_eq!(outcome, Completion::Finished("movie.rar".into()));
        // the final size appears at 6s and must then hold for a full window
        assert!(clock.elapsed() >= Duration::from_secs(9));
    }

    #[test]
    fn growing_file_is_never_returned_before_deadline() {
        let clock = ManualClock::new();
        let frames = (1..=40u64)
            .map(|i| (i * 500, vec![("movie.rar", i * 1_000)]))
            .collect();
        let dir = TimelineDir::new(&clock, frames);

        let outcome = watcher(15).wait(
            &dir,
            &clock,
            &DirectorySnapshot::default(),
            None,
            &CancelFlag::new(),
        );
        assert_eq!(outcome, Completion::TimedOut);
    }

    #[test]
    fn recheck_reports_complete_file_already_on_disk() {
        let clock = ManualClock::new();
        let dir = TimelineDir::new(&clock, vec![(0, vec![("game.rar", 42)])]);
        let snapshot = DirectorySnapshot::from_names(["game.rar"]);
        let matcher = ExistingFileMatcher::new(FilenameResolver::new());
        let target = ResolvedName::new("game.rar");
        let recheck = Recheck {
            matcher: &matcher,
            name: &target,
        };

        let outcome = watcher(150).wait(&dir, &clock, &snapshot, Some(recheck), &CancelFlag::new());
        assert_eq!(outcome, Completion::AlreadyPresent("game.rar".into()));
    }

    #[test]
    fn recheck_ignores_in_progress_matches() {
        let clock = ManualClock::new();
        let dir = TimelineDir::new(&clock, vec![(0, vec![("game.rar.part", 42)])]);
        let snapshot = DirectorySnapshot::from_names(["game.rar.part"]);
        let matcher = ExistingFileMatcher::new(FilenameResolver::new());
        let target = ResolvedName::new("game.rar");
        let recheck = Recheck {
            matcher: &matcher,
            name: &target,
        };

        let outcome = watcher(5).wait(&dir, &clock, &snapshot, Some(recheck), &CancelFlag::new());
        assert_eq!(outcome, Completion::TimedOut);
    }

    #[test]
    fn listing_errors_are_retried_until_timeout() {
        let clock = ManualClock::new();
        let mut dir = TimelineDir::new(&clock, vec![(0, vec![("movie.rar", 1)])]);
        dir.broken = true;

        let outcome = watcher(10).wait(
            &dir,
            &clock,
            &DirectorySnapshot::default(),
            None,
            &CancelFlag::new(),
        );
        assert_eq!(outcome, Completion::TimedOut);
        assert!(clock.elapsed() >= Duration::from_secs(10));
    }

    #[test]
    fn cancellation_is_observed_between_cycles() {
        let clock = ManualClock::new();
        let dir = TimelineDir::new(&clock, vec![(0, vec![])]);
        let cancel = CancelFlag::new();
        cancel.cancel();

        let outcome = watcher(150).wait(&dir, &clock, &DirectorySnapshot::default(), None, &cancel);
        assert_eq!(outcome, Completion::Cancelled);
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }
}
