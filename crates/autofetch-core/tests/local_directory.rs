use std::fs;
use std::time::Duration;

use autofetch_core::{
    CancelFlag, Completion, DirectorySnapshot, DirectoryView, DownloadCompletionWatcher,
    ExistingFileMatcher, FilenameResolver, LocalDirectory, ManualClock, WatcherConfig,
};

fn quick_watcher() -> DownloadCompletionWatcher {
    DownloadCompletionWatcher::new(WatcherConfig {
        timeout: Duration::from_secs(10),
        poll_interval: Duration::from_millis(100),
        temp_backoff: Duration::from_millis(100),
        stability_checks: 2,
        stability_interval: Duration::from_millis(50),
    })
}

#[test]
fn numbered_duplicate_on_disk_is_recognised() {
    let tmp = tempfile::tempdir().expect("tmpdir");
    let dir = LocalDirectory::ensure(tmp.path().join("downloads")).expect("create dir");
    fs::write(dir.root().join("movie (1).rar"), b"data").expect("write file");

    let matcher = ExistingFileMatcher::new(FilenameResolver::new());
    assert_eq!(
        matcher.find_existing(&dir, "https://host.test/files/movie.rar"),
        Some("movie (1).rar".to_string())
    );
    assert_eq!(matcher.find_existing(&dir, "https://host.test/files/other.zip"), None);
}

#[test]
fn file_written_after_snapshot_is_reported_finished() {
    let tmp = tempfile::tempdir().expect("tmpdir");
    let dir = LocalDirectory::ensure(tmp.path()).expect("open dir");
    fs::write(dir.root().join("old.zip"), b"old").expect("seed");

    let snapshot = DirectorySnapshot::capture(&dir).expect("snapshot");
    fs::write(dir.root().join("fresh.7z"), vec![0u8; 2048]).expect("download");

    let clock = ManualClock::new();
    let outcome = quick_watcher().wait(&dir, &clock, &snapshot, None, &CancelFlag::new());
    assert_eq!(outcome, Completion::Finished("fresh.7z".to_string()));
}

#[test]
fn lingering_partial_file_times_out() {
    let tmp = tempfile::tempdir().expect("tmpdir");
    let dir = LocalDirectory::ensure(tmp.path()).expect("open dir");
    let snapshot = DirectorySnapshot::capture(&dir).expect("snapshot");
    fs::write(dir.root().join("big.iso.crdownload"), b"partial").expect("partial");

    let clock = ManualClock::new();
    let outcome = quick_watcher().wait(&dir, &clock, &snapshot, None, &CancelFlag::new());
    assert_eq!(outcome, Completion::TimedOut);
    assert!(clock.elapsed() >= Duration::from_secs(10));
}
