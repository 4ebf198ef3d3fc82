//! Download orchestration: decide whether an address is already on disk,
//! drive an interaction session to start its download, and wait until the
//! file has settled in the output directory.

pub mod cancel;
pub mod clock;
mod config;
pub use config::{
    config_schema_json, load_config, parse_config, ConfigError, FetchConfig,
    DEFAULT_WEBDRIVER_URL,
};
pub mod error;
pub mod filename;
pub mod fsview;
pub mod links;
pub mod matcher;
pub mod orchestrator;
pub mod probe;
pub mod session;
pub mod util;
pub mod watcher;

#[cfg(test)]
mod test_support;

pub use cancel::CancelFlag;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::FetchError;
pub use filename::{FilenameResolver, Resolution, ResolvedName};
pub use fsview::{DirectorySnapshot, DirectoryView, LocalDirectory};
pub use links::{read_address_file, LinkCollector};
pub use matcher::ExistingFileMatcher;
pub use orchestrator::{
    Abort, ItemReport, LoopConfig, OrchestrationLoop, Outcome, RunReport, Tally,
};
pub use probe::{HttpHeadProbe, NameProbe};
pub use session::SessionLifecycleManager;
pub use watcher::{Completion, DownloadCompletionWatcher, WatcherConfig};
