use once_cell::sync::OnceCell;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{
    fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};

static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

const FILE_PREFIX: &str = "autofetch.log";

/// Install the global subscriber: console output filtered by `RUST_LOG`
/// (default `info`), plus a rolling run log under `AUTOFETCH_LOG_DIR` when
/// that variable is set. Calling it twice is harmless.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(fmt::layer().with_filter(filter));

    let Some(dir) = std::env::var("AUTOFETCH_LOG_DIR").ok().filter(|d| !d.trim().is_empty())
    else {
        let _ = registry.try_init();
        return;
    };

    if let Err(err) = std::fs::create_dir_all(&dir) {
        let _ = registry.try_init();
        tracing::warn!(directory = %dir, error = %err, "failed to create log directory; file logging disabled");
        return;
    }
    let rotation = parse_rotation(std::env::var("AUTOFETCH_LOG_ROTATION").ok().as_deref());
    let (writer, guard) =
        tracing_appender::non_blocking(RollingFileAppender::new(rotation, &dir, FILE_PREFIX));
    let _ = FILE_GUARD.set(guard);

    // the file keeps engine detail even when the console is quieter
    let targets = Targets::new().with_target("autofetch", tracing::Level::DEBUG);
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(targets);
    let _ = registry.with(file_layer).try_init();
}

/// `hourly`, `minutely` or `never`; anything else rotates daily.
pub fn parse_rotation(raw: Option<&str>) -> Rotation {
    match raw.map(|r| r.trim().to_ascii_lowercase()).as_deref() {
        Some("hourly") => Rotation::HOURLY,
        Some("minutely") => Rotation::MINUTELY,
        Some("never") => Rotation::NEVER,
        _ => Rotation::DAILY,
    }
}
