use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use autofetch_core::probe::DEFAULT_PROBE_TIMEOUT;
use autofetch_core::{
    config_schema_json, load_config, read_address_file, Abort, CancelFlag, DirectoryView,
    ExistingFileMatcher, FetchConfig, FilenameResolver, HttpHeadProbe, LinkCollector,
    LocalDirectory, OrchestrationLoop, SystemClock,
};
use autofetch_session::InteractionProvider;
use autofetch_webdriver::{ChromeOptions, WebDriverConfig, WebDriverProvider};
use clap::Parser;
use tracing::{info, warn};

mod interrupt;
mod summary;

#[derive(Parser, Debug)]
#[command(
    name = "autofetch",
    version,
    about = "Open download pages in a browser, trigger each download and wait for it to finish"
)]
struct Cli {
    /// Directory downloads are saved to
    #[arg(long)]
    output: Option<PathBuf>,
    /// Listing page to scrape for download-page links
    #[arg(long)]
    url: Option<String>,
    /// Text file with one address per line
    #[arg(long)]
    input_txt: Option<PathBuf>,
    /// TOML file with default settings
    #[arg(long)]
    config: Option<PathBuf>,
    /// Run the browser without a window
    #[arg(long)]
    headless: bool,
    /// Load images (some sites need them to render the download button)
    #[arg(long)]
    no_image_block: bool,
    /// Max wait for page elements (seconds)
    #[arg(long)]
    max_wait: Option<u64>,
    /// Max wait for a download to finish (seconds)
    #[arg(long)]
    download_timeout: Option<u64>,
    /// Restart the browser after this many successful downloads (0 never)
    #[arg(long)]
    session_refresh: Option<u32>,
    /// Pause between addresses (seconds)
    #[arg(long)]
    delay_between: Option<f64>,
    /// Keep only scraped links that look like download pages
    #[arg(long)]
    filter_downloads: bool,
    /// Never send HEAD requests to learn filenames
    #[arg(long)]
    no_head_probe: bool,
    /// WebDriver endpoint (chromedriver)
    #[arg(long)]
    webdriver_url: Option<String>,
    /// Print the JSON schema of the config file and exit
    #[arg(long)]
    print_config_schema: bool,
}

impl Cli {
    /// Settings given on the command line; unset flags stay `None` so lower
    /// layers can fill them.
    fn overrides(&self) -> FetchConfig {
        FetchConfig {
            output_dir: self.output.clone(),
            input_txt: self.input_txt.clone(),
            url: self.url.clone(),
            max_wait_secs: self.max_wait,
            download_timeout_secs: self.download_timeout,
            session_refresh: self.session_refresh,
            delay_between_secs: self.delay_between,
            filter_downloads: self.filter_downloads.then_some(true),
            headless: self.headless.then_some(true),
            block_images: self.no_image_block.then_some(false),
            probe_headers: self.no_head_probe.then_some(false),
            webdriver_url: self.webdriver_url.clone(),
            ..FetchConfig::default()
        }
    }
}

fn main() -> ExitCode {
    autofetch_otel::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    if cli.print_config_schema {
        let schema = config_schema_json();
        println!(
            "{}",
            serde_json::to_string_pretty(&schema).unwrap_or_else(|_| schema.to_string())
        );
        return Ok(ExitCode::SUCCESS);
    }

    let file_cfg = match &cli.config {
        Some(path) => load_config(path)?,
        None => FetchConfig::default(),
    };
    let cfg = cli.overrides().or(FetchConfig::from_env()).or(file_cfg);

    let loop_config = cfg.loop_config()?;
    let Some(output) = cfg.output_dir.clone() else {
        bail!("an output directory is required (--output or output_dir in the config file)");
    };
    if cfg.url.is_none() && cfg.input_txt.is_none() {
        bail!("nothing to do: pass --url and/or --input-txt");
    }
    let download_dir = LocalDirectory::ensure(&output)?;
    let download_root = download_dir.root().to_path_buf();
    info!(target: "autofetch::cli", dir = %download_root.display(), "download directory ready");

    let resolver = if cfg.probe_headers() {
        FilenameResolver::with_probe(HttpHeadProbe::new(DEFAULT_PROBE_TIMEOUT)?)
    } else {
        FilenameResolver::new()
    };
    let matcher =
        ExistingFileMatcher::new(resolver).with_substring_fallback(cfg.substring_fallback());

    let mut chrome = ChromeOptions::new(download_root.clone());
    chrome.headless = cfg.headless();
    chrome.block_images = cfg.block_images();
    let mut driver_cfg = WebDriverConfig::new(cfg.webdriver_url(), chrome);
    driver_cfg.max_wait = cfg.max_wait();
    let mut provider = WebDriverProvider::new(driver_cfg)
        .with_context(|| format!("preparing WebDriver client for {}", cfg.webdriver_url()))?;

    let mut collector = LinkCollector::new();
    if let Some(path) = &cfg.input_txt {
        collector.extend(read_address_file(path));
    }
    if let Some(listing) = &cfg.url {
        collector.extend(scrape(&mut provider, listing)?);
    }
    let addresses = collector.collect(cfg.filter_downloads());
    if addresses.is_empty() {
        bail!("no addresses to process");
    }
    println!("{} address(es) to process", addresses.len());

    let cancel = CancelFlag::new();
    if let Err(err) = interrupt::install(cancel.clone()) {
        warn!(target: "autofetch::cli", error = %err, "Ctrl-C handling unavailable");
    }

    let clock = SystemClock;
    let mut run_loop = OrchestrationLoop::new(
        loop_config,
        &download_dir,
        &clock,
        &matcher,
        cancel,
    );
    let report = run_loop.run(&addresses, &mut provider, &mut |item| {
        println!("{}", summary::item_line(item));
    });

    println!();
    println!("{}", summary::render(&report, &download_root));

    Ok(match report.aborted {
        Some(Abort::SessionEstablish(_)) => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    })
}

/// Links from the listing page, using a short-lived browser session.
fn scrape(provider: &mut WebDriverProvider, listing: &str) -> Result<Vec<String>> {
    let handle = provider
        .establish()
        .context("starting a browser session for the listing page")?;
    let links = provider.scrape_links(&handle, listing);
    if let Err(err) = provider.dispose(handle) {
        warn!(target: "autofetch::cli", error = %err, "closing listing session failed");
    }
    let links = links.with_context(|| format!("scraping {listing}"))?;
    println!("found {} link(s) on {listing}", links.len());
    Ok(links)
}
