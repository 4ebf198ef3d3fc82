use std::time::Duration;

use autofetch_core::{Clock, SystemClock};
use autofetch_session::{InteractionProvider, ProviderError, SessionHandle, TriggerReport};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::chrome::{overlay_cleaner_source, ChromeOptions, OVERLAY_SELECTORS};
use crate::client::{element_arg, Locator, WireClient};
use crate::error::DriverError;

/// Candidate download triggers, tried in order on every poll round.
pub const TRIGGER_SELECTORS: &[(Locator, &str)] = &[
    (Locator::Css, "button.gay-button"),
    (Locator::Css, "button.link-button"),
    (Locator::Css, "button[class*='gay-button']"),
    (
        Locator::XPath,
        "//button[contains(@class, 'gay-button') or contains(., 'DOWNLOAD') or contains(., 'Download') or contains(., 'download')]",
    ),
    (Locator::Css, "a[href][class*='download']"),
    (Locator::Css, "a[href*='download']"),
    (
        Locator::XPath,
        "//a[contains(translate(., 'ABCDEFGHIJKLMNOPQRSTUVWXYZ', 'abcdefghijklmnopqrstuvwxyz'),'download')]",
    ),
];

/// Containers whose anchors are preferred when scraping a listing page.
pub const CONTAINER_SELECTORS: &[&str] = &["article", ".post", ".entry", ".paste-body", ".content"];

const REMOVE_OVERLAYS_SCRIPT: &str = "arguments[0].forEach(function(sel) { \
     document.querySelectorAll(sel).forEach(function(el) { el.remove(); }); });";
const SCROLL_SCRIPT: &str = "arguments[0].scrollIntoView({block: 'center'});";
const CLICK_SCRIPT: &str = "arguments[0].click();";
const CONTAINER_LINKS_SCRIPT: &str = "var out = []; \
     document.querySelectorAll(arguments[0]).forEach(function(c) { \
       c.querySelectorAll('a[href]').forEach(function(a) { out.push(a.href); }); }); \
     return out;";
const ALL_LINKS_SCRIPT: &str =
    "return Array.prototype.map.call(document.querySelectorAll('a[href]'), function(a) { return a.href; });";

#[derive(Clone, Debug)]
pub struct WebDriverConfig {
    pub endpoint: String,
    pub chrome: ChromeOptions,
    /// Upper bound for waiting on page elements.
    pub max_wait: Duration,
    pub element_poll: Duration,
    /// Pause after navigation before touching the page.
    pub page_settle: Duration,
    pub click_settle: Duration,
    pub request_timeout: Duration,
}

impl WebDriverConfig {
    pub fn new(endpoint: impl Into<String>, chrome: ChromeOptions) -> Self {
        Self {
            endpoint: endpoint.into(),
            chrome,
            max_wait: Duration::from_secs(20),
            element_poll: Duration::from_millis(500),
            page_settle: Duration::from_secs(1),
            click_settle: Duration::from_millis(500),
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Drives a Chrome session through a WebDriver endpoint such as chromedriver.
pub struct WebDriverProvider {
    client: WireClient,
    config: WebDriverConfig,
    clock: Box<dyn Clock>,
}

impl WebDriverProvider {
    pub fn new(config: WebDriverConfig) -> Result<Self, ProviderError> {
        let client = WireClient::new(&config.endpoint, config.request_timeout)
            .map_err(|err| ProviderError::Establish(err.to_string()))?;
        Ok(Self {
            client,
            config,
            clock: Box::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn config(&self) -> &WebDriverConfig {
        &self.config
    }

    /// Collect absolute links from a listing page: anchors inside the first
    /// container selector that yields any, otherwise every anchor on the page.
    pub fn scrape_links(
        &mut self,
        handle: &SessionHandle,
        page_url: &str,
    ) -> Result<Vec<String>, ProviderError> {
        let session = handle.id.as_str();
        info!(target: "autofetch::webdriver", url = page_url, "opening listing page");
        self.client
            .navigate(session, page_url)
            .map_err(|err| err.into_provider("open listing page"))?;
        if self.wait_for(session, Locator::Css, "body")?.is_none() {
            warn!(target: "autofetch::webdriver", url = page_url, "listing page has no body");
            return Ok(Vec::new());
        }
        self.clock.sleep(self.config.page_settle);

        let mut hrefs = Vec::new();
        for selector in CONTAINER_SELECTORS {
            match self
                .client
                .execute(session, CONTAINER_LINKS_SCRIPT, vec![json!(selector)])
            {
                Ok(value) => hrefs = strings(value),
                Err(err) if err.is_session_dead() => {
                    return Err(err.into_provider("scrape listing page"))
                }
                Err(err) => {
                    debug!(target: "autofetch::webdriver", selector, error = %err, "container scan failed");
                    continue;
                }
            }
            if !hrefs.is_empty() {
                debug!(target: "autofetch::webdriver", selector, count = hrefs.len(), "links found in containers");
                break;
            }
        }
        if hrefs.is_empty() {
            hrefs = self
                .client
                .execute(session, ALL_LINKS_SCRIPT, Vec::new())
                .map(strings)
                .map_err(|err| err.into_provider("scrape listing page"))?;
        }

        let mut links: Vec<String> = Vec::new();
        for href in hrefs {
            if href.starts_with("http") && !links.contains(&href) {
                links.push(href);
            }
        }
        info!(target: "autofetch::webdriver", count = links.len(), "scraped listing page");
        Ok(links)
    }

    /// Poll `selector` until it matches or `max_wait` passes.
    fn wait_for(
        &self,
        session: &str,
        locator: Locator,
        selector: &str,
    ) -> Result<Option<String>, ProviderError> {
        let deadline = self.clock.deadline(self.config.max_wait);
        loop {
            match self.client.find_elements(session, locator, selector) {
                Ok(found) => {
                    if let Some(first) = found.into_iter().next() {
                        return Ok(Some(first));
                    }
                }
                Err(err) if err.is_session_dead() => return Err(err.into_provider("find element")),
                Err(err) => {
                    debug!(target: "autofetch::webdriver", selector, error = %err, "element lookup failed");
                }
            }
            if self.clock.reached(deadline) {
                return Ok(None);
            }
            self.clock.sleep(self.config.element_poll);
        }
    }

    /// First visible trigger, scanning every selector each round.
    fn find_trigger(&self, session: &str) -> Result<Option<String>, ProviderError> {
        let deadline = self.clock.deadline(self.config.max_wait);
        loop {
            for (locator, selector) in TRIGGER_SELECTORS {
                let candidates = match self.client.find_elements(session, *locator, selector) {
                    Ok(found) => found,
                    Err(err) if err.is_session_dead() => {
                        return Err(err.into_provider("find trigger"))
                    }
                    Err(_) => continue,
                };
                for element in candidates {
                    match self.client.is_displayed(session, &element) {
                        Ok(true) => {
                            debug!(target: "autofetch::webdriver", selector, "trigger located");
                            return Ok(Some(element));
                        }
                        Ok(false) => {}
                        Err(err) if err.is_session_dead() => {
                            return Err(err.into_provider("inspect trigger"))
                        }
                        Err(_) => {}
                    }
                }
            }
            if self.clock.reached(deadline) {
                return Ok(None);
            }
            self.clock.sleep(self.config.element_poll);
        }
    }

    /// Only a dead session is reported; other script failures are ignored.
    fn remove_overlays(&self, session: &str) -> Result<(), ProviderError> {
        match self
            .client
            .execute(session, REMOVE_OVERLAYS_SCRIPT, vec![json!(OVERLAY_SELECTORS)])
        {
            Ok(_) => Ok(()),
            Err(err) if err.is_session_dead() => Err(err.into_provider("remove overlays")),
            Err(err) => {
                debug!(target: "autofetch::webdriver", error = %err, "overlay removal failed");
                Ok(())
            }
        }
    }

    /// Script click first, native element click as the fallback.
    fn click(&self, session: &str, element: &str) -> Result<(), DriverError> {
        let scripted = self
            .client
            .execute(session, SCROLL_SCRIPT, vec![element_arg(element)])
            .and_then(|_| {
                self.clock.sleep(self.config.click_settle);
                self.client
                    .execute(session, CLICK_SCRIPT, vec![element_arg(element)])
            });
        match scripted {
            Ok(_) => Ok(()),
            Err(err) if err.is_session_dead() => Err(err),
            Err(err) => {
                debug!(target: "autofetch::webdriver", error = %err, "script click failed; using native click");
                self.client.click(session, element)
            }
        }
    }
}

impl InteractionProvider for WebDriverProvider {
    fn id(&self) -> &'static str {
        "webdriver"
    }

    fn establish(&mut self) -> Result<SessionHandle, ProviderError> {
        let caps = self.config.chrome.capabilities();
        let session = self
            .client
            .new_session(&caps)
            .map_err(|err| ProviderError::Establish(format!("{}: {err}", self.client.endpoint())))?;
        // best effort; non-Chromium drivers reject the passthrough
        if let Err(err) = self.client.cdp(
            &session,
            "Page.addScriptToEvaluateOnNewDocument",
            json!({ "source": overlay_cleaner_source() }),
        ) {
            debug!(target: "autofetch::webdriver", error = %err, "overlay cleaner not installed");
        }
        info!(target: "autofetch::webdriver", session = %session, headless = self.config.chrome.headless, "browser session started");
        Ok(SessionHandle::new(session))
    }

    fn probe(&mut self, handle: &SessionHandle) -> bool {
        match self.client.current_url(&handle.id) {
            Ok(_) => true,
            Err(err) => {
                debug!(target: "autofetch::webdriver", session = %handle.id, error = %err, "liveness probe failed");
                false
            }
        }
    }

    fn open_and_trigger(
        &mut self,
        handle: &SessionHandle,
        address: &str,
    ) -> Result<TriggerReport, ProviderError> {
        let session = handle.id.as_str();
        if let Err(err) = self.client.navigate(session, address) {
            if err.is_session_dead() {
                return Ok(TriggerReport::session_lost());
            }
            return Err(ProviderError::NoTriggerFound(format!("navigation failed: {err}")));
        }
        self.clock.sleep(self.config.page_settle);

        if self.remove_overlays(session).is_err() {
            return Ok(TriggerReport::session_lost());
        }

        let trigger = match self.find_trigger(session) {
            Ok(Some(element)) => element,
            Ok(None) => {
                warn!(target: "autofetch::webdriver", address, "no download trigger on page");
                return Ok(TriggerReport::not_found());
            }
            Err(err) => return Err(err),
        };

        match self.click(session, &trigger) {
            Ok(()) => Ok(TriggerReport::triggered()),
            Err(err) if err.is_session_dead() => Ok(TriggerReport::session_lost()),
            Err(err) => Err(ProviderError::NoTriggerFound(format!("click failed: {err}"))),
        }
    }

    fn dispose(&mut self, handle: SessionHandle) -> Result<(), ProviderError> {
        self.client
            .delete_session(&handle.id)
            .map_err(|err| err.into_provider("close session"))?;
        debug!(target: "autofetch::webdriver", session = %handle.id, "browser session closed");
        Ok(())
    }
}

fn strings(value: Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}
