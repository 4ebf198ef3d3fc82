use std::path::PathBuf;

use serde_json::{json, Value};

/// Overlay and ad selectors removed before looking for the trigger.
pub const OVERLAY_SELECTORS: &[&str] = &[
    "div[style*='z-index'][style*='fixed']",
    "div[style*=\"z-index: 2147483647\"]",
    "div[style*=\"position: fixed\"][style*=\"cursor: pointer\"]",
    "iframe[src*=\"ad\"]",
    ".ad-overlay",
    "#ad-overlay",
];

/// Browser launch settings sent with the new-session request.
#[derive(Clone, Debug, PartialEq)]
pub struct ChromeOptions {
    pub download_dir: PathBuf,
    pub headless: bool,
    pub block_images: bool,
}

impl ChromeOptions {
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            headless: false,
            block_images: true,
        }
    }

    pub fn args(&self) -> Vec<&'static str> {
        let mut args = Vec::with_capacity(7);
        if self.headless {
            args.push("--headless=new");
        }
        args.extend([
            "--no-sandbox",
            "--disable-dev-shm-usage",
            "--disable-gpu",
            "--window-size=1920,1080",
            "--disable-blink-features=AutomationControlled",
            "--disable-extensions",
        ]);
        args
    }

    pub fn prefs(&self) -> Value {
        let mut prefs = json!({
            "download.default_directory": self.download_dir.to_string_lossy(),
            "download.prompt_for_download": false,
            "download.directory_upgrade": true,
            "profile.default_content_setting_values.notifications": 2,
            "profile.default_content_settings.popups": 0,
            "profile.content_settings.exceptions.automatic_downloads.*.setting": 1,
        });
        if self.block_images {
            prefs["profile.managed_default_content_settings.images"] = json!(2);
        }
        prefs
    }

    /// Body of `POST /session`.
    pub fn capabilities(&self) -> Value {
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": {
                        "args": self.args(),
                        "prefs": self.prefs(),
                        "excludeSwitches": ["enable-logging"],
                    }
                }
            }
        })
    }
}

/// Script installed on every new document that keeps removing overlays.
pub fn overlay_cleaner_source() -> String {
    let selectors = serde_json::to_string(OVERLAY_SELECTORS).unwrap_or_else(|_| "[]".into());
    format!(
        "window.__autofetchOverlayTimer = setInterval(function() {{ \
           try {{ {selectors}.forEach(function(sel) {{ \
             document.querySelectorAll(sel).forEach(function(el) {{ el.remove(); }}); \
           }}); }} catch (e) {{}} \
         }}, 1000);"
    )
}
