use std::time::Duration;

use anyhow::Context as _;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_DISPOSITION;

use crate::filename::percent_decode;

/// Network lookup used as the last filename-resolution step.
pub trait NameProbe {
    /// Return the raw `Content-Disposition` value advertised for `address`.
    fn content_disposition(&self, address: &str) -> anyhow::Result<Option<String>>;
}

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Metadata-only `HEAD` request, following redirects.
pub struct HttpHeadProbe {
    client: Client,
}

impl HttpHeadProbe {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("building HEAD probe client")?;
        Ok(Self { client })
    }
}

impl NameProbe for HttpHeadProbe {
    fn content_disposition(&self, address: &str) -> anyhow::Result<Option<String>> {
        let resp = self
            .client
            .head(address)
            .send()
            .with_context(|| format!("HEAD {address}"))?;
        Ok(resp
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string))
    }
}

static EXTENDED_FILENAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)filename\*\s*=\s*([^;]+)").expect("extended filename regex"));
static PLAIN_FILENAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)filename\s*=\s*"?([^";]+)"?"#).expect("plain filename regex"));

/// Extract a filename hint from a `Content-Disposition` header value.
///
/// The RFC 5987 form (`filename*=UTF-8''%e2%82%ac%20rates.pdf`) wins over the
/// quoted form (`filename="rates.pdf"`). Names without a `.` are rejected.
pub fn parse_content_disposition(header: &str) -> Option<String> {
    if let Some(caps) = EXTENDED_FILENAME.captures(header) {
        let raw = caps[1].trim().trim_matches(|c| c == '"' || c == '\'');
        let encoded = match raw.split_once("''") {
            Some((_charset, rest)) => rest,
            None => raw,
        };
        let name = percent_decode(encoded);
        let name = name.trim();
        if name.contains('.') {
            return Some(name.to_string());
        }
    }

    let caps = PLAIN_FILENAME.captures(header)?;
    let raw = caps[1].trim().trim_matches(|c| c == '"' || c == '\'');
    let name = percent_decode(raw);
    let name = name.trim();
    name.contains('.').then(|| name.to_string())
}
