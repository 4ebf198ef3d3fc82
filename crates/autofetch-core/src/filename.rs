//! Filename inference from an address.
//!
//! Resolution walks [`RESOLVE_ORDER`] and stops at the first step that yields a
//! name containing a `.`. Every step is fallible but none of them raises past
//! the resolver: a failed step simply falls through to the next one.

use once_cell::sync::Lazy;
use tracing::{debug, trace};
use url::Url;

use crate::probe::{parse_content_disposition, NameProbe};

/// Query keys that commonly carry the served filename, in priority order.
pub const QUERY_NAME_KEYS: &[&str] = &[
    "file",
    "filename",
    "name",
    "attachment",
    "download",
    "title",
];

static RELATIVE_BASE: Lazy<Url> =
    Lazy::new(|| Url::parse("http://relative.invalid/").expect("relative base url"));

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolveStep {
    PathSegment,
    QueryParameter,
    Fragment,
    HeaderProbe,
}

pub const RESOLVE_ORDER: [ResolveStep; 4] = [
    ResolveStep::PathSegment,
    ResolveStep::QueryParameter,
    ResolveStep::Fragment,
    ResolveStep::HeaderProbe,
];

/// A filename (stem + extension) inferred from an address.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResolvedName(String);

impl ResolvedName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn stem(&self) -> &str {
        split_extension(&self.0).0
    }

    /// Extension including its leading dot, or `""` when there is none.
    pub fn extension(&self) -> &str {
        split_extension(&self.0).1
    }
}

impl std::fmt::Display for ResolvedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    Resolved(ResolvedName),
    Unresolved,
}

impl Resolution {
    pub fn name(&self) -> Option<&ResolvedName> {
        match self {
            Resolution::Resolved(name) => Some(name),
            Resolution::Unresolved => None,
        }
    }

    pub fn into_name(self) -> Option<ResolvedName> {
        match self {
            Resolution::Resolved(name) => Some(name),
            Resolution::Unresolved => None,
        }
    }
}

#[derive(Default)]
pub struct FilenameResolver {
    probe: Option<Box<dyn NameProbe>>,
}

impl FilenameResolver {
    /// Resolver using only the address text (no network probe).
    pub fn new() -> Self {
        Self { probe: None }
    }

    pub fn with_probe(probe: impl NameProbe + 'static) -> Self {
        Self {
            probe: Some(Box::new(probe)),
        }
    }

    pub fn has_probe(&self) -> bool {
        self.probe.is_some()
    }

    pub fn resolve(&self, address: &str) -> Resolution {
        let address = address.trim();
        if address.is_empty() {
            return Resolution::Unresolved;
        }
        let parsed = Url::parse(address)
            .or_else(|_| RELATIVE_BASE.join(address))
            .ok();

        for step in RESOLVE_ORDER {
            if let Some(name) = self.attempt(step, address, parsed.as_ref()) {
                trace!(target: "autofetch::filename", ?step, %name, "resolved filename");
                return Resolution::Resolved(ResolvedName(name));
            }
        }
        Resolution::Unresolved
    }

    fn attempt(&self, step: ResolveStep, address: &str, parsed: Option<&Url>) -> Option<String> {
        match step {
            ResolveStep::PathSegment => parsed.and_then(from_path_segment),
            ResolveStep::QueryParameter => parsed.and_then(from_query),
            ResolveStep::Fragment => parsed.and_then(from_fragment),
            ResolveStep::HeaderProbe => {
                let probe = self.probe.as_ref()?;
                match probe.content_disposition(address) {
                    Ok(Some(header)) => parse_content_disposition(&header),
                    Ok(None) => None,
                    Err(err) => {
                        debug!(target: "autofetch::filename", address, error = %err, "header probe failed");
                        None
                    }
                }
            }
        }
    }
}

fn from_path_segment(url: &Url) -> Option<String> {
    let last = url.path().rsplit('/').next().unwrap_or_default();
    if last.is_empty() {
        return None;
    }
    let decoded = percent_decode(last);
    let candidate = decoded
        .split(['#', '?'])
        .next()
        .unwrap_or_default()
        .trim();
    let accepted = !candidate.is_empty()
        && candidate.contains('.')
        && !candidate.ends_with(['/', '\\']);
    accepted.then(|| candidate.to_string())
}

fn from_query(url: &Url) -> Option<String> {
    QUERY_NAME_KEYS.iter().find_map(|key| {
        let value = url
            .query_pairs()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.trim().to_string())
            .find(|v| !v.is_empty())?;
        value.contains('.').then_some(value)
    })
}

fn from_fragment(url: &Url) -> Option<String> {
    let fragment = url.fragment()?;
    if !fragment.contains('.') {
        return None;
    }
    let last = fragment.rsplit('/').next().unwrap_or_default();
    let decoded = percent_decode(last);
    let candidate = decoded.trim();
    candidate.contains('.').then(|| candidate.to_string())
}

pub(crate) fn percent_decode(raw: &str) -> String {
    String::from_utf8_lossy(&urlencoding::decode_binary(raw.as_bytes())).into_owned()
}

/// Split like a classic `splitext`: the extension starts at the last dot of
/// the final path component, unless that component is all leading dots.
fn split_extension(name: &str) -> (&str, &str) {
    let component_start = name.rfind(['/', '\\']).map(|idx| idx + 1).unwrap_or(0);
    match name.rfind('.') {
        Some(idx) if idx > component_start && name[component_start..idx].chars().any(|c| c != '.') => {
            (&name[..idx], &name[idx..])
        }
        _ => (name, ""),
    }
}
