use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use tracing::{debug, warn};

use crate::filename::{FilenameResolver, ResolvedName};
use crate::fsview::{DirectoryView, TEMP_SUFFIXES};

static TRAILING_DUPLICATE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\(\d+\)$").expect("duplicate marker regex"));

/// Decides whether a file already present in the download directory (complete
/// or in progress) represents an address.
///
/// Matching runs in two tiers. The strict tier accepts the resolved stem, an
/// optional `" (N)"` duplicate marker, the original extension and an optional
/// temp suffix. The substring tier, used only when the strict tier finds
/// nothing, accepts any entry with the same extension whose cleaned stem
/// contains the resolved stem. The substring tier can produce false positives
/// for short stems (`game.rar` vs `gameplay.rar`); that trade-off favours
/// skipping over re-downloading.
pub struct ExistingFileMatcher {
    resolver: FilenameResolver,
    substring_fallback: bool,
}

impl ExistingFileMatcher {
    pub fn new(resolver: FilenameResolver) -> Self {
        Self {
            resolver,
            substring_fallback: true,
        }
    }

    pub fn with_substring_fallback(mut self, enabled: bool) -> Self {
        self.substring_fallback = enabled;
        self
    }

    pub fn resolver(&self) -> &FilenameResolver {
        &self.resolver
    }

    /// Name of the entry representing `address`, if any.
    pub fn find_existing(&self, view: &dyn DirectoryView, address: &str) -> Option<String> {
        let resolved = self.resolver.resolve(address).into_name()?;
        self.find_existing_named(view, &resolved)
    }

    /// Like [`find_existing`](Self::find_existing) for a name resolved earlier.
    pub fn find_existing_named(
        &self,
        view: &dyn DirectoryView,
        resolved: &ResolvedName,
    ) -> Option<String> {
        let entries = match view.list() {
            Ok(entries) => entries,
            Err(err) => {
                warn!(target: "autofetch::matcher", dir = %view.root().display(), error = %err, "listing download directory failed");
                return None;
            }
        };
        let found = self.match_entries(resolved, entries.iter().map(String::as_str));
        if let Some(name) = &found {
            debug!(target: "autofetch::matcher", resolved = %resolved, existing = %name, "found existing file");
        }
        found
    }

    /// Apply both tiers to a set of directory entries.
    pub fn match_entries<'a, I>(&self, resolved: &ResolvedName, entries: I) -> Option<String>
    where
        I: IntoIterator<Item = &'a str>,
        I::IntoIter: Clone,
    {
        let ext = resolved.extension();
        if ext.is_empty() {
            return None;
        }
        let entries = entries.into_iter();
        let pattern = strict_pattern(resolved)?;
        if let Some(hit) = entries.clone().find(|name| pattern.is_match(name)) {
            return Some(hit.to_string());
        }
        if !self.substring_fallback {
            return None;
        }
        let stem = resolved.stem().to_lowercase();
        entries
            .into_iter()
            .find(|name| substring_match(name, &stem, ext))
            .map(str::to_string)
    }
}

/// Case-insensitive pattern for the strict tier; `None` when the name has no
/// extension.
pub fn strict_pattern(resolved: &ResolvedName) -> Option<Regex> {
    let ext = resolved.extension();
    if ext.is_empty() {
        return None;
    }
    let temp = TEMP_SUFFIXES
        .iter()
        .map(|suffix| regex::escape(suffix))
        .collect::<Vec<_>>()
        .join("|");
    let source = format!(
        r"^{}(?:\s*\(\d+\))?{}(?:{})?$",
        regex::escape(resolved.stem()),
        regex::escape(ext),
        temp
    );
    RegexBuilder::new(&source).case_insensitive(true).build().ok()
}

fn substring_match(name: &str, stem: &str, ext: &str) -> bool {
    let lower = name.to_lowercase();
    let ext = ext.to_lowercase();
    let endings = std::iter::once(ext.clone())
        .chain(TEMP_SUFFIXES.iter().map(|suffix| format!("{ext}{suffix}")));
    for ending in endings {
        if let Some(head) = lower.strip_suffix(ending.as_str()) {
            let cleaned = TRAILING_DUPLICATE_MARKER.replace(head, "");
            if cleaned.trim().contains(stem) {
                return true;
            }
        }
    }
    false
}
