use std::collections::HashSet;
use std::fs;
use std::path::Path;

use tracing::{info, warn};

/// Substrings that suggest an address leads to a download page.
pub const RELEVANCE_HINTS: &[&str] = &["download", "dl", "fitgirl", "torrent", "drive"];

/// Merges address sources into one ordered, duplicate-free sequence.
#[derive(Clone, Debug, Default)]
pub struct LinkCollector {
    addresses: Vec<String>,
}

impl LinkCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend<I, S>(&mut self, source: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.addresses.extend(
            source
                .into_iter()
                .map(|addr| {
                    let addr: String = addr.into();
                    addr.trim().to_string()
                })
                .filter(|addr| !addr.is_empty()),
        );
        self
    }

    /// Deduplicated addresses in first-seen order, optionally narrowed to the
    /// ones containing a relevance hint. The filter is dropped when it would
    /// remove every address.
    pub fn collect(&self, filter_relevant: bool) -> Vec<String> {
        let mut seen = HashSet::new();
        let unique: Vec<String> = self
            .addresses
            .iter()
            .filter(|addr| seen.insert(*addr))
            .cloned()
            .collect();

        if !filter_relevant {
            return unique;
        }
        let filtered: Vec<String> = unique
            .iter()
            .filter(|addr| is_relevant(addr))
            .cloned()
            .collect();
        if filtered.is_empty() {
            if !unique.is_empty() {
                warn!(target: "autofetch::links", total = unique.len(), "relevance filter matched nothing; keeping all addresses");
            }
            unique
        } else {
            filtered
        }
    }
}

pub fn is_relevant(address: &str) -> bool {
    let lower = address.to_lowercase();
    RELEVANCE_HINTS.iter().any(|hint| lower.contains(hint))
}

/// Addresses from a text file: one per line, blanks and `#` comments skipped.
/// A missing or unreadable file yields no addresses.
pub fn read_address_file(path: &Path) -> Vec<String> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            warn!(target: "autofetch::links", path = %path.display(), error = %err, "could not read address file");
            return Vec::new();
        }
    };
    let addresses: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect();
    info!(target: "autofetch::links", path = %path.display(), count = addresses.len(), "loaded addresses");
    addresses
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_are_removed_in_first_seen_order() {
        let mut collector = LinkCollector::new();
        collector.extend(["a", "b", "a", "c"]);
        assert_eq!(collector.collect(false), vec!["a", "b", "c"]);
    }

    #[test]
    fn sources_are_merged_in_order() {
        let mut collector = LinkCollector::new();
        collector
            .extend(vec!["https://x.test/1".to_string()])
            .extend(["  https://x.test/2 ", "", "https://x.test/1"]);
        assert_eq!(
            collector.collect(false),
            vec!["https://x.test/1", "https://x.test/2"]
        );
    }

    #[test]
    fn relevance_filter_keeps_hinted_addresses() {
        let mut collector = LinkCollector::new();
        collector.extend([
            "https://x.test/about",
            "https://x.test/Download/1",
            "https://drive.test/f/2",
        ]);
        assert_eq!(
            collector.collect(true),
            vec!["https://x.test/Download/1", "https://drive.test/f/2"]
        );
    }

    #[test]
    fn relevance_filter_fails_open() {
        let mut collector = LinkCollector::new();
        collector.extend(["https://x.test/about", "https://x.test/contact"]);
        assert_eq!(
            collector.collect(true),
            vec!["https://x.test/about", "https://x.test/contact"]
        );
        assert!(LinkCollector::new().collect(true).is_empty());
    }

    #[test]
    fn address_file_skips_comments_and_blanks() {
        let tmp = tempfile::tempdir().expect("tmpdir");
        let path = tmp.path().join("urls.txt");
        fs::write(&path, "# mirrors\nhttps://x.test/a.rar\n\n   https://x.test/b.rar  \n#skip\n")
            .expect("write list");
        assert_eq!(
            read_address_file(&path),
            vec!["https://x.test/a.rar", "https://x.test/b.rar"]
        );
        assert!(read_address_file(&tmp.path().join("missing.txt")).is_empty());
    }
}
