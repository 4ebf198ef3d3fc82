use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context as _;

/// Extensions that mark a download as still in progress.
pub const TEMP_SUFFIXES: &[&str] = &[".crdownload", ".part", ".tmp"];

/// True when `name` ends with one of [`TEMP_SUFFIXES`] (case-insensitive).
pub fn is_temp_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    TEMP_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
}

/// Read-only view of the download directory.
///
/// The engine only lists entries and samples sizes; all writes come from the
/// external retrieval mechanism.
pub trait DirectoryView {
    fn root(&self) -> &Path;

    fn list(&self) -> io::Result<BTreeSet<String>>;

    fn size(&self, name: &str) -> io::Result<u64>;

    fn exists(&self, name: &str) -> bool;
}

#[derive(Clone, Debug)]
pub struct LocalDirectory {
    root: PathBuf,
}

impl LocalDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create `path` if absent and return a view rooted at its absolute form.
    pub fn ensure(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        fs::create_dir_all(path)
            .with_context(|| format!("creating download directory {}", path.display()))?;
        let root = fs::canonicalize(path)
            .with_context(|| format!("resolving download directory {}", path.display()))?;
        Ok(Self { root })
    }
}

impl DirectoryView for LocalDirectory {
    fn root(&self) -> &Path {
        &self.root
    }

    fn list(&self) -> io::Result<BTreeSet<String>> {
        let mut names = BTreeSet::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            names.insert(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    fn size(&self, name: &str) -> io::Result<u64> {
        Ok(fs::metadata(self.root.join(name))?.len())
    }

    fn exists(&self, name: &str) -> bool {
        self.root.join(name).exists()
    }
}

/// Directory listing frozen at one instant.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirectorySnapshot {
    entries: BTreeSet<String>,
}

impl DirectorySnapshot {
    pub fn capture(view: &dyn DirectoryView) -> io::Result<Self> {
        Ok(Self {
            entries: view.list()?,
        })
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries of `current` that were not present when the snapshot was taken.
    pub fn new_entries<'a>(&self, current: &'a BTreeSet<String>) -> Vec<&'a String> {
        current
            .iter()
            .filter(|name| !self.entries.contains(*name))
            .collect()
    }
}
