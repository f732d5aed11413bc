//! Filtered tree traversal
//!
//! [`TreeWalker`] yields files below a root whose relative paths already
//! passed the [`ExclusionRules`]. Excluded directories are pruned while
//! walking, so nothing below them is ever read or hashed. Entries that cannot
//! be compared (symlinks, unreadable directories) come out as
//! [`ScanWarning`]s instead of aborting the walk.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::{DirEntry, WalkDir};

use crate::{ExclusionRules, NormalizedPath};

/// Why an entry was skipped during a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Symbolic link, never followed
    Symlink,
    /// The OS denied access to the entry
    PermissionDenied,
    /// The entry could not be read for another reason
    Unreadable,
    /// Sockets, FIFOs, device nodes
    Unsupported,
    /// The tree root itself does not exist
    MissingRoot,
}

/// A non-fatal problem found while scanning a tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanWarning {
    /// Relative path of the entry, or the root when the root is affected
    pub path: String,
    pub kind: WarningKind,
    pub message: String,
}

impl ScanWarning {
    pub fn new(path: impl Into<String>, kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind,
            message: message.into(),
        }
    }
}

/// A regular file found by the walker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkFile {
    /// Forward-slash path relative to the walk root
    pub relative: String,
    /// Absolute path on disk
    pub path: PathBuf,
}

/// One item produced by [`TreeWalker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkItem {
    File(WalkFile),
    Warning(ScanWarning),
}

/// Iterator over the non-excluded files of a tree, in file-name order.
pub struct TreeWalker<'a> {
    root: PathBuf,
    inner: Box<dyn Iterator<Item = walkdir::Result<DirEntry>> + 'a>,
}

impl<'a> TreeWalker<'a> {
    /// Walk `root`, pruning everything `rules` excludes.
    ///
    /// Symlinks are reported, never followed.
    pub fn new(root: &Path, rules: &'a ExclusionRules) -> Self {
        let filter_root = root.to_path_buf();
        let inner = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .min_depth(1)
            .into_iter()
            .filter_entry(move |entry| {
                match NormalizedPath::relative_to(entry.path(), &filter_root) {
                    Some(rel) => !rules.is_excluded(&rel, entry.file_type().is_dir()),
                    None => true,
                }
            });

        Self {
            root: root.to_path_buf(),
            inner: Box::new(inner),
        }
    }

    /// Drain the walker into files and warnings.
    pub fn partition(self) -> (Vec<WalkFile>, Vec<ScanWarning>) {
        let mut files = Vec::new();
        let mut warnings = Vec::new();
        for item in self {
            match item {
                WalkItem::File(file) => files.push(file),
                WalkItem::Warning(warning) => warnings.push(warning),
            }
        }
        (files, warnings)
    }

    fn relative(&self, path: &Path) -> String {
        NormalizedPath::relative_to(path, &self.root)
            .unwrap_or_else(|| NormalizedPath::new(path).as_str().to_string())
    }

    fn classify_error(&self, err: &walkdir::Error) -> ScanWarning {
        let path = err
            .path()
            .map(|p| self.relative(p))
            .unwrap_or_else(|| self.relative(&self.root));
        let kind = match err.io_error().map(std::io::Error::kind) {
            Some(std::io::ErrorKind::PermissionDenied) => WarningKind::PermissionDenied,
            Some(std::io::ErrorKind::NotFound) if err.depth() == 0 => WarningKind::MissingRoot,
            _ => WarningKind::Unreadable,
        };
        ScanWarning::new(path, kind, err.to_string())
    }
}

impl Iterator for TreeWalker<'_> {
    type Item = WalkItem;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    let warning = self.classify_error(&err);
                    tracing::warn!(path = %warning.path, kind = ?warning.kind, "scan warning");
                    return Some(WalkItem::Warning(warning));
                }
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                continue;
            }

            let relative = self.relative(entry.path());
            if file_type.is_symlink() {
                tracing::warn!(path = %relative, "skipping symlink");
                return Some(WalkItem::Warning(ScanWarning::new(
                    relative,
                    WarningKind::Symlink,
                    "symbolic links are not compared",
                )));
            }
            if !file_type.is_file() {
                return Some(WalkItem::Warning(ScanWarning::new(
                    relative,
                    WarningKind::Unsupported,
                    "not a regular file",
                )));
            }

            return Some(WalkItem::File(WalkFile {
                relative,
                path: entry.into_path(),
            }));
        }
    }
}
