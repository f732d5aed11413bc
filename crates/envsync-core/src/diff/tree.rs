//! File tree differ

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use envsync_fs::checksum::{fingerprint_file, normalize_text};
use envsync_fs::walk::WalkFile;
use envsync_fs::{ContentClass, ExclusionRules, Fingerprint, ScanWarning, TreeWalker, WarningKind};
use similar::TextDiff;

use super::{FileDiffReport, deal, worker_count};
use crate::environment::Environment;
use crate::model::{ChangeStatus, FileChange};
use crate::{Error, Result};

/// Hashes of one tree plus whatever could not be hashed.
#[derive(Debug, Default)]
struct Snapshot {
    hashes: BTreeMap<String, Fingerprint>,
    /// Paths (files or directories) that must not be compared
    skipped: Vec<String>,
    warnings: Vec<ScanWarning>,
}

impl Snapshot {
    fn scan(env: &Environment, rules: &ExclusionRules) -> Self {
        let root = env.root.to_native();
        let (files, walk_warnings) = TreeWalker::new(&root, rules).partition();

        let mut snapshot = Snapshot::default();
        for warning in walk_warnings {
            snapshot.skip(env, warning);
        }

        for (relative, hashed) in hash_files(files) {
            match hashed {
                Ok(fingerprint) => {
                    snapshot.hashes.insert(relative, fingerprint);
                }
                Err(e) => {
                    let kind = if e.kind() == std::io::ErrorKind::PermissionDenied {
                        WarningKind::PermissionDenied
                    } else {
                        WarningKind::Unreadable
                    };
                    tracing::warn!(environment = %env.name, path = %relative, error = %e, "cannot hash file");
                    snapshot.skip(env, ScanWarning::new(relative, kind, e.to_string()));
                }
            }
        }
        snapshot
    }

    fn missing(env: &Environment) -> Self {
        let warning = ScanWarning::new(
            env.root.as_str(),
            WarningKind::MissingRoot,
            format!("{}: root does not exist, treating it as empty", env.name),
        );
        tracing::warn!(environment = %env.name, root = %env.root, "environment root missing");
        Self {
            warnings: vec![warning],
            ..Self::default()
        }
    }

    fn skip(&mut self, env: &Environment, warning: ScanWarning) {
        self.skipped.push(warning.path.clone());
        self.warnings.push(ScanWarning {
            message: format!("{}: {}", env.name, warning.message),
            ..warning
        });
    }
}

/// Hash files with one worker per top-level subtree.
fn hash_files(files: Vec<WalkFile>) -> Vec<(String, std::io::Result<Fingerprint>)> {
    let mut subtrees: BTreeMap<String, Vec<WalkFile>> = BTreeMap::new();
    for file in files {
        let top = file
            .relative
            .split('/')
            .next()
            .unwrap_or_default()
            .to_string();
        subtrees.entry(top).or_default().push(file);
    }

    let jobs: Vec<Vec<WalkFile>> = subtrees.into_values().collect();
    let workers = worker_count(jobs.len(), None);
    let buckets = deal(jobs, workers);

    std::thread::scope(|scope| {
        let handles: Vec<_> = buckets
            .into_iter()
            .map(|bucket| {
                scope.spawn(move || {
                    bucket
                        .into_iter()
                        .flatten()
                        .map(|file| {
                            let hashed = fingerprint_file(&file.path);
                            (file.relative, hashed)
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|payload| std::panic::resume_unwind(payload))
            })
            .collect()
    })
}

fn is_under(path: &str, prefix: &str) -> bool {
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Compares the source tree against the destination tree.
///
/// Files are compared by content fingerprint only; timestamps and sizes
/// never count as a change.
pub struct TreeDiffer<'a> {
    source: &'a Environment,
    destination: &'a Environment,
    rules: &'a ExclusionRules,
}

impl<'a> TreeDiffer<'a> {
    pub fn new(
        source: &'a Environment,
        destination: &'a Environment,
        rules: &'a ExclusionRules,
    ) -> Self {
        Self {
            source,
            destination,
            rules,
        }
    }

    /// Compute the file change set.
    ///
    /// # Errors
    ///
    /// [`Error::RootNotFound`] when the source root does not exist. A
    /// missing destination root is reported as a warning and treated as an
    /// empty tree.
    pub fn diff(&self) -> Result<FileDiffReport> {
        if !self.source.root.is_dir() {
            return Err(Error::RootNotFound {
                path: self.source.root.to_native(),
            });
        }

        let mut source = Snapshot::scan(self.source, self.rules);
        let mut destination = if self.destination.root.is_dir() {
            Snapshot::scan(self.destination, self.rules)
        } else {
            Snapshot::missing(self.destination)
        };

        // Unreadable on either side means not comparable on both
        let skipped: BTreeSet<String> = source
            .skipped
            .iter()
            .chain(destination.skipped.iter())
            .cloned()
            .collect();
        let keep = |path: &String, _: &mut Fingerprint| !skipped.iter().any(|s| is_under(path, s));
        source.hashes.retain(keep);
        destination.hashes.retain(keep);

        let paths: BTreeSet<&String> = source
            .hashes
            .keys()
            .chain(destination.hashes.keys())
            .collect();

        let mut changes = Vec::new();
        for path in paths {
            let src = source.hashes.get(path);
            let dst = destination.hashes.get(path);
            let status = match (src, dst) {
                (Some(_), None) => ChangeStatus::Added,
                (None, Some(_)) => ChangeStatus::Deleted,
                (Some(a), Some(b)) if a != b => ChangeStatus::Modified,
                _ => continue,
            };
            changes.push(FileChange {
                relative_path: path.clone(),
                status,
                source_hash: src.cloned(),
                destination_hash: dst.cloned(),
            });
        }

        let mut warnings = source.warnings;
        warnings.append(&mut destination.warnings);

        tracing::info!(
            source = %self.source.name,
            destination = %self.destination.name,
            changes = changes.len(),
            warnings = warnings.len(),
            "file diff complete"
        );
        Ok(FileDiffReport { changes, warnings })
    }

    /// Fingerprints of every comparable file, as `(source, destination)`.
    ///
    /// A missing root yields an empty map; unreadable files are left out.
    pub fn fingerprints(&self) -> (BTreeMap<String, Fingerprint>, BTreeMap<String, Fingerprint>) {
        let scan = |env: &Environment| {
            if env.root.is_dir() {
                Snapshot::scan(env, self.rules).hashes
            } else {
                BTreeMap::new()
            }
        };
        (scan(self.source), scan(self.destination))
    }

    /// Unified diff of one text file, destination to source.
    ///
    /// Returns `None` for binary or non-UTF-8 files, and when the file
    /// exists on neither side. A side on which the file is missing diffs
    /// as empty.
    pub fn preview(&self, relative: &str) -> Result<Option<String>> {
        if ContentClass::for_path(relative) == ContentClass::Binary {
            return Ok(None);
        }

        let source = read_optional(&self.source.file_path(relative).to_native())?;
        let destination = read_optional(&self.destination.file_path(relative).to_native())?;
        if source.is_none() && destination.is_none() {
            return Ok(None);
        }

        let (Ok(new), Ok(old)) = (
            String::from_utf8(source.unwrap_or_default()),
            String::from_utf8(destination.unwrap_or_default()),
        ) else {
            return Ok(None);
        };

        let old = normalize_text(&old);
        let new = normalize_text(&new);
        let old_header = format!("{}/{}", self.destination.name, relative);
        let new_header = format!("{}/{}", self.source.name, relative);

        let text_diff = TextDiff::from_lines(old.as_ref(), new.as_ref());
        let rendered = text_diff
            .unified_diff()
            .context_radius(3)
            .header(&old_header, &new_header)
            .to_string();
        Ok(Some(rendered))
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(envsync_fs::Error::io(path, e).into()),
    }
}
