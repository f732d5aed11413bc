//! StagingEngine facade
//!
//! The engine ties the differs, the grouper, the conflict ledgers and the
//! synchronizer to one source/destination pair:
//! - **review**: cached file and database diffs, grouping, text previews
//! - **baselines**: recording the destination's known-synchronized state
//! - **conflicts**: detection and operator resolution
//! - **sync**: building a plan from a fresh diff and applying it

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use envsync_fs::checksum::fingerprint_file;
use envsync_fs::{ExclusionRules, Fingerprint, NormalizedPath};
use uuid::Uuid;

use crate::cache::DiffCache;
use crate::config::{EngineConfig, ExclusionConfig, Manifest};
use crate::conflict::{
    BaselineEntry, BaselineLedger, Conflict, ConflictDetector, ConflictLedger, ConflictResolver,
    Decision, FinalValue, ItemState, LedgerLock, Resolution,
};
use crate::diff::{DatabaseDiffReport, FileDiffReport, RelationalDiffer, TreeDiffer};
use crate::environment::{Endpoint, Environment};
use crate::group::ChangeGrouper;
use crate::model::{FileChange, GroupedChanges, ItemRef, ItemValue, Row, RowChange, row_fingerprint};
use crate::store::{RowStore, SqliteStore};
use crate::sync::{PlanAction, PlanItem, SyncOptions, SyncReport, Synchronizer};
use crate::{Error, Result};

const CONFLICTS_FILE: &str = "conflicts.json";
const BASELINE_FILE: &str = "baseline.json";
const LOCK_FILE: &str = "sync.lock";

/// A pending change found for a selected item.
#[derive(Debug, Clone, Copy)]
enum Pending<'p> {
    File(&'p FileChange),
    Row(&'p RowChange),
}

/// A selected item after group expansion.
#[derive(Debug)]
enum Selection<'p> {
    Pending(ItemRef, Pending<'p>),
    InSync(ItemRef),
    UnknownGroup(ItemRef),
}

/// Fresh diffs of both axes plus their grouping.
struct Changes {
    files: FileDiffReport,
    database: DatabaseDiffReport,
    grouped: GroupedChanges,
}

impl Changes {
    fn lookup(&self, item: &ItemRef) -> Option<Pending<'_>> {
        match item {
            ItemRef::File { path } => self.files.find(path).map(Pending::File),
            ItemRef::Row { table, key } => self.database.find(table, key).map(Pending::Row),
            ItemRef::Group { .. } => None,
        }
    }

    /// Expand groups into their rows and drop repeated items, keeping the
    /// order of first mention.
    fn expand(&self, selected: &[ItemRef]) -> Vec<Selection<'_>> {
        let mut seen = HashSet::new();
        let mut expanded = Vec::new();

        for item in selected {
            if let ItemRef::Group { id } = item {
                let Some(group) = self.grouped.find(id) else {
                    if seen.insert(item.clone()) {
                        expanded.push(Selection::UnknownGroup(item.clone()));
                    }
                    continue;
                };
                for row in group.rows() {
                    let member = ItemRef::row(row.table.clone(), row.primary_key_value.clone());
                    if seen.insert(member.clone()) {
                        expanded.push(Selection::Pending(member, Pending::Row(row)));
                    }
                }
                continue;
            }

            if !seen.insert(item.clone()) {
                continue;
            }
            expanded.push(match self.lookup(item) {
                Some(pending) => Selection::Pending(item.clone(), pending),
                None => Selection::InSync(item.clone()),
            });
        }
        expanded
    }
}

/// Facade over one staging/production environment pair.
///
/// # Example
///
/// ```no_run
/// use envsync_core::StagingEngine;
/// use envsync_core::config::Manifest;
/// use envsync_core::model::ItemRef;
///
/// let manifest = Manifest::load(std::path::Path::new("envsync.toml")).unwrap();
/// let engine = StagingEngine::from_manifest(&manifest).unwrap();
///
/// let files = engine.diff_files().unwrap();
/// let selected: Vec<ItemRef> = files
///     .changes
///     .iter()
///     .map(|c| ItemRef::file(c.relative_path.clone()))
///     .collect();
/// let report = engine.synchronize(&selected).unwrap();
/// assert!(report.is_success());
/// ```
pub struct StagingEngine {
    source: Endpoint,
    destination: Endpoint,
    config: EngineConfig,
    rules: ExclusionRules,
    state_dir: NormalizedPath,
    cache: Arc<DiffCache>,
}

impl StagingEngine {
    /// Create an engine with its own diff cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the path exclusion patterns do not compile.
    pub fn new(
        source: Endpoint,
        destination: Endpoint,
        config: EngineConfig,
        state_dir: impl Into<NormalizedPath>,
    ) -> Result<Self> {
        let rules = config.exclusions.rules()?;
        let cache = Arc::new(DiffCache::new(config.cache.ttl()));
        Ok(Self {
            source,
            destination,
            config,
            rules,
            state_dir: state_dir.into(),
            cache,
        })
    }

    /// Share a diff cache with other engines.
    pub fn with_cache(mut self, cache: Arc<DiffCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Open both databases named in the manifest.
    ///
    /// An environment without a database gets an empty in-memory store.
    pub fn from_manifest(manifest: &Manifest) -> Result<Self> {
        let open = |database: Option<&str>| -> Result<Arc<dyn RowStore>> {
            Ok(match database {
                Some(path) => Arc::new(SqliteStore::open(Path::new(path))?),
                None => Arc::new(SqliteStore::in_memory()?),
            })
        };

        let source = Endpoint::new(
            manifest.source.environment(),
            open(manifest.source.database.as_deref())?,
        );
        let destination = Endpoint::new(
            manifest.destination.environment(),
            open(manifest.destination.database.as_deref())?,
        );
        Self::new(source, destination, manifest.engine.clone(), manifest.state_dir())
    }

    pub fn source(&self) -> &Environment {
        &self.source.environment
    }

    pub fn destination(&self) -> &Environment {
        &self.destination.environment
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state_dir(&self) -> &NormalizedPath {
        &self.state_dir
    }

    pub fn cache(&self) -> &Arc<DiffCache> {
        &self.cache
    }

    pub fn conflicts_path(&self) -> NormalizedPath {
        self.state_dir.join(CONFLICTS_FILE)
    }

    pub fn baseline_path(&self) -> NormalizedPath {
        self.state_dir.join(BASELINE_FILE)
    }

    pub fn lock_path(&self) -> NormalizedPath {
        self.state_dir.join(LOCK_FILE)
    }

    // ---- review ----

    /// File change set, served from the cache while fresh.
    pub fn diff_files(&self) -> Result<FileDiffReport> {
        if let Some(report) = self.cache.files(self.source.name(), self.destination.name()) {
            return Ok(report);
        }
        self.fresh_files()
    }

    /// Row change set, served from the cache while fresh.
    pub fn diff_database(&self) -> Result<DatabaseDiffReport> {
        if let Some(report) = self.cache.database(self.source.name(), self.destination.name()) {
            return Ok(report);
        }
        self.fresh_database()
    }

    pub fn group(&self, changes: &[RowChange]) -> GroupedChanges {
        ChangeGrouper::new(&self.config.grouping).group(changes)
    }

    /// Group the (cached) database diff.
    pub fn grouped_changes(&self) -> Result<GroupedChanges> {
        let report = self.diff_database()?;
        Ok(self.group(&report.changes))
    }

    /// Unified text diff of one file, or `None` for binary content.
    pub fn preview_file(&self, relative: &str) -> Result<Option<String>> {
        self.tree_differ().preview(relative)
    }

    fn tree_differ(&self) -> TreeDiffer<'_> {
        TreeDiffer::new(&self.source.environment, &self.destination.environment, &self.rules)
    }

    fn fresh_files(&self) -> Result<FileDiffReport> {
        let report = self.tree_differ().diff()?;
        self.cache
            .store_files(self.source.name(), self.destination.name(), report.clone());
        Ok(report)
    }

    fn fresh_database(&self) -> Result<DatabaseDiffReport> {
        let report = RelationalDiffer::new(
            &self.source,
            &self.destination,
            &self.config.exclusions,
            &self.config.database,
        )
        .diff()?;
        self.cache
            .store_database(self.source.name(), self.destination.name(), report.clone());
        Ok(report)
    }

    fn fresh_changes(&self) -> Result<Changes> {
        let files = self.fresh_files()?;
        let database = self.fresh_database()?;
        let grouped = self.group(&database.changes);
        Ok(Changes {
            files,
            database,
            grouped,
        })
    }

    // ---- baselines ----

    /// Record the destination's current state of every file and row as the
    /// known-synchronized state, replacing earlier baselines.
    ///
    /// Items present only on the source are recorded as absent. Returns the
    /// number of entries written.
    pub fn capture_baseline(&self) -> Result<usize> {
        let path = self.baseline_path();
        let _lock = LedgerLock::acquire(&path)?;
        let mut baselines = BaselineLedger::new();

        let (source_files, destination_files) = self.tree_differ().fingerprints();
        for (path, fingerprint) in &destination_files {
            baselines.record(
                &ItemRef::file(path.clone()),
                BaselineEntry::new(Some(fingerprint.clone()), Some(ItemValue::File(fingerprint.clone()))),
            );
        }
        for path in source_files.keys().filter(|p| !destination_files.contains_key(*p)) {
            baselines.record(&ItemRef::file(path.clone()), BaselineEntry::new(None, None));
        }

        self.capture_row_baselines(&mut baselines)?;

        baselines.save(&path)?;
        tracing::info!(
            destination = %self.destination.name(),
            entries = baselines.len(),
            "baseline captured"
        );
        Ok(baselines.len())
    }

    fn capture_row_baselines(&self, baselines: &mut BaselineLedger) -> Result<()> {
        let source_tables = self.logical_tables(&self.source)?;
        let destination_tables = self.logical_tables(&self.destination)?;

        for (table, physical) in &destination_tables {
            let Some(key_column) = self.key_column(table)? else {
                tracing::debug!(%table, "no single-column primary key, no baseline");
                continue;
            };
            let keys = self.destination.store.primary_keys(physical, &key_column)?;
            for key in &keys {
                let row = self.destination.store.fetch_row(physical, &key_column, key)?;
                let entry = match row {
                    Some(row) => BaselineEntry::new(
                        Some(self.fingerprint_row(table, &row)),
                        Some(ItemValue::Row(row)),
                    ),
                    None => BaselineEntry::new(None, None),
                };
                baselines.record(&ItemRef::row(table.clone(), key.clone()), entry);
            }

            if let Some(source_physical) = source_tables.get(table) {
                let present: HashSet<&String> = keys.iter().collect();
                for key in self.source.store.primary_keys(source_physical, &key_column)? {
                    if !present.contains(&key) {
                        baselines.record(&ItemRef::row(table.clone(), key), BaselineEntry::new(None, None));
                    }
                }
            }
        }
        Ok(())
    }

    /// Logical → physical names of an endpoint's non-excluded tables.
    fn logical_tables(&self, endpoint: &Endpoint) -> Result<BTreeMap<String, String>> {
        Ok(endpoint
            .store
            .tables()?
            .into_iter()
            .filter_map(|physical| {
                let name = endpoint.environment.logical_table(&physical)?.to_string();
                Some((name, physical))
            })
            .filter(|(name, _)| !self.config.exclusions.is_table_excluded(name))
            .collect())
    }

    /// Single primary key column of a logical table, destination schema first.
    fn key_column(&self, table: &str) -> Result<Option<String>> {
        for endpoint in [&self.destination, &self.source] {
            let physical = endpoint.environment.physical_table(table);
            match endpoint.store.schema(&physical) {
                Ok(schema) => return Ok(schema.single_primary_key().map(str::to_string)),
                Err(Error::Schema { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    fn fingerprint_row(&self, table: &str, row: &Row) -> Fingerprint {
        row_fingerprint(row, |column| {
            !self.config.exclusions.is_column_excluded(table, column)
        })
    }

    // ---- conflicts ----

    /// Detect conflicts for `selected` against a fresh diff and persist the
    /// new ones.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidItemRef`] when a selected group has no pending changes.
    pub fn detect_conflicts(&self, selected: &[ItemRef]) -> Result<Vec<Conflict>> {
        let changes = self.fresh_changes()?;
        let selection = changes.expand(selected);

        let mut states = Vec::new();
        for entry in &selection {
            match entry {
                Selection::Pending(item, pending) => states.push(self.item_state(item, *pending)),
                Selection::InSync(_) => {}
                Selection::UnknownGroup(item) => {
                    return Err(Error::InvalidItemRef {
                        value: item.to_string(),
                        message: "no pending group with this id".to_string(),
                    });
                }
            }
        }

        let baselines = BaselineLedger::load(&self.baseline_path())?;
        let (detected, _) = self.detect(&states, &baselines)?;
        Ok(detected)
    }

    /// Record an operator decision on a conflict.
    ///
    /// # Errors
    ///
    /// [`Error::ConflictNotFound`] when `id` is not a known conflict id.
    pub fn resolve_conflict(&self, id: &str, decision: Decision) -> Result<FinalValue> {
        let uuid = Uuid::parse_str(id.trim()).map_err(|_| Error::ConflictNotFound { id: id.to_string() })?;
        let path = self.conflicts_path();
        let _lock = LedgerLock::acquire(&path)?;
        let mut ledger = ConflictLedger::load(&path)?;
        let outcome = ConflictResolver::new().resolve(&mut ledger, uuid, decision)?;
        ledger.save(&path)?;
        Ok(outcome)
    }

    /// Every recorded conflict, oldest first.
    pub fn conflicts(&self) -> Result<Vec<Conflict>> {
        Ok(ConflictLedger::load(&self.conflicts_path())?.conflicts().to_vec())
    }

    /// Run detection and persist the ledger when something new was found.
    fn detect(
        &self,
        states: &[ItemState],
        baselines: &BaselineLedger,
    ) -> Result<(Vec<Conflict>, ConflictLedger)> {
        let path = self.conflicts_path();
        let _lock = LedgerLock::acquire(&path)?;
        let mut ledger = ConflictLedger::load(&path)?;

        let detected = ConflictDetector::new(self.source.name()).detect(states, baselines, &mut ledger);
        if !detected.is_empty() {
            ledger.save(&path)?;
            tracing::info!(count = detected.len(), "new conflicts recorded");
        }
        Ok((detected, ledger))
    }

    fn item_state(&self, item: &ItemRef, pending: Pending<'_>) -> ItemState {
        match pending {
            Pending::File(change) => ItemState {
                item: item.clone(),
                source: change
                    .source_hash
                    .clone()
                    .map_or(ItemValue::Absent, ItemValue::File),
                destination: change
                    .destination_hash
                    .clone()
                    .map_or(ItemValue::Absent, ItemValue::File),
                destination_fingerprint: change.destination_hash.clone(),
            },
            Pending::Row(change) => ItemState {
                item: item.clone(),
                source: change
                    .source_row
                    .clone()
                    .map_or(ItemValue::Absent, ItemValue::Row),
                destination: change
                    .destination_row
                    .clone()
                    .map_or(ItemValue::Absent, ItemValue::Row),
                destination_fingerprint: change
                    .destination_row
                    .as_ref()
                    .map(|row| self.fingerprint_row(&change.table, row)),
            },
        }
    }

    // ---- sync ----

    /// Apply the selected items to the destination.
    pub fn synchronize(&self, selected: &[ItemRef]) -> Result<SyncReport> {
        self.synchronize_with_options(selected, &SyncOptions::default())
    }

    /// Apply the selected items with explicit options.
    ///
    /// Items are resolved against a fresh diff. Conflicts found on the way
    /// are recorded (also in dry runs) and block their item until resolved.
    ///
    /// # Errors
    ///
    /// Fatal failures only: a diff that cannot run, unreadable state files,
    /// or [`Error::SyncInProgress`]. Item failures are in the report.
    pub fn synchronize_with_options(
        &self,
        selected: &[ItemRef],
        options: &SyncOptions,
    ) -> Result<SyncReport> {
        let changes = self.fresh_changes()?;
        let selection = changes.expand(selected);

        let states: Vec<ItemState> = selection
            .iter()
            .filter_map(|entry| match entry {
                Selection::Pending(item, pending) => Some(self.item_state(item, *pending)),
                _ => None,
            })
            .collect();
        let baselines = BaselineLedger::load(&self.baseline_path())?;
        let (_, ledger) = self.detect(&states, &baselines)?;

        let mut fingerprints: BTreeMap<&ItemRef, Option<Fingerprint>> = states
            .iter()
            .map(|s| (&s.item, s.destination_fingerprint.clone()))
            .collect();

        let mut kept = HashSet::new();
        let mut plan = Vec::with_capacity(selection.len());
        for entry in &selection {
            let planned = match entry {
                Selection::InSync(item) => PlanItem::skip(item.clone(), "already in sync"),
                Selection::UnknownGroup(item) => {
                    PlanItem::blocked(item.clone(), format!("{item}: no pending group with this id"))
                }
                Selection::Pending(item, pending) => {
                    let fingerprint = fingerprints.remove(item).flatten();
                    let conflict =
                        ledger.for_destination(item, fingerprint.as_ref(), baselines.get(item));
                    let keeps_destination = conflict.is_some_and(|c| {
                        c.resolved && c.resolution == Some(Resolution::Destination)
                    });
                    if keeps_destination {
                        kept.insert(item.clone());
                    }
                    plan_item(item, *pending, conflict, &self.config.exclusions)
                }
            };
            plan.push(planned);
        }

        let synchronizer = Synchronizer::new(
            &self.source,
            &self.destination,
            self.lock_path(),
            self.config.sync.lock_timeout(),
        );
        let report = synchronizer.run(plan, options)?;

        if !options.dry_run {
            self.refresh_baselines(&report, &kept)?;
            self.cache
                .invalidate_pair(self.source.name(), self.destination.name());
        }
        Ok(report)
    }

    /// Record the destination's post-sync state of every item that succeeded.
    ///
    /// Items whose destination value was kept by resolution keep their old
    /// baseline, so the resolution stays in effect.
    fn refresh_baselines(&self, report: &SyncReport, kept: &HashSet<ItemRef>) -> Result<()> {
        let path = self.baseline_path();
        let _lock = LedgerLock::acquire(&path)?;
        let mut baselines = BaselineLedger::load(&path)?;
        let mut refreshed = 0usize;

        for result in report.succeeded().filter(|r| !kept.contains(&r.item_ref)) {
            let entry = match &result.item_ref {
                ItemRef::File { path } => {
                    let target = self.destination.environment.file_path(path);
                    match fingerprint_file(&target.to_native()) {
                        Ok(fp) => BaselineEntry::new(Some(fp.clone()), Some(ItemValue::File(fp))),
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => BaselineEntry::new(None, None),
                        Err(e) => {
                            tracing::warn!(%path, error = %e, "cannot fingerprint synced file");
                            continue;
                        }
                    }
                }
                ItemRef::Row { table, key } => {
                    let Some(key_column) = self.key_column(table)? else {
                        continue;
                    };
                    let physical = self.destination.environment.physical_table(table);
                    match self.destination.store.fetch_row(&physical, &key_column, key)? {
                        Some(row) => BaselineEntry::new(
                            Some(self.fingerprint_row(table, &row)),
                            Some(ItemValue::Row(row)),
                        ),
                        None => BaselineEntry::new(None, None),
                    }
                }
                ItemRef::Group { .. } => continue,
            };
            baselines.record(&result.item_ref, entry);
            refreshed += 1;
        }

        if refreshed > 0 {
            baselines.save(&path)?;
        }
        tracing::debug!(refreshed, "baselines refreshed after sync");
        Ok(())
    }
}

impl std::fmt::Debug for StagingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingEngine")
            .field("source", &self.source)
            .field("destination", &self.destination)
            .field("state_dir", &self.state_dir)
            .finish_non_exhaustive()
    }
}

/// Plan one pending item given the conflict recorded for its current
/// destination value, if any.
fn plan_item(
    item: &ItemRef,
    pending: Pending<'_>,
    conflict: Option<&Conflict>,
    exclusions: &ExclusionConfig,
) -> PlanItem {
    let Some(conflict) = conflict else {
        return plan_change(item, pending, None, exclusions);
    };
    if !conflict.resolved {
        let reason = Error::Conflict {
            item: item.to_string(),
        };
        return PlanItem::blocked(item.clone(), reason.to_string());
    }

    match conflict.resolution {
        Some(Resolution::Destination) => PlanItem::skip(item.clone(), "kept destination value"),
        Some(Resolution::Custom) => {
            plan_change(item, pending, conflict.custom_value.as_ref(), exclusions)
        }
        Some(Resolution::Source) | None => plan_change(item, pending, None, exclusions),
    }
}

fn plan_change(
    item: &ItemRef,
    pending: Pending<'_>,
    custom: Option<&ItemValue>,
    exclusions: &ExclusionConfig,
) -> PlanItem {
    match pending {
        Pending::File(change) => {
            let content = match custom {
                Some(ItemValue::Content(bytes)) => Some(bytes.clone()),
                _ => None,
            };
            PlanItem::new(
                item.clone(),
                PlanAction::ApplyFile {
                    change: change.clone(),
                    content,
                },
            )
        }
        Pending::Row(change) => {
            // Excluded columns are never written, not even by a resolution
            let overrides = match custom {
                Some(ItemValue::Row(row)) => Some(
                    row.iter()
                        .filter(|(column, _)| !exclusions.is_column_excluded(&change.table, column))
                        .map(|(column, value)| (column.clone(), value.clone()))
                        .collect::<Row>(),
                ),
                _ => None,
            };
            PlanItem::new(
                item.clone(),
                PlanAction::ApplyRow {
                    change: change.clone(),
                    overrides,
                },
            )
        }
    }
}
