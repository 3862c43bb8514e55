//! Task file
//!
//! Persists a generated task in a [`store`](crate::store) with three tables,
//! each range-indexed by by-level key:
//!
//! - `triplets`: A, B, X local ids
//! - `triplet_refs`: pair id of (A, X), pair id of (B, X), regressor group
//! - `pairs`: pair id, i, j with i <= j
//!
//! The [`TaskManifest`] carries the task configuration, statistics and, per
//! by-level, the mapping from local to global item ids.

use crate::store::{StoreReader, StoreWriter, TableReader, TableWriter};
use abx_core::{
    ByLevel, Error, GenerateOptions, GenerationSummary, GroupLabel, LocalId, Result, Stats, Task,
    Triplet, TripletSink,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

pub const TRIPLETS: &str = "triplets";
pub const TRIPLET_REFS: &str = "triplet_refs";
pub const PAIRS: &str = "pairs";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelManifest {
    pub key: String,
    /// Values of the by attributes
    pub values: Vec<String>,
    /// Global item ids, indexed by local id
    pub items: Vec<u64>,
    /// Regressor group labels, indexed by group id
    pub groups: Vec<GroupLabel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskManifest {
    pub attributes: Vec<String>,
    pub on: String,
    pub across: Vec<String>,
    pub by: Vec<String>,
    pub filters: Vec<String>,
    pub threshold: Option<u64>,
    pub seed: Option<u64>,
    pub stats: Stats,
    pub summary: GenerationSummary,
    pub levels: Vec<LevelManifest>,
}

/// References of one stored triplet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TripletRefs {
    pub pair_ax: u64,
    pub pair_bx: u64,
    pub group: u64,
}

/// Generator sink writing a task file
pub struct TaskFileWriter<'t> {
    path: PathBuf,
    task: &'t Task,
    threshold: Option<u64>,
    seed: Option<u64>,
    triplets: TableWriter<u64, 3>,
    refs: TableWriter<u64, 3>,
    pairs: TableWriter<u64, 3>,
    levels: Vec<LevelManifest>,
}

impl<'t> TaskFileWriter<'t> {
    pub fn create<P: AsRef<Path>>(
        path: P,
        task: &'t Task,
        options: &GenerateOptions,
        seed: Option<u64>,
    ) -> Result<Self> {
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            task,
            threshold: options.threshold.map(|t| t as u64),
            seed,
            triplets: TableWriter::new(TRIPLETS)?,
            refs: TableWriter::new(TRIPLET_REFS)?,
            pairs: TableWriter::new(PAIRS)?,
            levels: Vec::new(),
        })
    }

    pub fn commit(self, summary: &GenerationSummary) -> Result<()> {
        let config = self.task.config();
        let manifest = TaskManifest {
            attributes: self.task.items().attributes().to_vec(),
            on: config.on.clone(),
            across: config.across.clone(),
            by: config.by.clone(),
            filters: config.filters.clone(),
            threshold: self.threshold,
            seed: self.seed,
            stats: self.task.stats(),
            summary: summary.clone(),
            levels: self.levels,
        };

        let mut store = StoreWriter::create(&self.path);
        store.add(self.triplets.finish()?)?;
        store.add(self.refs.finish()?)?;
        store.add(self.pairs.finish()?)?;
        store.commit(&manifest)
    }
}

impl<'t> TripletSink for TaskFileWriter<'t> {
    fn begin_by_level(&mut self, level: &ByLevel) -> Result<()> {
        self.triplets.begin_range(level.key())?;
        self.refs.begin_range(level.key())
    }

    fn triplet(&mut self, triplet: &Triplet) -> Result<()> {
        self.triplets
            .push([triplet.a as u64, triplet.b as u64, triplet.x as u64])?;
        self.refs
            .push([triplet.pair_ax, triplet.pair_bx, triplet.group as u64])
    }

    fn end_by_level(&mut self, level: &ByLevel, pairs: &[(LocalId, LocalId)]) -> Result<()> {
        self.triplets.end_range()?;
        self.refs.end_range()?;

        self.pairs.begin_range(level.key())?;
        for (id, &(i, j)) in pairs.iter().enumerate() {
            self.pairs.push([id as u64, i as u64, j as u64])?;
        }
        self.pairs.end_range()?;

        self.levels.push(LevelManifest {
            key: level.key().to_string(),
            values: level.values().to_vec(),
            items: level.items().iter().map(|&i| i as u64).collect(),
            groups: level.groups().iter().map(|g| g.label.clone()).collect(),
        });
        Ok(())
    }
}

/// Read-only access to a task file
#[derive(Debug)]
pub struct TaskFile {
    store: StoreReader,
    manifest: TaskManifest,
}

impl TaskFile {
    /// Generate `task` into a new task file at `path`
    pub fn write<P, R>(
        path: P,
        task: &Task,
        options: &GenerateOptions,
        rng: &mut R,
        seed: Option<u64>,
    ) -> Result<GenerationSummary>
    where
        P: AsRef<Path>,
        R: Rng + ?Sized,
    {
        let mut writer = TaskFileWriter::create(path.as_ref(), task, options, seed)?;
        let summary = task.generate(&mut writer, options, rng)?;
        writer.commit(&summary)?;
        info!("Task file written to {:?}", path.as_ref());
        Ok(summary)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let store = StoreReader::open(path)?;
        let manifest: TaskManifest = store.metadata()?;
        // Fail early on files that are not task files
        store.table::<u64, 3>(TRIPLETS)?;
        store.table::<u64, 3>(TRIPLET_REFS)?;
        store.table::<u64, 3>(PAIRS)?;
        Ok(Self { store, manifest })
    }

    #[inline]
    pub fn manifest(&self) -> &TaskManifest {
        &self.manifest
    }

    #[inline]
    pub fn levels(&self) -> &[LevelManifest] {
        &self.manifest.levels
    }

    pub fn level(&self, key: &str) -> Result<&LevelManifest> {
        self.manifest
            .levels
            .iter()
            .find(|l| l.key == key)
            .ok_or_else(|| Error::ByLevelNotFound(key.to_string()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.manifest.levels.iter().map(|l| l.key.as_str())
    }

    pub fn triplet_table(&self) -> Result<TableReader<'_, u64, 3>> {
        self.store.table(TRIPLETS)
    }

    pub fn pair_table(&self) -> Result<TableReader<'_, u64, 3>> {
        self.store.table(PAIRS)
    }

    pub fn nb_triplets(&self) -> Result<u64> {
        Ok(self.triplet_table()?.len())
    }

    pub fn nb_pairs(&self) -> Result<u64> {
        Ok(self.pair_table()?.len())
    }

    /// Triplets of a by-level as (A, B, X) local ids
    pub fn triplets(&self, key: &str) -> Result<Vec<[u64; 3]>> {
        self.triplet_table()?.read_level(key)
    }

    pub fn triplet_refs(&self, key: &str) -> Result<Vec<TripletRefs>> {
        let rows = self.store.table::<u64, 3>(TRIPLET_REFS)?.read_level(key)?;
        Ok(rows
            .into_iter()
            .map(|[pair_ax, pair_bx, group]| TripletRefs {
                pair_ax,
                pair_bx,
                group,
            })
            .collect())
    }

    /// Unique pairs of a by-level as (i, j) local ids, indexed by pair id
    pub fn pairs(&self, key: &str) -> Result<Vec<(u64, u64)>> {
        let rows = self.pair_table()?.read_level(key)?;
        Ok(rows.into_iter().map(|[_, i, j]| (i, j)).collect())
    }

    /// One pair, found by seeking straight to its row
    pub fn pair(&self, key: &str, id: u64) -> Result<(u64, u64)> {
        let table = self.pair_table()?;
        let (start, end) = table.range(key)?;
        if start + id >= end {
            return Err(Error::Storage(format!(
                "by-level `{}` has no pair {}",
                key, id
            )));
        }
        let [_, i, j] = table.row(start + id)?;
        Ok((i, j))
    }

    pub fn global_item(&self, key: &str, local: u64) -> Result<u64> {
        let level = self.level(key)?;
        level.items.get(local as usize).copied().ok_or_else(|| {
            Error::Storage(format!("by-level `{}` has no item {}", key, local))
        })
    }
}
