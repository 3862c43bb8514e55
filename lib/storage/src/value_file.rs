//! Per-row value files aligned with a task file
//!
//! A distance file holds one `f64` per pair, a score file one `i8` per
//! triplet. Both are stores with a single one-column table, range-indexed by
//! the same by-level keys as the task file they were computed from.

use crate::store::{Cell, StoreReader, StoreWriter, TableReader, TableWriter};
use abx_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// What a value file stores
pub trait ValueKind {
    type Cell: Cell;
    const TABLE: &'static str;
}

/// One distance per unique pair
#[derive(Debug, Clone, Copy)]
pub struct Distances;

impl ValueKind for Distances {
    type Cell = f64;
    const TABLE: &'static str = "distances";
}

/// One score per triplet: 1 when X is closer to A, -1 when closer to B, 0 on ties
#[derive(Debug, Clone, Copy)]
pub struct Scores;

impl ValueKind for Scores {
    type Cell = i8;
    const TABLE: &'static str = "scores";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ValueManifest {
    table: String,
    rows: u64,
}

pub struct ValueFileWriter<K: ValueKind> {
    path: PathBuf,
    table: TableWriter<K::Cell, 1>,
}

impl<K: ValueKind> ValueFileWriter<K> {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            table: TableWriter::new(K::TABLE)?,
        })
    }

    /// Append the values of one by-level
    pub fn write_level(&mut self, key: &str, values: &[K::Cell]) -> Result<()> {
        self.table.begin_range(key)?;
        for &value in values {
            self.table.push([value])?;
        }
        self.table.end_range()
    }

    pub fn commit(self) -> Result<()> {
        let manifest = ValueManifest {
            table: K::TABLE.to_string(),
            rows: self.table.rows(),
        };
        let mut store = StoreWriter::create(&self.path);
        store.add(self.table.finish()?)?;
        store.commit(&manifest)
    }
}

#[derive(Debug)]
pub struct ValueFile<K: ValueKind> {
    store: StoreReader,
    _kind: PhantomData<K>,
}

impl<K: ValueKind> ValueFile<K> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let store = StoreReader::open(path)?;
        let manifest: ValueManifest = store.metadata()?;
        if manifest.table != K::TABLE {
            return Err(Error::Storage(format!(
                "{:?} holds `{}`, expected `{}`",
                store.path(),
                manifest.table,
                K::TABLE
            )));
        }
        store.table::<K::Cell, 1>(K::TABLE)?;
        Ok(Self {
            store,
            _kind: PhantomData,
        })
    }

    pub fn table(&self) -> Result<TableReader<'_, K::Cell, 1>> {
        self.store.table(K::TABLE)
    }

    pub fn len(&self) -> Result<u64> {
        Ok(self.table()?.len())
    }

    pub fn read_level(&self, key: &str) -> Result<Vec<K::Cell>> {
        let rows = self.table()?.read_level(key)?;
        Ok(rows.into_iter().map(|[v]| v).collect())
    }

    /// Values of a by-level, checked against the row count it must match
    pub fn read_aligned(&self, key: &str, expected: u64) -> Result<Vec<K::Cell>> {
        let values = self.read_level(key)?;
        if values.len() as u64 != expected {
            return Err(Error::Storage(format!(
                "{:?}: by-level `{}` has {} {}, expected {}",
                self.store.path(),
                key,
                values.len(),
                K::TABLE,
                expected
            )));
        }
        Ok(values)
    }
}

pub type DistanceFileWriter = ValueFileWriter<Distances>;
pub type DistanceFile = ValueFile<Distances>;
pub type ScoreFileWriter = ValueFileWriter<Scores>;
pub type ScoreFile = ValueFile<Scores>;
