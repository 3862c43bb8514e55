//! Feature sequences and where to find them

use abx_core::{Error, Result};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Frames of one item, all of the same dimension
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSeq {
    frames: Vec<Vec<f32>>,
}

impl FeatureSeq {
    pub fn new(frames: Vec<Vec<f32>>) -> Result<Self> {
        if let Some(first) = frames.first() {
            let dim = first.len();
            if let Some(bad) = frames.iter().position(|f| f.len() != dim) {
                return Err(Error::Distance(format!(
                    "frame {} has dimension {}, expected {}",
                    bad,
                    frames[bad].len(),
                    dim
                )));
            }
        }
        Ok(Self { frames })
    }

    /// A single-frame sequence
    pub fn from_vector(vector: Vec<f32>) -> Self {
        Self {
            frames: vec![vector],
        }
    }

    #[inline]
    pub fn frames(&self) -> &[Vec<f32>] {
        &self.frames
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frame dimension, 0 for an empty sequence
    pub fn dim(&self) -> usize {
        self.frames.first().map_or(0, Vec::len)
    }
}

/// Lookup of feature sequences by global item id
pub trait FeatureSource: Sync {
    fn features(&self, item: u64) -> Result<&FeatureSeq>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryFeatures {
    items: AHashMap<u64, FeatureSeq>,
}

impl InMemoryFeatures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, item: u64, features: FeatureSeq) -> Option<FeatureSeq> {
        self.items.insert(item, features)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl FromIterator<(u64, FeatureSeq)> for InMemoryFeatures {
    fn from_iter<I: IntoIterator<Item = (u64, FeatureSeq)>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl FeatureSource for InMemoryFeatures {
    fn features(&self, item: u64) -> Result<&FeatureSeq> {
        self.items.get(&item).ok_or(Error::MissingFeatures(item))
    }
}

#[derive(Debug, Deserialize)]
struct FeatureRecord {
    item: u64,
    features: Vec<Vec<f32>>,
}

/// Features read from JSON lines: `{"item": 3, "features": [[0.1, 0.2], ...]}`
#[derive(Debug, Clone, Default)]
pub struct JsonLinesFeatures {
    inner: InMemoryFeatures,
}

impl JsonLinesFeatures {
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut inner = InMemoryFeatures::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: FeatureRecord = serde_json::from_str(&line).map_err(|e| {
                Error::Serialization(format!("features line {}: {}", line_no + 1, e))
            })?;
            let seq = FeatureSeq::new(record.features)?;
            if inner.insert(record.item, seq).is_some() {
                return Err(Error::Serialization(format!(
                    "features line {}: item {} listed twice",
                    line_no + 1,
                    record.item
                )));
            }
        }
        Ok(Self { inner })
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_reader(BufReader::new(File::open(path)?))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl FeatureSource for JsonLinesFeatures {
    fn features(&self, item: u64) -> Result<&FeatureSeq> {
        self.inner.features(item)
    }
}
