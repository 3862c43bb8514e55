//! Distance pipeline
//!
//! Computes the distance of every unique pair of a task file, one by-level at
//! a time, and writes them to a distance file aligned with the pair table.

use crate::distance::PairDistance;
use crate::features::FeatureSource;
use abx_core::{Error, Result};
use abx_storage::{DistanceFileWriter, LevelManifest, TaskFile};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistanceConfig {
    /// 1 runs on the calling thread
    pub n_workers: usize,
    /// Pairs handed to a worker at a time
    pub shard_size: usize,
}

impl Default for DistanceConfig {
    fn default() -> Self {
        Self {
            n_workers: 1,
            shard_size: 1024,
        }
    }
}

impl DistanceConfig {
    pub fn with_workers(n_workers: usize) -> Self {
        Self {
            n_workers,
            ..Default::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if self.n_workers == 0 {
            return Err(Error::InvalidConfig("n_workers must be at least 1".to_string()));
        }
        if self.shard_size == 0 {
            return Err(Error::InvalidConfig("shard_size must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn pair_distance<F, D>(
    features: &F,
    distance: &D,
    level: &LevelManifest,
    (i, j): (u64, u64),
) -> Result<f64>
where
    F: FeatureSource + ?Sized,
    D: PairDistance + ?Sized,
{
    let global = |local: u64| {
        level.items.get(local as usize).copied().ok_or_else(|| {
            Error::Storage(format!("by-level `{}` has no item {}", level.key, local))
        })
    };
    let a = features.features(global(i)?)?;
    let b = features.features(global(j)?)?;
    distance.distance(a, b)
}

/// Compute all pair distances of `task` into a distance file at `output`
///
/// Returns the number of distances written. On error nothing is written.
pub fn compute_distances<F, D>(
    features: &F,
    task: &TaskFile,
    output: &Path,
    distance: &D,
    config: &DistanceConfig,
) -> Result<u64>
where
    F: FeatureSource + ?Sized,
    D: PairDistance + ?Sized,
{
    config.validate()?;
    let pool = if config.n_workers > 1 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.n_workers)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("cannot start worker pool: {}", e)))?;
        Some(pool)
    } else {
        None
    };

    let mut writer = DistanceFileWriter::create(output)?;
    let mut total = 0u64;
    for level in task.levels() {
        let pairs = task.pairs(&level.key)?;
        let compute = |pair: &(u64, u64)| pair_distance(features, distance, level, *pair);

        let distances: Vec<f64> = match &pool {
            None => pairs.iter().map(compute).collect::<Result<_>>()?,
            Some(pool) => {
                // Shards come back in shard order whatever their completion order
                let shards = pool.install(|| {
                    pairs
                        .par_chunks(config.shard_size)
                        .map(|shard| shard.iter().map(compute).collect::<Result<Vec<f64>>>())
                        .collect::<Result<Vec<Vec<f64>>>>()
                })?;
                shards.into_iter().flatten().collect()
            }
        };

        debug!("By-level {}: {} distance(s)", level.key, distances.len());
        writer.write_level(&level.key, &distances)?;
        total += distances.len() as u64;
    }

    writer.commit()?;
    info!("Computed {} distance(s) into {:?}", total, output);
    Ok(total)
}
