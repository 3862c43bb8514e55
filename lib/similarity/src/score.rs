//! Triplet scoring

use abx_core::{Error, Result};
use abx_storage::{DistanceFile, ScoreFileWriter, TaskFile};
use std::cmp::Ordering;
use std::path::Path;
use tracing::{debug, info};

pub const CORRECT: i8 = 1;
pub const TIE: i8 = 0;
pub const WRONG: i8 = -1;

/// Sign of d(B, X) - d(A, X): 1 when X is closer to A
#[inline]
pub fn score_of(d_ax: f64, d_bx: f64) -> i8 {
    match d_bx.partial_cmp(&d_ax) {
        Some(Ordering::Greater) => CORRECT,
        Some(Ordering::Less) => WRONG,
        _ => TIE,
    }
}

/// Score every triplet of `task` from its pair distances into `output`
///
/// Returns the number of scores written.
pub fn score(task: &TaskFile, distances: &DistanceFile, output: &Path) -> Result<u64> {
    let pairs = task.pair_table()?;
    let mut writer = ScoreFileWriter::create(output)?;
    let mut total = 0u64;

    for key in task.keys() {
        let (start, end) = pairs.range(key)?;
        let d = distances.read_aligned(key, end - start)?;

        let distance = |pair: u64| {
            d.get(pair as usize).copied().ok_or_else(|| {
                Error::Storage(format!("by-level `{}` has no pair {}", key, pair))
            })
        };
        let scores = task
            .triplet_refs(key)?
            .into_iter()
            .map(|r| Ok(score_of(distance(r.pair_ax)?, distance(r.pair_bx)?)))
            .collect::<Result<Vec<i8>>>()?;

        debug!("By-level {}: {} score(s)", key, scores.len());
        writer.write_level(key, &scores)?;
        total += scores.len() as u64;
    }

    writer.commit()?;
    info!("Scored {} triplet(s) into {:?}", total, output);
    Ok(total)
}
