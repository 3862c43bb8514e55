//! Analysis of triplet scores per regressor group
//!
//! A group is one (by-level, on value of A, on value of B, across values)
//! context. Its score is the mean outcome of its triplets, counting a correct
//! answer as 1, a tie as 0.5 and a wrong answer as 0.

use crate::score::{CORRECT, TIE};
use abx_core::{Error, Result};
use abx_storage::{ScoreFile, TaskFile, TaskManifest};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRow {
    /// Key of the by-level the group belongs to
    pub by_level: String,
    /// Values of the by attributes
    pub by: Vec<String>,
    /// On value of A (and X)
    pub on_1: String,
    /// On value of B
    pub on_2: String,
    pub across: Vec<String>,
    pub score: f64,
    pub n: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    /// Mean over by-levels of the mean group score
    pub score: f64,
    pub nb_groups: usize,
    pub nb_by_levels: usize,
}

#[inline]
fn outcome(score: i8) -> f64 {
    match score {
        CORRECT => 1.0,
        TIE => 0.5,
        _ => 0.0,
    }
}

/// Aggregate the scores of `task` per regressor group
pub fn analyze(task: &TaskFile, scores: &ScoreFile) -> Result<Vec<AnalysisRow>> {
    let triplets = task.triplet_table()?;
    let mut rows = Vec::new();

    for level in task.levels() {
        let (start, end) = triplets.range(&level.key)?;
        let level_scores = scores.read_aligned(&level.key, end - start)?;
        let refs = task.triplet_refs(&level.key)?;

        let mut sums = vec![(0.0f64, 0u64); level.groups.len()];
        for (r, &s) in refs.iter().zip(level_scores.iter()) {
            let slot = sums.get_mut(r.group as usize).ok_or_else(|| {
                Error::Storage(format!("by-level `{}` has no group {}", level.key, r.group))
            })?;
            slot.0 += outcome(s);
            slot.1 += 1;
        }

        for (label, (sum, n)) in level.groups.iter().zip(sums) {
            if n == 0 {
                continue;
            }
            rows.push(AnalysisRow {
                by_level: level.key.clone(),
                by: level.values.clone(),
                on_1: label.on_a.clone(),
                on_2: label.on_b.clone(),
                across: label.across.clone(),
                score: sum / n as f64,
                n,
            });
        }
    }

    info!("Analyzed {} group(s)", rows.len());
    Ok(rows)
}

/// Write rows as a tab-separated table with a header line
pub fn write_analysis<W: Write>(
    mut writer: W,
    manifest: &TaskManifest,
    rows: &[AnalysisRow],
) -> Result<()> {
    let mut header: Vec<String> = manifest.by.clone();
    header.push(format!("{}_1", manifest.on));
    header.push(format!("{}_2", manifest.on));
    header.extend(manifest.across.iter().cloned());
    header.push("score".to_string());
    header.push("n".to_string());
    writeln!(writer, "{}", header.join("\t"))?;

    for row in rows {
        let mut fields: Vec<String> = row.by.clone();
        fields.push(row.on_1.clone());
        fields.push(row.on_2.clone());
        fields.extend(row.across.iter().cloned());
        fields.push(row.score.to_string());
        fields.push(row.n.to_string());
        writeln!(writer, "{}", fields.join("\t"))?;
    }
    writer.flush()?;
    Ok(())
}

/// [`analyze`] then [`write_analysis`] into `output`
pub fn analyze_to_path(
    task: &TaskFile,
    scores: &ScoreFile,
    output: &Path,
) -> Result<Vec<AnalysisRow>> {
    let rows = analyze(task, scores)?;
    write_analysis(BufWriter::new(File::create(output)?), task.manifest(), &rows)?;
    Ok(rows)
}

/// Overall score: groups weigh equally within a by-level, by-levels weigh equally
pub fn summarize(rows: &[AnalysisRow]) -> Option<AnalysisSummary> {
    let mut levels: Vec<(&str, f64, usize)> = Vec::new();
    for row in rows {
        match levels.last_mut() {
            Some((key, sum, count)) if *key == row.by_level => {
                *sum += row.score;
                *count += 1;
            }
            _ => levels.push((row.by_level.as_str(), row.score, 1)),
        }
    }
    if levels.is_empty() {
        return None;
    }

    let total: f64 = levels.iter().map(|(_, sum, count)| sum / *count as f64).sum();
    let score = total / levels.len() as f64;
    Some(AnalysisSummary {
        score,
        nb_groups: rows.len(),
        nb_by_levels: levels.len(),
    })
}
