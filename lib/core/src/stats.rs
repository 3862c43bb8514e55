use crate::block::ByLevel;
use serde::{Deserialize, Serialize};

/// Counts for one by-level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByLevelStats {
    pub key: String,
    pub values: Vec<String>,
    pub nb_items: usize,
    /// Distinct full attribute tuples
    pub nb_blocks: usize,
    /// Cells the counting runs on
    pub nb_cells: usize,
    pub nb_on_values: usize,
    pub nb_groups: usize,
    pub nb_triplets: u64,
}

/// Task statistics, derived from cell cardinalities without generating triplets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Non-empty cells (distinct attribute tuples) over all by-levels
    pub nb_blocks: usize,
    /// Triplets after filters, before any threshold
    pub nb_triplets: u64,
    pub nb_by_levels: usize,
    /// Regressor groups holding at least one triplet
    pub nb_groups: usize,
    pub by_levels: Vec<ByLevelStats>,
}

impl Stats {
    pub fn from_levels(levels: &[ByLevel], on: usize) -> Self {
        let by_levels: Vec<ByLevelStats> = levels
            .iter()
            .map(|level| ByLevelStats {
                key: level.key().to_string(),
                values: level.values().to_vec(),
                nb_items: level.items().len(),
                nb_blocks: level.nb_tuples(),
                nb_cells: level.cells().len(),
                nb_on_values: level.on_values(on),
                nb_groups: level.groups().len(),
                nb_triplets: level.triplet_count(),
            })
            .collect();

        Self {
            nb_blocks: by_levels.iter().map(|s| s.nb_blocks).sum(),
            nb_triplets: by_levels.iter().map(|s| s.nb_triplets).sum(),
            nb_by_levels: by_levels.len(),
            nb_groups: by_levels.iter().map(|s| s.nb_groups).sum(),
            by_levels,
        }
    }

    /// By-levels that contribute no triplet at all
    pub fn empty_levels(&self) -> impl Iterator<Item = &ByLevelStats> {
        self.by_levels.iter().filter(|s| s.nb_triplets == 0)
    }
}

impl std::fmt::Display for Stats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "nb_by_levels: {}", self.nb_by_levels)?;
        writeln!(f, "nb_blocks: {}", self.nb_blocks)?;
        writeln!(f, "nb_groups: {}", self.nb_groups)?;
        write!(f, "nb_triplets: {}", self.nb_triplets)
    }
}
