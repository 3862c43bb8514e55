//! Triplet and pair generation
//!
//! Expands the cell triples of every regressor group into item triplets and
//! streams them to a [`TripletSink`], one by-level at a time. Each triplet
//! registers its (A, X) and (B, X) pairs in the by-level's [`PairRegistry`],
//! so every pair whose distance is needed is listed exactly once.

use crate::block::{ByLevel, Group, LocalId};
use crate::task::Task;
use crate::{Error, Result};
use ahash::AHashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateOptions {
    /// Upper bound on the number of triplets kept per regressor group
    pub threshold: Option<usize>,
}

impl GenerateOptions {
    pub fn with_threshold(threshold: usize) -> Self {
        Self {
            threshold: Some(threshold),
        }
    }
}

/// One ABX triplet, in local ids of its by-level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Triplet {
    pub a: LocalId,
    pub b: LocalId,
    pub x: LocalId,
    /// Pair id of (A, X)
    pub pair_ax: u64,
    /// Pair id of (B, X)
    pub pair_bx: u64,
    /// Index of the regressor group in [`ByLevel::groups`]
    pub group: u32,
}

impl Triplet {
    #[inline]
    pub fn items(&self) -> [LocalId; 3] {
        [self.a, self.b, self.x]
    }
}

/// Unordered pairs of one by-level, with ids in order of first registration
#[derive(Debug, Clone, Default)]
pub struct PairRegistry {
    ids: AHashMap<(LocalId, LocalId), u64>,
    pairs: Vec<(LocalId, LocalId)>,
}

impl PairRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the pair {i, j}, registering it on first sight
    pub fn register(&mut self, i: LocalId, j: LocalId) -> u64 {
        let key = if i <= j { (i, j) } else { (j, i) };
        let pairs = &mut self.pairs;
        *self.ids.entry(key).or_insert_with(|| {
            pairs.push(key);
            (pairs.len() - 1) as u64
        })
    }

    pub fn get(&self, i: LocalId, j: LocalId) -> Option<u64> {
        let key = if i <= j { (i, j) } else { (j, i) };
        self.ids.get(&key).copied()
    }

    /// Pairs as `(min, max)`, indexed by id
    #[inline]
    pub fn pairs(&self) -> &[(LocalId, LocalId)] {
        &self.pairs
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Receiver of generated triplets
pub trait TripletSink {
    fn begin_by_level(&mut self, level: &ByLevel) -> Result<()>;

    fn triplet(&mut self, triplet: &Triplet) -> Result<()>;

    /// `pairs` are the by-level's unique pairs, indexed by pair id
    fn end_by_level(&mut self, level: &ByLevel, pairs: &[(LocalId, LocalId)]) -> Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationSummary {
    pub nb_by_levels: usize,
    pub nb_triplets: u64,
    pub nb_pairs: u64,
}

/// Triplets and pairs of one by-level, kept in memory
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneratedLevel {
    pub key: String,
    pub triplets: Vec<Triplet>,
    pub pairs: Vec<(LocalId, LocalId)>,
}

/// Sink collecting everything in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    pub levels: Vec<GeneratedLevel>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(&self, key: &str) -> Option<&GeneratedLevel> {
        self.levels.iter().find(|l| l.key == key)
    }
}

impl TripletSink for MemorySink {
    fn begin_by_level(&mut self, level: &ByLevel) -> Result<()> {
        self.levels.push(GeneratedLevel {
            key: level.key().to_string(),
            ..Default::default()
        });
        Ok(())
    }

    fn triplet(&mut self, triplet: &Triplet) -> Result<()> {
        let level = self
            .levels
            .last_mut()
            .ok_or_else(|| Error::InvalidConfig("triplet outside of a by-level".to_string()))?;
        level.triplets.push(*triplet);
        Ok(())
    }

    fn end_by_level(&mut self, _level: &ByLevel, pairs: &[(LocalId, LocalId)]) -> Result<()> {
        if let Some(level) = self.levels.last_mut() {
            level.pairs = pairs.to_vec();
        }
        Ok(())
    }
}

/// Ordinals of the triplets kept in a group, ascending; `None` keeps all
fn sample_ordinals<R: Rng + ?Sized>(
    count: u64,
    threshold: Option<usize>,
    rng: &mut R,
) -> Option<Vec<u64>> {
    let t = threshold?;
    if count <= t as u64 {
        return None;
    }
    let mut kept: Vec<u64> = rand::seq::index::sample(rng, count as usize, t)
        .into_iter()
        .map(|i| i as u64)
        .collect();
    kept.sort_unstable();
    Some(kept)
}

/// Walks one group's triplets in a fixed order, emitting the selected ordinals
fn expand_group<F>(level: &ByLevel, group: &Group, kept: Option<&[u64]>, mut emit: F) -> Result<()>
where
    F: FnMut(LocalId, LocalId, LocalId) -> Result<()>,
{
    let cells = level.cells();
    let mut ordinal = 0u64;
    let mut next = 0usize;

    for triple in &group.triples {
        let (ca, cb, cx) = (&cells[triple.a], &cells[triple.b], &cells[triple.x]);
        if let Some(kept) = kept {
            // Skip whole cell triples holding no selected ordinal
            let end = ordinal + triple.count;
            if next >= kept.len() || kept[next] >= end {
                ordinal = end;
                continue;
            }
        }

        for &a in &ca.items {
            for &x in cx.items.iter().filter(|&&x| x != a) {
                for &b in &cb.items {
                    let selected = match kept {
                        None => true,
                        Some(kept) if next < kept.len() && kept[next] == ordinal => {
                            next += 1;
                            true
                        }
                        Some(_) => false,
                    };
                    if selected {
                        emit(a, b, x)?;
                    }
                    ordinal += 1;
                }
            }
        }
    }
    Ok(())
}

impl Task {
    /// Generate every triplet, optionally capped per regressor group, into `sink`
    pub fn generate<S, R>(
        &self,
        sink: &mut S,
        options: &GenerateOptions,
        rng: &mut R,
    ) -> Result<GenerationSummary>
    where
        S: TripletSink + ?Sized,
        R: Rng + ?Sized,
    {
        if options.threshold == Some(0) {
            return Err(Error::InvalidConfig("threshold must be positive".to_string()));
        }

        let mut summary = GenerationSummary::default();
        for level in self.by_levels() {
            sink.begin_by_level(level)?;

            let mut registry = PairRegistry::new();
            let mut nb_triplets = 0u64;
            for (g, group) in level.groups().iter().enumerate() {
                let kept = sample_ordinals(group.count, options.threshold, rng);
                expand_group(level, group, kept.as_deref(), |a, b, x| {
                    let triplet = Triplet {
                        a,
                        b,
                        x,
                        pair_ax: registry.register(a, x),
                        pair_bx: registry.register(b, x),
                        group: g as u32,
                    };
                    nb_triplets += 1;
                    sink.triplet(&triplet)
                })?;
            }

            sink.end_by_level(level, registry.pairs())?;
            debug!(
                "By-level {}: {} triplet(s), {} pair(s)",
                level.key(),
                nb_triplets,
                registry.len()
            );

            summary.nb_by_levels += 1;
            summary.nb_triplets += nb_triplets;
            summary.nb_pairs += registry.len() as u64;
        }

        info!(
            "Generated {} triplet(s) and {} pair(s) over {} by-level(s)",
            summary.nb_triplets, summary.nb_pairs, summary.nb_by_levels
        );
        Ok(summary)
    }

    /// All triplets of one by-level, without threshold
    pub fn triplets(&self, key: &str) -> Result<Vec<Triplet>> {
        let level = self.by_level(key)?;
        let mut registry = PairRegistry::new();
        let mut triplets = Vec::with_capacity(level.triplet_count() as usize);

        for (g, group) in level.groups().iter().enumerate() {
            expand_group(level, group, None, |a, b, x| {
                triplets.push(Triplet {
                    a,
                    b,
                    x,
                    pair_ax: registry.register(a, x),
                    pair_bx: registry.register(b, x),
                    group: g as u32,
                });
                Ok(())
            })?;
        }
        Ok(triplets)
    }
}
