//! # abx
//!
//! ABX discrimination tasks: triplet generation, distances, scores and analysis.
//!
//! Given items labelled with categorical attributes, a task lists every
//! (A, B, X) triplet where A and X share the "on" attribute and B does not,
//! A and B share the "across" attributes while X differs on all of them, and
//! all three share the "by" attributes. A distance between feature sequences
//! then tells, for each triplet, whether X is closer to A than to B.
//!
//! ## Quick Start
//!
//! ### From the command line
//!
//! ```bash
//! abx task items.txt -o phone -a speaker -b context --output task.abx
//! abx distance task.abx features.jsonl distances.abx --workers 8
//! abx score task.abx distances.abx scores.abx
//! abx analyze task.abx scores.abx results.tsv
//! ```
//!
//! ### As a Library
//!
//! ```rust,no_run
//! use abx::prelude::*;
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//! use std::path::Path;
//!
//! let items = ItemTable::from_path("items.txt").unwrap();
//! let task = Task::new(items, TaskConfig::new("phone").across(["speaker"])).unwrap();
//! println!("{}", task.stats());
//!
//! // Generate and persist
//! let mut rng = StdRng::seed_from_u64(0);
//! TaskFile::write("task.abx", &task, &GenerateOptions::default(), &mut rng, Some(0)).unwrap();
//!
//! // Distances, scores, analysis
//! let task = TaskFile::open("task.abx").unwrap();
//! let features = JsonLinesFeatures::from_path("features.jsonl").unwrap();
//! let config = DistanceConfig::default();
//! compute_distances(&features, &task, Path::new("d.abx"), &Dtw::cosine(), &config).unwrap();
//! score(&task, &DistanceFile::open("d.abx").unwrap(), Path::new("s.abx")).unwrap();
//! let rows = analyze(&task, &ScoreFile::open("s.abx").unwrap()).unwrap();
//! ```
//!
//! ## Crate Structure
//!
//! - `abx-core` - Item tables, filters, by-levels, stats and triplet generation
//! - `abx-storage` - Range-indexed task, distance and score files
//! - `abx-similarity` - Features, pair distances, scoring and analysis

pub mod cli;

// Re-export core types
pub use abx_core::{
    ByLevel, Error, Filter, GenerateOptions, GenerationSummary, ItemTable, MemorySink, Result,
    Stats, Task, TaskConfig, Triplet, TripletSink,
};

// Re-export storage
pub use abx_storage::{DistanceFile, ScoreFile, TaskFile, TaskManifest};

// Re-export similarity
pub use abx_similarity::{
    analyze, compute_distances, score, summarize, AnalysisRow, DistanceConfig, Dtw, FeatureSeq,
    FeatureSource, InMemoryFeatures, JsonLinesFeatures, PairDistance,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        analyze, compute_distances, score, summarize, AnalysisRow, ByLevel, DistanceConfig,
        DistanceFile, Dtw, Error, FeatureSeq, FeatureSource, GenerateOptions, InMemoryFeatures,
        ItemTable, JsonLinesFeatures, MemorySink, PairDistance, Result, ScoreFile, Stats, Task,
        TaskConfig, TaskFile,
    };
}
