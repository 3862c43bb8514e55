//! # abx Similarity
//!
//! Distances, scores and analysis for generated ABX tasks.
//!
//! ## Features
//!
//! - **Feature sources**: item id to feature sequence lookup, in memory or from JSON lines
//! - **Pair distances**: any closure, or DTW over a frame distance
//! - **Distance pipeline**: sequential or sharded over a rayon pool, output in pair order
//! - **Scoring**: one sign per triplet, X closer to A is correct
//! - **Analysis**: mean score per regressor group, written as a TSV table
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Task file  │────>│  Distances  │────>│   Scores    │────>│  Analysis   │
//! │ (triplets,  │     │ (one per    │     │ (one per    │     │ (one row    │
//! │   pairs)    │     │   pair)     │     │  triplet)   │     │  per group) │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//!                           ^
//!                     ┌─────────────┐
//!                     │  Features   │
//!                     └─────────────┘
//! ```

pub mod analyze;
pub mod distance;
pub mod features;
pub mod pipeline;
pub mod score;

pub use analyze::{
    analyze, analyze_to_path, summarize, write_analysis, AnalysisRow, AnalysisSummary,
};
pub use distance::{cosine_distance, euclidean_distance, Dtw, PairDistance};
pub use features::{FeatureSeq, FeatureSource, InMemoryFeatures, JsonLinesFeatures};
pub use pipeline::{compute_distances, DistanceConfig};
pub use score::{score, score_of};
