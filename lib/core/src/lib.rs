//! # abx Core
//!
//! Core library for ABX discrimination tasks.
//!
//! This crate provides the task model and the triplet generator:
//!
//! - [`ItemTable`] - Items with named categorical attributes
//! - [`AttributeIndex`] - Dictionary-encoded attribute columns
//! - [`Filter`] - Compiled item and triplet filters
//! - [`Task`] - On/across/by configuration split into by-levels
//! - [`Stats`] - Closed-form triplet and block counts
//! - [`TripletSink`] - Receiver of generated triplets and pairs
//!
//! ## Example
//!
//! ```rust
//! use abx_core::{GenerateOptions, ItemTable, MemorySink, Task, TaskConfig};
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//!
//! // Every combination of three binary attributes c0, c1, c2
//! let items = ItemTable::product(2, 3);
//! let config = TaskConfig::new("c0").across(["c1"]).by(["c2"]);
//! let task = Task::new(items, config).unwrap();
//! assert_eq!(task.stats().nb_triplets, 8);
//!
//! // Generate
//! let mut sink = MemorySink::new();
//! let mut rng = StdRng::seed_from_u64(0);
//! task.generate(&mut sink, &GenerateOptions::default(), &mut rng).unwrap();
//! assert_eq!(sink.levels.len(), 2);
//! ```

pub mod block;
pub mod error;
pub mod filter;
pub mod generate;
pub mod index;
pub mod item;
pub mod stats;
pub mod task;

pub use block::{ByLevel, Cell, CellTriple, Group, GroupLabel, LocalId};
pub use error::{Error, Result};
pub use filter::{Bindings, Filter, FilterScope, Role};
pub use generate::{
    GenerateOptions, GeneratedLevel, GenerationSummary, MemorySink, PairRegistry, Triplet,
    TripletSink,
};
pub use index::{AttributeIndex, ValueCode, ValueTuple};
pub use item::{ItemId, ItemTable};
pub use stats::{ByLevelStats, Stats};
pub use task::{Task, TaskConfig};
