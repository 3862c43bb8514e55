//! Flag grammar for task construction
//!
//! `db -o ON [-a ACROSS...]... [-b BY...]... [-f FILTER]... [-t THRESHOLD] [--seed N]`
//!
//! Repeated and multi-valued `-a`/`-b` flags accumulate in order.

use abx_core::{Error, GenerateOptions, Result, TaskConfig};
use abx_similarity::{Dtw, PairDistance};
use clap::{ArgAction, Args, Parser, ValueEnum};
use std::path::PathBuf;

/// Task definition over an item database
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct TaskArgs {
    /// Item database (whitespace-separated, header first)
    pub database: PathBuf,

    /// Attribute shared by A and X, not by B
    #[arg(short = 'o', long = "on")]
    pub on: String,

    /// Attributes shared by A and B, differing for X
    #[arg(short = 'a', long = "across", num_args = 1.., action = ArgAction::Append)]
    pub across: Vec<String>,

    /// Attributes defining independent by-levels
    #[arg(short = 'b', long = "by", num_args = 1.., action = ArgAction::Append)]
    pub by: Vec<String>,

    /// Filter expression, `_A`/`_B`/`_X` suffixes scope a column to a role
    #[arg(short = 'f', long = "filter", action = ArgAction::Append)]
    pub filters: Vec<String>,

    /// Maximum number of triplets kept per regressor group
    #[arg(short = 't', long)]
    pub threshold: Option<usize>,

    /// Seed of the sampling random source
    #[arg(long)]
    pub seed: Option<u64>,
}

impl TaskArgs {
    pub fn config(&self) -> TaskConfig {
        TaskConfig {
            on: self.on.clone(),
            across: self.across.clone(),
            by: self.by.clone(),
            filters: self.filters.clone(),
        }
    }

    pub fn options(&self) -> GenerateOptions {
        GenerateOptions {
            threshold: self.threshold,
        }
    }
}

/// Parse a task command line
///
/// The line is split on whitespace only: quotes are kept as part of the
/// values and a filter cannot contain spaces.
pub fn task_parser(cmdline: &str) -> Result<TaskArgs> {
    let argv = std::iter::once("task").chain(cmdline.split_whitespace());
    TaskArgs::try_parse_from(argv).map_err(|e| Error::InvalidConfig(e.to_string()))
}

/// Pair distances available from the command line
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Metric {
    /// DTW over the angular frame distance
    #[default]
    DtwCosine,
    /// DTW over the euclidean frame distance
    DtwEuclidean,
}

impl Metric {
    pub fn distance(self) -> impl PairDistance {
        match self {
            Metric::DtwCosine => Dtw::cosine(),
            Metric::DtwEuclidean => Dtw::euclidean(),
        }
    }
}

/// Distance pipeline settings
#[derive(Args, Debug, Clone, PartialEq)]
pub struct DistanceArgs {
    #[arg(long, value_enum, default_value_t = Metric::DtwCosine)]
    pub metric: Metric,

    /// Worker threads, 1 computes on the calling thread
    #[arg(short = 'j', long = "workers", default_value_t = 1)]
    pub n_workers: usize,

    /// Pairs per worker shard
    #[arg(long, default_value_t = 1024)]
    pub shard_size: usize,
}

impl DistanceArgs {
    pub fn config(&self) -> abx_similarity::DistanceConfig {
        abx_similarity::DistanceConfig {
            n_workers: self.n_workers,
            shard_size: self.shard_size,
        }
    }
}
