pub mod store;
pub mod task_file;
pub mod value_file;

pub use store::{
    Cell, CellType, RangeEntry, StoreReader, StoreWriter, TableDescriptor, TableReader, TableWriter,
};
pub use task_file::{LevelManifest, TaskFile, TaskFileWriter, TaskManifest, TripletRefs};
pub use value_file::{
    DistanceFile, DistanceFileWriter, Distances, ScoreFile, ScoreFileWriter, Scores, ValueFile,
    ValueFileWriter, ValueKind,
};
