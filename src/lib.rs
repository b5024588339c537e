//! Commit-graph acceleration layer for a content-addressed object store.
//!
//! The commit-graph is an auxiliary, regenerable index that maps each
//! commit hash to an integer position in a compact binary file and
//! answers tree, parents, commit time, and generation number (longest
//! distance from a root) in O(1) from that position. A revision walk
//! backed by the graph skips hash lookups and raw header parsing
//! entirely, and behaves identically when the graph is missing, stale,
//! or disabled.

pub mod config;
pub mod error;
pub mod file;
pub mod model;
pub mod odb;
pub mod progress;
pub mod reader;
pub mod store;
pub mod walk;
pub mod writer;

pub use crate::config::Config;
pub use crate::error::{GraphError, Result};
pub use crate::model::{
    CommitData, CommitObject, GraphPos, ObjectId, GENERATION_MAX, GENERATION_UNKNOWN,
};
pub use crate::odb::{MemoryStore, ObjectSource};
pub use crate::progress::{NoProgress, ProgressMonitor};
pub use crate::reader::CommitGraph;
pub use crate::store::{CommitGraphStore, COMMIT_GRAPH_FILE};
pub use crate::walk::{RevFilter, RevWalk, Sort, WalkedCommit};
pub use crate::writer::{CommitGraphWriter, GraphCommits, WriteStats};
