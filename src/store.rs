use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{GraphError, Result};
use crate::model::ObjectId;
use crate::odb::ObjectSource;
use crate::progress::ProgressMonitor;
use crate::reader::CommitGraph;
use crate::writer::{CommitGraphWriter, GraphCommits, WriteStats};

/// File name of the commit-graph, kept next to the pack indexes' metadata.
pub const COMMIT_GRAPH_FILE: &str = "commit-graph";

/// Owns the on-disk location and lifecycle of a repository's commit-graph.
///
/// The file is written once and replaced wholesale: a rewrite lands in a
/// temporary file in the same directory and is renamed over the final
/// path, so readers either see the previous complete file or the new one,
/// never a partial write. Readers opened before a rewrite keep observing
/// their snapshot.
pub struct CommitGraphStore {
    path: PathBuf,
    config: Config,
}

impl CommitGraphStore {
    /// `info_dir` is the metadata directory the graph file lives in.
    pub fn new(info_dir: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            path: info_dir.into().join(COMMIT_GRAPH_FILE),
            config,
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.path
    }

    /// Opens the current graph file.
    ///
    /// `None` when reading is disabled by configuration, the file does not
    /// exist, or it fails validation; callers treat all three the same way
    /// and fall back to raw object parsing.
    pub fn read(&self) -> Option<CommitGraph> {
        if !self.config.read_commit_graph {
            return None;
        }
        match CommitGraph::open(&self.path) {
            Ok(graph) => Some(graph),
            Err(GraphError::Io(err)) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => {
                warn!(path = %self.path.display(), %err, "ignoring unreadable commit-graph");
                None
            }
        }
    }

    /// Regenerates the graph for the commits reachable from `wants`.
    ///
    /// An empty want-set removes the file instead: a repository with
    /// nothing packed keeps no orphan index around. Returns `None` when
    /// writing is disabled or nothing was written.
    pub fn rewrite(
        &self,
        source: &impl ObjectSource,
        wants: &[ObjectId],
        progress: &mut dyn ProgressMonitor,
    ) -> Result<Option<WriteStats>> {
        if !self.config.write_commit_graph {
            debug!("commit-graph writing disabled, skipping rewrite");
            return Ok(None);
        }
        if wants.is_empty() {
            self.remove()?;
            return Ok(None);
        }

        let commits = GraphCommits::collect(source, wants, progress)?;
        let dir = self
            .path
            .parent()
            .ok_or_else(|| GraphError::InvalidArgument("graph path has no parent".into()))?;
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        let stats = {
            let mut out = BufWriter::new(tmp.as_file_mut());
            let stats = CommitGraphWriter::new(&commits).write(progress, &mut out)?;
            out.flush()?;
            stats
        };
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|err| err.error)?;

        info!(
            path = %self.path.display(),
            commits = stats.commit_count,
            bytes = stats.bytes_written,
            "commit-graph rewritten"
        );
        Ok(Some(stats))
    }

    /// Deletes the graph file if present.
    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "commit-graph removed");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
