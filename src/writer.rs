use std::collections::HashMap;
use std::io::Write;

use sha1::{Digest, Sha1};
use tracing::debug;

use crate::error::{GraphError, Result};
use crate::file::chunk::ChunkDirectoryBuilder;
use crate::file::{
    pack_generation_time, CHUNK_DATA, CHUNK_EXTRA_EDGES, CHUNK_FANOUT, CHUNK_LOOKUP,
    COMMIT_DATA_WIDTH, COMMIT_TIME_MASK, EDGE_ENTRY_LEN, EXTRA_EDGE_MASK, FANOUT_LEN,
    HASH_KIND_SHA1, HEADER_LEN, MAGIC, NO_PARENT, VERSION,
};
use crate::model::{
    CommitObject, GraphPos, ObjectId, GENERATION_MAX, GENERATION_UNKNOWN, OBJECT_ID_LEN,
};
use crate::odb::ObjectSource;
use crate::progress::ProgressMonitor;

/// The reachable closure of a want-set: commits loaded from the object
/// database, ordered lexicographically (fixing each commit's position) and
/// annotated with generation numbers.
pub struct GraphCommits {
    ids: Vec<ObjectId>,
    commits: Vec<CommitObject>,
    positions: HashMap<ObjectId, GraphPos>,
    generations: Vec<u32>,
    extra_edge_entries: usize,
}

impl GraphCommits {
    /// Walks backwards from `wants`, loading every reachable commit.
    ///
    /// A wanted commit or any ancestor missing from `source` fails the
    /// whole collection; commit times must fit the on-disk 34-bit field.
    pub fn collect(
        source: &impl ObjectSource,
        wants: &[ObjectId],
        progress: &mut dyn ProgressMonitor,
    ) -> Result<Self> {
        if wants.is_empty() {
            return Err(GraphError::InvalidArgument(
                "want-set must not be empty".into(),
            ));
        }
        progress.begin_task("Finding commits for commit graph", 0);

        let mut loaded: HashMap<ObjectId, CommitObject> = HashMap::new();
        let mut pending: Vec<ObjectId> = wants.to_vec();
        while let Some(id) = pending.pop() {
            if progress.is_cancelled() {
                return Err(GraphError::Cancelled);
            }
            if loaded.contains_key(&id) {
                continue;
            }
            let commit = source.read_commit(&id)?;
            if commit.commit_time < 0 || commit.commit_time as u64 > COMMIT_TIME_MASK {
                return Err(GraphError::InvalidArgument(format!(
                    "commit time {} of {} does not fit the 34-bit field",
                    commit.commit_time, id
                )));
            }
            pending.extend(commit.parents.iter().copied());
            loaded.insert(id, commit);
            progress.update(1);
        }

        let mut ids: Vec<ObjectId> = loaded.keys().copied().collect();
        ids.sort_unstable();
        let positions: HashMap<ObjectId, GraphPos> = ids
            .iter()
            .enumerate()
            .map(|(pos, id)| (*id, pos as GraphPos))
            .collect();
        let commits: Vec<CommitObject> = ids
            .iter()
            .map(|id| loaded.remove(id).expect("id came from the map"))
            .collect();

        let extra_edge_entries = commits
            .iter()
            .filter(|c| c.parents.len() > 2)
            .map(|c| c.parents.len() - 1)
            .sum();

        let mut graph = Self {
            ids,
            commits,
            positions,
            generations: Vec::new(),
            extra_edge_entries,
        };
        graph.assign_generations(progress)?;
        debug!(
            commits = graph.ids.len(),
            extra_edges = graph.extra_edge_entries,
            "collected commit graph"
        );
        Ok(graph)
    }

    /// Computes generation numbers: roots get 1, every other commit gets
    /// one more than its highest parent. Iterative so arbitrarily long
    /// chains cannot overflow the call stack.
    fn assign_generations(&mut self, progress: &mut dyn ProgressMonitor) -> Result<()> {
        let count = self.ids.len();
        progress.begin_task("Computing commit graph generation numbers", count);

        let mut generations = vec![GENERATION_UNKNOWN; count];
        let mut stack: Vec<usize> = Vec::new();
        for start in 0..count {
            if progress.is_cancelled() {
                return Err(GraphError::Cancelled);
            }
            if generations[start] != GENERATION_UNKNOWN {
                progress.update(1);
                continue;
            }
            stack.push(start);
            while let Some(&pos) = stack.last() {
                if generations[pos] != GENERATION_UNKNOWN {
                    stack.pop();
                    continue;
                }
                let mut highest = 0;
                let mut ready = true;
                for parent in &self.commits[pos].parents {
                    let parent_pos = self.position_of(parent)? as usize;
                    let generation = generations[parent_pos];
                    if generation == GENERATION_UNKNOWN {
                        stack.push(parent_pos);
                        ready = false;
                    } else {
                        highest = highest.max(generation);
                    }
                }
                if ready {
                    generations[pos] = (highest + 1).min(GENERATION_MAX);
                    stack.pop();
                }
            }
            progress.update(1);
        }
        self.generations = generations;
        Ok(())
    }

    fn position_of(&self, id: &ObjectId) -> Result<GraphPos> {
        self.positions
            .get(id)
            .copied()
            .ok_or(GraphError::MissingObject(*id))
    }

    pub fn commit_count(&self) -> usize {
        self.ids.len()
    }

    pub fn ids(&self) -> &[ObjectId] {
        &self.ids
    }

    pub fn generation_at(&self, pos: GraphPos) -> u32 {
        self.generations[pos as usize]
    }
}

/// Byte totals of a completed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteStats {
    pub commit_count: usize,
    pub extra_edge_entries: usize,
    pub bytes_written: u64,
}

/// Serializes a [`GraphCommits`] set into the chunked file format in one
/// sequential pass. Output bytes are a pure function of the commit set.
pub struct CommitGraphWriter<'a> {
    commits: &'a GraphCommits,
}

impl<'a> CommitGraphWriter<'a> {
    pub fn new(commits: &'a GraphCommits) -> Self {
        Self { commits }
    }

    pub fn write<W: Write>(
        &self,
        progress: &mut dyn ProgressMonitor,
        out: W,
    ) -> Result<WriteStats> {
        let count = self.commits.commit_count();
        let extra_entries = self.commits.extra_edge_entries;

        let mut directory = ChunkDirectoryBuilder::default();
        directory.push(CHUNK_FANOUT, FANOUT_LEN as u64);
        directory.push(CHUNK_LOOKUP, (count * OBJECT_ID_LEN) as u64);
        directory.push(CHUNK_DATA, (count * COMMIT_DATA_WIDTH) as u64);
        if extra_entries > 0 {
            directory.push(CHUNK_EXTRA_EDGES, (extra_entries * EDGE_ENTRY_LEN) as u64);
        }

        let mut hashed = HashingWriter::new(out);

        let mut header = [0u8; HEADER_LEN];
        header[..4].copy_from_slice(&MAGIC);
        header[4] = VERSION;
        header[5] = HASH_KIND_SHA1;
        header[6] = 0;
        header[7] = directory.chunk_count() as u8;
        hashed.write_all(&header)?;
        hashed.write_all(&directory.to_bytes())?;

        progress.begin_task("Writing commit graph", count * 2);
        self.write_fanout(&mut hashed)?;
        self.write_lookup(progress, &mut hashed)?;
        self.write_commit_data(progress, &mut hashed)?;

        let stats = WriteStats {
            commit_count: count,
            extra_edge_entries: extra_entries,
            bytes_written: hashed.finish()?,
        };
        debug!(
            commits = stats.commit_count,
            bytes = stats.bytes_written,
            "commit graph serialized"
        );
        Ok(stats)
    }

    fn write_fanout<W: Write>(&self, out: &mut HashingWriter<W>) -> Result<()> {
        let mut counts = [0u32; 256];
        for id in self.commits.ids() {
            counts[id.first_byte() as usize] += 1;
        }
        let mut cumulative = 0u32;
        for count in counts {
            cumulative += count;
            out.write_all(&cumulative.to_be_bytes())?;
        }
        Ok(())
    }

    fn write_lookup<W: Write>(
        &self,
        progress: &mut dyn ProgressMonitor,
        out: &mut HashingWriter<W>,
    ) -> Result<()> {
        for id in self.commits.ids() {
            if progress.is_cancelled() {
                return Err(GraphError::Cancelled);
            }
            out.write_all(id.as_bytes())?;
            progress.update(1);
        }
        Ok(())
    }

    fn write_commit_data<W: Write>(
        &self,
        progress: &mut dyn ProgressMonitor,
        out: &mut HashingWriter<W>,
    ) -> Result<()> {
        let mut edges: Vec<u32> = Vec::with_capacity(self.commits.extra_edge_entries);
        for (pos, commit) in self.commits.commits.iter().enumerate() {
            if progress.is_cancelled() {
                return Err(GraphError::Cancelled);
            }

            out.write_all(commit.tree.as_bytes())?;

            let parents: Vec<GraphPos> = commit
                .parents
                .iter()
                .map(|id| self.commits.position_of(id))
                .collect::<Result<_>>()?;
            let (slot1, slot2) = match parents.len() {
                0 => (NO_PARENT, NO_PARENT),
                1 => (parents[0], NO_PARENT),
                2 => (parents[0], parents[1]),
                _ => {
                    let offset = edges.len() as u32;
                    for (i, &parent) in parents[1..].iter().enumerate() {
                        let last = i == parents.len() - 2;
                        edges.push(if last { parent | EXTRA_EDGE_MASK } else { parent });
                    }
                    (parents[0], EXTRA_EDGE_MASK | offset)
                }
            };
            out.write_all(&slot1.to_be_bytes())?;
            out.write_all(&slot2.to_be_bytes())?;

            let packed = pack_generation_time(
                self.commits.generation_at(pos as GraphPos),
                commit.commit_time,
            );
            out.write_all(&packed.to_be_bytes())?;
            progress.update(1);
        }

        for entry in edges {
            out.write_all(&entry.to_be_bytes())?;
        }
        Ok(())
    }
}

/// Write-through adapter maintaining the rolling content hash; `finish`
/// appends the digest as the file's trailing checksum.
struct HashingWriter<W: Write> {
    inner: W,
    hasher: Sha1,
    bytes: u64,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha1::new(),
            bytes: 0,
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.inner.write_all(buf)?;
        self.hasher.update(buf);
        self.bytes += buf.len() as u64;
        Ok(())
    }

    fn finish(mut self) -> Result<u64> {
        let digest = self.hasher.finalize();
        self.inner.write_all(&digest)?;
        self.inner.flush()?;
        Ok(self.bytes + digest.len() as u64)
    }
}
