use std::cmp::Ordering;
use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use sha1::{Digest, Sha1};
use smallvec::SmallVec;

use crate::error::{GraphError, Result};
use crate::file::chunk::{ChunkDirectory, ChunkEntry};
use crate::file::{
    unpack_commit_time, unpack_generation, CHECKSUM_LEN, CHUNK_DATA, CHUNK_EXTRA_EDGES,
    CHUNK_FANOUT, CHUNK_LOOKUP, COMMIT_DATA_WIDTH, DIRECTORY_ENTRY_LEN, EDGE_ENTRY_LEN,
    EXTRA_EDGE_MASK, FANOUT_LEN, HASH_KIND_SHA1, HEADER_LEN, MAGIC, NO_PARENT, VERSION,
};
use crate::model::{CommitData, GraphPos, ObjectId, OBJECT_ID_LEN};

enum Backing {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Backing {
    fn bytes(&self) -> &[u8] {
        match self {
            Backing::Mapped(map) => map,
            Backing::Owned(buf) => buf,
        }
    }
}

/// Immutable, validated view of one commit-graph file.
///
/// All structural validation happens at open time; the query methods never
/// fail, they return `None` for unknown hashes and out-of-range positions.
/// The reader holds no interior mutability and is safe to share across
/// threads.
pub struct CommitGraph {
    backing: Backing,
    fanout: ChunkEntry,
    lookup: ChunkEntry,
    data: ChunkEntry,
    extra_edges: Option<ChunkEntry>,
    commit_count: usize,
}

impl CommitGraph {
    /// Maps the file at `path` and validates it.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let map = unsafe { Mmap::map(&file)? };
        Self::load(Backing::Mapped(map))
    }

    /// Validates an in-memory copy of a graph file.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::load(Backing::Owned(bytes))
    }

    fn load(backing: Backing) -> Result<Self> {
        let data = backing.bytes();
        if data.len() < HEADER_LEN + DIRECTORY_ENTRY_LEN + CHECKSUM_LEN {
            return Err(GraphError::Corrupt("file too short for header".into()));
        }
        if data[..4] != MAGIC {
            return Err(GraphError::Corrupt("bad magic".into()));
        }
        if data[4] != VERSION {
            return Err(GraphError::UnsupportedVersion(data[4]));
        }
        if data[5] != HASH_KIND_SHA1 {
            return Err(GraphError::Corrupt(format!(
                "unsupported hash kind {}",
                data[5]
            )));
        }
        let chunk_count = data[7] as usize;

        let body_len = data.len() - CHECKSUM_LEN;
        let digest = Sha1::digest(&data[..body_len]);
        if digest.as_slice() != &data[body_len..] {
            return Err(GraphError::ChecksumMismatch);
        }

        let directory = ChunkDirectory::parse(data, chunk_count)?;
        let fanout = directory.require(CHUNK_FANOUT)?;
        let lookup = directory.require(CHUNK_LOOKUP)?;
        let cdat = directory.require(CHUNK_DATA)?;
        let extra_edges = directory.find(CHUNK_EXTRA_EDGES);

        if fanout.len() != FANOUT_LEN {
            return Err(GraphError::Corrupt(format!(
                "fanout chunk is {} bytes, expected {}",
                fanout.len(),
                FANOUT_LEN
            )));
        }
        let mut prev = 0u32;
        for i in 0..256 {
            let at = fanout.start + i * 4;
            let count = u32::from_be_bytes(data[at..at + 4].try_into().expect("slice is 4 bytes"));
            if count < prev {
                return Err(GraphError::Corrupt("fanout not monotonic".into()));
            }
            prev = count;
        }
        let commit_count = prev as usize;

        if lookup.len() != commit_count * OBJECT_ID_LEN {
            return Err(GraphError::Corrupt(format!(
                "lookup chunk is {} bytes for {} commits",
                lookup.len(),
                commit_count
            )));
        }
        for pos in 1..commit_count {
            let prev_id = &data[lookup.start + (pos - 1) * OBJECT_ID_LEN..][..OBJECT_ID_LEN];
            let this_id = &data[lookup.start + pos * OBJECT_ID_LEN..][..OBJECT_ID_LEN];
            if prev_id >= this_id {
                return Err(GraphError::Corrupt("hash lookup not ascending".into()));
            }
        }

        if cdat.len() != commit_count * COMMIT_DATA_WIDTH {
            return Err(GraphError::Corrupt(format!(
                "commit data chunk is {} bytes for {} commits",
                cdat.len(),
                commit_count
            )));
        }
        if let Some(edges) = extra_edges {
            if edges.len() % EDGE_ENTRY_LEN != 0 {
                return Err(GraphError::Corrupt(
                    "extra-edge chunk not a multiple of 4 bytes".into(),
                ));
            }
        }

        Ok(Self {
            backing,
            fanout,
            lookup,
            data: cdat,
            extra_edges,
            commit_count,
        })
    }

    pub fn commit_count(&self) -> usize {
        self.commit_count
    }

    fn fanout_at(&self, index: usize) -> u32 {
        let at = self.fanout.start + index * 4;
        let bytes = &self.backing.bytes()[at..at + 4];
        u32::from_be_bytes(bytes.try_into().expect("slice is 4 bytes"))
    }

    fn id_bytes_at(&self, pos: usize) -> &[u8] {
        let at = self.lookup.start + pos * OBJECT_ID_LEN;
        &self.backing.bytes()[at..at + OBJECT_ID_LEN]
    }

    /// Finds the graph position of `id`, if it is indexed in this file.
    pub fn position_of(&self, id: &ObjectId) -> Option<GraphPos> {
        let first = id.first_byte() as usize;
        let mut lo = if first == 0 {
            0
        } else {
            self.fanout_at(first - 1) as usize
        };
        let mut hi = self.fanout_at(first) as usize;
        let wanted: &[u8] = id.as_bytes();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.id_bytes_at(mid).cmp(wanted) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Some(mid as GraphPos),
            }
        }
        None
    }

    /// Returns the hash at `pos`, or `None` when `pos` is out of range.
    pub fn id_at(&self, pos: GraphPos) -> Option<ObjectId> {
        if (pos as usize) >= self.commit_count {
            return None;
        }
        Some(ObjectId::from_slice(self.id_bytes_at(pos as usize)).expect("slice is 20 bytes"))
    }

    /// Decodes the commit record at `pos`.
    ///
    /// `None` for out-of-range positions, and for records whose parent
    /// encoding points outside the file (only possible in a file this
    /// reader did not validate end to end, since parent closure is a
    /// writer invariant).
    pub fn commit_data_at(&self, pos: GraphPos) -> Option<CommitData> {
        if (pos as usize) >= self.commit_count {
            return None;
        }
        let bytes = self.backing.bytes();
        let at = self.data.start + pos as usize * COMMIT_DATA_WIDTH;
        let record = &bytes[at..at + COMMIT_DATA_WIDTH];

        let tree = ObjectId::from_slice(&record[..OBJECT_ID_LEN]).expect("slice is 20 bytes");
        let slot1 = u32::from_be_bytes(record[20..24].try_into().expect("slice is 4 bytes"));
        let slot2 = u32::from_be_bytes(record[24..28].try_into().expect("slice is 4 bytes"));
        let packed = u64::from_be_bytes(record[28..36].try_into().expect("slice is 8 bytes"));

        let mut parents: SmallVec<[GraphPos; 2]> = SmallVec::new();
        if slot1 != NO_PARENT {
            if slot1 & EXTRA_EDGE_MASK != 0 || slot1 as usize >= self.commit_count {
                return None;
            }
            parents.push(slot1);
        }
        if slot2 != NO_PARENT {
            if slot2 & EXTRA_EDGE_MASK != 0 {
                let edges = self.extra_edges?;
                let mut offset = (slot2 & !EXTRA_EDGE_MASK) as usize;
                loop {
                    let at = edges.start + offset * EDGE_ENTRY_LEN;
                    if at + EDGE_ENTRY_LEN > edges.end {
                        return None;
                    }
                    let entry =
                        u32::from_be_bytes(bytes[at..at + 4].try_into().expect("slice is 4 bytes"));
                    let parent = entry & !EXTRA_EDGE_MASK;
                    if parent as usize >= self.commit_count {
                        return None;
                    }
                    parents.push(parent);
                    if entry & EXTRA_EDGE_MASK != 0 {
                        break;
                    }
                    offset += 1;
                }
            } else {
                if slot2 as usize >= self.commit_count {
                    return None;
                }
                parents.push(slot2);
            }
        }

        Some(CommitData {
            tree,
            parents,
            commit_time: unpack_commit_time(packed),
            generation: unpack_generation(packed),
        })
    }
}
