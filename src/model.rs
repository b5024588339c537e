use std::fmt;

use sha1::{Digest, Sha1};
use smallvec::SmallVec;

use crate::error::{GraphError, Result};

pub const OBJECT_ID_LEN: usize = 20;

/// Generation number of a commit whose ancestry is not fully known.
pub const GENERATION_UNKNOWN: u32 = 0;

/// Largest generation number the packed on-disk field can carry.
pub const GENERATION_MAX: u32 = (1 << 30) - 1;

/// 20-byte content address of an object, ordered lexicographically.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId([u8; OBJECT_ID_LEN]);

impl ObjectId {
    pub const fn from_bytes(bytes: [u8; OBJECT_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; OBJECT_ID_LEN] = bytes
            .try_into()
            .map_err(|_| GraphError::InvalidArgument("object id must be 20 bytes".into()))?;
        Ok(Self(arr))
    }

    pub fn from_hex(hex: &str) -> Result<Self> {
        let bytes = hex.as_bytes();
        if bytes.len() != OBJECT_ID_LEN * 2 {
            return Err(GraphError::InvalidArgument(
                "object id hex must be 40 characters".into(),
            ));
        }
        let mut out = [0u8; OBJECT_ID_LEN];
        for (i, pair) in bytes.chunks_exact(2).enumerate() {
            let hi = hex_nibble(pair[0])?;
            let lo = hex_nibble(pair[1])?;
            out[i] = (hi << 4) | lo;
        }
        Ok(Self(out))
    }

    pub fn as_bytes(&self) -> &[u8; OBJECT_ID_LEN] {
        &self.0
    }

    pub fn first_byte(&self) -> u8 {
        self.0[0]
    }

    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(OBJECT_ID_LEN * 2);
        for b in &self.0 {
            s.push(char::from_digit((b >> 4) as u32, 16).expect("nibble is < 16"));
            s.push(char::from_digit((b & 0xf) as u32, 16).expect("nibble is < 16"));
        }
        s
    }
}

fn hex_nibble(c: u8) -> Result<u8> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(GraphError::InvalidArgument(format!(
            "invalid hex digit {:?}",
            c as char
        ))),
    }
}

impl AsRef<[u8]> for ObjectId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

/// Position of a commit inside one graph file. Valid only for the file
/// instance it was obtained from.
pub type GraphPos = u32;

/// Metadata of one commit at a graph position.
///
/// `parents` holds graph positions, not object ids; resolve them through
/// [`crate::CommitGraph::id_at`]. A `generation` of [`GENERATION_UNKNOWN`]
/// means the file does not know the commit's distance from a root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitData {
    pub tree: ObjectId,
    pub parents: SmallVec<[GraphPos; 2]>,
    pub commit_time: i64,
    pub generation: u32,
}

impl CommitData {
    pub fn has_known_generation(&self) -> bool {
        self.generation != GENERATION_UNKNOWN
    }
}

/// A commit as stored in the object database.
///
/// The graph file never stores the message; it is carried here for the
/// raw-parse path and for filters that inspect commit bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitObject {
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
    pub commit_time: i64,
    pub message: String,
}

impl CommitObject {
    pub fn new(tree: ObjectId, parents: Vec<ObjectId>, commit_time: i64) -> Self {
        Self {
            tree,
            parents,
            commit_time,
            message: String::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Canonical byte encoding of the commit. The object id is the SHA-1
    /// of exactly these bytes.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64 + 48 * self.parents.len() + self.message.len());
        buf.extend_from_slice(b"tree ");
        buf.extend_from_slice(self.tree.to_hex().as_bytes());
        buf.push(b'\n');
        for parent in &self.parents {
            buf.extend_from_slice(b"parent ");
            buf.extend_from_slice(parent.to_hex().as_bytes());
            buf.push(b'\n');
        }
        buf.extend_from_slice(b"committer ");
        buf.extend_from_slice(self.commit_time.to_string().as_bytes());
        buf.push(b'\n');
        buf.push(b'\n');
        buf.extend_from_slice(self.message.as_bytes());
        buf
    }

    pub fn id(&self) -> ObjectId {
        let digest = Sha1::digest(self.canonical_bytes());
        ObjectId(digest.into())
    }
}
