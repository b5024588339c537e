use crate::error::{GraphError, Result};

use super::{chunk_name, CHECKSUM_LEN, DIRECTORY_ENTRY_LEN, HEADER_LEN};

/// One resolved chunk: identifier plus the byte range of its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkEntry {
    pub id: u32,
    pub start: usize,
    pub end: usize,
}

impl ChunkEntry {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Parsed chunk directory of an open graph file.
///
/// The directory has `chunk_count + 1` entries; the terminator entry has
/// id 0 and points at the trailing checksum, so consecutive offsets bound
/// each chunk exactly and the chunks cover the file without gaps.
#[derive(Debug)]
pub struct ChunkDirectory {
    entries: Vec<ChunkEntry>,
}

impl ChunkDirectory {
    pub fn parse(data: &[u8], chunk_count: usize) -> Result<Self> {
        let dir_len = (chunk_count + 1) * DIRECTORY_ENTRY_LEN;
        let dir_end = HEADER_LEN + dir_len;
        if data.len() < dir_end + CHECKSUM_LEN {
            return Err(GraphError::Corrupt(
                "file too short for chunk directory".into(),
            ));
        }

        let mut raw = Vec::with_capacity(chunk_count + 1);
        for i in 0..=chunk_count {
            let at = HEADER_LEN + i * DIRECTORY_ENTRY_LEN;
            let id = u32::from_be_bytes(data[at..at + 4].try_into().expect("slice is 4 bytes"));
            let offset =
                u64::from_be_bytes(data[at + 4..at + 12].try_into().expect("slice is 8 bytes"));
            raw.push((id, offset));
        }

        let (last_id, last_offset) = raw[chunk_count];
        if last_id != 0 {
            return Err(GraphError::Corrupt(
                "chunk directory lacks terminating entry".into(),
            ));
        }
        if last_offset != (data.len() - CHECKSUM_LEN) as u64 {
            return Err(GraphError::Corrupt(
                "chunk directory terminator does not point at trailing checksum".into(),
            ));
        }
        if chunk_count > 0 && raw[0].1 != dir_end as u64 {
            return Err(GraphError::Corrupt(
                "first chunk does not follow the directory".into(),
            ));
        }

        let mut entries = Vec::with_capacity(chunk_count);
        for i in 0..chunk_count {
            let (id, start) = raw[i];
            let (_, end) = raw[i + 1];
            if id == 0 {
                return Err(GraphError::Corrupt("chunk id 0 before terminator".into()));
            }
            if start >= end {
                return Err(GraphError::Corrupt(format!(
                    "chunk directory not monotonic at {}",
                    chunk_name(id)
                )));
            }
            if entries.iter().any(|e: &ChunkEntry| e.id == id) {
                return Err(GraphError::Corrupt(format!(
                    "duplicate chunk {}",
                    chunk_name(id)
                )));
            }
            entries.push(ChunkEntry {
                id,
                start: start as usize,
                end: end as usize,
            });
        }

        Ok(Self { entries })
    }

    pub fn find(&self, id: u32) -> Option<ChunkEntry> {
        self.entries.iter().copied().find(|e| e.id == id)
    }

    pub fn require(&self, id: u32) -> Result<ChunkEntry> {
        self.find(id).ok_or_else(|| {
            GraphError::Corrupt(format!("missing required chunk {}", chunk_name(id)))
        })
    }

    pub fn entries(&self) -> &[ChunkEntry] {
        &self.entries
    }
}

/// Accumulates chunk sizes for a file about to be written and renders the
/// directory bytes. Offsets are derived from the declared sizes, so the
/// writer emits the directory first and never patches it afterwards.
#[derive(Debug, Default)]
pub struct ChunkDirectoryBuilder {
    chunks: Vec<(u32, u64)>,
}

impl ChunkDirectoryBuilder {
    pub fn push(&mut self, id: u32, len: u64) {
        self.chunks.push((id, len));
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let dir_len = (self.chunks.len() + 1) * DIRECTORY_ENTRY_LEN;
        let mut out = Vec::with_capacity(dir_len);
        let mut offset = (HEADER_LEN + dir_len) as u64;
        for &(id, len) in &self.chunks {
            out.extend_from_slice(&id.to_be_bytes());
            out.extend_from_slice(&offset.to_be_bytes());
            offset += len;
        }
        out.extend_from_slice(&0u32.to_be_bytes());
        out.extend_from_slice(&offset.to_be_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::{CHUNK_DATA, CHUNK_FANOUT, CHUNK_LOOKUP};

    fn file_with_directory(builder: &ChunkDirectoryBuilder, payload_len: usize) -> Vec<u8> {
        let mut data = vec![0u8; HEADER_LEN];
        data.extend_from_slice(&builder.to_bytes());
        data.extend(std::iter::repeat(0u8).take(payload_len));
        data.extend_from_slice(&[0u8; CHECKSUM_LEN]);
        data
    }

    #[test]
    fn build_then_parse_round_trips() {
        let mut builder = ChunkDirectoryBuilder::default();
        builder.push(CHUNK_FANOUT, 1024);
        builder.push(CHUNK_LOOKUP, 40);
        builder.push(CHUNK_DATA, 72);

        let data = file_with_directory(&builder, 1024 + 40 + 72);
        let dir = ChunkDirectory::parse(&data, 3).unwrap();

        let fanout = dir.require(CHUNK_FANOUT).unwrap();
        assert_eq!(fanout.len(), 1024);
        let lookup = dir.require(CHUNK_LOOKUP).unwrap();
        assert_eq!(lookup.start, fanout.end);
        assert_eq!(lookup.len(), 40);
        let cdat = dir.require(CHUNK_DATA).unwrap();
        assert_eq!(cdat.end, data.len() - CHECKSUM_LEN);
        assert!(dir.find(0xdead_beef).is_none());
    }

    #[test]
    fn rejects_non_monotonic_offsets() {
        let mut builder = ChunkDirectoryBuilder::default();
        builder.push(CHUNK_FANOUT, 1024);
        builder.push(CHUNK_LOOKUP, 40);
        let mut data = file_with_directory(&builder, 1024 + 40);

        // Swap the two chunk offsets.
        let a = HEADER_LEN + 4;
        let b = HEADER_LEN + DIRECTORY_ENTRY_LEN + 4;
        for i in 0..8 {
            data.swap(a + i, b + i);
        }
        assert!(matches!(
            ChunkDirectory::parse(&data, 2),
            Err(GraphError::Corrupt(_))
        ));
    }

    #[test]
    fn rejects_missing_terminator() {
        let mut builder = ChunkDirectoryBuilder::default();
        builder.push(CHUNK_FANOUT, 1024);
        let mut data = file_with_directory(&builder, 1024);
        // Overwrite the terminator id with a nonzero value.
        data[HEADER_LEN + DIRECTORY_ENTRY_LEN] = b'X';
        assert!(matches!(
            ChunkDirectory::parse(&data, 1),
            Err(GraphError::Corrupt(_))
        ));
    }

    #[test]
    fn rejects_truncated_directory() {
        let data = vec![0u8; HEADER_LEN + DIRECTORY_ENTRY_LEN];
        assert!(matches!(
            ChunkDirectory::parse(&data, 2),
            Err(GraphError::Corrupt(_))
        ));
    }
}
