use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};

use smallvec::SmallVec;

use crate::error::{GraphError, Result};
use crate::model::{GraphPos, ObjectId, GENERATION_UNKNOWN};
use crate::odb::ObjectSource;
use crate::reader::CommitGraph;

const FLAG_SEEN: u32 = 1 << 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sort {
    /// Commits ordered by descending commit time; ties keep discovery
    /// order.
    #[default]
    CommitTimeDesc,
    /// No commit is emitted before all of its walked children.
    Topo,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RevFilter {
    #[default]
    All,
    /// Emits only the independent common ancestors of all start points.
    MergeBase,
    /// Skips commits whose tree equals their first parent's tree. Root
    /// commits always pass.
    TreeDiff,
    /// Emits commits whose message contains the given substring. Forces a
    /// body fetch from the object database for every inspected commit.
    Message(String),
}

/// A commit yielded by [`RevWalk::next`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkedCommit {
    pub id: ObjectId,
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
    pub commit_time: i64,
    pub generation: u32,
}

struct WalkEntry {
    id: ObjectId,
    tree: ObjectId,
    parents: SmallVec<[usize; 2]>,
    commit_time: i64,
    generation: u32,
    body: Option<String>,
    parsed: bool,
    flags: u32,
}

impl WalkEntry {
    fn placeholder(id: ObjectId) -> Self {
        Self {
            id,
            tree: ObjectId::from_bytes([0; 20]),
            parents: SmallVec::new(),
            commit_time: 0,
            generation: GENERATION_UNKNOWN,
            body: None,
            parsed: false,
            flags: 0,
        }
    }
}

struct QueueEntry {
    time: i64,
    seq: u64,
    idx: usize,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Highest commit time first; earliest discovery first among ties.
        self.time
            .cmp(&other.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Revision walker that resolves commit headers through the commit-graph
/// when one is attached, and through raw object parsing otherwise.
///
/// A commit parsed from the graph keeps no message body
/// ([`RevWalk::has_body`] is false) and carries the graph's generation
/// number; a raw-parsed commit retains its body and has an unknown
/// generation. Commits absent from the graph fall back to raw parsing, so
/// a partial graph degrades without changing any walk result. The emitted
/// sequence is identical with and without a graph for every sort and
/// filter; body filters fetch messages on demand.
pub struct RevWalk<'a, S: ObjectSource> {
    source: &'a S,
    graph: Option<&'a CommitGraph>,
    sort: Sort,
    filter: RevFilter,
    entries: Vec<WalkEntry>,
    by_id: HashMap<ObjectId, usize>,
    by_pos: HashMap<GraphPos, usize>,
    starts: Vec<usize>,
    pending: BinaryHeap<QueueEntry>,
    prepared: Option<VecDeque<usize>>,
    started: bool,
    next_seq: u64,
}

impl<'a, S: ObjectSource> RevWalk<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self {
            source,
            graph: None,
            sort: Sort::default(),
            filter: RevFilter::default(),
            entries: Vec::new(),
            by_id: HashMap::new(),
            by_pos: HashMap::new(),
            starts: Vec::new(),
            pending: BinaryHeap::new(),
            prepared: None,
            started: false,
            next_seq: 0,
        }
    }

    /// Attaches a commit-graph for header resolution.
    pub fn with_graph(mut self, graph: &'a CommitGraph) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn set_sort(&mut self, sort: Sort) {
        self.sort = sort;
    }

    pub fn set_filter(&mut self, filter: RevFilter) {
        self.filter = filter;
    }

    /// Marks a start point. Must be called before the first `next`.
    pub fn push(&mut self, id: ObjectId) -> Result<()> {
        if self.started {
            return Err(GraphError::InvalidArgument(
                "walk already started".into(),
            ));
        }
        let idx = self.ensure_entry(id);
        self.parse(idx)?;
        if self.entries[idx].flags & FLAG_SEEN == 0 {
            self.entries[idx].flags |= FLAG_SEEN;
            self.starts.push(idx);
            self.enqueue(idx);
        }
        Ok(())
    }

    pub fn next(&mut self) -> Result<Option<WalkedCommit>> {
        if !self.started {
            self.started = true;
            if matches!(self.filter, RevFilter::MergeBase) {
                let out = self.prepare_merge_bases()?;
                self.prepared = Some(out);
            } else if self.sort == Sort::Topo {
                let out = self.prepare_topo()?;
                self.prepared = Some(out);
            }
        }

        if let Some(prepared) = &mut self.prepared {
            let idx = prepared.pop_front();
            return Ok(idx.map(|idx| self.snapshot(idx)));
        }

        loop {
            let Some(entry) = self.pending.pop() else {
                return Ok(None);
            };
            self.expand_parents(entry.idx)?;
            if self.accept(entry.idx)? {
                return Ok(Some(self.snapshot(entry.idx)));
            }
        }
    }

    /// Resolves the headers of `id` without walking: the graph-aware
    /// header parse when a graph is attached and knows the commit, raw
    /// object parsing otherwise.
    pub fn parse_headers(&mut self, id: ObjectId) -> Result<()> {
        let idx = self.ensure_entry(id);
        self.parse(idx)
    }

    /// Whether the commit's message body has been fetched and retained.
    /// Always false for commits resolved purely through the graph.
    pub fn has_body(&self, id: &ObjectId) -> bool {
        self.by_id
            .get(id)
            .map(|&idx| self.entries[idx].body.is_some())
            .unwrap_or(false)
    }

    /// Generation number of a parsed commit; `None` if the commit has not
    /// been parsed by this walk.
    pub fn generation_of(&self, id: &ObjectId) -> Option<u32> {
        let &idx = self.by_id.get(id)?;
        if !self.entries[idx].parsed {
            return None;
        }
        Some(self.entries[idx].generation)
    }

    pub fn tree_of(&self, id: &ObjectId) -> Option<ObjectId> {
        let &idx = self.by_id.get(id)?;
        if !self.entries[idx].parsed {
            return None;
        }
        Some(self.entries[idx].tree)
    }

    fn ensure_entry(&mut self, id: ObjectId) -> usize {
        if let Some(&idx) = self.by_id.get(&id) {
            return idx;
        }
        let idx = self.entries.len();
        self.entries.push(WalkEntry::placeholder(id));
        self.by_id.insert(id, idx);
        idx
    }

    fn parse(&mut self, idx: usize) -> Result<()> {
        if self.entries[idx].parsed {
            return Ok(());
        }
        let id = self.entries[idx].id;

        if let Some(graph) = self.graph {
            if let Some(pos) = graph.position_of(&id) {
                if let Some(data) = graph.commit_data_at(pos) {
                    let mut parents: SmallVec<[usize; 2]> = SmallVec::new();
                    for &parent_pos in &data.parents {
                        let parent_idx = match self.by_pos.get(&parent_pos) {
                            Some(&known) => known,
                            None => {
                                let parent_id = graph.id_at(parent_pos).ok_or_else(|| {
                                    GraphError::Corrupt("parent position out of range".into())
                                })?;
                                let parent_idx = self.ensure_entry(parent_id);
                                self.by_pos.insert(parent_pos, parent_idx);
                                parent_idx
                            }
                        };
                        parents.push(parent_idx);
                    }
                    let entry = &mut self.entries[idx];
                    entry.tree = data.tree;
                    entry.parents = parents;
                    entry.commit_time = data.commit_time;
                    entry.generation = data.generation;
                    entry.body = None;
                    entry.parsed = true;
                    return Ok(());
                }
            }
        }

        let commit = self.source.read_commit(&id)?;
        let parents: SmallVec<[usize; 2]> = commit
            .parents
            .iter()
            .map(|parent| self.ensure_entry(*parent))
            .collect();
        let entry = &mut self.entries[idx];
        entry.tree = commit.tree;
        entry.parents = parents;
        entry.commit_time = commit.commit_time;
        entry.generation = GENERATION_UNKNOWN;
        entry.body = Some(commit.message);
        entry.parsed = true;
        Ok(())
    }

    fn enqueue(&mut self, idx: usize) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.push(QueueEntry {
            time: self.entries[idx].commit_time,
            seq,
            idx,
        });
    }

    fn expand_parents(&mut self, idx: usize) -> Result<()> {
        let parents = self.entries[idx].parents.clone();
        for parent_idx in parents {
            self.parse(parent_idx)?;
            if self.entries[parent_idx].flags & FLAG_SEEN == 0 {
                self.entries[parent_idx].flags |= FLAG_SEEN;
                self.enqueue(parent_idx);
            }
        }
        Ok(())
    }

    fn accept(&mut self, idx: usize) -> Result<bool> {
        match &self.filter {
            RevFilter::All | RevFilter::MergeBase => Ok(true),
            RevFilter::TreeDiff => {
                let entry = &self.entries[idx];
                match entry.parents.first() {
                    None => Ok(true),
                    Some(&parent_idx) => Ok(entry.tree != self.entries[parent_idx].tree),
                }
            }
            RevFilter::Message(substring) => {
                let needle = substring.clone();
                self.load_body(idx)?;
                let body = self.entries[idx].body.as_deref().unwrap_or("");
                Ok(body.contains(&needle))
            }
        }
    }

    fn load_body(&mut self, idx: usize) -> Result<()> {
        if self.entries[idx].body.is_none() {
            let id = self.entries[idx].id;
            let commit = self.source.read_commit(&id)?;
            self.entries[idx].body = Some(commit.message);
        }
        Ok(())
    }

    /// Drains the date queue, discovering the full closure of the starts.
    /// Returns the commits in date-descending discovery order.
    fn discover_all(&mut self) -> Result<Vec<usize>> {
        let mut order = Vec::new();
        while let Some(entry) = self.pending.pop() {
            order.push(entry.idx);
            self.expand_parents(entry.idx)?;
        }
        Ok(order)
    }

    fn prepare_topo(&mut self) -> Result<VecDeque<usize>> {
        let order = self.discover_all()?;

        let mut child_count = vec![0u32; self.entries.len()];
        for &idx in &order {
            for &parent_idx in &self.entries[idx].parents {
                child_count[parent_idx] += 1;
            }
        }

        let mut heap = BinaryHeap::new();
        let mut seq = 0u64;
        for &idx in &order {
            if child_count[idx] == 0 {
                heap.push(QueueEntry {
                    time: self.entries[idx].commit_time,
                    seq,
                    idx,
                });
                seq += 1;
            }
        }

        let mut out = VecDeque::new();
        while let Some(entry) = heap.pop() {
            if self.accept(entry.idx)? {
                out.push_back(entry.idx);
            }
            let parents = self.entries[entry.idx].parents.clone();
            for parent_idx in parents {
                child_count[parent_idx] -= 1;
                if child_count[parent_idx] == 0 {
                    heap.push(QueueEntry {
                        time: self.entries[parent_idx].commit_time,
                        seq,
                        idx: parent_idx,
                    });
                    seq += 1;
                }
            }
        }
        Ok(out)
    }

    /// Flag painting: each start paints its bit down the parent relation;
    /// commits carrying every bit are candidate bases, and candidates
    /// reachable from another candidate's parents are redundant.
    fn prepare_merge_bases(&mut self) -> Result<VecDeque<usize>> {
        if self.starts.len() > 32 {
            return Err(GraphError::InvalidArgument(
                "merge-base walks support at most 32 start points".into(),
            ));
        }
        let order = self.discover_all()?;
        if self.starts.is_empty() {
            return Ok(VecDeque::new());
        }

        let mut paint = vec![0u32; self.entries.len()];
        for (bit, &start) in self.starts.iter().enumerate() {
            let mask = 1u32 << bit;
            let mut stack = vec![start];
            while let Some(idx) = stack.pop() {
                if paint[idx] & mask != 0 {
                    continue;
                }
                paint[idx] |= mask;
                stack.extend(self.entries[idx].parents.iter().copied());
            }
        }

        let all_starts = if self.starts.len() == 32 {
            u32::MAX
        } else {
            (1u32 << self.starts.len()) - 1
        };
        let candidates: Vec<usize> = order
            .iter()
            .copied()
            .filter(|&idx| paint[idx] == all_starts)
            .collect();

        let mut covered = vec![false; self.entries.len()];
        let mut stack: Vec<usize> = candidates
            .iter()
            .flat_map(|&idx| self.entries[idx].parents.iter().copied())
            .collect();
        while let Some(idx) = stack.pop() {
            if covered[idx] {
                continue;
            }
            covered[idx] = true;
            stack.extend(self.entries[idx].parents.iter().copied());
        }

        Ok(candidates
            .into_iter()
            .filter(|&idx| !covered[idx])
            .collect())
    }

    fn snapshot(&self, idx: usize) -> WalkedCommit {
        let entry = &self.entries[idx];
        WalkedCommit {
            id: entry.id,
            tree: entry.tree,
            parents: entry
                .parents
                .iter()
                .map(|&parent_idx| self.entries[parent_idx].id)
                .collect(),
            commit_time: entry.commit_time,
            generation: entry.generation,
        }
    }
}
