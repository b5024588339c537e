use std::collections::HashMap;

use crate::error::{GraphError, Result};
use crate::model::{CommitObject, ObjectId};

/// Read access to the commit objects of an object database.
///
/// This is the only view of the underlying store the graph writer and the
/// traversal engine need: resolving a hash to a parsed commit header plus
/// message body.
pub trait ObjectSource {
    /// Loads the commit identified by `id`.
    ///
    /// Fails with [`GraphError::MissingObject`] when no such commit exists.
    fn read_commit(&self, id: &ObjectId) -> Result<CommitObject>;

    fn contains(&self, id: &ObjectId) -> bool {
        self.read_commit(id).is_ok()
    }
}

impl<S: ObjectSource + ?Sized> ObjectSource for &S {
    fn read_commit(&self, id: &ObjectId) -> Result<CommitObject> {
        (**self).read_commit(id)
    }

    fn contains(&self, id: &ObjectId) -> bool {
        (**self).contains(id)
    }
}

/// In-memory content-addressed commit store.
///
/// Commits are keyed by the SHA-1 of their canonical encoding, so the same
/// contents always land on the same id.
#[derive(Debug, Default)]
pub struct MemoryStore {
    commits: HashMap<ObjectId, CommitObject>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, commit: CommitObject) -> ObjectId {
        let id = commit.id();
        self.commits.insert(id, commit);
        id
    }

    /// Shorthand for inserting a commit with an empty message.
    pub fn commit(&mut self, tree: ObjectId, parents: &[ObjectId], commit_time: i64) -> ObjectId {
        self.insert(CommitObject::new(tree, parents.to_vec(), commit_time))
    }

    pub fn remove(&mut self, id: &ObjectId) -> Option<CommitObject> {
        self.commits.remove(id)
    }

    pub fn len(&self) -> usize {
        self.commits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }
}

impl ObjectSource for MemoryStore {
    fn read_commit(&self, id: &ObjectId) -> Result<CommitObject> {
        self.commits
            .get(id)
            .cloned()
            .ok_or(GraphError::MissingObject(*id))
    }

    fn contains(&self, id: &ObjectId) -> bool {
        self.commits.contains_key(id)
    }
}
