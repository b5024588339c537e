/// Switches controlling when the commit-graph is produced and consulted.
///
/// `write_commit_graph` gates regeneration (typically driven by a
/// garbage-collection pass); `read_commit_graph` gates whether readers are
/// opened at all. With reading disabled the file is ignored even when it
/// exists on disk, and traversals parse raw commit objects exactly as if
/// no graph had ever been written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub write_commit_graph: bool,
    pub read_commit_graph: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            write_commit_graph: true,
            read_commit_graph: true,
        }
    }
}

impl Config {
    pub fn disabled() -> Self {
        Self {
            write_commit_graph: false,
            read_commit_graph: false,
        }
    }

    pub fn write_only() -> Self {
        Self {
            write_commit_graph: true,
            read_commit_graph: false,
        }
    }
}
