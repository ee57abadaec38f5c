//! Directory tree: named forward edges from directories to inode numbers.
//!
//! Each directory is a `DirNode` holding a sorted name→ino map behind its
//! own lock. There is no stored `..` edge and no parent pointer; parent
//! resolution re-walks from the root, so the tree shape is strictly
//! forward-referencing and cannot form ownership cycles.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};

use crate::error::{FsError, FsResult};
use crate::types::Ino;

/// One directory's entries, guarded by the per-directory lock.
///
/// `BTreeMap` keeps names in lexicographic order, which is the mandated
/// listing order.
#[derive(Debug, Default)]
pub struct DirNode {
    entries: Mutex<BTreeMap<String, Ino>>,
}

impl DirNode {
    /// Lock the entry map.
    pub fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Ino>> {
        self.entries.lock()
    }
}

/// The set of live directories, keyed by their inode number.
pub struct DirTree {
    nodes: DashMap<Ino, Arc<DirNode>>,
}

impl DirTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self {
            nodes: DashMap::new(),
        }
    }

    /// Register a freshly allocated directory inode.
    pub fn add_dir(&self, ino: Ino) {
        self.nodes.insert(ino, Arc::new(DirNode::default()));
    }

    /// Fetch the node for a directory.
    ///
    /// Fails NotFound when `ino` is not a live directory. The `Arc` is
    /// cloned out so callers never hold a map shard guard across their own
    /// locking.
    pub fn node(&self, ino: Ino) -> FsResult<Arc<DirNode>> {
        self.nodes
            .get(&ino)
            .map(|r| Arc::clone(r.value()))
            .ok_or_else(|| FsError::not_found(format!("directory inode {ino}")))
    }

    /// Look up a child by name.
    pub fn lookup(&self, parent: Ino, name: &str) -> FsResult<Ino> {
        let node = self.node(parent)?;
        let entries = node.lock();
        entries
            .get(name)
            .copied()
            .ok_or_else(|| FsError::not_found(name))
    }

    /// Insert a new entry. Never overwrites: an existing name fails
    /// AlreadyExists (rename is the only operation that replaces).
    pub fn insert(&self, parent: Ino, name: &str, child: Ino) -> FsResult<()> {
        let node = self.node(parent)?;
        let mut entries = node.lock();
        if entries.contains_key(name) {
            return Err(FsError::already_exists(name));
        }
        entries.insert(name.to_string(), child);
        Ok(())
    }

    /// Remove an entry, returning the inode number it referenced.
    pub fn remove(&self, parent: Ino, name: &str) -> FsResult<Ino> {
        let node = self.node(parent)?;
        let mut entries = node.lock();
        entries
            .remove(name)
            .ok_or_else(|| FsError::not_found(name))
    }

    /// All entry names, in lexicographic order.
    pub fn names(&self, parent: Ino) -> FsResult<Vec<String>> {
        let node = self.node(parent)?;
        let entries = node.lock();
        Ok(entries.keys().cloned().collect())
    }

    /// All (name, ino) pairs, in lexicographic name order.
    pub fn entries(&self, parent: Ino) -> FsResult<Vec<(String, Ino)>> {
        let node = self.node(parent)?;
        let entries = node.lock();
        Ok(entries.iter().map(|(n, i)| (n.clone(), *i)).collect())
    }

    /// Returns true if the directory has no entries.
    pub fn is_empty_dir(&self, parent: Ino) -> FsResult<bool> {
        let node = self.node(parent)?;
        Ok(node.lock().is_empty())
    }

    /// Drop a directory node whose inode is being freed.
    pub fn drop_dir(&self, ino: Ino) {
        self.nodes.remove(&ino);
    }

    /// Lock two directories for a cross-directory move.
    ///
    /// Guards are returned as (source, destination). Locks are always taken
    /// in inode-number order, so two concurrent renames targeting each
    /// other's directories cannot deadlock.
    pub fn lock_pair<'a>(
        &self,
        src: (Ino, &'a DirNode),
        dst: (Ino, &'a DirNode),
    ) -> (
        MutexGuard<'a, BTreeMap<String, Ino>>,
        MutexGuard<'a, BTreeMap<String, Ino>>,
    ) {
        if src.0 <= dst.0 {
            let a = src.1.lock();
            let b = dst.1.lock();
            (a, b)
        } else {
            let b = dst.1.lock();
            let a = src.1.lock();
            (a, b)
        }
    }
}

impl Default for DirTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_lookup_remove() {
        let tree = DirTree::new();
        tree.add_dir(1);

        tree.insert(1, "alpha", 2).unwrap();
        assert_eq!(tree.lookup(1, "alpha").unwrap(), 2);

        assert_eq!(tree.remove(1, "alpha").unwrap(), 2);
        assert!(tree.lookup(1, "alpha").unwrap_err().is_not_found());
    }

    #[test]
    fn test_insert_never_overwrites() {
        let tree = DirTree::new();
        tree.add_dir(1);

        tree.insert(1, "name", 2).unwrap();
        let err = tree.insert(1, "name", 3).unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(tree.lookup(1, "name").unwrap(), 2);
    }

    #[test]
    fn test_names_are_sorted() {
        let tree = DirTree::new();
        tree.add_dir(1);

        for (name, ino) in [("zeta", 2), ("alpha", 3), ("mid", 4)] {
            tree.insert(1, name, ino).unwrap();
        }
        assert_eq!(tree.names(1).unwrap(), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_missing_directory_is_not_found() {
        let tree = DirTree::new();
        assert!(tree.lookup(42, "x").unwrap_err().is_not_found());
        assert!(tree.insert(42, "x", 1).unwrap_err().is_not_found());
    }

    #[test]
    fn test_lock_pair_order_insensitive() {
        let tree = DirTree::new();
        tree.add_dir(1);
        tree.add_dir(2);
        let a = tree.node(1).unwrap();
        let b = tree.node(2).unwrap();

        // Both orders must produce (src, dst) guards without deadlock.
        {
            let (mut s, mut d) = tree.lock_pair((1, &a), (2, &b));
            s.insert("from-a".into(), 10);
            d.insert("from-b".into(), 11);
        }
        {
            let (mut s, mut d) = tree.lock_pair((2, &b), (1, &a));
            s.insert("swap-a".into(), 12);
            d.insert("swap-b".into(), 13);
        }
        assert_eq!(tree.names(1).unwrap(), vec!["from-a", "swap-b"]);
        assert_eq!(tree.names(2).unwrap(), vec!["from-b", "swap-a"]);
    }
}
