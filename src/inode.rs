//! Inode table: an arena of filesystem objects keyed by number.
//!
//! Inode numbers come from a shared atomic counter and are never reused
//! within a table instance. The arena hands out `Arc<Inode>` so the
//! directory tree and open handles reference objects by id or by cheap
//! clone, never by borrowed pointer.
//!
//! # Concurrency Model
//!
//! - DashMap for concurrent arena access
//! - parking_lot RwLock per inode for attribute/content mutation
//! - AtomicU64 for id allocation

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use dashmap::DashMap;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{FsError, FsResult};
use crate::perms::{self, Access};
use crate::types::{Credentials, Ino, Metadata, Mode, SysAttrs};

/// The distinguished root directory inode number.
pub const ROOT_INO: Ino = 1;

/// Mutable state of one inode, guarded by the per-inode lock.
#[derive(Debug)]
pub struct InodeState {
    /// Owner user id.
    pub uid: u32,
    /// Owner group id.
    pub gid: u32,
    /// Mode and type bits.
    pub mode: Mode,
    /// Extended attributes.
    pub xattrs: HashMap<String, String>,
    /// Number of directory entries referencing this inode.
    pub nlink: u32,
    /// Last modification time.
    pub mtime: SystemTime,
    /// Byte content. Only regular files carry data.
    pub data: Vec<u8>,
    /// Literal symlink target. Only symlinks carry a target.
    pub target: Option<String>,
}

impl InodeState {
    /// Resize the content to `size` bytes.
    ///
    /// Growing zero-pads. Shrinking copies into a fresh buffer so a large
    /// file truncated small does not keep its old allocation alive.
    pub fn truncate(&mut self, size: u64) {
        let size = size as usize;
        if size < self.data.len() {
            let mut shrunk = Vec::with_capacity(size);
            shrunk.extend_from_slice(&self.data[..size]);
            self.data = shrunk;
        } else {
            self.data.resize(size, 0);
        }
        self.mtime = SystemTime::now();
    }

    /// Size as reported by stat: byte length for files, target length for
    /// symlinks, 0 for directories.
    pub fn size(&self) -> u64 {
        match self.mode.kind {
            crate::types::FileType::File => self.data.len() as u64,
            crate::types::FileType::Symlink => {
                self.target.as_ref().map_or(0, |t| t.len() as u64)
            }
            crate::types::FileType::Directory => 0,
        }
    }
}

/// One filesystem object: id plus lock-guarded state.
#[derive(Debug)]
pub struct Inode {
    /// Immutable inode number.
    pub ino: Ino,
    state: RwLock<InodeState>,
}

impl Inode {
    fn new(ino: Ino, uid: u32, gid: u32, mode: Mode) -> Self {
        Self {
            ino,
            state: RwLock::new(InodeState {
                uid,
                gid,
                mode,
                xattrs: HashMap::new(),
                nlink: 1,
                mtime: SystemTime::now(),
                data: Vec::new(),
                target: None,
            }),
        }
    }

    /// Lock the state for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, InodeState> {
        self.state.read()
    }

    /// Lock the state for exclusive mutation.
    pub fn write(&self) -> RwLockWriteGuard<'_, InodeState> {
        self.state.write()
    }

    /// Snapshot the mode bits.
    pub fn mode(&self) -> Mode {
        self.read().mode
    }

    /// Returns true if this inode is a directory.
    pub fn is_dir(&self) -> bool {
        self.mode().is_dir()
    }

    /// Returns true if this inode is a symlink.
    pub fn is_symlink(&self) -> bool {
        self.mode().is_symlink()
    }

    /// Evaluate `requested` access for `creds` against the current bits.
    pub fn check_access(&self, creds: Credentials, requested: Access) -> bool {
        let st = self.read();
        perms::check(st.uid, st.gid, st.mode.perm, creds, requested)
    }

    /// Build a metadata snapshot, naming the inode `name` (metadata carries
    /// the directory-entry name, which the inode itself does not store).
    pub fn metadata(&self, name: impl Into<String>) -> Metadata {
        let st = self.read();
        Metadata {
            name: name.into(),
            size: st.size(),
            mode: st.mode,
            mtime: st.mtime,
            sys: SysAttrs {
                uid: st.uid,
                gid: st.gid,
                nlink: st.nlink,
                xattrs: st.xattrs.clone(),
                link_target: st.target.clone(),
            },
        }
    }
}

/// Arena of inodes keyed by number.
pub struct InodeTable {
    next_ino: AtomicU64,
    nodes: DashMap<Ino, Arc<Inode>>,
}

impl InodeTable {
    /// Create an empty table. The first allocation receives [`ROOT_INO`].
    pub fn new() -> Self {
        Self {
            next_ino: AtomicU64::new(ROOT_INO),
            nodes: DashMap::new(),
        }
    }

    /// Allocate a fresh inode with link count 1.
    pub fn allocate(&self, uid: u32, gid: u32, mode: Mode) -> Arc<Inode> {
        let ino = self.next_ino.fetch_add(1, Ordering::SeqCst);
        let inode = Arc::new(Inode::new(ino, uid, gid, mode));
        self.nodes.insert(ino, Arc::clone(&inode));
        inode
    }

    /// Look up an inode by number.
    pub fn get(&self, ino: Ino) -> FsResult<Arc<Inode>> {
        self.nodes
            .get(&ino)
            .map(|r| Arc::clone(r.value()))
            .ok_or_else(|| FsError::not_found(format!("inode {ino}")))
    }

    /// Add one directory-entry reference to an inode.
    pub fn inc_links(&self, ino: Ino) -> FsResult<()> {
        let inode = self.get(ino)?;
        let mut st = inode.write();
        st.nlink += 1;
        st.mtime = SystemTime::now();
        Ok(())
    }

    /// Drop one directory-entry reference. When the count reaches zero the
    /// inode is removed from the arena and `true` is returned; any later
    /// `get` on the id fails NotFound.
    pub fn dec_links(&self, ino: Ino) -> FsResult<bool> {
        let inode = self.get(ino)?;
        let freed = {
            let mut st = inode.write();
            st.nlink = st.nlink.saturating_sub(1);
            st.mtime = SystemTime::now();
            st.nlink == 0
        };
        if freed {
            self.nodes.remove(&ino);
        }
        Ok(freed)
    }

    /// Number of live inodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the table holds no inodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_strictly_increase() {
        let table = InodeTable::new();
        let a = table.allocate(0, 0, Mode::directory(0o755));
        let b = table.allocate(0, 0, Mode::file(0o644));
        let c = table.allocate(0, 0, Mode::file(0o644));
        assert_eq!(a.ino, ROOT_INO);
        assert!(b.ino > a.ino);
        assert!(c.ino > b.ino);
    }

    #[test]
    fn test_free_on_last_unlink() {
        let table = InodeTable::new();
        let inode = table.allocate(0, 0, Mode::file(0o644));
        let ino = inode.ino;

        table.inc_links(ino).unwrap();
        assert!(!table.dec_links(ino).unwrap());
        assert!(table.get(ino).is_ok());

        assert!(table.dec_links(ino).unwrap());
        assert!(table.get(ino).unwrap_err().is_not_found());
    }

    #[test]
    fn test_freed_id_not_reused() {
        let table = InodeTable::new();
        let first = table.allocate(0, 0, Mode::file(0o644)).ino;
        table.dec_links(first).unwrap();

        let next = table.allocate(0, 0, Mode::file(0o644)).ino;
        assert!(next > first);
    }

    #[test]
    fn test_truncate_shrink_releases_capacity() {
        let table = InodeTable::new();
        let inode = table.allocate(0, 0, Mode::file(0o644));
        {
            let mut st = inode.write();
            st.data = vec![7u8; 1 << 16];
            st.truncate(8);
            assert_eq!(st.data.len(), 8);
            assert!(st.data.capacity() < 1 << 16);
            st.truncate(16);
            assert_eq!(&st.data[..8], &[7u8; 8]);
            assert_eq!(&st.data[8..], &[0u8; 8]);
        }
    }

    #[test]
    fn test_metadata_snapshot() {
        let table = InodeTable::new();
        let inode = table.allocate(100, 200, Mode::file(0o640));
        inode.write().data = b"payload".to_vec();

        let meta = inode.metadata("payload.bin");
        assert_eq!(meta.name, "payload.bin");
        assert_eq!(meta.size, 7);
        assert_eq!(meta.sys.uid, 100);
        assert_eq!(meta.sys.gid, 200);
        assert_eq!(meta.sys.nlink, 1);
    }
}
