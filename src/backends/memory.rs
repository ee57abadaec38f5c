//! In-memory filesystem engine.
//!
//! The namespace is an inode arena plus a forward-edge directory tree;
//! operations resolve paths through [`Resolver`] and mutate exactly the
//! nodes they touch under per-node locks. All data is lost on drop.

use std::fmt;
use std::io::SeekFrom;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::dir::DirTree;
use crate::error::{FsError, FsResult};
use crate::inode::{Inode, InodeTable, ROOT_INO};
use crate::ops::{File, FileSystem};
use crate::path::{Resolver, normalize};
use crate::perms::{EXEC, READ, WRITE};
use crate::types::{Credentials, Ino, Metadata, Mode, OpenFlags};

/// The in-memory filesystem.
///
/// Cheap to construct, fully self-contained, safe for concurrent use from
/// multiple threads. Caller identity is held per instance and consulted on
/// every permission check; tests simulating another user swap it around the
/// call under test with [`set_credentials`](MemFs::set_credentials).
pub struct MemFs {
    inodes: Arc<InodeTable>,
    dirs: Arc<DirTree>,
    creds: RwLock<Credentials>,
    cwd: RwLock<Vec<String>>,
    next_fd: AtomicU64,
    /// Serializes the operations that must hold more than one directory
    /// lock at once (rename, remove with its emptiness probe). Single-lock
    /// operations never wait while holding a lock, so this makes the
    /// locking discipline deadlock-free as a whole.
    tree_lock: Mutex<()>,
}

impl MemFs {
    /// Create a filesystem whose root directory is owned by `uid`:`gid`
    /// (mode 0o755) and whose operations run as that identity.
    pub fn new(uid: u32, gid: u32) -> Self {
        let inodes = InodeTable::new();
        let dirs = DirTree::new();

        let root = inodes.allocate(uid, gid, Mode::directory(0o755));
        debug_assert_eq!(root.ino, ROOT_INO);
        dirs.add_dir(root.ino);

        Self {
            inodes: Arc::new(inodes),
            dirs: Arc::new(dirs),
            creds: RwLock::new(Credentials::new(uid, gid)),
            cwd: RwLock::new(Vec::new()),
            next_fd: AtomicU64::new(1),
            tree_lock: Mutex::new(()),
        }
    }

    /// Create a filesystem running as the calling process's real ids.
    pub fn with_current_user() -> Self {
        let creds = Credentials::current();
        Self::new(creds.uid, creds.gid)
    }

    /// The identity operations currently run as.
    pub fn credentials(&self) -> Credentials {
        *self.creds.read()
    }

    /// Swap the caller identity, returning the previous one.
    pub fn set_credentials(&self, creds: Credentials) -> Credentials {
        std::mem::replace(&mut *self.creds.write(), creds)
    }

    /// Set an extended attribute on the object at `path`.
    pub fn set_xattr(&self, path: &str, key: &str, value: &str) -> FsResult<()> {
        let inode = self.resolve(path, true)?;
        if !inode.check_access(self.credentials(), WRITE) {
            return Err(FsError::permission_denied(path));
        }
        inode
            .write()
            .xattrs
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Read an extended attribute from the object at `path`.
    pub fn xattr(&self, path: &str, key: &str) -> FsResult<Option<String>> {
        let inode = self.resolve(path, true)?;
        if !inode.check_access(self.credentials(), READ) {
            return Err(FsError::permission_denied(path));
        }
        Ok(inode.read().xattrs.get(key).cloned())
    }

    fn norm(&self, path: &str) -> FsResult<Vec<String>> {
        normalize(path, &self.cwd.read())
    }

    fn resolve(&self, path: &str, follow_final: bool) -> FsResult<Arc<Inode>> {
        let terms = self.norm(path)?;
        Resolver::new(&self.inodes, &self.dirs, self.credentials())
            .resolve(&terms, follow_final)
    }

    /// Resolve everything but the final component, returning the parent
    /// directory and the final name. Fails Invalid for the root itself.
    fn resolve_parent(&self, path: &str) -> FsResult<(Arc<Inode>, String)> {
        let mut terms = self.norm(path)?;
        let name = terms
            .pop()
            .ok_or_else(|| FsError::invalid("operation not permitted on the root directory"))?;
        let parent = Resolver::new(&self.inodes, &self.dirs, self.credentials())
            .resolve(&terms, true)?;
        if !parent.is_dir() {
            return Err(FsError::invalid(format!("{path}: parent is not a directory")));
        }
        Ok((parent, name))
    }

    /// Insert a new child under `parent` with the entry and the inode
    /// created atomically with respect to that directory's lock.
    fn create_node(
        &self,
        parent: &Inode,
        name: &str,
        build: impl FnOnce() -> Arc<Inode>,
    ) -> FsResult<Arc<Inode>> {
        if !parent.check_access(self.credentials(), WRITE | EXEC) {
            return Err(FsError::permission_denied(name));
        }

        let node = self.dirs.node(parent.ino)?;
        let mut entries = node.lock();
        if entries.contains_key(name) {
            return Err(FsError::already_exists(name));
        }

        let inode = build();
        entries.insert(name.to_string(), inode.ino);
        drop(entries);

        parent.write().mtime = SystemTime::now();
        Ok(inode)
    }

    fn new_file_handle(&self, inode: Arc<Inode>, name: String, flags: OpenFlags) -> Box<dyn File> {
        Box::new(MemFile {
            fd: self.next_fd.fetch_add(1, Ordering::SeqCst),
            name,
            flags,
            pos: 0,
            inode: Some(inode),
            inodes: Arc::clone(&self.inodes),
            dirs: Arc::clone(&self.dirs),
        })
    }

    /// Release one link on `ino`, recursing through directory contents.
    /// Hardlinked files below the subtree lose exactly one link per entry.
    fn unlink_all(&self, ino: Ino) -> FsResult<()> {
        let inode = self.inodes.get(ino)?;
        if inode.is_dir() {
            for (_, child) in self.dirs.entries(ino)? {
                self.unlink_all(child)?;
            }
            self.dirs.drop_dir(ino);
        }
        self.inodes.dec_links(ino)?;
        Ok(())
    }

    /// POSIX replace-compatibility for rename: a directory may only
    /// replace an empty directory, a non-directory only a non-directory.
    fn check_replaceable(&self, src_ino: Ino, dst_ino: Ino) -> FsResult<()> {
        let src = self.inodes.get(src_ino)?;
        let dst = self.inodes.get(dst_ino)?;
        match (src.is_dir(), dst.is_dir()) {
            (false, true) => Err(FsError::invalid("destination is a directory")),
            (true, false) => Err(FsError::invalid("destination is not a directory")),
            (true, true) if !self.dirs.is_empty_dir(dst_ino)? => {
                Err(FsError::invalid("destination directory not empty"))
            }
            _ => Ok(()),
        }
    }

    fn basename(terms: &[String]) -> String {
        terms.last().cloned().unwrap_or_else(|| "/".to_string())
    }
}

impl Default for MemFs {
    fn default() -> Self {
        Self::with_current_user()
    }
}

impl FileSystem for MemFs {
    fn chdir(&self, path: &str) -> FsResult<()> {
        let terms = self.norm(path)?;
        let dir = Resolver::new(&self.inodes, &self.dirs, self.credentials())
            .resolve(&terms, true)?;
        if !dir.is_dir() {
            return Err(FsError::invalid(format!("{path} is not a directory")));
        }
        if !dir.check_access(self.credentials(), EXEC) {
            return Err(FsError::permission_denied(path));
        }
        *self.cwd.write() = terms;
        Ok(())
    }

    fn getwd(&self) -> FsResult<String> {
        let cwd = self.cwd.read();
        Ok(format!("/{}", cwd.join("/")))
    }

    fn mkdir(&self, path: &str, mode: u32) -> FsResult<()> {
        let (parent, name) = self.resolve_parent(path)?;
        let creds = self.credentials();
        self.create_node(&parent, &name, || {
            let inode = self
                .inodes
                .allocate(creds.uid, creds.gid, Mode::directory(mode));
            self.dirs.add_dir(inode.ino);
            inode
        })?;
        trace!(path, mode, "mkdir");
        Ok(())
    }

    fn mkdir_all(&self, path: &str, mode: u32) -> FsResult<()> {
        let terms = self.norm(path)?;
        let creds = self.credentials();
        let resolver = Resolver::new(&self.inodes, &self.dirs, creds);

        let mut cur = self.inodes.get(ROOT_INO)?;
        for (i, term) in terms.iter().enumerate() {
            let existing = self.dirs.lookup(cur.ino, term).ok();
            let next = match existing {
                Some(ino) => self.inodes.get(ino)?,
                None => {
                    match self.create_node(&cur, term, || {
                        let inode = self
                            .inodes
                            .allocate(creds.uid, creds.gid, Mode::directory(mode));
                        self.dirs.add_dir(inode.ino);
                        inode
                    }) {
                        Ok(inode) => inode,
                        // Lost a race to a concurrent creator; take theirs.
                        Err(FsError::AlreadyExists(_)) => {
                            let ino = self.dirs.lookup(cur.ino, term)?;
                            self.inodes.get(ino)?
                        }
                        Err(e) => return Err(e),
                    }
                }
            };

            if next.is_dir() {
                cur = next;
            } else if next.is_symlink() {
                // A symlink segment is fine as long as it leads to a
                // directory.
                let resolved = resolver.resolve(&terms[..=i], true)?;
                if !resolved.is_dir() {
                    return Err(FsError::invalid(format!(
                        "{path}: {term} exists and is not a directory"
                    )));
                }
                cur = resolved;
            } else {
                return Err(FsError::invalid(format!(
                    "{path}: {term} exists and is not a directory"
                )));
            }
        }
        Ok(())
    }

    fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        let inode = self.resolve(path, true)?;
        let creds = self.credentials();
        let mut st = inode.write();
        if creds.uid != 0 && creds.uid != st.uid {
            return Err(FsError::permission_denied(path));
        }
        st.mode = st.mode.with_perm(mode);
        st.mtime = SystemTime::now();
        Ok(())
    }

    fn chown(&self, path: &str, uid: u32, gid: u32) -> FsResult<()> {
        let inode = self.resolve(path, true)?;
        let creds = self.credentials();
        let mut st = inode.write();
        if creds.uid != 0 && creds.uid != st.uid {
            return Err(FsError::permission_denied(path));
        }
        st.uid = uid;
        st.gid = gid;
        st.mtime = SystemTime::now();
        Ok(())
    }

    fn link(&self, old: &str, new: &str) -> FsResult<()> {
        let target = self.resolve(old, true)?;
        if target.is_dir() {
            return Err(FsError::invalid(format!("{old}: cannot hard-link a directory")));
        }

        let (parent, name) = self.resolve_parent(new)?;
        if !parent.check_access(self.credentials(), WRITE | EXEC) {
            return Err(FsError::permission_denied(new));
        }

        let node = self.dirs.node(parent.ino)?;
        let mut entries = node.lock();
        if entries.contains_key(&name) {
            return Err(FsError::already_exists(new));
        }

        // Bump the count under the target's lock before the entry lands:
        // a target whose last name was just removed is gone, not relinked.
        {
            let mut st = target.write();
            if st.nlink == 0 {
                return Err(FsError::not_found(old));
            }
            st.nlink += 1;
            st.mtime = SystemTime::now();
        }
        entries.insert(name.clone(), target.ino);
        drop(entries);

        parent.write().mtime = SystemTime::now();
        trace!(old, new, "link");
        Ok(())
    }

    fn symlink(&self, target: &str, link: &str) -> FsResult<()> {
        // The target is stored literally; it need not exist.
        let (parent, name) = self.resolve_parent(link)?;
        let creds = self.credentials();
        self.create_node(&parent, &name, || {
            let inode = self.inodes.allocate(creds.uid, creds.gid, Mode::symlink());
            inode.write().target = Some(target.to_string());
            inode
        })?;
        trace!(target, link, "symlink");
        Ok(())
    }

    fn read_link(&self, path: &str) -> FsResult<String> {
        let inode = self.resolve(path, false)?;
        let st = inode.read();
        match (st.mode.is_symlink(), &st.target) {
            (true, Some(target)) => Ok(target.clone()),
            _ => Err(FsError::invalid(format!("{path} is not a symlink"))),
        }
    }

    fn rename(&self, old: &str, new: &str) -> FsResult<()> {
        let mut old_terms = self.norm(old)?;
        let mut new_terms = self.norm(new)?;
        let src_name = old_terms
            .pop()
            .ok_or_else(|| FsError::invalid("cannot rename the root directory"))?;
        let dst_name = new_terms
            .pop()
            .ok_or_else(|| FsError::invalid("cannot rename onto the root directory"))?;

        // Moving a directory below itself would orphan the subtree.
        let mut full_old = old_terms.clone();
        full_old.push(src_name.clone());
        if new_terms.len() >= full_old.len() && new_terms[..full_old.len()] == full_old[..] {
            return Err(FsError::invalid(format!(
                "cannot move {old} into its own subtree"
            )));
        }

        let creds = self.credentials();
        let resolver = Resolver::new(&self.inodes, &self.dirs, creds);
        let _serialized = self.tree_lock.lock();
        let src_parent = resolver.resolve(&old_terms, true)?;
        let dst_parent = resolver.resolve(&new_terms, true)?;
        for (parent, path) in [(&src_parent, old), (&dst_parent, new)] {
            if !parent.is_dir() {
                return Err(FsError::invalid(format!("{path}: parent is not a directory")));
            }
            if !parent.check_access(creds, WRITE | EXEC) {
                return Err(FsError::permission_denied(path.to_string()));
            }
        }

        let src_node = self.dirs.node(src_parent.ino)?;
        let dst_node = self.dirs.node(dst_parent.ino)?;
        let mut replaced: Option<Ino> = None;

        if src_parent.ino == dst_parent.ino {
            let mut entries = src_node.lock();
            let src_ino = *entries
                .get(&src_name)
                .ok_or_else(|| FsError::not_found(old))?;
            if src_name == dst_name {
                return Ok(());
            }
            if let Some(&dst_ino) = entries.get(&dst_name) {
                self.check_replaceable(src_ino, dst_ino)?;
                replaced = Some(dst_ino);
            }
            entries.remove(&src_name);
            entries.insert(dst_name.clone(), src_ino);
        } else {
            let (mut src_entries, mut dst_entries) = self.dirs.lock_pair(
                (src_parent.ino, &src_node),
                (dst_parent.ino, &dst_node),
            );
            let src_ino = *src_entries
                .get(&src_name)
                .ok_or_else(|| FsError::not_found(old))?;
            if let Some(&dst_ino) = dst_entries.get(&dst_name) {
                // Destination resolving to either locked parent means the
                // move targets its own ancestry; the emptiness probe would
                // re-lock a held mutex.
                if dst_ino == src_parent.ino || src_ino == dst_parent.ino {
                    return Err(FsError::invalid(format!("cannot move {old} over {new}")));
                }
                self.check_replaceable(src_ino, dst_ino)?;
                replaced = Some(dst_ino);
            }
            src_entries.remove(&src_name);
            dst_entries.remove(&dst_name);
            dst_entries.insert(dst_name.clone(), src_ino);
        }

        if let Some(dst_ino) = replaced {
            let was_dir = self.inodes.get(dst_ino).map(|i| i.is_dir()).unwrap_or(false);
            if self.inodes.dec_links(dst_ino)? && was_dir {
                self.dirs.drop_dir(dst_ino);
            }
        }

        let now = SystemTime::now();
        src_parent.write().mtime = now;
        if src_parent.ino != dst_parent.ino {
            dst_parent.write().mtime = now;
        }
        debug!(old, new, "rename");
        Ok(())
    }

    fn remove(&self, path: &str) -> FsResult<()> {
        let _serialized = self.tree_lock.lock();
        let (parent, name) = self.resolve_parent(path)?;
        if !parent.check_access(self.credentials(), WRITE | EXEC) {
            return Err(FsError::permission_denied(path));
        }

        let node = self.dirs.node(parent.ino)?;
        let mut entries = node.lock();
        let ino = *entries.get(&name).ok_or_else(|| FsError::not_found(path))?;

        let inode = self.inodes.get(ino)?;
        let is_dir = inode.is_dir();
        if is_dir && !self.dirs.is_empty_dir(ino)? {
            return Err(FsError::invalid(format!("{path}: directory not empty")));
        }

        entries.remove(&name);
        drop(entries);

        if self.inodes.dec_links(ino)? && is_dir {
            self.dirs.drop_dir(ino);
        }
        parent.write().mtime = SystemTime::now();
        trace!(path, "remove");
        Ok(())
    }

    fn remove_all(&self, path: &str) -> FsResult<()> {
        let (parent, name) = self.resolve_parent(path)?;
        if !parent.check_access(self.credentials(), WRITE | EXEC) {
            return Err(FsError::permission_denied(path));
        }

        // Detach the entry atomically; the subtree is then released
        // segment by segment (observers may see a partial removal).
        let ino = {
            let node = self.dirs.node(parent.ino)?;
            let mut entries = node.lock();
            let ino = *entries.get(&name).ok_or_else(|| FsError::not_found(path))?;
            entries.remove(&name);
            ino
        };

        self.unlink_all(ino)?;
        parent.write().mtime = SystemTime::now();
        debug!(path, "remove_all");
        Ok(())
    }

    fn truncate(&self, path: &str, size: u64) -> FsResult<()> {
        // Resolves symlinks: truncating through a link mutates the target.
        let inode = self.resolve(path, true)?;
        if !inode.mode().is_file() {
            return Err(FsError::invalid(format!("{path} is not a regular file")));
        }
        if !inode.check_access(self.credentials(), WRITE) {
            return Err(FsError::permission_denied(path));
        }
        inode.write().truncate(size);
        Ok(())
    }

    fn create(&self, path: &str) -> FsResult<Box<dyn File>> {
        self.open_file(path, OpenFlags::create_truncate(), 0o666)
    }

    fn open(&self, path: &str) -> FsResult<Box<dyn File>> {
        self.open_file(path, OpenFlags::read(), 0)
    }

    fn open_file(&self, path: &str, flags: OpenFlags, mode: u32) -> FsResult<Box<dyn File>> {
        let creds = self.credentials();
        let name = Self::basename(&self.norm(path)?);

        let (inode, fresh) = if flags.create {
            let (parent, entry_name) = self.resolve_parent(path)?;
            let created = self.create_node(&parent, &entry_name, || {
                self.inodes
                    .allocate(creds.uid, creds.gid, Mode::file(mode))
            });
            match created {
                Ok(inode) => (inode, true),
                Err(FsError::AlreadyExists(_)) if !flags.exclusive => {
                    (self.resolve(path, true)?, false)
                }
                Err(e) => return Err(e),
            }
        } else {
            (self.resolve(path, true)?, false)
        };

        if inode.is_dir() && flags.write {
            return Err(FsError::invalid(format!("{path} is a directory")));
        }

        // Access is checked once, against the identity at open time. A
        // freshly created file is usable regardless of its new mode.
        if !fresh {
            let mut requested = 0;
            if flags.read {
                requested |= READ;
            }
            if flags.write {
                requested |= WRITE;
            }
            if !inode.check_access(creds, requested) {
                return Err(FsError::permission_denied(path));
            }
        }

        if flags.truncate && flags.write && !fresh && inode.mode().is_file() {
            inode.write().truncate(0);
        }

        Ok(self.new_file_handle(inode, name, flags))
    }

    fn stat(&self, path: &str) -> FsResult<Metadata> {
        let terms = self.norm(path)?;
        let inode = Resolver::new(&self.inodes, &self.dirs, self.credentials())
            .resolve(&terms, true)?;
        Ok(inode.metadata(Self::basename(&terms)))
    }

    fn lstat(&self, path: &str) -> FsResult<Metadata> {
        let terms = self.norm(path)?;
        let inode = Resolver::new(&self.inodes, &self.dirs, self.credentials())
            .resolve(&terms, false)?;
        Ok(inode.metadata(Self::basename(&terms)))
    }
}

/// An open handle onto one in-memory inode.
///
/// The access mode is fixed at open time; a read-only handle rejects writes
/// even if the inode's permission bits later change, and vice versa.
pub struct MemFile {
    fd: u64,
    name: String,
    flags: OpenFlags,
    pos: u64,
    inode: Option<Arc<Inode>>,
    inodes: Arc<InodeTable>,
    dirs: Arc<DirTree>,
}

impl fmt::Debug for MemFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemFile")
            .field("fd", &self.fd)
            .field("name", &self.name)
            .field("pos", &self.pos)
            .field("closed", &self.inode.is_none())
            .finish()
    }
}

impl MemFile {
    fn inode(&self) -> FsResult<&Arc<Inode>> {
        self.inode
            .as_ref()
            .ok_or_else(|| FsError::invalid("file handle is closed"))
    }

    fn readable(&self) -> FsResult<&Arc<Inode>> {
        let inode = self.inode()?;
        if !self.flags.read {
            return Err(FsError::permission_denied(format!(
                "{} not opened for reading",
                self.name
            )));
        }
        Ok(inode)
    }

    fn writable(&self) -> FsResult<&Arc<Inode>> {
        let inode = self.inode()?;
        if !self.flags.write {
            return Err(FsError::permission_denied(format!(
                "{} not opened for writing",
                self.name
            )));
        }
        Ok(inode)
    }

    fn read_into(&self, buf: &mut [u8], pos: u64) -> FsResult<usize> {
        let inode = self.readable()?;
        if inode.is_dir() {
            return Err(FsError::invalid(format!("{} is a directory", self.name)));
        }
        let st = inode.read();
        let pos = pos as usize;
        if pos >= st.data.len() {
            return Ok(0);
        }
        let n = buf.len().min(st.data.len() - pos);
        buf[..n].copy_from_slice(&st.data[pos..pos + n]);
        Ok(n)
    }

    /// Write `buf` at absolute position `pos`, zero-padding any gap.
    /// Returns the position one past the written bytes. Never writes a
    /// short count. A write ending past the addressable range fails
    /// Invalid (the cursor may legally sit anywhere).
    fn write_from(&self, buf: &[u8], pos: u64) -> FsResult<u64> {
        let inode = self.writable()?;
        let mut st = inode.write();
        let pos = if self.flags.append {
            st.data.len() as u64
        } else {
            pos
        };

        let end = pos
            .checked_add(buf.len() as u64)
            .filter(|&end| end <= isize::MAX as u64)
            .ok_or_else(|| {
                FsError::invalid(format!("write at offset {pos} exceeds maximum file size"))
            })?;
        let (pos, end) = (pos as usize, end as usize);
        if st.data.len() < end {
            st.data.resize(end, 0);
        }
        st.data[pos..end].copy_from_slice(buf);
        st.mtime = SystemTime::now();
        Ok(end as u64)
    }

    fn dir_entries(&self, limit: Option<usize>) -> FsResult<Vec<(String, Ino)>> {
        let inode = self.readable()?;
        if !inode.is_dir() {
            return Err(FsError::invalid(format!("{} is not a directory", self.name)));
        }
        let mut entries = self.dirs.entries(inode.ino)?;
        if let Some(n) = limit {
            entries.truncate(n);
        }
        Ok(entries)
    }
}

impl File for MemFile {
    fn read(&mut self, buf: &mut [u8]) -> FsResult<usize> {
        let n = self.read_into(buf, self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        self.read_into(buf, offset)
    }

    fn write(&mut self, buf: &[u8]) -> FsResult<usize> {
        self.pos = self.write_from(buf, self.pos)?;
        Ok(buf.len())
    }

    fn write_at(&mut self, buf: &[u8], offset: u64) -> FsResult<usize> {
        self.write_from(buf, offset)?;
        Ok(buf.len())
    }

    fn write_str(&mut self, s: &str) -> FsResult<usize> {
        self.write(s.as_bytes())
    }

    fn seek(&mut self, pos: SeekFrom) -> FsResult<u64> {
        let inode = self.inode()?;
        let len = inode.read().data.len() as i128;
        let next = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => self.pos as i128 + delta as i128,
            SeekFrom::End(delta) => len + delta as i128,
        };
        if next < 0 {
            return Err(FsError::invalid(format!("seek to negative position {next}")));
        }
        self.pos = next as u64;
        Ok(self.pos)
    }

    fn truncate(&mut self, size: u64) -> FsResult<()> {
        let inode = self.writable()?;
        if !inode.mode().is_file() {
            return Err(FsError::invalid(format!("{} is not a regular file", self.name)));
        }
        inode.write().truncate(size);
        self.pos = 0;
        Ok(())
    }

    fn read_dir(&mut self, limit: Option<usize>) -> FsResult<Vec<Metadata>> {
        let entries = self.dir_entries(limit)?;
        let mut out = Vec::with_capacity(entries.len());
        for (name, ino) in entries {
            // An entry may vanish between the listing and the lookup;
            // skip rather than fail the whole listing.
            if let Ok(child) = self.inodes.get(ino) {
                out.push(child.metadata(name));
            }
        }
        Ok(out)
    }

    fn read_dir_names(&mut self, limit: Option<usize>) -> FsResult<Vec<String>> {
        Ok(self.dir_entries(limit)?.into_iter().map(|(n, _)| n).collect())
    }

    fn stat(&self) -> FsResult<Metadata> {
        let inode = self.inode()?;
        Ok(inode.metadata(self.name.clone()))
    }

    fn chmod(&mut self, mode: u32) -> FsResult<()> {
        let inode = self.writable()?;
        let mut st = inode.write();
        st.mode = st.mode.with_perm(mode);
        st.mtime = SystemTime::now();
        Ok(())
    }

    fn chown(&mut self, uid: u32, gid: u32) -> FsResult<()> {
        let inode = self.writable()?;
        let mut st = inode.write();
        st.uid = uid;
        st.gid = gid;
        st.mtime = SystemTime::now();
        Ok(())
    }

    fn sync(&mut self) -> FsResult<()> {
        // Nothing to flush; still an error on a closed handle.
        self.inode()?;
        Ok(())
    }

    fn fd(&self) -> u64 {
        self.fd
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn close(&mut self) -> FsResult<()> {
        // Dropping the Arc makes use-after-close structurally impossible.
        self.inode
            .take()
            .map(|_| ())
            .ok_or_else(|| FsError::invalid("file handle already closed"))
    }
}
