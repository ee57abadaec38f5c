//! Filesystem and file-handle traits.
//!
//! Two capabilities, each with exactly two implementations: the in-memory
//! engine ([`MemFs`](crate::MemFs)/[`MemFile`](crate::MemFile)) and the
//! host pass-through ([`HostFs`](crate::HostFs)/[`HostFile`](crate::HostFile)).
//! The implementation is selected at construction time; callers program
//! against `dyn FileSystem`.

use std::fmt;
use std::io::SeekFrom;

use crate::error::FsResult;
use crate::types::{Metadata, OpenFlags};

/// Path-based filesystem operations.
///
/// All operations are synchronous and run to completion or fail; every
/// failure is deterministic for a given filesystem state.
pub trait FileSystem: Send + Sync {
    /// Change the current working directory.
    fn chdir(&self, path: &str) -> FsResult<()>;

    /// The current working directory as an absolute path.
    fn getwd(&self) -> FsResult<String>;

    /// Create a directory. The parent must already exist.
    fn mkdir(&self, path: &str, mode: u32) -> FsResult<()>;

    /// Create a directory and any missing parents.
    ///
    /// Idempotent: existing directories along the path are left untouched.
    /// An existing non-directory segment fails Invalid.
    fn mkdir_all(&self, path: &str, mode: u32) -> FsResult<()>;

    /// Replace the low permission bits. Type and special bits are kept.
    fn chmod(&self, path: &str, mode: u32) -> FsResult<()>;

    /// Change owner and group.
    fn chown(&self, path: &str, uid: u32, gid: u32) -> FsResult<()>;

    /// Create a hard link `new` to the file at `old`.
    ///
    /// Directories cannot be hard-linked; the new name must not exist.
    fn link(&self, old: &str, new: &str) -> FsResult<()>;

    /// Create a symlink at `link` holding the literal string `target`.
    ///
    /// The target is not resolved or validated at creation time.
    fn symlink(&self, target: &str, link: &str) -> FsResult<()>;

    /// Read a symlink's target without following it.
    fn read_link(&self, path: &str) -> FsResult<String>;

    /// Atomically move `old` to `new`, replacing a compatible existing
    /// destination.
    fn rename(&self, old: &str, new: &str) -> FsResult<()>;

    /// Remove one entry. A non-empty directory fails Invalid.
    fn remove(&self, path: &str) -> FsResult<()>;

    /// Remove an entry and all descendants, releasing every link.
    fn remove_all(&self, path: &str) -> FsResult<()>;

    /// Resize the file at `path` (through symlinks) to `size` bytes.
    fn truncate(&self, path: &str, size: u64) -> FsResult<()>;

    /// Create (or truncate) a file for read-write, mode 0o666.
    fn create(&self, path: &str) -> FsResult<Box<dyn File>>;

    /// Open an existing file read-only.
    fn open(&self, path: &str) -> FsResult<Box<dyn File>>;

    /// Open with explicit flags; `mode` applies when a file is created.
    fn open_file(&self, path: &str, flags: OpenFlags, mode: u32) -> FsResult<Box<dyn File>>;

    /// Metadata for the object at `path`, following a final symlink.
    fn stat(&self, path: &str) -> FsResult<Metadata>;

    /// Metadata for the object at `path`, never following a final symlink.
    fn lstat(&self, path: &str) -> FsResult<Metadata>;
}

/// An open file handle: a cursor over one inode plus a fixed access mode.
///
/// Handles are exclusively owned by their creator; sharing one across
/// threads is the caller's responsibility. After [`close`](File::close)
/// every operation fails Invalid.
pub trait File: Send + fmt::Debug {
    /// Read at the cursor, advancing it. Returns 0 at end of data.
    fn read(&mut self, buf: &mut [u8]) -> FsResult<usize>;

    /// Read at `offset` without moving the cursor.
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> FsResult<usize>;

    /// Write at the cursor, advancing it. Always writes the whole buffer
    /// on the non-error path; positions past end of data zero-pad.
    fn write(&mut self, buf: &[u8]) -> FsResult<usize>;

    /// Write at `offset` without moving the cursor.
    fn write_at(&mut self, buf: &[u8], offset: u64) -> FsResult<usize>;

    /// Write a string at the cursor.
    fn write_str(&mut self, s: &str) -> FsResult<usize>;

    /// Move the cursor. A negative resulting position fails Invalid;
    /// positions past end of data are allowed.
    fn seek(&mut self, pos: SeekFrom) -> FsResult<u64>;

    /// Resize the file to `size` bytes.
    fn truncate(&mut self, size: u64) -> FsResult<()>;

    /// Directory entries sorted by name; `Some(n)` caps the count.
    fn read_dir(&mut self, limit: Option<usize>) -> FsResult<Vec<Metadata>>;

    /// Directory entry names sorted; `Some(n)` caps the count.
    fn read_dir_names(&mut self, limit: Option<usize>) -> FsResult<Vec<String>>;

    /// Metadata of the underlying inode.
    fn stat(&self) -> FsResult<Metadata>;

    /// Replace the low permission bits of the underlying inode.
    fn chmod(&mut self, mode: u32) -> FsResult<()>;

    /// Change owner and group of the underlying inode.
    fn chown(&mut self, uid: u32, gid: u32) -> FsResult<()>;

    /// Flush to stable storage. A checked no-op for the memory engine.
    fn sync(&mut self) -> FsResult<()>;

    /// The handle's unique descriptor number.
    fn fd(&self) -> u64;

    /// The name the handle was opened with.
    fn name(&self) -> &str;

    /// Close the handle. Every later operation, including a second close,
    /// fails Invalid.
    fn close(&mut self) -> FsResult<()>;
}
