//! Core filesystem types.
//!
//! Plain data carried across the `FileSystem`/`File` trait boundary.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::SystemTime;

/// Inode number. Strictly increasing, never reused within a table instance.
pub type Ino = u64;

/// File type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
}

impl FileType {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }

    /// Returns true if this is a symbolic link.
    pub fn is_symlink(&self) -> bool {
        matches!(self, FileType::Symlink)
    }
}

/// File mode: a type tag plus the low 12 permission/special bits.
///
/// `perm` holds the rwx bits (0o777) and the setuid/setgid/sticky bits
/// (0o7000). The type tag is separate so that `chmod` cannot change what
/// kind of object an inode is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mode {
    /// Object kind.
    pub kind: FileType,
    /// Permission and special bits (masked to 0o7777).
    pub perm: u32,
}

impl Mode {
    /// A regular-file mode.
    pub fn file(perm: u32) -> Self {
        Self {
            kind: FileType::File,
            perm: perm & 0o7777,
        }
    }

    /// A directory mode.
    pub fn directory(perm: u32) -> Self {
        Self {
            kind: FileType::Directory,
            perm: perm & 0o7777,
        }
    }

    /// A symlink mode. Symlinks are conventionally 0o777.
    pub fn symlink() -> Self {
        Self {
            kind: FileType::Symlink,
            perm: 0o777,
        }
    }

    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    /// Returns true if this is a symbolic link.
    pub fn is_symlink(&self) -> bool {
        self.kind.is_symlink()
    }

    /// Replace the low 9 permission bits, preserving kind and special bits.
    pub fn with_perm(self, perm: u32) -> Self {
        Self {
            kind: self.kind,
            perm: (self.perm & 0o7000) | (perm & 0o777),
        }
    }
}

/// Raw inode attributes exposed through [`Metadata::sys`] for callers that
/// need owner, group, xattrs, or the symlink target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SysAttrs {
    /// Owner user id.
    pub uid: u32,
    /// Owner group id.
    pub gid: u32,
    /// Number of directory entries referencing the inode.
    pub nlink: u32,
    /// Extended attributes.
    pub xattrs: HashMap<String, String>,
    /// Symlink target, if the inode is a symlink.
    pub link_target: Option<String>,
}

/// File metadata, as returned by `stat`/`lstat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    /// Final name component ("/" for the root).
    pub name: String,
    /// Byte length for regular files, target length for symlinks, 0 for
    /// directories.
    pub size: u64,
    /// Mode and type bits.
    pub mode: Mode,
    /// Last modification time.
    pub mtime: SystemTime,
    /// Raw attribute payload.
    pub sys: SysAttrs,
}

impl Metadata {
    /// Returns true if this describes a regular file.
    pub fn is_file(&self) -> bool {
        self.mode.is_file()
    }

    /// Returns true if this describes a directory.
    pub fn is_dir(&self) -> bool {
        self.mode.is_dir()
    }

    /// Returns true if this describes a symbolic link.
    pub fn is_symlink(&self) -> bool {
        self.mode.is_symlink()
    }
}

/// Directory entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Entry type.
    pub kind: FileType,
}

impl DirEntry {
    /// Create a new directory entry.
    pub fn new(name: impl Into<String>, kind: FileType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Open file flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags {
    /// Read access requested.
    pub read: bool,
    /// Write access requested.
    pub write: bool,
    /// Append mode: every write lands at end of data.
    pub append: bool,
    /// Create if not exists.
    pub create: bool,
    /// Truncate on open.
    pub truncate: bool,
    /// Exclusive create (fail if exists).
    pub exclusive: bool,
}

impl Default for OpenFlags {
    fn default() -> Self {
        Self {
            read: true,
            write: false,
            append: false,
            create: false,
            truncate: false,
            exclusive: false,
        }
    }
}

impl OpenFlags {
    /// Read-only access.
    pub fn read() -> Self {
        Self::default()
    }

    /// Read-write access.
    pub fn write() -> Self {
        Self {
            read: true,
            write: true,
            ..Default::default()
        }
    }

    /// Create with write access.
    pub fn create() -> Self {
        Self {
            read: true,
            write: true,
            create: true,
            ..Default::default()
        }
    }

    /// Create exclusively (fail if exists).
    pub fn create_exclusive() -> Self {
        Self {
            read: true,
            write: true,
            create: true,
            exclusive: true,
            ..Default::default()
        }
    }

    /// Create and truncate.
    pub fn create_truncate() -> Self {
        Self {
            read: true,
            write: true,
            create: true,
            truncate: true,
            ..Default::default()
        }
    }

    /// Open for appending, creating if missing.
    pub fn append() -> Self {
        Self {
            read: true,
            write: true,
            append: true,
            create: true,
            ..Default::default()
        }
    }
}

/// Caller identity used for permission checks.
///
/// Held by the filesystem instance and passed explicitly into every check;
/// there is no process-wide mutable identity. Tests that need to simulate
/// another user's view swap the instance credentials around the call under
/// test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Effective user id. Uid 0 bypasses all permission checks.
    pub uid: u32,
    /// Effective group id.
    pub gid: u32,
}

impl Credentials {
    /// Create credentials from explicit ids.
    pub fn new(uid: u32, gid: u32) -> Self {
        Self { uid, gid }
    }

    /// The privileged identity.
    pub fn root() -> Self {
        Self { uid: 0, gid: 0 }
    }

    /// The real ids of the calling process.
    #[cfg(unix)]
    pub fn current() -> Self {
        Self {
            uid: rustix::process::getuid().as_raw(),
            gid: rustix::process::getgid().as_raw(),
        }
    }

    /// The real ids of the calling process (non-unix fallback).
    #[cfg(not(unix))]
    pub fn current() -> Self {
        Self::root()
    }
}
