//! In-memory POSIX-style virtual filesystem.
//!
//! A path-based filesystem held entirely in process memory, plus a
//! pass-through to the host OS behind the same traits. Key components:
//!
//! - [`FileSystem`] / [`File`] - Core traits for path operations and
//!   open-handle IO
//! - [`MemFs`] - In-memory engine: inode arena, forward-edge directory
//!   tree, POSIX permission checks
//! - [`HostFs`] - Host pass-through (unix), same traits over `std::fs`
//!
//! ## Design Decisions
//!
//! - **Forward edges only**: Directories map names to inode numbers;
//!   `..` is resolved lexically during normalization, never stored.
//! - **Ids never reused**: Inode numbers come from a monotonic counter,
//!   so a stale id can only miss, not alias a new object.
//! - **Per-instance identity**: [`MemFs`] carries explicit
//!   [`Credentials`] instead of consulting process globals, so tests can
//!   act as arbitrary users.
//! - **Synchronous**: All operations are CPU-bound map manipulation and
//!   run to completion on the calling thread.

pub mod backends;
mod dir;
mod error;
mod inode;
mod ops;
mod path;
pub mod perms;
mod types;

#[cfg(unix)]
pub use backends::{HostFile, HostFs};
pub use backends::{MemFile, MemFs};
pub use error::{FsError, FsResult};
pub use inode::{Inode, InodeTable, ROOT_INO};
pub use ops::{File, FileSystem};
pub use path::{MAX_SYMLINK_HOPS, normalize};
pub use types::{
    Credentials, DirEntry, FileType, Ino, Metadata, Mode, OpenFlags, SysAttrs,
};
