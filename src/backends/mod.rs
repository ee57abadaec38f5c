//! Filesystem engines.
//!
//! Engines implement [`FileSystem`](crate::FileSystem) over different
//! storage: a self-contained in-memory tree and a pass-through to the
//! host OS.

#[cfg(unix)]
mod host;
mod memory;

#[cfg(unix)]
pub use host::{HostFile, HostFs};
pub use memory::{MemFile, MemFs};
