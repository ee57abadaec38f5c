//! Host filesystem engine.
//!
//! A thin pass-through to the operating system: paths go straight to the
//! host, permission checks are the kernel's, and the current working
//! directory is the process's own. Useful for running the same code
//! against real storage that is otherwise exercised in memory.

use std::fmt;
use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::{DirBuilderExt, FileExt, MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use rustix::fs::{Gid, Uid};
use tracing::trace;

use crate::error::{FsError, FsResult};
use crate::ops::{File, FileSystem};
use crate::types::{FileType, Metadata, Mode, OpenFlags, SysAttrs};

/// The host pass-through filesystem.
///
/// Stateless: every instance views the same namespace, and
/// [`chdir`](FileSystem::chdir) moves the working directory of the whole
/// process.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostFs;

impl HostFs {
    /// Create a host filesystem handle.
    pub fn new() -> Self {
        Self
    }
}

/// Translate an OS error for `path` into the portable taxonomy. Kinds
/// without a portable counterpart are carried through as Io.
fn host_err(path: &str, err: io::Error) -> FsError {
    use io::ErrorKind;
    // ELOOP has no stable ErrorKind; match the raw errno.
    if err.raw_os_error() == Some(rustix::io::Errno::LOOP.raw_os_error()) {
        return FsError::TooManyLinks;
    }
    match err.kind() {
        ErrorKind::NotFound => FsError::not_found(path),
        ErrorKind::AlreadyExists => FsError::already_exists(path),
        ErrorKind::PermissionDenied => FsError::permission_denied(path),
        ErrorKind::InvalidInput
        | ErrorKind::IsADirectory
        | ErrorKind::NotADirectory
        | ErrorKind::DirectoryNotEmpty => FsError::invalid(path),
        _ => FsError::Io(err),
    }
}

// `from_raw` is unsafe in this rustix version; every u32 is a valid raw id.
fn to_uid(raw: u32) -> Uid {
    unsafe { Uid::from_raw(raw) }
}

fn to_gid(raw: u32) -> Gid {
    unsafe { Gid::from_raw(raw) }
}

fn kind_of(meta: &fs::Metadata) -> FileType {
    if meta.is_dir() {
        FileType::Directory
    } else if meta.file_type().is_symlink() {
        FileType::Symlink
    } else {
        FileType::File
    }
}

fn to_metadata(name: impl Into<String>, meta: &fs::Metadata, target: Option<String>) -> Metadata {
    Metadata {
        name: name.into(),
        size: meta.len(),
        mode: Mode {
            kind: kind_of(meta),
            perm: meta.mode() & 0o7777,
        },
        mtime: meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH),
        sys: SysAttrs {
            uid: meta.uid(),
            gid: meta.gid(),
            nlink: meta.nlink() as u32,
            xattrs: Default::default(),
            link_target: target,
        },
    }
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "/".to_string())
}

impl FileSystem for HostFs {
    fn chdir(&self, path: &str) -> FsResult<()> {
        std::env::set_current_dir(path).map_err(|e| host_err(path, e))
    }

    fn getwd(&self) -> FsResult<String> {
        let cwd = std::env::current_dir().map_err(FsError::Io)?;
        Ok(cwd.to_string_lossy().into_owned())
    }

    fn mkdir(&self, path: &str, mode: u32) -> FsResult<()> {
        fs::DirBuilder::new()
            .mode(mode)
            .create(path)
            .map_err(|e| host_err(path, e))
    }

    fn mkdir_all(&self, path: &str, mode: u32) -> FsResult<()> {
        fs::DirBuilder::new()
            .recursive(true)
            .mode(mode)
            .create(path)
            .map_err(|e| host_err(path, e))
    }

    fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o777))
            .map_err(|e| host_err(path, e))
    }

    fn chown(&self, path: &str, uid: u32, gid: u32) -> FsResult<()> {
        rustix::fs::chown(path, Some(to_uid(uid)), Some(to_gid(gid)))
            .map_err(|e| host_err(path, e.into()))
    }

    fn link(&self, old: &str, new: &str) -> FsResult<()> {
        fs::hard_link(old, new).map_err(|e| host_err(new, e))
    }

    fn symlink(&self, target: &str, link: &str) -> FsResult<()> {
        std::os::unix::fs::symlink(target, link).map_err(|e| host_err(link, e))
    }

    fn read_link(&self, path: &str) -> FsResult<String> {
        let target = fs::read_link(path).map_err(|e| host_err(path, e))?;
        Ok(target.to_string_lossy().into_owned())
    }

    fn rename(&self, old: &str, new: &str) -> FsResult<()> {
        fs::rename(old, new).map_err(|e| host_err(new, e))
    }

    fn remove(&self, path: &str) -> FsResult<()> {
        let meta = fs::symlink_metadata(path).map_err(|e| host_err(path, e))?;
        if meta.is_dir() {
            fs::remove_dir(path).map_err(|e| host_err(path, e))
        } else {
            fs::remove_file(path).map_err(|e| host_err(path, e))
        }
    }

    fn remove_all(&self, path: &str) -> FsResult<()> {
        let meta = fs::symlink_metadata(path).map_err(|e| host_err(path, e))?;
        if meta.is_dir() {
            fs::remove_dir_all(path).map_err(|e| host_err(path, e))
        } else {
            fs::remove_file(path).map_err(|e| host_err(path, e))
        }
    }

    fn truncate(&self, path: &str, size: u64) -> FsResult<()> {
        let file = fs::OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|e| host_err(path, e))?;
        file.set_len(size).map_err(|e| host_err(path, e))
    }

    fn create(&self, path: &str) -> FsResult<Box<dyn File>> {
        self.open_file(path, OpenFlags::create_truncate(), 0o666)
    }

    fn open(&self, path: &str) -> FsResult<Box<dyn File>> {
        self.open_file(path, OpenFlags::read(), 0)
    }

    fn open_file(&self, path: &str, flags: OpenFlags, mode: u32) -> FsResult<Box<dyn File>> {
        let file = fs::OpenOptions::new()
            .read(flags.read)
            .write(flags.write)
            .append(flags.append)
            .create(flags.create && !flags.exclusive)
            .create_new(flags.create && flags.exclusive)
            .truncate(flags.truncate)
            .mode(mode)
            .open(path)
            .map_err(|e| host_err(path, e))?;
        trace!(path, fd = file.as_raw_fd(), "opened host file");

        Ok(Box::new(HostFile {
            fd: file.as_raw_fd() as u64,
            name: basename(Path::new(path)),
            path: PathBuf::from(path),
            file: Some(file),
        }))
    }

    fn stat(&self, path: &str) -> FsResult<Metadata> {
        let meta = fs::metadata(path).map_err(|e| host_err(path, e))?;
        Ok(to_metadata(basename(Path::new(path)), &meta, None))
    }

    fn lstat(&self, path: &str) -> FsResult<Metadata> {
        let meta = fs::symlink_metadata(path).map_err(|e| host_err(path, e))?;
        let target = if meta.file_type().is_symlink() {
            fs::read_link(path)
                .ok()
                .map(|t| t.to_string_lossy().into_owned())
        } else {
            None
        };
        Ok(to_metadata(basename(Path::new(path)), &meta, target))
    }
}

/// An open host file. Wraps the OS handle; the path is kept for directory
/// listings and error rendering.
pub struct HostFile {
    fd: u64,
    name: String,
    path: PathBuf,
    file: Option<fs::File>,
}

impl fmt::Debug for HostFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFile")
            .field("fd", &self.fd)
            .field("name", &self.name)
            .field("path", &self.path)
            .field("closed", &self.file.is_none())
            .finish()
    }
}

impl HostFile {
    fn file(&self) -> FsResult<&fs::File> {
        self.file
            .as_ref()
            .ok_or_else(|| FsError::invalid("file handle is closed"))
    }

    fn file_mut(&mut self) -> FsResult<&mut fs::File> {
        self.file
            .as_mut()
            .ok_or_else(|| FsError::invalid("file handle is closed"))
    }

    fn err(&self, e: io::Error) -> FsError {
        host_err(&self.name, e)
    }

    fn dir_entries(&self, limit: Option<usize>) -> FsResult<Vec<(String, fs::Metadata)>> {
        self.file()?;
        let mut out = Vec::new();
        let iter = fs::read_dir(&self.path).map_err(|e| self.err(e))?;
        for entry in iter {
            let entry = entry.map_err(|e| self.err(e))?;
            let meta = entry.metadata().map_err(|e| self.err(e))?;
            out.push((entry.file_name().to_string_lossy().into_owned(), meta));
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out.truncate(limit.unwrap_or(usize::MAX));
        Ok(out)
    }
}

impl File for HostFile {
    fn read(&mut self, buf: &mut [u8]) -> FsResult<usize> {
        let name = self.name.clone();
        self.file_mut()?
            .read(buf)
            .map_err(|e| host_err(&name, e))
    }

    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        let file = self.file()?;
        match file.read_at(buf, offset) {
            Ok(n) => Ok(n),
            Err(e) => Err(self.err(e)),
        }
    }

    fn write(&mut self, buf: &[u8]) -> FsResult<usize> {
        let name = self.name.clone();
        self.file_mut()?
            .write_all(buf)
            .map_err(|e| host_err(&name, e))?;
        Ok(buf.len())
    }

    fn write_at(&mut self, buf: &[u8], offset: u64) -> FsResult<usize> {
        let file = self.file()?;
        match file.write_all_at(buf, offset) {
            Ok(()) => Ok(buf.len()),
            Err(e) => Err(self.err(e)),
        }
    }

    fn write_str(&mut self, s: &str) -> FsResult<usize> {
        self.write(s.as_bytes())
    }

    fn seek(&mut self, pos: SeekFrom) -> FsResult<u64> {
        let name = self.name.clone();
        self.file_mut()?
            .seek(pos)
            .map_err(|e| host_err(&name, e))
    }

    fn truncate(&mut self, size: u64) -> FsResult<()> {
        let name = self.name.clone();
        let file = self.file_mut()?;
        file.set_len(size).map_err(|e| host_err(&name, e))?;
        file.seek(SeekFrom::Start(0)).map_err(|e| host_err(&name, e))?;
        Ok(())
    }

    fn read_dir(&mut self, limit: Option<usize>) -> FsResult<Vec<Metadata>> {
        Ok(self
            .dir_entries(limit)?
            .into_iter()
            .map(|(name, meta)| to_metadata(name, &meta, None))
            .collect())
    }

    fn read_dir_names(&mut self, limit: Option<usize>) -> FsResult<Vec<String>> {
        Ok(self
            .dir_entries(limit)?
            .into_iter()
            .map(|(name, _)| name)
            .collect())
    }

    fn stat(&self) -> FsResult<Metadata> {
        let meta = self.file()?.metadata().map_err(|e| self.err(e))?;
        Ok(to_metadata(self.name.clone(), &meta, None))
    }

    fn chmod(&mut self, mode: u32) -> FsResult<()> {
        let file = self.file()?;
        file.set_permissions(fs::Permissions::from_mode(mode & 0o777))
            .map_err(|e| self.err(e))
    }

    fn chown(&mut self, uid: u32, gid: u32) -> FsResult<()> {
        let file = self.file()?;
        rustix::fs::fchown(file, Some(to_uid(uid)), Some(to_gid(gid)))
            .map_err(|e| self.err(e.into()))
    }

    fn sync(&mut self) -> FsResult<()> {
        let file = self.file()?;
        file.sync_all().map_err(|e| self.err(e))
    }

    fn fd(&self) -> u64 {
        self.fd
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn close(&mut self) -> FsResult<()> {
        self.file
            .take()
            .map(|_| ())
            .ok_or_else(|| FsError::invalid("file handle already closed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (HostFs, TempDir) {
        (HostFs::new(), TempDir::new().unwrap())
    }

    fn p(dir: &TempDir, rel: &str) -> String {
        dir.path().join(rel).to_string_lossy().into_owned()
    }

    #[test]
    fn test_create_write_read() {
        let (host, dir) = setup();
        let path = p(&dir, "test.txt");

        let mut f = host.create(&path).unwrap();
        f.write(b"hello world").unwrap();
        f.close().unwrap();

        let mut f = host.open(&path).unwrap();
        let mut buf = [0u8; 32];
        let n = f.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello world");
        assert_eq!(f.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_positional_io() {
        let (host, dir) = setup();
        let path = p(&dir, "pos.bin");

        let mut f = host.create(&path).unwrap();
        f.write(b"0123456789").unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(f.read_at(&mut buf, 6).unwrap(), 4);
        assert_eq!(&buf, b"6789");

        f.write_at(b"XX", 0).unwrap();
        f.seek(SeekFrom::Start(0)).unwrap();
        f.read(&mut buf).unwrap();
        assert_eq!(&buf, b"XX23");
    }

    #[test]
    fn test_mkdir_and_sorted_readdir() {
        let (host, dir) = setup();
        let sub = p(&dir, "sub");
        host.mkdir(&sub, 0o755).unwrap();
        for name in ["zeta", "alpha", "mid"] {
            host.create(&p(&dir, &format!("sub/{name}")))
                .unwrap()
                .close()
                .unwrap();
        }

        let mut d = host.open(&sub).unwrap();
        assert_eq!(
            d.read_dir_names(None).unwrap(),
            vec!["alpha", "mid", "zeta"]
        );
        assert_eq!(d.read_dir(Some(2)).unwrap().len(), 2);
    }

    #[test]
    fn test_mkdir_all() {
        let (host, dir) = setup();
        let deep = p(&dir, "a/b/c");
        host.mkdir_all(&deep, 0o755).unwrap();
        host.mkdir_all(&deep, 0o755).unwrap();
        assert!(host.stat(&deep).unwrap().is_dir());
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let (host, dir) = setup();
        assert!(host.open(&p(&dir, "nope")).unwrap_err().is_not_found());
        assert!(host.stat(&p(&dir, "nope")).unwrap_err().is_not_found());
    }

    #[test]
    fn test_open_file_exclusive() {
        let (host, dir) = setup();
        let path = p(&dir, "excl");
        host.create(&path).unwrap().close().unwrap();

        let err = host
            .open_file(&path, OpenFlags::create_exclusive(), 0o644)
            .unwrap_err();
        assert!(err.is_already_exists());
    }

    #[test]
    fn test_rename_and_remove() {
        let (host, dir) = setup();
        let old = p(&dir, "old");
        let new = p(&dir, "new");

        let mut f = host.create(&old).unwrap();
        f.write(b"content").unwrap();
        f.close().unwrap();

        host.rename(&old, &new).unwrap();
        assert!(host.stat(&old).unwrap_err().is_not_found());
        assert_eq!(host.stat(&new).unwrap().size, 7);

        host.remove(&new).unwrap();
        assert!(host.stat(&new).unwrap_err().is_not_found());
    }

    #[test]
    fn test_remove_non_empty_directory_fails() {
        let (host, dir) = setup();
        let sub = p(&dir, "full");
        host.mkdir(&sub, 0o755).unwrap();
        host.create(&p(&dir, "full/f")).unwrap().close().unwrap();

        assert!(host.remove(&sub).unwrap_err().is_invalid());
        host.remove_all(&sub).unwrap();
        assert!(host.stat(&sub).unwrap_err().is_not_found());
    }

    #[test]
    fn test_symlink_round_trip() {
        let (host, dir) = setup();
        let target = p(&dir, "target");
        let link = p(&dir, "link");

        let mut f = host.create(&target).unwrap();
        f.write(b"via link").unwrap();
        f.close().unwrap();

        host.symlink(&target, &link).unwrap();
        assert_eq!(host.read_link(&link).unwrap(), target);
        assert!(host.lstat(&link).unwrap().is_symlink());
        assert!(host.stat(&link).unwrap().is_file());
    }

    #[test]
    fn test_hard_link_shares_content() {
        let (host, dir) = setup();
        let orig = p(&dir, "orig");
        let alias = p(&dir, "alias");

        let mut f = host.create(&orig).unwrap();
        f.write(b"shared").unwrap();
        f.close().unwrap();

        host.link(&orig, &alias).unwrap();
        assert!(host.stat(&orig).unwrap().sys.nlink >= 2);

        let mut f = host.open(&alias).unwrap();
        let mut buf = [0u8; 16];
        let n = f.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"shared");
    }

    #[test]
    fn test_truncate_and_chmod() {
        let (host, dir) = setup();
        let path = p(&dir, "t");

        let mut f = host.create(&path).unwrap();
        f.write(b"0123456789").unwrap();
        f.close().unwrap();

        host.truncate(&path, 4).unwrap();
        assert_eq!(host.stat(&path).unwrap().size, 4);

        host.chmod(&path, 0o600).unwrap();
        assert_eq!(host.stat(&path).unwrap().mode.perm & 0o777, 0o600);
    }

    #[test]
    fn test_close_is_terminal() {
        let (host, dir) = setup();
        let mut f = host.create(&p(&dir, "c")).unwrap();
        f.close().unwrap();

        let mut buf = [0u8; 1];
        assert!(f.read(&mut buf).unwrap_err().is_invalid());
        assert!(f.close().unwrap_err().is_invalid());
        // Identity survives close.
        assert_eq!(f.name(), "c");
    }

    #[test]
    fn test_symlink_cycle_reports_too_many_links() {
        let (host, dir) = setup();
        let a = p(&dir, "a");
        let b = p(&dir, "b");
        host.symlink(&a, &b).unwrap();
        host.symlink(&b, &a).unwrap();

        assert!(matches!(host.open(&a).unwrap_err(), FsError::TooManyLinks));
        assert!(matches!(host.stat(&a).unwrap_err(), FsError::TooManyLinks));
    }
}
