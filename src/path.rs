//! Path normalization and resolution.
//!
//! A path string is first normalized into an ordered list of name
//! components, then walked through the directory tree from the root.
//! Symlinks are resolved by splicing their target into the remaining
//! component list and re-walking, with a fixed hop bound.

use std::sync::Arc;

use crate::dir::DirTree;
use crate::error::{FsError, FsResult};
use crate::inode::{Inode, InodeTable, ROOT_INO};
use crate::perms::{EXEC, READ};
use crate::types::Credentials;

/// Maximum symlink expansions in one resolution. Matches the Linux
/// `MAXSYMLINKS` convention.
pub const MAX_SYMLINK_HOPS: usize = 40;

/// Normalize `path` into name components.
///
/// Empty segments and `.` are dropped, so trailing and doubled separators
/// are ignored. `..` pops the previous component; popping past the start
/// fails NotFound — ascending beyond the root is an error, not a clamp.
/// Relative paths are evaluated against `cwd` (the current directory's own
/// component list).
pub fn normalize(path: &str, cwd: &[String]) -> FsResult<Vec<String>> {
    let mut terms: Vec<String> = if path.starts_with('/') {
        Vec::new()
    } else {
        cwd.to_vec()
    };

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if terms.pop().is_none() {
                    return Err(FsError::not_found(path));
                }
            }
            name => terms.push(name.to_string()),
        }
    }

    Ok(terms)
}

/// Walks normalized component lists through the tree.
pub struct Resolver<'a> {
    inodes: &'a InodeTable,
    dirs: &'a DirTree,
    creds: Credentials,
}

impl<'a> Resolver<'a> {
    /// Create a resolver evaluating permissions as `creds`.
    pub fn new(inodes: &'a InodeTable, dirs: &'a DirTree, creds: Credentials) -> Self {
        Self {
            inodes,
            dirs,
            creds,
        }
    }

    /// Resolve a component list to an inode.
    ///
    /// Each traversed directory requires read+execute for the caller.
    /// A non-directory in an interior position fails Invalid. Symlinks in
    /// interior positions are always followed; the final component is
    /// followed only when `follow_final` is set (lstat/readlink pass
    /// false). An empty list is the root itself, returned without any
    /// entry lookup.
    pub fn resolve(&self, terms: &[String], follow_final: bool) -> FsResult<Arc<Inode>> {
        let mut terms = terms.to_vec();
        let mut cur = self.inodes.get(ROOT_INO)?;
        let mut idx = 0;
        let mut hops = 0;

        while idx < terms.len() {
            if !cur.is_dir() {
                return Err(FsError::invalid(format!(
                    "{} is not a directory",
                    render(&terms[..idx])
                )));
            }
            if !cur.check_access(self.creds, READ | EXEC) {
                return Err(FsError::permission_denied(render(&terms[..idx])));
            }

            let name = terms[idx].clone();
            let child_ino = self
                .dirs
                .lookup(cur.ino, &name)
                .map_err(|_| FsError::not_found(render(&terms[..=idx])))?;
            let child = self.inodes.get(child_ino)?;

            let is_final = idx + 1 == terms.len();
            if child.is_symlink() && (!is_final || follow_final) {
                hops += 1;
                if hops > MAX_SYMLINK_HOPS {
                    return Err(FsError::TooManyLinks);
                }

                let target = child
                    .read()
                    .target
                    .clone()
                    .ok_or_else(|| FsError::invalid("symlink without target"))?;

                // Splice: the target is evaluated against the symlink's
                // parent, then the unconsumed components are appended and
                // the walk restarts from the root.
                let mut next = normalize(&target, &terms[..idx])?;
                next.extend_from_slice(&terms[idx + 1..]);
                terms = next;
                idx = 0;
                cur = self.inodes.get(ROOT_INO)?;
                continue;
            }

            cur = child;
            idx += 1;
        }

        Ok(cur)
    }
}

fn render(terms: &[String]) -> String {
    let mut s = String::from("/");
    s.push_str(&terms.join("/"));
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Mode;

    #[test]
    fn test_normalize_basic_forms() {
        let cwd: Vec<String> = vec![];
        assert!(normalize("/", &cwd).unwrap().is_empty());
        assert_eq!(normalize("/tmp", &cwd).unwrap(), vec!["tmp"]);
        assert_eq!(normalize("/tmp/", &cwd).unwrap(), vec!["tmp"]);
        assert_eq!(normalize("/tmp/test", &cwd).unwrap(), vec!["tmp", "test"]);
        assert_eq!(normalize("/tmp/test//", &cwd).unwrap(), vec!["tmp", "test"]);
        assert_eq!(
            normalize("/tmp/./test/", &cwd).unwrap(),
            vec!["tmp", "test"]
        );
    }

    #[test]
    fn test_normalize_dotdot_pairs() {
        let cwd: Vec<String> = vec![];
        assert_eq!(
            normalize("/tmp/test/../test/", &cwd).unwrap(),
            vec!["tmp", "test"]
        );
        assert_eq!(normalize("/a/b/c/../../d", &cwd).unwrap(), vec!["a", "d"]);
    }

    #[test]
    fn test_normalize_dotdot_past_root_is_not_found() {
        let cwd: Vec<String> = vec![];
        assert!(
            normalize("/tmp/../../test/", &cwd)
                .unwrap_err()
                .is_not_found()
        );
        assert!(normalize("/..", &cwd).unwrap_err().is_not_found());
    }

    #[test]
    fn test_normalize_relative_uses_cwd() {
        let cwd = vec!["home".to_string(), "amy".to_string()];
        assert_eq!(
            normalize("notes.txt", &cwd).unwrap(),
            vec!["home", "amy", "notes.txt"]
        );
        assert_eq!(normalize("..", &cwd).unwrap(), vec!["home"]);
        assert_eq!(normalize("../../etc", &cwd).unwrap(), vec!["etc"]);
        assert!(normalize("../../../x", &cwd).unwrap_err().is_not_found());
    }

    // Fixture: /dir/file, /dir/sub/, symlinks added per test.
    fn fixture() -> (InodeTable, DirTree) {
        let inodes = InodeTable::new();
        let dirs = DirTree::new();

        let root = inodes.allocate(0, 0, Mode::directory(0o755));
        dirs.add_dir(root.ino);

        let dir = inodes.allocate(0, 0, Mode::directory(0o755));
        dirs.add_dir(dir.ino);
        dirs.insert(root.ino, "dir", dir.ino).unwrap();

        let file = inodes.allocate(0, 0, Mode::file(0o644));
        dirs.insert(dir.ino, "file", file.ino).unwrap();

        let sub = inodes.allocate(0, 0, Mode::directory(0o755));
        dirs.add_dir(sub.ino);
        dirs.insert(dir.ino, "sub", sub.ino).unwrap();

        (inodes, dirs)
    }

    fn symlink(inodes: &InodeTable, dirs: &DirTree, parent: &str, name: &str, target: &str) {
        let r = Resolver::new(inodes, dirs, Credentials::root());
        let parent_terms = normalize(parent, &[]).unwrap();
        let parent_ino = r.resolve(&parent_terms, true).unwrap().ino;
        let link = inodes.allocate(0, 0, Mode::symlink());
        link.write().target = Some(target.to_string());
        dirs.insert(parent_ino, name, link.ino).unwrap();
    }

    #[test]
    fn test_resolve_walks_and_roots() {
        let (inodes, dirs) = fixture();
        let r = Resolver::new(&inodes, &dirs, Credentials::root());

        assert_eq!(r.resolve(&[], true).unwrap().ino, ROOT_INO);

        let terms = normalize("/dir/file", &[]).unwrap();
        let found = r.resolve(&terms, true).unwrap();
        assert!(found.mode().is_file());
    }

    #[test]
    fn test_resolve_interior_non_directory() {
        let (inodes, dirs) = fixture();
        let r = Resolver::new(&inodes, &dirs, Credentials::root());

        let terms = normalize("/dir/file/deeper", &[]).unwrap();
        assert!(r.resolve(&terms, true).unwrap_err().is_invalid());
    }

    #[test]
    fn test_resolve_missing_component() {
        let (inodes, dirs) = fixture();
        let r = Resolver::new(&inodes, &dirs, Credentials::root());

        let terms = normalize("/dir/ghost", &[]).unwrap();
        assert!(r.resolve(&terms, true).unwrap_err().is_not_found());
    }

    #[test]
    fn test_resolve_requires_search_permission() {
        let (inodes, dirs) = fixture();
        let terms = normalize("/dir/file", &[]).unwrap();

        // dir is 0755 owned by root; an unrelated user may search it.
        let user = Resolver::new(&inodes, &dirs, Credentials::new(100, 100));
        assert!(user.resolve(&terms, true).is_ok());

        // Drop all permission bits on /dir: traversal now fails.
        let dir_terms = normalize("/dir", &[]).unwrap();
        let root = Resolver::new(&inodes, &dirs, Credentials::root());
        let dir = root.resolve(&dir_terms, true).unwrap();
        dir.write().mode = Mode::directory(0o000);

        assert!(
            user.resolve(&terms, true)
                .unwrap_err()
                .is_permission_denied()
        );
        // Root still passes.
        assert!(root.resolve(&terms, true).is_ok());
    }

    #[test]
    fn test_resolve_follows_interior_symlink() {
        let (inodes, dirs) = fixture();
        symlink(&inodes, &dirs, "/", "alias", "/dir");

        let r = Resolver::new(&inodes, &dirs, Credentials::root());
        let terms = normalize("/alias/file", &[]).unwrap();
        let found = r.resolve(&terms, true).unwrap();
        assert!(found.mode().is_file());
    }

    #[test]
    fn test_resolve_relative_symlink_target() {
        let (inodes, dirs) = fixture();
        // /dir/rel -> ../dir/file, relative to /dir.
        symlink(&inodes, &dirs, "/dir", "rel", "../dir/file");

        let r = Resolver::new(&inodes, &dirs, Credentials::root());
        let terms = normalize("/dir/rel", &[]).unwrap();
        assert!(r.resolve(&terms, true).unwrap().mode().is_file());
    }

    #[test]
    fn test_resolve_final_symlink_not_followed_when_asked() {
        let (inodes, dirs) = fixture();
        symlink(&inodes, &dirs, "/", "alias", "/dir/file");

        let r = Resolver::new(&inodes, &dirs, Credentials::root());
        let terms = normalize("/alias", &[]).unwrap();

        let nofollow = r.resolve(&terms, false).unwrap();
        assert!(nofollow.mode().is_symlink());

        let follow = r.resolve(&terms, true).unwrap();
        assert!(follow.mode().is_file());
    }

    #[test]
    fn test_resolve_symlink_cycle_bounded() {
        let (inodes, dirs) = fixture();
        symlink(&inodes, &dirs, "/", "a", "/b");
        symlink(&inodes, &dirs, "/", "b", "/a");

        let r = Resolver::new(&inodes, &dirs, Credentials::root());
        let terms = normalize("/a", &[]).unwrap();
        assert!(matches!(
            r.resolve(&terms, true).unwrap_err(),
            FsError::TooManyLinks
        ));
    }
}
