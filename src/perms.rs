//! POSIX permission evaluation.
//!
//! A pure function over owner/group/other rwx bits and a caller identity.
//! The inode and directory layers never consult ambient process state.

use crate::types::Credentials;

/// Requested access, as a combination of the [`READ`]/[`WRITE`]/[`EXEC`]
/// bits.
pub type Access = u32;

/// Read access bit.
pub const READ: Access = 0o4;
/// Write access bit.
pub const WRITE: Access = 0o2;
/// Execute/search access bit.
pub const EXEC: Access = 0o1;

/// Evaluate whether `creds` may perform `requested` access on an object
/// owned by `uid`:`gid` with permission bits `perm`.
///
/// Standard POSIX evaluation: uid 0 always succeeds; otherwise exactly one
/// 3-bit group is selected by identity precedence (owner first, then group,
/// else other) and every requested bit must be set in that group. Bits are
/// never OR-ed across groups: an owner match that denies access is final
/// even if the group or other bits would allow it.
pub fn check(uid: u32, gid: u32, perm: u32, creds: Credentials, requested: Access) -> bool {
    if creds.uid == 0 {
        return true;
    }

    let granted = if creds.uid == uid {
        (perm >> 6) & 0o7
    } else if creds.gid == gid {
        (perm >> 3) & 0o7
    } else {
        perm & 0o7
    };

    granted & requested == requested
}

#[cfg(test)]
mod tests {
    use super::*;

    const RWX: Access = READ | WRITE | EXEC;

    #[test]
    fn test_root_bypasses_everything() {
        assert!(check(100, 100, 0o000, Credentials::root(), RWX));
    }

    #[test]
    fn test_owner_group_other_denied_on_zero_mode() {
        for (uid, gid, perm) in [(100, 0, 0o000), (0, 200, 0o000), (0, 0, 0o000)] {
            let creds = Credentials::new(100, 200);
            assert!(!check(uid, gid, perm, creds, READ));
            assert!(!check(uid, gid, perm, creds, WRITE));
            assert!(!check(uid, gid, perm, creds, EXEC));
        }
    }

    #[test]
    fn test_each_group_grants() {
        let creds = Credentials::new(100, 200);
        // Owner path
        assert!(check(100, 0, 0o700, creds, RWX));
        // Group path
        assert!(check(0, 200, 0o070, creds, RWX));
        // Other path
        assert!(check(1, 1, 0o007, creds, RWX));
    }

    #[test]
    fn test_first_matching_group_wins() {
        let creds = Credentials::new(100, 200);
        // Caller is owner; owner bits deny even though group+other allow.
        assert!(!check(100, 200, 0o077, creds, READ));
        // Caller matches group (not owner); group bits deny despite other.
        assert!(!check(1, 200, 0o707, creds, READ));
    }

    #[test]
    fn test_partial_request_requires_every_bit() {
        let creds = Credentials::new(100, 200);
        assert!(check(100, 0, 0o600, creds, READ | WRITE));
        assert!(!check(100, 0, 0o600, creds, READ | EXEC));
    }
}
