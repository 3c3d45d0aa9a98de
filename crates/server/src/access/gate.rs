//! Access decisions for library operations.
//!
//! The entry service never decides who may use a library. It asks an
//! [`AccessGate`] before every operation and treats a denial exactly like a
//! missing library.

use anyhow::Result;
use protocol::{AccessRight, Library, LibraryId, User};

/// Outcome of an access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    Deny,
}

impl From<bool> for Access {
    fn from(allowed: bool) -> Self {
        if allowed {
            Access::Allow
        } else {
            Access::Deny
        }
    }
}

/// Decides whether a user holds a right on a library.
pub trait AccessGate: Send + Sync {
    /// Check `right` for `user` on the library with the given id.
    ///
    /// Unknown libraries must be denied rather than reported as errors.
    fn check(&self, user: &User, library_id: LibraryId, right: AccessRight) -> Result<Access>;
}

/// Looks up library records by id.
pub trait LibraryCatalog: Send + Sync {
    /// Get a library by id, or `None` if it does not exist.
    fn get_library(&self, id: LibraryId) -> Result<Option<Library>>;
}

/// The administrator and the library's owner hold every right on it.
pub fn is_owner_or_admin(user: &User, library: &Library) -> bool {
    user.is_admin() || library.owner_id == user.id
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{LibraryType, UserId};
    use std::path::PathBuf;

    fn library(owner: u64) -> Library {
        Library {
            id: LibraryId(1),
            name: "Test Library".to_string(),
            library_type: LibraryType::Generic,
            root_folder: PathBuf::from("/srv/library"),
            owner_id: UserId(owner),
        }
    }

    #[test]
    fn test_admin_and_owner_bypass() {
        let admin = User::new(UserId(1), "admin");
        let owner = User::new(UserId(2), "owner");
        let other = User::new(UserId(3), "other");

        assert!(is_owner_or_admin(&admin, &library(2)));
        assert!(is_owner_or_admin(&owner, &library(2)));
        assert!(!is_owner_or_admin(&other, &library(2)));
    }

    #[test]
    fn test_access_from_bool() {
        assert_eq!(Access::from(true), Access::Allow);
        assert_eq!(Access::from(false), Access::Deny);
    }
}
