//! Library, user and sharing records.
//!
//! A library is a named root folder on disk. Users reach it either by owning
//! it, by being the administrator, or through an [`AccessGrant`].

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// The user id reserved for the administrator account.
pub const ADMIN_USER_ID: UserId = UserId(1);

/// Unique identifier of a library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LibraryId(pub u64);

/// Unique identifier of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for LibraryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LibraryId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(LibraryId).map_err(|_| ProtocolError::InvalidId {
            kind: "library",
            value: s.to_string(),
        })
    }
}

impl FromStr for UserId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(UserId).map_err(|_| ProtocolError::InvalidId {
            kind: "user",
            value: s.to_string(),
        })
    }
}

/// Kind of content a library holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LibraryType {
    #[default]
    Generic,
    Books,
    Movies,
    Shows,
    Music,
}

impl LibraryType {
    /// All library types, in declaration order.
    pub const ALL: [LibraryType; 5] = [
        LibraryType::Generic,
        LibraryType::Books,
        LibraryType::Movies,
        LibraryType::Shows,
        LibraryType::Music,
    ];

    /// The lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            LibraryType::Generic => "generic",
            LibraryType::Books => "books",
            LibraryType::Movies => "movies",
            LibraryType::Shows => "shows",
            LibraryType::Music => "music",
        }
    }
}

impl fmt::Display for LibraryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LibraryType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == lowered)
            .ok_or_else(|| ProtocolError::InvalidLibraryType(s.to_string()))
    }
}

/// A named, filesystem-backed collection rooted at a fixed directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Library {
    /// Library identifier.
    pub id: LibraryId,
    /// Display name.
    pub name: String,
    /// Content type.
    #[serde(rename = "type")]
    pub library_type: LibraryType,
    /// Absolute root folder. Fixed at creation.
    pub root_folder: PathBuf,
    /// The user who created the library.
    pub owner_id: UserId,
}

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User identifier.
    pub id: UserId,
    /// Unique login name.
    pub username: String,
}

impl User {
    /// Create a user record.
    pub fn new(id: UserId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
        }
    }

    /// The administrator is always the first user.
    pub fn is_admin(&self) -> bool {
        self.id == ADMIN_USER_ID
    }
}

/// Right required by an operation on a library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessRight {
    /// List and download entries.
    Read,
    /// Also delete entries.
    Write,
}

/// A per-user, per-library permission record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessGrant {
    /// The shared library.
    pub library_id: LibraryId,
    /// The user it is shared with.
    pub user_id: UserId,
    /// Whether the user may modify the library.
    pub can_write: bool,
}

impl AccessGrant {
    /// Check if this grant satisfies the given right.
    pub fn allows(&self, right: AccessRight) -> bool {
        match right {
            AccessRight::Read => true,
            AccessRight::Write => self.can_write,
        }
    }
}

/// A library as seen by one particular user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibrarySummary {
    pub id: LibraryId,
    pub name: String,
    #[serde(rename = "type")]
    pub library_type: LibraryType,
    /// Effective write permission for the viewing user.
    pub can_write: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_type_serialization() {
        let json = serde_json::to_string(&LibraryType::Movies).unwrap();
        assert_eq!(json, "\"movies\"");

        let restored: LibraryType = serde_json::from_str("\"music\"").unwrap();
        assert_eq!(restored, LibraryType::Music);
    }

    #[test]
    fn test_library_type_from_str() {
        assert_eq!("Books".parse::<LibraryType>().unwrap(), LibraryType::Books);
        assert_eq!("shows".parse::<LibraryType>().unwrap(), LibraryType::Shows);
        assert!(matches!(
            "podcasts".parse::<LibraryType>(),
            Err(ProtocolError::InvalidLibraryType(_))
        ));
    }

    #[test]
    fn test_library_json_shape() {
        let library = Library {
            id: LibraryId(4),
            name: "Photos".to_string(),
            library_type: LibraryType::Generic,
            root_folder: PathBuf::from("/srv/photos"),
            owner_id: UserId(2),
        };

        let value = serde_json::to_value(&library).unwrap();
        assert_eq!(value["id"], 4);
        assert_eq!(value["type"], "generic");
        assert_eq!(value["rootFolder"], "/srv/photos");
        assert_eq!(value["ownerId"], 2);
    }

    #[test]
    fn test_ids_parse() {
        assert_eq!("17".parse::<LibraryId>().unwrap(), LibraryId(17));
        assert_eq!("3".parse::<UserId>().unwrap(), UserId(3));
        assert!("-1".parse::<LibraryId>().is_err());
        assert!("".parse::<UserId>().is_err());
    }

    #[test]
    fn test_admin_is_first_user() {
        assert!(User::new(UserId(1), "admin").is_admin());
        assert!(!User::new(UserId(2), "bob").is_admin());
    }

    #[test]
    fn test_grant_allows() {
        let read_only = AccessGrant {
            library_id: LibraryId(1),
            user_id: UserId(2),
            can_write: false,
        };
        assert!(read_only.allows(AccessRight::Read));
        assert!(!read_only.allows(AccessRight::Write));

        let read_write = AccessGrant {
            can_write: true,
            ..read_only
        };
        assert!(read_write.allows(AccessRight::Write));
    }
}
