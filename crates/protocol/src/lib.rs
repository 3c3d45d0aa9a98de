//! # ClearCloud Protocol Library
//!
//! Wire types shared by the ClearCloud server and its clients.
//!
//! ## Overview
//!
//! - **Library records**: libraries, users, sharing grants and access rights
//! - **File entries**: the JSON shape of a directory listing entry
//! - **Errors**: error response bodies and parse failures
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{AccessGrant, AccessRight, LibraryId, UserId};
//!
//! let grant = AccessGrant {
//!     library_id: LibraryId(4),
//!     user_id: UserId(2),
//!     can_write: false,
//! };
//! assert!(grant.allows(AccessRight::Read));
//! assert!(!grant.allows(AccessRight::Write));
//! ```
//!
//! ## Modules
//!
//! - [`library`]: Library, user and grant records
//! - [`entries`]: File entry definitions
//! - [`error`]: Error types

pub mod entries;
pub mod error;
pub mod library;

pub use entries::{EntryCategory, FileInfo};
pub use error::{ErrorCode, ErrorMessage, ProtocolError, Result};
pub use library::{
    AccessGrant, AccessRight, Library, LibraryId, LibrarySummary, LibraryType, User, UserId,
    ADMIN_USER_ID,
};
