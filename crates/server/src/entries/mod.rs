//! Library-confined file entry service.
//!
//! This module turns untrusted relative paths into filesystem operations
//! beneath a library root:
//! - Path resolution with lexical confinement to the root
//! - Sorted directory listing and single-entry lookup
//! - Streamed downloads and idempotent, recursive deletes
//!
//! # Security
//!
//! Every filesystem call goes through a [`ResolvedPath`], which can only be
//! produced by [`PathResolver::resolve`]. Raw user strings never reach the
//! filesystem API.

pub mod accessor;
pub mod error;
pub mod lister;
pub mod resolver;

pub use accessor::{DownloadStream, EntryAccessor, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};
pub use error::EntryError;
pub use lister::EntryLister;
pub use resolver::{PathResolver, ResolvedPath};
