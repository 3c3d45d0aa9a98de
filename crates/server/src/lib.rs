//! # ClearCloud Server Library
//!
//! This crate provides the library-confined file entry service for ClearCloud,
//! a multi-user file library manager.
//!
//! ## Overview
//!
//! Each library is a named root directory on disk, shared among users with
//! read or read-write grants. The server provides:
//!
//! - **Path Resolution**: Confine untrusted relative paths to a library root
//! - **Entry Listing**: Sorted, typed metadata for directories and files
//! - **Download and Delete**: Streamed downloads and idempotent removal
//! - **Access Control**: Per-user, per-library grants with an owner/admin bypass
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Entries Router                         │
//! │      GET/DELETE /api/libraries/{id}/entries[/download]       │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ┌───────────────────────┐     ┌──────────────────────────┐  │
//! │  │  Library Store        │     │  PathResolver            │  │
//! │  │  (catalog + gate)     │     │          │               │  │
//! │  └───────────────────────┘     │   EntryLister            │  │
//! │                                │   EntryAccessor          │  │
//! │                                └──────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use server::access::LibraryStore;
//! use server::router::EntriesRouter;
//! use server::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!
//!     let store = Arc::new(LibraryStore::new(config.store_path()));
//!     store.load()?;
//!
//!     let router = EntriesRouter::new(store)
//!         .with_chunk_size(config.entries.download_chunk_size);
//!
//!     let request = http::Request::get("/api/libraries/1/entries?parent=").body(())?;
//!     let response = router.route(&request, None).await;
//!     assert_eq!(response.status(), http::StatusCode::UNAUTHORIZED);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`entries`]: Path resolution, listing, download and delete
//! - [`access`]: Library records, grants and access decisions
//! - [`router`]: HTTP request routing and error mapping

pub mod access;
pub mod config;
pub mod entries;
pub mod router;

// Re-export protocol for convenience
pub use protocol;

// Re-export config types for convenience
pub use config::{Config, ConfigError};

// Re-export access types for convenience
pub use access::{Access, AccessGate, LibraryCatalog, LibraryStore};

// Re-export entry types for convenience
pub use entries::{DownloadStream, EntryAccessor, EntryError, EntryLister, PathResolver, ResolvedPath};

// Re-export router types for convenience
pub use router::{ApiError, EntriesRouter, ResponseBody};
