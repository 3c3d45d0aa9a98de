//! Library records and the access decisions made against them.

pub mod gate;
pub mod store;

pub use gate::{is_owner_or_admin, Access, AccessGate, LibraryCatalog};
pub use store::{default_store_path, LibraryStore};
