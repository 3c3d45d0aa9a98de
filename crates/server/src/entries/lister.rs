//! Directory listing for library entries.
//!
//! Every call re-reads the filesystem. Nothing is cached, and a listing that
//! races with external changes may be partial.

use std::fs::Metadata;
use std::io;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use protocol::{EntryCategory, FileInfo};
use tokio::fs;
use tracing::debug;

use super::error::EntryError;
use super::resolver::ResolvedPath;

/// Produces sorted, typed metadata for library entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryLister;

impl EntryLister {
    /// Create a new lister.
    pub fn new() -> Self {
        Self
    }

    /// List a resolved path.
    ///
    /// - A directory yields its immediate children sorted by name (byte order).
    /// - A file yields a single entry describing it.
    /// - A missing path yields an empty list.
    pub async fn list(&self, resolved: &ResolvedPath) -> Result<Vec<FileInfo>, EntryError> {
        let Some(metadata) = metadata_if_exists(resolved).await? else {
            debug!(path = %resolved.relative(), "Listing missing path");
            return Ok(Vec::new());
        };

        if !metadata.is_dir() {
            return Ok(vec![describe(resolved, &metadata)]);
        }

        let mut dir = fs::read_dir(resolved.as_path()).await?;
        let mut results = Vec::new();

        while let Some(entry) = dir.next_entry().await? {
            let child = resolved.child(&entry.file_name());

            // Follows symlinks; dangling links vanish like deleted children.
            let metadata = match metadata_if_exists(&child).await? {
                Some(m) => m,
                None => {
                    debug!(path = %child.relative(), "Entry vanished during listing");
                    continue;
                }
            };

            results.push(describe(&child, &metadata));
        }

        results.sort_by(|a, b| a.name.cmp(&b.name));

        debug!(
            path = %resolved.relative(),
            count = results.len(),
            "Listed directory"
        );
        Ok(results)
    }

    /// Describe exactly one entry.
    ///
    /// Returns `None` for a missing path and for the library root, which is
    /// not itself an entry of the library.
    pub async fn stat(&self, resolved: &ResolvedPath) -> Result<Option<FileInfo>, EntryError> {
        if resolved.is_root() {
            return Ok(None);
        }

        Ok(metadata_if_exists(resolved)
            .await?
            .map(|metadata| describe(resolved, &metadata)))
    }
}

/// Stat a path, mapping "does not exist" to `None`.
///
/// A path that walks through a regular file (`file.txt/child`) also counts as
/// missing.
async fn metadata_if_exists(resolved: &ResolvedPath) -> Result<Option<Metadata>, EntryError> {
    match fs::metadata(resolved.as_path()).await {
        Ok(metadata) => Ok(Some(metadata)),
        Err(e) if is_missing(&e) => Ok(None),
        Err(e) => Err(EntryError::Io(e)),
    }
}

pub(crate) fn is_missing(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}

fn describe(resolved: &ResolvedPath, metadata: &Metadata) -> FileInfo {
    let is_directory = metadata.is_dir();

    let category = if is_directory {
        EntryCategory::Folder
    } else if !metadata.is_file() {
        EntryCategory::Binary
    } else {
        EntryCategory::from_extension(
            resolved
                .as_path()
                .extension()
                .and_then(|e| e.to_str()),
        )
    };

    let size = if metadata.is_file() { metadata.len() } else { 0 };

    let modified: DateTime<Utc> = metadata
        .modified()
        .unwrap_or(SystemTime::UNIX_EPOCH)
        .into();

    FileInfo {
        name: resolved.file_name().unwrap_or_default(),
        parent: resolved.parent_relative(),
        is_directory,
        category,
        size,
        modified,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entries::PathResolver;
    use std::fs as std_fs;
    use tempfile::TempDir;

    fn create_test_structure(dir: &std::path::Path) {
        std_fs::write(dir.join("root.txt"), "Root file\n").unwrap();
        std_fs::create_dir_all(dir.join("sub")).unwrap();
        std_fs::write(dir.join("sub/foo.txt"), "I am foo\n").unwrap();
        std_fs::write(dir.join("sub/bar.txt"), "I am bar\n").unwrap();
    }

    #[tokio::test]
    async fn test_list_directory_sorted_by_name() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());
        let resolver = PathResolver::new(temp_dir.path());

        let entries = EntryLister::new()
            .list(&resolver.resolve("/sub").unwrap())
            .await
            .unwrap();

        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["bar.txt", "foo.txt"]);
        assert!(entries.iter().all(|e| e.parent == "/sub"));
        assert_eq!(entries[0].size, 9);
        assert_eq!(entries[0].category, EntryCategory::Document);
    }

    #[tokio::test]
    async fn test_list_ordering_is_case_sensitive() {
        let temp_dir = TempDir::new().unwrap();
        std_fs::write(temp_dir.path().join("apple.txt"), "a").unwrap();
        std_fs::write(temp_dir.path().join("Zebra.txt"), "z").unwrap();
        std_fs::create_dir(temp_dir.path().join("Beta")).unwrap();
        std_fs::write(temp_dir.path().join("alpha.txt"), "a").unwrap();
        let resolver = PathResolver::new(temp_dir.path());

        let entries = EntryLister::new()
            .list(&resolver.resolve("").unwrap())
            .await
            .unwrap();

        // Byte order puts uppercase before lowercase, with no directory grouping.
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Beta", "Zebra.txt", "alpha.txt", "apple.txt"]);
    }

    #[tokio::test]
    async fn test_list_root_children() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());
        let resolver = PathResolver::new(temp_dir.path());

        let entries = EntryLister::new()
            .list(&resolver.resolve("").unwrap())
            .await
            .unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "root.txt");
        assert_eq!(entries[0].parent, "/");
        assert!(!entries[0].is_directory);
        assert_eq!(entries[1].name, "sub");
        assert!(entries[1].is_directory);
        assert_eq!(entries[1].size, 0);
        assert_eq!(entries[1].category, EntryCategory::Folder);
    }

    #[tokio::test]
    async fn test_list_file_yields_single_entry() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());
        let resolver = PathResolver::new(temp_dir.path());

        let entries = EntryLister::new()
            .list(&resolver.resolve("root.txt").unwrap())
            .await
            .unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "root.txt");
        assert_eq!(entries[0].size, 10);
    }

    #[tokio::test]
    async fn test_list_missing_path_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = PathResolver::new(temp_dir.path());
        let lister = EntryLister::new();

        let entries = lister
            .list(&resolver.resolve("/no/file/here").unwrap())
            .await
            .unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_list_through_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());
        let resolver = PathResolver::new(temp_dir.path());

        let entries = EntryLister::new()
            .list(&resolver.resolve("root.txt/child").unwrap())
            .await
            .unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_list_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = PathResolver::new(temp_dir.path());

        let entries = EntryLister::new()
            .list(&resolver.resolve("/").unwrap())
            .await
            .unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_stat_file() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());
        let resolver = PathResolver::new(temp_dir.path());

        let entry = EntryLister::new()
            .stat(&resolver.resolve("sub/foo.txt").unwrap())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(entry.name, "foo.txt");
        assert_eq!(entry.parent, "/sub");
        assert!(!entry.is_directory);
    }

    #[tokio::test]
    async fn test_stat_directory_describes_itself() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());
        let resolver = PathResolver::new(temp_dir.path());

        let entry = EntryLister::new()
            .stat(&resolver.resolve("sub").unwrap())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(entry.name, "sub");
        assert!(entry.is_directory);
        assert_eq!(entry.size, 0);
    }

    #[tokio::test]
    async fn test_stat_root_and_missing_are_none() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());
        let resolver = PathResolver::new(temp_dir.path());
        let lister = EntryLister::new();

        assert!(lister.stat(&resolver.resolve("").unwrap()).await.unwrap().is_none());
        assert!(lister
            .stat(&resolver.resolve("nope.txt").unwrap())
            .await
            .unwrap()
            .is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_special_file_is_binary() {
        let temp_dir = TempDir::new().unwrap();
        let _listener =
            std::os::unix::net::UnixListener::bind(temp_dir.path().join("app.txt")).unwrap();
        let resolver = PathResolver::new(temp_dir.path());

        let entries = EntryLister::new()
            .list(&resolver.resolve("app.txt").unwrap())
            .await
            .unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].category, EntryCategory::Binary);
        assert_eq!(entries[0].size, 0);
    }

    #[tokio::test]
    async fn test_modified_comes_from_filesystem() {
        let temp_dir = TempDir::new().unwrap();
        std_fs::write(temp_dir.path().join("fresh.txt"), "new").unwrap();
        let resolver = PathResolver::new(temp_dir.path());

        let before = Utc::now() - chrono::Duration::minutes(5);
        let entry = EntryLister::new()
            .stat(&resolver.resolve("fresh.txt").unwrap())
            .await
            .unwrap()
            .unwrap();

        assert!(entry.modified > before);
    }
}
