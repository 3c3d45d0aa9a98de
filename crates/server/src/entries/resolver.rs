//! Confinement of user-supplied paths to a library root.
//!
//! Resolution is purely lexical: the user path is joined onto the root and
//! `.`/`..` segments are folded without touching the filesystem. The result is
//! accepted only if it is the root itself or one of its descendants, compared
//! component by component so that `/libraryfoo` never matches `/library`.

use std::path::{Component, Path, PathBuf};

use tracing::warn;

use super::error::EntryError;

/// An absolute path proven to lie within a specific library root.
///
/// Only [`PathResolver`] can construct one, so holding a `ResolvedPath` is
/// evidence that the path was validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    root: PathBuf,
    path: PathBuf,
}

impl ResolvedPath {
    /// The validated absolute path.
    pub fn as_path(&self) -> &Path {
        &self.path
    }

    /// Whether this path denotes the library root itself.
    pub fn is_root(&self) -> bool {
        self.path == self.root
    }

    /// Final path segment, or `None` for the library root.
    pub fn file_name(&self) -> Option<String> {
        if self.is_root() {
            return None;
        }
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
    }

    /// Path relative to the library root, `/`-prefixed. The root is `/`.
    pub fn relative(&self) -> String {
        relative_display(&self.root, &self.path)
    }

    /// The containing directory relative to the library root.
    ///
    /// The root's own parent is reported as `/`.
    pub fn parent_relative(&self) -> String {
        match self.path.parent() {
            Some(parent) if !self.is_root() => relative_display(&self.root, parent),
            _ => "/".to_string(),
        }
    }

    /// A direct child of this path, named by a single directory entry.
    ///
    /// Names coming from `read_dir` never contain separators, so the child
    /// stays confined.
    pub(crate) fn child(&self, name: &std::ffi::OsStr) -> ResolvedPath {
        ResolvedPath {
            root: self.root.clone(),
            path: self.path.join(name),
        }
    }
}

impl AsRef<Path> for ResolvedPath {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

/// Resolves untrusted relative paths against one library root.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    /// Create a resolver for the given library root.
    ///
    /// A relative root is made absolute against the working directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let absolute = std::path::absolute(&root).unwrap_or(root);
        Self {
            root: normalize_lexically(&absolute),
        }
    }

    /// The normalized library root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a user-supplied path into a path confined to the root.
    ///
    /// Empty, `/` and `.` all resolve to the root itself.
    pub fn resolve(&self, user_path: &str) -> Result<ResolvedPath, EntryError> {
        if user_path.contains('\0') {
            warn!(path = ?user_path, "Rejected path containing NUL byte");
            return Err(EntryError::PathTraversal(user_path.to_string()));
        }

        let mut joined = self.root.clone();
        for segment in user_path.split(std::path::is_separator) {
            if !segment.is_empty() {
                joined.push(segment);
            }
        }

        let normalized = normalize_lexically(&joined);
        if !normalized.starts_with(&self.root) {
            warn!(
                root = %self.root.display(),
                path = ?user_path,
                "Path traversal attempt detected"
            );
            return Err(EntryError::PathTraversal(user_path.to_string()));
        }

        Ok(ResolvedPath {
            root: self.root.clone(),
            path: normalized,
        })
    }
}

/// Fold `.` and `..` components without consulting the filesystem.
///
/// `..` at the filesystem root stays at the root.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(segment) => out.push(segment),
        }
    }
    out
}

fn relative_display(root: &Path, path: &Path) -> String {
    let Ok(relative) = path.strip_prefix(root) else {
        return "/".to_string();
    };
    let segments: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    format!("/{}", segments.join("/"))
}
