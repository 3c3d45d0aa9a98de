//! Persistent library, user and sharing-grant storage.
//!
//! This module provides a thread-safe store that stands in for the relational
//! records the entry service consumes. It persists to JSON, by default at
//! `<data_dir>/libraries.json`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{bail, Context, Result};
use protocol::{
    AccessGrant, AccessRight, Library, LibraryId, LibrarySummary, LibraryType, User, UserId,
};
use serde::{Deserialize, Serialize};

use super::gate::{is_owner_or_admin, Access, AccessGate, LibraryCatalog};

/// Wrapper for serializing the store.
#[derive(Debug, Serialize, Deserialize)]
struct LibraryStoreData {
    /// Version of the store format.
    version: u32,
    users: Vec<User>,
    libraries: Vec<Library>,
    grants: Vec<AccessGrant>,
}

#[derive(Debug, Default)]
struct StoreState {
    users: HashMap<UserId, User>,
    libraries: HashMap<LibraryId, Library>,
    grants: HashMap<(LibraryId, UserId), AccessGrant>,
}

/// Thread-safe store for libraries, users and grants.
///
/// Mutations do not save automatically; call `save()` after making changes.
pub struct LibraryStore {
    /// Path to the JSON file.
    path: PathBuf,
    state: RwLock<StoreState>,
}

impl LibraryStore {
    /// Creates a store that will persist to the given path.
    ///
    /// This does not load the file; call `load()` to read existing data.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            state: RwLock::new(StoreState::default()),
        }
    }

    /// Returns the path to the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreState>> {
        self.state
            .read()
            .map_err(|_| anyhow::anyhow!("Failed to acquire read lock on library store"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreState>> {
        self.state
            .write()
            .map_err(|_| anyhow::anyhow!("Failed to acquire write lock on library store"))
    }

    /// Loads the store from the JSON file.
    ///
    /// If the file does not exist, the store will be empty.
    pub fn load(&self) -> Result<()> {
        if !self.path.exists() {
            tracing::debug!(
                "Library store not found at {:?}, starting empty",
                self.path
            );
            return Ok(());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read library store: {}", self.path.display()))?;

        let data: LibraryStoreData = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse library store: {}", self.path.display()))?;

        let mut state = self.write()?;
        state.users = data.users.into_iter().map(|u| (u.id, u)).collect();
        state.libraries = data.libraries.into_iter().map(|l| (l.id, l)).collect();
        state.grants = data
            .grants
            .into_iter()
            .map(|g| ((g.library_id, g.user_id), g))
            .collect();

        tracing::info!(
            users = state.users.len(),
            libraries = state.libraries.len(),
            grants = state.grants.len(),
            "Loaded library store from {:?}",
            self.path
        );
        Ok(())
    }

    /// Saves the store to the JSON file.
    ///
    /// Writes to a temp file and renames it into place. Creates parent
    /// directories if they don't exist.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create library store directory: {}", parent.display())
            })?;
        }

        let contents = {
            let state = self.read()?;
            let mut data = LibraryStoreData {
                version: 1,
                users: state.users.values().cloned().collect(),
                libraries: state.libraries.values().cloned().collect(),
                grants: state.grants.values().copied().collect(),
            };
            data.users.sort_by_key(|u| u.id);
            data.libraries.sort_by_key(|l| l.id);
            data.grants.sort_by_key(|g| (g.library_id, g.user_id));

            serde_json::to_string_pretty(&data).context("Failed to serialize library store")?
        };

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &contents).with_context(|| {
            format!("Failed to write temp library store: {}", temp_path.display())
        })?;

        fs::rename(&temp_path, &self.path).with_context(|| {
            format!(
                "Failed to rename temp library store {} to {}",
                temp_path.display(),
                self.path.display()
            )
        })?;

        tracing::debug!("Saved library store to {:?}", self.path);
        Ok(())
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Registers a new user. The first user registered becomes the admin.
    ///
    /// Usernames are unique, compared case-insensitively.
    pub fn add_user(&self, username: &str) -> Result<User> {
        let username = username.trim();
        if username.is_empty() {
            bail!("Username must not be empty");
        }

        let mut state = self.write()?;
        if state
            .users
            .values()
            .any(|u| u.username.eq_ignore_ascii_case(username))
        {
            bail!("User {:?} already exists", username);
        }

        let id = UserId(state.users.keys().map(|id| id.0).max().unwrap_or(0) + 1);
        let user = User::new(id, username);
        tracing::info!(user_id = %id, username, admin = user.is_admin(), "Adding user");

        state.users.insert(id, user.clone());
        Ok(user)
    }

    /// Gets a user by id.
    pub fn get_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    /// Finds a user by username (case-insensitive).
    pub fn find_user(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .read()?
            .users
            .values()
            .find(|u| u.username.eq_ignore_ascii_case(username))
            .cloned())
    }

    /// Lists all users ordered by id.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut users: Vec<User> = self.read()?.users.values().cloned().collect();
        users.sort_by_key(|u| u.id);
        Ok(users)
    }

    // =========================================================================
    // Libraries
    // =========================================================================

    /// Registers a new library.
    ///
    /// The root folder must be an existing absolute directory and the owner
    /// must be a known user. The root folder never changes afterwards.
    pub fn add_library(
        &self,
        name: &str,
        library_type: LibraryType,
        root_folder: &Path,
        owner_id: UserId,
    ) -> Result<Library> {
        let name = name.trim();
        if name.is_empty() {
            bail!("Library name must not be empty");
        }
        if !root_folder.is_absolute() {
            bail!("Library root must be an absolute path: {}", root_folder.display());
        }
        let metadata = fs::metadata(root_folder).with_context(|| {
            format!("Library root is not accessible: {}", root_folder.display())
        })?;
        if !metadata.is_dir() {
            bail!("Library root is not a directory: {}", root_folder.display());
        }

        let mut state = self.write()?;
        if !state.users.contains_key(&owner_id) {
            bail!("Owner {} not found in library store", owner_id);
        }

        let id = LibraryId(state.libraries.keys().map(|id| id.0).max().unwrap_or(0) + 1);
        let library = Library {
            id,
            name: name.to_string(),
            library_type,
            root_folder: root_folder.to_path_buf(),
            owner_id,
        };

        tracing::info!(
            library_id = %id,
            name,
            root = %root_folder.display(),
            "Adding library"
        );

        state.libraries.insert(id, library.clone());
        Ok(library)
    }

    /// Lists all libraries ordered by id.
    pub fn list_libraries(&self) -> Result<Vec<Library>> {
        let mut libraries: Vec<Library> = self.read()?.libraries.values().cloned().collect();
        libraries.sort_by_key(|l| l.id);
        Ok(libraries)
    }

    /// Lists the libraries a user can see, with their effective write right.
    pub fn libraries_for(&self, user: &User) -> Result<Vec<LibrarySummary>> {
        let state = self.read()?;
        let mut summaries: Vec<LibrarySummary> = state
            .libraries
            .values()
            .filter_map(|library| {
                let can_write = if is_owner_or_admin(user, library) {
                    true
                } else {
                    state.grants.get(&(library.id, user.id))?.can_write
                };
                Some(LibrarySummary {
                    id: library.id,
                    name: library.name.clone(),
                    library_type: library.library_type,
                    can_write,
                })
            })
            .collect();
        summaries.sort_by_key(|s| s.id);
        Ok(summaries)
    }

    // =========================================================================
    // Grants
    // =========================================================================

    /// Shares a library with a user, replacing any existing grant.
    pub fn share(
        &self,
        library_id: LibraryId,
        user_id: UserId,
        can_write: bool,
    ) -> Result<AccessGrant> {
        let mut state = self.write()?;
        if !state.libraries.contains_key(&library_id) {
            bail!("Library {} not found in library store", library_id);
        }
        if !state.users.contains_key(&user_id) {
            bail!("User {} not found in library store", user_id);
        }

        let grant = AccessGrant {
            library_id,
            user_id,
            can_write,
        };
        tracing::info!(
            library_id = %library_id,
            user_id = %user_id,
            can_write,
            "Sharing library"
        );

        state.grants.insert((library_id, user_id), grant);
        Ok(grant)
    }

    /// Revokes a user's grant on a library.
    ///
    /// Returns the removed grant if one existed.
    pub fn unshare(&self, library_id: LibraryId, user_id: UserId) -> Result<Option<AccessGrant>> {
        let removed = self.write()?.grants.remove(&(library_id, user_id));
        if removed.is_some() {
            tracing::info!(library_id = %library_id, user_id = %user_id, "Unsharing library");
        }
        Ok(removed)
    }

    /// Lists the grants on a library ordered by user id.
    pub fn grants_for(&self, library_id: LibraryId) -> Result<Vec<AccessGrant>> {
        let mut grants: Vec<AccessGrant> = self
            .read()?
            .grants
            .values()
            .filter(|g| g.library_id == library_id)
            .copied()
            .collect();
        grants.sort_by_key(|g| g.user_id);
        Ok(grants)
    }
}

impl LibraryCatalog for LibraryStore {
    fn get_library(&self, id: LibraryId) -> Result<Option<Library>> {
        Ok(self.read()?.libraries.get(&id).cloned())
    }
}

impl AccessGate for LibraryStore {
    fn check(&self, user: &User, library_id: LibraryId, right: AccessRight) -> Result<Access> {
        let state = self.read()?;

        let Some(library) = state.libraries.get(&library_id) else {
            return Ok(Access::Deny);
        };

        if is_owner_or_admin(user, library) {
            return Ok(Access::Allow);
        }

        Ok(state
            .grants
            .get(&(library_id, user.id))
            .map(|grant| grant.allows(right))
            .unwrap_or(false)
            .into())
    }
}

/// Returns the default store path inside a data directory.
pub fn default_store_path(data_dir: &Path) -> PathBuf {
    data_dir.join("libraries.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store(temp_dir: &TempDir) -> LibraryStore {
        LibraryStore::new(temp_dir.path().join("libraries.json"))
    }

    /// Store with admin (1), owner (2) and guest (3), plus one library owned by 2.
    fn populated_store(temp_dir: &TempDir) -> (LibraryStore, Library) {
        let store = create_test_store(temp_dir);
        store.add_user("admin").unwrap();
        let owner = store.add_user("owner").unwrap();
        store.add_user("guest").unwrap();

        let root = temp_dir.path().join("lib");
        fs::create_dir(&root).unwrap();
        let library = store
            .add_library("Test Library", LibraryType::Generic, &root, owner.id)
            .unwrap();
        (store, library)
    }

    #[test]
    fn test_first_user_is_admin() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_test_store(&temp_dir);

        let admin = store.add_user("admin").unwrap();
        let bob = store.add_user("bob").unwrap();

        assert!(admin.is_admin());
        assert_eq!(bob.id, UserId(2));
        assert!(!bob.is_admin());
    }

    #[test]
    fn test_duplicate_username_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_test_store(&temp_dir);

        store.add_user("alice").unwrap();
        assert!(store.add_user("ALICE").is_err());
        assert!(store.add_user("   ").is_err());
        assert_eq!(store.find_user("Alice").unwrap().unwrap().username, "alice");
    }

    #[test]
    fn test_add_library_validates_root() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_test_store(&temp_dir);
        let owner = store.add_user("admin").unwrap();

        let file = temp_dir.path().join("file.txt");
        fs::write(&file, "x").unwrap();

        assert!(store
            .add_library("Relative", LibraryType::Books, Path::new("relative/dir"), owner.id)
            .is_err());
        assert!(store
            .add_library("Missing", LibraryType::Books, &temp_dir.path().join("nope"), owner.id)
            .is_err());
        assert!(store
            .add_library("File", LibraryType::Books, &file, owner.id)
            .is_err());
        assert!(store
            .add_library("Orphan", LibraryType::Books, temp_dir.path(), UserId(99))
            .is_err());

        let library = store
            .add_library("Books", LibraryType::Books, temp_dir.path(), owner.id)
            .unwrap();
        assert_eq!(library.id, LibraryId(1));
        assert_eq!(store.get_library(library.id).unwrap(), Some(library));
    }

    #[test]
    fn test_check_without_grant_denies() {
        let temp_dir = TempDir::new().unwrap();
        let (store, library) = populated_store(&temp_dir);
        let guest = store.find_user("guest").unwrap().unwrap();

        assert_eq!(
            store.check(&guest, library.id, AccessRight::Read).unwrap(),
            Access::Deny
        );
    }

    #[test]
    fn test_check_admin_and_owner_allowed() {
        let temp_dir = TempDir::new().unwrap();
        let (store, library) = populated_store(&temp_dir);
        let admin = store.get_user(UserId(1)).unwrap().unwrap();
        let owner = store.get_user(UserId(2)).unwrap().unwrap();

        for user in [&admin, &owner] {
            for right in [AccessRight::Read, AccessRight::Write] {
                assert_eq!(store.check(user, library.id, right).unwrap(), Access::Allow);
            }
        }
    }

    #[test]
    fn test_check_respects_grant_level() {
        let temp_dir = TempDir::new().unwrap();
        let (store, library) = populated_store(&temp_dir);
        let guest = store.find_user("guest").unwrap().unwrap();

        store.share(library.id, guest.id, false).unwrap();
        assert_eq!(store.check(&guest, library.id, AccessRight::Read).unwrap(), Access::Allow);
        assert_eq!(store.check(&guest, library.id, AccessRight::Write).unwrap(), Access::Deny);

        // Sharing again replaces the grant.
        store.share(library.id, guest.id, true).unwrap();
        assert_eq!(store.check(&guest, library.id, AccessRight::Write).unwrap(), Access::Allow);
        assert_eq!(store.grants_for(library.id).unwrap().len(), 1);

        let removed = store.unshare(library.id, guest.id).unwrap();
        assert!(removed.is_some());
        assert_eq!(store.check(&guest, library.id, AccessRight::Read).unwrap(), Access::Deny);
    }

    #[test]
    fn test_check_unknown_library_denies() {
        let temp_dir = TempDir::new().unwrap();
        let (store, _library) = populated_store(&temp_dir);
        let admin = store.get_user(UserId(1)).unwrap().unwrap();

        assert_eq!(
            store.check(&admin, LibraryId(42), AccessRight::Read).unwrap(),
            Access::Deny
        );
    }

    #[test]
    fn test_share_requires_known_records() {
        let temp_dir = TempDir::new().unwrap();
        let (store, library) = populated_store(&temp_dir);

        assert!(store.share(LibraryId(42), UserId(3), false).is_err());
        assert!(store.share(library.id, UserId(42), false).is_err());
        assert!(store.unshare(library.id, UserId(3)).unwrap().is_none());
    }

    #[test]
    fn test_libraries_for_user() {
        let temp_dir = TempDir::new().unwrap();
        let (store, library) = populated_store(&temp_dir);
        let admin = store.get_user(UserId(1)).unwrap().unwrap();
        let guest = store.find_user("guest").unwrap().unwrap();

        assert!(store.libraries_for(&guest).unwrap().is_empty());

        store.share(library.id, guest.id, false).unwrap();
        let visible = store.libraries_for(&guest).unwrap();
        assert_eq!(visible.len(), 1);
        assert!(!visible[0].can_write);

        let visible = store.libraries_for(&admin).unwrap();
        assert_eq!(visible.len(), 1);
        assert!(visible[0].can_write);
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let (store, library) = populated_store(&temp_dir);
        store.share(library.id, UserId(3), true).unwrap();
        store.save().unwrap();

        let reloaded = create_test_store(&temp_dir);
        reloaded.load().unwrap();

        assert_eq!(reloaded.list_users().unwrap().len(), 3);
        assert_eq!(reloaded.list_libraries().unwrap(), vec![library.clone()]);
        let grants = reloaded.grants_for(library.id).unwrap();
        assert_eq!(grants.len(), 1);
        assert!(grants[0].can_write);

        // Ids continue after reload.
        let next = reloaded.add_user("dave").unwrap();
        assert_eq!(next.id, UserId(4));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_test_store(&temp_dir);

        store.load().unwrap();
        assert!(store.list_libraries().unwrap().is_empty());
    }

    #[test]
    fn test_load_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_test_store(&temp_dir);
        fs::write(store.path(), "{ not json").unwrap();

        assert!(store.load().is_err());
    }

    #[test]
    fn test_save_is_atomic_and_creates_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/dir/libraries.json");
        let store = LibraryStore::new(&path);
        store.add_user("admin").unwrap();

        store.save().unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_default_store_path() {
        let path = default_store_path(Path::new("/var/lib/clearcloud"));
        assert_eq!(path, PathBuf::from("/var/lib/clearcloud/libraries.json"));
    }
}
