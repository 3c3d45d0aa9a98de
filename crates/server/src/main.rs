//! ClearCloud server
//!
//! Command-line administration of libraries, users and grants, plus local
//! access to the entry endpoints.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use http::{Method, Request, StatusCode};
use protocol::{ErrorMessage, LibraryId, LibraryType, User, UserId};
use server::access::LibraryStore;
use server::config::{default_config_path, Config};
use server::router::{EntriesRouter, ResponseBody};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// ClearCloud - multi-user file library server.
#[derive(Parser, Debug)]
#[command(name = "clearcloud")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Manage users
    #[command(subcommand)]
    Users(UsersCommands),

    /// Manage libraries and sharing
    #[command(subcommand)]
    Libraries(LibrariesCommands),

    /// List, download and delete library entries
    #[command(subcommand)]
    Entries(EntriesCommands),
}

/// Subcommands for user management.
#[derive(Subcommand, Debug, Clone)]
pub enum UsersCommands {
    /// Register a user. The first user becomes the administrator.
    Add {
        /// Login name
        username: String,
    },

    /// List all users
    List,
}

/// Subcommands for library management.
#[derive(Subcommand, Debug, Clone)]
pub enum LibrariesCommands {
    /// Create a library rooted at an existing directory
    Add {
        /// Display name
        #[arg(long)]
        name: String,

        /// Library type (generic, books, movies, shows, music)
        #[arg(long = "type", value_name = "TYPE", default_value = "generic")]
        library_type: LibraryType,

        /// Root folder of the library
        #[arg(long, value_name = "DIR")]
        root: PathBuf,

        /// Owning user (name or id)
        #[arg(long)]
        owner: String,
    },

    /// List libraries
    List {
        /// Only show libraries visible to this user (name or id)
        #[arg(long)]
        user: Option<String>,
    },

    /// Share a library with a user
    Share {
        /// Library id
        library: LibraryId,

        /// User (name or id)
        user: String,

        /// Allow the user to modify the library
        #[arg(long)]
        write: bool,
    },

    /// Revoke a user's access to a library
    Unshare {
        /// Library id
        library: LibraryId,

        /// User (name or id)
        user: String,
    },
}

/// Subcommands for entry access.
#[derive(Subcommand, Debug, Clone)]
pub enum EntriesCommands {
    /// List a directory, or describe a single entry with --path
    Ls {
        /// Library id
        library: LibraryId,

        /// Act as this user (name or id)
        #[arg(long, short)]
        user: String,

        /// Directory to list (default: the library root)
        #[arg(long)]
        parent: Option<String>,

        /// Entry to describe
        #[arg(long)]
        path: Option<String>,
    },

    /// Download a file
    Get {
        /// Library id
        library: LibraryId,

        /// Path of the file inside the library
        path: String,

        /// Act as this user (name or id)
        #[arg(long, short)]
        user: String,

        /// Write to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Delete a file or directory
    Rm {
        /// Library id
        library: LibraryId,

        /// Path of the entry inside the library
        path: String,

        /// Act as this user (name or id)
        #[arg(long, short)]
        user: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = Config::load(&config_path)?;

    // Apply environment variable overrides
    let overrides = config.apply_env_overrides();

    // Validate configuration
    config.validate()?;

    // Keep the guard alive so buffered log lines are flushed on exit
    let _log_guard = init_tracing(&config, cli.verbose)?;
    tracing::debug!("Using config file: {:?}", config_path);
    for (key, value) in &overrides {
        tracing::info!("Overriding {} from environment: {}", key, value);
    }

    let store = Arc::new(LibraryStore::new(config.store_path()));
    store.load()?;

    match cli.command {
        Commands::Users(cmd) => match cmd {
            UsersCommands::Add { username } => {
                let user = store.add_user(&username)?;
                store.save()?;
                if user.is_admin() {
                    println!("User {} created with id {} (administrator)", user.username, user.id);
                } else {
                    println!("User {} created with id {}", user.username, user.id);
                }
            }
            UsersCommands::List => {
                let users = store.list_users()?;
                if users.is_empty() {
                    println!("No users registered.");
                } else {
                    println!("Registered users:");
                    for user in users {
                        let role = if user.is_admin() { " (admin)" } else { "" };
                        println!("  {} - {}{}", user.id, user.username, role);
                    }
                }
            }
        },
        Commands::Libraries(cmd) => match cmd {
            LibrariesCommands::Add {
                name,
                library_type,
                root,
                owner,
            } => {
                let owner = resolve_user(&store, &owner)?;
                let root = std::fs::canonicalize(&root).with_context(|| {
                    format!("Library root is not accessible: {}", root.display())
                })?;
                let library = store.add_library(&name, library_type, &root, owner.id)?;
                store.save()?;
                println!(
                    "Library {} created with id {} at {}",
                    library.name,
                    library.id,
                    library.root_folder.display()
                );
            }
            LibrariesCommands::List { user } => match user {
                Some(user) => {
                    let user = resolve_user(&store, &user)?;
                    let libraries = store.libraries_for(&user)?;
                    if libraries.is_empty() {
                        println!("No libraries visible to {}.", user.username);
                    } else {
                        println!("Libraries visible to {}:", user.username);
                        for library in libraries {
                            let access = if library.can_write { "read-write" } else { "read-only" };
                            println!(
                                "  {} - {} [{}] ({})",
                                library.id, library.name, library.library_type, access
                            );
                        }
                    }
                }
                None => {
                    let libraries = store.list_libraries()?;
                    if libraries.is_empty() {
                        println!("No libraries registered.");
                    } else {
                        println!("Libraries:");
                        for library in libraries {
                            println!(
                                "  {} - {} [{}] {} (owner {})",
                                library.id,
                                library.name,
                                library.library_type,
                                library.root_folder.display(),
                                library.owner_id
                            );
                            for grant in store.grants_for(library.id)? {
                                let name = store
                                    .get_user(grant.user_id)?
                                    .map(|u| u.username)
                                    .unwrap_or_else(|| grant.user_id.to_string());
                                let access = if grant.can_write { "read-write" } else { "read-only" };
                                println!("      shared with {} ({})", name, access);
                            }
                        }
                    }
                }
            },
            LibrariesCommands::Share {
                library,
                user,
                write,
            } => {
                let user = resolve_user(&store, &user)?;
                store.share(library, user.id, write)?;
                store.save()?;
                let access = if write { "read-write" } else { "read-only" };
                println!("Library {} shared with {} ({})", library, user.username, access);
            }
            LibrariesCommands::Unshare { library, user } => {
                let user = resolve_user(&store, &user)?;
                if store.unshare(library, user.id)?.is_some() {
                    store.save()?;
                    println!("Library {} is no longer shared with {}", library, user.username);
                } else {
                    println!("Library {} was not shared with {}", library, user.username);
                }
            }
        },
        Commands::Entries(cmd) => {
            let router = EntriesRouter::new(Arc::clone(&store))
                .with_chunk_size(config.entries.download_chunk_size);
            run_entries_command(&router, &store, cmd).await?;
        }
    }

    Ok(())
}

/// Install the global tracing subscriber.
///
/// `--verbose` wins over `RUST_LOG`, which wins over the configured level.
/// Returns the file writer's guard when logging to a file.
fn init_tracing(config: &Config, verbose: bool) -> anyhow::Result<Option<WorkerGuard>> {
    let directive = if verbose {
        "debug".to_string()
    } else {
        std::env::var("RUST_LOG")
            .ok()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| config.server.log_level.to_lowercase())
    };
    let filter = EnvFilter::try_new(&directive)
        .with_context(|| format!("Invalid log filter: {directive}"))?;

    let Some(log_file) = &config.server.log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        return Ok(None);
    };

    let file_name = log_file
        .file_name()
        .with_context(|| format!("log_file must name a file: {}", log_file.display()))?;
    let directory = match log_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(directory)
        .with_context(|| format!("Failed to create log directory: {}", directory.display()))?;

    let appender = tracing_appender::rolling::never(directory, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(writer)
        .init();

    Ok(Some(guard))
}

/// Find a user by numeric id or by username.
fn resolve_user(store: &LibraryStore, name_or_id: &str) -> anyhow::Result<User> {
    if let Ok(id) = name_or_id.parse::<UserId>() {
        if let Some(user) = store.get_user(id)? {
            return Ok(user);
        }
    }

    match store.find_user(name_or_id)? {
        Some(user) => Ok(user),
        None => bail!("Unknown user: {}", name_or_id),
    }
}

/// Build an entry endpoint URI with an encoded query string.
fn entries_uri(library: LibraryId, suffix: &str, params: &[(&str, &str)]) -> String {
    let mut uri = format!("/api/libraries/{library}/entries{suffix}");
    if !params.is_empty() {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish();
        uri.push('?');
        uri.push_str(&query);
    }
    uri
}

async fn run_entries_command(
    router: &EntriesRouter<LibraryStore>,
    store: &LibraryStore,
    cmd: EntriesCommands,
) -> anyhow::Result<()> {
    match cmd {
        EntriesCommands::Ls {
            library,
            user,
            parent,
            path,
        } => {
            let user = resolve_user(store, &user)?;
            let mut params = Vec::new();
            if let Some(parent) = parent.as_deref() {
                params.push(("parent", parent));
            }
            if let Some(path) = path.as_deref() {
                params.push(("path", path));
            }

            let uri = entries_uri(library, "", &params);
            let body = send(router, Method::GET, &uri, &user, StatusCode::OK).await?;
            let bytes = body.into_bytes().await?;
            let entries: serde_json::Value =
                serde_json::from_slice(&bytes).context("Invalid listing response")?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        EntriesCommands::Get {
            library,
            path,
            user,
            output,
        } => {
            let user = resolve_user(store, &user)?;
            let uri = entries_uri(library, "/download", &[("path", &path)]);
            let body = send(router, Method::GET, &uri, &user, StatusCode::OK).await?;

            match output {
                Some(output) => {
                    let mut file = tokio::fs::File::create(&output)
                        .await
                        .with_context(|| format!("Failed to create {}", output.display()))?;
                    let written = write_body(body, &mut file).await?;
                    eprintln!("Saved {} bytes to {}", written, output.display());
                }
                None => {
                    let mut stdout = tokio::io::stdout();
                    write_body(body, &mut stdout).await?;
                }
            }
        }
        EntriesCommands::Rm {
            library,
            path,
            user,
        } => {
            let user = resolve_user(store, &user)?;
            let uri = entries_uri(library, "", &[("path", &path)]);
            send(router, Method::DELETE, &uri, &user, StatusCode::NO_CONTENT).await?;
            println!("Deleted {}", path);
        }
    }

    Ok(())
}

/// Route a request, failing unless the expected status comes back.
async fn send(
    router: &EntriesRouter<LibraryStore>,
    method: Method,
    uri: &str,
    user: &User,
    expected: StatusCode,
) -> anyhow::Result<ResponseBody> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(())
        .context("Failed to build request")?;

    let response = router.route(&request, Some(user)).await;
    let status = response.status();
    if status == expected {
        return Ok(response.into_body());
    }

    let bytes = response.into_body().into_bytes().await?;
    match serde_json::from_slice::<ErrorMessage>(&bytes) {
        Ok(err) => bail!("{} ({})", err.message, status),
        Err(_) => bail!("{}", status),
    }
}

/// Copy a response body to a writer, chunk by chunk for downloads.
async fn write_body<W: AsyncWrite + Unpin>(body: ResponseBody, writer: &mut W) -> anyhow::Result<u64> {
    let mut written = 0u64;
    match body {
        ResponseBody::Download(mut stream) => {
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.context("Failed to read download")?;
                writer.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
        }
        other => {
            let bytes = other.into_bytes().await?;
            writer.write_all(&bytes).await?;
            written += bytes.len() as u64;
        }
    }
    writer.flush().await?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::TempDir;

    #[test]
    fn test_cli_debug_assert() {
        // Verify the CLI structure is valid
        Cli::command().debug_assert();
    }

    #[test]
    fn test_users_add_command() {
        let cli = Cli::try_parse_from(["clearcloud", "users", "add", "alice"]).unwrap();
        match cli.command {
            Commands::Users(UsersCommands::Add { username }) => assert_eq!(username, "alice"),
            _ => panic!("Expected Users Add command"),
        }
    }

    #[test]
    fn test_libraries_add_command() {
        let cli = Cli::try_parse_from([
            "clearcloud",
            "libraries",
            "add",
            "--name",
            "Films",
            "--type",
            "movies",
            "--root",
            "/srv/films",
            "--owner",
            "alice",
        ])
        .unwrap();
        match cli.command {
            Commands::Libraries(LibrariesCommands::Add {
                name,
                library_type,
                root,
                owner,
            }) => {
                assert_eq!(name, "Films");
                assert_eq!(library_type, LibraryType::Movies);
                assert_eq!(root, PathBuf::from("/srv/films"));
                assert_eq!(owner, "alice");
            }
            _ => panic!("Expected Libraries Add command"),
        }
    }

    #[test]
    fn test_libraries_add_rejects_unknown_type() {
        let result = Cli::try_parse_from([
            "clearcloud",
            "libraries",
            "add",
            "--name",
            "Podcasts",
            "--type",
            "podcasts",
            "--root",
            "/srv/podcasts",
            "--owner",
            "1",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_libraries_share_command() {
        let cli =
            Cli::try_parse_from(["clearcloud", "libraries", "share", "3", "bob", "--write"])
                .unwrap();
        match cli.command {
            Commands::Libraries(LibrariesCommands::Share {
                library,
                user,
                write,
            }) => {
                assert_eq!(library, LibraryId(3));
                assert_eq!(user, "bob");
                assert!(write);
            }
            _ => panic!("Expected Libraries Share command"),
        }
    }

    #[test]
    fn test_entries_ls_command() {
        let cli = Cli::try_parse_from([
            "clearcloud",
            "--verbose",
            "entries",
            "ls",
            "1",
            "--user",
            "alice",
            "--parent",
            "/sub",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Entries(EntriesCommands::Ls {
                library,
                user,
                parent,
                path,
            }) => {
                assert_eq!(library, LibraryId(1));
                assert_eq!(user, "alice");
                assert_eq!(parent.as_deref(), Some("/sub"));
                assert!(path.is_none());
            }
            _ => panic!("Expected Entries Ls command"),
        }
    }

    #[test]
    fn test_entries_get_command() {
        let cli = Cli::try_parse_from([
            "clearcloud",
            "entries",
            "get",
            "1",
            "docs/report.pdf",
            "-u",
            "2",
            "-o",
            "report.pdf",
        ])
        .unwrap();
        match cli.command {
            Commands::Entries(EntriesCommands::Get {
                library,
                path,
                user,
                output,
            }) => {
                assert_eq!(library, LibraryId(1));
                assert_eq!(path, "docs/report.pdf");
                assert_eq!(user, "2");
                assert_eq!(output, Some(PathBuf::from("report.pdf")));
            }
            _ => panic!("Expected Entries Get command"),
        }
    }

    #[test]
    fn test_entries_rm_requires_user() {
        let result = Cli::try_parse_from(["clearcloud", "entries", "rm", "1", "dir"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_entries_uri() {
        assert_eq!(
            entries_uri(LibraryId(4), "", &[]),
            "/api/libraries/4/entries"
        );
        assert_eq!(
            entries_uri(LibraryId(4), "/download", &[("path", "my docs/a&b.txt")]),
            "/api/libraries/4/entries/download?path=my+docs%2Fa%26b.txt"
        );
    }

    #[test]
    fn test_resolve_user_by_name_or_id() {
        let temp_dir = TempDir::new().unwrap();
        let store = LibraryStore::new(temp_dir.path().join("libraries.json"));
        store.add_user("admin").unwrap();
        store.add_user("bob").unwrap();

        assert_eq!(resolve_user(&store, "2").unwrap().username, "bob");
        assert_eq!(resolve_user(&store, "Bob").unwrap().id, UserId(2));
        assert!(resolve_user(&store, "carol").is_err());
        assert!(resolve_user(&store, "9").is_err());
    }

    #[tokio::test]
    async fn test_send_unexpected_status_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("library");
        std::fs::create_dir(&root).unwrap();

        let store = Arc::new(LibraryStore::new(temp_dir.path().join("libraries.json")));
        let admin = store.add_user("admin").unwrap();
        store
            .add_library("Test", LibraryType::Generic, &root, admin.id)
            .unwrap();
        let router = EntriesRouter::new(Arc::clone(&store));

        let uri = entries_uri(LibraryId(1), "/download", &[("path", "nope.txt")]);
        let err = send(&router, Method::GET, &uri, &admin, StatusCode::OK)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "not found (404 Not Found)");

        let uri = entries_uri(LibraryId(1), "", &[("path", "/")]);
        let err = send(&router, Method::DELETE, &uri, &admin, StatusCode::NO_CONTENT)
            .await
            .unwrap_err();
        assert!(err.to_string().ends_with("(400 Bad Request)"));
    }

    #[tokio::test]
    async fn test_write_body_streams_download() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("library");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(root.join("gimme.txt"), "Hello World!\n").unwrap();

        let store = Arc::new(LibraryStore::new(temp_dir.path().join("libraries.json")));
        let admin = store.add_user("admin").unwrap();
        store
            .add_library("Test", LibraryType::Generic, &root, admin.id)
            .unwrap();
        let router = EntriesRouter::new(Arc::clone(&store));

        let uri = entries_uri(LibraryId(1), "/download", &[("path", "gimme.txt")]);
        let body = send(&router, Method::GET, &uri, &admin, StatusCode::OK)
            .await
            .unwrap();

        let mut buffer: Vec<u8> = Vec::new();
        let written = write_body(body, &mut buffer).await.unwrap();
        assert_eq!(written, 13);
        assert_eq!(buffer, b"Hello World!\n");
    }
}
