//! CLI argument parsing for revstore.
//!
//! Global flags override the config file and environment.

use clap::{Args, Parser, Subcommand, ValueEnum};
use revstore_types::{ResourceKey, VersionMatch};

/// Versioned resource store
///
/// Reads and writes resources in a local RocksDB database.
#[derive(Parser, Debug)]
#[command(name = "revstore")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default <config dir>/revstore/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Override database path
    #[arg(long, global = true)]
    pub db_path: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Identity of one resource.
#[derive(Args, Debug, Clone)]
pub struct KeyArgs {
    /// API group, e.g. "apps"
    pub group: String,

    /// Resource type, e.g. "deployments"
    pub resource: String,

    /// Object name
    pub name: String,

    #[arg(short, long, default_value = "default")]
    pub namespace: String,
}

impl KeyArgs {
    pub fn to_key(&self) -> ResourceKey {
        ResourceKey::new(
            self.namespace.clone(),
            self.group.clone(),
            self.resource.clone(),
            self.name.clone(),
        )
    }
}

/// Payload source for writes.
#[derive(Args, Debug, Clone)]
pub struct PayloadArgs {
    /// Read the payload from this file instead of stdin
    #[arg(short, long)]
    pub file: Option<String>,

    /// Folder recorded with the revision
    #[arg(long, default_value = "")]
    pub folder: String,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchArg {
    /// Revisions at or before --rv; without --rv, since the last delete
    #[default]
    Unset,
    /// Only the revision equal to --rv
    Exact,
    /// Revisions at or after --rv, oldest first
    NotOlderThan,
}

impl From<MatchArg> for VersionMatch {
    fn from(arg: MatchArg) -> Self {
        match arg {
            MatchArg::Unset => VersionMatch::Unset,
            MatchArg::Exact => VersionMatch::Exact,
            MatchArg::NotOlderThan => VersionMatch::NotOlderThan,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a resource
    Create {
        #[command(flatten)]
        key: KeyArgs,

        #[command(flatten)]
        payload: PayloadArgs,
    },

    /// Update a live resource
    Update {
        #[command(flatten)]
        key: KeyArgs,

        #[command(flatten)]
        payload: PayloadArgs,

        /// Fail unless this is the latest revision (0 skips the check)
        #[arg(long, default_value = "0")]
        previous_rv: i64,
    },

    /// Delete a live resource
    Delete {
        #[command(flatten)]
        key: KeyArgs,

        /// Latest revision of the resource
        #[arg(long)]
        previous_rv: i64,
    },

    /// Read the latest revision, or the one visible at --rv
    Get {
        #[command(flatten)]
        key: KeyArgs,

        #[arg(long, default_value = "0")]
        rv: i64,
    },

    /// List live resources of one type
    List {
        group: String,

        resource: String,

        /// Restrict to one namespace (all namespaces when omitted)
        #[arg(short, long, default_value = "")]
        namespace: String,

        /// Page size (0 for everything)
        #[arg(long, default_value = "0")]
        limit: i64,

        /// Continue token from a previous page
        #[arg(short, long)]
        token: Option<String>,

        /// Snapshot revision for the first page
        #[arg(long, default_value = "0")]
        rv: i64,
    },

    /// Show the revision history of one resource
    History {
        #[command(flatten)]
        key: KeyArgs,

        #[arg(long, default_value = "0")]
        rv: i64,

        #[arg(long = "match", value_enum, default_value_t)]
        version_match: MatchArg,

        #[arg(long, default_value = "0")]
        limit: i64,

        #[arg(short, long)]
        token: Option<String>,
    },

    /// Show the deleted revision of a resource that was not recreated
    Trash {
        #[command(flatten)]
        key: KeyArgs,
    },

    /// Count live resources per type
    Stats {
        /// Restrict to one namespace (all namespaces when empty)
        #[arg(short, long, default_value = "")]
        namespace: String,

        /// Only show types with more than this many objects
        #[arg(long, default_value = "0")]
        min_count: i64,
    },

    /// Print committed writes as JSON lines until interrupted
    Watch,

    /// Run one garbage collection pass
    Gc {
        /// Count reclaimable rows without deleting them
        #[arg(long)]
        dry_run: bool,
    },

    /// Run the periodic garbage collector until interrupted
    Run,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_create_from_file() {
        let cli = Cli::parse_from([
            "revstore", "create", "apps", "deployments", "web", "--file", "web.json",
        ]);
        match cli.command {
            Commands::Create { key, payload } => {
                assert_eq!(key.namespace, "default");
                assert_eq!(key.to_key().to_string(), "default/apps/deployments/web");
                assert_eq!(payload.file, Some("web.json".to_string()));
                assert!(payload.folder.is_empty());
            }
            _ => panic!("Expected Create command"),
        }
    }

    #[test]
    fn test_cli_delete_requires_previous_rv() {
        assert!(Cli::try_parse_from(["revstore", "delete", "apps", "deployments", "web"]).is_err());

        let cli = Cli::parse_from([
            "revstore",
            "delete",
            "apps",
            "deployments",
            "web",
            "-n",
            "prod",
            "--previous-rv",
            "42",
        ]);
        match cli.command {
            Commands::Delete { key, previous_rv } => {
                assert_eq!(key.namespace, "prod");
                assert_eq!(previous_rv, 42);
            }
            _ => panic!("Expected Delete command"),
        }
    }

    #[test]
    fn test_cli_history_match_mode() {
        let cli = Cli::parse_from([
            "revstore",
            "history",
            "apps",
            "deployments",
            "web",
            "--rv",
            "10",
            "--match",
            "not-older-than",
        ]);
        match cli.command {
            Commands::History {
                rv, version_match, ..
            } => {
                assert_eq!(rv, 10);
                assert_eq!(VersionMatch::from(version_match), VersionMatch::NotOlderThan);
            }
            _ => panic!("Expected History command"),
        }
    }

    #[test]
    fn test_cli_list_defaults() {
        let cli = Cli::parse_from(["revstore", "list", "apps", "deployments"]);
        match cli.command {
            Commands::List {
                namespace,
                limit,
                token,
                rv,
                ..
            } => {
                assert!(namespace.is_empty());
                assert_eq!(limit, 0);
                assert!(token.is_none());
                assert_eq!(rv, 0);
            }
            _ => panic!("Expected List command"),
        }
    }

    #[test]
    fn test_cli_global_flags() {
        let cli = Cli::parse_from([
            "revstore",
            "gc",
            "--dry-run",
            "--db-path",
            "/custom/db",
            "--log-level",
            "debug",
        ]);
        assert_eq!(cli.db_path, Some("/custom/db".to_string()));
        assert_eq!(cli.log_level, Some("debug".to_string()));
        assert!(matches!(cli.command, Commands::Gc { dry_run: true }));
    }

    #[test]
    fn test_cli_with_config() {
        let cli = Cli::parse_from(["revstore", "--config", "/path/to/config.toml", "run"]);
        assert_eq!(cli.config, Some("/path/to/config.toml".to_string()));
        assert!(matches!(cli.command, Commands::Run));
    }
}
