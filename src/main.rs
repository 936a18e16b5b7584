//! # Repo Gate CLI (`rgate`)
//!
//! Runs the signed repository management API and manages its API keys.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rgate init` | Create the SQLite database and run schema migrations |
//! | `rgate serve` | Start the HTTP API |
//! | `rgate keys create` | Issue a new public/secret key pair |
//! | `rgate keys delete <pub>` | Revoke a public key |
//! | `rgate sign <command> ...` | Print the canonical string and signature for a command |
//!
//! ## Examples
//!
//! ```bash
//! rgate init --config ./config/rgate.toml
//! rgate keys create --config ./config/rgate.toml
//! rgate sign delete --pub APIK-... --secret APISK-... --param reponame=alpha
//! rgate serve --config ./config/rgate.toml
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use repo_gate::config::load_config;
use repo_gate::{db, migrate, server, sqlite_store::SqliteStore};
use repo_gate_core::canonical::Canonical;
use repo_gate_core::models::{CommandParams, HmacAlgorithm};
use repo_gate_core::signature::sign_command;
use repo_gate_core::validate::{self, CommandSpec, SIGNATURE_PARAM};

/// Repo Gate: signed-command management API for tracked code repositories.
#[derive(Parser)]
#[command(name = "rgate", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rgate.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Start the HTTP API server.
    Serve,

    /// Manage API keys.
    Keys {
        #[command(subcommand)]
        action: KeysAction,
    },

    /// Sign a command the way a client would.
    ///
    /// Prints the canonical string, the `%20` alternate form, and the query
    /// string to send.
    Sign {
        /// Command to sign.
        command: SignedCommand,

        /// Public key.
        #[arg(long = "pub")]
        public_key: String,

        /// Shared secret for the public key.
        #[arg(long)]
        secret: String,

        /// Hash algorithm.
        #[arg(long, default_value = "sha1")]
        hmac: String,

        /// Command parameter as `name=value`. Repeatable.
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },
}

#[derive(Subcommand)]
enum KeysAction {
    /// Issue a new key pair and print it.
    Create,
    /// Revoke a public key.
    Delete {
        /// The public key to revoke.
        public_key: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SignedCommand {
    Reindex,
    Index,
    List,
    Delete,
    Add,
}

impl SignedCommand {
    fn spec(self) -> &'static CommandSpec {
        match self {
            SignedCommand::Reindex => &validate::REINDEX_ALL,
            SignedCommand::Index => &validate::ENQUEUE,
            SignedCommand::List => &validate::LIST,
            SignedCommand::Delete => &validate::DELETE,
            SignedCommand::Add => &validate::ADD,
        }
    }
}

fn parse_param(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected name=value, got '{}'", raw))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            let cfg = load_config(&cli.config)?;
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Serve => {
            let cfg = load_config(&cli.config)?;
            server::run_server(&cfg).await?;
        }
        Commands::Keys { action } => {
            let cfg = load_config(&cli.config)?;
            let pool = db::connect(&cfg).await?;
            migrate::apply(&pool).await?;
            let store = SqliteStore::new(pool);
            match action {
                KeysAction::Create => {
                    let key = store.create_key().await?;
                    println!("public key: {}", key.public_key);
                    println!("secret:     {}", String::from_utf8_lossy(&key.secret));
                }
                KeysAction::Delete { public_key } => {
                    if store.delete_key(&public_key).await? {
                        println!("Deleted {}", public_key);
                    } else {
                        anyhow::bail!("No such public key: {}", public_key);
                    }
                }
            }
        }
        Commands::Sign {
            command,
            public_key,
            secret,
            hmac,
            params,
        } => {
            let spec = command.spec();
            let algorithm = HmacAlgorithm::from_token(Some(hmac.as_str()));
            let params: CommandParams = params.into_iter().collect();
            let signed = sign_command(spec, params, &public_key, secret.as_bytes(), algorithm);

            let canonical = Canonical::for_command(spec, &signed);
            let signature = signed.get(SIGNATURE_PARAM).unwrap_or_default();
            println!("canonical: {}", canonical.as_str());
            println!("alternate: {}", canonical.percent20());
            println!(
                "query:     {}&hmac={}&sig={}",
                canonical.as_str(),
                algorithm.as_str(),
                signature
            );
        }
    }

    Ok(())
}
