//! srcsync command-line tool.
//!
//! # Commands
//!
//! - `sync` - Clone or update a tenant's source tree
//! - `public-key` - Print a tenant's deploy key, creating it on first use
//!
//! Engine settings come from the environment (`CACHE_DIR`, `SOURCE_DIR`,
//! `GITHUB_PROXY`, `PROXY_HOSTS`, `HOME`, `STRICT_HOST_KEY_CHECKING`).

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use srcsync_core::{Settings, SourceDescriptor};
use srcsync_git::{GitSynchronizer, SourceSync, TracingLogger};

/// Synchronize build sources from git remotes.
#[derive(Parser)]
#[command(name = "srcsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clone or update a tenant's source tree
    Sync {
        /// Repository URL (ssh, scp-like, http, https or a local path)
        #[arg(long)]
        url: String,

        /// Branch to build; the remote default when omitted
        #[arg(short, long, default_value = "")]
        branch: String,

        /// Username for HTTP basic auth
        #[arg(long, default_value = "")]
        user: String,

        /// Password or token for HTTP basic auth
        #[arg(long, default_value = "", env = "SRCSYNC_PASSWORD", hide_env_values = true)]
        password: String,

        /// Tenant id, also the deploy key identity
        #[arg(short, long)]
        tenant: String,

        /// Service id
        #[arg(short, long)]
        service: String,

        /// Working tree location; defaults to the tenant's source directory
        #[arg(short, long)]
        dest: Option<PathBuf>,

        /// Deadline in minutes for the whole sync
        #[arg(long, default_value = "10", allow_negative_numbers = true)]
        timeout: i64,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a tenant's public deploy key
    PublicKey {
        /// Tenant id
        #[arg(short, long)]
        tenant: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::from_env();
    let sync = GitSynchronizer::new(&settings, Some(Arc::new(TracingLogger)));

    match cli.command {
        Commands::Sync {
            url,
            branch,
            user,
            password,
            tenant,
            service,
            dest,
            timeout,
            json,
        } => {
            let descriptor = SourceDescriptor::new(url)
                .with_server_type("git")
                .with_branch(branch)
                .with_basic_auth(user, password)
                .with_scope(tenant, service);
            let dest = dest.unwrap_or_else(|| sync.paths().source_dir(&descriptor));

            tracing::info!("Starting srcsync v{}", env!("CARGO_PKG_VERSION"));
            let repo = sync
                .sync(&descriptor, &dest, timeout)
                .await
                .map_err(|e| anyhow::anyhow!(e.operator_message()))?;

            if json {
                let commit = sync.last_commit(repo.path()).await.ok();
                let out = serde_json::json!({
                    "path": repo.path,
                    "head": repo.head,
                    "branch": repo.branch,
                    "status": repo.status,
                    "commit": commit,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("{} {} ({:?})", repo.branch, repo.head, repo.status);
            }
        },
        Commands::PublicKey { tenant } => {
            let key = sync.public_key(&tenant).await?;
            print!("{}", key);
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_sync_defaults() {
        let cli = Cli::parse_from([
            "srcsync", "sync", "--url", "git@github.com:a/b.git", "--tenant", "t1", "--service",
            "s1",
        ]);
        match cli.command {
            Commands::Sync {
                branch,
                timeout,
                dest,
                ..
            } => {
                assert_eq!(branch, "");
                assert_eq!(timeout, 10);
                assert_eq!(dest, None);
            },
            Commands::PublicKey { .. } => panic!("expected sync"),
        }
    }

    #[test]
    fn test_negative_timeout_accepted() {
        let cli = Cli::parse_from([
            "srcsync", "sync", "--url", "/srv/repo", "-t", "t1", "-s", "s1", "--timeout", "-3",
        ]);
        assert!(matches!(cli.command, Commands::Sync { timeout: -3, .. }));
    }
}
