///
/// This module implements the full CLI interface for blog-sync—handling
/// command parsing, argument validation, main entrypoints, and user-visible
/// invocations.
///
/// All core business logic (front-matter extraction, signing, asset
/// reconciliation, the publish flow) lives in the [`blog-sync-core`] crate.
/// This module is strictly for CLI glue, ergonomic argument exposure, and
/// wiring of the concrete clients.
///
/// ## Features
/// - Entry struct [`Cli`] defines all user-facing options and subcommands.
/// - Subcommand routing (`publish`, `init`, `profiles`) and argument
///   validation.
/// - Async entrypoint (`run`) for programmatic invocation and integration
///   testing.
/// - Logging, tracing, and structured error output at CLI level.
///
/// ## How To Use
/// - For command-line users: use the installed `blog-sync` binary with
///   `--help`.
/// - For programmatic/integration use: call [`run`] with a constructed
///   [`Cli`].
///
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use blog_sync_core::contract::StorageClient;
use blog_sync_core::publish::{publish, PublishJob, PublishOutcome};

use crate::cos::CosClient;
use crate::github::GithubClient;
use crate::load_config::{apply_env_overrides, load_store, save_store, select_profile};
use crate::page::{write_skeleton, FilePageSource};

/// CLI for blog-sync: publish note pages as markdown blog posts.
#[derive(Parser)]
#[clap(
    name = "blog-sync",
    version,
    about = "Publish note pages as markdown blog posts and keep their images in sync with object storage"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Publish a page export to the configured repository
    Publish {
        /// Path to the page export (JSON)
        page: PathBuf,
        /// Profile name from the store; defaults to the last-used one
        #[clap(long)]
        profile: Option<String>,
        /// Path to the profile store
        #[clap(long, default_value = "blog-sync.json")]
        store: PathBuf,
        /// Compose and log the document without writing anywhere
        #[clap(long)]
        dry_run: bool,
        /// Delete stale bucket objects instead of only reporting them
        #[clap(long)]
        delete_stale: bool,
    },
    /// Write a skeleton page export with the starter metadata table
    Init {
        /// Path for the new page export
        page: PathBuf,
        /// Title for the new page
        #[clap(long, default_value = "Untitled")]
        title: String,
    },
    /// List stored profiles
    Profiles {
        /// Path to the profile store
        #[clap(long, default_value = "blog-sync.json")]
        store: PathBuf,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Publish {
            page,
            profile,
            store,
            dry_run,
            delete_stale,
        } => {
            let store_data = load_store(&store);
            let (name, selected) = select_profile(&store_data, profile.as_deref())?;
            let mut selected = selected.clone();
            apply_env_overrides(&mut selected);

            if selected.github.token.trim().len() < 5 {
                bail!("the repository token is missing or too short");
            }

            // Remember the choice for next time; a failed save is not worth
            // failing the publish over.
            let mut store_data = store_data;
            store_data.last_used = Some(name.clone());
            if let Err(e) = save_store(&store, &store_data) {
                warn!(error = ?e, "Could not persist the last-used profile");
            }

            info!(profile = %name, page = ?page, dry_run, "Starting publish command");
            let source = FilePageSource::new(page);
            let repo = GithubClient::new(selected.github.token.clone());
            let cos = selected.cos.as_ref().map(CosClient::new);

            let job = PublishJob {
                owner: selected.github.owner.clone(),
                repo: selected.github.repo.clone(),
                branch: selected.github.branch.clone(),
                default_branch: selected.github.default_branch.clone(),
                staging: selected.github.staging.clone(),
                asset_root: selected
                    .cos
                    .as_ref()
                    .map(|cos| cos.asset_root.clone())
                    .unwrap_or_default(),
                immediate_sync: !dry_run,
                delete_stale,
            };

            let report = publish(
                &source,
                &repo,
                cos.as_ref().map(|client| client as &dyn StorageClient),
                &job,
            )
            .await;

            match report.outcome {
                PublishOutcome::Created => {
                    info!("Post created");
                    Ok(())
                }
                PublishOutcome::Updated => {
                    info!("Post updated");
                    Ok(())
                }
                PublishOutcome::UncertainSuccess => {
                    warn!("The write was accepted with an unexpected status; check the repository");
                    Ok(())
                }
                PublishOutcome::SavedLocally => {
                    info!(content = %report.content, "Composed document, dry run");
                    Ok(())
                }
                PublishOutcome::Aborted(reason) | PublishOutcome::Failed(reason) => {
                    bail!("publish did not complete: {reason}")
                }
            }
        }
        Commands::Init { page, title } => {
            write_skeleton(&page, &title)?;
            info!(page = ?page, "Skeleton page ready");
            Ok(())
        }
        Commands::Profiles { store } => {
            let store_data = load_store(&store);
            if store_data.profiles.is_empty() {
                println!("no profiles stored");
                return Ok(());
            }
            for (name, profile) in &store_data.profiles {
                let marker = if store_data.last_used.as_deref() == Some(name.as_str()) {
                    " (last used)"
                } else {
                    ""
                };
                println!(
                    "{name}: {}/{}{marker}",
                    profile.github.owner, profile.github.repo
                );
            }
            Ok(())
        }
    }
}
