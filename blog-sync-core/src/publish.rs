//! The publish flow: pull the current page, extract its metadata table,
//! compose the markdown document, reconcile assets, and drive the
//! create-or-update protocol against the repository file API.
//!
//! Every failure is absorbed here. The flow degrades to a logged diagnostic
//! plus a [`PublishOutcome`] the caller can surface to the user; nothing
//! propagates past this boundary as an error.
//!
//! # State machine, per publish
//! ```text
//! FETCH_DOC -> (fail) -> ABORT
//! FETCH_DOC -> (ok) -> EXTRACT_META -> (not a table) -> ABORT
//! EXTRACT_META -> (ok) -> COMPOSE
//! COMPOSE -> immediate sync off -> DONE (log only)
//! COMPOSE -> immediate sync on  -> [ASSET SYNC] -> PROBE -> CREATE | UPDATE
//! CREATE/UPDATE -> (200/201) -> DONE | (other accepted) -> UNCERTAIN | (error) -> FAILED
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Local, TimeZone};
use tracing::{debug, error, info, warn};

use crate::assets::{self, AssetReport};
use crate::contract::{Block, DocumentSource, PutContent, RepoClient, StorageClient, WriteStatus};
use crate::frontmatter;

/// The staging file a CI pipeline watches. When configured, the composed
/// document is written here rather than directly to the target path.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StagingFile {
    pub repo: String,
    pub path: String,
}

/// Everything one publish needs beyond the page itself. Immutable for the
/// duration of the publish; the target file path comes from the page's
/// metadata table.
#[derive(Debug, Clone)]
pub struct PublishJob {
    pub owner: String,
    pub repo: String,
    /// User-specified branch; blank falls back to `default_branch`.
    pub branch: String,
    pub default_branch: String,
    pub staging: Option<StagingFile>,
    /// Bucket-side root folder for published images.
    pub asset_root: String,
    /// Off means compose-and-log only: no network writes at all.
    pub immediate_sync: bool,
    /// Actually delete stale bucket objects instead of only reporting them.
    pub delete_stale: bool,
}

/// How a publish ended.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub enum PublishOutcome {
    Created,
    Updated,
    /// The write was accepted with a status outside 200/201; the repository's
    /// status semantics are not trusted enough to call this a plain success.
    UncertainSuccess,
    /// Immediate sync was off: the document was composed and logged only.
    SavedLocally,
    /// A precondition failed before any repository write.
    Aborted(String),
    /// A probe or the write itself failed.
    Failed(String),
}

/// What the publish did, for the caller to render to the user.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PublishReport {
    pub outcome: PublishOutcome,
    /// The composed document as last assembled.
    pub content: String,
    pub assets: Option<AssetReport>,
}

impl PublishReport {
    fn bare(outcome: PublishOutcome) -> Self {
        Self {
            outcome,
            content: String::new(),
            assets: None,
        }
    }
}

/// Seal the front matter and append the body. Generated lines (sha, update
/// timestamp) are injected before the closing fence; a page without front
/// matter is published as its body alone.
pub fn compose(front_matter: &str, injected: &str, body: &str) -> String {
    if front_matter.is_empty() {
        body.to_string()
    } else {
        format!("{front_matter}{injected}---\n\n{body}")
    }
}

/// Render the `lastUpdateTime` value, e.g. `2024-06-01 08:30:00 +0800`.
pub fn format_update_timestamp<Tz: TimeZone>(at: DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format("%Y-%m-%d %H:%M:%S %z").to_string()
}

/// Run one publish. Never returns an error; see module docs.
pub async fn publish<D, R>(
    source: &D,
    repo: &R,
    store: Option<&dyn StorageClient>,
    job: &PublishJob,
) -> PublishReport
where
    D: DocumentSource + ?Sized,
    R: RepoClient + ?Sized,
{
    info!(owner = %job.owner, repo = %job.repo, "Starting publish");

    let page = match source.current_page().await {
        Ok(page) => page,
        Err(e) => {
            error!(error = ?e, "Failed to fetch the current page");
            return PublishReport::bare(PublishOutcome::Aborted(
                "could not fetch the current page from the editor".to_string(),
            ));
        }
    };
    info!(page_id = %page.id, title = %page.title, blocks = page.blocks.len(), "Fetched current page");

    let rows = match page.blocks.first() {
        Some(Block::Table(table)) => &table.rows,
        _ => {
            error!("First block of the page is not a metadata table");
            return PublishReport::bare(PublishOutcome::Aborted(
                "the first block must be a metadata table providing 'path' and friends"
                    .to_string(),
            ));
        }
    };

    let meta = frontmatter::extract(rows, &page.title);
    let body = source.to_markdown(&page.blocks[1..]);
    let content = compose(&meta.front_matter, "", &body);
    info!(content_len = content.len(), "Composed document");
    debug!(content = %content, "Composed document content");

    if !job.immediate_sync {
        info!("Immediate sync off, composed document stays local");
        return finish(PublishReport {
            outcome: PublishOutcome::SavedLocally,
            content,
            assets: None,
        });
    }

    if meta.routing.target_path.is_empty() {
        error!("Metadata table provides no 'path' row");
        return finish(PublishReport {
            outcome: PublishOutcome::Aborted(
                "the metadata table must provide a 'path' row".to_string(),
            ),
            content,
            assets: None,
        });
    }

    let branch = if job.branch.trim().is_empty() {
        job.default_branch.clone()
    } else {
        job.branch.clone()
    };

    // Asset sync runs before the text write; its failures never block the
    // post itself.
    let assets_report = match store {
        Some(store) if !meta.routing.asset_prefix.is_empty() => {
            match assets::reconcile(
                &body,
                &job.asset_root,
                &meta.routing.asset_prefix,
                &page.id,
                store,
                job.delete_stale,
            )
            .await
            {
                Ok(report) => {
                    info!(
                        uploaded = report.uploaded.len(),
                        failed = report.failed.len(),
                        retained = report.retained.len(),
                        "Asset reconciliation finished"
                    );
                    Some(report)
                }
                Err(_) => {
                    warn!("Continuing publish without asset sync");
                    None
                }
            }
        }
        _ => None,
    };

    let staging_sha = match &job.staging {
        Some(staging) => {
            match repo
                .get_content(&job.owner, &staging.repo, &staging.path)
                .await
            {
                Ok(Some(file)) => Some(file.sha),
                Ok(None) => {
                    error!(repo = %staging.repo, path = %staging.path, "Staging file is missing");
                    return finish(PublishReport {
                        outcome: PublishOutcome::Failed(
                            "the staging file does not exist".to_string(),
                        ),
                        content,
                        assets: assets_report,
                    });
                }
                Err(e) => {
                    error!(repo = %staging.repo, path = %staging.path, error = ?e, "Staging probe failed");
                    return finish(PublishReport {
                        outcome: PublishOutcome::Failed(
                            "could not probe the staging file".to_string(),
                        ),
                        content,
                        assets: assets_report,
                    });
                }
            }
        }
        None => None,
    };

    let existing = match repo
        .get_content(&job.owner, &job.repo, &meta.routing.target_path)
        .await
    {
        Ok(existing) => existing,
        Err(e) => {
            error!(path = %meta.routing.target_path, error = ?e, "Target probe failed");
            return finish(PublishReport {
                outcome: PublishOutcome::Failed("could not probe the target file".to_string()),
                content,
                assets: assets_report,
            });
        }
    };

    let (content, message) = match &existing {
        Some(file) => {
            let stamp = format_update_timestamp(Local::now());
            info!(sha = %file.sha, stamp = %stamp, path = %meta.routing.target_path, "Target exists, updating");
            let injected = format!("sha: {}\nlastUpdateTime: {}\n", file.sha, stamp);
            (
                compose(&meta.front_matter, &injected, &body),
                format!("{} updated!", page.title),
            )
        }
        None => {
            info!(path = %meta.routing.target_path, "Target absent, creating");
            (content, format!("{} published!", page.title))
        }
    };

    let (write_repo, write_path, write_sha) = match (&job.staging, &staging_sha) {
        (Some(staging), sha) => (staging.repo.as_str(), staging.path.as_str(), sha.as_deref()),
        (None, _) => (
            job.repo.as_str(),
            meta.routing.target_path.as_str(),
            existing.as_ref().map(|file| file.sha.as_str()),
        ),
    };

    info!(repo = %write_repo, path = %write_path, branch = %branch, sha = ?write_sha, "Writing composed document");
    let outcome = match repo
        .put_content(PutContent {
            owner: &job.owner,
            repo: write_repo,
            branch: &branch,
            path: write_path,
            message: &message,
            content: STANDARD.encode(content.as_bytes()),
            sha: write_sha,
        })
        .await
    {
        Ok(WriteStatus::Committed(status)) => {
            info!(status, "Publish write committed");
            if existing.is_some() {
                PublishOutcome::Updated
            } else {
                PublishOutcome::Created
            }
        }
        Ok(WriteStatus::Uncertain(status)) => {
            info!(status, "Publish write accepted with an unexpected status");
            PublishOutcome::UncertainSuccess
        }
        Err(e) => {
            error!(error = ?e, "Publish write failed");
            PublishOutcome::Failed("the repository write failed".to_string())
        }
    };

    finish(PublishReport {
        outcome,
        content,
        assets: assets_report,
    })
}

fn finish(report: PublishReport) -> PublishReport {
    match serde_json::to_string_pretty(&report) {
        Ok(json) => debug!(report = %json, "Publish report"),
        Err(e) => error!(error = ?e, "Failed to serialize publish report"),
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    #[test]
    fn timestamp_renders_offset_without_colon() {
        let offset = FixedOffset::east_opt(8 * 3600).unwrap();
        let at = offset.with_ymd_and_hms(2024, 6, 1, 8, 30, 0).unwrap();
        assert_eq!(format_update_timestamp(at), "2024-06-01 08:30:00 +0800");
    }

    #[test]
    fn compose_without_front_matter_is_body_alone() {
        assert_eq!(compose("", "", "body text"), "body text");
    }

    #[test]
    fn compose_seals_front_matter_with_blank_line_before_body() {
        let front = "---\nlayout: post\ntitle: T\n";
        assert_eq!(
            compose(front, "", "body"),
            "---\nlayout: post\ntitle: T\n---\n\nbody"
        );
    }

    #[test]
    fn compose_injects_generated_lines_before_the_fence() {
        let front = "---\ntitle: T\n";
        let injected = "sha: abc123\nlastUpdateTime: 2024-06-01 08:30:00 +0800\n";
        assert_eq!(
            compose(front, injected, "body"),
            "---\ntitle: T\nsha: abc123\nlastUpdateTime: 2024-06-01 08:30:00 +0800\n---\n\nbody"
        );
    }
}
