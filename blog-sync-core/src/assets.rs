//! Asset reconciliation: keep the bucket's copy of a page's images in step
//! with what the page actually references.
//!
//! The page body is scraped for markdown image references, each origin URL
//! is mapped to a deterministic bucket key, and the expected key set is
//! diffed against the bucket listing for the page's namespace. Missing
//! objects are uploaded as one concurrent batch; a failed upload never
//! cancels its siblings. Stale objects are reported, and only removed when
//! the caller explicitly enables deletion.

use futures::future::join_all;
use regex::Regex;
use tracing::{error, info, warn};

use crate::contract::{ClientError, StorageClient};

/// Markdown image reference: `![alt](url)`, one capture group for the URL.
const IMAGE_PATTERN: &str = r"!\[[^\]]*\]\(([^)]+)\)";

/// An image the bucket is expected to hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    /// Bucket key: `<asset_root>/<asset_prefix><page_id>_<file_name>`.
    pub key: String,
    /// Where the bytes currently live.
    pub origin_url: String,
    pub file_name: String,
}

/// Upload/delete sets computed from membership only — no timestamps, no
/// content hashes.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationPlan {
    pub to_upload: Vec<RemoteObject>,
    pub to_delete: Vec<String>,
}

/// What actually happened when a plan was executed.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct AssetReport {
    pub uploaded: Vec<String>,
    pub failed: Vec<String>,
    /// Stale keys that were left in place (deletion disabled).
    pub retained: Vec<String>,
    pub deleted: Vec<String>,
}

/// Pull image URLs out of rendered markdown, in order of first appearance.
/// Duplicates are kept; they mirror whatever the source produced.
pub fn extract_image_urls(markdown: &str) -> Vec<String> {
    let pattern = Regex::new(IMAGE_PATTERN).unwrap();
    pattern
        .captures_iter(markdown)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Map an origin URL to its bucket object, or `None` when the URL's final
/// path segment carries no extension — those images arrive through a
/// different upload channel and are not ours to manage.
pub fn remote_object(
    asset_root: &str,
    asset_prefix: &str,
    page_id: &str,
    origin_url: &str,
) -> Option<RemoteObject> {
    let trimmed = origin_url
        .split(['?', '#'])
        .next()
        .unwrap_or(origin_url);
    let file_name = trimmed.rsplit('/').next().unwrap_or(trimmed);
    if !file_name.contains('.') {
        return None;
    }
    Some(RemoteObject {
        key: format!(
            "{}{}{}_{}",
            namespace_root(asset_root),
            asset_prefix,
            page_id,
            file_name
        ),
        origin_url: origin_url.to_string(),
        file_name: file_name.to_string(),
    })
}

fn namespace_root(asset_root: &str) -> String {
    if asset_root.is_empty() {
        String::new()
    } else {
        format!("{asset_root}/")
    }
}

/// The listing prefix covering exactly this page's objects.
pub fn document_prefix(asset_root: &str, asset_prefix: &str, page_id: &str) -> String {
    format!("{}{}{}_", namespace_root(asset_root), asset_prefix, page_id)
}

/// Content type for an upload, derived from the file extension.
pub fn content_type_for(file_name: &str) -> String {
    let extension = file_name.rsplit('.').next().unwrap_or("");
    format!("image/{extension}")
}

/// Diff the page's expected objects against the bucket listing.
///
/// `to_upload` preserves order of first appearance; `to_delete` is whatever
/// the bucket holds in this page's namespace that the page no longer
/// references.
pub fn plan(
    markdown: &str,
    asset_root: &str,
    asset_prefix: &str,
    page_id: &str,
    remote_keys: &[String],
) -> ReconciliationPlan {
    let expected: Vec<RemoteObject> = extract_image_urls(markdown)
        .iter()
        .filter_map(|url| remote_object(asset_root, asset_prefix, page_id, url))
        .collect();

    let mut seen = std::collections::HashSet::new();
    let to_upload: Vec<RemoteObject> = expected
        .iter()
        .filter(|obj| !remote_keys.contains(&obj.key) && seen.insert(obj.key.clone()))
        .cloned()
        .collect();

    let expected_keys: std::collections::HashSet<&str> =
        expected.iter().map(|obj| obj.key.as_str()).collect();
    let to_delete: Vec<String> = remote_keys
        .iter()
        .filter(|key| !expected_keys.contains(key.as_str()))
        .cloned()
        .collect();

    info!(
        expected = expected.len(),
        remote = remote_keys.len(),
        to_upload = to_upload.len(),
        to_delete = to_delete.len(),
        "Computed asset reconciliation plan"
    );

    ReconciliationPlan {
        to_upload,
        to_delete,
    }
}

/// Execute a plan: fetch and upload every missing object concurrently, then
/// handle stale keys. A single failed upload does not cancel its siblings;
/// failures are logged individually and reported once in the aggregate.
pub async fn execute<S>(plan: &ReconciliationPlan, store: &S, delete_stale: bool) -> AssetReport
where
    S: StorageClient + ?Sized,
{
    let uploads = plan.to_upload.iter().map(|obj| async move {
        let bytes = store.fetch_asset(&obj.origin_url).await?;
        let content_type = content_type_for(&obj.file_name);
        info!(key = %obj.key, content_type = %content_type, bytes = bytes.len(), "Uploading asset");
        store.put_object(&obj.key, &content_type, bytes).await
    });
    let outcomes = join_all(uploads).await;

    let mut report = AssetReport::default();
    for (obj, outcome) in plan.to_upload.iter().zip(outcomes) {
        match outcome {
            Ok(()) => report.uploaded.push(obj.key.clone()),
            Err(e) => {
                error!(key = %obj.key, origin = %obj.origin_url, error = ?e, "Asset upload failed");
                report.failed.push(obj.key.clone());
            }
        }
    }
    if !report.failed.is_empty() {
        error!(
            failed = report.failed.len(),
            uploaded = report.uploaded.len(),
            "Some asset uploads failed"
        );
    }

    for key in &plan.to_delete {
        if delete_stale {
            match store.delete_object(key).await {
                Ok(()) => {
                    info!(key = %key, "Deleted stale asset");
                    report.deleted.push(key.clone());
                }
                Err(e) => {
                    error!(key = %key, error = ?e, "Failed to delete stale asset");
                    report.failed.push(key.clone());
                }
            }
        } else {
            info!(key = %key, "Stale asset retained, deletion disabled");
            report.retained.push(key.clone());
        }
    }

    report
}

/// List, plan, execute. A listing failure surfaces as an error so the caller
/// can decide whether the publish proceeds without asset sync.
pub async fn reconcile<S>(
    markdown: &str,
    asset_root: &str,
    asset_prefix: &str,
    page_id: &str,
    store: &S,
    delete_stale: bool,
) -> Result<AssetReport, ClientError>
where
    S: StorageClient + ?Sized,
{
    let prefix = document_prefix(asset_root, asset_prefix, page_id);
    let remote_keys = match store.list_keys(&prefix).await {
        Ok(keys) => keys,
        Err(e) => {
            warn!(prefix = %prefix, error = ?e, "Bucket listing failed, skipping asset sync");
            return Err(e);
        }
    };
    let plan = plan(markdown, asset_root, asset_prefix, page_id, &remote_keys);
    Ok(execute(&plan, store, delete_stale).await)
}
