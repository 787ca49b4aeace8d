//! # contract: service interfaces for the publish pipeline
//!
//! This module defines the three traits the pipeline talks through —
//! [`DocumentSource`] (the note editor's data API), [`RepoClient`] (the
//! repository file-content API) and [`StorageClient`] (the object-storage
//! bucket) — together with the plain data types they exchange.
//!
//! ## Interface & Extensibility
//! - Implement [`RepoClient`] or [`StorageClient`] to target another backend.
//! - All methods are async, returning results and using boxed error types.
//! - Error handling is uniform: all API/caller errors return boxed trait objects.
//! - Meant for both production code and robust mocking in tests.
//!
//! ## Mocking & Testing
//! - The traits are annotated for `mockall` so consumers can generate
//!   deterministic mocks for unit/integration tests.

use async_trait::async_trait;

use mockall::automock;

/// Uniform boxed error for all client trait methods.
pub type ClientError = Box<dyn std::error::Error + Send + Sync>;

/// One row of the page's leading metadata table: an ordered key/value pair.
/// Row order is preserved all the way into the emitted front matter.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MetadataRow {
    pub key: String,
    pub value: String,
}

/// A block of page content as exported by the editor.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Block {
    Table(TableBlock),
    Text(TextBlock),
}

/// A two-column table block; the first block of a publishable page must be
/// one of these and carries the post's metadata.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TableBlock {
    pub rows: Vec<MetadataRow>,
}

/// Opaque body content, already in the editor's markdown dialect.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TextBlock {
    pub markdown: String,
}

/// A page pulled from the document source: a stable local id, the title,
/// and the ordered content blocks.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Page {
    pub id: String,
    pub title: String,
    pub blocks: Vec<Block>,
}

/// Result of probing the repository for an existing file. The `sha` is the
/// optimistic-concurrency token required to overwrite that version.
#[derive(Debug, Clone)]
pub struct RepoFile {
    pub sha: String,
}

/// A create-or-update write against the repository file API.
pub struct PutContent<'a> {
    pub owner: &'a str,
    pub repo: &'a str,
    pub branch: &'a str,
    pub path: &'a str,
    pub message: &'a str,
    /// Base64 of the UTF-8 bytes of the composed document.
    pub content: String,
    /// Required when overwriting an existing file, absent on create.
    pub sha: Option<&'a str>,
}

/// How the repository acknowledged a write. The API's status semantics are
/// not fully trusted, so anything accepted outside 200/201 is surfaced as
/// uncertain rather than treated as a hard success or failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    Committed(u16),
    Uncertain(u16),
}

/// Trait for the note editor's data API: pull the current page and render
/// body blocks to markdown. Both are black boxes to the pipeline.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Fetch the page currently open in the editor.
    async fn current_page(&self) -> Result<Page, ClientError>;

    /// Render body blocks to markdown text in the editor's common dialect.
    /// Image references come out as `![alt](url)`.
    fn to_markdown(&self, blocks: &[Block]) -> String;
}

/// Trait for the repository file-content API (GitHub-compatible).
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RepoClient: Send + Sync {
    /// Probe a path for an existing file. `Ok(None)` means the path does not
    /// exist (404); any other failure is an error.
    async fn get_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
    ) -> Result<Option<RepoFile>, ClientError>;

    /// Create or update a file's contents on a branch.
    async fn put_content<'a>(&self, req: PutContent<'a>) -> Result<WriteStatus, ClientError>;
}

/// Trait for the object-storage bucket holding published images.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// List object keys under a prefix.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, ClientError>;

    /// Upload one object under `key` with the given content type.
    async fn put_object(
        &self,
        key: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<(), ClientError>;

    /// Delete one object by key.
    async fn delete_object(&self, key: &str) -> Result<(), ClientError>;

    /// Fetch the raw bytes of an asset from its origin URL (unauthenticated).
    async fn fetch_asset(&self, url: &str) -> Result<Vec<u8>, ClientError>;
}
