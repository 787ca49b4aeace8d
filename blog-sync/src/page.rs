//! File-backed document source: reads a page export (JSON) and stands in
//! for the editor's data API. The markdown rendering of body blocks is the
//! editor's provided capability; here the export already carries the common
//! dialect, so rendering is a join of the text blocks.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Local;
use tracing::{error, info};

use blog_sync_core::contract::{
    Block, ClientError, DocumentSource, MetadataRow, Page, TableBlock, TextBlock,
};
use blog_sync_core::publish::format_update_timestamp;

/// Document source reading one page export from disk.
pub struct FilePageSource {
    path: PathBuf,
}

impl FilePageSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DocumentSource for FilePageSource {
    async fn current_page(&self) -> Result<Page, ClientError> {
        let text = fs::read_to_string(&self.path).map_err(|e| {
            error!(page = ?self.path, error = ?e, "Failed to read page export");
            Box::new(e) as ClientError
        })?;
        let page: Page = serde_json::from_str(&text).map_err(|e| {
            error!(page = ?self.path, error = ?e, "Page export is not valid JSON");
            Box::new(e) as ClientError
        })?;
        info!(page = ?self.path, page_id = %page.id, title = %page.title, "Loaded page export");
        Ok(page)
    }

    fn to_markdown(&self, blocks: &[Block]) -> String {
        blocks
            .iter()
            .filter_map(|block| match block {
                Block::Text(text) => Some(text.markdown.as_str()),
                Block::Table(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// The starter metadata table a fresh page gets: the same rows the editor
/// plugin inserted, dated today.
pub fn skeleton_page(title: &str) -> Page {
    let now = Local::now();
    let year = now.format("%Y").to_string();
    let date = now.format("%Y-%m-%d").to_string();
    let rows = vec![
        ("layout", "post".to_string()),
        ("date", format_update_timestamp(now)),
        ("categories", "tech".to_string()),
        ("path", format!("_posts/tech/{year}/{date}-.md")),
        ("cos", format!("{year}/")),
        ("header-style", "text".to_string()),
        ("tags", String::new()),
        ("no-catalog", String::new()),
        ("callout", String::new()),
        ("craft", String::new()),
        ("reference", String::new()),
    ];
    Page {
        id: now.format("%Y%m%d%H%M%S").to_string(),
        title: title.to_string(),
        blocks: vec![
            Block::Table(TableBlock {
                rows: rows
                    .into_iter()
                    .map(|(key, value)| MetadataRow {
                        key: key.to_string(),
                        value,
                    })
                    .collect(),
            }),
            Block::Text(TextBlock {
                markdown: String::new(),
            }),
        ],
    }
}

/// Write a skeleton page export; refuses to overwrite an existing file.
pub fn write_skeleton<P: AsRef<Path>>(path: P, title: &str) -> Result<()> {
    let path_ref = path.as_ref();
    if path_ref.exists() {
        bail!("page file {:?} already exists", path_ref);
    }
    let page = skeleton_page(title);
    let json = serde_json::to_string_pretty(&page).context("serializing skeleton page")?;
    fs::write(path_ref, json).with_context(|| format!("writing page file {:?}", path_ref))?;
    info!(page = ?path_ref, title = %title, "Wrote skeleton page");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skeleton_carries_the_routing_rows() {
        let page = skeleton_page("New Post");
        let rows = match &page.blocks[0] {
            Block::Table(table) => &table.rows,
            _ => panic!("first block must be the metadata table"),
        };
        let keys: Vec<&str> = rows.iter().map(|row| row.key.as_str()).collect();
        assert!(keys.contains(&"path"));
        assert!(keys.contains(&"cos"));
        assert_eq!(keys[0], "layout");
        let path_row = rows.iter().find(|row| row.key == "path").unwrap();
        assert!(path_row.value.starts_with("_posts/tech/"));
        assert!(path_row.value.ends_with("-.md"));
    }

    #[test]
    fn rendering_joins_text_blocks_and_skips_tables() {
        let source = FilePageSource::new("unused.json");
        let blocks = vec![
            Block::Text(TextBlock {
                markdown: "first".to_string(),
            }),
            Block::Table(TableBlock { rows: vec![] }),
            Block::Text(TextBlock {
                markdown: "second".to_string(),
            }),
        ];
        assert_eq!(source.to_markdown(&blocks), "first\n\nsecond");
    }

    #[tokio::test]
    async fn page_export_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.json");
        write_skeleton(&path, "Round Trip").unwrap();

        let source = FilePageSource::new(&path);
        let page = source.current_page().await.expect("export should parse");
        assert_eq!(page.title, "Round Trip");
        assert!(matches!(page.blocks[0], Block::Table(_)));
    }

    #[test]
    fn write_skeleton_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.json");
        write_skeleton(&path, "Once").unwrap();
        assert!(write_skeleton(&path, "Twice").is_err());
    }
}
