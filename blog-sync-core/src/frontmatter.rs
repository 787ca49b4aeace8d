//! Front-matter extraction from the page's metadata table.
//!
//! The first block of a publishable page is a two-column table. Two reserved
//! rows are routing directives rather than post metadata: `path` (where the
//! post lands in the repository) and `cos` (the bucket folder its images are
//! namespaced under). Everything else becomes a front-matter field, in row
//! order. A value containing the `-:` separator is a multi-value field and
//! renders as an indented list.
//!
//! The emitted header is left open (no closing `---` fence) so the publish
//! flow can append generated fields — the existing file's sha and an update
//! timestamp — before sealing it.

use tracing::debug;

use crate::contract::MetadataRow;

/// Reserved row key naming the target file path in the repository.
pub const PATH_KEY: &str = "path";
/// Reserved row key naming the bucket folder for this page's images.
pub const ASSET_PREFIX_KEY: &str = "cos";
/// Separator token marking a multi-value field.
pub const LIST_SEPARATOR: &str = "-:";

/// Where the post and its assets go; consumed from the reserved rows and
/// never emitted into front matter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingDirectives {
    pub target_path: String,
    pub asset_prefix: String,
}

/// Result of extracting the metadata table.
#[derive(Debug, Clone)]
pub struct ExtractedMeta {
    /// Open front-matter header: `---\n` plus field lines plus the final
    /// `title:` line. Empty when the table produced no fields.
    pub front_matter: String,
    pub routing: RoutingDirectives,
}

/// Convert metadata rows into an open front-matter header and routing
/// directives. Row order is preserved; `title` is always the last field when
/// any front matter is emitted.
pub fn extract(rows: &[MetadataRow], title: &str) -> ExtractedMeta {
    let mut routing = RoutingDirectives::default();
    let mut fields = String::new();

    for row in rows {
        let key = row.key.trim();
        let value = row.value.trim();
        if key == PATH_KEY {
            routing.target_path = value.to_string();
            continue;
        }
        if key == ASSET_PREFIX_KEY {
            routing.asset_prefix = value.to_string();
            continue;
        }

        // List-valued iff the separator yields more than one non-empty segment.
        let items: Vec<&str> = value
            .split(LIST_SEPARATOR)
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .collect();
        if items.len() > 1 {
            fields.push_str(&format!("{key}:\n"));
            for item in &items {
                fields.push_str(&format!("    - {item}\n"));
            }
        } else {
            fields.push_str(&format!("{}: {}\n", row.key, row.value));
        }
    }

    let front_matter = if fields.is_empty() {
        String::new()
    } else {
        format!("---\n{fields}title: {title}\n")
    };

    debug!(
        target_path = %routing.target_path,
        asset_prefix = %routing.asset_prefix,
        has_front_matter = !front_matter.is_empty(),
        "Extracted metadata table"
    );

    ExtractedMeta {
        front_matter,
        routing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(key: &str, value: &str) -> MetadataRow {
        MetadataRow {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn reserved_rows_feed_routing_and_stay_out_of_front_matter() {
        let rows = vec![
            row("path", "_posts/tech/2024/a.md"),
            row("cos", "2024/"),
            row("layout", "post"),
        ];
        let meta = extract(&rows, "A Title");
        assert_eq!(meta.routing.target_path, "_posts/tech/2024/a.md");
        assert_eq!(meta.routing.asset_prefix, "2024/");
        assert!(!meta.front_matter.contains("path:"));
        assert!(!meta.front_matter.contains("cos:"));
        assert!(meta.front_matter.contains("layout: post\n"));
    }

    #[test]
    fn list_values_render_as_trimmed_indented_items() {
        let rows = vec![row("tags", "x-: a -: b -: c")];
        let meta = extract(&rows, "T");
        assert_eq!(
            meta.front_matter,
            "---\ntags:\n    - x\n    - a\n    - b\n    - c\ntitle: T\n"
        );
    }

    #[test]
    fn empty_list_segments_are_dropped() {
        let rows = vec![row("tags", "-: a -:  -: b")];
        let meta = extract(&rows, "T");
        assert_eq!(meta.front_matter, "---\ntags:\n    - a\n    - b\ntitle: T\n");
    }

    #[test]
    fn a_single_segment_with_trailing_separator_stays_scalar() {
        let rows = vec![row("tags", "x-:")];
        let meta = extract(&rows, "T");
        assert_eq!(meta.front_matter, "---\ntags: x-:\ntitle: T\n");
    }

    #[test]
    fn title_is_always_the_final_field() {
        let rows = vec![row("layout", "post"), row("categories", "tech")];
        let meta = extract(&rows, "Hello");
        assert!(meta.front_matter.ends_with("title: Hello\n"));
    }

    #[test]
    fn only_reserved_rows_produce_no_front_matter() {
        let rows = vec![row("path", "_posts/a.md"), row("cos", "2024/")];
        let meta = extract(&rows, "Hello");
        assert!(meta.front_matter.is_empty());
        assert_eq!(meta.routing.target_path, "_posts/a.md");
    }

    #[test]
    fn row_order_is_preserved() {
        let rows = vec![
            row("layout", "post"),
            row("date", "2024-01-01"),
            row("categories", "tech"),
        ];
        let meta = extract(&rows, "T");
        let layout = meta.front_matter.find("layout:").unwrap();
        let date = meta.front_matter.find("date:").unwrap();
        let categories = meta.front_matter.find("categories:").unwrap();
        assert!(layout < date && date < categories);
    }

    #[test]
    fn scalar_rows_keep_their_raw_key_and_value() {
        let rows = vec![row("header-style", "text")];
        let meta = extract(&rows, "T");
        assert!(meta.front_matter.contains("header-style: text\n"));
    }
}
