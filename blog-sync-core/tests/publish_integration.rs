use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use blog_sync_core::contract::{
    Block, MetadataRow, MockDocumentSource, MockRepoClient, MockStorageClient, Page, PutContent,
    RepoFile, StorageClient, TableBlock, TextBlock, WriteStatus,
};
use blog_sync_core::publish::{publish, PublishJob, PublishOutcome, StagingFile};

fn page_with(rows: &[(&str, &str)]) -> Page {
    Page {
        id: "p1".to_string(),
        title: "Hello".to_string(),
        blocks: vec![
            Block::Table(TableBlock {
                rows: rows
                    .iter()
                    .map(|(key, value)| MetadataRow {
                        key: key.to_string(),
                        value: value.to_string(),
                    })
                    .collect(),
            }),
            Block::Text(TextBlock {
                markdown: "Hello world body.".to_string(),
            }),
        ],
    }
}

fn source_returning(page: Page, body: &'static str) -> MockDocumentSource {
    let mut source = MockDocumentSource::new();
    source.expect_current_page().return_once(move || Ok(page));
    source
        .expect_to_markdown()
        .returning(move |_| body.to_string());
    source
}

fn job() -> PublishJob {
    PublishJob {
        owner: "octo".to_string(),
        repo: "blog".to_string(),
        branch: String::new(),
        default_branch: "master".to_string(),
        staging: None,
        asset_root: "images".to_string(),
        immediate_sync: true,
        delete_stale: false,
    }
}

fn decoded(content: &str) -> String {
    String::from_utf8(STANDARD.decode(content).expect("content should be base64"))
        .expect("content should be UTF-8")
}

#[tokio::test]
async fn absent_target_drives_the_create_path() {
    let page = page_with(&[
        ("path", "_posts/a.md"),
        ("cos", "2024/"),
        ("tags", "x-: y -: z"),
    ]);
    let source = source_returning(page, "Hello world body.");

    let mut repo = MockRepoClient::new();
    repo.expect_get_content()
        .withf(|owner, repo, path| owner == "octo" && repo == "blog" && path == "_posts/a.md")
        .return_once(|_, _, _| Ok(None));
    repo.expect_put_content()
        .withf(|req: &PutContent<'_>| {
            req.owner == "octo"
                && req.repo == "blog"
                && req.branch == "master"
                && req.path == "_posts/a.md"
                && req.message == "Hello published!"
                && req.sha.is_none()
                && decoded(&req.content)
                    == "---\ntags:\n    - x\n    - y\n    - z\ntitle: Hello\n---\n\nHello world body."
        })
        .return_once(|_| Ok(WriteStatus::Committed(201)));

    let report = publish(&source, &repo, None, &job()).await;
    assert_eq!(report.outcome, PublishOutcome::Created);
    assert!(report.content.starts_with("---\ntags:\n"));
}

#[tokio::test]
async fn existing_target_drives_the_update_path() {
    let page = page_with(&[("path", "_posts/a.md"), ("cos", "2024/")]);
    let source = source_returning(page, "Hello world body.");

    let mut repo = MockRepoClient::new();
    repo.expect_get_content()
        .return_once(|_, _, _| Ok(Some(RepoFile {
            sha: "abc123".to_string(),
        })));
    repo.expect_put_content()
        .withf(|req: &PutContent<'_>| {
            let content = decoded(&req.content);
            req.sha == Some("abc123")
                && req.message == "Hello updated!"
                && content.contains("sha: abc123\nlastUpdateTime: ")
                && content.ends_with("---\n\nHello world body.")
        })
        .return_once(|_| Ok(WriteStatus::Committed(200)));

    let report = publish(&source, &repo, None, &job()).await;
    assert_eq!(report.outcome, PublishOutcome::Updated);
    assert!(report.content.contains("sha: abc123\n"));
}

#[tokio::test]
async fn page_without_leading_table_aborts_before_any_probe() {
    let page = Page {
        id: "p1".to_string(),
        title: "Hello".to_string(),
        blocks: vec![Block::Text(TextBlock {
            markdown: "no table here".to_string(),
        })],
    };
    let mut source = MockDocumentSource::new();
    source.expect_current_page().return_once(move || Ok(page));

    // No expectations: any repository call would panic the mock.
    let repo = MockRepoClient::new();

    let report = publish(&source, &repo, None, &job()).await;
    assert!(matches!(report.outcome, PublishOutcome::Aborted(_)));
}

#[tokio::test]
async fn fetch_failure_aborts_with_a_message() {
    let mut source = MockDocumentSource::new();
    source
        .expect_current_page()
        .return_once(|| Err("editor unavailable".into()));
    let repo = MockRepoClient::new();

    let report = publish(&source, &repo, None, &job()).await;
    assert!(matches!(report.outcome, PublishOutcome::Aborted(_)));
    assert!(report.content.is_empty());
}

#[tokio::test]
async fn immediate_sync_off_composes_and_stays_local() {
    let page = page_with(&[("path", "_posts/a.md"), ("layout", "post")]);
    let source = source_returning(page, "Hello world body.");
    let repo = MockRepoClient::new();

    let mut local_job = job();
    local_job.immediate_sync = false;

    let report = publish(&source, &repo, None, &local_job).await;
    assert_eq!(report.outcome, PublishOutcome::SavedLocally);
    assert_eq!(
        report.content,
        "---\nlayout: post\ntitle: Hello\n---\n\nHello world body."
    );
}

#[tokio::test]
async fn missing_path_row_aborts_before_any_probe() {
    let page = page_with(&[("layout", "post")]);
    let source = source_returning(page, "Hello world body.");
    let repo = MockRepoClient::new();

    let report = publish(&source, &repo, None, &job()).await;
    assert!(matches!(report.outcome, PublishOutcome::Aborted(_)));
}

#[tokio::test]
async fn staging_write_uses_the_staging_sha() {
    let page = page_with(&[("path", "_posts/a.md"), ("cos", "2024/")]);
    let source = source_returning(page, "Hello world body.");

    let mut repo = MockRepoClient::new();
    repo.expect_get_content()
        .withf(|_, repo, path| repo == "blog-ci" && path == "content.md")
        .return_once(|_, _, _| Ok(Some(RepoFile {
            sha: "staging-sha".to_string(),
        })));
    repo.expect_get_content()
        .withf(|_, repo, path| repo == "blog" && path == "_posts/a.md")
        .return_once(|_, _, _| Ok(Some(RepoFile {
            sha: "target-sha".to_string(),
        })));
    repo.expect_put_content()
        .withf(|req: &PutContent<'_>| {
            req.repo == "blog-ci"
                && req.path == "content.md"
                && req.sha == Some("staging-sha")
                && decoded(&req.content).contains("sha: target-sha\n")
        })
        .return_once(|_| Ok(WriteStatus::Committed(200)));

    let mut staged_job = job();
    staged_job.staging = Some(StagingFile {
        repo: "blog-ci".to_string(),
        path: "content.md".to_string(),
    });

    let report = publish(&source, &repo, None, &staged_job).await;
    assert_eq!(report.outcome, PublishOutcome::Updated);
}

#[tokio::test]
async fn failed_staging_probe_fails_the_publish() {
    let page = page_with(&[("path", "_posts/a.md")]);
    let source = source_returning(page, "Hello world body.");

    let mut repo = MockRepoClient::new();
    repo.expect_get_content()
        .withf(|_, repo, _| repo == "blog-ci")
        .return_once(|_, _, _| Err("boom".into()));

    let mut staged_job = job();
    staged_job.staging = Some(StagingFile {
        repo: "blog-ci".to_string(),
        path: "content.md".to_string(),
    });

    let report = publish(&source, &repo, None, &staged_job).await;
    assert!(matches!(report.outcome, PublishOutcome::Failed(_)));
}

#[tokio::test]
async fn unexpected_accept_status_reports_uncertain_success() {
    let page = page_with(&[("path", "_posts/a.md")]);
    let source = source_returning(page, "Hello world body.");

    let mut repo = MockRepoClient::new();
    repo.expect_get_content().return_once(|_, _, _| Ok(None));
    repo.expect_put_content()
        .return_once(|_| Ok(WriteStatus::Uncertain(202)));

    let report = publish(&source, &repo, None, &job()).await;
    assert_eq!(report.outcome, PublishOutcome::UncertainSuccess);
}

#[tokio::test]
async fn write_failure_is_absorbed_into_the_report() {
    let page = page_with(&[("path", "_posts/a.md")]);
    let source = source_returning(page, "Hello world body.");

    let mut repo = MockRepoClient::new();
    repo.expect_get_content().return_once(|_, _, _| Ok(None));
    repo.expect_put_content()
        .return_once(|_| Err("rejected".into()));

    let report = publish(&source, &repo, None, &job()).await;
    assert!(matches!(report.outcome, PublishOutcome::Failed(_)));
}

#[tokio::test]
async fn assets_are_reconciled_before_the_write() {
    let page = page_with(&[("path", "_posts/a.md"), ("cos", "2024/")]);
    let source = source_returning(
        page,
        "intro ![shot](https://cdn.example.com/a.png) outro",
    );

    let mut store = MockStorageClient::new();
    store
        .expect_list_keys()
        .withf(|prefix| prefix == "images/2024/p1_")
        .return_once(|_| Ok(vec!["images/2024/p1_old.png".to_string()]));
    store
        .expect_fetch_asset()
        .withf(|url| url == "https://cdn.example.com/a.png")
        .return_once(|_| Ok(vec![7, 7]));
    store
        .expect_put_object()
        .withf(|key, content_type, _| key == "images/2024/p1_a.png" && content_type == "image/png")
        .return_once(|_, _, _| Ok(()));
    // Deletion stays off: no expect_delete_object.

    let mut repo = MockRepoClient::new();
    repo.expect_get_content().return_once(|_, _, _| Ok(None));
    repo.expect_put_content()
        .return_once(|_| Ok(WriteStatus::Committed(201)));

    let report = publish(&source, &repo, Some(&store as &dyn StorageClient), &job()).await;
    assert_eq!(report.outcome, PublishOutcome::Created);
    let assets = report.assets.expect("asset report present");
    assert_eq!(assets.uploaded, vec!["images/2024/p1_a.png"]);
    assert_eq!(assets.retained, vec!["images/2024/p1_old.png"]);
}

#[tokio::test]
async fn listing_failure_skips_asset_sync_but_publishes_the_post() {
    let page = page_with(&[("path", "_posts/a.md"), ("cos", "2024/")]);
    let source = source_returning(page, "![shot](https://cdn.example.com/a.png)");

    let mut store = MockStorageClient::new();
    store
        .expect_list_keys()
        .return_once(|_| Err("listing refused".into()));

    let mut repo = MockRepoClient::new();
    repo.expect_get_content().return_once(|_, _, _| Ok(None));
    repo.expect_put_content()
        .return_once(|_| Ok(WriteStatus::Committed(201)));

    let report = publish(&source, &repo, Some(&store as &dyn StorageClient), &job()).await;
    assert_eq!(report.outcome, PublishOutcome::Created);
    assert!(report.assets.is_none());
}
