//! HTTP contract tests for `PaperlessClient` against a mock server.

use std::sync::{Arc, Mutex};

use paperscan_app::{CatalogService, PaperlessClient};
use paperscan_core::{
    no_progress, CorrespondentRepository, DocumentRepository, DocumentTypeRepository, Error,
    ProgressCallback, SuggestionApi, TagRepository, UploadMetadata,
};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn client(server: &MockServer) -> PaperlessClient {
    PaperlessClient::new(server.uri(), "secret-token").unwrap()
}

fn write_page(dir: &TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

fn body_text(request: &Request) -> String {
    String::from_utf8_lossy(&request.body).into_owned()
}

// ============================================================================
// UPLOAD
// ============================================================================

#[tokio::test]
async fn test_upload_document_sends_multipart_with_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/documents/post_document/"))
        .and(header("Authorization", "Token secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!("task-42")))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let page = write_page(&dir, "scan.jpg", b"jpeg-bytes");
    let progress = Arc::new(Mutex::new(Vec::new()));
    let on_progress: ProgressCallback = {
        let progress = progress.clone();
        Arc::new(move |p| progress.lock().unwrap().push(p))
    };

    let meta = UploadMetadata::new()
        .with_title("Electric bill")
        .with_tags([3, 5])
        .with_correspondent(9);
    let task_id = client(&server)
        .upload_document(&page, &meta, on_progress)
        .await
        .unwrap();

    assert_eq!(task_id, "task-42");
    assert_eq!(*progress.lock().unwrap(), vec![0.0, 1.0]);

    let requests = server.received_requests().await.unwrap();
    let body = body_text(&requests[0]);
    assert!(body.contains("name=\"title\""));
    assert!(body.contains("Electric bill"));
    assert_eq!(body.matches("name=\"tags\"").count(), 2);
    assert!(body.contains("name=\"correspondent\""));
    assert!(!body.contains("name=\"document_type\""));
    assert!(body.contains("filename=\"scan.jpg\""));
    assert!(body.contains("jpeg-bytes"));
}

#[tokio::test]
async fn test_upload_multi_page_sends_every_page() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/documents/post_document/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("\"task-7\""))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let pages = vec![
        write_page(&dir, "p1.jpg", b"page-one"),
        write_page(&dir, "p2.jpg", b"page-two"),
    ];
    let task_id = client(&server)
        .upload_multi_page(&pages, &UploadMetadata::new(), no_progress())
        .await
        .unwrap();
    assert_eq!(task_id, "task-7");

    let requests = server.received_requests().await.unwrap();
    let body = body_text(&requests[0]);
    assert_eq!(body.matches("name=\"document\"").count(), 2);
    let first = body.find("page-one").unwrap();
    let second = body.find("page-two").unwrap();
    assert!(first < second);
}

#[tokio::test]
async fn test_upload_status_mapping() {
    for (status, retryable) in [(401, false), (403, false), (413, false), (500, true), (503, true)] {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let page = write_page(&dir, "scan.jpg", b"x");
        let err = client(&server)
            .upload_document(&page, &UploadMetadata::new(), no_progress())
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(status), "status {status}");
        assert_eq!(err.is_retryable(), retryable, "status {status}");
    }
}

#[tokio::test]
async fn test_upload_missing_file_is_unreadable() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let err = client(&server)
        .upload_document(&dir.path().join("gone.jpg"), &UploadMetadata::new(), no_progress())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::FileUnreadable(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unreachable_server_is_retryable() {
    let client = PaperlessClient::new("http://127.0.0.1:9", "t").unwrap();
    let dir = TempDir::new().unwrap();
    let page = write_page(&dir, "scan.jpg", b"x");

    let err = client
        .upload_document(&page, &UploadMetadata::new(), no_progress())
        .await
        .unwrap_err();
    assert!(err.is_retryable(), "{err:?}");
}

// ============================================================================
// CATALOG
// ============================================================================

#[tokio::test]
async fn test_refresh_tags_follows_pages_and_publishes() {
    let server = MockServer::start().await;
    let next = format!("{}/api/tags/?page=2&page_size=100", server.uri());
    Mock::given(method("GET"))
        .and(path("/api/tags/"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 2,
            "next": null,
            "results": [{"id": 2, "name": "Taxes", "match": "tax return", "document_count": 4}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/tags/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 2,
            "next": next,
            "results": [{"id": 1, "name": "Bills", "color": "#a6cee3"}]
        })))
        .mount(&server)
        .await;

    let client = client(&server);
    let rx = client.observe_tags();
    let tags = client.refresh_tags().await.unwrap();

    assert_eq!(tags.len(), 2);
    assert_eq!(tags[0].name, "Bills");
    assert_eq!(tags[1].match_pattern.as_deref(), Some("tax return"));
    assert_eq!(*rx.borrow(), tags);
}

#[tokio::test]
async fn test_refresh_document_types_and_correspondents() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/document_types/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"id": 4, "name": "Invoice"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/correspondents/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"id": 8, "name": "City Power"}]
        })))
        .mount(&server)
        .await;

    let client = client(&server);
    assert_eq!(client.refresh_document_types().await.unwrap()[0].name, "Invoice");
    assert_eq!(client.refresh_correspondents().await.unwrap()[0].id, 8);
    assert_eq!(client.observe_document_types().borrow().len(), 1);
    assert_eq!(client.observe_correspondents().borrow().len(), 1);
}

#[tokio::test]
async fn test_create_tag_posts_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/tags/"))
        .and(body_json(json!({"name": "Medical", "color": "#ff0000"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 12, "name": "Medical"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let tag = client.create_tag("Medical", Some("#ff0000")).await.unwrap();

    assert_eq!(tag.id, 12);
    assert_eq!(client.observe_tags().borrow().len(), 1);
}

#[tokio::test]
async fn test_create_duplicate_tag_recovers_existing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/tags/"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "name": ["Tag with this name already exists."]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/tags/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"id": 3, "name": "medical"}]
        })))
        .mount(&server)
        .await;

    let client = Arc::new(client(&server));
    let err = client.create_tag("Medical", None).await.unwrap_err();
    assert!(matches!(err, Error::Duplicate(_)));

    let catalog = CatalogService::new(client.clone(), client.clone(), client.clone());
    let tag = catalog.create_tag("Medical", None).await.unwrap();
    assert_eq!(tag.id, 3);
}

#[tokio::test]
async fn test_document_suggestions() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/documents/55/suggestions/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tags": [1, 2],
            "correspondents": [8],
            "document_types": [],
            "dates": ["2026-03-14"]
        })))
        .mount(&server)
        .await;

    let suggestions = client(&server).document_suggestions(55).await.unwrap();
    assert_eq!(suggestions.tags, vec![1, 2]);
    assert_eq!(suggestions.correspondents, vec![8]);
    assert_eq!(suggestions.dates[0].to_string(), "2026-03-14");
}
