//! HTTP server for vellum.
//!
//! Exposes a [`Repository`](vellum_repository::Repository) over HTTP:
//!
//! - `/ledgers/` reads, creates, appends, and deletes revisions
//! - `/ledgers/fork/` starts a new resource from an existing one
//! - `/contents/` streams and uploads raw content
//! - `/journals/` uploads a document and its content in one multipart request
//! - `/status/`, `/statistics/`, and `/metrics/` report on the service
//!
//! Every error response is a JSON `{description, code}` object.

pub mod config;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod router;
pub mod server;
pub mod shutdown;

pub use config::{parse_api, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use metrics::{Metrics, MetricsSnapshot};
pub use router::{build_router, AppState};
pub use server::VellumServer;
pub use shutdown::shutdown_signal;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{self, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use tower::util::ServiceExt;
    use vellum_persistence::{Persistence, VirtualPersistence};
    use vellum_repository::{Id, Repository};
    use vellum_store::{FileSystem, VirtualFileSystem};

    const HELLO: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
    const AUTHOR: &str = "11111111-1111-4111-8111-111111111111";
    const BOUNDARY: &str = "vellum-test-boundary";

    fn app() -> Router {
        let repository = Repository::new(
            Arc::new(FileSystem::from(VirtualFileSystem::new())),
            Arc::new(Persistence::from(VirtualPersistence::new())),
        );
        build_router(AppState::new(
            Arc::new(repository),
            Arc::new(Metrics::new()),
            ServerConfig::default(),
        ))
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, bytes.to_vec())
    }

    async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let (status, _, bytes) = send(app, request).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn send_json(app: &Router, method: Method, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let (status, _, bytes) = send(app, request).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn journal_body(document: &Value, content: &str) -> String {
        format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"document\"\r\n\
             Content-Type: application/json\r\n\r\n\
             {document}\r\n\
             --{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"content\"; filename=\"doc.txt\"\r\n\
             Content-Type: text/plain\r\n\r\n\
             {content}\r\n\
             --{BOUNDARY}--\r\n"
        )
    }

    async fn journal(app: &Router, method: Method, uri: &str, document: Value, content: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(journal_body(&document, content)))
            .unwrap();
        let (status, _, bytes) = send(app, request).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn document(name: &str, tags: &[&str]) -> Value {
        json!({"name": name, "author_id": AUTHOR, "tags": tags})
    }

    /// Create `doc-1`/"hello" then append `doc-2`/"world".
    async fn two_revisions(app: &Router) -> String {
        let (status, created) =
            journal(app, Method::POST, "/journals/", document("doc-1", &["a", "b"]), "hello").await;
        assert_eq!(status, StatusCode::OK);
        let rid = created["resource_id"].as_str().unwrap().to_string();

        let (status, appended) = journal(
            app,
            Method::PUT,
            &format!("/journals/?resource_id={rid}"),
            document("doc-2", &["b", "c"]),
            "world",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(appended["resource_id"], rid.as_str());
        rid
    }

    fn names(ledgers: &Value) -> Vec<&str> {
        ledgers
            .as_array()
            .unwrap()
            .iter()
            .map(|l| l["name"].as_str().unwrap())
            .collect()
    }

    // -----------------------------------------------------------------------
    // Scenarios
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn create_then_read() {
        let app = app();
        let (status, created) =
            journal(&app, Method::POST, "/journals/", document("doc-1", &["a", "b"]), "hello").await;
        assert_eq!(status, StatusCode::OK);
        let rid = created["resource_id"].as_str().unwrap();
        assert!(!Id::parse(rid).unwrap().is_zero());

        let request = Request::builder()
            .uri(format!("/contents/?resource_id={rid}"))
            .body(Body::empty())
            .unwrap();
        let (status, headers, bytes) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(bytes, b"hello");
        assert_eq!(headers[header::CONTENT_LENGTH], "5");
        assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
        assert_eq!(headers[handler::X_RESOURCE_ID], rid);
        assert!(headers.contains_key(handler::X_DURATION));

        let (status, ledger) = get_json(&app, &format!("/ledgers/?resource_id={rid}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ledger["name"], "doc-1");
        assert_eq!(ledger["tags"], json!(["a", "b"]));
        assert_eq!(ledger["resource_address"], HELLO);
        assert_eq!(ledger["resource_size"], 5);
    }

    #[tokio::test]
    async fn append_and_history_order() {
        let app = app();
        let rid = two_revisions(&app).await;
        let (status, history) =
            get_json(&app, &format!("/ledgers/revisions/?resource_id={rid}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(names(&history), vec!["doc-2", "doc-1"]);
    }

    #[tokio::test]
    async fn tag_filter() {
        let app = app();
        let rid = two_revisions(&app).await;

        let (_, only_c) = get_json(
            &app,
            &format!("/ledgers/revisions/?resource_id={rid}&query.tags=c"),
        )
        .await;
        assert_eq!(names(&only_c), vec!["doc-2"]);

        let (_, a_or_c) = get_json(
            &app,
            &format!("/ledgers/revisions/?resource_id={rid}&query.tags=a,c"),
        )
        .await;
        assert_eq!(names(&a_or_c), vec!["doc-2", "doc-1"]);

        let (_, latest_a) =
            get_json(&app, &format!("/ledgers/?resource_id={rid}&query.tags=a")).await;
        assert_eq!(latest_a["name"], "doc-1");
    }

    #[tokio::test]
    async fn fork() {
        let app = app();
        let rid = two_revisions(&app).await;
        let (_, latest) = get_json(&app, &format!("/ledgers/?resource_id={rid}")).await;

        let (status, forked) = send_json(
            &app,
            Method::PUT,
            &format!("/ledgers/fork/?resource_id={rid}"),
            document("copy", &[]),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let fork_id = forked["resource_id"].as_str().unwrap();
        assert_ne!(fork_id, rid);

        let (_, chain) = get_json(&app, &format!("/ledgers/revisions/?resource_id={fork_id}")).await;
        let chain = chain.as_array().unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0]["parent_id"], latest["id"]);

        let (_, forks) =
            get_json(&app, &format!("/ledgers/fork/revisions/?resource_id={rid}")).await;
        assert_eq!(forks.as_array().unwrap().len(), 1);

        // The fork reads its parent's content.
        let request = Request::builder()
            .uri(format!("/contents/?resource_id={fork_id}"))
            .body(Body::empty())
            .unwrap();
        let (status, _, bytes) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(bytes, b"world");
    }

    #[tokio::test]
    async fn missing_revision() {
        let app = app();
        let request = Request::builder()
            .uri(format!("/ledgers/?resource_id={}", Id::new()))
            .body(Body::empty())
            .unwrap();
        let (status, headers, bytes) = send(&app, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(headers[header::CONTENT_TYPE], "application/json; charset=utf-8");
        assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({"description": "not found", "code": 404}));
    }

    #[tokio::test]
    async fn payload_too_large() {
        let app = app();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/contents/")
            .header(header::CONTENT_TYPE, "text/plain")
            .header(header::CONTENT_LENGTH, "5242881")
            .body(Body::empty())
            .unwrap();
        let (status, _, bytes) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], 400);
    }

    // -----------------------------------------------------------------------
    // Ledgers
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn ledger_requests_are_validated() {
        let app = app();
        let (status, _) = get_json(&app, "/ledgers/?resource_id=not-a-uuid").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = get_json(&app, "/ledgers/").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) =
            send_json(&app, Method::POST, "/ledgers/", json!({"name": "doc"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let request = Request::builder()
            .method(Method::POST)
            .uri("/ledgers/")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from(document("doc", &[]).to_string()))
            .unwrap();
        let (status, _, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send_json(
            &app,
            Method::PUT,
            &format!("/ledgers/?resource_id={}", Id::new()),
            document("doc", &[]),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn author_must_be_an_identifier() {
        let app = app();
        let (status, body) = send_json(
            &app,
            Method::POST,
            "/ledgers/",
            json!({"name": "doc", "author_id": "alice"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 400);
        assert!(body["description"].as_str().unwrap().contains("author_id"));

        let (status, _) = journal(
            &app,
            Method::POST,
            "/journals/",
            json!({"name": "doc", "author_id": "alice"}),
            "hello",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn metadata_only_revisions() {
        let app = app();
        let (status, created) =
            send_json(&app, Method::POST, "/ledgers/", document("draft", &["x"])).await;
        assert_eq!(status, StatusCode::OK);
        let rid = created["resource_id"].as_str().unwrap();

        let (status, _) = send_json(
            &app,
            Method::PUT,
            &format!("/ledgers/?resource_id={rid}"),
            document("draft-2", &["x"]),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, ledger) = get_json(&app, &format!("/ledgers/?resource_id={rid}")).await;
        assert_eq!(ledger["name"], "draft-2");

        // No content was ever attached.
        let (status, _) = get_json(&app, &format!("/contents/?resource_id={rid}")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_hides_content() {
        let app = app();
        let rid = two_revisions(&app).await;
        let request = Request::builder()
            .method(Method::DELETE)
            .uri(format!("/ledgers/?resource_id={rid}"))
            .body(Body::empty())
            .unwrap();
        let (status, _, bytes) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        let tombstone: Value = serde_json::from_slice(&bytes).unwrap();
        assert_ne!(tombstone["deleted_on"], "0001-01-01T00:00:00Z");

        let (status, _) = get_json(&app, &format!("/contents/?resource_id={rid}")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    // -----------------------------------------------------------------------
    // Contents
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn post_content_returns_info() {
        let app = app();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/contents/")
            .header(header::CONTENT_TYPE, "text/plain")
            .header(header::CONTENT_LENGTH, "5")
            .body(Body::from("hello"))
            .unwrap();
        let (status, _, bytes) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        let info: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            info,
            json!({"address": HELLO, "size": 5, "content_type": "text/plain"})
        );
    }

    #[tokio::test]
    async fn post_content_requires_headers() {
        let app = app();
        let no_length = Request::builder()
            .method(Method::POST)
            .uri("/contents/")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from("hello"))
            .unwrap();
        assert_eq!(send(&app, no_length).await.0, StatusCode::BAD_REQUEST);

        let no_type = Request::builder()
            .method(Method::POST)
            .uri("/contents/")
            .header(header::CONTENT_LENGTH, "5")
            .body(Body::from("hello"))
            .unwrap();
        assert_eq!(send(&app, no_type).await.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn journal_requires_both_parts() {
        let app = app();
        let body = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"document\"\r\n\r\n\
             {}\r\n\
             --{BOUNDARY}--\r\n",
            document("doc", &[])
        );
        let request = Request::builder()
            .method(Method::POST)
            .uri("/journals/")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        let (status, _, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    // -----------------------------------------------------------------------
    // Service
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn status_endpoint() {
        let (status, body) = get_json(&app(), "/status/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn statistics_and_metrics() {
        let app = app();
        two_revisions(&app).await;
        let (status, stats) = get_json(&app, "/statistics/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["total_revisions"], 2);
        assert_eq!(stats["distinct_resources"], 1);
        assert_eq!(stats["total_bytes"], 10);

        let (status, metrics) = get_json(&app, "/metrics/").await;
        assert_eq!(status, StatusCode::OK);
        // Two journals and the statistics call; this request is counted
        // after its body is produced.
        assert_eq!(metrics["requests"], 3);
        assert_eq!(metrics["bytes_received"], 10);
    }

    #[tokio::test]
    async fn unknown_route_is_json_404() {
        let (status, body) = get_json(&app(), "/nowhere").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["description"], "not found");
    }
}
