//! Routes for the object gate.
//!
//! ## Structure
//! - `GET  /favicon.svg` — static icon, never gated
//! - `GET  /`            — token prompt, listing, or direct fetch via `?filename=`
//! - `POST /`            — upload (`file` part) or delete (`action=delete`, `key`)
//! - `ANY  /{*key}`      — download an object by its percent-encoded key
//!
//! Static routes take precedence over the wildcard, so an object literally
//! named `favicon.svg` is only reachable through `/?filename=favicon.svg`.

use crate::{
    handlers::object_handlers::{favicon, fetch_by_path, index, mutate},
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{any, get},
};
use tower_http::trace::TraceLayer;

/// Build the router for every route, carrying `AppState` to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/favicon.svg", get(favicon))
        .route("/", get(index).post(mutate))
        .route("/{*key}", any(fetch_by_path))
}

/// The full application: routes plus request tracing and the upload size cap.
pub fn app(state: AppState, max_upload_bytes: usize) -> Router {
    routes()
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::object::{ByteStream, ObjectInfo, StoredObject},
        services::{
            memory_store::MemoryStore,
            object_store::{ObjectStore, StorageError, StorageResult},
        },
    };
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
        response::Response,
    };
    use std::{
        io,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };
    use tower::ServiceExt;

    const BOUNDARY: &str = "object-gate-test-boundary";
    const LIMIT: usize = 1024 * 1024;

    /// MemoryStore that counts every backend call.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        calls: AtomicUsize,
    }

    impl CountingStore {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn bump(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ObjectStore for CountingStore {
        async fn list(&self) -> StorageResult<Vec<ObjectInfo>> {
            self.bump();
            self.inner.list().await
        }
        async fn get(&self, key: &str) -> StorageResult<Option<StoredObject>> {
            self.bump();
            self.inner.get(key).await
        }
        async fn put(
            &self,
            key: &str,
            content_type: Option<String>,
            content: ByteStream,
        ) -> StorageResult<ObjectInfo> {
            self.bump();
            self.inner.put(key, content_type, content).await
        }
        async fn delete(&self, key: &str) -> StorageResult<()> {
            self.bump();
            self.inner.delete(key).await
        }
    }

    /// Backend whose every call fails.
    struct BrokenStore;

    fn broken() -> StorageError {
        StorageError::Io(io::Error::new(io::ErrorKind::Other, "backend unreachable"))
    }

    #[async_trait]
    impl ObjectStore for BrokenStore {
        async fn list(&self) -> StorageResult<Vec<ObjectInfo>> {
            Err(broken())
        }
        async fn get(&self, _key: &str) -> StorageResult<Option<StoredObject>> {
            Err(broken())
        }
        async fn put(
            &self,
            _key: &str,
            _content_type: Option<String>,
            _content: ByteStream,
        ) -> StorageResult<ObjectInfo> {
            Err(broken())
        }
        async fn delete(&self, _key: &str) -> StorageResult<()> {
            Err(broken())
        }
    }

    fn test_app(token: Option<&str>) -> (Router, Arc<CountingStore>) {
        let store = Arc::new(CountingStore::default());
        let state = AppState::new(store.clone(), token.map(str::to_string));
        (app(state, LIMIT), store)
    }

    async fn send(app: &Router, req: Request<Body>) -> Response {
        app.clone().oneshot(req).await.unwrap()
    }

    async fn body_string(resp: Response) -> String {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn upload(
        filename: &str,
        content_type: Option<&str>,
        data: &[u8],
        token: Option<&str>,
    ) -> Request<Body> {
        let mut body = Vec::new();
        if let Some(token) = token {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"token\"\r\n\r\n{token}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n"
            )
            .as_bytes(),
        );
        if let Some(ct) = content_type {
            body.extend_from_slice(format!("Content-Type: {ct}\r\n").as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn post_form(form: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form.to_string()))
            .unwrap()
    }

    fn location(resp: &Response) -> &str {
        resp.headers()
            .get(header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap()
    }

    #[tokio::test]
    async fn favicon_is_served_without_token() {
        let (app, store) = test_app(Some("abc"));
        let resp = send(&app, get("/favicon.svg")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/svg+xml");
        assert!(body_string(resp).await.starts_with("<svg"));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn token_scenario_end_to_end() {
        let (app, _store) = test_app(Some("abc"));

        let resp = send(&app, get("/")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let html = body_string(resp).await;
        assert!(html.contains("Enter Token"));
        assert!(!html.contains("Stored Files"));

        let resp = send(&app, get("/?token=abc")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(
            resp.headers()[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/html")
        );
        let html = body_string(resp).await;
        assert!(html.contains("Stored Files"));
        assert!(html.contains("No files uploaded yet."));

        let resp = send(&app, upload("hello.txt", Some("text/plain"), b"hi there", Some("abc"))).await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(location(&resp), "/?token=abc");

        let resp = send(&app, get("/hello.txt?token=abc")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_string(resp).await, "hi there");

        let resp = send(&app, post_form("action=delete&key=hello.txt&token=abc")).await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(location(&resp), "/?token=abc");

        let resp = send(&app, get("/hello.txt?token=abc")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_string(resp).await, "File not found");
    }

    #[tokio::test]
    async fn mismatched_token_is_rejected_before_any_backend_call() {
        let (app, store) = test_app(Some("abc"));
        let rejected = [
            get("/?token=wrong"),
            get("/?token=ABC"),
            get("/?filename=hello.txt"),
            get("/?filename=hello.txt&token=wrong"),
            get("/hello.txt"),
            get("/hello.txt?token=abcd"),
            upload("hello.txt", None, b"data", None),
            upload("hello.txt", None, b"data", Some("nope")),
            post_form("action=delete&key=hello.txt"),
            post_form("action=delete&key=hello.txt&token=ab"),
            Request::builder()
                .method("POST")
                .uri("/?token=abc")
                .body(Body::empty())
                .unwrap(),
        ];
        for req in rejected {
            let uri = req.uri().clone();
            let resp = send(&app, req).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{uri}");
            assert_eq!(body_string(resp).await, "Unauthorized");
        }
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn empty_token_param_shows_prompt() {
        let (app, store) = test_app(Some("abc"));
        let resp = send(&app, get("/?token=")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let html = body_string(resp).await;
        assert!(html.contains("Enter Token"));
        assert!(!html.contains("Stored Files"));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn repeated_query_params_use_the_first_value() {
        let (app, _store) = test_app(Some("abc"));
        send(&app, upload("a.txt", None, b"A", Some("abc"))).await;

        let resp = send(&app, get("/?token=abc&token=abc")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_string(resp).await.contains("data-key=\"a.txt\""));

        let resp = send(&app, get("/a.txt?token=abc&token=abc")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_string(resp).await, "A");

        let resp = send(&app, get("/?filename=a.txt&filename=b.txt&token=abc")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_string(resp).await, "A");

        let resp = send(&app, get("/a.txt?token=wrong&token=abc")).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn any_method_on_a_key_path_fetches() {
        let (app, _store) = test_app(None);
        send(&app, upload("a.txt", Some("text/plain"), b"A", None)).await;

        for method in ["DELETE", "PUT", "POST"] {
            let req = Request::builder()
                .method(method)
                .uri("/a.txt")
                .body(Body::empty())
                .unwrap();
            let resp = send(&app, req).await;
            assert_eq!(resp.status(), StatusCode::OK, "{method}");
            assert_eq!(body_string(resp).await, "A");
        }

        // Still there: the method never mutates.
        let resp = send(&app, get("/a.txt")).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn no_configured_token_admits_everything() {
        let (app, _store) = test_app(None);

        let resp = send(&app, get("/")).await;
        assert!(body_string(resp).await.contains("Stored Files"));

        let resp = send(&app, upload("a.txt", None, b"A", Some("anything"))).await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(location(&resp), "/");

        let resp = send(&app, get("/a.txt?token=whatever")).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = send(&app, get("/?filename=a.txt")).await;
        assert_eq!(body_string(resp).await, "A");

        let resp = send(&app, post_form("action=delete&key=a.txt&token=junk")).await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(location(&resp), "/");
    }

    #[tokio::test]
    async fn upload_then_fetch_preserves_bytes_and_metadata() {
        let (app, _store) = test_app(None);
        let payload: Vec<u8> = (0..=255u8).cycle().take(4096).collect();

        let resp = send(&app, upload("blob.bin", Some("application/x-custom"), &payload, None)).await;
        assert_eq!(resp.status(), StatusCode::FOUND);

        let resp = send(&app, get("/blob.bin")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let headers = resp.headers().clone();
        assert_eq!(headers[header::CONTENT_TYPE], "application/x-custom");
        assert_eq!(headers[header::CONTENT_LENGTH], "4096");
        assert_eq!(
            headers[header::ETAG].to_str().unwrap(),
            format!("\"{:x}\"", md5::compute(&payload))
        );
        assert!(headers[header::LAST_MODIFIED].to_str().unwrap().ends_with(" GMT"));
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body.as_ref(), payload.as_slice());
    }

    #[tokio::test]
    async fn content_type_is_guessed_from_name_when_part_has_none() {
        let (app, _store) = test_app(None);
        send(&app, upload("page.html", None, b"<p>hi</p>", None)).await;
        send(&app, upload("mystery", None, b"??", None)).await;

        let resp = send(&app, get("/page.html")).await;
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/html");
        let resp = send(&app, get("/mystery")).await;
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/octet-stream");
    }

    #[tokio::test]
    async fn second_upload_replaces_first() {
        let (app, _store) = test_app(None);
        send(&app, upload("same.txt", None, b"first", None)).await;
        send(&app, upload("same.txt", None, b"second", None)).await;

        let resp = send(&app, get("/same.txt")).await;
        assert_eq!(body_string(resp).await, "second");
        let html = body_string(send(&app, get("/")).await).await;
        assert_eq!(html.matches("class=\"file-item\"").count(), 1);
    }

    #[tokio::test]
    async fn listing_shows_exactly_the_uploaded_keys() {
        let (app, _store) = test_app(None);
        let keys = ["one.txt", "two.txt", "three.txt"];
        for key in keys {
            send(&app, upload(key, None, b"x", None)).await;
        }

        let html = body_string(send(&app, get("/")).await).await;
        assert!(!html.contains("No files uploaded yet."));
        assert_eq!(html.matches("class=\"file-item\"").count(), keys.len());
        for key in keys {
            assert!(html.contains(&format!("data-key=\"{key}\"")));
        }
    }

    #[tokio::test]
    async fn missing_fields_are_bad_requests() {
        let (app, store) = test_app(Some("abc"));

        let resp = send(&app, post_form("token=abc")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_string(resp).await, "No file uploaded");

        // Browsers send an empty filename when no file was chosen.
        let resp = send(&app, upload("", None, b"", Some("abc"))).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_string(resp).await, "No file uploaded");

        let resp = send(&app, post_form("action=delete&token=abc")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_string(resp).await, "No file specified");

        let resp = send(&app, post_form("action=delete&key=&token=abc")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_string(resp).await, "No file specified");

        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn percent_encoded_paths_decode_to_keys() {
        let (app, _store) = test_app(None);
        send(&app, upload("my notes (1).txt", None, b"notes", None)).await;

        let resp = send(&app, get("/my%20notes%20(1).txt")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_string(resp).await, "notes");

        let resp = send(&app, get("/?filename=my%20notes%20(1).txt")).await;
        assert_eq!(body_string(resp).await, "notes");

        let resp = send(&app, get("/%FF%FE")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn deleting_an_absent_key_still_redirects() {
        let (app, _store) = test_app(None);
        let resp = send(&app, post_form("action=delete&key=never-there")).await;
        assert_eq!(resp.status(), StatusCode::FOUND);
    }

    #[tokio::test]
    async fn backend_failures_become_500s() {
        let state = AppState::new(Arc::new(BrokenStore), None);
        let app = app(state, LIMIT);

        for req in [
            get("/"),
            get("/some.txt"),
            upload("x.txt", None, b"x", None),
            post_form("action=delete&key=x.txt"),
        ] {
            let resp = send(&app, req).await;
            assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(body_string(resp).await, "Internal Server Error");
        }
    }

    #[tokio::test]
    async fn oversized_upload_is_refused() {
        let store = Arc::new(CountingStore::default());
        let app = app(AppState::new(store.clone(), None), 64);

        let resp = send(&app, upload("big.bin", None, &[7u8; 1024], None)).await;
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(store.calls(), 0);
    }
}
