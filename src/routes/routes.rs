//! Defines the relay's HTTP surface.
//!
//! ## Structure
//! - `POST /upload`  — single-shot multipart upload, responds `{url}` or `{error}`
//! - `GET  /ws`      — websocket for chunked uploads with progress events
//! - `GET  /uploads` — recent upload records (`?limit=`)
//! - `GET  /healthz`, `GET /readyz` — probes

use crate::handlers::{
    AppState,
    health_handlers::{healthz, readyz},
    upload_handlers::{list_uploads, upload_file},
    ws_handlers::upload_socket,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build and return the router for every relay route.
///
/// `max_upload_bytes` caps single-shot request bodies; websocket message
/// size is capped separately at upgrade time.
pub fn routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route(
            "/upload",
            post(upload_file).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/uploads", get(list_uploads))
        .route("/ws", get(upload_socket))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::UploadConfig,
        db::test_support::migrated_pool,
        services::{
            object_store::{RemoteErrorBody, test_support::MemoryObjectStore},
            session_buffer::SessionBuffer,
            upload_coordinator::UploadCoordinator,
        },
    };
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use serde_json::{Value, json};
    use sqlx::SqlitePool;
    use std::sync::Arc;
    use tower::ServiceExt;

    const BOUNDARY: &str = "relay-test-boundary";

    fn app(pool: &SqlitePool, store: Arc<MemoryObjectStore>) -> (Router, AppState) {
        let cfg = UploadConfig {
            owner: "owner".into(),
            repositories: vec!["images".into(), "images1".into(), "images2".into()],
            branch: "main".into(),
            api_base: "https://api.example.test".into(),
            raw_base: "https://raw.example.test".into(),
            token: None,
        };
        let state = AppState {
            coordinator: UploadCoordinator::new(
                &cfg,
                Arc::new(pool.clone()),
                SessionBuffer::new(),
                store,
            ),
            max_upload_bytes: 1024,
        };
        (routes(1024).with_state(state.clone()), state)
    }

    fn multipart_body(field: &str, filename: &str, data: &[u8]) -> Body {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                field, filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
        Body::from(body)
    }

    async fn post_upload(router: &Router, body: Body) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(body)
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    async fn get_json(router: &Router, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn single_shot_upload_returns_url_and_records_it() {
        let (_dir, pool) = migrated_pool().await;
        let store = Arc::new(MemoryObjectStore::default());
        let (router, state) = app(&pool, store.clone());

        let (status, body) = post_upload(&router, multipart_body("file", "cat.png", b"ABCDEF")).await;

        assert_eq!(status, StatusCode::OK);
        let url = body["url"].as_str().unwrap();
        assert!(url.starts_with("https://raw.example.test/owner/images/main/uploads/"));
        assert!(url.ends_with("_cat.png"));
        assert_eq!(store.stored()[0].content, "QUJDREVG");
        assert_eq!(state.coordinator.sessions().len(), 0);

        let (status, listed) = get_json(&router, "/uploads?limit=5").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed[0]["url"], json!(url));
        assert_eq!(listed[0]["repo"], json!("images"));
    }

    #[tokio::test]
    async fn consecutive_uploads_rotate_repositories() {
        let (_dir, pool) = migrated_pool().await;
        let store = Arc::new(MemoryObjectStore::default());
        let (router, _state) = app(&pool, store.clone());

        for _ in 0..4 {
            let (status, _) = post_upload(&router, multipart_body("file", "a.png", b"x")).await;
            assert_eq!(status, StatusCode::OK);
        }

        let repos: Vec<String> = store.stored().into_iter().map(|p| p.repository).collect();
        assert_eq!(repos, vec!["images", "images1", "images2", "images"]);
    }

    #[tokio::test]
    async fn abandoned_requests_do_not_block_later_uploads() {
        let (_dir, pool) = migrated_pool().await;
        let store = Arc::new(MemoryObjectStore::default());
        let (router, _state) = app(&pool, store.clone());

        for k in 0..30u64 {
            let _ = tokio::time::timeout(
                std::time::Duration::from_micros(25 * k),
                post_upload(&router, multipart_body("file", "gone.png", b"x")),
            )
            .await;
        }

        let (status, body) = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            post_upload(&router, multipart_body("file", "kept.png", b"x")),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::OK);
        assert!(body["url"].as_str().unwrap().ends_with("_kept.png"));
    }

    #[tokio::test]
    async fn reserved_characters_in_filenames_are_escaped_in_urls() {
        let (_dir, pool) = migrated_pool().await;
        let store = Arc::new(MemoryObjectStore::default());
        let (router, _state) = app(&pool, store.clone());

        let (status, body) = post_upload(&router, multipart_body("file", "a#b?.png", b"x")).await;

        assert_eq!(status, StatusCode::OK);
        let url = body["url"].as_str().unwrap();
        assert!(url.ends_with("_a%23b%3F.png"), "{}", url);
        assert!(store.stored()[0].path.ends_with("_a#b?.png"));

        let (_, listed) = get_json(&router, "/uploads").await;
        assert_eq!(listed[0]["url"], json!(url));
        assert!(listed[0]["filename"].as_str().unwrap().ends_with("_a#b?.png"));
    }

    #[tokio::test]
    async fn empty_file_is_rejected_without_allocation() {
        let (_dir, pool) = migrated_pool().await;
        let store = Arc::new(MemoryObjectStore::default());
        let (router, state) = app(&pool, store.clone());

        let (status, body) = post_upload(&router, multipart_body("file", "a.png", b"")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("Upload contains no data"));
        assert_eq!(state.coordinator.allocator().peek().await.unwrap(), 0);
        assert!(store.stored().is_empty());
    }

    #[tokio::test]
    async fn request_without_file_part_is_not_initialized() {
        let (_dir, pool) = migrated_pool().await;
        let (router, _state) = app(&pool, Arc::new(MemoryObjectStore::default()));

        let (status, body) = post_upload(&router, multipart_body("avatar", "a.png", b"x")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("Upload not initialized"));
    }

    #[tokio::test]
    async fn remote_rejection_is_bad_gateway_with_remote_body() {
        let (_dir, pool) = migrated_pool().await;
        let store = Arc::new(MemoryObjectStore::rejecting(
            409,
            RemoteErrorBody::Structured(json!({"message": "sha wasn't supplied"})),
        ));
        let (router, state) = app(&pool, store);

        let (status, body) = post_upload(&router, multipart_body("file", "a.png", b"x")).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], json!({"message": "sha wasn't supplied"}));
        assert_eq!(state.coordinator.records().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn oversized_body_is_refused() {
        let (_dir, pool) = migrated_pool().await;
        let store = Arc::new(MemoryObjectStore::default());
        let (router, state) = app(&pool, store.clone());

        let (status, _) = post_upload(&router, multipart_body("file", "big.png", &[7u8; 4096])).await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(store.stored().is_empty());
        assert_eq!(state.coordinator.sessions().len(), 0);
    }

    #[tokio::test]
    async fn health_endpoints_report_rotation_state() {
        let (_dir, pool) = migrated_pool().await;
        let (router, _state) = app(&pool, Arc::new(MemoryObjectStore::default()));

        let (status, body) = get_json(&router, "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));

        let (status, body) = get_json(&router, "/readyz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["checks"]["rotation"]["ok"], json!(true));
        assert_eq!(body["open_sessions"], json!(0));

        sqlx::query("DELETE FROM repo_rotation")
            .execute(&pool)
            .await
            .unwrap();
        let (status, body) = get_json(&router, "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["checks"]["rotation"]["ok"], json!(false));
    }
}
