//! End-to-end contract over the HTTP surface: a fixture origin, a real
//! engine on a temp data dir, and the public `/b/*url` route.

use axum::http::header;
use axum::routing::get;
use axum::Router;
use cachefront::AppState;
use cachefront_local::engine::CacheEngine;
use cachefront_local::meta::MemoryMetadataStore;
use cachefront_local::ssrf::{AllowAllPolicy, SsrfGuard};
use cachefront_local::store::ObjectStore;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];

async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Fixture origin counting requests to its PNG asset.
async fn spawn_origin() -> (SocketAddr, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let h = hits.clone();
    let app = Router::new().route(
        "/logo.png",
        get(move || {
            let h = h.clone();
            async move {
                h.fetch_add(1, Ordering::SeqCst);
                ([(header::CONTENT_TYPE, "image/png")], PNG.to_vec())
            }
        }),
    );
    (spawn(app).await, hits)
}

async fn spawn_proxy(data_dir: &std::path::Path, permissive: bool) -> SocketAddr {
    let meta = Arc::new(MemoryMetadataStore::new());
    let objects = ObjectStore::new(data_dir).unwrap();
    let engine = if permissive {
        CacheEngine::new(meta, objects, Arc::new(AllowAllPolicy)).unwrap()
    } else {
        CacheEngine::new(meta, objects, Arc::new(SsrfGuard::new())).unwrap()
    };
    spawn(cachefront::router(Arc::new(AppState { engine }))).await
}

#[tokio::test]
async fn proxies_and_caches_a_remote_asset() {
    let (origin, hits) = spawn_origin().await;
    let tmp = tempfile::tempdir().unwrap();
    let proxy = spawn_proxy(tmp.path(), true).await;

    let url = format!("http://{proxy}/b/http://{origin}/logo.png");
    let first = reqwest::get(&url).await.unwrap();
    assert_eq!(first.status(), 200);
    assert_eq!(
        first.headers()[header::CONTENT_TYPE].to_str().unwrap(),
        "image/png"
    );
    assert_eq!(first.bytes().await.unwrap().as_ref(), PNG);

    // Second request is served from disk.
    let second = reqwest::get(&url).await.unwrap();
    assert_eq!(second.status(), 200);
    assert_eq!(second.bytes().await.unwrap().as_ref(), PNG);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn the_request_query_string_is_not_part_of_the_raw_url() {
    let (origin, hits) = spawn_origin().await;
    let tmp = tempfile::tempdir().unwrap();
    let proxy = spawn_proxy(tmp.path(), true).await;

    let plain = format!("http://{proxy}/b/http://{origin}/logo.png");
    let with_query = format!("{plain}?cb=123");
    assert_eq!(reqwest::get(&plain).await.unwrap().status(), 200);
    assert_eq!(reqwest::get(&with_query).await.unwrap().status(), 200);

    // Both map to the same cache entry.
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn blocked_targets_get_the_structured_error_body() {
    let tmp = tempfile::tempdir().unwrap();
    let proxy = spawn_proxy(tmp.path(), false).await;

    // The guard refuses the loopback literal before anything is fetched,
    // so the unreachable port is never contacted.
    let resp = reqwest::get(format!("http://{proxy}/b/http://127.0.0.1:9/secret"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(
        body,
        serde_json::json!({ "code": 500, "msg": "cache file failed" })
    );

    // The data dir is untouched.
    assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn html_upstream_is_refused_with_the_miss_reason() {
    let app = Router::new().route(
        "/page",
        get(|| async { axum::response::Html("<html><body>page</body></html>") }),
    );
    let origin = spawn(app).await;
    let tmp = tempfile::tempdir().unwrap();
    let proxy = spawn_proxy(tmp.path(), true).await;

    let resp = reqwest::get(format!("http://{proxy}/b/http://{origin}/page"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["msg"], "cache file failed");
    assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
}
