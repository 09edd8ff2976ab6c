mod common;

use std::net::SocketAddr;
use std::sync::Arc;

use common::*;
use imvec::server::{AppState, create_app};
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use rstest::*;
use serde_json::Value;
use tokio::net::TcpListener;

struct TestServer {
    addr: SocketAddr,
    client: reqwest::Client,
    // 保持临时目录存活
    _harness_dir: tempfile::TempDir,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn upload(&self, data: Vec<u8>, file_name: &str, content_type: &str) -> reqwest::Response {
        let part = Part::bytes(data).file_name(file_name.to_string()).mime_str(content_type).unwrap();
        let form = Form::new().part("file", part);
        self.client.post(self.url("/vectorize_and_store")).multipart(form).send().await.unwrap()
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).send().await.unwrap()
    }
}

#[fixture]
async fn server() -> TestServer {
    spawn(harness().await).await
}

async fn spawn(harness: Harness) -> TestServer {
    let Harness { dir, ctx } = harness;
    let app = create_app(AppState::new(ctx));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    TestServer { addr, client: reqwest::Client::new(), _harness_dir: dir }
}

#[rstest]
#[tokio::test]
async fn health(#[future] server: TestServer) {
    let server = server.await;
    let resp = server.get("/health").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, serde_json::json!({ "status": "ok" }));
}

#[rstest]
#[tokio::test]
async fn not_found_before_first_ingest(#[future] server: TestServer) {
    let server = server.await;
    assert_eq!(server.get("/stats").await.status(), StatusCode::NOT_FOUND);
    assert_eq!(server.get("/search?text=dog").await.status(), StatusCode::NOT_FOUND);

    let body: Value = server.get("/stats").await.json().await.unwrap();
    assert_eq!(body["error"], "not_found");
}

#[rstest]
#[tokio::test]
async fn empty_query_is_bad_request(#[future] server: TestServer) {
    let server = server.await;
    assert_eq!(server.get("/search?text=").await.status(), StatusCode::BAD_REQUEST);
    assert_eq!(server.get("/search?text=%20%20").await.status(), StatusCode::BAD_REQUEST);
    assert_eq!(server.get("/search").await.status(), StatusCode::BAD_REQUEST);
}

#[rstest]
#[tokio::test]
async fn rejects_non_image_upload(#[future] server: TestServer) {
    let server = server.await;
    let resp = server.upload(b"hello".to_vec(), "a.txt", "text/plain").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "invalid");

    let resp = server.upload(b"garbage".to_vec(), "a.png", "image/png").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[rstest]
#[tokio::test]
async fn upload_search_stats(#[future] server: TestServer) {
    let server = server.await;
    let data = png([220, 20, 20]);

    let resp = server.upload(data.clone(), "dog.jpg", "image/jpeg").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    let id = format!("images/{}.jpg", sha256_hex(&data));
    assert_eq!(body, serde_json::json!({ "id": id, "vectorDim": DIM, "stored": true }));

    // 重复上传
    let resp = server.upload(data, "again.jpg", "image/jpeg").await;
    assert_eq!(resp.status(), StatusCode::OK);
    server.upload(png([10, 200, 10]), "grass.png", "image/png").await;

    let body: Value = server.get("/search?text=dog").await.json().await.unwrap();
    assert_eq!(body["query"], "dog");
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["id"], id.as_str());
    assert!(results[0].get("vector").is_none());

    let body: Value = server.get("/stats").await.json().await.unwrap();
    assert_eq!(body["rowCount"], 2);
    assert_eq!(body["columnCount"], 3);
    assert_eq!(body["lastVectorDim"], DIM);
    assert!(body["indices"].is_array());
    assert!(body["tablePath"].is_string());
}

#[rstest]
#[tokio::test]
async fn metrics_and_docs(#[future] server: TestServer) {
    let server = server.await;
    server.upload(png([1, 2, 3]), "a.png", "image/png").await;
    let text = server.get("/metrics").await.text().await.unwrap();
    assert!(text.contains("imvec_ingest_count"));
    assert_eq!(server.get("/api-docs/openapi.json").await.status(), StatusCode::OK);
}

#[rstest]
#[tokio::test]
async fn index_failure_is_server_error() {
    let spy = Arc::new(TableSpy { fail_insert: true, ..Default::default() });
    let server = spawn(harness_with_spy(spy).await).await;

    let resp = server.upload(png([220, 20, 20]), "dog.png", "image/png").await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "index");

    // 表已经建好，但没有写入任何行
    let body: Value = server.get("/stats").await.json().await.unwrap();
    assert_eq!(body["rowCount"], 0);
}
