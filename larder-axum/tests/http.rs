use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderValue, Request};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use larder_auth::{Scope, TokenOptions, TokenService};
use larder_axum::{AssetState, AxumApp, HttpOptions};
use larder_blob::testing::{RecordingImageStore, SpyDiskStore};
use larder_blob::{AssetConfig, AssetCoordinator, MemorySlotRegistry, SlotKind};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "larder-test-boundary";

struct Harness {
    _tmp: TempDir,
    disk: Arc<SpyDiskStore>,
    remote: Arc<RecordingImageStore>,
    tokens: TokenService,
    ax: AxumApp,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(AssetConfig::default())
    }

    fn with_config(config: AssetConfig) -> Self {
        let tmp = TempDir::new().unwrap();
        let disk = Arc::new(SpyDiskStore::new(tmp.path().join("uploads")));
        let remote = Arc::new(RecordingImageStore::new());
        let coordinator = AssetCoordinator::new(
            Arc::new(MemorySlotRegistry::new()),
            disk.clone(),
            remote.clone(),
            config,
        );
        let tokens = TokenService::new(TokenOptions::new("http-test-secret-0123")).unwrap();
        let state = AssetState::new(coordinator, tokens.clone());
        let ax = AxumApp::new(state.clone(), HttpOptions::for_assets(state.coordinator.config()));

        Self {
            _tmp: tmp,
            disk,
            remote,
            tokens,
            ax,
        }
    }

    fn admin(&self) -> String {
        format!("Bearer {}", self.tokens.issue_admin("owner").unwrap().token)
    }

    async fn send(&self, request: Request<Body>) -> axum::response::Response {
        self.ax.router.clone().oneshot(request).await.unwrap()
    }

    async fn upload(&self, slot: &str, mime: &str, name: &str, bytes: &[u8]) -> axum::response::Response {
        self.send(
            Request::builder()
                .method("POST")
                .uri(format!("/assets/{slot}"))
                .header("authorization", self.admin())
                .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
                .body(Body::from(multipart_body("file", mime, name, bytes)))
                .unwrap(),
        )
        .await
    }

    async fn get(&self, uri: &str) -> axum::response::Response {
        self.send(Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap())
            .await
    }
}

fn multipart_body(field: &str, mime: &str, name: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"{field}\"; filename=\"{name}\"\r\n\
         Content-Type: {mime}\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

async fn json_body(res: axum::response::Response) -> Value {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn raw_body(res: axum::response::Response) -> Vec<u8> {
    res.into_body().collect().await.unwrap().to_bytes().to_vec()
}

#[tokio::test]
async fn health_ok_and_request_id_generated() {
    let h = Harness::new();
    let res = h.get("/health").await;

    assert_eq!(res.status().as_u16(), 200);
    assert!(res.headers().get("x-request-id").is_some());
    assert_eq!(raw_body(res).await, b"ok");
}

#[tokio::test]
async fn request_id_is_preserved_when_provided() {
    let h = Harness::new();
    let provided = HeaderValue::from_static("req-test-123");
    let res = h
        .send(
            Request::builder()
                .method("GET")
                .uri("/assets")
                .header("x-request-id", provided.clone())
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(res.headers().get("x-request-id"), Some(&provided));
}

#[tokio::test]
async fn upload_requires_an_admin_token() {
    let h = Harness::new();
    let res = h
        .send(
            Request::builder()
                .method("POST")
                .uri("/assets/logo")
                .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
                .body(Body::from(multipart_body("file", "image/png", "logo.png", b"png")))
                .unwrap(),
        )
        .await;

    assert_eq!(res.status().as_u16(), 401);
    let body = json_body(res).await;
    assert_eq!(body["name"], "NotAuthenticated");
    assert_eq!(body["className"], "not-authenticated");
    assert_eq!(h.disk.accesses(), 0);
}

#[tokio::test]
async fn logo_upload_is_served_under_a_fixed_url() {
    let h = Harness::new();

    let res = h.upload("logo", "image/png", "brand.png", b"png-bytes").await;
    assert_eq!(res.status().as_u16(), 200);
    assert_eq!(json_body(res).await["url"], "/uploads/logo");

    let res = h.upload("logo", "image/webp", "brand.webp", b"webp-bytes").await;
    assert_eq!(json_body(res).await["url"], "/uploads/logo");

    let res = h.get("/uploads/logo").await;
    assert_eq!(res.status().as_u16(), 200);
    assert_eq!(res.headers()["content-type"], "image/webp");
    assert_eq!(raw_body(res).await, b"webp-bytes");
}

#[tokio::test]
async fn wrong_type_is_415_with_field_errors() {
    let h = Harness::new();
    let res = h.upload("favicon", "application/pdf", "icon.pdf", b"%PDF").await;

    assert_eq!(res.status().as_u16(), 415);
    let body = json_body(res).await;
    assert_eq!(body["className"], "unsupported-media-type");
    assert_eq!(body["data"]["slot"], "favicon");
    assert!(body["errors"]["file"].is_array());
    assert_eq!(h.disk.writes(), 0);
}

#[tokio::test]
async fn oversized_upload_is_413() {
    let h = Harness::with_config(AssetConfig::new().with_max_bytes(SlotKind::Logo, 8));
    let res = h.upload("logo", "image/png", "logo.png", b"0123456789").await;

    assert_eq!(res.status().as_u16(), 413);
    assert_eq!(json_body(res).await["name"], "PayloadTooLarge");
    assert_eq!(h.disk.writes(), 0);
}

#[tokio::test]
async fn unknown_slot_is_400() {
    let h = Harness::new();
    let res = h.upload("banner", "image/png", "b.png", b"png").await;
    assert_eq!(res.status().as_u16(), 400);
}

#[tokio::test]
async fn missing_file_field_is_400() {
    let h = Harness::new();
    let res = h
        .send(
            Request::builder()
                .method("POST")
                .uri("/assets/logo")
                .header("authorization", h.admin())
                .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
                .body(Body::from(multipart_body("avatar", "image/png", "a.png", b"png")))
                .unwrap(),
        )
        .await;

    assert_eq!(res.status().as_u16(), 400);
    assert_eq!(json_body(res).await["errors"]["file"][0], "required");
}

#[tokio::test]
async fn delete_clears_the_slot() {
    let h = Harness::new();
    h.upload("hero-background", "image/jpeg", "hero.jpg", b"jpeg").await;

    let res = h
        .send(
            Request::builder()
                .method("DELETE")
                .uri("/assets/hero-background")
                .header("authorization", h.admin())
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(res.status().as_u16(), 200);
    assert_eq!(json_body(res).await["success"], true);

    let body = json_body(h.get("/assets/hero-background").await).await;
    assert!(body["url"].is_null());
    assert_eq!(h.get("/uploads/hero-background").await.status().as_u16(), 404);
}

#[tokio::test]
async fn listing_reports_every_slot() {
    let h = Harness::new();
    h.upload("profile-image", "image/jpeg", "me.jpg", b"jpeg").await;

    let body = json_body(h.get("/assets").await).await;
    let slots = body.as_object().unwrap();
    assert_eq!(slots.len(), SlotKind::COUNT);
    assert!(slots["profile-image"].as_str().unwrap().starts_with("https://"));
    assert!(slots["cv"].is_null());
}

#[tokio::test]
async fn remote_outage_is_503_with_a_sanitized_message() {
    let h = Harness::new();
    h.remote.fail_next_upload();

    let res = h.upload("profile-image", "image/jpeg", "me.jpg", b"jpeg").await;
    assert_eq!(res.status().as_u16(), 503);
    let body = json_body(res).await;
    assert_eq!(body["message"], "Storage backend unavailable, please retry");
    assert!(!body.to_string().contains("connection refused"));
}

async fn upload_cv(h: &Harness) -> String {
    let res = h.upload("cv", "application/pdf", "resume.pdf", b"%PDF-1.7").await;
    assert_eq!(res.status().as_u16(), 200);
    let url = json_body(res).await["url"].as_str().unwrap().to_string();
    url.trim_start_matches("/download/").to_string()
}

#[tokio::test]
async fn minted_link_downloads_the_cv() {
    let h = Harness::new();
    let file = upload_cv(&h).await;

    let res = h
        .send(
            Request::builder()
                .method("POST")
                .uri("/assets/cv/link")
                .header("authorization", h.admin())
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(res.status().as_u16(), 200);
    let link = json_body(res).await["url"].as_str().unwrap().to_string();
    assert!(link.starts_with(&format!("/download/{file}?token=")));

    let res = h.get(&link).await;
    assert_eq!(res.status().as_u16(), 200);
    assert_eq!(res.headers()["content-type"], "application/pdf");
    assert!(res.headers()["content-disposition"]
        .to_str()
        .unwrap()
        .contains(&file));
    assert_eq!(raw_body(res).await, b"%PDF-1.7");
}

#[tokio::test]
async fn download_serves_the_recorded_type_and_guesses_older_files() {
    let h = Harness::new();
    let docx = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
    let res = h.upload("cv", docx, "resume.docx", b"PK docx").await;
    let url = json_body(res).await["url"].as_str().unwrap().to_string();
    let file = url.trim_start_matches("/download/").to_string();

    let token = h.tokens.issue_download("owner", &file).unwrap().token;
    let res = h.get(&format!("/download/{file}?token={token}")).await;
    assert_eq!(res.status().as_u16(), 200);
    assert_eq!(res.headers()["content-type"], docx);

    let private = h._tmp.path().join("uploads/private");
    std::fs::write(private.join("cv-1.odt"), b"odt").unwrap();
    let token = h.tokens.issue_download("owner", "cv-1.odt").unwrap().token;
    let res = h.get(&format!("/download/cv-1.odt?token={token}")).await;
    assert_eq!(res.status().as_u16(), 200);
    assert_eq!(res.headers()["content-type"], "application/vnd.oasis.opendocument.text");
    assert_eq!(raw_body(res).await, b"odt");
}

#[tokio::test]
async fn expired_token_is_401_without_touching_the_filesystem() {
    let h = Harness::new();
    let file = upload_cv(&h).await;
    let opens_before = h.disk.opens();

    let expired = h
        .tokens
        .issue_expiring_at(
            "owner",
            Scope::Download { file: file.clone() },
            Utc::now() - Duration::minutes(5),
        )
        .unwrap();

    let res = h.get(&format!("/download/{file}?token={expired}")).await;
    assert_eq!(res.status().as_u16(), 401);
    assert_eq!(h.disk.opens(), opens_before);
}

#[tokio::test]
async fn missing_or_foreign_tokens_are_401() {
    let h = Harness::new();
    let file = upload_cv(&h).await;

    let res = h.get(&format!("/download/{file}")).await;
    assert_eq!(res.status().as_u16(), 401);

    let other = h.tokens.issue_download("owner", "cv-0.pdf").unwrap().token;
    let res = h.get(&format!("/download/{file}?token={other}")).await;
    assert_eq!(res.status().as_u16(), 401);

    assert_eq!(h.disk.opens(), 0);
}

#[tokio::test]
async fn valid_token_for_a_missing_file_is_404() {
    let h = Harness::new();
    let token = h.tokens.issue_download("owner", "cv-404.pdf").unwrap().token;

    let res = h.get(&format!("/download/cv-404.pdf?token={token}")).await;
    assert_eq!(res.status().as_u16(), 404);
    assert_eq!(json_body(res).await["name"], "NotFound");
    assert_eq!(h.disk.opens(), 1);
}

#[tokio::test]
async fn reclaim_requires_admin_and_reports_swept_files() {
    let h = Harness::new();
    upload_cv(&h).await;

    let res = h
        .send(
            Request::builder()
                .method("POST")
                .uri("/assets/reclaim")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(res.status().as_u16(), 401);

    let res = h
        .send(
            Request::builder()
                .method("POST")
                .uri("/assets/reclaim")
                .header("authorization", h.admin())
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(res.status().as_u16(), 200);
    assert_eq!(json_body(res).await["reclaimed"], serde_json::json!([]));
}

#[tokio::test]
async fn unknown_routes_are_json_404() {
    let h = Harness::new();
    let res = h.get("/nope").await;
    assert_eq!(res.status().as_u16(), 404);
    assert_eq!(json_body(res).await["className"], "not-found");
}
