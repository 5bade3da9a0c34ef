//! Wires configuration, stores, registry and router into one [`AxumApp`].
//!
//! Every key is read from the environment under the `LARDER__` prefix
//! (`LARDER__UPLOADS__DIR` is `uploads.dir`). Cloudinary credentials may
//! also come from a single `CLOUDINARY_URL`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use larder_auth::{TokenOptions, TokenService};
use larder_axum::{AssetState, AxumApp, HttpOptions};
use larder_blob::{
    AssetConfig, AssetCoordinator, CloudinaryCredentials, CloudinaryStore, JsonFileRegistry,
    LocalDiskStore,
};
use larder_core::{LarderConfig, LarderConfigSnapshot};

pub const ENV_PREFIX: &str = "LARDER__";

const DEFAULT_UPLOADS_DIR: &str = "uploads";
const DEFAULT_REGISTRY_PATH: &str = "data/site-assets.json";
const DEFAULT_DOWNLOAD_TTL_SECS: u64 = 900;

/// A fully wired server plus the configuration it was built from.
pub struct LarderServer {
    pub ax: AxumApp,
    pub config: LarderConfigSnapshot,
}

impl LarderServer {
    /// `http.host:http.port`, defaulting to `127.0.0.1:3030`.
    pub fn addr(&self) -> String {
        let host = self
            .config
            .get_string("http.host")
            .unwrap_or_else(|| "127.0.0.1".to_string());
        let port = self
            .config
            .get_string("http.port")
            .unwrap_or_else(|| "3030".to_string());
        format!("{host}:{port}")
    }

    pub async fn listen(self) -> Result<()> {
        let addr = self.addr();
        self.ax.listen(addr).await
    }
}

/// Load configuration from the process environment.
pub fn load_config() -> LarderConfig {
    let mut config = LarderConfig::from_env(ENV_PREFIX);
    if let Ok(url) = std::env::var("CLOUDINARY_URL") {
        config.set_default("cloudinary.url", url);
    }
    config
}

pub fn build() -> Result<LarderServer> {
    build_with(load_config())
}

/// Build from an explicit configuration. Missing credentials are a boot
/// error so the server never starts half-configured.
pub fn build_with(config: LarderConfig) -> Result<LarderServer> {
    let snapshot = config.snapshot();

    let credentials = cloudinary_credentials(&snapshot)?;
    let tokens = token_service(&snapshot)?;

    let uploads_dir = snapshot
        .get_string("uploads.dir")
        .unwrap_or_else(|| DEFAULT_UPLOADS_DIR.to_string());
    let registry_path = snapshot
        .get_string("registry.path")
        .unwrap_or_else(|| DEFAULT_REGISTRY_PATH.to_string());

    let assets = AssetConfig::from_snapshot(&snapshot)?;
    let coordinator = AssetCoordinator::new(
        Arc::new(JsonFileRegistry::new(&registry_path)),
        Arc::new(LocalDiskStore::new(&uploads_dir)),
        Arc::new(CloudinaryStore::new(credentials)),
        assets,
    );

    let mut http = HttpOptions::for_assets(coordinator.config());
    if let Some(limit) = snapshot.get_usize("http.body_limit_bytes")? {
        http = http.with_body_limit(limit);
    }

    tracing::info!(
        uploads_dir = %uploads_dir,
        registry_path = %registry_path,
        body_limit_bytes = http.body_limit_bytes,
        "larder configured"
    );

    let state = AssetState::new(coordinator, tokens);
    Ok(LarderServer {
        ax: AxumApp::new(state, http),
        config: snapshot,
    })
}

/// `cloudinary.url` wins over the individual keys.
pub fn cloudinary_credentials(snapshot: &LarderConfigSnapshot) -> Result<CloudinaryCredentials> {
    if let Some(url) = snapshot.get("cloudinary.url") {
        return CloudinaryCredentials::from_url(url)
            .context("CLOUDINARY_URL must look like cloudinary://<api_key>:<api_secret>@<cloud_name>");
    }

    let missing: Vec<&str> = ["cloudinary.cloud_name", "cloudinary.api_key", "cloudinary.api_secret"]
        .into_iter()
        .filter(|key| snapshot.get(key).is_none())
        .collect();
    if !missing.is_empty() {
        anyhow::bail!(
            "Cloudinary credentials are not configured (missing {}); set CLOUDINARY_URL or LARDER__CLOUDINARY__*",
            missing.join(", ")
        );
    }

    Ok(CloudinaryCredentials::new(
        snapshot.require("cloudinary.cloud_name")?,
        snapshot.require("cloudinary.api_key")?,
        snapshot.require("cloudinary.api_secret")?,
    ))
}

pub fn token_service(snapshot: &LarderConfigSnapshot) -> Result<TokenService> {
    let secret = snapshot.require("auth.jwt_secret")?;
    let ttl = snapshot
        .get_u64("download.token_ttl_secs")?
        .unwrap_or(DEFAULT_DOWNLOAD_TTL_SECS);

    let options = TokenOptions::new(secret).with_download_ttl(Duration::from_secs(ttl));
    TokenService::new(options).map_err(|e| anyhow::anyhow!("invalid auth configuration: {e}"))
}
