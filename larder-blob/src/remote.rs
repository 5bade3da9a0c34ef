use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use sha1::{Digest, Sha1};

use crate::{AssetError, AssetResult, RemoteAsset, StoreKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropMode {
    /// Shrink to fit inside the box, never upscale.
    Limit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Auto,
}

/// Fixed transformation applied by the remote store on ingest.
///
/// Only named profiles can be built, so callers never pick raw dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformProfile {
    quality: Quality,
    format: Format,
    max_width: u32,
    max_height: u32,
    crop: CropMode,
}

impl TransformProfile {
    /// Profile photos: bounded to 1200x1200, automatic quality and format.
    pub const fn profile_photo() -> Self {
        Self {
            quality: Quality::Auto,
            format: Format::Auto,
            max_width: 1200,
            max_height: 1200,
            crop: CropMode::Limit,
        }
    }

    pub fn max_width(&self) -> u32 {
        self.max_width
    }

    pub fn max_height(&self) -> u32 {
        self.max_height
    }

    pub fn crop(&self) -> CropMode {
        self.crop
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Dimensions a source image ends up with after this profile.
    pub fn effective_size(&self, width: u32, height: u32) -> (u32, u32) {
        match self.crop {
            CropMode::Limit => {
                if width <= self.max_width && height <= self.max_height {
                    return (width, height);
                }
                let (w, h, max_w, max_h) = (
                    width as u64,
                    height as u64,
                    self.max_width as u64,
                    self.max_height as u64,
                );
                if w * max_h >= h * max_w {
                    (self.max_width, ((h * max_w / w).max(1)) as u32)
                } else {
                    (((w * max_h / h).max(1)) as u32, self.max_height)
                }
            }
        }
    }

    /// Cloudinary transformation string, e.g. `c_limit,h_1200,w_1200/q_auto/f_auto`.
    pub fn to_transformation(&self) -> String {
        let crop = match self.crop {
            CropMode::Limit => "limit",
        };
        let quality = match self.quality {
            Quality::Auto => "auto",
        };
        let format = match self.format {
            Format::Auto => "auto",
        };
        format!(
            "c_{crop},h_{},w_{}/q_{quality}/f_{format}",
            self.max_height, self.max_width
        )
    }
}

/// Per-upload options for the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    pub profile: TransformProfile,
    pub folder: String,
}

impl UploadOptions {
    pub fn new(profile: TransformProfile, folder: impl Into<String>) -> Self {
        Self {
            profile,
            folder: folder.into(),
        }
    }
}

/// Photographic asset storage behind a cloud transformation service.
#[async_trait]
pub trait RemoteImageStore: Send + Sync {
    async fn upload(
        &self,
        bytes: Bytes,
        file_name: Option<&str>,
        options: &UploadOptions,
    ) -> AssetResult<RemoteAsset>;

    /// Destroy an asset. An already-missing asset is success.
    async fn destroy(&self, public_id: &str) -> AssetResult<()>;

    /// Best-effort destroy: failures are logged, never returned.
    async fn destroy_best_effort(&self, public_id: &str) {
        match self.destroy(public_id).await {
            Ok(()) => tracing::debug!(public_id = %public_id, "destroyed remote asset"),
            Err(e) => {
                let cleanup = AssetError::cleanup(public_id, e);
                tracing::warn!(error = %cleanup, "leaving orphaned remote asset");
            }
        }
    }
}

/// Cloudinary account credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct CloudinaryCredentials {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

impl std::fmt::Debug for CloudinaryCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudinaryCredentials")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

impl CloudinaryCredentials {
    pub fn new(
        cloud_name: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            cloud_name: cloud_name.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// Parse `cloudinary://<api_key>:<api_secret>@<cloud_name>`.
    pub fn from_url(url: &str) -> Option<Self> {
        let rest = url.trim().strip_prefix("cloudinary://")?;
        let (auth, cloud) = rest.rsplit_once('@')?;
        let (key, secret) = auth.split_once(':')?;
        let cloud = cloud.split(['/', '?']).next().unwrap_or_default();
        if key.is_empty() || secret.is_empty() || cloud.is_empty() {
            return None;
        }
        Some(Self::new(cloud, key, secret))
    }
}

/// Sign request parameters: sorted `k=v` pairs joined by `&`, then the
/// secret appended, SHA-1, lowercase hex.
pub fn sign_params(params: &BTreeMap<&str, String>, api_secret: &str) -> String {
    let to_sign = params
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha1::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Cloudinary upload API client.
#[derive(Clone)]
pub struct CloudinaryStore {
    client: reqwest::Client,
    credentials: CloudinaryCredentials,
    api_base: String,
}

impl CloudinaryStore {
    pub fn new(credentials: CloudinaryCredentials) -> Self {
        Self {
            client: reqwest::Client::new(),
            credentials,
            api_base: "https://api.cloudinary.com/v1_1".to_string(),
        }
    }

    /// Point at a different API host (staging, local fakes).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "{}/{}/image/{}",
            self.api_base, self.credentials.cloud_name, action
        )
    }

    fn timestamp() -> String {
        chrono::Utc::now().timestamp().to_string()
    }

    fn remote_error(context: &str, err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> AssetError {
        AssetError::storage(StoreKind::RemoteImage, context, err)
    }

    async fn check_status(context: &str, res: reqwest::Response) -> AssetResult<reqwest::Response> {
        if res.status().is_success() {
            return Ok(res);
        }
        let status = res.status();
        let message = match res.json::<ErrorEnvelope>().await {
            Ok(envelope) => envelope.error.message,
            Err(_) => status.to_string(),
        };
        Err(Self::remote_error(
            context,
            format!("HTTP {}: {}", status.as_u16(), message),
        ))
    }
}

#[async_trait]
impl RemoteImageStore for CloudinaryStore {
    async fn upload(
        &self,
        bytes: Bytes,
        file_name: Option<&str>,
        options: &UploadOptions,
    ) -> AssetResult<RemoteAsset> {
        let mut params = BTreeMap::new();
        params.insert("folder", options.folder.clone());
        params.insert("timestamp", Self::timestamp());
        params.insert("transformation", options.profile.to_transformation());
        let signature = sign_params(&params, &self.credentials.api_secret);

        let part = reqwest::multipart::Part::bytes(bytes.to_vec())
            .file_name(file_name.unwrap_or("upload").to_string());
        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("api_key", self.credentials.api_key.clone())
            .text("signature", signature);
        for (k, v) in params {
            form = form.text(k, v);
        }

        let res = self
            .client
            .post(self.endpoint("upload"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| Self::remote_error("uploading image", e))?;
        let res = Self::check_status("uploading image", res).await?;

        let asset: RemoteAsset = res
            .json()
            .await
            .map_err(|e| Self::remote_error("decoding upload response", e))?;

        tracing::debug!(public_id = %asset.public_id, "uploaded remote asset");
        Ok(asset)
    }

    async fn destroy(&self, public_id: &str) -> AssetResult<()> {
        let mut params = BTreeMap::new();
        params.insert("invalidate", "true".to_string());
        params.insert("public_id", public_id.to_string());
        params.insert("timestamp", Self::timestamp());
        let signature = sign_params(&params, &self.credentials.api_secret);

        let mut form: Vec<(String, String)> = params
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        form.push(("api_key".to_string(), self.credentials.api_key.clone()));
        form.push(("signature".to_string(), signature));

        let res = self
            .client
            .post(self.endpoint("destroy"))
            .form(&form)
            .send()
            .await
            .map_err(|e| Self::remote_error("destroying image", e))?;
        let res = Self::check_status("destroying image", res).await?;

        let body: DestroyResponse = res
            .json()
            .await
            .map_err(|e| Self::remote_error("decoding destroy response", e))?;

        match body.result.as_str() {
            "ok" | "not found" => Ok(()),
            other => Err(Self::remote_error(
                "destroying image",
                format!("unexpected result '{other}'"),
            )),
        }
    }
}
