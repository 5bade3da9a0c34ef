use std::sync::Arc;

use larder_auth::TokenService;
use larder_blob::{AssetConfig, AssetCoordinator};

/// Shared state for every route.
#[derive(Clone, Debug)]
pub struct AssetState {
    pub coordinator: AssetCoordinator,
    pub tokens: Arc<TokenService>,
}

impl AssetState {
    pub fn new(coordinator: AssetCoordinator, tokens: TokenService) -> Self {
        Self {
            coordinator,
            tokens: Arc::new(tokens),
        }
    }
}

/// Transport settings for the router.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpOptions {
    /// Ceiling on any request body, multipart framing included.
    pub body_limit_bytes: usize,
}

impl HttpOptions {
    const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

    /// Room for the largest slot plus multipart framing.
    pub fn for_assets(config: &AssetConfig) -> Self {
        let limit = config
            .largest_max_bytes()
            .saturating_add(Self::MULTIPART_OVERHEAD);
        Self {
            body_limit_bytes: usize::try_from(limit).unwrap_or(usize::MAX),
        }
    }

    pub fn with_body_limit(mut self, bytes: usize) -> Self {
        self.body_limit_bytes = bytes;
        self
    }
}
