use std::sync::Arc;

use sha2::{Digest, Sha256};

use tg_domain::config::Config;

use crate::runtime::Gateway;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub gateway: Gateway,

    // ── Security ──────────────────────────────────────────────────────
    /// SHA-256 of the API bearer token. `None` disables API auth (dev mode).
    pub api_token_hash: Option<Vec<u8>>,
    /// SHA-256 of the admin bearer token. `None` disables admin auth.
    pub admin_token_hash: Option<Vec<u8>>,
}

impl AppState {
    /// Empty tokens count as unset.
    pub fn new(
        config: Arc<Config>,
        gateway: Gateway,
        api_token: Option<&str>,
        admin_token: Option<&str>,
    ) -> Self {
        Self {
            config,
            gateway,
            api_token_hash: api_token.filter(|t| !t.is_empty()).map(hash_token),
            admin_token_hash: admin_token.filter(|t| !t.is_empty()).map(hash_token),
        }
    }
}

pub(crate) fn hash_token(token: &str) -> Vec<u8> {
    Sha256::digest(token.as_bytes()).to_vec()
}
