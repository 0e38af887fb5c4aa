use serde_json::Value;

use tg_domain::config::ServiceConfig;
use tg_domain::request::ProxyRequest;

use crate::error::UpstreamError;
use crate::usage::TokenUsage;

/// A provider answer with a 2xx status.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: Value,
    /// Token counts reported by the provider, when it reports them.
    pub usage: Option<TokenUsage>,
}

/// Sends an admitted request to its service.
///
/// The gateway has already debited the buckets and reserved quota by the
/// time this is called; implementations just perform the call.
#[async_trait::async_trait]
pub trait Upstream: Send + Sync {
    async fn forward(
        &self,
        service: &ServiceConfig,
        request: &ProxyRequest,
    ) -> Result<UpstreamResponse, UpstreamError>;
}
