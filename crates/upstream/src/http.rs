//! reqwest-backed [`Upstream`].

use reqwest::Method;
use serde_json::Value;

use tg_domain::config::ServiceConfig;
use tg_domain::request::ProxyRequest;

use crate::error::UpstreamError;
use crate::traits::{Upstream, UpstreamResponse};
use crate::usage::extract_usage;
use crate::util::{from_reqwest, join_url, resolve_api_key};

/// Headers never copied from the inbound request.
const SKIPPED_HEADERS: &[&str] = &["host", "content-length", "connection", "transfer-encoding"];

/// Forwards requests over HTTP, one shared connection pool for all services.
#[derive(Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
}

impl HttpUpstream {
    pub fn new() -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder().build().map_err(from_reqwest)?;
        Ok(Self { client })
    }

    // ── Internal: build the outbound request ──────────────────────

    fn build(
        &self,
        service: &ServiceConfig,
        request: &ProxyRequest,
    ) -> Result<reqwest::RequestBuilder, UpstreamError> {
        if service.base_url.is_empty() {
            return Err(UpstreamError::InvalidRequest(format!(
                "service '{}' has no base_url",
                request.service
            )));
        }
        let method = Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| {
                UpstreamError::InvalidRequest(format!("invalid method '{}'", request.method))
            })?;
        let url = join_url(&service.base_url, &request.endpoint);

        let mut builder = self
            .client
            .request(method.clone(), &url)
            .timeout(service.request_timeout());

        for (name, value) in &request.headers {
            let lower = name.to_ascii_lowercase();
            if SKIPPED_HEADERS.contains(&lower.as_str())
                || lower == service.auth_header.to_ascii_lowercase()
            {
                continue;
            }
            builder = builder.header(name, value);
        }

        if let Some(key) = resolve_api_key(service)? {
            builder = builder.header(&service.auth_header, format!("{}{}", service.auth_prefix, key));
        }

        let has_body = !request.body.is_null() && method != Method::GET && method != Method::HEAD;
        if has_body {
            builder = builder.json(&request.body);
        }

        tracing::debug!(
            service = %request.service,
            method = %method,
            url = %url,
            "forwarding request"
        );
        Ok(builder)
    }
}

#[async_trait::async_trait]
impl Upstream for HttpUpstream {
    async fn forward(
        &self,
        service: &ServiceConfig,
        request: &ProxyRequest,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let resp = self
            .build(service, request)?
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        let text = resp.text().await.map_err(from_reqwest)?;
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));

        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(UpstreamResponse {
            status: status.as_u16(),
            usage: extract_usage(&body),
            body,
        })
    }
}
