#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use tg_domain::config::{Config, ModelPricing, ServiceConfig};
use tg_domain::request::ProxyRequest;
use tg_gateway::runtime::sink::MemorySink;
use tg_gateway::runtime::Gateway;
use tg_limits::SystemClock;
use tg_upstream::{TokenUsage, Upstream, UpstreamError, UpstreamResponse};

pub const SERVICE: &str = "openai";
pub const MODEL: &str = "gpt-4o-mini";

/// Answers every call itself; reports the estimate back as input tokens.
#[derive(Default)]
pub struct FakeUpstream {
    pub calls: AtomicUsize,
    pub fail_with: Option<u16>,
    pub latency: Duration,
}

impl FakeUpstream {
    pub fn failing(status: u16) -> Self {
        Self {
            fail_with: Some(status),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Upstream for FakeUpstream {
    async fn forward(
        &self,
        _service: &ServiceConfig,
        request: &ProxyRequest,
    ) -> Result<UpstreamResponse, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if let Some(status) = self.fail_with {
            return Err(UpstreamError::Status {
                status,
                body: json!({ "error": "provider failure" }),
            });
        }
        Ok(UpstreamResponse {
            status: 200,
            body: json!({ "echo": request.endpoint }),
            usage: Some(TokenUsage {
                input_tokens: request.estimated_tokens,
                output_tokens: 0,
            }),
        })
    }
}

/// One service priced at $1 / 1M input and $2 / 1M output tokens.
pub fn config(tpm: u64, rpm: u64, daily: u64) -> Config {
    let mut config = Config::default();
    let mut service = ServiceConfig::with_limits(tpm, rpm, daily);
    service.default_model = Some(MODEL.into());
    config.services.insert(SERVICE.into(), service);
    config.pricing.insert(
        SERVICE,
        MODEL,
        ModelPricing {
            input_per_1m: 1.0,
            output_per_1m: 2.0,
        },
    );
    config
}

pub struct Harness {
    pub gateway: Gateway,
    pub upstream: Arc<FakeUpstream>,
    pub sink: Arc<MemorySink>,
}

pub fn harness(config: &Config, upstream: FakeUpstream) -> Harness {
    let upstream = Arc::new(upstream);
    let sink = Arc::new(MemorySink::new());
    let gateway = Gateway::new(config, upstream.clone(), Arc::new(SystemClock), sink.clone());
    Harness {
        gateway,
        upstream,
        sink,
    }
}

pub fn request(agent: &str, tokens: u64) -> ProxyRequest {
    ProxyRequest::new(SERVICE, agent, tokens).with_endpoint("/v1/chat/completions")
}

/// Yield until the service queue holds `n` requests.
pub async fn wait_for_queue(gateway: &Gateway, n: usize) {
    while gateway.status(SERVICE).unwrap().queue_size != n {
        tokio::task::yield_now().await;
    }
}
