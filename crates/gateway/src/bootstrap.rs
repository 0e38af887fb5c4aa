//! AppState construction and background-task spawning extracted from `main.rs`.

use std::sync::Arc;

use anyhow::Context;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use tg_domain::config::{Config, ConfigSeverity, UsageLogConfig};
use tg_limits::SystemClock;
use tg_upstream::HttpUpstream;

use crate::runtime::sink::{FanoutSink, JsonlSink, TracingSink, UsageSink};
use crate::runtime::Gateway;
use crate::state::AppState;

/// Validate config, initialize every subsystem and return a fully-wired
/// [`AppState`].
pub async fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    let errors = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();
    if errors > 0 {
        anyhow::bail!("config validation failed with {errors} error(s)");
    }

    // ── Usage sink ───────────────────────────────────────────────────
    let sink = build_usage_sink(&config.usage_log).await?;

    // ── Upstream client ──────────────────────────────────────────────
    let upstream = HttpUpstream::new().context("building upstream HTTP client")?;

    // ── Gateway ──────────────────────────────────────────────────────
    let gateway = Gateway::new(&config, Arc::new(upstream), Arc::new(SystemClock), sink);
    let services = gateway.state().registry().names();
    tracing::info!(
        services = ?services,
        max_queue_size = config.gateway.max_queue_size,
        queue_timeout_seconds = config.gateway.queue_timeout_seconds,
        "gateway ready"
    );

    // ── Tokens (read once, hashed for constant-time comparison) ─────
    let api_token = read_token(&config.server.api_token_env, "API");
    let admin_token = read_token(&config.admin.token_env, "admin");

    Ok(AppState::new(
        config,
        gateway,
        api_token.as_deref(),
        admin_token.as_deref(),
    ))
}

/// Start the per-service dispatchers and the daily reset timer.
pub fn spawn_background_tasks(
    state: &AppState,
    shutdown: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    state.gateway.spawn_background(shutdown)
}

// ── Private ──────────────────────────────────────────────────────────

async fn build_usage_sink(cfg: &UsageLogConfig) -> anyhow::Result<Arc<dyn UsageSink>> {
    let mut sinks: Vec<Arc<dyn UsageSink>> = Vec::new();
    if cfg.tracing {
        sinks.push(Arc::new(TracingSink));
    }
    if let Some(path) = &cfg.jsonl_path {
        let sink = JsonlSink::spawn(path)
            .await
            .with_context(|| format!("opening usage log {}", path.display()))?;
        sinks.push(Arc::new(sink));
    }
    if sinks.is_empty() {
        tracing::warn!("usage logging disabled: no sink configured in [usage_log]");
    }
    Ok(Arc::new(FanoutSink::new(sinks)))
}

fn read_token(env_var: &str, label: &str) -> Option<String> {
    match std::env::var(env_var).ok().filter(|t| !t.is_empty()) {
        Some(token) => {
            tracing::info!(source = %format!("env:{env_var}"), "{label} bearer-token auth enabled");
            Some(token)
        }
        None => {
            tracing::warn!("{label} bearer-token auth DISABLED: set the {env_var} env var");
            None
        }
    }
}
