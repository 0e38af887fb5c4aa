//! Forwarding of admitted requests to provider HTTP APIs.

pub mod error;
pub mod http;
pub mod traits;
pub mod usage;
pub mod util;

// Re-exports for convenience.
pub use error::UpstreamError;
pub use http::HttpUpstream;
pub use traits::{Upstream, UpstreamResponse};
pub use usage::{extract_usage, TokenUsage};
