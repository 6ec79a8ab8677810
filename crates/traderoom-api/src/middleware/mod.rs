//! API 서버용 HTTP middleware.

mod metrics;
mod rate_limit;

pub use metrics::metrics_layer;
pub use rate_limit::{
    rate_limit_middleware, RateLimitConfig, RateLimitResult, RateLimiter, RateLimitState,
};
