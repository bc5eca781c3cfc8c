pub mod auth;
pub mod rate_limit;
pub mod request_metrics;

pub use auth::JwtAuth;
pub use rate_limit::RateLimiter;
pub use request_metrics::RequestMetrics;
