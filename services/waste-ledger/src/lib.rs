pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod ledger;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod reconciliation;
pub mod reporting;
pub mod seed;
pub mod services;
pub mod store;

pub use config::Config;
pub use errors::{LedgerServiceError, Result};
pub use services::ServiceContainer;
pub use store::{LedgerStore, MemoryStore, PgStore};
