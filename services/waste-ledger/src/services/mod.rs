//! Business operations behind the HTTP handlers.

use actix_web::web;
use std::sync::Arc;

use crate::auth::{AccessGate, TokenIssuer};
use crate::config::{AuthConfig, PaginationConfig};
use crate::store::LedgerStore;

pub mod admin;
pub mod catalog;
pub mod collectors;

pub use admin::AdminService;
pub use catalog::CatalogService;
pub use collectors::CollectorService;

/// Every service wired to one store and one token issuer.
#[derive(Clone)]
pub struct ServiceContainer {
    pub gate: Arc<AccessGate>,
    pub collectors: Arc<CollectorService>,
    pub catalog: Arc<CatalogService>,
    pub admin: Arc<AdminService>,
}

impl ServiceContainer {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        auth: &AuthConfig,
        pagination: PaginationConfig,
    ) -> Self {
        let issuer = Arc::new(TokenIssuer::from_config(auth));

        ServiceContainer {
            gate: Arc::new(AccessGate::new(store.clone(), issuer.clone())),
            collectors: Arc::new(CollectorService::new(
                store.clone(),
                issuer,
                pagination.clone(),
            )),
            catalog: Arc::new(CatalogService::new(store.clone(), pagination.clone())),
            admin: Arc::new(AdminService::new(store, pagination)),
        }
    }

    /// Expose the services as app data for handlers and the auth middleware.
    pub fn register(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(web::Data::from(self.gate.clone()))
            .app_data(web::Data::new(self.collectors.clone()))
            .app_data(web::Data::new(self.catalog.clone()))
            .app_data(web::Data::new(self.admin.clone()));
    }
}
