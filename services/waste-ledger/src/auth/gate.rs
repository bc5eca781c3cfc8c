use std::sync::Arc;
use tracing::{debug, warn};

use crate::auth::tokens::{Claims, TokenIssuer};
use crate::errors::{LedgerServiceError, Result};
use crate::metrics;
use crate::models::{Collector, Role};
use crate::store::LedgerStore;

/// Resolves bearer tokens to live identities and enforces role requirements.
///
/// Checks run in a fixed order: token validity, identity lookup and active
/// flag, then role.
pub struct AccessGate {
    store: Arc<dyn LedgerStore>,
    issuer: Arc<TokenIssuer>,
}

impl AccessGate {
    pub fn new(store: Arc<dyn LedgerStore>, issuer: Arc<TokenIssuer>) -> Self {
        AccessGate { store, issuer }
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Token step only: signature, shape, subject and expiry.
    pub fn authenticate(&self, token: &str) -> Result<Claims> {
        self.issuer.verify(token).map_err(|rejection| {
            warn!(reason = %rejection, "Bearer token rejected");
            metrics::AUTH_FAILURES
                .with_label_values(&[rejection.as_str()])
                .inc();
            LedgerServiceError::from(rejection)
        })
    }

    /// Identity and role steps for an already verified token.
    pub async fn resolve(&self, claims: &Claims, required: Role) -> Result<Collector> {
        let collector = match self.store.find_collector_by_username(&claims.sub).await? {
            Some(collector) => collector,
            None => {
                warn!(subject = %claims.sub, reason = "unknown_identity", "Bearer token rejected");
                metrics::AUTH_FAILURES
                    .with_label_values(&["unknown_identity"])
                    .inc();
                return Err(LedgerServiceError::Unauthenticated);
            }
        };

        if !collector.is_active {
            debug!(subject = %claims.sub, "Inactive identity presented a token");
            metrics::AUTH_FAILURES
                .with_label_values(&["account_disabled"])
                .inc();
            return Err(LedgerServiceError::AccountDisabled);
        }

        if !collector.role.satisfies(required) {
            debug!(
                subject = %claims.sub,
                role = %collector.role,
                required = %required,
                "Role check failed"
            );
            return Err(LedgerServiceError::Forbidden {
                required: required.to_string(),
            });
        }

        Ok(collector)
    }

    /// Full check for a raw token.
    pub async fn authorize(&self, token: &str, required: Role) -> Result<Collector> {
        let claims = self.authenticate(token)?;
        self.resolve(&claims, required).await
    }
}
