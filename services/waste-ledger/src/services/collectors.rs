use rust_decimal::prelude::ToPrimitive;
use std::sync::Arc;
use tracing::{info, warn};
use validator::Validate;

use crate::auth::{hash_password, password::verify_against_dummy, verify_password, TokenIssuer};
use crate::config::PaginationConfig;
use crate::errors::{LedgerServiceError, Result};
use crate::ledger;
use crate::metrics;
use crate::models::{
    CollectionDraft, CollectionRequest, CollectionView, Collector, CollectorStats,
    CollectorSummary, LoginRequest, LoginResponse, NewCollector, Page, PageQuery,
    RegisterRequest, Role, Transaction, WithdrawalDraft, WithdrawalRequest,
};
use crate::store::LedgerStore;

/// Registration, login and the collector's own ledger operations.
pub struct CollectorService {
    store: Arc<dyn LedgerStore>,
    issuer: Arc<TokenIssuer>,
    pagination: PaginationConfig,
}

impl CollectorService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        issuer: Arc<TokenIssuer>,
        pagination: PaginationConfig,
    ) -> Self {
        CollectorService {
            store,
            issuer,
            pagination,
        }
    }

    /// Create a `collector` identity with zero balance and weight.
    pub async fn register(&self, request: RegisterRequest) -> Result<Collector> {
        request.validate()?;

        let hashed_password = hash_password(&request.password)?;
        let collector = self
            .store
            .create_collector(NewCollector {
                username: request.username,
                full_name: request.full_name.trim().to_string(),
                phone_number: request.phone_number.trim().to_string(),
                hashed_password,
                role: Role::Collector,
            })
            .await?;

        metrics::REGISTRATIONS.inc();
        info!(collector_id = collector.id, username = %collector.username, "Collector registered");

        Ok(collector)
    }

    pub async fn login(&self, request: LoginRequest) -> Result<LoginResponse> {
        let collector = match self.store.find_collector_by_username(&request.username).await? {
            Some(collector) => collector,
            None => {
                // Same hashing effort as a real mismatch
                verify_against_dummy(&request.password);
                metrics::LOGINS.with_label_values(&["invalid_credentials"]).inc();
                return Err(LedgerServiceError::InvalidCredentials);
            }
        };

        if !verify_password(&request.password, &collector.hashed_password) {
            metrics::LOGINS.with_label_values(&["invalid_credentials"]).inc();
            return Err(LedgerServiceError::InvalidCredentials);
        }

        if !collector.is_active {
            warn!(username = %collector.username, "Login attempt on disabled account");
            metrics::LOGINS.with_label_values(&["account_disabled"]).inc();
            return Err(LedgerServiceError::AccountDisabled);
        }

        let access_token = self.issuer.issue(&collector.username, collector.role)?;

        metrics::LOGINS.with_label_values(&["success"]).inc();
        info!(collector_id = collector.id, "Login succeeded");

        Ok(LoginResponse {
            access_token,
            token_type: "bearer".to_string(),
            collector: CollectorSummary::from(&collector),
        })
    }

    pub async fn stats(&self, collector: &Collector) -> Result<CollectorStats> {
        self.store.collector_stats(collector).await
    }

    pub async fn record_collection(
        &self,
        collector: &Collector,
        request: CollectionRequest,
    ) -> Result<CollectionView> {
        request.validate()?;
        ledger::validate_weight(request.weight_kg)?;

        let draft = CollectionDraft {
            item_id: request.item_id,
            weight_kg: request.weight_kg,
            location: ledger::normalize_text(request.location),
            notes: ledger::normalize_text(request.notes),
        };

        let collection = self.store.record_collection(collector.id, &draft).await?;

        metrics::COLLECTIONS_RECORDED.inc();
        if let Some(weight) = collection.weight_kg.to_f64() {
            metrics::COLLECTION_WEIGHT_KG.observe(weight);
        }
        info!(
            collector_id = collector.id,
            collection_id = collection.id,
            item_id = collection.item_id,
            weight_kg = %collection.weight_kg,
            earned = %collection.earned_amount,
            "Collection recorded"
        );

        Ok(collection)
    }

    pub async fn list_collections(
        &self,
        collector: &Collector,
        query: &PageQuery,
    ) -> Result<Vec<CollectionView>> {
        let page = Page::resolve(query, self.pagination.default_limit, &self.pagination)?;
        self.store.list_collections(Some(collector.id), page).await
    }

    pub async fn withdraw(
        &self,
        collector: &Collector,
        request: WithdrawalRequest,
    ) -> Result<Transaction> {
        request.validate()?;
        ledger::validate_amount(request.amount)?;

        let draft = WithdrawalDraft {
            amount: request.amount,
            description: ledger::normalize_text(request.description),
        };

        match self.store.withdraw(collector.id, &draft).await {
            Ok(transaction) => {
                metrics::WITHDRAWALS.with_label_values(&["success"]).inc();
                info!(
                    collector_id = collector.id,
                    transaction_id = transaction.id,
                    amount = %request.amount,
                    "Withdrawal completed"
                );
                Ok(transaction)
            }
            Err(err @ LedgerServiceError::InsufficientBalance { .. }) => {
                metrics::WITHDRAWALS
                    .with_label_values(&["insufficient_balance"])
                    .inc();
                info!(collector_id = collector.id, "Withdrawal refused: {}", err);
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn list_transactions(
        &self,
        collector: &Collector,
        query: &PageQuery,
    ) -> Result<Vec<Transaction>> {
        let page = Page::resolve(query, self.pagination.default_limit, &self.pagination)?;
        self.store.list_transactions(collector.id, page).await
    }
}
