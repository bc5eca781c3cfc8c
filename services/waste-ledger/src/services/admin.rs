use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use validator::Validate;

use crate::config::PaginationConfig;
use crate::errors::{LedgerServiceError, Result};
use crate::ledger;
use crate::metrics;
use crate::models::{
    CollectionView, Collector, CollectorPatch, CollectorStats, CreateItemRequest, DashboardStats,
    ItemPatch, NewItem, Page, PageQuery, RecentQuery, RecyclableItem,
};
use crate::reconciliation::{self, ReconciliationReport};
use crate::store::LedgerStore;

/// Operator surface: reporting, identity administration and catalog upkeep.
pub struct AdminService {
    store: Arc<dyn LedgerStore>,
    pagination: PaginationConfig,
}

impl AdminService {
    pub fn new(store: Arc<dyn LedgerStore>, pagination: PaginationConfig) -> Self {
        AdminService { store, pagination }
    }

    /// System totals; "today" is the current UTC date.
    pub async fn dashboard(&self) -> Result<DashboardStats> {
        self.store.dashboard(Utc::now().date_naive()).await
    }

    pub async fn list_collectors(&self, query: &PageQuery) -> Result<Vec<Collector>> {
        let page = Page::resolve(query, self.pagination.default_limit, &self.pagination)?;
        self.store.list_collectors(page).await
    }

    pub async fn get_collector(&self, id: i64) -> Result<Collector> {
        self.store
            .find_collector(id)
            .await?
            .ok_or(LedgerServiceError::CollectorNotFound(id))
    }

    pub async fn collector_stats(&self, id: i64) -> Result<CollectorStats> {
        let collector = self.get_collector(id).await?;
        self.store.collector_stats(&collector).await
    }

    pub async fn update_collector(&self, id: i64, patch: CollectorPatch) -> Result<Collector> {
        patch.validate()?;
        if patch.is_empty() {
            return Err(LedgerServiceError::Validation(
                "patch must change at least one field".to_string(),
            ));
        }

        let collector = self.store.update_collector(id, &patch).await?;
        info!(
            collector_id = id,
            role = %collector.role,
            is_active = collector.is_active,
            "Collector updated"
        );
        Ok(collector)
    }

    pub async fn create_item(&self, request: CreateItemRequest) -> Result<RecyclableItem> {
        request.validate()?;
        ledger::validate_price(request.price_per_kg)?;

        let item = self
            .store
            .create_item(NewItem {
                name: request.name.trim().to_string(),
                category: request.category.trim().to_string(),
                instructions: ledger::normalize_text(request.instructions),
                price_per_kg: request.price_per_kg,
            })
            .await?;

        info!(item_id = item.id, name = %item.name, "Recyclable item created");
        Ok(item)
    }

    pub async fn update_item(&self, id: i64, mut patch: ItemPatch) -> Result<RecyclableItem> {
        patch.validate()?;
        if let Some(price) = patch.price_per_kg {
            ledger::validate_price(price)?;
        }
        if patch.is_empty() {
            return Err(LedgerServiceError::Validation(
                "patch must change at least one field".to_string(),
            ));
        }
        patch.name = patch.name.map(|n| n.trim().to_string());
        patch.category = patch.category.map(|c| c.trim().to_string());

        let item = self.store.update_item(id, &patch).await?;
        info!(item_id = id, "Recyclable item updated");
        Ok(item)
    }

    pub async fn delete_item(&self, id: i64) -> Result<()> {
        self.store.delete_item(id).await?;
        info!(item_id = id, "Recyclable item deleted");
        Ok(())
    }

    /// Newest collections across every collector.
    pub async fn recent_collections(&self, query: &RecentQuery) -> Result<Vec<CollectionView>> {
        let page = Page::resolve(
            &PageQuery {
                skip: None,
                limit: query.limit,
            },
            self.pagination.default_limit,
            &self.pagination,
        )?;
        self.store.list_collections(None, page).await
    }

    /// Audit stored balances and weights against the ledger history.
    pub async fn reconcile(&self) -> Result<ReconciliationReport> {
        let totals = self.store.ledger_totals().await?;
        let report = reconciliation::reconcile(&totals, Utc::now());

        metrics::LEDGER_DISCREPANCIES.set(report.discrepancies.len() as i64);
        if report.consistent {
            info!(collectors = report.collectors_checked, "Ledger reconciliation clean");
        } else {
            for d in &report.discrepancies {
                warn!(
                    collector_id = d.collector_id,
                    balance_difference = %d.balance_difference,
                    weight_difference = %d.weight_difference,
                    "Ledger discrepancy"
                );
            }
        }

        Ok(report)
    }
}
