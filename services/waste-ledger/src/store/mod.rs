//! Persistence behind one trait.
//!
//! Both implementations commit every ledger event (collection or withdrawal)
//! as a single unit and serialize ledger events per identity:
//! [`PgStore`] with a `FOR UPDATE` row lock inside a database transaction,
//! [`MemoryStore`] with a single write-locked critical section.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::errors::Result;
use crate::models::{
    CollectionDraft, CollectionView, Collector, CollectorPatch, CollectorStats, DashboardStats,
    ItemFilter, ItemPatch, LedgerTotals, NewCollector, NewItem, Page, RecyclableItem, Transaction,
    WithdrawalDraft,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    // Identities

    /// Fails with `DuplicateUsername` when the handle is taken.
    async fn create_collector(&self, new: NewCollector) -> Result<Collector>;
    async fn find_collector(&self, id: i64) -> Result<Option<Collector>>;
    async fn find_collector_by_username(&self, username: &str) -> Result<Option<Collector>>;
    async fn list_collectors(&self, page: Page) -> Result<Vec<Collector>>;
    async fn update_collector(&self, id: i64, patch: &CollectorPatch) -> Result<Collector>;

    // Catalog

    /// Fails with `DuplicateItem` when the name is taken.
    async fn create_item(&self, new: NewItem) -> Result<RecyclableItem>;
    async fn find_item(&self, id: i64) -> Result<Option<RecyclableItem>>;
    /// Matching items ordered by id.
    async fn search_items(&self, filter: &ItemFilter, page: Page) -> Result<Vec<RecyclableItem>>;
    async fn count_items(&self, filter: &ItemFilter) -> Result<i64>;
    async fn categories(&self) -> Result<Vec<String>>;
    async fn update_item(&self, id: i64, patch: &ItemPatch) -> Result<RecyclableItem>;
    /// Fails with `ItemInUse` while any collection references the item.
    async fn delete_item(&self, id: i64) -> Result<()>;
    async fn log_search(&self, query_text: &str, result_count: i64) -> Result<()>;

    // Ledger

    /// Collection row, credit transaction, balance and weight in one unit.
    async fn record_collection(
        &self,
        collector_id: i64,
        draft: &CollectionDraft,
    ) -> Result<CollectionView>;
    /// Balance check and debit in one unit under the identity lock.
    async fn withdraw(&self, collector_id: i64, draft: &WithdrawalDraft) -> Result<Transaction>;
    /// Newest first; `None` lists across all collectors.
    async fn list_collections(
        &self,
        collector_id: Option<i64>,
        page: Page,
    ) -> Result<Vec<CollectionView>>;
    /// Newest first.
    async fn list_transactions(&self, collector_id: i64, page: Page) -> Result<Vec<Transaction>>;

    // Reporting

    async fn dashboard(&self, today: NaiveDate) -> Result<DashboardStats>;
    async fn collector_stats(&self, collector: &Collector) -> Result<CollectorStats>;
    async fn ledger_totals(&self) -> Result<Vec<LedgerTotals>>;
}
