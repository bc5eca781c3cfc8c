use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};

use crate::errors::{LedgerServiceError, Result};
use crate::ledger::{self, AccountState};
use crate::models::{
    CitizenQuery, Collection, CollectionDraft, CollectionView, Collector, CollectorPatch,
    CollectorStats, DashboardStats, ItemFilter, ItemPatch, LedgerTotals, NewCollector, NewItem,
    Page, RecyclableItem, Transaction, WithdrawalDraft,
};
use crate::reporting;
use crate::store::LedgerStore;

#[derive(Default)]
struct Tables {
    collectors: Vec<Collector>,
    items: HashMap<i64, RecyclableItem>,
    collections: Vec<Collection>,
    transactions: Vec<Transaction>,
    queries: Vec<CitizenQuery>,
    next_collector_id: i64,
    next_item_id: i64,
    next_collection_id: i64,
    next_transaction_id: i64,
    next_query_id: i64,
}

fn next_id(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

impl Tables {
    fn collector_mut(&mut self, id: i64) -> Result<&mut Collector> {
        self.collectors
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(LedgerServiceError::CollectorNotFound(id))
    }

    fn view(&self, collection: &Collection) -> CollectionView {
        CollectionView::from_parts(collection, self.items.get(&collection.item_id))
    }
}

/// Process-local store for development runs and tests.
///
/// All tables sit behind one lock. Ledger events take the write lock for
/// their whole read-check-write sequence, which serializes them per identity
/// (and globally).
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logged citizen queries, oldest first.
    pub fn search_log(&self) -> Vec<CitizenQuery> {
        self.tables.read().queries.clone()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn create_collector(&self, new: NewCollector) -> Result<Collector> {
        let mut tables = self.tables.write();
        if tables.collectors.iter().any(|c| c.username == new.username) {
            return Err(LedgerServiceError::DuplicateUsername(new.username));
        }

        let collector = Collector {
            id: next_id(&mut tables.next_collector_id),
            username: new.username,
            full_name: new.full_name,
            phone_number: new.phone_number,
            hashed_password: new.hashed_password,
            role: new.role,
            profile_image: None,
            balance: Decimal::ZERO,
            total_collected_kg: Decimal::ZERO,
            is_active: true,
            created_at: Utc::now(),
        };
        tables.collectors.push(collector.clone());
        Ok(collector)
    }

    async fn find_collector(&self, id: i64) -> Result<Option<Collector>> {
        Ok(self.tables.read().collectors.iter().find(|c| c.id == id).cloned())
    }

    async fn find_collector_by_username(&self, username: &str) -> Result<Option<Collector>> {
        Ok(self
            .tables
            .read()
            .collectors
            .iter()
            .find(|c| c.username == username)
            .cloned())
    }

    async fn list_collectors(&self, page: Page) -> Result<Vec<Collector>> {
        Ok(page.slice(&self.tables.read().collectors))
    }

    async fn update_collector(&self, id: i64, patch: &CollectorPatch) -> Result<Collector> {
        let mut tables = self.tables.write();
        let collector = tables.collector_mut(id)?;
        patch.apply(collector);
        Ok(collector.clone())
    }

    async fn create_item(&self, new: NewItem) -> Result<RecyclableItem> {
        let mut tables = self.tables.write();
        if tables.items.values().any(|i| i.name == new.name) {
            return Err(LedgerServiceError::DuplicateItem(new.name));
        }

        let item = RecyclableItem {
            id: next_id(&mut tables.next_item_id),
            name: new.name,
            category: new.category,
            instructions: new.instructions,
            price_per_kg: new.price_per_kg,
            created_at: Utc::now(),
        };
        tables.items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn find_item(&self, id: i64) -> Result<Option<RecyclableItem>> {
        Ok(self.tables.read().items.get(&id).cloned())
    }

    async fn search_items(&self, filter: &ItemFilter, page: Page) -> Result<Vec<RecyclableItem>> {
        let tables = self.tables.read();
        let mut matching: Vec<RecyclableItem> = tables
            .items
            .values()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect();
        matching.sort_by_key(|i| i.id);
        Ok(page.slice(&matching))
    }

    async fn count_items(&self, filter: &ItemFilter) -> Result<i64> {
        Ok(self
            .tables
            .read()
            .items
            .values()
            .filter(|i| filter.matches(i))
            .count() as i64)
    }

    async fn categories(&self) -> Result<Vec<String>> {
        let categories: BTreeSet<String> = self
            .tables
            .read()
            .items
            .values()
            .map(|i| i.category.clone())
            .collect();
        Ok(categories.into_iter().collect())
    }

    async fn update_item(&self, id: i64, patch: &ItemPatch) -> Result<RecyclableItem> {
        let mut tables = self.tables.write();
        if let Some(name) = &patch.name {
            if tables.items.values().any(|i| i.id != id && &i.name == name) {
                return Err(LedgerServiceError::DuplicateItem(name.clone()));
            }
        }

        let item = tables
            .items
            .get_mut(&id)
            .ok_or(LedgerServiceError::ItemNotFound(id))?;
        patch.apply(item);
        Ok(item.clone())
    }

    async fn delete_item(&self, id: i64) -> Result<()> {
        let mut tables = self.tables.write();
        if !tables.items.contains_key(&id) {
            return Err(LedgerServiceError::ItemNotFound(id));
        }
        if tables.collections.iter().any(|c| c.item_id == id) {
            return Err(LedgerServiceError::ItemInUse(id));
        }
        tables.items.remove(&id);
        Ok(())
    }

    async fn log_search(&self, query_text: &str, result_count: i64) -> Result<()> {
        let mut tables = self.tables.write();
        let query = CitizenQuery {
            id: next_id(&mut tables.next_query_id),
            query_text: query_text.to_string(),
            result_count,
            created_at: Utc::now(),
        };
        tables.queries.push(query);
        Ok(())
    }

    async fn record_collection(
        &self,
        collector_id: i64,
        draft: &CollectionDraft,
    ) -> Result<CollectionView> {
        let mut tables = self.tables.write();

        let item = tables
            .items
            .get(&draft.item_id)
            .cloned()
            .ok_or(LedgerServiceError::ItemNotFound(draft.item_id))?;
        let account = AccountState::from(&*tables.collector_mut(collector_id)?);
        let posting = ledger::post_collection(&account, &item, draft.weight_kg)?;

        let now = Utc::now();
        let collection = Collection {
            id: next_id(&mut tables.next_collection_id),
            collector_id,
            item_id: item.id,
            weight_kg: draft.weight_kg,
            earned_amount: posting.amount,
            location: draft.location.clone(),
            notes: draft.notes.clone(),
            collected_at: now,
        };
        let transaction = Transaction {
            id: next_id(&mut tables.next_transaction_id),
            collector_id,
            transaction_type: posting.transaction_type,
            amount: posting.amount,
            description: Some(posting.description.clone()),
            created_at: now,
        };

        // Nothing above has touched shared state; commit all four effects together.
        let collector = tables.collector_mut(collector_id)?;
        collector.balance = posting.balance_after;
        collector.total_collected_kg = posting.total_collected_kg_after;
        tables.collections.push(collection.clone());
        tables.transactions.push(transaction);

        Ok(CollectionView::from_parts(&collection, Some(&item)))
    }

    async fn withdraw(&self, collector_id: i64, draft: &WithdrawalDraft) -> Result<Transaction> {
        let mut tables = self.tables.write();

        let account = AccountState::from(&*tables.collector_mut(collector_id)?);
        let posting = ledger::post_withdrawal(&account, draft.amount, draft.description.as_deref())?;

        let transaction = Transaction {
            id: next_id(&mut tables.next_transaction_id),
            collector_id,
            transaction_type: posting.transaction_type,
            amount: posting.amount,
            description: Some(posting.description),
            created_at: Utc::now(),
        };

        tables.collector_mut(collector_id)?.balance = posting.balance_after;
        tables.transactions.push(transaction.clone());

        Ok(transaction)
    }

    async fn list_collections(
        &self,
        collector_id: Option<i64>,
        page: Page,
    ) -> Result<Vec<CollectionView>> {
        let tables = self.tables.read();
        let mut own: Vec<&Collection> = tables
            .collections
            .iter()
            .filter(|c| collector_id.map_or(true, |id| c.collector_id == id))
            .collect();
        own.sort_by(|a, b| b.collected_at.cmp(&a.collected_at).then(b.id.cmp(&a.id)));

        Ok(page
            .slice(&own)
            .into_iter()
            .map(|c| tables.view(c))
            .collect())
    }

    async fn list_transactions(&self, collector_id: i64, page: Page) -> Result<Vec<Transaction>> {
        let tables = self.tables.read();
        let mut own: Vec<Transaction> = tables
            .transactions
            .iter()
            .filter(|t| t.collector_id == collector_id)
            .cloned()
            .collect();
        own.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(page.slice(&own))
    }

    async fn dashboard(&self, today: NaiveDate) -> Result<DashboardStats> {
        let tables = self.tables.read();
        Ok(reporting::dashboard(
            &tables.collectors,
            &tables.collections,
            &tables.items,
            today,
        ))
    }

    async fn collector_stats(&self, collector: &Collector) -> Result<CollectorStats> {
        let tables = self.tables.read();
        // Re-read so the balance is the committed one
        let current = tables
            .collectors
            .iter()
            .find(|c| c.id == collector.id)
            .ok_or(LedgerServiceError::CollectorNotFound(collector.id))?;
        Ok(reporting::collector_stats(
            current,
            &tables.collections,
            &tables.items,
        ))
    }

    async fn ledger_totals(&self) -> Result<Vec<LedgerTotals>> {
        let tables = self.tables.read();
        Ok(tables
            .collectors
            .iter()
            .map(|c| LedgerTotals {
                collector_id: c.id,
                username: c.username.clone(),
                balance: c.balance,
                total_collected_kg: c.total_collected_kg,
                transaction_sum: tables
                    .transactions
                    .iter()
                    .filter(|t| t.collector_id == c.id)
                    .map(|t| t.amount)
                    .sum(),
                collection_weight_sum: tables
                    .collections
                    .iter()
                    .filter(|col| col.collector_id == c.id)
                    .map(|col| col.weight_kg)
                    .sum(),
            })
            .collect())
    }
}
