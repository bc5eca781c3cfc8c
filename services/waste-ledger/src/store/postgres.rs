use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::errors::{LedgerServiceError, Result};
use crate::ledger::{self, AccountState};
use crate::models::{
    CategoryBreakdown, Collection, CollectionDraft, CollectionView, Collector, CollectorPatch,
    CollectorStats, DashboardStats, ItemFilter, ItemMatch, ItemPatch, LedgerTotals, NewCollector,
    NewItem, Page, RecyclableItem, TopItem, Transaction, WithdrawalDraft,
};
use crate::reporting::TOP_ITEMS_LIMIT;
use crate::store::LedgerStore;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await?;

        info!("Database connection pool created successfully");

        Ok(PgStore { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        PgStore { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Apply pending migrations from `migrations/`.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| LedgerServiceError::Migration(e.to_string()))?;

        info!("Database schema is up to date");
        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

/// Escape LIKE wildcards and wrap in `%...%`.
fn like_pattern(text: &str) -> String {
    let escaped = text
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn push_item_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &ItemFilter) {
    builder.push(" WHERE TRUE");

    match &filter.text {
        Some(ItemMatch::Any(text)) => {
            let pattern = like_pattern(text);
            builder
                .push(" AND (name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR category ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR instructions ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        Some(ItemMatch::NameOrCategory(text)) => {
            let pattern = like_pattern(text);
            builder
                .push(" AND (name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR category ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        Some(ItemMatch::Name(text)) => {
            builder.push(" AND name ILIKE ").push_bind(like_pattern(text));
        }
        None => {}
    }

    if let Some(category) = &filter.category {
        builder.push(" AND category = ").push_bind(category.clone());
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn create_collector(&self, new: NewCollector) -> Result<Collector> {
        sqlx::query_as::<_, Collector>(
            r#"
            INSERT INTO collectors (username, full_name, phone_number, hashed_password, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&new.username)
        .bind(&new.full_name)
        .bind(&new.phone_number)
        .bind(&new.hashed_password)
        .bind(new.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                LedgerServiceError::DuplicateUsername(new.username.clone())
            } else {
                e.into()
            }
        })
    }

    async fn find_collector(&self, id: i64) -> Result<Option<Collector>> {
        let collector = sqlx::query_as::<_, Collector>("SELECT * FROM collectors WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(collector)
    }

    async fn find_collector_by_username(&self, username: &str) -> Result<Option<Collector>> {
        let collector =
            sqlx::query_as::<_, Collector>("SELECT * FROM collectors WHERE username = $1")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;

        Ok(collector)
    }

    async fn list_collectors(&self, page: Page) -> Result<Vec<Collector>> {
        let collectors = sqlx::query_as::<_, Collector>(
            "SELECT * FROM collectors ORDER BY id LIMIT $1 OFFSET $2",
        )
        .bind(page.limit)
        .bind(page.skip)
        .fetch_all(&self.pool)
        .await?;

        Ok(collectors)
    }

    async fn update_collector(&self, id: i64, patch: &CollectorPatch) -> Result<Collector> {
        sqlx::query_as::<_, Collector>(
            r#"
            UPDATE collectors
            SET full_name = COALESCE($2, full_name),
                phone_number = COALESCE($3, phone_number),
                role = COALESCE($4, role),
                is_active = COALESCE($5, is_active)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(patch.full_name.as_deref())
        .bind(patch.phone_number.as_deref())
        .bind(patch.role.map(|r| r.as_str()))
        .bind(patch.is_active)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(LedgerServiceError::CollectorNotFound(id))
    }

    async fn create_item(&self, new: NewItem) -> Result<RecyclableItem> {
        sqlx::query_as::<_, RecyclableItem>(
            r#"
            INSERT INTO recyclable_items (name, category, instructions, price_per_kg)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&new.name)
        .bind(&new.category)
        .bind(&new.instructions)
        .bind(new.price_per_kg)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                LedgerServiceError::DuplicateItem(new.name.clone())
            } else {
                e.into()
            }
        })
    }

    async fn find_item(&self, id: i64) -> Result<Option<RecyclableItem>> {
        let item =
            sqlx::query_as::<_, RecyclableItem>("SELECT * FROM recyclable_items WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(item)
    }

    async fn search_items(&self, filter: &ItemFilter, page: Page) -> Result<Vec<RecyclableItem>> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT * FROM recyclable_items");
        push_item_filter(&mut builder, filter);
        builder
            .push(" ORDER BY id LIMIT ")
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.skip);

        let items = builder
            .build_query_as::<RecyclableItem>()
            .fetch_all(&self.pool)
            .await?;

        Ok(items)
    }

    async fn count_items(&self, filter: &ItemFilter) -> Result<i64> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM recyclable_items");
        push_item_filter(&mut builder, filter);

        let count = builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn categories(&self) -> Result<Vec<String>> {
        let categories = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT category FROM recyclable_items ORDER BY category",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(categories)
    }

    async fn update_item(&self, id: i64, patch: &ItemPatch) -> Result<RecyclableItem> {
        sqlx::query_as::<_, RecyclableItem>(
            r#"
            UPDATE recyclable_items
            SET name = COALESCE($2, name),
                category = COALESCE($3, category),
                instructions = COALESCE($4, instructions),
                price_per_kg = COALESCE($5, price_per_kg)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(patch.name.as_deref())
        .bind(patch.category.as_deref())
        .bind(patch.instructions.as_deref())
        .bind(patch.price_per_kg)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| match &patch.name {
            Some(name) if is_unique_violation(&e) => LedgerServiceError::DuplicateItem(name.clone()),
            _ => e.into(),
        })?
        .ok_or(LedgerServiceError::ItemNotFound(id))
    }

    async fn delete_item(&self, id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Conflicts with the FOR SHARE taken by record_collection
        let exists = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM recyclable_items WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        if exists.is_none() {
            return Err(LedgerServiceError::ItemNotFound(id));
        }

        let referenced = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM collections WHERE item_id = $1)",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if referenced {
            return Err(LedgerServiceError::ItemInUse(id));
        }

        sqlx::query("DELETE FROM recyclable_items WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    LedgerServiceError::ItemInUse(id)
                } else {
                    e.into()
                }
            })?;

        tx.commit().await?;
        Ok(())
    }

    async fn log_search(&self, query_text: &str, result_count: i64) -> Result<()> {
        sqlx::query("INSERT INTO citizen_queries (query_text, result_count) VALUES ($1, $2)")
            .bind(query_text)
            .bind(result_count)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn record_collection(
        &self,
        collector_id: i64,
        draft: &CollectionDraft,
    ) -> Result<CollectionView> {
        let mut tx = self.pool.begin().await?;

        // Lock order: item (shared), then collector (exclusive)
        let item = sqlx::query_as::<_, RecyclableItem>(
            "SELECT * FROM recyclable_items WHERE id = $1 FOR SHARE",
        )
        .bind(draft.item_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(LedgerServiceError::ItemNotFound(draft.item_id))?;

        let collector = sqlx::query_as::<_, Collector>(
            "SELECT * FROM collectors WHERE id = $1 FOR UPDATE",
        )
        .bind(collector_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(LedgerServiceError::CollectorNotFound(collector_id))?;

        let posting = ledger::post_collection(&AccountState::from(&collector), &item, draft.weight_kg)?;

        let collection = sqlx::query_as::<_, Collection>(
            r#"
            INSERT INTO collections (collector_id, item_id, weight_kg, earned_amount, location, notes)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(collector_id)
        .bind(item.id)
        .bind(draft.weight_kg)
        .bind(posting.amount)
        .bind(&draft.location)
        .bind(&draft.notes)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO transactions (collector_id, transaction_type, amount, description, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(collector_id)
        .bind(posting.transaction_type.as_str())
        .bind(posting.amount)
        .bind(&posting.description)
        .bind(collection.collected_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE collectors SET balance = $2, total_collected_kg = $3 WHERE id = $1",
        )
        .bind(collector_id)
        .bind(posting.balance_after)
        .bind(posting.total_collected_kg_after)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(CollectionView::from_parts(&collection, Some(&item)))
    }

    async fn withdraw(&self, collector_id: i64, draft: &WithdrawalDraft) -> Result<Transaction> {
        let mut tx = self.pool.begin().await?;

        let collector = sqlx::query_as::<_, Collector>(
            "SELECT * FROM collectors WHERE id = $1 FOR UPDATE",
        )
        .bind(collector_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(LedgerServiceError::CollectorNotFound(collector_id))?;

        let posting = ledger::post_withdrawal(
            &AccountState::from(&collector),
            draft.amount,
            draft.description.as_deref(),
        )?;

        let transaction = sqlx::query_as::<_, Transaction>(
            r#"
            INSERT INTO transactions (collector_id, transaction_type, amount, description)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(collector_id)
        .bind(posting.transaction_type.as_str())
        .bind(posting.amount)
        .bind(&posting.description)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE collectors SET balance = $2 WHERE id = $1")
            .bind(collector_id)
            .bind(posting.balance_after)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(transaction)
    }

    async fn list_collections(
        &self,
        collector_id: Option<i64>,
        page: Page,
    ) -> Result<Vec<CollectionView>> {
        let collections = sqlx::query_as::<_, CollectionView>(
            r#"
            SELECT c.id, c.collector_id, c.item_id, c.weight_kg, c.earned_amount,
                   c.location, c.notes, c.collected_at,
                   i.name AS item_name, i.category AS item_category
            FROM collections c
            LEFT JOIN recyclable_items i ON i.id = c.item_id
            WHERE ($1::BIGINT IS NULL OR c.collector_id = $1)
            ORDER BY c.collected_at DESC, c.id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(collector_id)
        .bind(page.limit)
        .bind(page.skip)
        .fetch_all(&self.pool)
        .await?;

        Ok(collections)
    }

    async fn list_transactions(&self, collector_id: i64, page: Page) -> Result<Vec<Transaction>> {
        let transactions = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT * FROM transactions
            WHERE collector_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(collector_id)
        .bind(page.limit)
        .bind(page.skip)
        .fetch_all(&self.pool)
        .await?;

        Ok(transactions)
    }

    async fn dashboard(&self, today: NaiveDate) -> Result<DashboardStats> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let (total_collectors, active_collectors) = sqlx::query_as::<_, (i64, i64)>(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE is_active) FROM collectors",
        )
        .fetch_one(&mut *tx)
        .await?;

        let (total_collections, total_weight_kg, total_revenue, collections_today) =
            sqlx::query_as::<_, (i64, Decimal, Decimal, i64)>(
                r#"
                SELECT COUNT(*),
                       COALESCE(SUM(weight_kg), 0),
                       COALESCE(SUM(earned_amount), 0),
                       COUNT(*) FILTER (WHERE (collected_at AT TIME ZONE 'UTC')::DATE = $1)
                FROM collections
                "#,
            )
            .bind(today)
            .fetch_one(&mut *tx)
            .await?;

        let top_items = sqlx::query_as::<_, TopItem>(
            r#"
            SELECT i.name, i.category,
                   COUNT(c.id) AS collection_count,
                   COALESCE(SUM(c.weight_kg), 0) AS total_weight_kg
            FROM recyclable_items i
            JOIN collections c ON c.item_id = i.id
            GROUP BY i.id
            ORDER BY COUNT(c.id) DESC, i.id ASC
            LIMIT $1
            "#,
        )
        .bind(TOP_ITEMS_LIMIT as i64)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(DashboardStats {
            total_collectors,
            active_collectors,
            total_collections,
            total_weight_kg,
            total_revenue,
            collections_today,
            top_items,
        })
    }

    async fn collector_stats(&self, collector: &Collector) -> Result<CollectorStats> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let balance = sqlx::query_scalar::<_, Decimal>("SELECT balance FROM collectors WHERE id = $1")
            .bind(collector.id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(LedgerServiceError::CollectorNotFound(collector.id))?;

        let (total_collections, total_weight_kg, total_earned) =
            sqlx::query_as::<_, (i64, Decimal, Decimal)>(
                r#"
                SELECT COUNT(*), COALESCE(SUM(weight_kg), 0), COALESCE(SUM(earned_amount), 0)
                FROM collections
                WHERE collector_id = $1
                "#,
            )
            .bind(collector.id)
            .fetch_one(&mut *tx)
            .await?;

        let rows = sqlx::query_as::<_, (String, i64, Decimal)>(
            r#"
            SELECT i.category, COUNT(c.id), COALESCE(SUM(c.weight_kg), 0)
            FROM collections c
            JOIN recyclable_items i ON i.id = c.item_id
            WHERE c.collector_id = $1
            GROUP BY i.category
            "#,
        )
        .bind(collector.id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let collections_by_category: BTreeMap<String, CategoryBreakdown> = rows
            .into_iter()
            .map(|(category, count, weight_kg)| (category, CategoryBreakdown { count, weight_kg }))
            .collect();

        Ok(CollectorStats {
            total_collections,
            total_weight_kg,
            total_earned,
            balance,
            collections_by_category,
        })
    }

    async fn ledger_totals(&self) -> Result<Vec<LedgerTotals>> {
        let totals = sqlx::query_as::<_, LedgerTotals>(
            r#"
            SELECT c.id AS collector_id, c.username, c.balance, c.total_collected_kg,
                   COALESCE((SELECT SUM(t.amount) FROM transactions t
                             WHERE t.collector_id = c.id), 0) AS transaction_sum,
                   COALESCE((SELECT SUM(col.weight_kg) FROM collections col
                             WHERE col.collector_id = c.id), 0) AS collection_weight_sum
            FROM collectors c
            ORDER BY c.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(totals)
    }
}
