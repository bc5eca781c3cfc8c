use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;
use std::fmt;
use validator::{Validate, ValidationError};

use crate::config::PaginationConfig;
use crate::errors::{LedgerServiceError, Result};

/// Role tag carried by every identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Collector,
    Citizen,
    Admin,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Collector => "collector",
            Role::Citizen => "citizen",
            Role::Admin => "admin",
        }
    }

    /// Admins pass every role requirement; everyone else needs an exact match.
    pub fn satisfies(&self, required: Role) -> bool {
        *self == Role::Admin || *self == required
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Role {
    type Error = UnknownRole;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        match value.as_str() {
            "collector" => Ok(Role::Collector),
            "citizen" => Ok(Role::Citizen),
            "admin" => Ok(Role::Admin),
            _ => Err(UnknownRole(value)),
        }
    }
}

/// Ledger entry direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Credit earned by recording a collection
    Collection,
    /// Debit paid out to the collector
    Withdrawal,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown transaction type: {0}")]
pub struct UnknownTransactionType(pub String);

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Collection => "collection",
            TransactionType::Withdrawal => "withdrawal",
        }
    }
}

impl TryFrom<String> for TransactionType {
    type Error = UnknownTransactionType;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        match value.as_str() {
            "collection" => Ok(TransactionType::Collection),
            "withdrawal" => Ok(TransactionType::Withdrawal),
            _ => Err(UnknownTransactionType(value)),
        }
    }
}

/// Registered identity (collector, citizen or admin)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Collector {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub phone_number: String,
    #[serde(skip_serializing, default)]
    pub hashed_password: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub profile_image: Option<String>,
    pub balance: Decimal,
    pub total_collected_kg: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Recyclable item from the catalog
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RecyclableItem {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub instructions: Option<String>,
    pub price_per_kg: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Immutable record of a single pickup
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Collection {
    pub id: i64,
    pub collector_id: i64,
    pub item_id: i64,
    pub weight_kg: Decimal,
    pub earned_amount: Decimal,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub collected_at: DateTime<Utc>,
}

/// Collection joined with the item name/category at read time
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CollectionView {
    pub id: i64,
    pub collector_id: i64,
    pub item_id: i64,
    pub weight_kg: Decimal,
    pub earned_amount: Decimal,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub collected_at: DateTime<Utc>,
    pub item_name: Option<String>,
    pub item_category: Option<String>,
}

impl CollectionView {
    pub fn from_parts(collection: &Collection, item: Option<&RecyclableItem>) -> Self {
        CollectionView {
            id: collection.id,
            collector_id: collection.collector_id,
            item_id: collection.item_id,
            weight_kg: collection.weight_kg,
            earned_amount: collection.earned_amount,
            location: collection.location.clone(),
            notes: collection.notes.clone(),
            collected_at: collection.collected_at,
            item_name: item.map(|i| i.name.clone()),
            item_category: item.map(|i| i.category.clone()),
        }
    }
}

/// Immutable ledger entry
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Transaction {
    pub id: i64,
    pub collector_id: i64,
    #[sqlx(try_from = "String")]
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Logged citizen search
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CitizenQuery {
    pub id: i64,
    pub query_text: String,
    pub result_count: i64,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Store inputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct NewCollector {
    pub username: String,
    pub full_name: String,
    pub phone_number: String,
    pub hashed_password: String,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct NewItem {
    pub name: String,
    pub category: String,
    pub instructions: Option<String>,
    pub price_per_kg: Decimal,
}

#[derive(Debug, Clone)]
pub struct CollectionDraft {
    pub item_id: i64,
    pub weight_kg: Decimal,
    pub location: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WithdrawalDraft {
    pub amount: Decimal,
    pub description: Option<String>,
}

/// Partial update of a catalog item; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct ItemPatch {
    #[validate(length(min = 1, max = 100), custom = "validate_not_blank")]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 50), custom = "validate_not_blank")]
    pub category: Option<String>,
    pub instructions: Option<String>,
    pub price_per_kg: Option<Decimal>,
}

impl ItemPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.category.is_none()
            && self.instructions.is_none()
            && self.price_per_kg.is_none()
    }

    pub fn apply(&self, item: &mut RecyclableItem) {
        if let Some(name) = &self.name {
            item.name = name.clone();
        }
        if let Some(category) = &self.category {
            item.category = category.clone();
        }
        if let Some(instructions) = &self.instructions {
            item.instructions = Some(instructions.clone());
        }
        if let Some(price) = self.price_per_kg {
            item.price_per_kg = price;
        }
    }
}

/// Admin-side identity patch. Balance and weight are ledger-owned and absent here.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct CollectorPatch {
    #[validate(length(min = 1, max = 100), custom = "validate_not_blank")]
    pub full_name: Option<String>,
    #[validate(length(min = 1, max = 30), custom = "validate_not_blank")]
    pub phone_number: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

impl CollectorPatch {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.phone_number.is_none()
            && self.role.is_none()
            && self.is_active.is_none()
    }

    pub fn apply(&self, collector: &mut Collector) {
        if let Some(full_name) = &self.full_name {
            collector.full_name = full_name.clone();
        }
        if let Some(phone_number) = &self.phone_number {
            collector.phone_number = phone_number.clone();
        }
        if let Some(role) = self.role {
            collector.role = role;
        }
        if let Some(is_active) = self.is_active {
            collector.is_active = is_active;
        }
    }
}

/// Which text fields a catalog search looks at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemMatch {
    /// Name, category or instructions contain the text
    Any(String),
    /// Name or category contain the text
    NameOrCategory(String),
    /// Name contains the text
    Name(String),
}

#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub text: Option<ItemMatch>,
    /// Exact category
    pub category: Option<String>,
}

impl ItemFilter {
    pub fn matches(&self, item: &RecyclableItem) -> bool {
        let text_ok = match &self.text {
            None => true,
            Some(ItemMatch::Any(needle)) => {
                contains_ci(&item.name, needle)
                    || contains_ci(&item.category, needle)
                    || item
                        .instructions
                        .as_deref()
                        .map(|i| contains_ci(i, needle))
                        .unwrap_or(false)
            }
            Some(ItemMatch::NameOrCategory(needle)) => {
                contains_ci(&item.name, needle) || contains_ci(&item.category, needle)
            }
            Some(ItemMatch::Name(needle)) => contains_ci(&item.name, needle),
        };

        let category_ok = self
            .category
            .as_deref()
            .map(|c| item.category == c)
            .unwrap_or(true);

        text_ok && category_ok
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub skip: i64,
    pub limit: i64,
}

impl Page {
    pub fn new(skip: i64, limit: i64) -> Self {
        Page { skip, limit }
    }

    /// Resolve a raw query against the configured defaults, clamping oversized limits.
    pub fn resolve(query: &PageQuery, default_limit: i64, config: &PaginationConfig) -> Result<Self> {
        let skip = query.skip.unwrap_or(0);
        if skip < 0 {
            return Err(LedgerServiceError::Validation(
                "skip must not be negative".to_string(),
            ));
        }

        let limit = query.limit.unwrap_or(default_limit);
        if limit <= 0 {
            return Err(LedgerServiceError::Validation(
                "limit must be positive".to_string(),
            ));
        }

        Ok(Page {
            skip,
            limit: limit.min(config.max_limit),
        })
    }

    /// Slice an already-ordered sequence.
    pub fn slice<T: Clone>(&self, ordered: &[T]) -> Vec<T> {
        ordered
            .iter()
            .skip(self.skip as usize)
            .take(self.limit as usize)
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// API requests
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 50), custom = "validate_username")]
    pub username: String,
    #[validate(length(min = 1, max = 100), custom = "validate_not_blank")]
    pub full_name: String,
    #[validate(length(min = 1, max = 30), custom = "validate_not_blank")]
    pub phone_number: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct CollectionRequest {
    pub item_id: i64,
    pub weight_kg: Decimal,
    #[validate(length(max = 255))]
    pub location: Option<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct WithdrawalRequest {
    pub amount: Decimal,
    #[validate(length(max = 500))]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct CreateItemRequest {
    #[validate(length(min = 1, max = 100), custom = "validate_not_blank")]
    pub name: String,
    #[validate(length(min = 1, max = 50), custom = "validate_not_blank")]
    pub category: String,
    pub instructions: Option<String>,
    #[serde(default)]
    pub price_per_kg: Decimal,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub query: Option<String>,
    pub category: Option<String>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<i64>,
}

fn validate_not_blank(value: &str) -> std::result::Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

fn validate_username(username: &str) -> std::result::Result<(), ValidationError> {
    if username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        Ok(())
    } else {
        Err(ValidationError::new("username_charset"))
    }
}

// ---------------------------------------------------------------------------
// API responses
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct CollectorSummary {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub role: Role,
    pub balance: Decimal,
}

impl From<&Collector> for CollectorSummary {
    fn from(collector: &Collector) -> Self {
        CollectorSummary {
            id: collector.id,
            username: collector.username.clone(),
            full_name: collector.full_name.clone(),
            role: collector.role,
            balance: collector.balance,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub collector: CollectorSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryBreakdown {
    pub count: i64,
    pub weight_kg: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorStats {
    pub total_collections: i64,
    pub total_weight_kg: Decimal,
    pub total_earned: Decimal,
    pub balance: Decimal,
    pub collections_by_category: BTreeMap<String, CategoryBreakdown>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TopItem {
    pub name: String,
    pub category: String,
    pub collection_count: i64,
    pub total_weight_kg: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_collectors: i64,
    pub active_collectors: i64,
    pub total_collections: i64,
    pub total_weight_kg: Decimal,
    pub total_revenue: Decimal,
    pub collections_today: i64,
    pub top_items: Vec<TopItem>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InstructionsResponse {
    Exact {
        item_name: String,
        category: String,
        instructions: Option<String>,
        price_per_kg: Decimal,
    },
    Similar {
        message: String,
        similar_items: Vec<SimilarItem>,
    },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SimilarItem {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub instructions: Option<String>,
}

/// Per-identity ledger totals used by the reconciliation audit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct LedgerTotals {
    pub collector_id: i64,
    pub username: String,
    pub balance: Decimal,
    pub total_collected_kg: Decimal,
    pub transaction_sum: Decimal,
    pub collection_weight_sum: Decimal,
}
