use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::PaginationConfig;
use crate::errors::{LedgerServiceError, Result};
use crate::metrics;
use crate::models::{
    InstructionsResponse, ItemFilter, ItemMatch, Page, PageQuery, RecyclableItem, SearchQuery,
    SimilarItem,
};
use crate::store::LedgerStore;

/// Suggestions returned when an instructions lookup has no direct hit
pub const SIMILAR_ITEMS_LIMIT: i64 = 5;

/// Public, read-only view of the recyclable catalog.
pub struct CatalogService {
    store: Arc<dyn LedgerStore>,
    pagination: PaginationConfig,
}

impl CatalogService {
    pub fn new(store: Arc<dyn LedgerStore>, pagination: PaginationConfig) -> Self {
        CatalogService { store, pagination }
    }

    /// Substring search over name, category and instructions plus an exact
    /// category filter. Queries with text are logged with their match count.
    pub async fn search(&self, query: SearchQuery) -> Result<Vec<RecyclableItem>> {
        let page = Page::resolve(
            &PageQuery {
                skip: query.skip,
                limit: query.limit,
            },
            self.pagination.catalog_default_limit,
            &self.pagination,
        )?;

        let text = query
            .query
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty());
        let category = query
            .category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        if let Some(text) = &text {
            self.log_search(text).await;
        }

        let filter = ItemFilter {
            text: text.map(ItemMatch::Any),
            category,
        };
        self.store.search_items(&filter, page).await
    }

    /// The logged count covers the text match alone, before any category filter.
    async fn log_search(&self, text: &str) {
        metrics::CITIZEN_SEARCHES.inc();

        let text_only = ItemFilter {
            text: Some(ItemMatch::Any(text.to_string())),
            category: None,
        };
        let logged = match self.store.count_items(&text_only).await {
            Ok(count) => self.store.log_search(text, count).await,
            Err(err) => Err(err),
        };

        if let Err(err) = logged {
            warn!(query = %text, "Failed to log citizen search: {}", err);
        }
    }

    pub async fn get_item(&self, id: i64) -> Result<RecyclableItem> {
        self.store
            .find_item(id)
            .await?
            .ok_or(LedgerServiceError::ItemNotFound(id))
    }

    pub async fn categories(&self) -> Result<Vec<String>> {
        self.store.categories().await
    }

    /// Instructions for the first item whose name contains `name`, else up
    /// to five items matching by name or category.
    pub async fn instructions(&self, name: &str) -> Result<InstructionsResponse> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerServiceError::Validation(
                "item name must not be empty".to_string(),
            ));
        }

        let exact = ItemFilter {
            text: Some(ItemMatch::Name(name.to_string())),
            category: None,
        };
        if let Some(item) = self
            .store
            .search_items(&exact, Page::new(0, 1))
            .await?
            .into_iter()
            .next()
        {
            return Ok(InstructionsResponse::Exact {
                item_name: item.name,
                category: item.category,
                instructions: item.instructions,
                price_per_kg: item.price_per_kg,
            });
        }

        let similar = ItemFilter {
            text: Some(ItemMatch::NameOrCategory(name.to_string())),
            category: None,
        };
        let similar_items = self
            .store
            .search_items(&similar, Page::new(0, SIMILAR_ITEMS_LIMIT))
            .await?;

        if similar_items.is_empty() {
            debug!(name = %name, "No recycling information found");
            return Err(LedgerServiceError::NotFound(format!(
                "No recycling information found for '{}'",
                name
            )));
        }

        Ok(InstructionsResponse::Similar {
            message: format!("No exact match found for '{}'", name),
            similar_items: similar_items
                .into_iter()
                .map(|item| SimilarItem {
                    id: item.id,
                    name: item.name,
                    category: item.category,
                    instructions: item.instructions,
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewItem;
    use crate::store::MemoryStore;
    use rust_decimal_macros::dec;

    async fn setup() -> (CatalogService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        for (name, category, instructions) in [
            ("Aluminum Can", "Metal", "Rinse and flatten"),
            ("Steel Can", "Metal", "Rinse well"),
            ("Coke Bottle", "Plastic", "Remove cap"),
            ("Glass Bottle", "Glass", "Remove metal ring"),
        ] {
            store
                .create_item(NewItem {
                    name: name.to_string(),
                    category: category.to_string(),
                    instructions: Some(instructions.to_string()),
                    price_per_kg: dec!(1.5),
                })
                .await
                .unwrap();
        }
        let service = CatalogService::new(store.clone(), PaginationConfig::default());
        (service, store)
    }

    #[tokio::test]
    async fn test_search_matches_instructions_and_logs() {
        let (service, store) = setup().await;

        let items = service
            .search(SearchQuery {
                query: Some("metal".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        // Two by category, one by instructions
        let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Aluminum Can", "Steel Can", "Glass Bottle"]);

        let log = store.search_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].query_text, "metal");
        assert_eq!(log[0].result_count, 3);
    }

    #[tokio::test]
    async fn test_category_only_search_is_not_logged() {
        let (service, store) = setup().await;

        let items = service
            .search(SearchQuery {
                category: Some("Plastic".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert!(store.search_log().is_empty());
    }

    #[tokio::test]
    async fn test_search_pagination() {
        let (service, _) = setup().await;

        let page = service
            .search(SearchQuery {
                skip: Some(1),
                limit: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        let names: Vec<&str> = page.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Steel Can", "Coke Bottle"]);
    }

    #[tokio::test]
    async fn test_categories_sorted_and_distinct() {
        let (service, _) = setup().await;
        assert_eq!(
            service.categories().await.unwrap(),
            vec!["Glass", "Metal", "Plastic"]
        );
    }

    #[tokio::test]
    async fn test_instructions_exact_similar_and_missing() {
        let (service, _) = setup().await;

        match service.instructions("coke").await.unwrap() {
            InstructionsResponse::Exact { item_name, price_per_kg, .. } => {
                assert_eq!(item_name, "Coke Bottle");
                assert_eq!(price_per_kg, dec!(1.5));
            }
            other => panic!("expected exact match, got {:?}", other),
        }

        match service.instructions("Plastic").await.unwrap() {
            InstructionsResponse::Similar { similar_items, .. } => {
                assert_eq!(similar_items.len(), 1);
                assert_eq!(similar_items[0].name, "Coke Bottle");
            }
            other => panic!("expected suggestions, got {:?}", other),
        }

        let missing = service.instructions("styrofoam").await;
        assert!(matches!(missing, Err(LedgerServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_get_unknown_item() {
        let (service, _) = setup().await;
        assert!(matches!(
            service.get_item(42).await,
            Err(LedgerServiceError::ItemNotFound(42))
        ));
    }
}
