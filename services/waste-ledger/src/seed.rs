//! Start-up data: the default catalog and the optional bootstrap admin.

use rust_decimal::Decimal;
use tracing::info;

use crate::auth::hash_password;
use crate::errors::Result;
use crate::models::{ItemFilter, NewCollector, NewItem, Role};
use crate::store::LedgerStore;

const DEFAULT_ITEMS: &[(&str, &str, &str)] = &[
    ("Aluminum Can", "Metal", "Rinse and flatten (optional). Remove any labels."),
    ("Steel Can", "Metal", "Rinse well. Cut sharp edges if opened."),
    ("Copper Wire", "Metal", "Strip insulation if possible. Group together."),
    ("Coke Bottle", "Plastic", "Rinse and remove cap. Crush if possible."),
    (
        "Plastic Bag",
        "Plastic",
        "Empty contents. Do NOT put in recycling bin (tangles machinery).",
    ),
    ("Glass Bottle", "Glass", "Rinse. Remove metal ring from cap."),
    ("Cardboard Box", "Paper", "Flatten. Remove tape and Styrofoam."),
];

/// The seven default catalog entries. Prices start at zero until an admin sets them.
pub fn default_items() -> Vec<NewItem> {
    DEFAULT_ITEMS
        .iter()
        .map(|(name, category, instructions)| NewItem {
            name: name.to_string(),
            category: category.to_string(),
            instructions: Some(instructions.to_string()),
            price_per_kg: Decimal::ZERO,
        })
        .collect()
}

/// Seed an empty catalog. Returns the number of items inserted.
pub async fn seed_catalog(store: &dyn LedgerStore) -> Result<usize> {
    if store.count_items(&ItemFilter::default()).await? > 0 {
        return Ok(0);
    }

    let items = default_items();
    let count = items.len();
    for item in items {
        store.create_item(item).await?;
    }

    info!("Recyclable items catalog seeded with {} items", count);
    Ok(count)
}

/// Create the admin identity unless the username already exists.
/// Returns true when an identity was created.
pub async fn ensure_admin(store: &dyn LedgerStore, username: &str, password: &str) -> Result<bool> {
    if store.find_collector_by_username(username).await?.is_some() {
        return Ok(false);
    }

    store
        .create_collector(NewCollector {
            username: username.to_string(),
            full_name: "Administrator".to_string(),
            phone_number: String::new(),
            hashed_password: hash_password(password)?,
            role: Role::Admin,
        })
        .await?;

    info!(username = %username, "Bootstrap admin created");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_seed_only_fills_empty_catalog() {
        let store = MemoryStore::new();

        assert_eq!(seed_catalog(&store).await.unwrap(), 7);
        assert_eq!(seed_catalog(&store).await.unwrap(), 0);
        assert_eq!(
            store.categories().await.unwrap(),
            vec!["Glass", "Metal", "Paper", "Plastic"]
        );
    }

    #[tokio::test]
    async fn test_ensure_admin_is_idempotent() {
        let store = MemoryStore::new();

        assert!(ensure_admin(&store, "root", "bootstrap-password").await.unwrap());
        assert!(!ensure_admin(&store, "root", "other-password").await.unwrap());

        let admin = store.find_collector_by_username("root").await.unwrap().unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert!(crate::auth::verify_password("bootstrap-password", &admin.hashed_password));
    }
}
