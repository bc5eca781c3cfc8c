//! Read-side aggregation over committed ledger data.
//!
//! The Postgres store computes the same shapes in SQL; these functions back
//! the in-memory store and pin down the semantics.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

use crate::models::{
    CategoryBreakdown, Collection, Collector, CollectorStats, DashboardStats, RecyclableItem,
    TopItem,
};

pub const TOP_ITEMS_LIMIT: usize = 5;

pub fn dashboard(
    collectors: &[Collector],
    collections: &[Collection],
    items: &HashMap<i64, RecyclableItem>,
    today: NaiveDate,
) -> DashboardStats {
    let total_weight_kg = collections.iter().map(|c| c.weight_kg).sum();
    let total_revenue = collections.iter().map(|c| c.earned_amount).sum();
    let collections_today = collections
        .iter()
        .filter(|c| c.collected_at.date_naive() == today)
        .count() as i64;

    DashboardStats {
        total_collectors: collectors.len() as i64,
        active_collectors: collectors.iter().filter(|c| c.is_active).count() as i64,
        total_collections: collections.len() as i64,
        total_weight_kg,
        total_revenue,
        collections_today,
        top_items: top_items(collections, items),
    }
}

/// Most collected items by count; ties go to the lower item id.
pub fn top_items(collections: &[Collection], items: &HashMap<i64, RecyclableItem>) -> Vec<TopItem> {
    let mut per_item: BTreeMap<i64, (i64, Decimal)> = BTreeMap::new();
    for collection in collections {
        let entry = per_item.entry(collection.item_id).or_insert((0, Decimal::ZERO));
        entry.0 += 1;
        entry.1 += collection.weight_kg;
    }

    let mut ranked: Vec<(i64, i64, Decimal)> = per_item
        .into_iter()
        .map(|(item_id, (count, weight))| (item_id, count, weight))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    ranked
        .into_iter()
        .filter_map(|(item_id, count, weight)| {
            items.get(&item_id).map(|item| TopItem {
                name: item.name.clone(),
                category: item.category.clone(),
                collection_count: count,
                total_weight_kg: weight,
            })
        })
        .take(TOP_ITEMS_LIMIT)
        .collect()
}

pub fn collector_stats(
    collector: &Collector,
    collections: &[Collection],
    items: &HashMap<i64, RecyclableItem>,
) -> CollectorStats {
    let own: Vec<&Collection> = collections
        .iter()
        .filter(|c| c.collector_id == collector.id)
        .collect();

    let mut by_category: BTreeMap<String, CategoryBreakdown> = BTreeMap::new();
    for collection in &own {
        if let Some(item) = items.get(&collection.item_id) {
            let entry = by_category
                .entry(item.category.clone())
                .or_insert(CategoryBreakdown {
                    count: 0,
                    weight_kg: Decimal::ZERO,
                });
            entry.count += 1;
            entry.weight_kg += collection.weight_kg;
        }
    }

    CollectorStats {
        total_collections: own.len() as i64,
        total_weight_kg: own.iter().map(|c| c.weight_kg).sum(),
        total_earned: own.iter().map(|c| c.earned_amount).sum(),
        balance: collector.balance,
        collections_by_category: by_category,
    }
}
