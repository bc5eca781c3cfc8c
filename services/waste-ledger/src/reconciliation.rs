//! Ledger audit: stored balances against transaction history.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::LedgerTotals;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub collector_id: i64,
    pub username: String,
    pub stored_balance: Decimal,
    pub transaction_sum: Decimal,
    pub balance_difference: Decimal,
    pub stored_weight_kg: Decimal,
    pub collection_weight_sum: Decimal,
    pub weight_difference: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub checked_at: DateTime<Utc>,
    pub collectors_checked: usize,
    pub consistent: bool,
    pub discrepancies: Vec<Discrepancy>,
}

pub fn reconcile(totals: &[LedgerTotals], checked_at: DateTime<Utc>) -> ReconciliationReport {
    let discrepancies: Vec<Discrepancy> = totals
        .iter()
        .filter_map(|t| {
            let balance_difference = t.balance - t.transaction_sum;
            let weight_difference = t.total_collected_kg - t.collection_weight_sum;
            if balance_difference.is_zero() && weight_difference.is_zero() {
                return None;
            }
            Some(Discrepancy {
                collector_id: t.collector_id,
                username: t.username.clone(),
                stored_balance: t.balance,
                transaction_sum: t.transaction_sum,
                balance_difference,
                stored_weight_kg: t.total_collected_kg,
                collection_weight_sum: t.collection_weight_sum,
                weight_difference,
            })
        })
        .collect();

    ReconciliationReport {
        checked_at,
        collectors_checked: totals.len(),
        consistent: discrepancies.is_empty(),
        discrepancies,
    }
}
