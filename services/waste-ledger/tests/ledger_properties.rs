//! Property-based tests for ledger invariants
//!
//! - Balance conservation: stored balance == Σ transaction amounts
//! - Weight conservation: stored weight == Σ collection weights
//! - No overdraft, including under concurrent withdrawals
//! - Pagination: contiguous pages of collections and transactions neither
//!   duplicate nor skip records

use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use waste_ledger::models::{
    CollectionDraft, Collector, NewCollector, NewItem, Page, Role, WithdrawalDraft,
};
use waste_ledger::reconciliation::reconcile;
use waste_ledger::{LedgerServiceError, LedgerStore, MemoryStore};

#[derive(Debug, Clone)]
enum Op {
    Collect { item: usize, weight: Decimal },
    Withdraw { amount: Decimal },
}

/// Weights between 0.001 and 100 kg
fn weight_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..100_000i64).prop_map(|grams| Decimal::new(grams, 3))
}

/// Amounts between 0.01 and 500
fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..50_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..3, weight_strategy()).prop_map(|(item, weight)| Op::Collect { item, weight }),
        amount_strategy().prop_map(|amount| Op::Withdraw { amount }),
    ]
}

async fn seeded_store() -> (MemoryStore, Collector, Vec<i64>) {
    let store = MemoryStore::new();
    let collector = store
        .create_collector(NewCollector {
            username: "ali".to_string(),
            full_name: "Ali".to_string(),
            phone_number: "0".to_string(),
            hashed_password: "x".to_string(),
            role: Role::Collector,
        })
        .await
        .unwrap();

    let mut item_ids = Vec::new();
    for (name, price) in [("Aluminum Can", dec!(3.5)), ("Coke Bottle", dec!(0.75)), ("Copper Wire", dec!(12.125))] {
        let item = store
            .create_item(NewItem {
                name: name.to_string(),
                category: "Mixed".to_string(),
                instructions: None,
                price_per_kg: price,
            })
            .await
            .unwrap();
        item_ids.push(item.id);
    }

    (store, collector, item_ids)
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(future)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_balance_matches_transaction_history(ops in prop::collection::vec(op_strategy(), 1..40)) {
        block_on(async {
            let (store, collector, items) = seeded_store().await;
            let mut expected_balance = Decimal::ZERO;

            for op in ops {
                match op {
                    Op::Collect { item, weight } => {
                        let view = store
                            .record_collection(
                                collector.id,
                                &CollectionDraft { item_id: items[item], weight_kg: weight, location: None, notes: None },
                            )
                            .await
                            .unwrap();
                        expected_balance += view.earned_amount;
                    }
                    Op::Withdraw { amount } => {
                        let result = store
                            .withdraw(collector.id, &WithdrawalDraft { amount, description: None })
                            .await;
                        if amount > expected_balance {
                            prop_assert!(matches!(result, Err(LedgerServiceError::InsufficientBalance { .. })), "expected InsufficientBalance, got {:?}", result);
                        } else {
                            prop_assert!(result.is_ok());
                            expected_balance -= amount;
                        }
                    }
                }
            }

            let current = store.find_collector(collector.id).await.unwrap().unwrap();
            prop_assert_eq!(current.balance, expected_balance);
            prop_assert!(current.balance >= Decimal::ZERO);

            let report = reconcile(&store.ledger_totals().await.unwrap(), chrono::Utc::now());
            prop_assert!(report.consistent, "discrepancies: {:?}", report.discrepancies);
            Ok(())
        })?;
    }

    #[test]
    fn prop_pages_neither_duplicate_nor_skip(count in 1usize..40, page_size in 1i64..10) {
        block_on(async {
            let (store, collector, items) = seeded_store().await;
            for i in 0..count {
                store
                    .record_collection(
                        collector.id,
                        &CollectionDraft { item_id: items[i % items.len()], weight_kg: dec!(1), location: None, notes: None },
                    )
                    .await
                    .unwrap();
            }

            let full = store
                .list_collections(Some(collector.id), Page::new(0, count as i64))
                .await
                .unwrap();

            let mut paged = Vec::new();
            let mut skip = 0;
            loop {
                let page = store
                    .list_collections(Some(collector.id), Page::new(skip, page_size))
                    .await
                    .unwrap();
                if page.is_empty() {
                    break;
                }
                skip += page.len() as i64;
                paged.extend(page);
            }

            let full_ids: Vec<i64> = full.iter().map(|c| c.id).collect();
            let paged_ids: Vec<i64> = paged.iter().map(|c| c.id).collect();
            prop_assert_eq!(&paged_ids, &full_ids);
            prop_assert_eq!(full_ids.len(), count);
            // Newest first
            prop_assert!(full
                .windows(2)
                .all(|w| (w[0].collected_at, w[0].id) > (w[1].collected_at, w[1].id)));
            Ok(())
        })?;
    }

    #[test]
    fn prop_transaction_pages_neither_duplicate_nor_skip(
        ops in prop::collection::vec(op_strategy(), 1..40),
        page_size in 1i64..10,
    ) {
        block_on(async {
            let (store, collector, items) = seeded_store().await;
            let mut posted = 0usize;

            for op in ops {
                let result = match op {
                    Op::Collect { item, weight } => store
                        .record_collection(
                            collector.id,
                            &CollectionDraft { item_id: items[item], weight_kg: weight, location: None, notes: None },
                        )
                        .await
                        .map(|_| ()),
                    Op::Withdraw { amount } => store
                        .withdraw(collector.id, &WithdrawalDraft { amount, description: None })
                        .await
                        .map(|_| ()),
                };
                if result.is_ok() {
                    posted += 1;
                }
            }

            let full = store
                .list_transactions(collector.id, Page::new(0, 1_000))
                .await
                .unwrap();

            let mut paged = Vec::new();
            let mut skip = 0;
            loop {
                let page = store
                    .list_transactions(collector.id, Page::new(skip, page_size))
                    .await
                    .unwrap();
                if page.is_empty() {
                    break;
                }
                skip += page.len() as i64;
                paged.extend(page);
            }

            let full_ids: Vec<i64> = full.iter().map(|t| t.id).collect();
            let paged_ids: Vec<i64> = paged.iter().map(|t| t.id).collect();
            prop_assert_eq!(&paged_ids, &full_ids);
            prop_assert_eq!(full_ids.len(), posted);
            // Newest first
            prop_assert!(full
                .windows(2)
                .all(|w| (w[0].created_at, w[0].id) > (w[1].created_at, w[1].id)));
            Ok(())
        })?;
    }
}

#[tokio::test]
async fn test_exact_decimal_earnings() {
    let (store, collector, items) = seeded_store().await;

    let view = store
        .record_collection(
            collector.id,
            &CollectionDraft { item_id: items[0], weight_kg: dec!(2.0), location: None, notes: None },
        )
        .await
        .unwrap();
    assert_eq!(view.earned_amount, dec!(7.0));

    let current = store.find_collector(collector.id).await.unwrap().unwrap();
    assert_eq!(current.balance, dec!(7.0));
    assert_eq!(current.total_collected_kg, dec!(2.0));
}

#[tokio::test]
async fn test_overdraft_leaves_state_untouched() {
    let (store, collector, items) = seeded_store().await;
    store
        .record_collection(
            collector.id,
            &CollectionDraft { item_id: items[0], weight_kg: dec!(2), location: None, notes: None },
        )
        .await
        .unwrap();

    let err = store
        .withdraw(collector.id, &WithdrawalDraft { amount: dec!(7.01), description: None })
        .await
        .unwrap_err();
    match err {
        LedgerServiceError::InsufficientBalance { requested, available } => {
            assert_eq!(requested, dec!(7.01));
            assert_eq!(available, dec!(7.0));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let current = store.find_collector(collector.id).await.unwrap().unwrap();
    assert_eq!(current.balance, dec!(7.0));
    let history = store.list_transactions(collector.id, Page::new(0, 50)).await.unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_withdrawals_never_overdraw() {
    let (store, collector, items) = seeded_store().await;
    let store = Arc::new(store);
    // Balance of exactly 7.0
    store
        .record_collection(
            collector.id,
            &CollectionDraft { item_id: items[0], weight_kg: dec!(2), location: None, notes: None },
        )
        .await
        .unwrap();

    let mut handles = Vec::new();
    for amount in [dec!(7.0), dec!(3.0)] {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .withdraw(collector.id, &WithdrawalDraft { amount, description: None })
                .await
        }));
    }

    let mut successes = 0;
    let mut refusals = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(LedgerServiceError::InsufficientBalance { .. }) => refusals += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(successes, 1);
    assert_eq!(refusals, 1);

    let current = store.find_collector(collector.id).await.unwrap().unwrap();
    assert!(current.balance >= Decimal::ZERO);
    let report = reconcile(&store.ledger_totals().await.unwrap(), chrono::Utc::now());
    assert!(report.consistent);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_concurrent_withdrawals_stop_at_zero() {
    let (store, collector, items) = seeded_store().await;
    let store = Arc::new(store);
    // 10 kg * 3.5 = 35.0
    store
        .record_collection(
            collector.id,
            &CollectionDraft { item_id: items[0], weight_kg: dec!(10), location: None, notes: None },
        )
        .await
        .unwrap();

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .withdraw(collector.id, &WithdrawalDraft { amount: dec!(5), description: None })
                    .await
                    .is_ok()
            })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap() {
            successes += 1;
        }
    }

    assert_eq!(successes, 7);
    let current = store.find_collector(collector.id).await.unwrap().unwrap();
    assert_eq!(current.balance, Decimal::ZERO);
}
