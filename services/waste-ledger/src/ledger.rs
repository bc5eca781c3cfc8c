//! Posting rules for collector balances.
//!
//! Every balance change goes through [`post_collection`] or
//! [`post_withdrawal`]. Both are pure: they take a snapshot of the account as
//! read under the identity lock and return the deltas the store must commit
//! in the same unit of work. The store never decides amounts itself.

use rust_decimal::Decimal;

use crate::errors::{LedgerServiceError, Result};
use crate::models::{Collector, RecyclableItem, TransactionType};

pub const DEFAULT_WITHDRAWAL_DESCRIPTION: &str = "Balance withdrawal";

/// Ledger-owned fields of an identity, read under lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountState {
    pub balance: Decimal,
    pub total_collected_kg: Decimal,
    pub is_active: bool,
}

impl From<&Collector> for AccountState {
    fn from(collector: &Collector) -> Self {
        AccountState {
            balance: collector.balance,
            total_collected_kg: collector.total_collected_kg,
            is_active: collector.is_active,
        }
    }
}

/// Everything a store writes for one ledger event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub transaction_type: TransactionType,
    /// Signed: positive for credits, negative for debits
    pub amount: Decimal,
    /// Weight added to the cumulative total (zero for withdrawals)
    pub weight_kg: Decimal,
    pub description: String,
    pub balance_after: Decimal,
    pub total_collected_kg_after: Decimal,
}

pub fn compute_earned(weight_kg: Decimal, price_per_kg: Decimal) -> Result<Decimal> {
    weight_kg.checked_mul(price_per_kg).ok_or_else(|| {
        LedgerServiceError::Validation("earned amount is out of range".to_string())
    })
}

pub fn validate_weight(weight_kg: Decimal) -> Result<()> {
    if weight_kg <= Decimal::ZERO {
        return Err(LedgerServiceError::Validation(
            "weight_kg must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_amount(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(LedgerServiceError::Validation(
            "amount must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_price(price_per_kg: Decimal) -> Result<()> {
    if price_per_kg < Decimal::ZERO {
        return Err(LedgerServiceError::Validation(
            "price_per_kg must not be negative".to_string(),
        ));
    }
    Ok(())
}

/// Credit for a pickup of `weight_kg` of `item`.
pub fn post_collection(
    account: &AccountState,
    item: &RecyclableItem,
    weight_kg: Decimal,
) -> Result<Posting> {
    validate_weight(weight_kg)?;
    if !account.is_active {
        return Err(LedgerServiceError::AccountDisabled);
    }

    let earned = compute_earned(weight_kg, item.price_per_kg)?;
    let balance_after = checked_add(account.balance, earned)?;
    let total_collected_kg_after = checked_add(account.total_collected_kg, weight_kg)?;

    Ok(Posting {
        transaction_type: TransactionType::Collection,
        amount: earned,
        weight_kg,
        description: format!("Collected {}kg of {}", weight_kg.normalize(), item.name),
        balance_after,
        total_collected_kg_after,
    })
}

/// Debit of `amount`, refused when it exceeds the current balance.
pub fn post_withdrawal(
    account: &AccountState,
    amount: Decimal,
    description: Option<&str>,
) -> Result<Posting> {
    validate_amount(amount)?;
    if !account.is_active {
        return Err(LedgerServiceError::AccountDisabled);
    }

    if amount > account.balance {
        return Err(LedgerServiceError::InsufficientBalance {
            requested: amount,
            available: account.balance,
        });
    }

    let description = description
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or(DEFAULT_WITHDRAWAL_DESCRIPTION)
        .to_string();

    Ok(Posting {
        transaction_type: TransactionType::Withdrawal,
        amount: -amount,
        weight_kg: Decimal::ZERO,
        description,
        balance_after: account.balance - amount,
        total_collected_kg_after: account.total_collected_kg,
    })
}

/// Trim optional free text; blank becomes `None`.
pub fn normalize_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn checked_add(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_add(b)
        .ok_or_else(|| LedgerServiceError::Validation("balance is out of range".to_string()))
}
