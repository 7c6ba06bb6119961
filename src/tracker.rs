//! `Tracker` is the entry point for on-demand operations: validated writes, listings and the
//! aggregation queries. Every call names the user it acts for.
//!
//! Results here come straight from the store and are not normalized, so an unrecognized expense
//! type stays out of both sub-totals. The live ledger in `crate::sync` shows such records as
//! personal instead.

use crate::aggregate::{
    category_summary, compute_totals, filter_by_merchant_or_note, monthly_trend,
    CategoryBreakdown, DateRange, MerchantSpend, MonthBucket, RollupTotals,
};
use crate::error::{Error, Result};
use crate::merchant::MerchantMemory;
use crate::model::{ExpenseRecord, ExpenseType, NewExpense, UserId};
use crate::store::Store;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct Tracker {
    store: Arc<dyn Store>,
    merchants: MerchantMemory,
}

impl Tracker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            merchants: MerchantMemory::new(store.clone()),
            store,
        }
    }

    pub fn store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }

    pub fn merchants(&self) -> &MerchantMemory {
        &self.merchants
    }

    /// Validates and writes a new expense. The updated ledger reaches subscribers separately.
    ///
    /// # Errors
    /// - `ErrorType::Validation` if `item` or `amount` is missing, or `amount` is negative.
    /// - `ErrorType::StoreUnavailable` if the write fails.
    pub async fn add_expense(&self, user: &UserId, expense: NewExpense) -> Result<ExpenseRecord> {
        let valid = expense.validate().map_err(|e| {
            debug!("Rejected expense for '{user}': {e}");
            e
        })?;
        self.store.add(user, valid).await
    }

    /// Replaces the caller-supplied fields of expense `id`.
    ///
    /// # Errors
    /// - `ErrorType::Validation` as for `add_expense`.
    /// - `ErrorType::NotFound` if `id` does not exist for `user`.
    /// - `ErrorType::StoreUnavailable` if the write fails.
    pub async fn update_expense(
        &self,
        user: &UserId,
        id: &str,
        expense: NewExpense,
    ) -> Result<ExpenseRecord> {
        let id = required_id(id)?;
        let valid = expense.validate().map_err(|e| {
            debug!("Rejected update of '{id}' for '{user}': {e}");
            e
        })?;
        self.store.update(user, id, valid).await
    }

    /// # Errors
    /// - `ErrorType::NotFound` if `id` does not exist for `user`.
    /// - `ErrorType::StoreUnavailable` if the write fails.
    pub async fn delete_expense(&self, user: &UserId, id: &str) -> Result<()> {
        let id = required_id(id)?;
        self.store.delete(user, id).await
    }

    /// The user's expenses, newest first, optionally only those of one type.
    pub async fn list_expenses(
        &self,
        user: &UserId,
        type_filter: Option<&str>,
    ) -> Result<Vec<ExpenseRecord>> {
        let records = self.store.list(user).await?;
        Ok(match parse_type_filter(type_filter) {
            Some(t) => records.into_iter().filter(|r| r.r#type == t).collect(),
            None => records,
        })
    }

    pub async fn totals(&self, user: &UserId) -> Result<RollupTotals> {
        let records = self.store.list(user).await?;
        Ok(compute_totals(&records))
    }

    /// Spending whose item or note mentions `merchant`.
    ///
    /// # Errors
    /// - `ErrorType::Validation` if `merchant` is blank or the range ends before it starts.
    pub async fn merchant_spend(
        &self,
        user: &UserId,
        merchant: &str,
        range: DateRange,
    ) -> Result<MerchantSpend> {
        if merchant.trim().is_empty() {
            return Err(Error::validation("merchant is required"));
        }
        if let (Some(start), Some(end)) = (range.start_date, range.end_date) {
            if end < start {
                return Err(Error::validation(format!(
                    "endDate {end} is before startDate {start}"
                )));
            }
        }
        let records = self.store.list(user).await?;
        Ok(filter_by_merchant_or_note(&records, merchant, range))
    }

    pub async fn category_summary(
        &self,
        user: &UserId,
        type_filter: Option<&str>,
    ) -> Result<CategoryBreakdown> {
        let records = self.store.list(user).await?;
        Ok(category_summary(
            &records,
            parse_type_filter(type_filter).as_ref(),
        ))
    }

    pub async fn monthly_trend(
        &self,
        user: &UserId,
        type_filter: Option<&str>,
    ) -> Result<BTreeMap<String, MonthBucket>> {
        let records = self.store.list(user).await?;
        Ok(monthly_trend(
            &records,
            parse_type_filter(type_filter).as_ref(),
        ))
    }
}

/// `None`, blank and `all` mean no filter. Any other value is matched exactly, so an unrecognized
/// value only matches records stored with that same value.
pub fn parse_type_filter(value: Option<&str>) -> Option<ExpenseType> {
    let value = value.map(str::trim).filter(|v| !v.is_empty())?;
    if value.eq_ignore_ascii_case("all") {
        None
    } else {
        Some(ExpenseType::from(value))
    }
}

fn required_id(id: &str) -> Result<&str> {
    let id = id.trim();
    if id.is_empty() {
        Err(Error::validation("expense id is required"))
    } else {
        Ok(id)
    }
}
