//! Summary statistics over a list of expense records.
//!
//! Every function here is pure: it borrows its input, never mutates it, and returns the same
//! output for the same input. The live ledger view and the on-demand query API both call these,
//! so the total and percentage math exists in exactly one place.
//!
//! Note the treatment of unrecognized expense types. `compute_totals` counts every record toward
//! `total` but only recognized types toward `personal` and `business`. The live view normalizes
//! unrecognized types to `personal` before it gets here, so for it `total == personal + business`
//! always holds. A list fetched by a query caller is not normalized, so for it the invariant only
//! holds when every type is recognized.

use crate::model::{Amount, ExpenseRecord, ExpenseType};
use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sums of `amount` by expense type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollupTotals {
    pub total: Amount,
    pub personal: Amount,
    pub business: Amount,
}

/// Sums `amount` over `records`, grouped by type.
pub fn compute_totals(records: &[ExpenseRecord]) -> RollupTotals {
    let mut totals = RollupTotals::default();
    for record in records {
        totals.total += record.amount;
        match record.r#type {
            ExpenseType::Personal => totals.personal += record.amount,
            ExpenseType::Business => totals.business += record.amount,
            ExpenseType::Other(_) => {}
        }
    }
    totals
}

/// An optional, inclusive range of calendar days (UTC).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start_date: Option<NaiveDate>, end_date: Option<NaiveDate>) -> Self {
        Self {
            start_date,
            end_date,
        }
    }

    pub fn contains(&self, record: &ExpenseRecord) -> bool {
        let day = record.date.date_naive();
        self.start_date.map_or(true, |start| day >= start)
            && self.end_date.map_or(true, |end| day <= end)
    }
}

/// The result of a merchant query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerchantSpend {
    pub merchant: String,
    pub total_spent: Amount,
    pub transaction_count: usize,
    pub by_category: BTreeMap<String, Amount>,
    /// Matching records, newest first.
    pub expenses: Vec<ExpenseRecord>,
}

/// Finds records whose item or note contains `merchant` (case-insensitive) within `range`.
///
/// There is no dedicated merchant field, so a merchant is whatever free text the user typed. An
/// empty `merchant` matches every record.
pub fn filter_by_merchant_or_note(
    records: &[ExpenseRecord],
    merchant: &str,
    range: DateRange,
) -> MerchantSpend {
    let needle = merchant.trim().to_lowercase();
    let mut expenses: Vec<ExpenseRecord> = records
        .iter()
        .filter(|r| {
            r.item.to_lowercase().contains(&needle) || r.note.to_lowercase().contains(&needle)
        })
        .filter(|r| range.contains(r))
        .cloned()
        .collect();
    sort_newest_first(&mut expenses);

    let mut by_category: BTreeMap<String, Amount> = BTreeMap::new();
    for record in &expenses {
        *by_category
            .entry(record.display_category().to_string())
            .or_default() += record.amount;
    }

    MerchantSpend {
        merchant: merchant.to_string(),
        total_spent: expenses.iter().map(|r| r.amount).sum(),
        transaction_count: expenses.len(),
        by_category,
        expenses,
    }
}

/// Spending in one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryStat {
    pub total: Amount,
    pub count: usize,
    /// Share of the grand total, 0 to 100, rounded to one decimal place.
    #[serde(with = "rust_decimal::serde::float")]
    pub percentage: Decimal,
}

/// Spending grouped by category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryBreakdown {
    #[serde(rename = "totalSpent")]
    pub grand_total: Amount,
    pub categories: BTreeMap<String, CategoryStat>,
}

/// Groups records by category, optionally keeping only one expense type.
///
/// An empty category is reported as `Uncategorized`. When the grand total is zero every
/// percentage is zero.
pub fn category_summary(
    records: &[ExpenseRecord],
    type_filter: Option<&ExpenseType>,
) -> CategoryBreakdown {
    let mut grand_total = Amount::ZERO;
    let mut groups: BTreeMap<String, (Amount, usize)> = BTreeMap::new();
    for record in records.iter().filter(|r| matches_type(r, type_filter)) {
        let entry = groups
            .entry(record.display_category().to_string())
            .or_insert((Amount::ZERO, 0));
        entry.0 += record.amount;
        entry.1 += 1;
        grand_total += record.amount;
    }

    let categories = groups
        .into_iter()
        .map(|(name, (total, count))| {
            let stat = CategoryStat {
                total,
                count,
                percentage: percentage(total, grand_total),
            };
            (name, stat)
        })
        .collect();

    CategoryBreakdown {
        grand_total,
        categories,
    }
}

/// Spending in one calendar month.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthBucket {
    pub total: Amount,
    pub count: usize,
}

/// Groups records by the `YYYY-MM` of their date, optionally keeping only one expense type.
///
/// Keys sort chronologically as strings.
pub fn monthly_trend(
    records: &[ExpenseRecord],
    type_filter: Option<&ExpenseType>,
) -> BTreeMap<String, MonthBucket> {
    let mut trend: BTreeMap<String, MonthBucket> = BTreeMap::new();
    for record in records.iter().filter(|r| matches_type(r, type_filter)) {
        let bucket = trend
            .entry(record.date.format("%Y-%m").to_string())
            .or_default();
        bucket.total += record.amount;
        bucket.count += 1;
    }
    trend
}

/// Sorts by date descending. Ties are broken by id so that the order is deterministic.
pub(crate) fn sort_newest_first(records: &mut [ExpenseRecord]) {
    records.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.id.cmp(&a.id)));
}

fn matches_type(record: &ExpenseRecord, type_filter: Option<&ExpenseType>) -> bool {
    type_filter.map_or(true, |t| &record.r#type == t)
}

fn percentage(part: Amount, whole: Amount) -> Decimal {
    if whole.is_zero() {
        return Decimal::ZERO;
    }
    part.value()
        .checked_div(whole.value())
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .map(|p| p.round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero))
        .unwrap_or(Decimal::ZERO)
}
