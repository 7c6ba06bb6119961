//! Commands that compute summaries over a user's expenses.

use crate::aggregate::{CategoryBreakdown, DateRange, MerchantSpend, MonthBucket, RollupTotals};
use crate::args::{FilterArgs, MerchantSpendArgs, UserArgs};
use crate::commands::Out;
use crate::model::UserId;
use crate::{Config, Result};
use std::collections::BTreeMap;
use std::fmt::Write;

pub async fn totals(config: Config, args: UserArgs) -> Result<Out<RollupTotals>> {
    let user = UserId::new(args.user())?;
    let totals = config.tracker().totals(&user).await?;
    Ok(Out::new(
        format!(
            "Totals for '{user}': total {}, personal {}, business {}",
            totals.total, totals.personal, totals.business
        ),
        totals,
    ))
}

pub async fn summary(config: Config, args: FilterArgs) -> Result<Out<CategoryBreakdown>> {
    let user = UserId::new(args.user())?;
    let breakdown = config
        .tracker()
        .category_summary(&user, args.expense_type())
        .await?;
    let mut message = format!("Spending by category for '{user}': {}", breakdown.grand_total);
    for (name, stat) in &breakdown.categories {
        let _ = write!(
            message,
            "\n  {name:<20} {:>12}  {:>5}%  ({} expenses)",
            stat.total.to_string(),
            stat.percentage,
            stat.count
        );
    }
    Ok(Out::new(message, breakdown))
}

pub async fn trend(
    config: Config,
    args: FilterArgs,
) -> Result<Out<BTreeMap<String, MonthBucket>>> {
    let user = UserId::new(args.user())?;
    let trend = config
        .tracker()
        .monthly_trend(&user, args.expense_type())
        .await?;
    let mut message = format!("Spending by month for '{user}'");
    for (month, bucket) in &trend {
        let _ = write!(
            message,
            "\n  {month}  {:>12}  ({} expenses)",
            bucket.total.to_string(),
            bucket.count
        );
    }
    Ok(Out::new(message, trend))
}

pub async fn merchant_spend(config: Config, args: MerchantSpendArgs) -> Result<Out<MerchantSpend>> {
    let user = UserId::new(args.user())?;
    let range = DateRange::new(args.start_date(), args.end_date());
    let spend = config
        .tracker()
        .merchant_spend(&user, args.merchant(), range)
        .await?;
    let mut message = format!(
        "Spent {} at '{}' across {} expenses",
        spend.total_spent, spend.merchant, spend.transaction_count
    );
    for (category, total) in &spend.by_category {
        let _ = write!(message, "\n  {category:<20} {:>12}", total.to_string());
    }
    Ok(Out::new(message, spend))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Amount, NewExpense};
    use crate::test::TestEnv;
    use rust_decimal_macros::dec;

    async fn seed(env: &TestEnv) {
        let user = UserId::new("u1").unwrap();
        let tracker = env.config().tracker();
        for (item, amount, t, category, note) in [
            ("petrol", dec!(100), "personal", "consumable", ""),
            ("client lunch", dec!(50), "business", "food", ""),
            ("bank", dec!(500), "business", "", "HDFC Transfer"),
        ] {
            let expense = NewExpense {
                item: item.to_string(),
                amount: Some(Amount::new(amount)),
                r#type: Some(t.to_string()),
                category: category.to_string(),
                note: note.to_string(),
                ..Default::default()
            };
            tracker.add_expense(&user, expense).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_totals() {
        let env = TestEnv::new().await;
        seed(&env).await;
        let out = totals(env.config(), UserArgs::new("u1")).await.unwrap();
        let totals = out.structure().unwrap();
        assert_eq!(totals.total.value(), dec!(650));
        assert_eq!(totals.business.value(), dec!(550));
        assert!(out.message().contains("650.00"));
    }

    #[tokio::test]
    async fn test_empty_user_has_zero_totals() {
        let env = TestEnv::new().await;
        let out = totals(env.config(), UserArgs::new("nobody")).await.unwrap();
        assert_eq!(out.structure(), Some(&RollupTotals::default()));
    }
}
