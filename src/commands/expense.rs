//! Commands that write or list expenses.

use crate::args::{DeleteArgs, ExpenseArgs, FilterArgs, UpdateArgs};
use crate::commands::Out;
use crate::model::{ExpenseRecord, UserId};
use crate::{Config, Result};

pub async fn add(config: Config, args: ExpenseArgs) -> Result<Out<ExpenseRecord>> {
    let user = UserId::new(args.user())?;
    let record = config
        .tracker()
        .add_expense(&user, args.new_expense())
        .await?;
    Ok(Out::new(
        format!("Added expense '{}' ({}) with id {}", record.item, record.amount, record.id),
        record,
    ))
}

pub async fn update(config: Config, args: UpdateArgs) -> Result<Out<ExpenseRecord>> {
    let user = UserId::new(args.expense().user())?;
    let record = config
        .tracker()
        .update_expense(&user, args.id(), args.expense().new_expense())
        .await?;
    Ok(Out::new(format!("Updated expense {}", record.id), record))
}

pub async fn delete(config: Config, args: DeleteArgs) -> Result<Out<()>> {
    let user = UserId::new(args.user())?;
    config.tracker().delete_expense(&user, args.id()).await?;
    Ok(format!("Deleted expense {}", args.id()).into())
}

pub async fn list(config: Config, args: FilterArgs) -> Result<Out<Vec<ExpenseRecord>>> {
    let user = UserId::new(args.user())?;
    let records = config
        .tracker()
        .list_expenses(&user, args.expense_type())
        .await?;
    let mut message = format!("{} expenses for '{user}'", records.len());
    for r in &records {
        message.push_str(&format!(
            "\n  {}  {:>12}  {:<8}  {:<16}  {}",
            r.date.format("%Y-%m-%d %H:%M"),
            r.amount.to_string(),
            r.r#type,
            r.display_category(),
            r.item
        ));
    }
    Ok(Out::new(message, records))
}
