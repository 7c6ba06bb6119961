//! Types that represent the core data model, such as `ExpenseRecord` and `MerchantMemoryEntry`.
mod amount;
mod expense;
mod merchant;

pub use amount::{Amount, AmountError};
pub use expense::{
    ExpenseRecord, ExpenseSource, ExpenseType, NewExpense, UserId, ValidExpense,
    MAX_EXPENSE_AMOUNT, UNCATEGORIZED,
};
pub use merchant::{MerchantKey, MerchantMemoryEntry};
