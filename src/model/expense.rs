//! The expense record and the types that make it up.

use crate::error::{Error, Result};
use crate::model::Amount;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// The label shown for an expense whose category is empty.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Whether an expense is personal or business.
///
/// Documents in the store are not guaranteed to hold a recognized value, so anything else is
/// preserved as `Other` rather than rejected. What happens to `Other` depends on the path:
/// - The live ledger view treats it as `Personal` (see `ExpenseRecord::with_display_defaults`).
/// - Aggregations over an arbitrary list leave it out of both sub-totals.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ExpenseType {
    #[default]
    Personal,
    Business,
    /// An unrecognized (or empty) value as found in the store.
    Other(String),
}

impl ExpenseType {
    pub fn as_str(&self) -> &str {
        match self {
            ExpenseType::Personal => "personal",
            ExpenseType::Business => "business",
            ExpenseType::Other(s) => s.as_str(),
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, ExpenseType::Other(_))
    }

    /// Parses user input for a write. Absent, empty or unrecognized input means `Personal`.
    pub fn parse_or_default(value: Option<&str>) -> Self {
        match value.map(ExpenseType::from) {
            Some(t) if t.is_recognized() => t,
            _ => ExpenseType::Personal,
        }
    }
}

impl From<&str> for ExpenseType {
    fn from(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "personal" => ExpenseType::Personal,
            "business" => ExpenseType::Business,
            _ => ExpenseType::Other(value.to_string()),
        }
    }
}

impl From<String> for ExpenseType {
    fn from(value: String) -> Self {
        ExpenseType::from(value.as_str())
    }
}

impl From<ExpenseType> for String {
    fn from(value: ExpenseType) -> Self {
        value.as_str().to_string()
    }
}

impl Display for ExpenseType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExpenseType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(ExpenseType::from(s))
    }
}

impl Serialize for ExpenseType {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ExpenseType {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        Ok(ExpenseType::from(String::deserialize(d)?))
    }
}

/// Where an expense was captured.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseSource {
    #[default]
    Manual,
    Sms,
}

serde_plain::derive_display_from_serialize!(ExpenseSource);
serde_plain::derive_fromstr_from_deserialize!(ExpenseSource);

/// The partition key of all data: every ledger and merchant memory belongs to exactly one user.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Creates a `UserId`, rejecting empty or whitespace-only input.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into().trim().to_string();
        if value.is_empty() {
            return Err(Error::validation("userId is required"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One expense as held by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseRecord {
    /// Assigned by the store on creation; never changes.
    pub id: String,
    pub item: String,
    pub amount: Amount,
    #[serde(rename = "type", default = "other_type")]
    pub r#type: ExpenseType,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub source: ExpenseSource,
    /// Assigned by the store at creation time. The sole sort key, descending.
    pub date: DateTime<Utc>,
}

/// A missing `type` in a stored document is not the same as `personal`.
fn other_type() -> ExpenseType {
    ExpenseType::Other(String::new())
}

impl ExpenseRecord {
    /// The category, or `Uncategorized` when it is empty.
    pub fn display_category(&self) -> &str {
        let trimmed = self.category.trim();
        if trimmed.is_empty() {
            UNCATEGORIZED
        } else {
            trimmed
        }
    }

    /// The record as the live ledger presents it: an unrecognized type becomes `Personal`.
    pub fn with_display_defaults(mut self) -> Self {
        if !self.r#type.is_recognized() {
            self.r#type = ExpenseType::Personal;
        }
        self
    }
}

/// The caller-supplied fields of an expense, used for both create and update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewExpense {
    #[serde(default)]
    pub item: String,
    #[serde(default)]
    pub amount: Option<Amount>,
    #[serde(rename = "type", default)]
    pub r#type: Option<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub source: ExpenseSource,
}

/// A `NewExpense` that passed validation and is ready to be written to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidExpense {
    pub item: String,
    pub amount: Amount,
    pub r#type: ExpenseType,
    pub category: String,
    pub note: String,
    pub source: ExpenseSource,
}

/// The largest amount a single expense may carry: one trillion.
pub const MAX_EXPENSE_AMOUNT: u64 = 1_000_000_000_000;

impl NewExpense {
    /// Checks required fields and normalizes the rest.
    ///
    /// # Errors
    /// - `ErrorType::Validation` if `item` is empty or `amount` is missing, negative or above
    ///   `MAX_EXPENSE_AMOUNT`.
    pub fn validate(self) -> Result<ValidExpense> {
        let item = self.item.trim().to_string();
        if item.is_empty() {
            return Err(Error::validation("item is required"));
        }
        let amount = self
            .amount
            .ok_or_else(|| Error::validation("amount is required"))?;
        if amount.is_negative() {
            return Err(Error::validation(format!(
                "amount must not be negative, got {amount}"
            )));
        }
        if amount.value() > Decimal::from(MAX_EXPENSE_AMOUNT) {
            return Err(Error::validation(format!(
                "amount must not exceed {}, got {amount}",
                Amount::new(Decimal::from(MAX_EXPENSE_AMOUNT))
            )));
        }
        Ok(ValidExpense {
            item,
            amount,
            r#type: ExpenseType::parse_or_default(self.r#type.as_deref()),
            category: self.category.trim().to_string(),
            note: self.note,
            source: self.source,
        })
    }
}

impl ValidExpense {
    /// Builds the stored record once the store has assigned `id` and `date`.
    pub fn into_record(self, id: impl Into<String>, date: DateTime<Utc>) -> ExpenseRecord {
        ExpenseRecord {
            id: id.into(),
            item: self.item,
            amount: self.amount,
            r#type: self.r#type,
            category: self.category,
            note: self.note,
            source: self.source,
            date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorType;
    use rust_decimal_macros::dec;

    fn new_expense(item: &str, amount: Option<Amount>) -> NewExpense {
        NewExpense {
            item: item.to_string(),
            amount,
            ..Default::default()
        }
    }

    #[test]
    fn test_expense_type_parse() {
        assert_eq!(ExpenseType::from("personal"), ExpenseType::Personal);
        assert_eq!(ExpenseType::from(" Business "), ExpenseType::Business);
        assert_eq!(
            ExpenseType::from("corporate"),
            ExpenseType::Other("corporate".to_string())
        );
    }

    #[test]
    fn test_expense_type_default_for_writes() {
        assert_eq!(ExpenseType::parse_or_default(None), ExpenseType::Personal);
        assert_eq!(
            ExpenseType::parse_or_default(Some("bogus")),
            ExpenseType::Personal
        );
        assert_eq!(
            ExpenseType::parse_or_default(Some("business")),
            ExpenseType::Business
        );
    }

    #[test]
    fn test_validate_ok() {
        let valid = NewExpense {
            item: "  petrol ".to_string(),
            amount: Some(Amount::new(dec!(100))),
            r#type: Some("business".to_string()),
            category: "consumable".to_string(),
            note: "filled tank".to_string(),
            source: ExpenseSource::Sms,
        }
        .validate()
        .unwrap();
        assert_eq!(valid.item, "petrol");
        assert_eq!(valid.r#type, ExpenseType::Business);
        assert_eq!(valid.source, ExpenseSource::Sms);
    }

    #[test]
    fn test_validate_empty_item() {
        let err = new_expense("   ", Some(Amount::new(dec!(1))))
            .validate()
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Validation);
        assert!(err.to_string().contains("item"));
    }

    #[test]
    fn test_validate_missing_amount() {
        let err = new_expense("petrol", None).validate().unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Validation);
        assert!(err.to_string().contains("amount"));
    }

    #[test]
    fn test_validate_amount_ceiling() {
        let ceiling = Amount::new(Decimal::from(MAX_EXPENSE_AMOUNT));
        let valid = new_expense("house", Some(ceiling)).validate().unwrap();
        assert_eq!(valid.amount, ceiling);

        let err = new_expense("house", Some(Amount::new(Decimal::MAX)))
            .validate()
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Validation);
        assert!(err.to_string().contains("must not exceed"));

        let err = new_expense("house", Some(ceiling + Amount::new(dec!(0.01))))
            .validate()
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Validation);
    }

    #[test]
    fn test_validate_negative_amount() {
        let err = new_expense("refund", Some(Amount::new(dec!(-5))))
            .validate()
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Validation);
    }

    #[test]
    fn test_zero_amount_is_allowed() {
        assert!(new_expense("freebie", Some(Amount::ZERO)).validate().is_ok());
    }

    #[test]
    fn test_user_id_rejects_empty() {
        assert_eq!(
            UserId::new("  ").unwrap_err().error_type(),
            ErrorType::Validation
        );
        assert_eq!(UserId::new(" u1 ").unwrap().as_str(), "u1");
    }

    #[test]
    fn test_record_json_shape() {
        let record = ExpenseRecord {
            id: "abc".to_string(),
            item: "petrol".to_string(),
            amount: Amount::new(dec!(100.25)),
            r#type: ExpenseType::Personal,
            category: String::new(),
            note: String::new(),
            source: ExpenseSource::Manual,
            date: DateTime::parse_from_rfc3339("2025-03-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["type"], "personal");
        assert_eq!(value["amount"], 100.25);
        assert_eq!(value["source"], "manual");
        assert_eq!(record.display_category(), UNCATEGORIZED);
    }

    #[test]
    fn test_missing_type_in_document_is_unrecognized() {
        let json = r#"{"id":"x","item":"tea","amount":3,"date":"2025-03-01T10:00:00Z"}"#;
        let record: ExpenseRecord = serde_json::from_str(json).unwrap();
        assert!(!record.r#type.is_recognized());
        assert_eq!(record.with_display_defaults().r#type, ExpenseType::Personal);
    }
}
