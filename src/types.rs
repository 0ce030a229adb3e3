use crate::constants::{HIGH_THRESHOLD, MEDIUM_THRESHOLD};
use crate::storage::TabularRecord;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A source row as produced by extraction.
///
/// `purchase_date` stays as text here; it is only interpreted during
/// transformation so that a malformed date fails that stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    pub customer_id: i64,
    pub customer_name: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub purchase_amount: Decimal,
    pub purchase_date: String,
    pub region: String,
}

/// A source row augmented with tax, total, calendar and category fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedPurchase {
    pub customer_id: i64,
    pub customer_name: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub purchase_amount: Decimal,
    pub purchase_date: NaiveDate,
    pub region: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub tax_amount: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_amount: Decimal,
    pub month: u32,
    pub year: i32,
    pub purchase_category: PurchaseCategory,
}

impl TabularRecord for PurchaseRecord {
    const FIELDS: &'static [&'static str] = &[
        "customer_id",
        "customer_name",
        "purchase_amount",
        "purchase_date",
        "region",
    ];
}

impl TabularRecord for DerivedPurchase {
    const FIELDS: &'static [&'static str] = &[
        "customer_id",
        "customer_name",
        "purchase_amount",
        "purchase_date",
        "region",
        "tax_amount",
        "total_amount",
        "month",
        "year",
        "purchase_category",
    ];
}

/// Spend bucket. Boundaries are strict: 200 is Medium, 100 is Low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PurchaseCategory {
    High,
    Medium,
    Low,
}

impl PurchaseCategory {
    pub fn for_amount(amount: Decimal) -> Self {
        if amount > Decimal::from(HIGH_THRESHOLD) {
            PurchaseCategory::High
        } else if amount > Decimal::from(MEDIUM_THRESHOLD) {
            PurchaseCategory::Medium
        } else {
            PurchaseCategory::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseCategory::High => "High",
            PurchaseCategory::Medium => "Medium",
            PurchaseCategory::Low => "Low",
        }
    }
}

impl fmt::Display for PurchaseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
