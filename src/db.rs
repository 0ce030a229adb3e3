use crate::constants::{MONEY_SCALE, PURCHASE_DATE_FORMAT};
use crate::error::{PipelineError, Result};
use crate::types::{DerivedPurchase, PurchaseCategory};
use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Persistent relational home of the loaded purchases
pub trait PurchaseStore: Send + Sync {
    /// Drop and recreate the table, then insert every record
    fn replace_all(&self, records: &[DerivedPurchase]) -> Result<usize>;

    /// Authoritative row count, read back from the store
    fn count(&self) -> Result<u64>;

    fn fetch_all(&self) -> Result<Vec<DerivedPurchase>>;

    fn describe(&self) -> String;
}

/// SQLite file holding one table of derived purchases.
///
/// A connection is opened per call, so the store itself is `Sync`.
pub struct SqlitePurchaseStore {
    path: PathBuf,
    table: String,
}

impl SqlitePurchaseStore {
    pub fn new(path: impl Into<PathBuf>, table: &str) -> Result<Self> {
        let valid = !table.is_empty()
            && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !table.starts_with(|c: char| c.is_ascii_digit());
        if !valid {
            return Err(PipelineError::Config(format!(
                "invalid table name '{table}'"
            )));
        }
        Ok(Self {
            path: path.into(),
            table: table.to_string(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn open(&self) -> Result<Connection> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(Connection::open(&self.path)?)
    }
}

fn money(d: Decimal, column: &'static str, row: usize) -> Result<f64> {
    d.to_f64().ok_or_else(|| PipelineError::Parse {
        row,
        field: column,
        value: d.to_string(),
        reason: "not representable as a REAL".to_string(),
    })
}

fn money_from_column(v: f64, column: &'static str, row: usize) -> Result<Decimal> {
    Decimal::try_from(v)
        .map(|d| d.round_dp(MONEY_SCALE))
        .map_err(|e| PipelineError::Parse {
            row,
            field: column,
            value: v.to_string(),
            reason: e.to_string(),
        })
}

fn category_from_column(s: &str, row: usize) -> Result<PurchaseCategory> {
    match s {
        "High" => Ok(PurchaseCategory::High),
        "Medium" => Ok(PurchaseCategory::Medium),
        "Low" => Ok(PurchaseCategory::Low),
        other => Err(PipelineError::Parse {
            row,
            field: "purchase_category",
            value: other.to_string(),
            reason: "unknown category".to_string(),
        }),
    }
}

impl PurchaseStore for SqlitePurchaseStore {
    fn replace_all(&self, records: &[DerivedPurchase]) -> Result<usize> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        tx.execute_batch(&format!(
            r#"
            DROP TABLE IF EXISTS "{t}";
            CREATE TABLE "{t}" (
                customer_id        INTEGER NOT NULL,
                customer_name      TEXT    NOT NULL,
                purchase_amount    REAL    NOT NULL,
                purchase_date      TEXT    NOT NULL,
                region             TEXT    NOT NULL,
                tax_amount         REAL    NOT NULL,
                total_amount       REAL    NOT NULL,
                month              INTEGER NOT NULL,
                year               INTEGER NOT NULL,
                purchase_category  TEXT    NOT NULL
            );
            "#,
            t = self.table
        ))?;
        {
            let mut stmt = tx.prepare(&format!(
                r#"INSERT INTO "{}" (customer_id, customer_name, purchase_amount, purchase_date, region,
                    tax_amount, total_amount, month, year, purchase_category)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
                self.table
            ))?;
            for (i, r) in records.iter().enumerate() {
                let row = i + 1;
                stmt.execute(params![
                    r.customer_id,
                    r.customer_name,
                    money(r.purchase_amount, "purchase_amount", row)?,
                    r.purchase_date.format(PURCHASE_DATE_FORMAT).to_string(),
                    r.region,
                    money(r.tax_amount, "tax_amount", row)?,
                    money(r.total_amount, "total_amount", row)?,
                    r.month,
                    r.year,
                    r.purchase_category.as_str(),
                ])?;
            }
        }
        tx.commit()?;
        debug!(
            "replaced table {} in {} with {} rows",
            self.table,
            self.path.display(),
            records.len()
        );
        Ok(records.len())
    }

    fn count(&self) -> Result<u64> {
        let conn = self.open()?;
        let n: i64 = conn.query_row(
            &format!(r#"SELECT COUNT(*) FROM "{}""#, self.table),
            [],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    fn fetch_all(&self) -> Result<Vec<DerivedPurchase>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(&format!(
            r#"SELECT customer_id, customer_name, purchase_amount, purchase_date, region,
                      tax_amount, total_amount, month, year, purchase_category
               FROM "{}" ORDER BY rowid"#,
            self.table
        ))?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let i = out.len() + 1;
            let date_s: String = row.get(3)?;
            let category_s: String = row.get(9)?;
            let purchase_date = NaiveDate::parse_from_str(&date_s, PURCHASE_DATE_FORMAT)
                .map_err(|e| PipelineError::Parse {
                    row: i,
                    field: "purchase_date",
                    value: date_s.clone(),
                    reason: e.to_string(),
                })?;
            out.push(DerivedPurchase {
                customer_id: row.get(0)?,
                customer_name: row.get(1)?,
                purchase_amount: money_from_column(row.get(2)?, "purchase_amount", i)?,
                purchase_date,
                region: row.get(4)?,
                tax_amount: money_from_column(row.get(5)?, "tax_amount", i)?,
                total_amount: money_from_column(row.get(6)?, "total_amount", i)?,
                month: row.get(7)?,
                year: row.get(8)?,
                purchase_category: category_from_column(&category_s, i)?,
            });
        }
        Ok(out)
    }

    fn describe(&self) -> String {
        format!("{}#{}", self.path.display(), self.table)
    }
}
