use crate::error::Result;
use crate::storage::{CsvTarget, RecordTarget};
use crate::types::PurchaseRecord;
use rust_decimal::Decimal;
use std::path::PathBuf;

/// Where extraction gets its batch of records from
pub trait RecordSource: Send + Sync {
    fn fetch(&self) -> Result<Vec<PurchaseRecord>>;

    fn describe(&self) -> String;
}

/// The built-in batch of five sample customers
#[derive(Debug, Default, Clone)]
pub struct SampleSource;

impl SampleSource {
    pub fn records() -> Vec<PurchaseRecord> {
        let rows: [(i64, &str, i64, &str, &str); 5] = [
            (1, "John Doe", 15050, "2024-01-01", "North"),
            (2, "Jane Smith", 20000, "2024-01-02", "South"),
            (3, "Bob Johnson", 7525, "2024-01-03", "East"),
            (4, "Alice Brown", 30075, "2024-01-04", "West"),
            (5, "Charlie Wilson", 12500, "2024-01-05", "North"),
        ];
        rows.iter()
            .map(|(id, name, cents, date, region)| PurchaseRecord {
                customer_id: *id,
                customer_name: name.to_string(),
                purchase_amount: Decimal::new(*cents, 2),
                purchase_date: date.to_string(),
                region: region.to_string(),
            })
            .collect()
    }
}

impl RecordSource for SampleSource {
    fn fetch(&self) -> Result<Vec<PurchaseRecord>> {
        Ok(Self::records())
    }

    fn describe(&self) -> String {
        "sample data".to_string()
    }
}

/// Reads source records from a CSV file with the raw-record header
pub struct CsvFileSource {
    path: PathBuf,
}

impl CsvFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RecordSource for CsvFileSource {
    fn fetch(&self) -> Result<Vec<PurchaseRecord>> {
        CsvTarget::<PurchaseRecord>::new(self.path.clone()).read_all()
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
