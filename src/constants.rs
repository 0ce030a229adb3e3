// Stage identities used as graph node ids and metadata owners
pub const EXTRACT_STAGE: &str = "extract";
pub const TRANSFORM_STAGE: &str = "transform";
pub const LOAD_STAGE: &str = "load";
pub const VALIDATE_STAGE: &str = "validate";

// Metadata keys published by each stage
pub const EXTRACTED_COUNT_KEY: &str = "extracted_count";
pub const TRANSFORMED_COUNT_KEY: &str = "transformed_count";
pub const LOADED_COUNT_KEY: &str = "loaded_count";

pub const PIPELINE_NAME: &str = "etl_pipeline_example";
pub const PIPELINE_DESCRIPTION: &str = "A simple ETL pipeline for customer purchases";

pub const DEFAULT_DATA_DIR: &str = "/tmp/etl_pipeline_data";
pub const RAW_DATA_FILE: &str = "raw_data.csv";
pub const TRANSFORMED_DATA_FILE: &str = "transformed_data.csv";
pub const DATABASE_FILE: &str = "etl_database.db";
pub const PURCHASES_TABLE: &str = "customer_purchases";

pub const DEFAULT_MAX_RETRIES: u32 = 1;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5 * 60;

/// Tax rate as a scaled decimal: 10 / 10^2 = 0.10
pub const TAX_RATE_MANTISSA: i64 = 10;
pub const TAX_RATE_SCALE: u32 = 2;

/// Currency precision for derived money fields
pub const MONEY_SCALE: u32 = 2;

// Category thresholds, both strict (amount > threshold)
pub const HIGH_THRESHOLD: i64 = 200;
pub const MEDIUM_THRESHOLD: i64 = 100;

pub const PURCHASE_DATE_FORMAT: &str = "%Y-%m-%d";
