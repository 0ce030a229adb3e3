use crate::constants::{
    MONEY_SCALE, PURCHASE_DATE_FORMAT, TAX_RATE_MANTISSA, TAX_RATE_SCALE, TRANSFORMED_COUNT_KEY,
    TRANSFORM_STAGE,
};
use crate::error::{PipelineError, Result};
use crate::stage::{Stage, StageContext, StageOutcome};
use crate::storage::RecordTarget;
use crate::types::{DerivedPurchase, PurchaseCategory, PurchaseRecord};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;
use tracing::{debug, info, instrument};

pub fn tax_rate() -> Decimal {
    Decimal::new(TAX_RATE_MANTISSA, TAX_RATE_SCALE)
}

/// Derive tax, total, calendar fields and category for one record.
///
/// `row` is the 1-based data row, used only in error messages.
pub fn derive_purchase(row: usize, record: &PurchaseRecord) -> Result<DerivedPurchase> {
    let date = NaiveDate::parse_from_str(record.purchase_date.trim(), PURCHASE_DATE_FORMAT)
        .map_err(|e| PipelineError::Parse {
            row,
            field: "purchase_date",
            value: record.purchase_date.clone(),
            reason: e.to_string(),
        })?;

    let overflow = || PipelineError::Parse {
        row,
        field: "purchase_amount",
        value: record.purchase_amount.to_string(),
        reason: "tax or total exceeds the decimal range".to_string(),
    };
    let tax_amount = record
        .purchase_amount
        .checked_mul(tax_rate())
        .ok_or_else(overflow)?
        .round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    let total_amount = record
        .purchase_amount
        .checked_add(tax_amount)
        .ok_or_else(overflow)?;

    Ok(DerivedPurchase {
        customer_id: record.customer_id,
        customer_name: record.customer_name.clone(),
        purchase_amount: record.purchase_amount,
        purchase_date: date,
        region: record.region.clone(),
        tax_amount,
        total_amount,
        month: date.month(),
        year: date.year(),
        purchase_category: PurchaseCategory::for_amount(record.purchase_amount),
    })
}

/// Derive every record; the first unparseable row fails the whole batch
pub fn transform_records(records: &[PurchaseRecord]) -> Result<Vec<DerivedPurchase>> {
    records
        .iter()
        .enumerate()
        .map(|(i, r)| derive_purchase(i + 1, r))
        .collect()
}

/// Reads the raw target, derives fields and replaces the transformed target.
/// Never filters: output count equals input count.
pub struct TransformStage {
    raw: Arc<dyn RecordTarget<PurchaseRecord>>,
    transformed: Arc<dyn RecordTarget<DerivedPurchase>>,
}

impl TransformStage {
    pub fn new(
        raw: Arc<dyn RecordTarget<PurchaseRecord>>,
        transformed: Arc<dyn RecordTarget<DerivedPurchase>>,
    ) -> Self {
        Self { raw, transformed }
    }
}

#[async_trait]
impl Stage for TransformStage {
    fn stage_id(&self) -> &str {
        TRANSFORM_STAGE
    }

    #[instrument(skip(self, ctx), fields(run_id = %ctx.run_id))]
    async fn execute(&self, ctx: &StageContext) -> Result<StageOutcome> {
        info!("🔧 Starting data transformation of {}", self.raw.describe());

        let records = self.raw.read_all()?;
        let derived = transform_records(&records)?;
        for d in &derived {
            debug!(
                customer_id = d.customer_id,
                tax = %d.tax_amount,
                total = %d.total_amount,
                category = %d.purchase_category,
                "derived record"
            );
        }
        let written = self.transformed.write_all(&derived)? as u64;

        info!("✅ Transformed {} records to {}", written, self.transformed.describe());
        ctx.bus.publish_count(TRANSFORM_STAGE, TRANSFORMED_COUNT_KEY, written)?;

        Ok(StageOutcome::processed(
            written,
            format!("transformed {} records to {}", written, self.transformed.describe()),
        ))
    }
}
