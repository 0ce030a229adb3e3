// The four ETL stages and the sources extraction can draw from

pub mod extract;
pub mod load;
pub mod source;
pub mod transform;
pub mod validate;

pub use extract::ExtractStage;
pub use load::LoadStage;
pub use source::{CsvFileSource, RecordSource, SampleSource};
pub use transform::TransformStage;
pub use validate::{CountSummary, ValidateStage};
