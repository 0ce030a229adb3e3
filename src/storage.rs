use crate::error::{PipelineError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;
use tracing::debug;

/// A transient tabular target holding a full record set.
///
/// Writes replace whatever the target held before; there is no append.
pub trait RecordTarget<R>: Send + Sync {
    /// Replace the target's contents with `records`, returning the number written
    fn write_all(&self, records: &[R]) -> Result<usize>;

    /// Read back the full record set
    fn read_all(&self) -> Result<Vec<R>>;

    /// Human-readable location for logs
    fn describe(&self) -> String;
}

/// A record type with a fixed column layout
pub trait TabularRecord {
    /// Column names in serialization order
    const FIELDS: &'static [&'static str];
}

/// Delimited text with a header row naming each field.
///
/// Records are written to a temp file in the target's directory and renamed
/// over the destination, so readers never see a partially written file.
pub struct CsvTarget<R> {
    path: PathBuf,
    _record: PhantomData<fn() -> R>,
}

impl<R> CsvTarget<R> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _record: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        }
    }
}

impl<R> RecordTarget<R> for CsvTarget<R>
where
    R: TabularRecord + Serialize + DeserializeOwned,
{
    fn write_all(&self, records: &[R]) -> Result<usize> {
        let dir = self.parent_dir();
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = csv::Writer::from_writer(tmp.as_file_mut());
            // csv only emits the header alongside the first record
            if records.is_empty() {
                writer.write_record(R::FIELDS)?;
            }
            for record in records {
                writer.serialize(record)?;
            }
            writer.flush()?;
        }
        tmp.as_file_mut().sync_all()?;
        tmp.persist(&self.path).map_err(|e| PipelineError::Io(e.error))?;

        debug!("wrote {} records to {}", records.len(), self.path.display());
        Ok(records.len())
    }

    fn read_all(&self) -> Result<Vec<R>> {
        let mut reader = csv::Reader::from_path(&self.path)?;
        let records = reader
            .deserialize()
            .collect::<std::result::Result<Vec<R>, csv::Error>>()?;
        debug!("read {} records from {}", records.len(), self.path.display());
        Ok(records)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory target for tests and dry runs
pub struct InMemoryTarget<R> {
    name: String,
    records: Mutex<Option<Vec<R>>>,
}

impl<R> InMemoryTarget<R> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: Mutex::new(None),
        }
    }

    pub fn with_records(name: impl Into<String>, records: Vec<R>) -> Self {
        Self {
            name: name.into(),
            records: Mutex::new(Some(records)),
        }
    }
}

impl<R> RecordTarget<R> for InMemoryTarget<R>
where
    R: Clone + Send,
{
    fn write_all(&self, records: &[R]) -> Result<usize> {
        let mut slot = self.records.lock().unwrap_or_else(|p| p.into_inner());
        *slot = Some(records.to_vec());
        Ok(records.len())
    }

    fn read_all(&self) -> Result<Vec<R>> {
        let slot = self.records.lock().unwrap_or_else(|p| p.into_inner());
        slot.clone().ok_or_else(|| {
            PipelineError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("target '{}' has not been written", self.name),
            ))
        })
    }

    fn describe(&self) -> String {
        format!("memory:{}", self.name)
    }
}
