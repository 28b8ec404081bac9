//! Record sources: where reads and the shared header come from.
//!
//! A [`RecordSource`] yields one [`Header`] and, per partition of an
//! [`IntervalSet`], the native records that partition claims. Partitions are
//! disjoint (a record belongs to the first interval it overlaps), so workers
//! can read them concurrently without coordination. Native records become
//! pipeline [`Record`]s through [`NativeRecord::into_record`].

pub mod memory;
pub mod sam;

use thiserror::Error;

use crate::core::header::Header;
use crate::core::interval::IntervalSet;
use crate::core::record::Record;
use crate::parsing::sam::ParseError;

pub use memory::InMemorySource;
pub use sam::AlignmentFileSource;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read header: {0}")]
    Header(#[from] ParseError),

    #[error("noodles error: {0}")]
    Noodles(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Partition {index} does not exist ({count} intervals)")]
    NoSuchPartition { index: usize, count: usize },
}

/// Lazily produced native records of one partition
pub type NativeRecords<'a, N> = Box<dyn Iterator<Item = Result<N, SourceError>> + Send + 'a>;

/// Conversion from a source's native representation into a pipeline record
pub trait NativeRecord: Send + 'static {
    /// # Errors
    ///
    /// Returns `SourceError::InvalidRecord` when the native record cannot be
    /// represented (e.g. it references a contig missing from `header`).
    fn into_record(self, header: &Header) -> Result<Record, SourceError>;
}

impl NativeRecord for Record {
    fn into_record(self, _header: &Header) -> Result<Record, SourceError> {
        Ok(self)
    }
}

/// Supplier of the header and the partitioned record stream.
///
/// Each call to [`RecordSource::partition`] restarts that partition from its
/// beginning.
pub trait RecordSource: Send + Sync + 'static {
    type Native: NativeRecord;

    /// Human-readable location, for logging
    fn location(&self) -> String;

    /// # Errors
    ///
    /// Returns a `SourceError` if the header cannot be read.
    fn header(&self) -> Result<Header, SourceError>;

    /// Native records claimed by partition `index` of `intervals`
    ///
    /// # Errors
    ///
    /// Returns a `SourceError` if the partition cannot be opened; errors on
    /// individual records are yielded by the iterator.
    fn partition<'a>(
        &'a self,
        header: &'a Header,
        intervals: &'a IntervalSet,
        index: usize,
    ) -> Result<NativeRecords<'a, Self::Native>, SourceError>;
}

pub(crate) fn check_partition(intervals: &IntervalSet, index: usize) -> Result<(), SourceError> {
    if index >= intervals.len() {
        return Err(SourceError::NoSuchPartition {
            index,
            count: intervals.len(),
        });
    }
    Ok(())
}
