use crate::core::header::Header;
use crate::core::interval::IntervalSet;
use crate::core::record::Record;
use crate::source::{check_partition, NativeRecords, RecordSource, SourceError};

/// A record source backed by records already in memory
#[derive(Debug, Clone)]
pub struct InMemorySource {
    header: Header,
    records: Vec<Record>,
}

impl InMemorySource {
    #[must_use]
    pub fn new(header: Header, records: Vec<Record>) -> Self {
        Self { header, records }
    }

    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }
}

impl RecordSource for InMemorySource {
    type Native = Record;

    fn location(&self) -> String {
        format!("memory ({} records)", self.records.len())
    }

    fn header(&self) -> Result<Header, SourceError> {
        Ok(self.header.clone())
    }

    fn partition<'a>(
        &'a self,
        _header: &'a Header,
        intervals: &'a IntervalSet,
        index: usize,
    ) -> Result<NativeRecords<'a, Record>, SourceError> {
        check_partition(intervals, index)?;

        let claimed = self.records.iter().filter(move |record| {
            record
                .span()
                .is_some_and(|span| intervals.claims(index, &span.contig, span.start, span.end))
        });
        Ok(Box::new(claimed.cloned().map(Ok)))
    }
}
