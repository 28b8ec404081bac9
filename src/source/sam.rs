//! SAM/BAM record source built on noodles.
//!
//! A BAM with an index next to it (`<file>.bai` or `<file>.csi`) is read by
//! region: each partition queries only its own interval. Anything else is
//! read in one sequential pass that routes every record to the partition
//! claiming it; partitions then take their bucket from that pass.

use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use noodles::core::{Position, Region};
use noodles::sam::alignment::record::cigar::op::Kind;
use noodles::sam::alignment::record::data::field::Tag;
use noodles::sam::alignment::record_buf::data::field::Value;
use noodles::sam::alignment::RecordBuf;
use tracing::debug;

use crate::core::cigar::{Cigar, CigarKind, CigarOp};
use crate::core::header::Header;
use crate::core::interval::IntervalSet;
use crate::core::record::{Record, Strand};
use crate::parsing::sam::{parse_file, AlignmentFormat};
use crate::source::{check_partition, NativeRecord, NativeRecords, RecordSource, SourceError};

type ReadNext = Box<dyn FnMut(&mut RecordBuf) -> io::Result<usize> + Send>;

/// Records of one sequential pass, bucketed by claiming partition.
///
/// A bucket is `None` once its partition has taken it.
#[derive(Debug)]
struct RoutedPass {
    intervals: IntervalSet,
    buckets: Vec<Option<Vec<RecordBuf>>>,
}

/// Reads records from a SAM or BAM file.
///
/// Unmapped records, and records whose aligned span is claimed by another
/// partition, are never yielded.
#[derive(Debug)]
pub struct AlignmentFileSource {
    path: PathBuf,
    format: AlignmentFormat,
    index: Option<PathBuf>,
    routed: Mutex<Option<RoutedPass>>,
    passes: AtomicU64,
}

impl AlignmentFileSource {
    /// # Errors
    ///
    /// Returns `SourceError::Header` if the extension is not a supported alignment format.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, SourceError> {
        let path = path.into();
        let format = AlignmentFormat::from_path(&path)?;
        let index = match format {
            AlignmentFormat::Bam => find_index(&path),
            AlignmentFormat::Sam => None,
        };
        if let Some(index) = &index {
            debug!(index = %index.display(), "Using alignment index");
        }
        Ok(Self {
            path,
            format,
            index,
            routed: Mutex::new(None),
            passes: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether partitions are read through a BAM index
    #[must_use]
    pub fn is_indexed(&self) -> bool {
        self.index.is_some()
    }

    /// Number of sequential passes made over the whole file so far
    #[must_use]
    pub fn full_passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    fn open(&self) -> Result<ReadNext, SourceError> {
        use noodles::{bam, sam};

        let file = std::fs::File::open(&self.path)?;
        match self.format {
            AlignmentFormat::Sam => {
                let mut reader = sam::io::Reader::new(BufReader::new(file));
                let header = reader
                    .read_header()
                    .map_err(|e| SourceError::Noodles(e.to_string()))?;
                Ok(Box::new(move |record: &mut RecordBuf| {
                    reader.read_record_buf(&header, record)
                }))
            }
            AlignmentFormat::Bam => {
                let mut reader = bam::io::Reader::new(file);
                let header = reader
                    .read_header()
                    .map_err(|e| SourceError::Noodles(e.to_string()))?;
                Ok(Box::new(move |record: &mut RecordBuf| {
                    reader.read_record_buf(&header, record)
                }))
            }
        }
    }

    /// Records of partition `index`, read through the BAM index
    fn query(
        &self,
        header: &Header,
        intervals: &IntervalSet,
        index: usize,
    ) -> Result<Vec<RecordBuf>, SourceError> {
        use noodles::bam;

        let interval = intervals.get(index).ok_or(SourceError::NoSuchPartition {
            index,
            count: intervals.len(),
        })?;
        let start = to_position(interval.start)?;
        let end = to_position(interval.end)?;
        let region = Region::new(interval.contig.clone(), start..=end);

        let mut reader = bam::io::indexed_reader::Builder::default().build_from_path(&self.path)?;
        let sam_header = reader
            .read_header()
            .map_err(|e| SourceError::Noodles(e.to_string()))?;

        let mut overlapping: u64 = 0;
        let mut records = Vec::new();
        for result in reader.query(&sam_header, &region)? {
            let record = RecordBuf::try_from_alignment_record(&sam_header, &result?)?;
            overlapping += 1;
            if claimant(&record, header, intervals) == Some(index) {
                records.push(record);
            }
        }

        debug!(
            partition = index,
            region = %interval,
            overlapping,
            claimed = records.len(),
            "Queried alignment index"
        );
        Ok(records)
    }

    /// Takes partition `index` from the routed pass, making a new pass when
    /// there is none for `intervals` or the bucket was already taken
    fn take_routed(
        &self,
        header: &Header,
        intervals: &IntervalSet,
        index: usize,
    ) -> Result<Vec<RecordBuf>, SourceError> {
        let mut routed = self.routed.lock().unwrap_or_else(PoisonError::into_inner);

        let reusable = matches!(
            routed.as_ref(),
            Some(pass) if pass.intervals == *intervals
                && pass.buckets.get(index).is_some_and(Option::is_some)
        );
        if !reusable {
            *routed = Some(RoutedPass {
                intervals: intervals.clone(),
                buckets: self.route(header, intervals)?,
            });
        }

        let Some(pass) = routed.as_mut() else {
            return Ok(Vec::new());
        };
        let records = pass
            .buckets
            .get_mut(index)
            .and_then(Option::take)
            .unwrap_or_default();
        if pass.buckets.iter().all(Option::is_none) {
            *routed = None;
        }
        Ok(records)
    }

    fn route(
        &self,
        header: &Header,
        intervals: &IntervalSet,
    ) -> Result<Vec<Option<Vec<RecordBuf>>>, SourceError> {
        let mut read_next = self.open()?;
        let mut buckets: Vec<Option<Vec<RecordBuf>>> =
            (0..intervals.len()).map(|_| Some(Vec::new())).collect();
        let mut scanned: u64 = 0;

        loop {
            let mut record = RecordBuf::default();
            if read_next(&mut record)? == 0 {
                break;
            }
            scanned += 1;
            if let Some(bucket) = claimant(&record, header, intervals)
                .and_then(|i| buckets.get_mut(i))
                .and_then(Option::as_mut)
            {
                bucket.push(record);
            }
        }

        let passes = self.passes.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(
            path = %self.path.display(),
            scanned,
            partitions = intervals.len(),
            passes,
            "Routed alignment file"
        );
        Ok(buckets)
    }
}

impl RecordSource for AlignmentFileSource {
    type Native = RecordBuf;

    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn header(&self) -> Result<Header, SourceError> {
        Ok(parse_file(&self.path)?)
    }

    fn partition<'a>(
        &'a self,
        header: &'a Header,
        intervals: &'a IntervalSet,
        index: usize,
    ) -> Result<NativeRecords<'a, RecordBuf>, SourceError> {
        check_partition(intervals, index)?;

        let records = if self.is_indexed() {
            self.query(header, intervals, index)?
        } else {
            self.take_routed(header, intervals, index)?
        };

        Ok(Box::new(records.into_iter().map(Ok)))
    }
}

/// `<path>.bai`, then `<path>.csi`
fn find_index(path: &Path) -> Option<PathBuf> {
    ["bai", "csi"].into_iter().find_map(|ext| {
        let mut candidate = path.as_os_str().to_owned();
        candidate.push(".");
        candidate.push(ext);
        let candidate = PathBuf::from(candidate);
        candidate.is_file().then_some(candidate)
    })
}

fn to_position(n: u64) -> Result<Position, SourceError> {
    usize::try_from(n)
        .ok()
        .and_then(Position::new)
        .ok_or_else(|| SourceError::Noodles(format!("invalid position {n}")))
}

/// Partition owning a record, or `None` for unmapped records and records
/// outside every interval
fn claimant(record: &RecordBuf, header: &Header, intervals: &IntervalSet) -> Option<usize> {
    if record.flags().is_unmapped() {
        return None;
    }
    let contig = header.contigs.get(record.reference_sequence_id()?)?;
    let start = record.alignment_start()?.get() as u64;
    let end = record.alignment_end().map_or(start, |p| p.get() as u64);
    intervals.claimant(&contig.name, start, end.max(start))
}

fn cigar_kind(kind: Kind) -> CigarKind {
    match kind {
        Kind::Match => CigarKind::Match,
        Kind::Insertion => CigarKind::Insertion,
        Kind::Deletion => CigarKind::Deletion,
        Kind::Skip => CigarKind::Skip,
        Kind::SoftClip => CigarKind::SoftClip,
        Kind::HardClip => CigarKind::HardClip,
        Kind::Pad => CigarKind::Pad,
        Kind::SequenceMatch => CigarKind::SequenceMatch,
        Kind::SequenceMismatch => CigarKind::SequenceMismatch,
    }
}

impl NativeRecord for RecordBuf {
    fn into_record(self, header: &Header) -> Result<Record, SourceError> {
        let name = self
            .name()
            .map(|n| n.to_string())
            .unwrap_or_else(|| "*".to_string());
        let flags = self.flags();

        let contig = match self.reference_sequence_id() {
            Some(id) if !flags.is_unmapped() => {
                let contig = header.contigs.get(id).ok_or_else(|| {
                    SourceError::InvalidRecord(format!(
                        "Record '{name}' references sequence {id}, header has {}",
                        header.contigs.len()
                    ))
                })?;
                Some(contig.name.clone())
            }
            _ => None,
        };

        let mut record = Record::new(
            name,
            self.sequence().as_ref(),
            self.quality_scores().as_ref(),
        );

        if contig.is_some() {
            record.contig = contig;
            record.start = self.alignment_start().map(|p| p.get() as u64);
            record.end = self.alignment_end().map(|p| p.get() as u64);
        }

        let ops: Vec<CigarOp> = self
            .cigar()
            .as_ref()
            .iter()
            .map(|op| CigarOp::new(cigar_kind(op.kind()), op.len()))
            .collect();
        if !ops.is_empty() {
            record.cigar = Some(Cigar::new(ops));
        }

        record.strand = if flags.is_reverse_complemented() {
            Strand::Reverse
        } else {
            Strand::Forward
        };
        record.mapping_quality = self.mapping_quality().map(|mq| mq.get());
        record.flags = flags.bits();
        record.duplicate = flags.is_duplicate();

        if let Some(Value::String(read_group)) = self.data().get(&Tag::READ_GROUP) {
            record.read_group = Some(read_group.to_string());
        }

        Ok(record)
    }
}
