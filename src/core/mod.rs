//! Core data types for the preprocessing pipeline.
//!
//! This module provides the fundamental types used throughout the library:
//!
//! - [`Contig`]: A single sequence with name, length, and optional MD5
//! - [`Header`]: The sequence dictionary and read groups shared by every stage
//! - [`Record`]: One read, carrying its duplicate flag and recalibration payload
//! - [`Cigar`]: How a read's bases align to the reference
//! - [`GenomicInterval`], [`IntervalSet`]: The scope of records a run processes
//! - [`Context`]: Reference bases and known variant sites joined onto a read
//! - [`RecalibrationModel`]: The single correction artifact of a run
//!
//! ## Coordinates
//!
//! All positions are 1-based and intervals are closed, matching SAM and the
//! `chr1:100-200` interval syntax.
//!
//! [`Contig`]: contig::Contig
//! [`Header`]: header::Header
//! [`Record`]: record::Record
//! [`Cigar`]: cigar::Cigar
//! [`GenomicInterval`]: interval::GenomicInterval
//! [`IntervalSet`]: interval::IntervalSet
//! [`Context`]: context::Context
//! [`RecalibrationModel`]: model::RecalibrationModel

pub mod cigar;
pub mod context;
pub mod contig;
pub mod header;
pub mod interval;
pub mod model;
pub mod record;
