//! dicomesh core - domain models, staging, and conversion runs
//!
//! This crate stages DICOM inputs into per-job directories, runs the external
//! mesh extraction tool against them, and records the outcome on disk.

pub mod config;
pub mod error;
pub mod ingest;
pub mod jobs;
pub mod models;
pub mod paths;
pub mod persist;
pub mod runner;

pub use error::{DicomeshError, ErrorCategory, Result};
pub use ingest::{IngestEngine, UploadedFile};
pub use jobs::{JobStore, SampleSeries, ToolLocator};
pub use runner::ConversionRunner;
