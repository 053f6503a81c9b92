//! dicomesh store - persistence ports and filesystem adapters
//!
//! This crate defines repository ports for conversion results and per-job
//! records, and implements them on top of the job directory layout.

pub mod annotations;
pub mod migrate;
pub mod ports;
pub mod records;
pub mod registry;
pub mod results;
pub mod snapshots;

pub use annotations::FsAnnotationStore;
pub use ports::{JobRecordRepository, LoadOutcome, ResultRepository};
pub use registry::JobRegistry;
pub use results::FsResultStore;
pub use snapshots::FsSnapshotStore;
