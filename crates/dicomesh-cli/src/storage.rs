use dicomesh_core::config::LayeredConfig;
use dicomesh_core::{ConversionRunner, IngestEngine, JobStore};
use dicomesh_store::{FsAnnotationStore, FsResultStore, FsSnapshotStore, JobRegistry};

/// Every service a command needs, wired from one configuration
pub struct Storage {
    pub ingest: IngestEngine,
    pub runner: ConversionRunner,
    pub results: JobRegistry<FsResultStore>,
    pub annotations: FsAnnotationStore,
    pub snapshots: FsSnapshotStore,
}

impl Storage {
    pub fn from_config(config: &LayeredConfig) -> Self {
        let jobs = JobStore::from_config(config);
        let root = jobs.conversions_root().to_path_buf();

        Self {
            ingest: IngestEngine::new(jobs),
            runner: ConversionRunner::from_config(config),
            results: JobRegistry::new(FsResultStore::new(root.clone())),
            annotations: FsAnnotationStore::new(root.clone()),
            snapshots: FsSnapshotStore::new(root),
        }
    }

    pub fn jobs(&self) -> &JobStore {
        self.ingest.jobs()
    }
}
