//! Integration tests for the filesystem repositories

use chrono::Utc;
use dicomesh_core::error::DicomeshError;
use dicomesh_core::models::{
    Annotation, AnnotationKind, ConversionJob, ConversionOptions, ConversionResult, Point3,
    Snapshot, SourceKind, Vector3,
};
use dicomesh_store::{
    FsAnnotationStore, FsResultStore, FsSnapshotStore, JobRecordRepository, ResultRepository,
};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn make_job(root: &Path, job_id: &str) -> ConversionJob {
    let job = ConversionJob::new(job_id, job_id, root.join(job_id), SourceKind::Upload);
    fs::create_dir_all(&job.output_dir).unwrap();
    job
}

fn make_result(job: ConversionJob) -> ConversionResult {
    ConversionResult {
        job,
        options: ConversionOptions::default(),
        success: false,
        exit_code: 1,
        stdout: "out".to_string(),
        stderr: "err".to_string(),
        elapsed_seconds: 0.25,
        completed_at: Utc::now(),
        command: vec!["dicom2stl".to_string(), "--clean".to_string()],
        tool_metadata: BTreeMap::new(),
        cancelled: false,
    }
}

fn set_age(path: &Path, seconds_ago: u64) {
    let when = SystemTime::now() - Duration::from_secs(seconds_ago);
    File::options().write(true).open(path).unwrap().set_modified(when).unwrap();
}

#[test]
fn test_load_recent_orders_and_skips_corrupt() {
    let temp = TempDir::new().unwrap();
    let store = FsResultStore::new(temp.path());

    for (job_id, age) in [("job-a", 300), ("job-b", 200), ("job-c", 100)] {
        let job = make_job(temp.path(), job_id);
        store.save(&make_result(job.clone())).unwrap();
        set_age(&job.output_meta, age);
    }
    let corrupt = make_job(temp.path(), "job-corrupt");
    fs::write(&corrupt.output_meta, "{\"job\": ").unwrap();
    set_age(&corrupt.output_meta, 50);

    let recent = store.load_recent(2).unwrap();
    let ids: Vec<&str> = recent.iter().map(|r| r.job.job_id.as_str()).collect();
    assert_eq!(ids, vec!["job-b", "job-c"]);

    let all = store.load_recent(10).unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].job.job_id, "job-a");
}

#[test]
fn test_load_recent_ignores_staged_jobs_without_results() {
    let temp = TempDir::new().unwrap();
    make_job(temp.path(), "job-staged");

    assert!(FsResultStore::new(temp.path()).load_recent(5).unwrap().is_empty());
    assert!(FsResultStore::new(temp.path().join("absent")).load_recent(5).unwrap().is_empty());
}

#[test]
fn test_result_get_round_trips() {
    let temp = TempDir::new().unwrap();
    let store = FsResultStore::new(temp.path());
    let mut result = make_result(make_job(temp.path(), "job-1"));
    result.elapsed_seconds = 0.1 + 0.2;
    result.tool_metadata.insert("Modality".to_string(), "CT".to_string());
    store.save(&result).unwrap();

    assert_eq!(store.get("job-1").unwrap(), Some(result));
    assert_eq!(store.get("job-2").unwrap(), None);
    assert!(matches!(store.get("../job-1"), Err(DicomeshError::InvalidJobId { .. })));
}

#[test]
fn test_save_for_unknown_job_fails() {
    let temp = TempDir::new().unwrap();
    let annotations = FsAnnotationStore::new(temp.path());
    let marker = Annotation::marker("job-x", Point3::default(), "m", "#fff", "");

    let err = annotations.save("job-x", vec![marker]).unwrap_err();
    assert!(matches!(err, DicomeshError::JobNotFound { .. }));

    let job = ConversionJob::new("job-x", "x", temp.path().join("job-x"), SourceKind::Upload);
    let err = FsResultStore::new(temp.path()).save(&make_result(job)).unwrap_err();
    assert!(matches!(err, DicomeshError::JobNotFound { .. }));
}

#[test]
fn test_annotations_round_trip_and_stay_consistent() {
    let temp = TempDir::new().unwrap();
    make_job(temp.path(), "job-1");
    let store = FsAnnotationStore::new(temp.path());

    let mut arrow = Annotation::arrow(
        "job-1",
        Point3::new(1.0, 1.0, 1.0),
        Vector3::new(9.0, 9.0, 9.0),
        "Break",
        "#ff0000",
        "check",
    );
    if let dicomesh_core::models::AnnotationBody::Arrow { tip_point, .. } = &mut arrow.body {
        *tip_point = Some(Point3::new(2.0, 3.0, 4.0));
    }
    let label = Annotation::label("job-1", Point3::new(0.0, 0.0, 5.0), "Apex", "#ffffff", 24.0);

    store.save("job-1", vec![arrow, label]).unwrap();
    let loaded = store.load("job-1").unwrap();

    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0].arrow_tip(), Some(Point3::new(2.0, 3.0, 4.0)));
    match &loaded[0].body {
        dicomesh_core::models::AnnotationBody::Arrow { direction, .. } => {
            assert_eq!(*direction, Vector3::new(1.0, 2.0, 3.0));
        }
        other => panic!("expected arrow, got {other:?}"),
    }
    assert_eq!(loaded[1].kind(), AnnotationKind::Label);

    let resaved = store.save("job-1", loaded.clone()).unwrap();
    assert_eq!(resaved, loaded);
}

#[test]
fn test_list_all_newest_first_and_explicit_order() {
    let temp = TempDir::new().unwrap();
    let store = FsAnnotationStore::new(temp.path());

    for (job_id, age) in [("job-old", 500), ("job-new", 10)] {
        make_job(temp.path(), job_id);
        let ann = Annotation::marker(job_id, Point3::default(), job_id, "#000000", "");
        store.save(job_id, vec![ann]).unwrap();
        set_age(&store.record_file(job_id).unwrap(), age);
    }
    make_job(temp.path(), "job-corrupt");
    fs::write(store.record_file("job-corrupt").unwrap(), "not json").unwrap();

    let all: Vec<String> = store.list_all(None).unwrap().into_iter().map(|a| a.job_id).collect();
    assert_eq!(all, vec!["job-new".to_string(), "job-old".to_string()]);

    let ids = vec!["job-old".to_string(), "job-missing".to_string(), "job-new".to_string()];
    let listed: Vec<String> = store
        .list_all(Some(&ids))
        .unwrap()
        .into_iter()
        .map(|a| a.job_id)
        .collect();
    assert_eq!(listed, vec!["job-old".to_string(), "job-new".to_string()]);
}

#[test]
fn test_list_all_binds_records_to_their_directory() {
    let temp = TempDir::new().unwrap();
    let job = make_job(temp.path(), "job-1");
    fs::write(
        job.output_dir.join("annotations.json"),
        r#"[{"annotation_id": "a1", "job_id": "job-other", "kind": "marker", "point": {"x": 0, "y": 0, "z": 0}}]"#,
    )
    .unwrap();

    let all = FsAnnotationStore::new(temp.path()).list_all(None).unwrap();
    assert_eq!(all[0].job_id, "job-1");
}

#[test]
fn test_find_and_remove_annotation() {
    let temp = TempDir::new().unwrap();
    make_job(temp.path(), "job-1");
    let store = FsAnnotationStore::new(temp.path());
    let keep = Annotation::marker("job-1", Point3::default(), "keep", "#000000", "");
    let doomed = Annotation::marker("job-1", Point3::default(), "drop", "#000000", "");
    let drop_id = doomed.annotation_id.clone();
    store.save("job-1", vec![keep.clone(), doomed]).unwrap();

    assert_eq!(
        store.find(&drop_id).unwrap().map(|a| a.title().to_string()),
        Some("drop".to_string())
    );
    assert!(store.remove("job-1", &drop_id).unwrap());
    assert!(!store.remove("job-1", &drop_id).unwrap());
    assert_eq!(store.load("job-1").unwrap(), vec![keep]);
    assert!(store.find(&drop_id).unwrap().is_none());
}

#[test]
fn test_snapshots_follow_the_same_contract() {
    let temp = TempDir::new().unwrap();
    let job = make_job(temp.path(), "job-1");
    let store = FsSnapshotStore::new(temp.path());

    let mut orphan =
        Snapshot::from_image("", job.output_mesh.clone(), "a.png", "image/png", "", b"png");
    orphan.snapshot_id = "snap-a".to_string();
    let saved = store.save("job-1", vec![orphan]).unwrap();
    assert_eq!(saved[0].job_id, "job-1");

    fs::write(
        job.output_dir.join("snapshots.json"),
        r#"[{"snapshot_id": "legacy", "source_stl": "mesh.stl", "filename": "b.png",
             "timestamp": 1700000000, "data_base64": "cG5n"}]"#,
    )
    .unwrap();
    let loaded = store.load("job-1").unwrap();
    assert_eq!(loaded[0].job_id, "job-1");
    assert_eq!(loaded[0].image_bytes().unwrap(), b"png".to_vec());
    assert_eq!(store.find("legacy").unwrap().map(|s| s.filename), Some("b.png".to_string()));
    assert!(store.list_all(Some(&["job-1".to_string()])).unwrap().len() == 1);
}

#[test]
fn test_record_paths_reject_traversal() {
    let temp = TempDir::new().unwrap();
    let store = FsSnapshotStore::new(temp.path());

    assert!(matches!(store.load("../etc"), Err(DicomeshError::InvalidJobId { .. })));
    let path: PathBuf = store.record_file(" job-1 ").unwrap();
    assert_eq!(path, temp.path().join("job-1/artifacts/snapshots.json"));
}
