//! Warm-up job loading and prepare-only processing.

mod common;

use assert_matches::assert_matches;

use common::{job_body, Call, Harness};
use trikot_core::{JobError, JobState, Outcome};
use trikot_worker::warmup::{load_warmup_body, run_warmup, WarmupError};

#[tokio::test]
async fn local_warmup_job_runs_prepare_only() {
    let h = Harness::new();
    let scratch = tempfile::tempdir().unwrap();
    let path = scratch.path().join("warmup.json");
    std::fs::write(&path, job_body("s3://bucket/warmup.png")).unwrap();

    let outcome = run_warmup(
        path.to_str().unwrap(),
        h.transfer.as_ref(),
        &h.processor,
        scratch.path(),
    )
    .await;

    assert_matches!(
        outcome,
        Some(Outcome::Succeeded { state: JobState::SkippedForWarmup, artifact: None })
    );
    assert_eq!(h.calls.count(|c| *c == Call::EnsureConnected), 1);
    assert_eq!(h.calls.count(|c| *c == Call::Execute), 0);
    assert!(h.calls.publishes().is_empty());
}

#[tokio::test]
async fn remote_warmup_job_is_fetched_outside_the_workspace() {
    let h = Harness::new();
    let scratch = tempfile::tempdir().unwrap();
    h.transfer.payloads.lock().unwrap().insert(
        "s3://config/warmup.json".into(),
        job_body("s3://bucket/warmup.png").into_bytes(),
    );

    let outcome = run_warmup(
        "s3://config/warmup.json",
        h.transfer.as_ref(),
        &h.processor,
        scratch.path(),
    )
    .await;

    assert!(outcome.is_some_and(|o| o.is_success()));
    let fetches = h.calls.fetches();
    assert_eq!(fetches.len(), 1);
    assert_eq!(fetches[0].1, "s3");
    assert!(fetches[0].2.starts_with(scratch.path()));
    assert!(!fetches[0].2.starts_with(h.input_dir()));
}

#[tokio::test]
async fn warmup_scratch_directory_is_removed_afterwards() {
    let h = Harness::new();
    let scratch = tempfile::tempdir().unwrap();
    h.transfer.payloads.lock().unwrap().insert(
        "s3://config/warmup.json".into(),
        job_body("s3://bucket/warmup.png").into_bytes(),
    );

    run_warmup(
        "s3://config/warmup.json",
        h.transfer.as_ref(),
        &h.processor,
        scratch.path(),
    )
    .await;

    assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn missing_warmup_file_is_skipped() {
    let h = Harness::new();
    let scratch = tempfile::tempdir().unwrap();
    let missing = scratch.path().join("nope.json");

    let outcome = run_warmup(
        missing.to_str().unwrap(),
        h.transfer.as_ref(),
        &h.processor,
        scratch.path(),
    )
    .await;

    assert!(outcome.is_none());
    assert!(h.calls.all().is_empty());
}

#[tokio::test]
async fn unsupported_warmup_locator_is_a_fetch_error() {
    let h = Harness::new();
    let scratch = tempfile::tempdir().unwrap();

    let result = load_warmup_body("ftp://host/warmup.json", h.transfer.as_ref(), scratch.path()).await;

    assert_matches!(result, Err(WarmupError::Fetch(_)));
}

#[tokio::test]
async fn malformed_warmup_job_reports_failure() {
    let h = Harness::new();
    let scratch = tempfile::tempdir().unwrap();
    let path = scratch.path().join("warmup.json");
    std::fs::write(&path, r#"{"workflow": {}}"#).unwrap();

    let outcome = run_warmup(
        path.to_str().unwrap(),
        h.transfer.as_ref(),
        &h.processor,
        scratch.path(),
    )
    .await;

    assert_matches!(
        outcome,
        Some(Outcome::Failed { error: JobError::Malformed(_), .. })
    );
}
