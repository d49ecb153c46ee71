//! End-to-end scenarios against a live SSH target, gated behind
//! `TEJ_DESTINATION` exactly as the original functional test harness was
//! (`tests/functional.py`). Not run by default: `cargo test -- --ignored`
//! with `TEJ_DESTINATION` set to an SSH destination the test runner can
//! reach with key-based auth and no interactive prompts.

use std::path::Path;

use tej::{Destination, Error, JobStatus, RemoteQueue};

fn destination() -> Option<String> {
    std::env::var("TEJ_DESTINATION").ok()
}

#[tokio::test]
#[ignore = "requires a live SSH target named by TEJ_DESTINATION"]
async fn setup_then_duplicate_setup_fails() {
    let destination = Destination::parse(&destination().expect("TEJ_DESTINATION not set")).unwrap();
    let queue = RemoteQueue::connect(destination.clone(), "~/.tej-functional-test".to_string())
        .await
        .unwrap();

    queue.setup(&tej::SetupOptions::default()).await.unwrap();

    let err = queue
        .setup(&tej::SetupOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::QueueExists(_)));
}

#[tokio::test]
#[ignore = "requires a live SSH target named by TEJ_DESTINATION"]
async fn status_on_unknown_job_is_not_found() {
    let destination = Destination::parse(&destination().expect("TEJ_DESTINATION not set")).unwrap();
    let queue = RemoteQueue::connect(destination, "~/.tej-functional-test".to_string())
        .await
        .unwrap();

    let job_id = tej::JobId::validate("nonexistent").unwrap();
    let err = queue.status(&job_id).await.unwrap_err();
    assert!(matches!(err, Error::JobNotFound));
}

#[tokio::test]
#[ignore = "requires a live SSH target named by TEJ_DESTINATION"]
async fn submit_status_kill_delete_lifecycle() {
    let destination = Destination::parse(&destination().expect("TEJ_DESTINATION not set")).unwrap();
    let queue = RemoteQueue::connect(destination, "~/.tej-functional-test".to_string())
        .await
        .unwrap();

    let job_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/sleepy_job");
    let job_id = queue.submit(None, &job_dir, "start.sh").await.unwrap();

    let (status, _) = queue.status(&job_id).await.unwrap();
    assert_eq!(status, JobStatus::Running);

    let err = queue.delete(&job_id).await.unwrap_err();
    assert!(matches!(err, Error::JobStillRunning));

    queue.kill(&job_id).await.unwrap();
    queue.delete(&job_id).await.unwrap();

    let err = queue.status(&job_id).await.unwrap_err();
    assert!(matches!(err, Error::JobNotFound));
}
