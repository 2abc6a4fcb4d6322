//! Happy-path job lifecycle tests.

use std::sync::Arc;

use tokio::fs;

use vshard_coordinator::CoordinatorError;
use vshard_models::{EncodeAttributes, JobEvent, MemberEvent, MemberStatus, SubmitRequest};

use super::fakes::{
    start_with, start_with_workers, test_config, FakeSplitMerge, NoisyRouter, ScriptedTranscoder,
};

fn request() -> SubmitRequest {
    SubmitRequest::new("/videos/source.mp4", EncodeAttributes::new("mp4", "mkv"))
}

/// Expected merge output for `units` parts in numeric order.
fn merged(units: usize) -> String {
    (0..units).map(|n| format!("part-{};", n)).collect()
}

#[tokio::test]
async fn test_job_completes_in_numeric_order() {
    let transcoder = Arc::new(ScriptedTranscoder::default());
    let harness = start_with_workers(test_config, 12, 3, transcoder.clone());

    let mut job = harness
        .coordinator
        .submit(request())
        .await
        .expect("Failed to submit");

    let mut progress = Vec::new();
    let terminal = loop {
        match job.events.recv().await.expect("event stream closed early") {
            JobEvent::Progress {
                completed, total, ..
            } => progress.push((completed, total)),
            other => break other,
        }
    };

    let JobEvent::Complete {
        job_id,
        artifact_path,
    } = terminal
    else {
        panic!("expected completion");
    };
    assert_eq!(job_id, job.job_id);
    assert_eq!(progress.len(), 12);
    assert_eq!(progress.last(), Some(&(12, 12)));

    assert_eq!(
        artifact_path,
        harness.layout().receive_dir(&job.job_id).join("result.mkv")
    );
    let content = fs::read_to_string(&artifact_path).await.unwrap();
    assert_eq!(content, merged(12));
    assert!(!harness.layout().source_dir(&job.job_id).exists());
    assert_eq!(transcoder.calls(), 12);

    // One terminal event, then the stream closes
    assert!(job.events.recv().await.is_none());

    let status = harness.coordinator.status().await.unwrap();
    assert_eq!(status.metrics.jobs_completed, 1);
    assert_eq!(status.metrics.jobs_failed, 0);
    assert_eq!(status.metrics.active_jobs, 0);
    assert_eq!(status.metrics.outstanding_units, 0);
}

#[tokio::test]
async fn test_custom_output_file_name() {
    let harness = start_with_workers(test_config, 3, 1, Arc::new(ScriptedTranscoder::default()));

    let mut job = harness
        .coordinator
        .submit(request().with_output_file_name("movie.mkv"))
        .await
        .unwrap();

    match job.wait().await {
        Some(JobEvent::Complete { artifact_path, .. }) => {
            assert!(artifact_path.ends_with("movie.mkv"));
        }
        other => panic!("expected completion, got {:?}", other),
    }
}

#[tokio::test]
async fn test_concurrent_jobs_stay_separate() {
    let harness = start_with_workers(test_config, 5, 2, Arc::new(ScriptedTranscoder::default()));

    let mut first = harness.coordinator.submit(request()).await.unwrap();
    let mut second = harness.coordinator.submit(request()).await.unwrap();
    assert_ne!(first.job_id, second.job_id);

    for job in [&mut first, &mut second] {
        match job.wait().await {
            Some(JobEvent::Complete { artifact_path, .. }) => {
                assert_eq!(fs::read_to_string(artifact_path).await.unwrap(), merged(5));
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    let status = harness.coordinator.status().await.unwrap();
    assert_eq!(status.metrics.jobs_completed, 2);
}

#[tokio::test]
async fn test_duplicate_and_malformed_results_are_dropped() {
    let harness = start_with(
        |root| Arc::new(FakeSplitMerge::new(root, 6)),
        Arc::new(NoisyRouter),
    );

    let mut job = harness.coordinator.submit(request()).await.unwrap();

    let mut completed = 0;
    let terminal = loop {
        match job.events.recv().await.expect("event stream closed early") {
            JobEvent::Progress { .. } => completed += 1,
            other => break other,
        }
    };

    assert_eq!(completed, 6);
    let JobEvent::Complete { artifact_path, .. } = terminal else {
        panic!("expected completion");
    };
    assert_eq!(fs::read_to_string(artifact_path).await.unwrap(), merged(6));
    assert!(job.events.recv().await.is_none());

    // Nothing was persisted for the unknown job
    let stranger = harness
        .layout()
        .receive_dir(&vshard_models::JobId::from_string("stranger"));
    assert!(!stranger.exists());
}

#[tokio::test]
async fn test_invalid_requests_rejected() {
    let harness = start_with_workers(test_config, 1, 1, Arc::new(ScriptedTranscoder::default()));

    let err = harness
        .coordinator
        .submit(SubmitRequest::new("/videos/a.mp4", EncodeAttributes::new("mp4", "")))
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::InvalidRequest(_)));

    let err = harness
        .coordinator
        .submit(SubmitRequest::new("", EncodeAttributes::new("mp4", "mkv")))
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_status_reflects_membership() {
    let harness = start_with_workers(test_config, 1, 1, Arc::new(ScriptedTranscoder::default()));
    let coordinator = &harness.coordinator;

    coordinator
        .membership_event(MemberEvent::Up { node: "node-a".into() })
        .unwrap();
    coordinator
        .membership_event(MemberEvent::Up { node: "node-b".into() })
        .unwrap();
    coordinator
        .membership_event(MemberEvent::Unreachable { node: "node-b".into() })
        .unwrap();
    coordinator
        .membership_event(MemberEvent::LoadChanged {
            node: "node-a".into(),
            load: 0.5,
        })
        .unwrap();

    let status = coordinator.status().await.unwrap();
    assert_eq!(status.cluster.up_count(), 1);
    assert_eq!(
        status.cluster.members["node-b"].status,
        MemberStatus::Unreachable
    );
    assert_eq!(status.cluster.members["node-a"].load, Some(0.5));
    assert_eq!(status.metrics.service_time_estimate, 300.0);
}
