//! Unit failure, timeout and redispatch tests.

use std::sync::Arc;
use std::time::Duration;

use vshard_coordinator::{CoordinatorConfig, FailurePolicy, TrackerConfig};
use vshard_models::{EncodeAttributes, JobEvent, SubmitRequest};

use super::fakes::{
    eventually, start_with, start_with_workers, test_config, FakeSplitMerge, Script,
    ScriptedTranscoder, StallingRouter,
};

fn request() -> SubmitRequest {
    SubmitRequest::new("/videos/source.mp4", EncodeAttributes::new("mp4", "mkv"))
}

fn redispatch_config(max_attempts: u32) -> impl FnOnce(&tempfile::TempDir) -> CoordinatorConfig {
    move |dir: &tempfile::TempDir| CoordinatorConfig {
        failure_policy: FailurePolicy::Redispatch { max_attempts },
        ..test_config(dir)
    }
}

#[tokio::test]
async fn test_unit_failure_fails_job_once() {
    let transcoder = Arc::new(
        ScriptedTranscoder::default()
            .with_script(2, Script::Fail("Unknown encoder 'libbogus'\n".into())),
    );
    let harness = start_with_workers(test_config, 8, 2, transcoder);

    let mut job = harness.coordinator.submit(request()).await.unwrap();

    match job.wait().await {
        Some(JobEvent::Failed { reason, .. }) => {
            assert_eq!(reason, "Unknown encoder 'libbogus'\n");
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(job.wait().await, None);

    let layout = harness.layout();
    let job_id = job.job_id.clone();
    assert!(
        eventually(|| {
            !layout.source_dir(&job_id).exists() && !layout.receive_dir(&job_id).exists()
        })
        .await,
        "failed job scratch directories were not removed"
    );

    let status = harness.coordinator.status().await.unwrap();
    assert_eq!(status.metrics.jobs_failed, 1);
    assert_eq!(status.metrics.jobs_completed, 0);
    assert_eq!(status.metrics.active_jobs, 0);
}

#[tokio::test]
async fn test_cleanup_can_be_disabled() {
    let transcoder = Arc::new(
        ScriptedTranscoder::default().with_script(0, Script::Fail("boom".into())),
    );
    let harness = start_with_workers(
        |dir| CoordinatorConfig {
            cleanup_failed_jobs: false,
            ..test_config(dir)
        },
        2,
        1,
        transcoder,
    );

    let mut job = harness.coordinator.submit(request()).await.unwrap();
    assert!(matches!(job.wait().await, Some(JobEvent::Failed { .. })));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(harness.layout().source_dir(&job.job_id).exists());
}

#[tokio::test]
async fn test_timeout_fails_job() {
    let transcoder = Arc::new(ScriptedTranscoder::default().with_script(1, Script::Hang));
    let harness = start_with_workers(
        |dir| CoordinatorConfig {
            tracker: TrackerConfig {
                tick_interval: Duration::from_millis(10),
                default_service_time: 5.0,
                timeout_multiplier: 2.0,
                history_capacity: 100,
            },
            ..test_config(dir)
        },
        4,
        2,
        transcoder,
    );

    let mut job = harness.coordinator.submit(request()).await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), job.wait())
        .await
        .expect("timeout was never detected");
    match event {
        Some(JobEvent::Failed { reason, .. }) => {
            assert!(reason.starts_with("Part timed out: "), "reason: {}", reason);
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_redispatch_recovers_from_transient_failure() {
    let transcoder = Arc::new(
        ScriptedTranscoder::default().with_script(3, Script::FailOnce("Conversion failed!\n".into())),
    );
    let harness = start_with_workers(redispatch_config(3), 6, 2, transcoder.clone());

    let mut job = harness.coordinator.submit(request()).await.unwrap();

    match job.wait().await {
        Some(JobEvent::Complete { artifact_path, .. }) => {
            let content = tokio::fs::read_to_string(artifact_path).await.unwrap();
            let expected: String = (0..6).map(|n| format!("part-{};", n)).collect();
            assert_eq!(content, expected);
        }
        other => panic!("expected completion, got {:?}", other),
    }
    assert_eq!(transcoder.calls(), 7);
}

#[tokio::test]
async fn test_redispatch_gives_up_after_max_attempts() {
    let transcoder = Arc::new(
        ScriptedTranscoder::default().with_script(0, Script::Fail("Invalid data found\n".into())),
    );
    let harness = start_with_workers(redispatch_config(2), 3, 2, transcoder.clone());

    let mut job = harness.coordinator.submit(request()).await.unwrap();

    match job.wait().await {
        Some(JobEvent::Failed { reason, .. }) => {
            assert!(reason.contains("after 2 attempts"), "reason: {}", reason);
            assert!(reason.contains("Invalid data found"));
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_split_failure_reports_stderr() {
    let harness = start_with(
        |root| Arc::new(FakeSplitMerge::failing_split(root, "moov atom not found\n")),
        Arc::new(vshard_coordinator::RoundRobinRouter::new(Vec::new())),
    );

    let mut job = harness.coordinator.submit(request()).await.unwrap();
    assert_eq!(
        job.wait().await,
        Some(JobEvent::Failed {
            job_id: job.job_id.clone(),
            reason: "moov atom not found\n".into(),
        })
    );
}

#[tokio::test]
async fn test_split_without_units_fails() {
    let harness = start_with(
        |root| Arc::new(FakeSplitMerge::new(root, 0)),
        Arc::new(vshard_coordinator::RoundRobinRouter::new(Vec::new())),
    );

    let mut job = harness.coordinator.submit(request()).await.unwrap();
    match job.wait().await {
        Some(JobEvent::Failed { reason, .. }) => assert_eq!(reason, "Split produced no units"),
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_undeliverable_units_time_out() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = CoordinatorConfig {
        tracker: TrackerConfig {
            tick_interval: Duration::from_millis(5),
            default_service_time: 4.0,
            timeout_multiplier: 1.0,
            history_capacity: 10,
        },
        ..test_config(&dir)
    };
    let executor = Arc::new(FakeSplitMerge::new(&config.scratch_root, 2));
    let coordinator = vshard_coordinator::Coordinator::spawn(
        config,
        executor,
        Arc::new(vshard_coordinator::RoundRobinRouter::new(Vec::new())),
    );

    let mut job = coordinator.submit(request()).await.unwrap();
    let event = tokio::time::timeout(Duration::from_secs(5), job.wait())
        .await
        .expect("undeliverable unit never timed out");
    match event {
        Some(JobEvent::Failed { reason, .. }) => assert!(reason.starts_with("Part timed out: ")),
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_failed_job_stops_dispatch_and_tracking() {
    let router = Arc::new(StallingRouter::new(Duration::from_millis(50)));
    let harness = start_with(|root| Arc::new(FakeSplitMerge::new(root, 4)), router.clone());

    let mut job = harness.coordinator.submit(request()).await.unwrap();
    match job.wait().await {
        Some(JobEvent::Failed { reason, .. }) => {
            assert_eq!(reason, "Invalid data found when processing input\n");
        }
        other => panic!("expected failure, got {:?}", other),
    }

    // Long enough for a surviving batch to register and send the rest
    tokio::time::sleep(Duration::from_millis(300)).await;

    let status = harness.coordinator.status().await.unwrap();
    assert_eq!(status.metrics.active_jobs, 0);
    assert_eq!(status.metrics.outstanding_units, 0);
    assert_eq!(status.metrics.tracked_units, 0);
    assert_eq!(router.dispatched(), 1);
}
