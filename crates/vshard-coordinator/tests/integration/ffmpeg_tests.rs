//! End-to-end tests against a real FFmpeg.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use vshard_coordinator::{Coordinator, RoundRobinRouter};
use vshard_media::{FfmpegSplitMerge, FfmpegTranscoder, MediaConfig};
use vshard_models::{EncodeAttributes, JobEvent, SubmitRequest};
use vshard_worker::{Worker, WorkerConfig};

use super::fakes::test_config;

async fn generate_source(path: &Path) {
    let status = tokio::process::Command::new("ffmpeg")
        .args(["-y", "-v", "error", "-f", "lavfi", "-i", "testsrc=duration=6:size=160x120:rate=10"])
        .args(["-c:v", "mpeg4", "-g", "10"])
        .arg(path)
        .status()
        .await
        .expect("Failed to run ffmpeg");
    assert!(status.success(), "could not generate test source");
}

/// Split, transcode on two workers and merge a generated clip.
#[tokio::test]
#[ignore = "requires ffmpeg"]
async fn test_ffmpeg_round_trip() {
    let dir = tempfile::TempDir::new().unwrap();
    let source = dir.path().join("source.mp4");
    generate_source(&source).await;

    let config = test_config(&dir);
    let media_config = MediaConfig {
        scratch_root: config.scratch_root.clone(),
        tool_timeout_secs: Some(60),
        ..MediaConfig::default()
    };
    let transcoder = Arc::new(FfmpegTranscoder::new(&media_config));
    let workers = (0..2)
        .map(|i| {
            Worker::spawn(
                format!("ffmpeg-{}", i),
                WorkerConfig {
                    scratch_dir: dir.path().join("workers"),
                    max_ffmpeg_processes: 1,
                },
                transcoder.clone(),
            )
        })
        .collect();

    let coordinator = Coordinator::spawn(
        config,
        Arc::new(FfmpegSplitMerge::new(&media_config)),
        Arc::new(RoundRobinRouter::new(workers)),
    );

    let attributes = EncodeAttributes::new("mp4", "mkv")
        .with_param("c:v", "mpeg4")
        .with_param("q:v", "5")
        .with_segment_secs(2);
    let mut job = coordinator
        .submit(SubmitRequest::new(&source, attributes))
        .await
        .expect("Failed to submit");

    let event = tokio::time::timeout(Duration::from_secs(120), job.wait())
        .await
        .expect("job did not finish");
    match event {
        Some(JobEvent::Complete { artifact_path, .. }) => {
            let meta = tokio::fs::metadata(&artifact_path).await.unwrap();
            assert!(meta.len() > 0);
            println!("Merged artifact: {}", artifact_path.display());
        }
        other => panic!("expected completion, got {:?}", other),
    }
}
