//! Integration tests driving a full coordinator.

pub mod fakes;

mod failure_tests;
mod ffmpeg_tests;
mod pipeline_tests;
