//! Coordinator and tracker configuration.

use std::path::PathBuf;
use std::time::Duration;

/// What to do when a unit fails or times out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Abort the whole job on the first unit failure
    #[default]
    FailFast,
    /// Send the unit to another worker until `max_attempts` dispatches were made
    Redispatch { max_attempts: u32 },
}

impl FailurePolicy {
    /// Parse `fail-fast` / `redispatch`; unknown names fall back to fail-fast.
    pub fn parse(name: &str, max_attempts: u32) -> Self {
        match name.trim().to_lowercase().replace('_', "-").as_str() {
            "redispatch" => Self::Redispatch {
                max_attempts: max_attempts.max(1),
            },
            _ => Self::FailFast,
        }
    }
}

/// Part timeout tracker configuration.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Sweep period; one period is one tick
    pub tick_interval: Duration,
    /// Service-time estimate in ticks before any unit completed
    pub default_service_time: f64,
    /// A unit times out after `estimate * multiplier` ticks
    pub timeout_multiplier: f64,
    /// Completed durations kept for the estimate
    pub history_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            default_service_time: 300.0,
            timeout_multiplier: 3.0,
            history_capacity: 100,
        }
    }
}

impl TrackerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            tick_interval: std::env::var("VSHARD_TICK_MILLIS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.tick_interval),
            default_service_time: std::env::var("VSHARD_DEFAULT_SERVICE_TIME")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|v: &f64| *v > 0.0)
                .unwrap_or(defaults.default_service_time),
            timeout_multiplier: std::env::var("VSHARD_TIMEOUT_MULTIPLIER")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|v: &f64| *v > 0.0)
                .unwrap_or(defaults.timeout_multiplier),
            history_capacity: std::env::var("VSHARD_HISTORY_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.history_capacity),
        }
    }
}

/// Coordinator configuration.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Root of the split/receive scratch layout
    pub scratch_root: PathBuf,
    /// Split segment length unless a job overrides it
    pub segment_secs: u32,
    /// Units per concurrent dispatch batch
    pub dispatch_batch_size: usize,
    /// Reaction to unit failures
    pub failure_policy: FailurePolicy,
    /// Remove scratch directories of failed jobs
    pub cleanup_failed_jobs: bool,
    /// Tracker settings
    pub tracker: TrackerConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            scratch_root: std::env::temp_dir().join("vshard"),
            segment_secs: 30,
            dispatch_batch_size: 4,
            failure_policy: FailurePolicy::FailFast,
            cleanup_failed_jobs: true,
            tracker: TrackerConfig::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let max_attempts = std::env::var("VSHARD_MAX_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3);

        Self {
            scratch_root: std::env::var("VSHARD_SCRATCH_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.scratch_root),
            segment_secs: std::env::var("VSHARD_SEGMENT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.segment_secs),
            dispatch_batch_size: std::env::var("VSHARD_DISPATCH_BATCH")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.dispatch_batch_size),
            failure_policy: std::env::var("VSHARD_FAILURE_POLICY")
                .map(|name| FailurePolicy::parse(&name, max_attempts))
                .unwrap_or_default(),
            cleanup_failed_jobs: std::env::var("VSHARD_CLEANUP_FAILED")
                .map(|v| !matches!(v.to_lowercase().as_str(), "0" | "false" | "no" | "off"))
                .unwrap_or(defaults.cleanup_failed_jobs),
            tracker: TrackerConfig::from_env(),
        }
    }
}
