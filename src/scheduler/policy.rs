//! Worker-count policy.
//!
//! Download parallelism is sized from current host load instead of a fixed
//! constant: a CPU sample is taken once per run, the headroom below a target
//! utilization is computed, and the number of idle logical cores is scaled
//! by that headroom.
//!
//! ```text
//! available = max(1, cores - floor(usage * cores / 100))
//! workers   = max(1, floor((target - usage) / 100 * available))
//! ```
//!
//! The thresholds are configuration, not tuned constants; the sampler is
//! injected so the policy can be exercised without real OS metrics.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

/// Default utilization ceiling in percent.
pub const DEFAULT_TARGET_UTILIZATION: f64 = 90.0;

/// Default interval between the two CPU counter readings.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Minimum allowed worker count.
pub const MIN_WORKERS: usize = 1;

/// Maximum allowed worker count.
pub const MAX_WORKERS: usize = 100;

const PROC_STAT_PATH: &str = "/proc/stat";

/// One observation of host load.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuSample {
    /// Busy share of all CPUs over the sampling interval, 0..=100.
    pub utilization_percent: f64,
    /// Logical cores available to this process.
    pub logical_cores: usize,
}

impl CpuSample {
    /// Creates a sample.
    #[must_use]
    pub fn new(utilization_percent: f64, logical_cores: usize) -> Self {
        Self {
            utilization_percent,
            logical_cores,
        }
    }
}

/// Source of [`CpuSample`]s.
#[async_trait]
pub trait CpuSampler: Send + Sync {
    /// Takes one sample. Implementations never fail; they degrade to 0% load.
    async fn sample(&self) -> CpuSample;
}

/// How many fetches may run at once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConcurrencyPolicy {
    /// Size from a CPU sample (see module docs).
    Adaptive {
        /// Utilization ceiling in percent.
        target_utilization: f64,
        /// Optional upper bound on the computed count.
        max_workers: Option<usize>,
    },
    /// Exactly this many workers.
    Fixed(usize),
}

impl Default for ConcurrencyPolicy {
    fn default() -> Self {
        Self::Adaptive {
            target_utilization: DEFAULT_TARGET_UTILIZATION,
            max_workers: None,
        }
    }
}

impl ConcurrencyPolicy {
    /// Computes the worker count for a given sample.
    ///
    /// `Fixed` ignores the sample. `Adaptive` results are clamped to
    /// `MIN_WORKERS..=max_workers.unwrap_or(MAX_WORKERS)`.
    #[must_use]
    pub fn worker_count(&self, sample: &CpuSample) -> usize {
        match *self {
            Self::Fixed(workers) => workers,
            Self::Adaptive {
                target_utilization,
                max_workers,
            } => {
                let ceiling = max_workers.unwrap_or(MAX_WORKERS).clamp(MIN_WORKERS, MAX_WORKERS);
                adaptive_worker_count(target_utilization, sample).min(ceiling)
            }
        }
    }

    /// Samples (only when adaptive) and returns the worker count for this run.
    pub async fn resolve(&self, sampler: &dyn CpuSampler) -> usize {
        match self {
            Self::Fixed(workers) => *workers,
            Self::Adaptive { .. } => {
                let sample = sampler.sample().await;
                let workers = self.worker_count(&sample);
                debug!(
                    utilization = sample.utilization_percent,
                    cores = sample.logical_cores,
                    workers,
                    "worker count from CPU sample"
                );
                workers
            }
        }
    }
}

/// Scales idle cores by the headroom below `target_utilization`; never below 1.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn adaptive_worker_count(target_utilization: f64, sample: &CpuSample) -> usize {
    let cores = sample.logical_cores.max(1) as f64;
    let usage = sample.utilization_percent.clamp(0.0, 100.0);
    let available = (cores - (usage * cores / 100.0).floor()).max(1.0);
    let headroom = ((target_utilization - usage) / 100.0).max(0.0);
    ((headroom * available).floor() as usize).max(MIN_WORKERS)
}

/// Logical cores available to this process (1 if unknown).
#[must_use]
pub fn logical_cores() -> usize {
    std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

/// Sampler returning a constant reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedSampler(pub CpuSample);

#[async_trait]
impl CpuSampler for FixedSampler {
    async fn sample(&self) -> CpuSample {
        self.0
    }
}

/// Linux sampler reading aggregate CPU counters from `/proc/stat`.
///
/// Two readings are taken `interval` apart. Where `/proc/stat` is missing
/// (non-Linux hosts) the sample reports 0% utilization.
#[derive(Debug, Clone)]
pub struct ProcStatSampler {
    path: PathBuf,
    interval: Duration,
}

impl Default for ProcStatSampler {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_INTERVAL)
    }
}

impl ProcStatSampler {
    /// Creates a sampler with the given interval between readings.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            path: PathBuf::from(PROC_STAT_PATH),
            interval,
        }
    }

    /// Reads counters from another file (for tests and containers).
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    async fn read_times(&self) -> Option<CpuTimes> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => parse_proc_stat(&content),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cannot read CPU counters");
                None
            }
        }
    }
}

#[async_trait]
impl CpuSampler for ProcStatSampler {
    async fn sample(&self) -> CpuSample {
        let cores = logical_cores();
        let Some(before) = self.read_times().await else {
            return CpuSample::new(0.0, cores);
        };
        tokio::time::sleep(self.interval).await;
        let Some(after) = self.read_times().await else {
            return CpuSample::new(0.0, cores);
        };
        CpuSample::new(before.utilization_until(&after), cores)
    }
}

/// Aggregate jiffies from the `cpu` line of `/proc/stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CpuTimes {
    idle: u64,
    total: u64,
}

impl CpuTimes {
    /// Busy percentage between two readings; 0 when no time elapsed.
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn utilization_until(&self, later: &CpuTimes) -> f64 {
        let total = later.total.saturating_sub(self.total);
        let idle = later.idle.saturating_sub(self.idle);
        if total == 0 {
            return 0.0;
        }
        (total.saturating_sub(idle) as f64 / total as f64) * 100.0
    }
}

/// Parses the aggregate `cpu` line: user nice system idle iowait irq softirq steal ...
///
/// Guest columns are already included in user/nice and are not summed.
pub(crate) fn parse_proc_stat(content: &str) -> Option<CpuTimes> {
    let line = content
        .lines()
        .find(|line| line.split_whitespace().next() == Some("cpu"))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .take(8)
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    if fields.len() < 4 {
        return None;
    }
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    let total = fields.iter().sum();
    Some(CpuTimes { idle, total })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_adaptive_idle_host_uses_target_share_of_cores() {
        // 8 cores idle: floor(0.9 * 8) = 7
        assert_eq!(adaptive_worker_count(90.0, &CpuSample::new(0.0, 8)), 7);
    }

    #[test]
    fn test_adaptive_scales_by_headroom_and_idle_cores() {
        // usage 50%: available = 8 - 4 = 4, headroom 0.4 -> floor(1.6) = 1
        assert_eq!(adaptive_worker_count(90.0, &CpuSample::new(50.0, 8)), 1);
        // usage 10% on 10 cores: available = 10 - 1 = 9, headroom 0.8 -> floor(7.2) = 7
        assert_eq!(adaptive_worker_count(90.0, &CpuSample::new(10.0, 10)), 7);
    }

    #[test]
    fn test_adaptive_over_target_floors_at_one() {
        assert_eq!(adaptive_worker_count(90.0, &CpuSample::new(99.0, 32)), 1);
        assert_eq!(adaptive_worker_count(90.0, &CpuSample::new(100.0, 1)), 1);
    }

    #[test]
    fn test_adaptive_handles_zero_cores_and_out_of_range_usage() {
        assert_eq!(adaptive_worker_count(90.0, &CpuSample::new(-5.0, 0)), 1);
        assert_eq!(adaptive_worker_count(90.0, &CpuSample::new(250.0, 4)), 1);
    }

    #[test]
    fn test_policy_respects_max_workers() {
        let policy = ConcurrencyPolicy::Adaptive {
            target_utilization: 100.0,
            max_workers: Some(4),
        };
        assert_eq!(policy.worker_count(&CpuSample::new(0.0, 64)), 4);
    }

    #[test]
    fn test_policy_adaptive_never_exceeds_global_max() {
        let policy = ConcurrencyPolicy::Adaptive {
            target_utilization: 100.0,
            max_workers: None,
        };
        assert_eq!(policy.worker_count(&CpuSample::new(0.0, 512)), MAX_WORKERS);
    }

    #[test]
    fn test_policy_fixed_ignores_sample() {
        let policy = ConcurrencyPolicy::Fixed(3);
        assert_eq!(policy.worker_count(&CpuSample::new(99.0, 1)), 3);
    }

    #[test]
    fn test_default_policy_is_adaptive_at_ninety_percent() {
        assert_eq!(
            ConcurrencyPolicy::default(),
            ConcurrencyPolicy::Adaptive {
                target_utilization: 90.0,
                max_workers: None
            }
        );
    }

    #[tokio::test]
    async fn test_resolve_uses_injected_sampler() {
        let sampler = FixedSampler(CpuSample::new(0.0, 4));
        let workers = ConcurrencyPolicy::default().resolve(&sampler).await;
        assert_eq!(workers, 3);
    }

    #[test]
    fn test_parse_proc_stat_aggregate_line() {
        let content = "cpu  100 0 50 800 50 0 0 0 0 0\ncpu0 50 0 25 400 25 0 0 0 0 0\n";
        let times = parse_proc_stat(content).unwrap();
        assert_eq!(times, CpuTimes { idle: 850, total: 1000 });
    }

    #[test]
    fn test_parse_proc_stat_rejects_garbage() {
        assert!(parse_proc_stat("intr 1 2 3\n").is_none());
        assert!(parse_proc_stat("cpu a b c d\n").is_none());
        assert!(parse_proc_stat("cpu 1 2\n").is_none());
    }

    #[test]
    fn test_utilization_between_readings() {
        let before = CpuTimes { idle: 850, total: 1000 };
        let after = CpuTimes { idle: 900, total: 1200 };
        // 200 elapsed, 50 idle -> 75% busy
        assert_eq!(before.utilization_until(&after), 75.0);
        assert_eq!(before.utilization_until(&before), 0.0);
    }

    #[tokio::test]
    async fn test_proc_stat_sampler_missing_file_reports_idle() {
        let sampler = ProcStatSampler::new(Duration::ZERO).with_path("/nonexistent/proc/stat");
        let sample = sampler.sample().await;
        assert_eq!(sample.utilization_percent, 0.0);
        assert!(sample.logical_cores >= 1);
    }

    #[tokio::test]
    async fn test_proc_stat_sampler_reads_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("stat");
        std::fs::write(&path, "cpu  100 0 50 800 50 0 0 0 0 0\n").unwrap();
        let sampler = ProcStatSampler::new(Duration::ZERO).with_path(&path);
        // Identical readings: no elapsed jiffies.
        assert_eq!(sampler.sample().await.utilization_percent, 0.0);
    }
}
