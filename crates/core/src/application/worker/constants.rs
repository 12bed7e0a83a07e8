// Worker constants (no magic values)
use std::time::Duration;

/// Sleep duration when nothing could be dispatched (100ms)
pub const IDLE_SLEEP_DURATION: Duration = Duration::from_millis(100);

/// Sleep duration after a scheduler error before polling again (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// Queued jobs inspected per scheduler tick
pub const DEFAULT_POLL_BATCH: usize = 16;

/// Default global cap on executing jobs
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 4;

/// Default cap on concurrently executing directory scans
pub const DEFAULT_MAX_CONCURRENT_SCANS: usize = 2;

/// Terminal detail of a job cancelled before it started
pub const CANCELLED_BEFORE_START: &str = "cancelled before start";

/// Terminal detail of a job that was running when the previous process stopped
pub const INTERRUPTED_BY_RESTART: &str = "interrupted by restart";
