// Scheduler configuration

use super::constants::{
    DEFAULT_MAX_CONCURRENT_JOBS, DEFAULT_MAX_CONCURRENT_SCANS, DEFAULT_POLL_BATCH,
    IDLE_SLEEP_DURATION,
};
use crate::application::limiter::AdmissionCaps;
use crate::domain::SCAN_DIRECTORY_JOB;
use crate::error::{AppError, Result};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub caps: AdmissionCaps,
    pub idle_sleep: Duration,
    pub poll_batch: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            caps: AdmissionCaps {
                max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
                ..Default::default()
            }
            .with_type_cap(SCAN_DIRECTORY_JOB, DEFAULT_MAX_CONCURRENT_SCANS),
            idle_sleep: IDLE_SLEEP_DURATION,
            poll_batch: DEFAULT_POLL_BATCH,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.caps.max_concurrent_jobs == 0 {
            return Err(AppError::Config(
                "max_concurrent_jobs must be at least 1".to_string(),
            ));
        }
        if self.poll_batch == 0 {
            return Err(AppError::Config("poll_batch must be at least 1".to_string()));
        }
        Ok(())
    }
}
