// Inflight Concurrency Limiter
//
// Bookkeeping of executing jobs, global and per job type. Admission is decided by
// the scheduler comparing these counts against `AdmissionCaps` before it claims.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Admission caps compared against the limiter counts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionCaps {
    /// Maximum executing jobs across all types
    pub max_concurrent_jobs: usize,
    /// Maximum executing jobs per type; types not listed are bounded only globally
    pub per_type: HashMap<String, usize>,
}

impl Default for AdmissionCaps {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            per_type: HashMap::new(),
        }
    }
}

impl AdmissionCaps {
    pub fn with_type_cap(mut self, job_type: impl Into<String>, cap: usize) -> Self {
        self.per_type.insert(job_type.into(), cap);
        self
    }
}

#[derive(Debug, Default)]
struct LimiterSlot {
    global: usize,
    per_type: HashMap<String, usize>,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct LimiterSnapshot {
    pub global: usize,
    pub per_type: HashMap<String, usize>,
}

/// Process-wide inflight counters, reset on restart
#[derive(Debug, Default)]
pub struct InflightLimiter {
    slot: Mutex<LimiterSlot>,
}

impl InflightLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    // Counter updates cannot leave the slot inconsistent, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, LimiterSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count one more executing job of `job_type`. Unconditional.
    pub fn start(&self, job_type: &str) {
        let mut slot = self.lock();
        slot.global += 1;
        *slot.per_type.entry(job_type.to_string()).or_insert(0) += 1;
    }

    /// Count one job of `job_type` as done. Saturates at zero.
    pub fn finish(&self, job_type: &str) {
        let mut slot = self.lock();
        let Some(count) = slot.per_type.get_mut(job_type) else {
            return;
        };
        if *count == 0 {
            return;
        }
        *count -= 1;
        if *count == 0 {
            slot.per_type.remove(job_type);
        }
        slot.global = slot.global.saturating_sub(1);
    }

    /// Executing jobs across all types
    pub fn count(&self) -> usize {
        self.lock().global
    }

    pub fn count_for(&self, job_type: &str) -> usize {
        self.lock().per_type.get(job_type).copied().unwrap_or(0)
    }

    /// Whether one more `job_type` job fits under both caps
    pub fn has_capacity(&self, job_type: &str, caps: &AdmissionCaps) -> bool {
        let slot = self.lock();
        if slot.global >= caps.max_concurrent_jobs {
            return false;
        }
        match caps.per_type.get(job_type) {
            Some(cap) => slot.per_type.get(job_type).copied().unwrap_or(0) < *cap,
            None => true,
        }
    }

    /// `start` bundled with a guard that calls `finish` on drop, including
    /// when the executing task unwinds.
    pub fn acquire(self: &Arc<Self>, job_type: &str) -> InflightPermit {
        self.start(job_type);
        InflightPermit {
            limiter: Arc::clone(self),
            job_type: job_type.to_string(),
        }
    }

    pub fn snapshot(&self) -> LimiterSnapshot {
        let slot = self.lock();
        LimiterSnapshot {
            global: slot.global,
            per_type: slot.per_type.clone(),
        }
    }
}

/// Releases one inflight slot when dropped
#[derive(Debug)]
pub struct InflightPermit {
    limiter: Arc<InflightLimiter>,
    job_type: String,
}

impl Drop for InflightPermit {
    fn drop(&mut self) {
        self.limiter.finish(&self.job_type);
    }
}
