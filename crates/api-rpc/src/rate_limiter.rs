//! Token bucket guarding the RPC surface
//!
//! Lock-free: the bucket level and the last refill instant share one `AtomicU64`
//! updated with a CAS loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Bucket level is kept in thousandths of a token so slow refill rates still
/// accumulate between closely spaced requests.
const MILLI: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Bucket capacity
    pub burst: u32,
    /// Tokens added per second
    pub per_second: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            burst: 200,
            per_second: 100,
        }
    }
}

pub struct RateLimiter {
    /// Upper 32 bits: level in milli-tokens. Lower 32 bits: ms since `origin` at
    /// the last refill (wrapping).
    packed: AtomicU64,
    origin: Instant,
    capacity_milli: u64,
    per_second: u64,
}

fn pack(level_milli: u64, at_ms: u32) -> u64 {
    (level_milli << 32) | u64::from(at_ms)
}

fn unpack(packed: u64) -> (u64, u32) {
    (packed >> 32, (packed & 0xFFFF_FFFF) as u32)
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        // The level field is 32 bits wide
        let capacity_milli = (u64::from(config.burst) * MILLI).min(u64::from(u32::MAX));
        Self {
            packed: AtomicU64::new(pack(capacity_milli, 0)),
            origin: Instant::now(),
            capacity_milli,
            per_second: u64::from(config.per_second),
        }
    }

    fn now_ms(&self) -> u32 {
        // Truncation wraps every ~49 days; deltas use wrapping_sub
        self.origin.elapsed().as_millis() as u32
    }

    /// Take one token. `false` means the caller is throttled.
    pub fn try_acquire(&self) -> bool {
        loop {
            let current = self.packed.load(Ordering::Acquire);
            let (level, last_ms) = unpack(current);
            let now_ms = self.now_ms();
            let elapsed = u64::from(now_ms.wrapping_sub(last_ms));
            // elapsed ms * tokens/s == milli-tokens
            let refilled = (level + elapsed * self.per_second).min(self.capacity_milli);

            let (next_level, allowed) = if refilled >= MILLI {
                (refilled - MILLI, true)
            } else {
                (refilled, false)
            };

            if self
                .packed
                .compare_exchange(
                    current,
                    pack(next_level, now_ms),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return allowed;
            }
        }
    }

    /// Whole tokens left as of the last update
    pub fn available(&self) -> u64 {
        unpack(self.packed.load(Ordering::Acquire)).0 / MILLI
    }
}
