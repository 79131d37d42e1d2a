use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Point-in-time copy of the resolver counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverStats {
    pub attempts: u64,
    pub successes: u64,
    pub fallbacks_used: u64,
    pub promotions: u64,
}

impl ResolverStats {
    pub fn success_rate(&self) -> f32 {
        if self.attempts == 0 {
            0.0
        } else {
            self.successes as f32 / self.attempts as f32
        }
    }
}

/// Lock-free counters shared by every resolution in the process.
#[derive(Debug, Default)]
pub struct StatsCounters {
    attempts: AtomicU64,
    successes: AtomicU64,
    fallbacks_used: AtomicU64,
    promotions: AtomicU64,
}

impl StatsCounters {
    pub fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback(&self) {
        self.fallbacks_used.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_promotion(&self) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ResolverStats {
        ResolverStats {
            attempts: self.attempts.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            fallbacks_used: self.fallbacks_used.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.attempts.store(0, Ordering::Relaxed);
        self.successes.store(0, Ordering::Relaxed);
        self.fallbacks_used.store(0, Ordering::Relaxed);
        self.promotions.store(0, Ordering::Relaxed);
    }
}
