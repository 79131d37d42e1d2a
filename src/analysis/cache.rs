use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::analysis::analysis_model::AnalysisResult;

pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

struct CacheEntry {
    result: AnalysisResult,
    stored_at: Instant,
}

/// TTL cache of analysis results keyed by (site, url).
///
/// Readers share the lock; a write replaces a whole entry at once.
pub struct AnalysisCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl Default for AnalysisCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl AnalysisCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// SHA-1 of the (site, url) pair.
    pub fn key(site: &str, url: &str) -> String {
        use sha1::{Digest, Sha1};

        let mut hasher = Sha1::new();
        hasher.update(site.as_bytes());
        hasher.update([0u8]);
        hasher.update(url.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// A copy of the cached result. Its validation flags are as of the last
    /// validation and must be refreshed by the caller.
    pub fn get(&self, site: &str, url: &str) -> Option<AnalysisResult> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let entry = entries.get(&Self::key(site, url))?;
        if entry.stored_at.elapsed() > self.ttl {
            return None;
        }
        Some(entry.result.clone())
    }

    pub fn insert(&self, site: &str, url: &str, result: AnalysisResult) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, e| e.stored_at.elapsed() <= self.ttl);
        entries.insert(
            Self::key(site, url),
            CacheEntry {
                result,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, site: &str, url: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(&Self::key(site, url));
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.clear();
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .values()
            .filter(|e| e.stored_at.elapsed() <= self.ttl)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
