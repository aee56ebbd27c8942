//! Expiring map from launch template name to the created remote resource.
//!
//! Entries live for a short TTL relative to the provisioning-loop cadence and
//! are re-armed on every put.  The cache is safe for concurrent use from
//! multiple provisioning attempts, but it deliberately does not single-flight
//! concurrent identical requests: both will compute the same name and may
//! both submit a create call, which the remote API tolerates by returning the
//! existing resource for a duplicate name.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

pub const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug)]
struct Entry<T> {
    value: T,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct LaunchTemplateCache<T> {
    entries: RwLock<HashMap<String, Entry<T>>>,
    ttl: Duration,
}

impl<T: Clone> Default for LaunchTemplateCache<T> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl<T: Clone> LaunchTemplateCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Returns the cached value unless the entry is missing or past its TTL.
    /// Expired entries are left in place; `put` overwrites them.
    pub fn get(&self, name: &str) -> Option<T> {
        let entries = self.entries.read().ok()?;
        let entry = entries.get(name)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some(entry.value.clone())
    }

    /// Stores a value under `name`, re-arming the TTL.
    pub fn put(&self, name: &str, value: T) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(
                name.to_string(),
                Entry {
                    value,
                    expires_at: Instant::now() + self.ttl,
                },
            );
        }
    }

    pub fn invalidate(&self, name: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(name);
        }
    }

    /// Rewinds an entry's expiry so the next `get` misses.  Exists so
    /// staleness tests do not have to sleep through a TTL or reach into the
    /// map representation.
    pub fn force_expire(&self, name: &str) {
        if let Ok(mut entries) = self.entries.write() {
            if let Some(entry) = entries.get_mut(name) {
                entry.expires_at = Instant::now();
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::LaunchTemplateCache;
    use std::time::Duration;

    #[test]
    fn get_returns_what_put_stored() {
        let cache = LaunchTemplateCache::default();
        assert_eq!(cache.get("missing"), None);
        cache.put("lt-a", "id-a".to_string());
        assert_eq!(cache.get("lt-a").as_deref(), Some("id-a"));
    }

    #[test]
    fn invalidate_removes_the_entry() {
        let cache = LaunchTemplateCache::default();
        cache.put("lt-a", "id-a".to_string());
        cache.invalidate("lt-a");
        assert_eq!(cache.get("lt-a"), None);
    }

    #[test]
    fn expired_entries_miss() {
        let cache = LaunchTemplateCache::new(Duration::from_secs(0));
        cache.put("lt-a", "id-a".to_string());
        assert_eq!(cache.get("lt-a"), None);
    }

    #[test]
    fn force_expire_makes_the_next_get_miss() {
        let cache = LaunchTemplateCache::default();
        cache.put("lt-a", "id-a".to_string());
        assert_eq!(cache.get("lt-a").as_deref(), Some("id-a"));
        cache.force_expire("lt-a");
        assert_eq!(cache.get("lt-a"), None);
    }

    #[test]
    fn put_rearms_the_ttl() {
        let cache = LaunchTemplateCache::default();
        cache.put("lt-a", "id-a".to_string());
        cache.force_expire("lt-a");
        cache.put("lt-a", "id-b".to_string());
        assert_eq!(cache.get("lt-a").as_deref(), Some("id-b"));
    }
}
