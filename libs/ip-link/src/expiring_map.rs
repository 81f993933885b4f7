use std::collections::HashMap;
use std::hash::Hash;
use std::time::Instant;

/// A map whose entries vanish at a per-entry deadline.
///
/// Expiry only happens inside [`ExpiringMap::handle_timeout`]; between calls,
/// stale entries remain visible. Callers drive it like every other sans-IO
/// component: `poll_timeout` says when the next sweep is due.
#[derive(Debug)]
pub(crate) struct ExpiringMap<K, V> {
    inner: HashMap<K, (V, Instant)>,
}

impl<K, V> Default for ExpiringMap<K, V> {
    fn default() -> Self {
        Self {
            inner: HashMap::default(),
        }
    }
}

impl<K, V> ExpiringMap<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Inserts `key`, replacing any previous entry and its deadline.
    pub(crate) fn insert(&mut self, key: K, value: V, expires_at: Instant) {
        self.inner.insert(key, (value, expires_at));
    }

    pub(crate) fn get(&self, key: &K) -> Option<&V> {
        self.inner.get(key).map(|(value, _)| value)
    }

    pub(crate) fn contains_key(&self, key: &K) -> bool {
        self.inner.contains_key(key)
    }

    pub(crate) fn remove(&mut self, key: &K) -> Option<V> {
        self.inner.remove(key).map(|(value, _)| value)
    }

    /// Evicts every entry whose deadline has passed, returning their keys.
    pub(crate) fn handle_timeout(&mut self, now: Instant) -> Vec<K> {
        let expired = self
            .inner
            .iter()
            .filter(|(_, (_, deadline))| *deadline <= now)
            .map(|(key, _)| key.clone())
            .collect::<Vec<_>>();

        for key in &expired {
            self.inner.remove(key);
        }

        expired
    }

    /// When the next entry is due to expire.
    pub(crate) fn poll_timeout(&self) -> Option<Instant> {
        self.inner.values().map(|(_, deadline)| *deadline).min()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
