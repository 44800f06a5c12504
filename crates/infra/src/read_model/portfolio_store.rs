use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use rentease_core::PortfolioId;

/// Key/value store partitioned by portfolio.
///
/// Read models can always be rebuilt from the event store, so a poisoned lock
/// degrades to "not found" rather than an error.
pub trait PortfolioStore<K, V>: Send + Sync {
    fn get(&self, portfolio_id: PortfolioId, key: &K) -> Option<V>;
    fn upsert(&self, portfolio_id: PortfolioId, key: K, value: V);
    fn remove(&self, portfolio_id: PortfolioId, key: &K) -> Option<V>;
    fn list(&self, portfolio_id: PortfolioId) -> Vec<V>;
    /// Drops every record of a portfolio ahead of a rebuild.
    fn clear_portfolio(&self, portfolio_id: PortfolioId);
}

impl<K, V, S> PortfolioStore<K, V> for Arc<S>
where
    S: PortfolioStore<K, V> + ?Sized,
{
    fn get(&self, portfolio_id: PortfolioId, key: &K) -> Option<V> {
        (**self).get(portfolio_id, key)
    }

    fn upsert(&self, portfolio_id: PortfolioId, key: K, value: V) {
        (**self).upsert(portfolio_id, key, value)
    }

    fn remove(&self, portfolio_id: PortfolioId, key: &K) -> Option<V> {
        (**self).remove(portfolio_id, key)
    }

    fn list(&self, portfolio_id: PortfolioId) -> Vec<V> {
        (**self).list(portfolio_id)
    }

    fn clear_portfolio(&self, portfolio_id: PortfolioId) {
        (**self).clear_portfolio(portfolio_id)
    }
}

#[derive(Debug)]
pub struct InMemoryPortfolioStore<K, V> {
    inner: RwLock<HashMap<(PortfolioId, K), V>>,
}

impl<K, V> InMemoryPortfolioStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryPortfolioStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> PortfolioStore<K, V> for InMemoryPortfolioStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, portfolio_id: PortfolioId, key: &K) -> Option<V> {
        let map = self.inner.read().ok()?;
        map.get(&(portfolio_id, key.clone())).cloned()
    }

    fn upsert(&self, portfolio_id: PortfolioId, key: K, value: V) {
        if let Ok(mut map) = self.inner.write() {
            map.insert((portfolio_id, key), value);
        }
    }

    fn remove(&self, portfolio_id: PortfolioId, key: &K) -> Option<V> {
        let mut map = self.inner.write().ok()?;
        map.remove(&(portfolio_id, key.clone()))
    }

    fn list(&self, portfolio_id: PortfolioId) -> Vec<V> {
        let Ok(map) = self.inner.read() else {
            return vec![];
        };
        map.iter()
            .filter(|((p, _), _)| *p == portfolio_id)
            .map(|(_, v)| v.clone())
            .collect()
    }

    fn clear_portfolio(&self, portfolio_id: PortfolioId) {
        if let Ok(mut map) = self.inner.write() {
            map.retain(|(p, _), _| *p != portfolio_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_invisible_across_portfolios() {
        let store: InMemoryPortfolioStore<u32, &str> = InMemoryPortfolioStore::new();
        let (a, b) = (PortfolioId::new(), PortfolioId::new());
        store.upsert(a, 1, "a-one");
        store.upsert(b, 1, "b-one");

        assert_eq!(store.get(a, &1), Some("a-one"));
        assert_eq!(store.list(b), vec!["b-one"]);

        store.clear_portfolio(a);
        assert!(store.list(a).is_empty());
        assert_eq!(store.get(b, &1), Some("b-one"));
    }

    #[test]
    fn remove_returns_the_previous_value() {
        let store: Arc<InMemoryPortfolioStore<u32, u32>> = Arc::new(InMemoryPortfolioStore::new());
        let p = PortfolioId::new();
        store.upsert(p, 7, 70);
        assert_eq!(store.remove(p, &7), Some(70));
        assert_eq!(store.remove(p, &7), None);
    }
}
