use std::{hash::Hash, time::Instant};

use crate::{
  entity::{car_category, subscription_type},
  prelude::*,
};

/// Per-process read cache. Entries expire after `ttl`; writers invalidate.
pub struct TtlCache<K, V> {
  ttl: Duration,
  entries: DashMap<K, (Instant, V)>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
  pub fn new(ttl: Duration) -> Self {
    Self { ttl, entries: DashMap::new() }
  }

  pub fn get(&self, key: &K) -> Option<V> {
    let entry = self.entries.get(key)?;
    let (inserted, value) = entry.value();
    if inserted.elapsed() < self.ttl { Some(value.clone()) } else { None }
  }

  pub fn insert(&self, key: K, value: V) {
    self.entries.insert(key, (Instant::now(), value));
  }

  pub fn invalidate(&self, key: &K) {
    self.entries.remove(key);
  }

  /// Drops expired entries, returns how many were evicted.
  pub fn gc(&self) -> usize {
    let before = self.entries.len();
    self.entries.retain(|_, (inserted, _)| inserted.elapsed() < self.ttl);
    before - self.entries.len()
  }

  #[cfg(test)]
  pub fn len(&self) -> usize {
    self.entries.len()
  }
}

pub struct Cache {
  pub categories: TtlCache<(), Vec<car_category::Model>>,
  pub subscription_types: TtlCache<(), Vec<subscription_type::Model>>,
}

impl Cache {
  pub fn new(ttl: Duration) -> Self {
    Self {
      categories: TtlCache::new(ttl),
      subscription_types: TtlCache::new(ttl),
    }
  }

  pub fn gc(&self) -> usize {
    self.categories.gc() + self.subscription_types.gc()
  }
}
