use std::{collections::HashMap, hash::Hash};

use tokio::sync::RwLock;

/// Async keyed cache over cheaply clonable values.
#[derive(Debug)]
pub struct CloneCache<K: PartialEq + Eq + Hash, T: Clone>(
  RwLock<HashMap<K, T>>,
);

impl<K: PartialEq + Eq + Hash, T: Clone> Default
  for CloneCache<K, T>
{
  fn default() -> Self {
    Self(RwLock::new(HashMap::new()))
  }
}

impl<K: PartialEq + Eq + Hash + Clone, T: Clone>
  CloneCache<K, T>
{
  pub async fn get(&self, key: &K) -> Option<T> {
    self.0.read().await.get(key).cloned()
  }

  pub async fn remove(&self, key: &K) -> Option<T> {
    self.0.write().await.remove(key)
  }

  /// Atomically replaces the contents with an empty map.
  pub async fn clear(&self) {
    *self.0.write().await = HashMap::new();
  }

  pub async fn is_empty(&self) -> bool {
    self.0.read().await.is_empty()
  }
}

impl<K: PartialEq + Eq + Hash + Clone, T: Clone + Default>
  CloneCache<K, T>
{
  pub async fn get_or_insert_default(&self, key: &K) -> T {
    let mut lock = self.0.write().await;
    match lock.get(key).cloned() {
      Some(item) => item,
      None => {
        let item: T = Default::default();
        lock.insert(key.clone(), item.clone());
        item
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn get_or_insert_memoizes() {
    let cache: CloneCache<String, std::sync::Arc<String>> =
      Default::default();
    let first =
      cache.get_or_insert_default(&"a".to_string()).await;
    let second =
      cache.get_or_insert_default(&"a".to_string()).await;
    assert!(std::sync::Arc::ptr_eq(&first, &second));
  }

  #[tokio::test]
  async fn clear_drops_all_entries() {
    let cache: CloneCache<String, String> = Default::default();
    cache.get_or_insert_default(&"a".to_string()).await;
    cache.get_or_insert_default(&"b".to_string()).await;
    assert!(!cache.is_empty().await);
    cache.clear().await;
    assert!(cache.is_empty().await);
    assert_eq!(cache.get(&"a".to_string()).await, None);
  }
}
