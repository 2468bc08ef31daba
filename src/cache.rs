use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::Product;

type Comparator<T> = Box<dyn Fn(&T, &T) -> Ordering + Send + Sync>;
type KeyExtractor<T, K> = Box<dyn Fn(&T) -> K + Send + Sync>;

struct Canonical<T> {
    items: Vec<T>,
    fingerprint: Uuid,
}

/// Cache of query results over one deduplicated, comparator-ordered store.
///
/// Each query key maps to the list of item keys that answered it; the items
/// themselves live once in the canonical store. A query whose items cannot all
/// be resolved any more reads as a miss, never as a partial list.
///
/// The fingerprint is replaced on every `put` and `evict_all`; the HTTP layer
/// uses it as an ETag.
pub struct CacheManager<T, K> {
    canonical: RwLock<Canonical<T>>,
    queries: RwLock<HashMap<String, Vec<K>>>,
    compare: Comparator<T>,
    key_of: KeyExtractor<T, K>,
}

impl<T, K> CacheManager<T, K>
where
    T: Clone + Send + Sync,
    K: PartialEq + Clone + Send + Sync,
{
    pub fn new(
        compare: impl Fn(&T, &T) -> Ordering + Send + Sync + 'static,
        key_of: impl Fn(&T) -> K + Send + Sync + 'static,
    ) -> Self {
        Self {
            canonical: RwLock::new(Canonical {
                items: Vec::new(),
                fingerprint: Uuid::new_v4(),
            }),
            queries: RwLock::new(HashMap::new()),
            compare: Box::new(compare),
            key_of: Box::new(key_of),
        }
    }

    /// Merge `items` into the canonical store and remember which keys answered `query_key`.
    ///
    /// Items that compare equal to a stored one replace it.
    pub async fn put(&self, query_key: impl Into<String>, items: Vec<T>) {
        let keys: Vec<K> = items.iter().map(|item| (self.key_of)(item)).collect();

        {
            let mut canonical = self.canonical.write().await;
            for item in items {
                match canonical
                    .items
                    .binary_search_by(|held| (self.compare)(held, &item))
                {
                    Ok(index) => canonical.items[index] = item,
                    Err(index) => canonical.items.insert(index, item),
                }
            }
            canonical.fingerprint = Uuid::new_v4();
        }

        // Only publish the key list once the items it points at are visible.
        self.queries.write().await.insert(query_key.into(), keys);
    }

    pub async fn get(&self, query_key: &str) -> Option<Vec<T>> {
        let keys = self.queries.read().await.get(query_key).cloned()?;
        let canonical = self.canonical.read().await;

        // Linear scan: the store is ordered by the comparator, not by key.
        keys.iter()
            .map(|key| {
                canonical
                    .items
                    .iter()
                    .find(|item| (self.key_of)(item) == *key)
                    .cloned()
            })
            .collect()
    }

    /// Drop every stored item. Cached query lists stay behind but no longer resolve.
    pub async fn evict_all(&self) {
        let mut canonical = self.canonical.write().await;
        canonical.items.clear();
        canonical.fingerprint = Uuid::new_v4();
        tracing::debug!("Cache evicted");
    }

    pub async fn fingerprint(&self) -> String {
        self.canonical.read().await.fingerprint.to_string()
    }

    pub async fn len(&self) -> usize {
        self.canonical.read().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

pub type ProductCache = CacheManager<Product, String>;

/// Products ordered by sequence code and addressed by barcode.
pub fn product_cache() -> ProductCache {
    CacheManager::new(
        |a: &Product, b: &Product| {
            a.sequence_code
                .cmp(&b.sequence_code)
                .then_with(|| a.code.cmp(&b.code))
        },
        |p: &Product| p.code.clone(),
    )
}
