use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::models::{NewSessionRecord, Product, SessionRecord};
use crate::storage::{ProductRepository, SessionStore};
use crate::utils::error::Result;

/// In-process store for tests and dry runs. Nothing survives the process.
#[derive(Default)]
pub struct MemoryStore {
    products: RwLock<HashMap<String, Product>>,
    sessions: RwLock<Vec<SessionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let products = products
            .into_iter()
            .map(|p| (p.code.clone(), p))
            .collect();
        Self {
            products: RwLock::new(products),
            sessions: RwLock::new(Vec::new()),
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl ProductRepository for MemoryStore {
    async fn find_all(&self) -> Result<Vec<Product>> {
        let mut products: Vec<Product> = self.products.read().await.values().cloned().collect();
        products.sort_by_key(|p| p.sequence_code);
        Ok(products)
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Product>> {
        Ok(self.products.read().await.get(code).cloned())
    }

    async fn save(&self, product: &Product) -> Result<()> {
        self.products
            .write()
            .await
            .insert(product.code.clone(), product.clone());
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn latest(&self) -> Result<Option<SessionRecord>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .iter()
            .min_by(|a, b| b.acquired_on.cmp(&a.acquired_on).then(a.id.cmp(&b.id)))
            .cloned())
    }

    async fn save_session(&self, record: NewSessionRecord) -> Result<SessionRecord> {
        let mut sessions = self.sessions.write().await;
        let existing = sessions
            .iter()
            .position(|s| s.acquired_on == record.acquired_on);
        let id = match existing {
            Some(index) => sessions[index].id,
            None => sessions.iter().map(|s| s.id).max().unwrap_or(0) + 1,
        };

        let stored = SessionRecord {
            id,
            instance_id: record.instance_id,
            cookie_name: record.cookie_name,
            cookie_value: record.cookie_value,
            ajax_token: record.ajax_token,
            acquired_on: record.acquired_on,
        };
        match existing {
            Some(index) => sessions[index] = stored.clone(),
            None => sessions.push(stored.clone()),
        }
        Ok(stored)
    }
}
