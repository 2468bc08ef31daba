use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::models::{parse_price, NewSessionRecord, Price, Product, SessionRecord};
use crate::storage::{ProductRepository, SessionStore};
use crate::utils::error::Result;

#[derive(Debug, FromRow)]
struct ProductRow {
    id: String,
    description: String,
    code: String,
    sequence_code: i64,
}

#[derive(Debug, FromRow)]
struct PriceRow {
    id: String,
    product_id: String,
    value: String,
    observed_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct SessionRow {
    id: i64,
    instance_id: i64,
    cookie_name: String,
    cookie_value: String,
    ajax_token: String,
    acquired_on: NaiveDate,
}

impl PriceRow {
    fn into_price(self) -> Result<Price> {
        Ok(Price {
            id: self.id,
            value: parse_price(&self.value)?,
            observed_at: self.observed_at,
            product_id: Some(self.product_id),
        })
    }
}

impl From<SessionRow> for SessionRecord {
    fn from(row: SessionRow) -> Self {
        SessionRecord {
            id: row.id,
            instance_id: row.instance_id,
            cookie_name: row.cookie_name,
            cookie_value: row.cookie_value,
            ajax_token: row.ajax_token,
            acquired_on: row.acquired_on,
        }
    }
}

/// SQLite-backed product and session storage.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to `:memory:` opens its own empty database.
        let max_connections = if config.url.contains(":memory:") {
            1
        } else {
            config.max_connections
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .min_connections(config.min_connections.min(max_connections))
            .acquire_timeout(Duration::from_secs(config.acquire_timeout))
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Prices of every stored product, newest first within each product.
    async fn prices_by_product(&self) -> Result<HashMap<String, Vec<Price>>> {
        let rows = sqlx::query_as::<_, PriceRow>(
            "SELECT pr.id, pr.product_id, pr.value, pr.observed_at FROM prices pr \
             JOIN products p ON p.id = pr.product_id \
             ORDER BY pr.product_id, pr.observed_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut by_product: HashMap<String, Vec<Price>> = HashMap::new();
        for row in rows {
            let product_id = row.product_id.clone();
            by_product.entry(product_id).or_default().push(row.into_price()?);
        }
        Ok(by_product)
    }
}

fn assemble(row: ProductRow, prices: Vec<Price>) -> Product {
    Product {
        id: row.id,
        description: row.description,
        code: row.code,
        sequence_code: row.sequence_code,
        prices,
    }
}

#[async_trait]
impl ProductRepository for SqliteStore {
    async fn find_all(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(
            "SELECT id, description, code, sequence_code FROM products ORDER BY sequence_code",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut prices = self.prices_by_product().await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let product_prices = prices.remove(&row.id).unwrap_or_default();
                assemble(row, product_prices)
            })
            .collect())
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>(
            "SELECT id, description, code, sequence_code FROM products WHERE code = ?",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let prices = sqlx::query_as::<_, PriceRow>(
            "SELECT id, product_id, value, observed_at FROM prices WHERE product_id = ? ORDER BY observed_at DESC",
        )
        .bind(&row.id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(PriceRow::into_price)
        .collect::<Result<Vec<_>>>()?;

        Ok(Some(assemble(row, prices)))
    }

    async fn save(&self, product: &Product) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO products (id, description, code, sequence_code) VALUES (?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET description = excluded.description, \
             code = excluded.code, sequence_code = excluded.sequence_code",
        )
        .bind(&product.id)
        .bind(&product.description)
        .bind(&product.code)
        .bind(product.sequence_code)
        .execute(&mut *tx)
        .await?;

        // The product owns its prices: rewrite the whole list.
        sqlx::query("DELETE FROM prices WHERE product_id = ?")
            .bind(&product.id)
            .execute(&mut *tx)
            .await?;

        for price in &product.prices {
            sqlx::query("INSERT INTO prices (id, product_id, value, observed_at) VALUES (?, ?, ?, ?)")
                .bind(&price.id)
                .bind(&product.id)
                .bind(price.value.to_string())
                .bind(price.observed_at)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        tracing::debug!(code = %product.code, prices = product.prices.len(), "Saved product");
        Ok(())
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn latest(&self) -> Result<Option<SessionRecord>> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT id, instance_id, cookie_name, cookie_value, ajax_token, acquired_on \
             FROM portal_sessions ORDER BY acquired_on DESC, id ASC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(SessionRecord::from))
    }

    async fn save_session(&self, record: NewSessionRecord) -> Result<SessionRecord> {
        let row = sqlx::query_as::<_, SessionRow>(
            "INSERT INTO portal_sessions (instance_id, cookie_name, cookie_value, ajax_token, acquired_on) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(acquired_on) DO UPDATE SET instance_id = excluded.instance_id, \
             cookie_name = excluded.cookie_name, cookie_value = excluded.cookie_value, \
             ajax_token = excluded.ajax_token \
             RETURNING id, instance_id, cookie_name, cookie_value, ajax_token, acquired_on",
        )
        .bind(record.instance_id)
        .bind(&record.cookie_name)
        .bind(&record.cookie_value)
        .bind(&record.ajax_token)
        .bind(record.acquired_on)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }
}
