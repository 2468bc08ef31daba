use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::models::PriceChange;
use crate::notifiers::Notifier;
use crate::portal::ProductSource;
use crate::storage::ProductRepository;
use crate::utils::error::{AppError, Result};

/// What one reconciliation run did.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconciliationSummary {
    pub total: usize,
    pub changes: Vec<PriceChange>,
    /// Products whose price list was written, first observations included.
    pub persisted: usize,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl ReconciliationSummary {
    pub fn changed(&self) -> usize {
        self.changes.len()
    }

    pub fn subject(&self) -> String {
        format!("Prices changed: {} of {}", self.changed(), self.total)
    }

    pub fn body(&self) -> String {
        let mut text = format!(
            "Changed {} of {} products in {:.1}s\n",
            self.changed(),
            self.total,
            self.elapsed_ms as f64 / 1000.0
        );
        for change in &self.changes {
            text.push('\n');
            text.push_str(&change.to_string());
        }
        text
    }
}

/// Compares stored prices with the portal's and persists what moved.
pub struct ReconciliationJob {
    products: Arc<dyn ProductRepository>,
    source: Arc<dyn ProductSource>,
    notifier: Arc<dyn Notifier>,
    item_delay: Duration,
}

impl ReconciliationJob {
    pub fn new(
        products: Arc<dyn ProductRepository>,
        source: Arc<dyn ProductSource>,
        notifier: Arc<dyn Notifier>,
        item_delay: Duration,
    ) -> Self {
        Self {
            products,
            source,
            notifier,
            item_delay,
        }
    }

    /// Run once. Success and failure are both reported through the notifier;
    /// a failure is still returned to the caller.
    pub async fn run(&self) -> Result<ReconciliationSummary> {
        tracing::info!("Starting price reconciliation");

        match self.reconcile().await {
            Ok(summary) => {
                metrics::counter!("reconciliation_runs_total", "outcome" => "completed").increment(1);
                tracing::info!(
                    changed = summary.changed(),
                    total = summary.total,
                    elapsed_ms = summary.elapsed_ms,
                    "Price reconciliation completed"
                );
                if let Err(e) = self.notifier.send(&summary.subject(), &summary.body()).await {
                    tracing::warn!("Failed to send reconciliation summary: {}", e);
                }
                Ok(summary)
            }
            Err(e) => {
                metrics::counter!("reconciliation_runs_total", "outcome" => "failed").increment(1);
                tracing::error!("Price reconciliation failed: {}", e);
                if let Err(notify_err) = self
                    .notifier
                    .send("Price reconciliation failed", &e.to_string())
                    .await
                {
                    tracing::warn!("Failed to send failure notice: {}", notify_err);
                }
                Err(e)
            }
        }
    }

    async fn reconcile(&self) -> Result<ReconciliationSummary> {
        let started_at = Utc::now();
        let timer = Instant::now();

        let products = self.products.find_all().await?;
        let total = products.len();
        let mut changes = Vec::new();
        let mut persisted = 0;

        for (index, mut product) in products.into_iter().enumerate() {
            if index > 0 && !self.item_delay.is_zero() {
                tokio::time::sleep(self.item_delay).await;
            }

            let snapshot = self
                .source
                .fetch_by_code(&product.code)
                .await?
                .ok_or_else(|| AppError::ItemNotFound {
                    code: product.code.clone(),
                })?;

            let previous = product.current_price().map(|p| p.value);
            if previous == Some(snapshot.current_price) {
                tracing::debug!(code = %product.code, price = %snapshot.current_price, "Price unchanged");
                continue;
            }

            product.record_price(snapshot.current_price, snapshot.observed_at);
            self.products.save(&product).await?;
            persisted += 1;

            match previous {
                Some(old_price) => {
                    let change = PriceChange::new(
                        product.description.clone(),
                        old_price,
                        snapshot.current_price,
                    );
                    tracing::info!(code = %product.code, "{}", change);
                    metrics::counter!("price_changes_total").increment(1);
                    changes.push(change);
                }
                None => {
                    tracing::info!(code = %product.code, price = %snapshot.current_price, "Recorded first price");
                }
            }
        }

        Ok(ReconciliationSummary {
            total,
            changes,
            persisted,
            started_at,
            elapsed_ms: timer.elapsed().as_millis() as u64,
        })
    }
}
