use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::domain::order::Order;
use crate::store::{OrderRepository, StoreError};

// ============================================================================
// Order Cache
// ============================================================================
//
// Read-optimized mirror of the durable store, keyed by order_uid. Reads never
// fall through to the store here; filling on a miss is the service's job.
// Entries are never evicted, so memory grows with the number of orders.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("failed to restore cache: {0}")]
    Restore(#[source] StoreError),
}

#[async_trait]
pub trait OrderCache: Send + Sync {
    fn set(&self, order: Arc<Order>);
    fn get(&self, order_uid: &str) -> Option<Arc<Order>>;
    fn get_all(&self) -> Vec<Arc<Order>>;
    fn delete(&self, order_uid: &str);

    /// Bulk-load every stored order. Called once at startup; returns the
    /// number of orders loaded.
    async fn restore(&self) -> Result<usize, CacheError>;
}

pub struct InMemoryOrderCache<R> {
    orders: DashMap<String, Arc<Order>>,
    repo: Arc<R>,
}

impl<R: OrderRepository> InMemoryOrderCache<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self {
            orders: DashMap::new(),
            repo,
        }
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

#[async_trait]
impl<R: OrderRepository> OrderCache for InMemoryOrderCache<R> {
    fn set(&self, order: Arc<Order>) {
        tracing::debug!(order_id = %order.order_uid, "Order added to cache");
        self.orders.insert(order.order_uid.clone(), order);
    }

    fn get(&self, order_uid: &str) -> Option<Arc<Order>> {
        match self.orders.get(order_uid) {
            Some(entry) => {
                tracing::debug!(order_id = %order_uid, "Cache hit");
                Some(Arc::clone(entry.value()))
            }
            None => {
                tracing::debug!(order_id = %order_uid, "Cache miss");
                None
            }
        }
    }

    fn get_all(&self) -> Vec<Arc<Order>> {
        self.orders.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    fn delete(&self, order_uid: &str) {
        if self.orders.remove(order_uid).is_some() {
            tracing::debug!(order_id = %order_uid, "Order removed from cache");
        }
    }

    async fn restore(&self) -> Result<usize, CacheError> {
        let started = Instant::now();
        tracing::info!("Restoring order cache from store");

        let orders = self.repo.get_all().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to load orders for cache restore");
            CacheError::Restore(e)
        })?;

        let count = orders.len();
        for order in orders {
            self.orders.insert(order.order_uid.clone(), Arc::new(order));
        }

        tracing::info!(
            order_count = count,
            duration_ms = started.elapsed().as_millis() as u64,
            "Order cache restored"
        );
        Ok(count)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
