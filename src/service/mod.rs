use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::OrderCache;
use crate::domain::order::{validate, Order, ValidationError};
use crate::store::{OrderRepository, StoreError};

// ============================================================================
// Order Service
// ============================================================================
//
// Orchestrates: Validate → Store → Cache for writes, Cache → Store → Cache
// for reads.
//
// The cache is only written after the store confirms a durable write, so
// the cache never holds an order the store does not.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid order data: {0}")]
    Validation(#[from] ValidationError),

    #[error("failed to save order: {0}")]
    Save(#[source] StoreError),

    #[error("failed to load orders: {0}")]
    Load(#[source] StoreError),
}

impl ServiceError {
    /// Malformed data never becomes valid on redelivery; everything else is
    /// assumed to be a passing infrastructure fault.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ServiceError::Validation(_))
    }
}

/// The read half of the service, as seen by the HTTP layer.
#[async_trait]
pub trait OrderReader: Send + Sync {
    async fn get_all_orders(&self) -> Result<Vec<Arc<Order>>, ServiceError>;
    async fn get_order(&self, order_uid: &str) -> Result<Option<Arc<Order>>, ServiceError>;
}

pub struct OrderService<R, C> {
    repo: Arc<R>,
    cache: Arc<C>,
}

impl<R: OrderRepository, C: OrderCache> OrderService<R, C> {
    pub fn new(repo: Arc<R>, cache: Arc<C>) -> Self {
        Self { repo, cache }
    }

    /// Whole cache if it holds anything, otherwise a full store read that
    /// fills the cache on the way out.
    pub async fn get_all_orders(&self) -> Result<Vec<Arc<Order>>, ServiceError> {
        let cached = self.cache.get_all();
        if !cached.is_empty() {
            tracing::debug!(count = cached.len(), "Serving all orders from cache");
            return Ok(cached);
        }

        let orders = self.repo.get_all().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to get all orders from store");
            ServiceError::Load(e)
        })?;

        let orders: Vec<Arc<Order>> = orders.into_iter().map(Arc::new).collect();
        for order in &orders {
            self.cache.set(Arc::clone(order));
        }

        tracing::info!(count = orders.len(), "Loaded all orders from store and cached them");
        Ok(orders)
    }

    /// `Ok(None)` when the order exists neither in cache nor in store.
    pub async fn get_order(&self, order_uid: &str) -> Result<Option<Arc<Order>>, ServiceError> {
        if let Some(order) = self.cache.get(order_uid) {
            return Ok(Some(order));
        }

        let order = self.repo.get_by_id(order_uid).await.map_err(|e| {
            tracing::error!(order_id = %order_uid, error = %e, "Failed to get order from store");
            ServiceError::Load(e)
        })?;

        match order {
            Some(order) => {
                let order = Arc::new(order);
                self.cache.set(Arc::clone(&order));
                tracing::debug!(order_id = %order_uid, "Order loaded from store and cached");
                Ok(Some(order))
            }
            None => {
                tracing::debug!(order_id = %order_uid, "Order not found");
                Ok(None)
            }
        }
    }

    pub async fn create_order(&self, order: Order) -> Result<Arc<Order>, ServiceError> {
        if let Err(e) = validate(&order) {
            tracing::warn!(order_id = %order.order_uid, error = %e, "Invalid order data");
            return Err(ServiceError::Validation(e));
        }

        if let Err(e) = self.repo.save(&order).await {
            tracing::error!(order_id = %order.order_uid, error = %e, "Failed to save order");
            return Err(ServiceError::Save(e));
        }

        let order = Arc::new(order);
        self.cache.set(Arc::clone(&order));

        tracing::info!(order_id = %order.order_uid, "Order created and cached");
        Ok(order)
    }
}

#[async_trait]
impl<R: OrderRepository, C: OrderCache> OrderReader for OrderService<R, C> {
    async fn get_all_orders(&self) -> Result<Vec<Arc<Order>>, ServiceError> {
        OrderService::get_all_orders(self).await
    }

    async fn get_order(&self, order_uid: &str) -> Result<Option<Arc<Order>>, ServiceError> {
        OrderService::get_order(self, order_uid).await
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
