// ============================================================================
// Durable Store
// ============================================================================
//
// The single source of truth for orders. The service only depends on the
// narrow `OrderRepository` capability so tests can swap in an in-memory fake.
//
// ============================================================================

mod postgres;

use async_trait::async_trait;

use crate::domain::order::Order;

pub use postgres::PgOrderRepository;

/// An infrastructure failure talking to the store, tagged with what was
/// being attempted when it happened.
#[derive(Debug, thiserror::Error)]
#[error("failed to {action}: {source}")]
pub struct StoreError {
    action: &'static str,
    #[source]
    source: sqlx::Error,
}

impl StoreError {
    pub fn new(action: &'static str, source: sqlx::Error) -> Self {
        Self { action, source }
    }
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persist the whole aggregate atomically. Re-saving an existing key
    /// replaces it wholesale.
    async fn save(&self, order: &Order) -> Result<(), StoreError>;

    /// `Ok(None)` when no order has this id.
    async fn get_by_id(&self, order_uid: &str) -> Result<Option<Order>, StoreError>;

    async fn get_all(&self) -> Result<Vec<Order>, StoreError>;
}
