use std::fmt;
use std::sync::Arc;

use crate::cache::OrderCache;
use crate::domain::order::{Order, ValidationError};
use crate::service::{OrderService, ServiceError};
use crate::store::OrderRepository;

// ============================================================================
// Inbound Message Handling
// ============================================================================
//
//   decode fails            -> Undecodable -> Nack (may be a transient glitch)
//   create_order: invalid   -> Rejected    -> Ack  (never becomes valid)
//   create_order: other err -> Failed      -> Nack (infrastructure fault)
//   create_order: ok        -> Ingested    -> Ack
//
// The table is all the broker side needs to know; redelivery lives in
// `redelivery`, offsets in `offsets`.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    Nack,
}

#[derive(Debug)]
pub enum Outcome {
    Ingested { order_id: String },
    Rejected { order_id: String, error: ValidationError },
    Undecodable(serde_json::Error),
    Failed { order_id: String, error: ServiceError },
}

impl Outcome {
    pub fn disposition(&self) -> Disposition {
        match self {
            Outcome::Ingested { .. } | Outcome::Rejected { .. } => Disposition::Ack,
            Outcome::Undecodable(_) | Outcome::Failed { .. } => Disposition::Nack,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Ingested { .. } => "ingested",
            Outcome::Rejected { .. } => "rejected",
            Outcome::Undecodable(_) => "undecodable",
            Outcome::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Ingested { order_id } => write!(f, "order {} ingested", order_id),
            Outcome::Rejected { order_id, error } => write!(f, "order {} rejected: {}", order_id, error),
            Outcome::Undecodable(e) => write!(f, "failed to decode order: {}", e),
            Outcome::Failed { order_id, error } => write!(f, "order {} failed: {}", order_id, error),
        }
    }
}

/// Decodes one payload and runs it through `OrderService::create_order`.
pub struct OrderIngestor<R, C> {
    service: Arc<OrderService<R, C>>,
}

impl<R: OrderRepository, C: OrderCache> OrderIngestor<R, C> {
    pub fn new(service: Arc<OrderService<R, C>>) -> Self {
        Self { service }
    }

    pub async fn ingest(&self, payload: &[u8]) -> Outcome {
        let order: Order = match serde_json::from_slice(payload) {
            Ok(order) => order,
            Err(e) => {
                tracing::error!(error = %e, "Failed to decode order");
                return Outcome::Undecodable(e);
            }
        };

        let order_id = order.order_uid.clone();
        match self.service.create_order(order).await {
            Ok(_) => Outcome::Ingested { order_id },
            Err(ServiceError::Validation(error)) => Outcome::Rejected { order_id, error },
            Err(error) => Outcome::Failed { order_id, error },
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryOrderCache;
    use crate::testing::{sample_order, MemoryOrderStore};

    fn ingestor() -> (Arc<MemoryOrderStore>, OrderIngestor<MemoryOrderStore, InMemoryOrderCache<MemoryOrderStore>>) {
        let store = Arc::new(MemoryOrderStore::default());
        let cache = Arc::new(InMemoryOrderCache::new(store.clone()));
        let service = Arc::new(OrderService::new(store.clone(), cache));
        (store, OrderIngestor::new(service))
    }

    fn payload(order: &Order) -> Vec<u8> {
        serde_json::to_vec(order).unwrap()
    }

    #[tokio::test]
    async fn test_valid_order_is_ingested_and_acked() {
        let (store, ingestor) = ingestor();

        let outcome = ingestor.ingest(&payload(&sample_order("O1"))).await;

        assert!(matches!(outcome, Outcome::Ingested { ref order_id } if order_id == "O1"));
        assert_eq!(outcome.disposition(), Disposition::Ack);
        assert!(store.contains("O1"));
    }

    #[tokio::test]
    async fn test_invalid_order_is_rejected_and_acked() {
        let (store, ingestor) = ingestor();
        let mut order = sample_order("");
        order.payment.amount = -100;

        let outcome = ingestor.ingest(&payload(&order)).await;

        match &outcome {
            Outcome::Rejected { error, .. } => {
                assert!(error.has_violation("order_uid"));
                assert!(error.has_violation("payment.amount"));
            }
            other => panic!("expected rejection, got {}", other),
        }
        assert_eq!(outcome.disposition(), Disposition::Ack);
        assert_eq!(store.save_calls(), 0);
    }

    #[tokio::test]
    async fn test_garbage_payload_is_nacked() {
        let (store, ingestor) = ingestor();

        let outcome = ingestor.ingest(b"{not json").await;

        assert!(matches!(outcome, Outcome::Undecodable(_)));
        assert_eq!(outcome.disposition(), Disposition::Nack);
        assert_eq!(store.save_calls(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_is_nacked() {
        let (store, ingestor) = ingestor();
        store.set_unavailable(true);

        let outcome = ingestor.ingest(&payload(&sample_order("O1"))).await;

        assert!(matches!(outcome, Outcome::Failed { .. }));
        assert_eq!(outcome.disposition(), Disposition::Nack);
        assert_eq!(outcome.label(), "failed");
    }

    fn fast_policy() -> crate::messaging::RedeliveryPolicy {
        crate::messaging::RedeliveryPolicy {
            ack_wait: std::time::Duration::from_millis(500),
            initial_delay: std::time::Duration::from_millis(1),
            max_delay: std::time::Duration::from_millis(5),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_invalid_order_is_delivered_once() {
        let (store, ingestor) = ingestor();
        let ingestor = Arc::new(ingestor);
        let mut order = sample_order("O1");
        order.items[0].sale = 200;
        let payload = Arc::new(payload(&order));

        let report = crate::messaging::deliver(&fast_policy(), |_| {
            let ingestor = ingestor.clone();
            let payload = payload.clone();
            async move { ingestor.ingest(&payload).await }
        })
        .await;

        assert!(report.is_acked());
        assert_eq!(report.attempts(), 1);
        assert_eq!(store.save_calls(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_store_exhausts_three_deliveries() {
        let (store, ingestor) = ingestor();
        store.set_unavailable(true);
        let ingestor = Arc::new(ingestor);
        let payload = Arc::new(payload(&sample_order("O1")));

        let report = crate::messaging::deliver(&fast_policy(), |_| {
            let ingestor = ingestor.clone();
            let payload = payload.clone();
            async move { ingestor.ingest(&payload).await }
        })
        .await;

        assert!(!report.is_acked());
        assert_eq!(report.attempts(), 3);
        assert_eq!(store.save_calls(), 3);
    }

    #[tokio::test]
    async fn test_slow_save_past_deadline_is_still_acked() {
        let (store, ingestor) = ingestor();
        store.set_save_delay(std::time::Duration::from_millis(80));
        let ingestor = Arc::new(ingestor);
        let payload = Arc::new(payload(&sample_order("O1")));
        let policy = crate::messaging::RedeliveryPolicy {
            ack_wait: std::time::Duration::from_millis(50),
            initial_delay: std::time::Duration::from_millis(100),
            ..Default::default()
        };

        let report = crate::messaging::deliver(&policy, |_| {
            let ingestor = ingestor.clone();
            let payload = payload.clone();
            async move { ingestor.ingest(&payload).await }
        })
        .await;

        assert!(report.is_acked());
        assert_eq!(report.attempts(), 1);
        assert_eq!(store.save_calls(), 1);
        assert!(store.contains("O1"));
    }
}
