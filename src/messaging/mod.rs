// ============================================================================
// Messaging - Redpanda/Kafka order delivery
// ============================================================================
//
// - ingest/     - decode + create_order, classified into Ack / Nack
// - redelivery/ - bounded redelivery with an ack deadline per delivery
// - offsets/    - commit watermark for concurrently handled messages
// - consumer/   - the subscription loop tying the above to the broker
// - redpanda/   - producer for publishing orders and dead letters
//
// ============================================================================

mod consumer;
mod ingest;
mod offsets;
mod redelivery;
mod redpanda;

pub use consumer::{ConsumerError, ConsumerSettings, DeliverPolicy, OrderConsumer, Subscription};
pub use ingest::{Disposition, OrderIngestor, Outcome};
pub use offsets::OffsetTracker;
pub use redelivery::{deliver, AttemptFailure, DeliveryReport, RedeliveryPolicy};
pub use redpanda::{PublishError, RedpandaClient, DELIVERY_ATTEMPTS_HEADER, LAST_ERROR_HEADER};
