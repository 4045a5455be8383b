use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use super::ingest::{Disposition, Outcome};

// ============================================================================
// Bounded Redelivery
// ============================================================================
//
// A Kafka partition has no per-message nack, so the consumer redelivers on
// its own: a nack or a missed ack deadline schedules the same payload again
// after an exponential backoff, up to `max_deliver` deliveries in total.
//
// Each delivery runs as its own task. When it misses the deadline the task
// keeps running and the message is redelivered; an in-flight persist is
// never cut short. A late ack from such a task still settles the message.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct RedeliveryPolicy {
    /// Total deliveries, the first one included.
    pub max_deliver: u32,
    /// How long one delivery may take before it counts as timed out.
    pub ack_wait: Duration,
    /// Delay before the first redelivery
    pub initial_delay: Duration,
    /// Maximum delay between redeliveries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for RedeliveryPolicy {
    fn default() -> Self {
        Self {
            max_deliver: 3,
            ack_wait: Duration::from_secs(10),
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RedeliveryPolicy {
    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::from_millis(((delay.as_millis() as f64) * self.multiplier) as u64).min(self.max_delay)
    }
}

/// Why a single delivery did not end in an ack.
#[derive(Debug)]
pub enum AttemptFailure {
    Nack(Outcome),
    AckTimeout(Duration),
    Panicked(String),
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptFailure::Nack(outcome) => write!(f, "{}", outcome),
            AttemptFailure::AckTimeout(wait) => write!(f, "not acknowledged within {:?}", wait),
            AttemptFailure::Panicked(e) => write!(f, "handler panicked: {}", e),
        }
    }
}

#[derive(Debug)]
pub enum DeliveryReport {
    Acked { attempts: u32, outcome: Outcome },
    Exhausted { attempts: u32, last_failure: AttemptFailure },
}

impl DeliveryReport {
    pub fn attempts(&self) -> u32 {
        match self {
            DeliveryReport::Acked { attempts, .. } | DeliveryReport::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn is_acked(&self) -> bool {
        matches!(self, DeliveryReport::Acked { .. })
    }
}

/// Deliver a message until it is acked or runs out of attempts. `attempt`
/// receives the 1-based delivery number.
///
/// Returns only once every delivery it started has finished, late ones
/// included.
pub async fn deliver<F, Fut>(policy: &RedeliveryPolicy, mut attempt: F) -> DeliveryReport
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    let mut delivery = 0;
    let mut delay = policy.initial_delay;
    let mut late: Vec<JoinHandle<Outcome>> = Vec::new();

    loop {
        delivery += 1;

        let mut handle = tokio::spawn(attempt(delivery));
        let failure = match timeout(policy.ack_wait, &mut handle).await {
            Ok(Ok(outcome)) => match outcome.disposition() {
                Disposition::Ack => {
                    if delivery > 1 {
                        tracing::info!(attempt = delivery, "Message acknowledged after redelivery");
                    }
                    collect_late(&mut late, true).await;
                    return DeliveryReport::Acked {
                        attempts: delivery,
                        outcome,
                    };
                }
                Disposition::Nack => AttemptFailure::Nack(outcome),
            },
            Ok(Err(join_error)) => AttemptFailure::Panicked(join_error.to_string()),
            Err(_) => {
                late.push(handle);
                AttemptFailure::AckTimeout(policy.ack_wait)
            }
        };

        if delivery >= policy.max_deliver.max(1) {
            if let Some(outcome) = collect_late(&mut late, true).await {
                tracing::warn!(attempt = delivery, "Message acknowledged after its deadline");
                return DeliveryReport::Acked {
                    attempts: delivery,
                    outcome,
                };
            }

            tracing::error!(
                attempt = delivery,
                error = %failure,
                "Message not acknowledged after all deliveries"
            );
            return DeliveryReport::Exhausted {
                attempts: delivery,
                last_failure: failure,
            };
        }

        tracing::warn!(
            attempt = delivery,
            max_deliver = policy.max_deliver,
            error = %failure,
            delay_ms = delay.as_millis() as u64,
            "Message nacked, redelivering after delay"
        );

        sleep(delay).await;
        delay = policy.next_delay(delay);

        // A timed-out delivery that has since acked makes a redelivery moot.
        if let Some(outcome) = collect_late(&mut late, false).await {
            tracing::warn!(attempt = delivery, "Message acknowledged after its deadline");
            collect_late(&mut late, true).await;
            return DeliveryReport::Acked {
                attempts: delivery,
                outcome,
            };
        }
    }
}

/// Reap deliveries that missed their deadline and return the first late ack.
/// With `wait` false only the ones that already finished are taken.
async fn collect_late(late: &mut Vec<JoinHandle<Outcome>>, wait: bool) -> Option<Outcome> {
    let mut acked = None;
    let mut pending = Vec::new();

    for handle in late.drain(..) {
        if !wait && !handle.is_finished() {
            pending.push(handle);
            continue;
        }

        match handle.await {
            Ok(outcome) if outcome.disposition() == Disposition::Ack => {
                if acked.is_none() {
                    acked = Some(outcome);
                }
            }
            Ok(outcome) => tracing::debug!(outcome = %outcome, "Late delivery finished without an ack"),
            Err(e) => tracing::warn!(error = %e, "Late delivery panicked"),
        }
    }

    *late = pending;
    acked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::ServiceError;
    use crate::store::StoreError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy() -> RedeliveryPolicy {
        RedeliveryPolicy {
            max_deliver: 3,
            ack_wait: Duration::from_millis(200),
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            multiplier: 2.0,
        }
    }

    fn failed() -> Outcome {
        Outcome::Failed {
            order_id: "O1".into(),
            error: ServiceError::Save(StoreError::new("begin transaction", sqlx::Error::PoolTimedOut)),
        }
    }

    #[tokio::test]
    async fn test_ack_on_first_delivery() {
        let report = deliver(&fast_policy(), |_| async {
            Outcome::Ingested { order_id: "O1".into() }
        })
        .await;

        assert!(report.is_acked());
        assert_eq!(report.attempts(), 1);
    }

    #[tokio::test]
    async fn test_nack_is_redelivered_until_exhausted() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let report = deliver(&fast_policy(), move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                failed()
            }
        })
        .await;

        assert!(matches!(
            report,
            DeliveryReport::Exhausted { attempts: 3, last_failure: AttemptFailure::Nack(_) }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_recovers_on_redelivery() {
        let report = deliver(&fast_policy(), |attempt| async move {
            if attempt < 2 {
                failed()
            } else {
                Outcome::Ingested { order_id: "O1".into() }
            }
        })
        .await;

        assert!(report.is_acked());
        assert_eq!(report.attempts(), 2);
    }

    #[tokio::test]
    async fn test_late_ack_settles_exhausted_delivery() {
        let finished = Arc::new(AtomicU32::new(0));
        let counter = finished.clone();
        let policy = RedeliveryPolicy {
            max_deliver: 2,
            ack_wait: Duration::from_millis(20),
            ..fast_policy()
        };

        let report = deliver(&policy, move |_| {
            let counter = counter.clone();
            async move {
                sleep(Duration::from_millis(60)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                Outcome::Ingested { order_id: "O1".into() }
            }
        })
        .await;

        assert!(report.is_acked());
        assert_eq!(report.attempts(), 2);
        // Nothing started by `deliver` outlives it.
        assert_eq!(finished.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_slow_nacks_exhaust_after_all_finish() {
        let finished = Arc::new(AtomicU32::new(0));
        let counter = finished.clone();
        let policy = RedeliveryPolicy {
            max_deliver: 2,
            ack_wait: Duration::from_millis(20),
            ..fast_policy()
        };

        let report = deliver(&policy, move |_| {
            let counter = counter.clone();
            async move {
                sleep(Duration::from_millis(60)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                failed()
            }
        })
        .await;

        assert!(matches!(
            report,
            DeliveryReport::Exhausted { attempts: 2, last_failure: AttemptFailure::AckTimeout(_) }
        ));
        assert_eq!(finished.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_late_ack_skips_pending_redelivery() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let policy = RedeliveryPolicy {
            ack_wait: Duration::from_millis(20),
            initial_delay: Duration::from_millis(100),
            ..fast_policy()
        };

        let report = deliver(&policy, move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                sleep(Duration::from_millis(40)).await;
                Outcome::Ingested { order_id: "O1".into() }
            }
        })
        .await;

        assert!(report.is_acked());
        assert_eq!(report.attempts(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = fast_policy();
        let mut delay = policy.initial_delay;
        for _ in 0..10 {
            delay = policy.next_delay(delay);
        }
        assert_eq!(delay, policy.max_delay);
    }
}
