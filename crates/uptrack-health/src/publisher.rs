//! Delivery of `EndpointUpdated` events.
//!
//! Publishing is fire-and-forget: a publisher never reports failure back
//! to the monitor, which has already persisted the endpoint by then.

use tokio::sync::broadcast;
use tracing::{debug, info};

use uptrack_core::EndpointUpdated;

/// Sink for endpoint update notifications.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: &EndpointUpdated);
}

/// In-process pub/sub over a tokio broadcast channel.
///
/// Slow subscribers lag and lose the oldest events; publishing with no
/// subscriber at all is not an error.
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<EndpointUpdated>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EndpointUpdated> {
        self.tx.subscribe()
    }
}

impl EventPublisher for BroadcastPublisher {
    fn publish(&self, event: &EndpointUpdated) {
        if self.tx.send(event.clone()).is_err() {
            debug!(endpoint_id = %event.endpoint_id, "no subscribers for endpoint update");
        }
    }
}

/// Writes each check to the log, one line per probe.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingPublisher;

impl EventPublisher for TracingPublisher {
    fn publish(&self, event: &EndpointUpdated) {
        match event.latency_ms {
            Some(latency_ms) if event.succeeded => info!(
                endpoint_id = %event.endpoint_id,
                url = %event.url,
                latency_ms,
                "✅ up"
            ),
            _ => info!(
                endpoint_id = %event.endpoint_id,
                url = %event.url,
                "🔴 failed"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use uptrack_core::{Endpoint, Observation};

    fn event() -> EndpointUpdated {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let ep = Endpoint::create_at("owner", "example.com", "Example", at).unwrap();
        EndpointUpdated::new(&ep, &Observation::success(at, 8.0))
    }

    #[test]
    fn broadcast_reaches_subscribers() {
        let publisher = BroadcastPublisher::new(8);
        let mut a = publisher.subscribe();
        let mut b = publisher.subscribe();

        let ev = event();
        publisher.publish(&ev);

        assert_eq!(a.try_recv().unwrap(), ev);
        assert_eq!(b.try_recv().unwrap(), ev);
        assert!(a.try_recv().is_err());
    }

    #[test]
    fn broadcast_without_subscribers_is_silent() {
        let publisher = BroadcastPublisher::new(1);
        publisher.publish(&event());
    }
}
