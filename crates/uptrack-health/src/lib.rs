//! uptrack-health: probing and the periodic endpoint sweep.
//!
//! Turns network probes into observations, folds them into stored
//! endpoints, and announces every update.
//!
//! # Architecture
//!
//! ```text
//! UptimeMonitor
//!   ├── sweep()
//!   │   ├── StoreAccess::open() → list_endpoints()          (store open)
//!   │   ├── one task per endpoint, bounded by a semaphore    (store closed)
//!   │   │   ├── Prober::probe(url) → ProbeReport | ProbeError
//!   │   │   └── into_observation() → Observation
//!   │   └── StoreAccess::open(), then per endpoint:          (store open)
//!   │       ├── Endpoint::apply_observation() + StateStore::save_endpoint()
//!   │       ├── StateStore::record_health_check()
//!   │       └── EventPublisher::publish(EndpointUpdated)
//!   └── run(): sweep on a fixed interval until shutdown
//! ```
//!
//! A failed probe is an ordinary `Down` observation; only storage
//! failures and rejected observations are counted as sweep failures.

pub mod monitor;
pub mod probe;
pub mod publisher;

pub use monitor::{StoreAccess, SweepSummary, UptimeMonitor, DEFAULT_CONCURRENCY};
pub use probe::{
    into_observation, AnyProber, HttpProber, ProbeError, ProbeReport, ProbeTarget, Prober,
    TcpProber,
};
pub use publisher::{BroadcastPublisher, EventPublisher, TracingPublisher};
