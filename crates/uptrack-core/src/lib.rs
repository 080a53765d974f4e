//! uptrack-core: endpoint status aggregation for uptrack.
//!
//! Folds a stream of timestamped probe observations into a per-endpoint
//! history of daily statistics and incidents, and derives a lifetime
//! availability percentage from it.
//!
//! # Architecture
//!
//! ```text
//! Endpoint (aggregate)
//!   ├── LinkState            Up | Down { since }
//!   ├── DailyStatus × ≤90    most recent first, one per UTC day
//!   │   └── Incident × n     most recent first
//!   └── lifetime counters    first check, cumulative downtime minutes
//! ```
//!
//! Persistence, probing, and event delivery live in `uptrack-state` and
//! `uptrack-health`; this crate only defines the state and its transitions.

pub mod config;
pub mod document;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod observation;
pub mod status;
pub mod types;

pub use config::{ConfigError, UptrackConfig};
pub use document::EndpointDocument;
pub use endpoint::{
    Endpoint, LinkState, AVAILABILITY_DECIMALS, HEALTH_CHECK_INTERVAL_MINUTES, MAX_DAILY_STATUSES,
};
pub use error::{EndpointError, EndpointResult};
pub use event::EndpointUpdated;
pub use observation::{Observation, Outcome};
pub use status::{DailyStatus, Incident};
pub use types::*;
