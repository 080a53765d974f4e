//! Error types for the endpoint aggregate.

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

/// Result type alias for aggregate operations.
pub type EndpointResult<T> = Result<T, EndpointError>;

/// Errors raised while building or mutating an [`Endpoint`](crate::Endpoint).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EndpointError {
    #[error("the {0} is mandatory")]
    MissingField(&'static str),

    #[error("invalid endpoint id: {0}")]
    InvalidId(String),

    #[error("latency {0} ms is not a finite, non-negative number")]
    InvalidLatency(f64),

    #[error("observation for {observed} predates the latest status day {latest}")]
    StaleObservation {
        observed: NaiveDate,
        latest: NaiveDate,
    },

    #[error("observation at {observed} predates the outage that started at {outage_started_at}")]
    BeforeOutageStart {
        observed: DateTime<Utc>,
        outage_started_at: DateTime<Utc>,
    },
}
