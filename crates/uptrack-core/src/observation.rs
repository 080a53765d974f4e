//! A single probe outcome, as fed into [`Endpoint::apply_observation`].
//!
//! [`Endpoint::apply_observation`]: crate::Endpoint::apply_observation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of one health check against an endpoint.
///
/// Latency is only carried by successful checks, so a failed observation
/// can never leak a round-trip time into the daily statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    timestamp: DateTime<Utc>,
    outcome: Outcome,
}

/// Whether the probe reached the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Up {
        #[serde(rename = "latencyMs")]
        latency_ms: f64,
    },
    Down,
}

impl Observation {
    /// A successful check answered in `latency_ms` milliseconds.
    pub fn success(timestamp: DateTime<Utc>, latency_ms: f64) -> Self {
        Self {
            timestamp,
            outcome: Outcome::Up { latency_ms },
        }
    }

    /// A failed check (timeout, refused connection, bad status, ...).
    pub fn failure(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            outcome: Outcome::Down,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, Outcome::Up { .. })
    }

    /// Round-trip time, absent for failed checks.
    pub fn latency_ms(&self) -> Option<f64> {
        match self.outcome {
            Outcome::Up { latency_ms } => Some(latency_ms),
            Outcome::Down => None,
        }
    }
}
