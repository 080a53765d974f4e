//! `EndpointUpdated`: emitted once per processed health check.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::endpoint::Endpoint;
use crate::observation::Observation;
use crate::types::{EndpointId, EndpointName, EndpointUrl, OwnerId};

/// Observation fields plus the identity of the endpoint they belong to.
///
/// Doubles as the health-check log record kept by the state store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointUpdated {
    pub endpoint_id: EndpointId,
    pub owner_id: OwnerId,
    pub url: EndpointUrl,
    pub name: EndpointName,
    pub timestamp: DateTime<Utc>,
    pub succeeded: bool,
    pub latency_ms: Option<f64>,
}

impl EndpointUpdated {
    pub fn new(endpoint: &Endpoint, obs: &Observation) -> Self {
        Self {
            endpoint_id: endpoint.id().clone(),
            owner_id: endpoint.owner_id().clone(),
            url: endpoint.url().clone(),
            name: endpoint.name().clone(),
            timestamp: obs.timestamp(),
            succeeded: obs.succeeded(),
            latency_ms: obs.latency_ms(),
        }
    }

    /// Rebuild the observation carried by this event.
    ///
    /// A success without a recorded latency is treated as a failure.
    pub fn to_observation(&self) -> Observation {
        match (self.succeeded, self.latency_ms) {
            (true, Some(latency)) => Observation::success(self.timestamp, latency),
            _ => Observation::failure(self.timestamp),
        }
    }
}
