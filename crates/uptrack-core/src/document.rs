//! Persisted shape of an [`Endpoint`].
//!
//! Storage and transport collaborators see exactly these fields; the
//! in-memory [`LinkState`] is flattened back to a nullable outage start.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::endpoint::{Endpoint, LinkState, MAX_DAILY_STATUSES};
use crate::error::EndpointError;
use crate::status::DailyStatus;
use crate::types::{EndpointId, EndpointName, EndpointUrl, OwnerId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDocument {
    pub id: EndpointId,
    pub owner_id: OwnerId,
    pub url: EndpointUrl,
    pub name: EndpointName,
    pub last_updated: DateTime<Utc>,
    /// Most recent first.
    pub daily_statuses: Vec<DailyStatus>,
    pub first_health_check_at: Option<DateTime<Utc>>,
    pub cumulative_downtime_minutes: u64,
    pub outage_started_at: Option<DateTime<Utc>>,
}

impl From<Endpoint> for EndpointDocument {
    fn from(endpoint: Endpoint) -> Self {
        Self {
            id: endpoint.id,
            owner_id: endpoint.owner_id,
            url: endpoint.url,
            name: endpoint.name,
            last_updated: endpoint.last_updated,
            daily_statuses: endpoint.daily_statuses.into(),
            first_health_check_at: endpoint.first_health_check_at,
            cumulative_downtime_minutes: endpoint.cumulative_downtime_minutes,
            outage_started_at: endpoint.link.down_since(),
        }
    }
}

impl TryFrom<EndpointDocument> for Endpoint {
    type Error = EndpointError;

    fn try_from(doc: EndpointDocument) -> Result<Self, Self::Error> {
        let id = EndpointId::parse(doc.id.as_str())?;
        let mut daily_statuses = VecDeque::from(doc.daily_statuses);
        daily_statuses.truncate(MAX_DAILY_STATUSES);
        Ok(Endpoint {
            id,
            owner_id: doc.owner_id,
            url: doc.url,
            name: doc.name,
            last_updated: doc.last_updated,
            daily_statuses,
            first_health_check_at: doc.first_health_check_at,
            cumulative_downtime_minutes: doc.cumulative_downtime_minutes,
            link: LinkState::from(doc.outage_started_at),
        })
    }
}
