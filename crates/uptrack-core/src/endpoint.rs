//! The endpoint aggregate: folds probe observations into a bounded,
//! day-bucketed status history and lifetime downtime counters.
//!
//! Each call to [`Endpoint::apply_observation`] runs, in order:
//!
//! 1. downtime bookkeeping and the Up/Down transition,
//! 2. selection (or creation) of the status bucket for the observation's UTC day,
//! 3. the running latency mean for that bucket,
//! 4. incident bookkeeping for failed checks,
//! 5. first-check and last-updated timestamps.
//!
//! The aggregate performs no I/O and no logging; callers persist and
//! publish after mutating it.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::EndpointDocument;
use crate::error::{EndpointError, EndpointResult};
use crate::observation::Observation;
use crate::status::DailyStatus;
use crate::types::{EndpointId, EndpointName, EndpointUrl, OwnerId};

/// Downtime credited for every check applied while the endpoint is down.
pub const HEALTH_CHECK_INTERVAL_MINUTES: u64 = 1;

/// Number of daily buckets retained per endpoint.
pub const MAX_DAILY_STATUSES: usize = 90;

/// Decimal places kept by [`Endpoint::availability`].
pub const AVAILABILITY_DECIMALS: i32 = 4;

/// Whether the endpoint is currently considered reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Up,
    Down { since: DateTime<Utc> },
}

impl LinkState {
    pub fn is_down(&self) -> bool {
        matches!(self, LinkState::Down { .. })
    }

    /// Start of the ongoing outage, if any.
    pub fn down_since(&self) -> Option<DateTime<Utc>> {
        match self {
            LinkState::Up => None,
            LinkState::Down { since } => Some(*since),
        }
    }

    /// State after applying `obs`. An ongoing outage keeps its original start.
    fn after(self, obs: &Observation) -> Self {
        match (self, obs.succeeded()) {
            (_, true) => LinkState::Up,
            (LinkState::Down { since }, false) => LinkState::Down { since },
            (LinkState::Up, false) => LinkState::Down {
                since: obs.timestamp(),
            },
        }
    }
}

impl From<Option<DateTime<Utc>>> for LinkState {
    fn from(outage_started_at: Option<DateTime<Utc>>) -> Self {
        match outage_started_at {
            Some(since) => LinkState::Down { since },
            None => LinkState::Up,
        }
    }
}

/// A monitored endpoint and its status history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "EndpointDocument", try_from = "EndpointDocument")]
pub struct Endpoint {
    pub(crate) id: EndpointId,
    pub(crate) owner_id: OwnerId,
    pub(crate) url: EndpointUrl,
    pub(crate) name: EndpointName,
    pub(crate) last_updated: DateTime<Utc>,
    /// Most recent first, at most [`MAX_DAILY_STATUSES`] entries.
    pub(crate) daily_statuses: VecDeque<DailyStatus>,
    pub(crate) first_health_check_at: Option<DateTime<Utc>>,
    pub(crate) cumulative_downtime_minutes: u64,
    pub(crate) link: LinkState,
}

impl Endpoint {
    /// Register a new endpoint. Owner, url and name must be non-empty.
    pub fn create(
        owner_id: impl Into<String>,
        url: impl Into<String>,
        name: impl Into<String>,
    ) -> EndpointResult<Self> {
        Self::create_at(owner_id, url, name, Utc::now())
    }

    /// [`Endpoint::create`] with an explicit creation instant.
    pub fn create_at(
        owner_id: impl Into<String>,
        url: impl Into<String>,
        name: impl Into<String>,
        now: DateTime<Utc>,
    ) -> EndpointResult<Self> {
        let owner_id = OwnerId::new(owner_id)?;
        let url = EndpointUrl::new(url)?;
        let name = EndpointName::new(name)?;
        Ok(Self {
            id: EndpointId::generate(),
            owner_id,
            url,
            name,
            last_updated: now,
            daily_statuses: VecDeque::new(),
            first_health_check_at: None,
            cumulative_downtime_minutes: 0,
            link: LinkState::Up,
        })
    }

    // ── Mutation ───────────────────────────────────────────────────

    /// Fold one health check into the endpoint, stamping it with the current time.
    pub fn apply_observation(&mut self, obs: &Observation) -> EndpointResult<()> {
        self.apply_observation_at(obs, Utc::now())
    }

    /// Fold one health check into the endpoint.
    ///
    /// `now` becomes `last_updated` (and `first_health_check_at` on the very
    /// first check). Observations older than the latest bucket's day, older
    /// than the start of the ongoing outage, or carrying a NaN, infinite or
    /// negative latency are rejected untouched.
    pub fn apply_observation_at(
        &mut self,
        obs: &Observation,
        now: DateTime<Utc>,
    ) -> EndpointResult<()> {
        self.ensure_admissible(obs)?;

        let prior = self.link;
        if prior.is_down() {
            self.cumulative_downtime_minutes += HEALTH_CHECK_INTERVAL_MINUTES;
        }
        self.link = prior.after(obs);

        let day = obs.timestamp().date_naive();
        let reuse_today = self
            .daily_statuses
            .front()
            .is_some_and(|status| status.date() == day);

        if reuse_today {
            if let (Some(status), Some(latency)) =
                (self.daily_statuses.front_mut(), obs.latency_ms())
            {
                status.record_success(latency);
            }
        } else {
            self.daily_statuses.push_front(DailyStatus::open(obs));
            self.daily_statuses.truncate(MAX_DAILY_STATUSES);
        }

        if !obs.succeeded() {
            if let Some(status) = self.daily_statuses.front_mut() {
                let extended = match prior.down_since() {
                    Some(since) => {
                        status.extend_latest_incident(minutes_between(since, obs.timestamp()))
                    }
                    None => false,
                };
                if !extended {
                    status.open_incident(obs.timestamp());
                }
            }
        }

        if self.first_health_check_at.is_none() {
            self.first_health_check_at = Some(now);
        }
        self.last_updated = now;
        Ok(())
    }

    fn ensure_admissible(&self, obs: &Observation) -> EndpointResult<()> {
        if let Some(latency) = obs.latency_ms() {
            if !latency.is_finite() || latency < 0.0 {
                return Err(EndpointError::InvalidLatency(latency));
            }
        }
        let observed = obs.timestamp();
        if let Some(latest) = self.daily_statuses.front() {
            if observed.date_naive() < latest.date() {
                return Err(EndpointError::StaleObservation {
                    observed: observed.date_naive(),
                    latest: latest.date(),
                });
            }
        }
        if let LinkState::Down { since } = self.link {
            if observed < since {
                return Err(EndpointError::BeforeOutageStart {
                    observed,
                    outage_started_at: since,
                });
            }
        }
        Ok(())
    }

    // ── Derived reads ──────────────────────────────────────────────

    /// Lifetime availability percentage as of now.
    pub fn availability(&self) -> f64 {
        self.availability_at(Utc::now())
    }

    /// Lifetime availability percentage as of `now`, rounded to
    /// [`AVAILABILITY_DECIMALS`] places. Zero before the first check and
    /// whenever no time has elapsed since it.
    pub fn availability_at(&self, now: DateTime<Utc>) -> f64 {
        let Some(first) = self.first_health_check_at else {
            return 0.0;
        };
        let elapsed = minutes_between(first, now);
        if elapsed <= 0.0 {
            return 0.0;
        }
        let ratio = (elapsed - self.cumulative_downtime_minutes as f64) / elapsed;
        round_to(ratio * 100.0, AVAILABILITY_DECIMALS)
    }

    // ── Accessors ──────────────────────────────────────────────────

    pub fn id(&self) -> &EndpointId {
        &self.id
    }

    pub fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }

    pub fn url(&self) -> &EndpointUrl {
        &self.url
    }

    pub fn name(&self) -> &EndpointName {
        &self.name
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    /// Status buckets, most recent first.
    pub fn daily_statuses(&self) -> impl ExactSizeIterator<Item = &DailyStatus> {
        self.daily_statuses.iter()
    }

    /// The most recent bucket, if any check was ever applied.
    pub fn current_status(&self) -> Option<&DailyStatus> {
        self.daily_statuses.front()
    }

    pub fn first_health_check_at(&self) -> Option<DateTime<Utc>> {
        self.first_health_check_at
    }

    pub fn cumulative_downtime_minutes(&self) -> u64 {
        self.cumulative_downtime_minutes
    }

    pub fn link_state(&self) -> LinkState {
        self.link
    }

    pub fn is_down(&self) -> bool {
        self.link.is_down()
    }

    pub fn outage_started_at(&self) -> Option<DateTime<Utc>> {
        self.link.down_since()
    }

    /// Incidents across all retained buckets.
    pub fn incident_count(&self) -> usize {
        self.daily_statuses.iter().map(|s| s.incidents().len()).sum()
    }
}

fn minutes_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 60_000.0
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
