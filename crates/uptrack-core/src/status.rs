//! Per-day status buckets and the incidents recorded inside them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::observation::Observation;

/// A contiguous outage span recorded within a [`DailyStatus`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    started_at: DateTime<Utc>,
    /// Minutes from the outage start to the latest failed check; frozen on recovery.
    duration_minutes: f64,
    /// Reserved for diagnostic text, currently always empty.
    #[serde(default)]
    reason: String,
}

impl Incident {
    fn open(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            duration_minutes: 0.0,
            reason: String::new(),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn duration_minutes(&self) -> f64 {
        self.duration_minutes
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Aggregate statistics for one UTC calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStatus {
    date: NaiveDate,
    /// Running mean over successful checks only; 0 while there are none.
    average_response_time_ms: f64,
    total_successful_checks: u64,
    /// Most recent first.
    incidents: Vec<Incident>,
}

impl DailyStatus {
    /// Start a bucket for the observation's day, already counting the observation's latency.
    pub(crate) fn open(obs: &Observation) -> Self {
        let (average_response_time_ms, total_successful_checks) = match obs.latency_ms() {
            Some(latency) => (latency, 1),
            None => (0.0, 0),
        };
        Self {
            date: obs.timestamp().date_naive(),
            average_response_time_ms,
            total_successful_checks,
            incidents: Vec::new(),
        }
    }

    /// Fold one more successful latency sample into the running mean.
    pub(crate) fn record_success(&mut self, latency_ms: f64) {
        let count = self.total_successful_checks as f64;
        self.average_response_time_ms =
            (self.average_response_time_ms * count + latency_ms) / (count + 1.0);
        self.total_successful_checks += 1;
    }

    pub(crate) fn open_incident(&mut self, started_at: DateTime<Utc>) {
        self.incidents.insert(0, Incident::open(started_at));
    }

    /// Stretch the latest incident so it covers `duration_minutes`.
    ///
    /// Returns false when the bucket holds no incident to extend.
    pub(crate) fn extend_latest_incident(&mut self, duration_minutes: f64) -> bool {
        match self.incidents.first_mut() {
            Some(incident) => {
                incident.duration_minutes = duration_minutes;
                true
            }
            None => false,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn average_response_time_ms(&self) -> f64 {
        self.average_response_time_ms
    }

    pub fn total_successful_checks(&self) -> u64 {
        self.total_successful_checks
    }

    pub fn incidents(&self) -> &[Incident] {
        &self.incidents
    }

    pub fn latest_incident(&self) -> Option<&Incident> {
        self.incidents.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, 0).unwrap()
    }

    #[test]
    fn open_from_success_counts_first_sample() {
        let status = DailyStatus::open(&Observation::success(at(8, 0), 120.0));
        assert_eq!(status.date(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(status.average_response_time_ms(), 120.0);
        assert_eq!(status.total_successful_checks(), 1);
        assert!(status.incidents().is_empty());
    }

    #[test]
    fn open_from_failure_has_zero_average() {
        let status = DailyStatus::open(&Observation::failure(at(8, 0)));
        assert_eq!(status.average_response_time_ms(), 0.0);
        assert_eq!(status.total_successful_checks(), 0);
    }

    #[test]
    fn running_mean_updates() {
        let mut status = DailyStatus::open(&Observation::success(at(8, 0), 100.0));
        status.record_success(200.0);
        status.record_success(300.0);
        assert_eq!(status.total_successful_checks(), 3);
        assert!((status.average_response_time_ms() - 200.0).abs() < 1e-9);
    }

    #[test]
    fn incidents_are_most_recent_first() {
        let mut status = DailyStatus::open(&Observation::failure(at(8, 0)));
        status.open_incident(at(8, 0));
        status.open_incident(at(9, 0));
        assert_eq!(status.incidents().len(), 2);
        assert_eq!(status.latest_incident().unwrap().started_at(), at(9, 0));

        assert!(status.extend_latest_incident(3.0));
        assert_eq!(status.incidents()[0].duration_minutes(), 3.0);
        assert_eq!(status.incidents()[1].duration_minutes(), 0.0);
    }

    #[test]
    fn extend_without_incident_is_noop() {
        let mut status = DailyStatus::open(&Observation::success(at(8, 0), 1.0));
        assert!(!status.extend_latest_incident(5.0));
    }

    #[test]
    fn incident_reason_defaults_when_missing() {
        let json = r#"{"startedAt":"2024-03-01T08:00:00Z","durationMinutes":2.0}"#;
        let incident: Incident = serde_json::from_str(json).unwrap();
        assert_eq!(incident.reason(), "");
        assert_eq!(incident.duration_minutes(), 2.0);
    }
}
