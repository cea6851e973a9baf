use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::delta::StepTokenDelta;

/// Latest pass result for a session plus report bookkeeping.
#[derive(Debug, Clone, Serialize)]
pub struct SessionTokenStats {
    pub latest: StepTokenDelta,
    pub updated_at: DateTime<Utc>,
    pub last_reported_at: Option<DateTime<Utc>>,
    pub last_reported_net: Option<i64>,
    #[serde(skip)]
    revision: u64,
    #[serde(skip)]
    reported_revision: Option<u64>,
    #[serde(skip)]
    report_in_flight: bool,
}

impl SessionTokenStats {
    fn new(delta: StepTokenDelta) -> Self {
        Self {
            latest: delta,
            updated_at: Utc::now(),
            last_reported_at: None,
            last_reported_net: None,
            revision: 0,
            reported_revision: None,
            report_in_flight: false,
        }
    }

    pub fn net_saved(&self) -> i64 {
        self.latest.net_saved()
    }

    /// Never reported, or updated since the last report.
    pub fn is_report_due(&self) -> bool {
        self.reported_revision != Some(self.revision)
    }
}

/// One stats snapshot per session. Each pass replaces the previous snapshot;
/// values are never summed across passes.
#[derive(Debug, Default)]
pub struct SessionStatsStore {
    sessions: HashMap<String, SessionTokenStats>,
}

impl SessionStatsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the session's snapshot with the result of the latest pass.
    pub fn record(&mut self, session_id: &str, delta: StepTokenDelta) {
        match self.sessions.get_mut(session_id) {
            Some(stats) => {
                stats.latest = delta;
                stats.updated_at = Utc::now();
                stats.revision += 1;
            }
            None => {
                self.sessions
                    .insert(session_id.to_string(), SessionTokenStats::new(delta));
            }
        }
    }

    pub fn get(&self, session_id: &str) -> Option<&SessionTokenStats> {
        self.sessions.get(session_id)
    }

    pub fn is_report_due(&self, session_id: &str) -> bool {
        self.sessions
            .get(session_id)
            .is_some_and(SessionTokenStats::is_report_due)
    }

    /// Claim the session's report slot. Returns false if a report is already
    /// being sent or nothing is due.
    pub fn begin_report(&mut self, session_id: &str) -> bool {
        match self.sessions.get_mut(session_id) {
            Some(stats) if !stats.report_in_flight && stats.is_report_due() => {
                stats.report_in_flight = true;
                true
            }
            _ => false,
        }
    }

    /// Release the report slot. On success the current snapshot is marked
    /// reported; on failure it stays due for the next attempt.
    pub fn finish_report(&mut self, session_id: &str, delivered: bool) {
        if let Some(stats) = self.sessions.get_mut(session_id) {
            stats.report_in_flight = false;
        }
        if delivered {
            self.mark_reported(session_id);
        }
    }

    pub fn mark_reported(&mut self, session_id: &str) {
        if let Some(stats) = self.sessions.get_mut(session_id) {
            stats.last_reported_at = Some(Utc::now());
            stats.last_reported_net = Some(stats.net_saved());
            stats.reported_revision = Some(stats.revision);
        }
    }

    pub fn is_report_in_flight(&self, session_id: &str) -> bool {
        self.sessions
            .get(session_id)
            .is_some_and(|s| s.report_in_flight)
    }
}
