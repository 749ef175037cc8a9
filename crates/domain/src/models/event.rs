//! Dashboard event stream payloads.

use serde::{Deserialize, Serialize};

/// Event fanned out to dashboard subscribers.
///
/// Events are lossy: the hub drops slow subscribers rather than retaining
/// or replaying updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardUpdate {
    #[serde(rename = "type")]
    pub kind: UpdateKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_count: Option<i64>,
}

/// Tag identifying the kind of dashboard update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    JobStart,
    Progress,
    JobComplete,
    AgentUpdate,
}

impl DashboardUpdate {
    pub fn job_start(job_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            kind: UpdateKind::JobStart,
            job_id: Some(job_id.into()),
            rows: None,
            status: Some(status.into()),
            agent_count: None,
        }
    }

    pub fn progress(job_id: impl Into<String>, rows: u64) -> Self {
        Self {
            kind: UpdateKind::Progress,
            job_id: Some(job_id.into()),
            rows: Some(rows),
            status: None,
            agent_count: None,
        }
    }

    pub fn job_complete(job_id: impl Into<String>, rows: u64) -> Self {
        Self {
            kind: UpdateKind::JobComplete,
            job_id: Some(job_id.into()),
            rows: Some(rows),
            status: None,
            agent_count: None,
        }
    }

    pub fn agent_update(agent_count: i64) -> Self {
        Self {
            kind: UpdateKind::AgentUpdate,
            job_id: None,
            rows: None,
            status: None,
            agent_count: Some(agent_count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_serialization_omits_empty_fields() {
        let event = DashboardUpdate::progress("job-1", 100);
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"progress","job_id":"job-1","rows":100}"#);
    }

    #[test]
    fn test_agent_update_serialization() {
        let event = DashboardUpdate::agent_update(3);
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"agent_update","agent_count":3}"#);
    }

    #[test]
    fn test_job_start_round_trip() {
        let event = DashboardUpdate::job_start("job-2", "dispatched");
        let json = serde_json::to_string(&event).unwrap();
        let back: DashboardUpdate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
