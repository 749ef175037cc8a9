//! Control-plane job dispatch command.

use serde::{Deserialize, Serialize};

/// Command sent from the reactor to an agent over the control plane.
///
/// The agent is expected to respond by opening a data-plane connection for
/// the given job id and streaming the query result back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCommand {
    pub id: String,
    pub query: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_round_trip() {
        let cmd = JobCommand {
            id: "job_live_120000".to_string(),
            query: "SELECT * FROM users LIMIT 100".to_string(),
        };
        let json = serde_json::to_string(&cmd).unwrap();
        let back: JobCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cmd);
    }

    #[test]
    fn test_field_names_stable() {
        let json = r#"{"id":"j1","query":"SELECT 1"}"#;
        let cmd: JobCommand = serde_json::from_str(json).unwrap();
        assert_eq!(cmd.id, "j1");
    }
}
