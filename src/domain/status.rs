use serde::{Deserialize, Serialize};
use std::fmt;

/// Acceptance state written back to a configuration object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusState {
    Pending,
    Accepted,
    Warning,
    Rejected,
}

impl fmt::Display for StatusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatusState::Pending => "Pending",
            StatusState::Accepted => "Accepted",
            StatusState::Warning => "Warning",
            StatusState::Rejected => "Rejected",
        };
        f.write_str(s)
    }
}

/// Status of one object as seen by one reporter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatus {
    pub state: StatusState,
    #[serde(default)]
    pub reason: String,
    pub reported_by: String,
    /// Resource version the status was computed from
    pub observed_generation: u64,
}

impl ResourceStatus {
    pub fn pending(owner: impl Into<String>) -> Self {
        Self {
            state: StatusState::Pending,
            reason: String::new(),
            reported_by: owner.into(),
            observed_generation: 0,
        }
    }
}
