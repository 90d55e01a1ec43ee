use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How the failover was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailoverMode {
    /// Operator-initiated drill or maintenance failover.
    Planned,
    /// Automated or manual response to a suspected primary outage.
    Unplanned,
}

impl FailoverMode {
    /// Returns the canonical lowercase string used in records and the CLI.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Unplanned => "unplanned",
        }
    }
}

impl fmt::Display for FailoverMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailoverMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planned" => Ok(Self::Planned),
            "unplanned" => Ok(Self::Unplanned),
            other => Err(format!(
                "invalid failover mode '{other}', must be 'planned' or 'unplanned'"
            )),
        }
    }
}

/// Immutable input that starts one failover execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverRequest {
    /// Trigger mode for this request.
    pub mode: FailoverMode,
    /// Free-text reason supplied by the trigger.
    pub reason: String,
    /// When the request was created, in UTC.
    pub requested_at: DateTime<Utc>,
}

impl FailoverRequest {
    /// Constructs a request stamped with the current time.
    #[must_use]
    pub fn new(mode: FailoverMode, reason: impl Into<String>) -> Self {
        Self {
            mode,
            reason: reason.into(),
            requested_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_round_trips_through_str() {
        assert_eq!(FailoverMode::from_str("planned").unwrap(), FailoverMode::Planned);
        assert_eq!(
            FailoverMode::from_str("unplanned").unwrap(),
            FailoverMode::Unplanned
        );
        assert!(FailoverMode::from_str("forced").is_err());
        assert_eq!(FailoverMode::Unplanned.as_str(), "unplanned");
    }

    #[test]
    fn request_is_stamped() {
        let before = Utc::now();
        let req = FailoverRequest::new(FailoverMode::Planned, "quarterly drill");
        assert!(req.requested_at >= before);
        assert_eq!(req.reason, "quarterly drill");
    }
}
