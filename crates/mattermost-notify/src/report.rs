//! Per-target results of a send.

use serde::Serialize;

use crate::client::ChannelRef;
use crate::error::BridgeError;

/// A message that reached its channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Delivery {
    pub channel: ChannelRef,
    pub post_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
}

/// Result for one target name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetOutcome {
    pub target: String,
    pub result: Result<Delivery, BridgeError>,
}

/// Collected results of one send, in target order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReport {
    pub outcomes: Vec<TargetOutcome>,
}

impl SendReport {
    /// Report the same error for every target.
    #[must_use]
    pub fn failed_all(targets: &[String], error: &BridgeError) -> Self {
        Self {
            outcomes: targets
                .iter()
                .map(|target| TargetOutcome {
                    target: target.clone(),
                    result: Err(error.clone()),
                })
                .collect(),
        }
    }

    /// True when no target failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    pub fn delivered(&self) -> impl Iterator<Item = (&str, &Delivery)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok().map(|d| (o.target.as_str(), d)))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &BridgeError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.target.as_str(), e)))
    }

    /// Outcome for a given target name.
    #[must_use]
    pub fn get(&self, target: &str) -> Option<&Result<Delivery, BridgeError>> {
        self.outcomes
            .iter()
            .find(|o| o.target == target)
            .map(|o| &o.result)
    }

    /// One line per failed target, e.g. `alerts: Channel not found: alerts`.
    #[must_use]
    pub fn failure_summary(&self) -> String {
        self.failures()
            .map(|(target, e)| format!("{target}: {e}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NotFound;

    fn delivery(name: &str) -> Delivery {
        Delivery {
            channel: ChannelRef {
                team_id: "t1".to_string(),
                channel_id: format!("{name}-id"),
                name: name.to_string(),
            },
            post_id: "p1".to_string(),
            file_id: None,
        }
    }

    #[test]
    fn test_mixed_report() {
        let report = SendReport {
            outcomes: vec![
                TargetOutcome {
                    target: "general".to_string(),
                    result: Ok(delivery("general")),
                },
                TargetOutcome {
                    target: "nope".to_string(),
                    result: Err(NotFound::Channel {
                        name: "nope".to_string(),
                    }
                    .into()),
                },
            ],
        };

        assert!(!report.is_success());
        assert_eq!(report.delivered().count(), 1);
        assert_eq!(report.failures().count(), 1);
        assert!(report.get("general").unwrap().is_ok());
        assert_eq!(report.failure_summary(), "nope: Channel not found: nope");
    }

    #[test]
    fn test_failed_all() {
        let targets = vec!["a".to_string(), "b".to_string()];
        let report = SendReport::failed_all(&targets, &BridgeError::File("gone".to_string()));
        assert_eq!(report.failures().count(), 2);
        assert!(report.delivered().next().is_none());
    }

    #[test]
    fn test_empty_report_is_success() {
        assert!(SendReport::default().is_success());
    }
}
