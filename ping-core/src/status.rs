// Debounced server status derived from probe outcomes.
// Invariants: every returned transition is notify-worthy; silent updates return None.

use serde::Serialize;

use crate::model::ProbeResponse;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatusValue {
    Disabled,
    Waiting,
    Neutral {
        #[serde(rename = "lastResult")]
        last_result: Option<ProbeResponse>,
    },
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Disabled,
    Waiting,
    Neutral,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    Neutral,
    Error,
}

impl StatusValue {
    pub fn kind(&self) -> StatusKind {
        match self {
            StatusValue::Disabled => StatusKind::Disabled,
            StatusValue::Waiting => StatusKind::Waiting,
            StatusValue::Neutral { .. } => StatusKind::Neutral,
            StatusValue::Error => StatusKind::Error,
        }
    }

    /// Short text shown next to the indicator icon.
    pub fn label(&self) -> String {
        match self {
            StatusValue::Neutral {
                last_result: Some(result),
            } => format!("{}/{}", result.users, result.max_users),
            StatusValue::Waiting => "...".to_string(),
            _ => String::new(),
        }
    }

    pub fn indicator(&self) -> Indicator {
        match self {
            StatusValue::Error => Indicator::Error,
            _ => Indicator::Neutral,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusTransition {
    pub from: StatusKind,
    pub to: StatusKind,
}

#[derive(Clone, Debug)]
pub struct StatusTracker {
    status: StatusValue,
    last_result: Option<ProbeResponse>,
}

impl StatusTracker {
    pub fn new(enabled: bool) -> Self {
        let status = if enabled {
            StatusValue::Neutral { last_result: None }
        } else {
            StatusValue::Disabled
        };
        Self {
            status,
            last_result: None,
        }
    }

    pub fn status(&self) -> &StatusValue {
        &self.status
    }

    pub fn last_result(&self) -> Option<&ProbeResponse> {
        self.last_result.as_ref()
    }

    pub fn disable(&mut self) -> Option<StatusTransition> {
        self.last_result = None;
        if self.status == StatusValue::Disabled {
            return None;
        }
        Some(self.set(StatusValue::Disabled))
    }

    pub fn set_waiting(&mut self) -> Option<StatusTransition> {
        if self.status == StatusValue::Waiting {
            return None;
        }
        Some(self.set(StatusValue::Waiting))
    }

    pub fn apply_success(&mut self, result: ProbeResponse) -> Option<StatusTransition> {
        if self.status == StatusValue::Disabled {
            return None;
        }
        let changed = self
            .last_result
            .as_ref()
            .map(|last| last.occupancy_differs(&result))
            .unwrap_or(true);
        if !changed && self.status.kind() == StatusKind::Neutral {
            return None;
        }
        self.last_result = Some(result.clone());
        Some(self.set(StatusValue::Neutral {
            last_result: Some(result),
        }))
    }

    pub fn apply_failure(&mut self) -> Option<StatusTransition> {
        if matches!(self.status, StatusValue::Disabled | StatusValue::Error) {
            return None;
        }
        Some(self.set(StatusValue::Error))
    }

    fn set(&mut self, next: StatusValue) -> StatusTransition {
        let transition = StatusTransition {
            from: self.status.kind(),
            to: next.kind(),
        };
        self.status = next;
        transition
    }
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Version;

    fn response(users: u32, max_users: u32) -> ProbeResponse {
        ProbeResponse {
            version: Version::new(1, 4, 0),
            users,
            max_users,
            bandwidth: 72_000,
        }
    }

    #[test]
    fn initial_state_follows_enabled_flag() {
        assert_eq!(
            StatusTracker::new(true).status(),
            &StatusValue::Neutral { last_result: None }
        );
        assert_eq!(StatusTracker::new(false).status(), &StatusValue::Disabled);
    }

    #[test]
    fn first_result_always_notifies() {
        let mut tracker = StatusTracker::new(true);
        let transition = tracker.apply_success(response(0, 0)).unwrap();
        assert_eq!(transition.from, StatusKind::Neutral);
        assert_eq!(transition.to, StatusKind::Neutral);
        assert_eq!(tracker.status().label(), "0/0");
    }

    #[test]
    fn identical_results_notify_once() {
        let mut tracker = StatusTracker::new(true);
        assert!(tracker.apply_success(response(3, 10)).is_some());
        assert!(tracker.apply_success(response(3, 10)).is_none());
    }

    #[test]
    fn changed_occupancy_notifies() {
        let mut tracker = StatusTracker::new(true);
        assert!(tracker.apply_success(response(5, 10)).is_some());
        assert!(tracker.apply_success(response(6, 10)).is_some());
        assert!(tracker.apply_success(response(6, 10)).is_none());
        assert!(tracker.apply_success(response(6, 20)).is_some());
        assert_eq!(tracker.last_result(), Some(&response(6, 20)));
    }

    #[test]
    fn bandwidth_change_alone_is_silent() {
        let mut tracker = StatusTracker::new(true);
        tracker.apply_success(response(2, 8));
        let mut next = response(2, 8);
        next.bandwidth = 128_000;
        assert!(tracker.apply_success(next).is_none());
        assert_eq!(tracker.last_result().unwrap().bandwidth, 72_000);
    }

    #[test]
    fn failures_are_idempotent() {
        let mut tracker = StatusTracker::new(true);
        tracker.apply_success(response(1, 5));
        let transition = tracker.apply_failure().unwrap();
        assert_eq!(transition.from, StatusKind::Neutral);
        assert_eq!(transition.to, StatusKind::Error);
        assert!(tracker.apply_failure().is_none());
        assert_eq!(tracker.status(), &StatusValue::Error);
        assert_eq!(tracker.status().indicator(), Indicator::Error);
        assert_eq!(tracker.status().label(), "");
    }

    #[test]
    fn recovery_after_error_notifies_with_same_result() {
        let mut tracker = StatusTracker::new(true);
        tracker.apply_success(response(1, 5));
        tracker.apply_failure();
        let transition = tracker.apply_success(response(1, 5)).unwrap();
        assert_eq!(transition.from, StatusKind::Error);
        assert_eq!(tracker.status().indicator(), Indicator::Neutral);
    }

    #[test]
    fn waiting_is_entered_once() {
        let mut tracker = StatusTracker::new(true);
        assert!(tracker.set_waiting().is_some());
        assert!(tracker.set_waiting().is_none());
        assert_eq!(tracker.status().label(), "...");
        assert!(tracker.apply_success(response(4, 4)).is_some());
    }

    #[test]
    fn result_after_waiting_notifies_even_if_unchanged() {
        let mut tracker = StatusTracker::new(true);
        tracker.apply_success(response(4, 9));
        tracker.set_waiting();
        assert!(tracker.apply_success(response(4, 9)).is_some());
    }

    #[test]
    fn disable_clears_last_result() {
        let mut tracker = StatusTracker::new(true);
        tracker.apply_success(response(9, 9));
        let transition = tracker.disable().unwrap();
        assert_eq!(transition.to, StatusKind::Disabled);
        assert!(tracker.last_result().is_none());
        assert!(tracker.disable().is_none());
        assert_eq!(tracker.status().label(), "");
    }

    #[test]
    fn outcomes_are_ignored_while_disabled() {
        let mut tracker = StatusTracker::new(false);
        assert!(tracker.apply_success(response(1, 1)).is_none());
        assert!(tracker.apply_failure().is_none());
        assert_eq!(tracker.status(), &StatusValue::Disabled);
        assert!(tracker.set_waiting().is_some());
        assert!(tracker.apply_failure().is_some());
    }

    #[test]
    fn serializes_neutral_with_result() {
        let value = StatusValue::Neutral {
            last_result: Some(ProbeResponse {
                version: Version::new(1, 2, 3),
                users: 12,
                max_users: 100,
                bandwidth: 72_000,
            }),
        };
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "status": "neutral",
                "lastResult": {
                    "version": "1.2.3",
                    "users": 12,
                    "maxUsers": 100,
                    "bandwidth": 72000
                }
            })
        );
        assert_eq!(
            serde_json::to_value(StatusValue::Waiting).unwrap(),
            serde_json::json!({ "status": "waiting" })
        );
    }
}
