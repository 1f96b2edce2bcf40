//! Solver configuration.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PlannerError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveOptions {
    /// Cost of one hour of driving.
    pub travel_cost_per_hour: f64,
    /// Added to a client's priority to get the keep-penalty of its
    /// appointment when the appointment carries none.
    pub miss_appointment_penalty: f64,
    /// Allow days to run past the desired duration. `None` makes the
    /// desired duration a hard limit.
    pub overrun: Option<OverrunPolicy>,
    /// Longest wait (seconds) before a timed visit or break.
    pub max_waiting_time: Option<i32>,
    /// Clients without an appointment at or below this priority are left
    /// out of the week.
    pub priority_cutoff: Option<f64>,
    /// Maximum accepted local search moves.
    pub local_search_iterations: usize,
    /// Wall-clock budget for the whole solve.
    pub time_limit_ms: Option<u64>,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            travel_cost_per_hour: 4.0, // one unit per quarter hour
            miss_appointment_penalty: 1.0,
            overrun: None,
            max_waiting_time: Some(3600),
            priority_cutoff: None,
            local_search_iterations: 1000,
            time_limit_ms: Some(2000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverrunPolicy {
    /// Seconds a day may run past the desired duration.
    pub allowance: i32,
    /// Cost of each hour past the desired duration.
    pub penalty_per_hour: f64,
}

impl SolveOptions {
    pub fn from_json_str(text: &str) -> Result<Self, PlannerError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PlannerError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit_ms.map(Duration::from_millis)
    }

    /// Hard cap on a day's work time given its desired duration.
    pub(crate) fn max_span(&self, desired: i32) -> i32 {
        match self.overrun {
            Some(policy) => desired.saturating_add(policy.allowance.max(0)),
            None => desired,
        }
    }

    pub(crate) fn overrun_cost(&self, span: i32, desired: i32) -> f64 {
        match self.overrun {
            Some(policy) if span > desired => {
                (span - desired) as f64 / 3600.0 * policy.penalty_per_hour
            }
            _ => 0.0,
        }
    }

    pub(crate) fn travel_cost(&self, seconds: i32) -> f64 {
        seconds as f64 / 3600.0 * self.travel_cost_per_hour
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let text = r#"{ "miss_appointment_penalty": 25.0 }"#;
        let options = SolveOptions::from_json_str(text).unwrap();
        assert_eq!(options.miss_appointment_penalty, 25.0);
        assert_eq!(options.travel_cost_per_hour, 4.0);
        assert_eq!(options.time_limit(), Some(Duration::from_millis(2000)));
    }

    #[test]
    fn test_overrun_json() {
        let options = SolveOptions::from_json_str(
            r#"{ "overrun": { "allowance": 1800, "penalty_per_hour": 8.0 } }"#,
        )
        .unwrap();
        assert_eq!(options.max_span(3600), 5400);
        assert!((options.overrun_cost(3600 + 900, 3600) - 2.0).abs() < 1e-9);
        assert_eq!(options.overrun_cost(3000, 3600), 0.0);
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(
            SolveOptions::from_json_str("{ nope"),
            Err(PlannerError::Json(_))
        ));
    }

    #[test]
    fn test_travel_cost_quarter_hour() {
        let options = SolveOptions::default();
        assert!((options.travel_cost(900) - 1.0).abs() < 1e-9);
    }
}
