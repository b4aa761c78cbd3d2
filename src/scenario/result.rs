use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::error::Error;
use crate::report::{Report, seconds};

/// Outcome of one scenario run. Never changes once produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioResult {
    pub scenario: String,
    pub passed: bool,
    /// Zero-based index of the failed step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<Error>,
    pub message: String,
    pub steps_executed: usize,
    #[serde(with = "seconds")]
    pub elapsed: Duration,
}

impl ScenarioResult {
    pub(crate) fn pass(scenario: &str, steps_executed: usize, elapsed: Duration) -> Self {
        Self {
            scenario: scenario.to_string(),
            passed: true,
            failed_step_index: None,
            failure: None,
            message: format!("all {} steps passed", steps_executed),
            steps_executed,
            elapsed,
        }
    }

    pub(crate) fn fail(
        scenario: &str,
        step: usize,
        message: String,
        failure: Error,
        elapsed: Duration,
    ) -> Self {
        Self {
            scenario: scenario.to_string(),
            passed: false,
            failed_step_index: Some(step),
            failure: Some(failure),
            message,
            steps_executed: step + 1,
            elapsed,
        }
    }

    /// A scenario that never ran because no session could be opened.
    #[must_use]
    pub fn connect_failed(scenario: &str, failure: Error, elapsed: Duration) -> Self {
        Self {
            scenario: scenario.to_string(),
            passed: false,
            failed_step_index: None,
            message: failure.to_string(),
            failure: Some(failure),
            steps_executed: 0,
            elapsed,
        }
    }
}

impl Report for ScenarioResult {
    fn passed(&self) -> bool {
        self.passed
    }
}

impl fmt::Display for ScenarioResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.passed { "PASS" } else { "FAIL" };
        write!(
            f,
            "{} {} ({} steps, {:.2}s): {}",
            verdict,
            self.scenario,
            self.steps_executed,
            self.elapsed.as_secs_f64(),
            self.message
        )
    }
}
