//! Scripted send/expect/wait sequences against one session.
//!
//! A [`Scenario`] is an ordered list of [`Step`]s. A [`Runner`] executes it
//! fail-fast: the first failed step ends the run and later steps never
//! execute.
//!
//! ```rust
//! use std::time::Duration;
//! use wsprobe::scenario::{Expectation, Scenario};
//! use wsprobe::{Envelope, ParticleSpec, Position};
//!
//! let scenario = Scenario::new("create-proton")
//!     .capture_baseline()
//!     .send(Envelope::create_particle(&ParticleSpec::proton(Position::new(5.0, 5.0, 5.0))))
//!     .wait(Duration::from_millis(500))
//!     .expect(Expectation::particle_count_increased());
//! assert_eq!(scenario.len(), 4);
//! ```

pub mod builtin;
mod result;
mod runner;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SnapshotPolicy;
use crate::envelope::Envelope;
use crate::error::{Error, Result};
use crate::payload::Snapshot;

pub use result::ScenarioResult;
pub use runner::{RunState, Runner};

type Predicate = dyn Fn(&Snapshot, &Snapshot) -> Result<()> + Send + Sync;

/// A predicate over `(before, after)` snapshots.
///
/// Predicates report a mismatch as [`Error::Assertion`] carrying both the
/// expected condition and the observed value.
#[derive(Clone)]
pub struct Expectation {
    description: String,
    predicate: Arc<Predicate>,
    policy: Option<SnapshotPolicy>,
}

impl Expectation {
    pub fn new<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Snapshot, &Snapshot) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            predicate: Arc::new(predicate),
            policy: None,
        }
    }

    /// The new snapshot holds strictly more particles than the baseline.
    #[must_use]
    pub fn particle_count_increased() -> Self {
        Self::new("particle count increased", |before, after| {
            let (before, after) = (before.particle_count(), after.particle_count());
            if after > before {
                Ok(())
            } else {
                Err(Error::assertion(
                    format!("particle count > {}", before),
                    after.to_string(),
                ))
            }
        })
    }

    /// Poll with `policy` instead of the configured default.
    #[must_use]
    pub fn with_policy(mut self, policy: SnapshotPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn policy(&self) -> Option<&SnapshotPolicy> {
        self.policy.as_ref()
    }

    /// Evaluate the predicate.
    ///
    /// # Errors
    ///
    /// Whatever the predicate returns, normally [`Error::Assertion`].
    pub fn check(&self, before: &Snapshot, after: &Snapshot) -> Result<()> {
        (self.predicate)(before, after)
    }
}

impl fmt::Debug for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expectation")
            .field("description", &self.description)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// One scenario step.
#[derive(Debug, Clone)]
pub enum Step {
    /// Send an envelope. A send failure fails the scenario.
    SendCommand(Envelope),
    /// Request a snapshot and keep it as the baseline.
    CaptureBaseline,
    /// Poll snapshots until the expectation holds against the baseline.
    /// The accepted snapshot becomes the new baseline.
    ExpectSnapshotDelta(Expectation),
    /// Settling pause.
    Wait(Duration),
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::SendCommand(envelope) => write!(f, "send {}", envelope),
            Step::CaptureBaseline => write!(f, "capture baseline"),
            Step::ExpectSnapshotDelta(expectation) => {
                write!(f, "expect {}", expectation.description())
            }
            Step::Wait(duration) => write!(f, "wait {:?}", duration),
        }
    }
}

/// A named, ordered list of steps.
#[derive(Debug, Clone)]
pub struct Scenario {
    name: String,
    steps: Vec<Step>,
}

impl Scenario {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    #[must_use]
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    #[must_use]
    pub fn send(self, envelope: Envelope) -> Self {
        self.step(Step::SendCommand(envelope))
    }

    #[must_use]
    pub fn capture_baseline(self) -> Self {
        self.step(Step::CaptureBaseline)
    }

    #[must_use]
    pub fn expect(self, expectation: Expectation) -> Self {
        self.step(Step::ExpectSnapshotDelta(expectation))
    }

    #[must_use]
    pub fn wait(self, duration: Duration) -> Self {
        self.step(Step::Wait(duration))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
