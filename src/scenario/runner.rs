use std::fmt;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::config::{Config, SnapshotPolicy};
use crate::envelope::{Envelope, kinds};
use crate::error::{Error, Result};
use crate::payload::Snapshot;
use crate::receiver::{Outcome, receive_before};
use crate::scenario::{Expectation, Scenario, ScenarioResult, Step};
use crate::session::Session;

/// Where a runner is in its scenario.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Pending,
    /// Executing the step at this index.
    Running(usize),
    Passed,
    Failed { step: usize, reason: Error },
}

impl RunState {
    /// Returns `true` once the run has passed or failed.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self, RunState::Passed | RunState::Failed { .. })
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Pending => write!(f, "pending"),
            RunState::Running(step) => write!(f, "running step {}", step),
            RunState::Passed => write!(f, "passed"),
            RunState::Failed { step, reason } => write!(f, "failed at step {}: {}", step, reason),
        }
    }
}

/// Executes one [`Scenario`] against a borrowed session.
///
/// A runner runs at most once; calling [`Runner::run`] again returns the
/// first result without touching the session.
pub struct Runner<'a> {
    scenario: &'a Scenario,
    policy: SnapshotPolicy,
    per_attempt: Duration,
    state: RunState,
    baseline: Option<Snapshot>,
    server_errors: Vec<String>,
    result: Option<ScenarioResult>,
}

impl<'a> Runner<'a> {
    #[must_use]
    pub fn new(scenario: &'a Scenario, config: &Config) -> Self {
        Self {
            scenario,
            policy: config.snapshot.clone(),
            per_attempt: config.timeouts.receive,
            state: RunState::Pending,
            baseline: None,
            server_errors: Vec::new(),
            result: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// The most recent snapshot accepted by a baseline or expectation step.
    #[must_use]
    pub fn baseline(&self) -> Option<&Snapshot> {
        self.baseline.as_ref()
    }

    /// Messages from `error` envelopes seen while polling.
    #[must_use]
    pub fn server_errors(&self) -> &[String] {
        &self.server_errors
    }

    /// Run every step in order, stopping at the first failure.
    pub async fn run<T>(&mut self, session: &mut Session<T>) -> ScenarioResult
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        if let Some(result) = &self.result {
            return result.clone();
        }

        let scenario = self.scenario;
        let started = Instant::now();
        info!(scenario = scenario.name(), steps = scenario.len(), "scenario started");

        for (index, step) in scenario.steps().iter().enumerate() {
            self.state = RunState::Running(index);
            debug!(scenario = scenario.name(), step = index, %step, "step started");

            if let Err(reason) = self.execute(step, session).await {
                let message = self.failure_message(index, step, &reason);
                warn!(scenario = scenario.name(), step = index, %reason, "step failed");
                self.state = RunState::Failed {
                    step: index,
                    reason: reason.clone(),
                };
                let result =
                    ScenarioResult::fail(scenario.name(), index, message, reason, started.elapsed());
                self.result = Some(result.clone());
                return result;
            }
            info!(scenario = scenario.name(), step = index, %step, "step passed");
        }

        self.state = RunState::Passed;
        let result = ScenarioResult::pass(scenario.name(), scenario.len(), started.elapsed());
        info!(scenario = scenario.name(), elapsed = ?result.elapsed, "scenario passed");
        self.result = Some(result.clone());
        result
    }

    async fn execute<T>(&mut self, step: &Step, session: &mut Session<T>) -> Result<()>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        match step {
            Step::SendCommand(envelope) => session.send(envelope).await,
            Step::CaptureBaseline => {
                let policy = self.policy.clone();
                let snapshot = self.poll_snapshot(session, None, &policy).await?;
                info!(baseline = %snapshot, "baseline captured");
                self.baseline = Some(snapshot);
                Ok(())
            }
            Step::ExpectSnapshotDelta(expectation) => {
                let before = self.baseline.clone().ok_or_else(|| {
                    Error::assertion("a baseline snapshot captured earlier", "no baseline")
                })?;
                let policy = expectation
                    .policy()
                    .cloned()
                    .unwrap_or_else(|| self.policy.clone());
                let after = self
                    .poll_snapshot(session, Some((&before, expectation)), &policy)
                    .await?;
                info!(before = %before, after = %after, "expectation held");
                self.baseline = Some(after);
                Ok(())
            }
            Step::Wait(duration) => {
                sleep(*duration).await;
                Ok(())
            }
        }
    }

    /// Request snapshots until one is accepted or the policy is used up.
    ///
    /// Without a check the first snapshot is accepted. With one, every
    /// snapshot that arrives before the attempt deadline is checked, so a
    /// backlog of older snapshots cannot hide a newer one that passes.
    async fn poll_snapshot<T>(
        &mut self,
        session: &mut Session<T>,
        check: Option<(&Snapshot, &Expectation)>,
        policy: &SnapshotPolicy,
    ) -> Result<Snapshot>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let started = Instant::now();
        let mut mismatch: Option<Error> = None;

        for attempt in 0..policy.attempts.max(1) {
            let pause = policy.backoff_before(attempt);
            if !pause.is_zero() {
                sleep(pause).await;
            }

            session.send(&Envelope::get_snapshot()).await?;
            let deadline = Instant::now() + self.per_attempt;

            loop {
                let envelope = match receive_before(session, deadline).await? {
                    Outcome::Message(envelope) => envelope,
                    Outcome::TimedOut => {
                        debug!(attempt, "no snapshot within attempt");
                        break;
                    }
                    Outcome::Closed(frame) => {
                        return Err(Error::Connection(match frame {
                            Some(frame) => format!("server closed the connection: {}", frame),
                            None => "server closed the connection".to_string(),
                        }));
                    }
                    Outcome::Malformed(detail) => return Err(Error::Decode(detail)),
                };

                if envelope.is(kinds::ERROR) {
                    let message = envelope
                        .server_error()
                        .map(|e| e.message)
                        .unwrap_or_else(|_| envelope.to_string());
                    warn!(%message, "server reported an error");
                    self.server_errors.push(message);
                    continue;
                }
                if !envelope.is(kinds::SNAPSHOT) {
                    debug!(%envelope, "ignoring unrelated envelope");
                    continue;
                }

                let snapshot = envelope.snapshot()?;
                let Some((before, expectation)) = check else {
                    return Ok(snapshot);
                };
                match expectation.check(before, &snapshot) {
                    Ok(()) => return Ok(snapshot),
                    Err(e) => {
                        debug!(attempt, observed = %snapshot, "expectation not met yet");
                        mismatch = Some(e);
                    }
                }
            }
        }

        Err(mismatch.unwrap_or_else(|| Error::Timeout {
            expected: match check {
                Some((_, expectation)) => {
                    format!("a snapshot where {}", expectation.description())
                }
                None => "a snapshot".to_string(),
            },
            waited: started.elapsed(),
        }))
    }

    fn failure_message(&self, index: usize, step: &Step, reason: &Error) -> String {
        let mut message = format!("step {} ({}) failed: {}", index, step, reason);
        if !self.server_errors.is_empty() {
            message.push_str("; server reported: ");
            message.push_str(&self.server_errors.join("; "));
        }
        message
    }
}
