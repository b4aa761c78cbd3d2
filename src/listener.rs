//! Passive observation of server traffic.
//!
//! A [`Listener`] watches a session for a fixed wall-clock window, tallying
//! envelopes by `type`. Silence is expected in passive mode and only shows up
//! as [`ListenEvent::Idle`] heartbeats; a close, a malformed frame or a
//! transport failure ends the window early.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::envelope::{Envelope, kinds};
use crate::error::Error;
use crate::message::CloseFrame;
use crate::payload::Snapshot;
use crate::receiver::{Outcome, receive_before, receive_within};
use crate::report::{Report, seconds};
use crate::session::Session;

/// Shortest per-attempt wait. A zero wait would spin on idle attempts.
pub const MIN_ATTEMPT: Duration = Duration::from_millis(1);

/// One classified observation.
#[derive(Debug, Clone, PartialEq)]
pub enum ListenEvent {
    /// An envelope arrived.
    Message(Envelope),
    /// An attempt passed without traffic.
    Idle {
        /// Time since listening started.
        elapsed: Duration,
    },
    /// The server closed the connection. Terminal.
    Closed(Option<CloseFrame>),
    /// A frame did not decode. Terminal.
    Malformed(String),
    /// The transport failed. Terminal.
    Failed(Error),
}

impl ListenEvent {
    /// Returns `true` for events that end the stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ListenEvent::Closed(_) | ListenEvent::Malformed(_) | ListenEvent::Failed(_)
        )
    }
}

impl fmt::Display for ListenEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenEvent::Message(envelope) => write!(f, "received {}", envelope),
            ListenEvent::Idle { elapsed } => {
                write!(f, "still listening ({:.1}s)", elapsed.as_secs_f64())
            }
            ListenEvent::Closed(Some(frame)) => write!(f, "server closed the connection: {}", frame),
            ListenEvent::Closed(None) => write!(f, "server closed the connection"),
            ListenEvent::Malformed(detail) => write!(f, "malformed frame: {}", detail),
            ListenEvent::Failed(error) => write!(f, "transport failed: {}", error),
        }
    }
}

/// Why a listen or drain run ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail")]
pub enum Termination {
    /// The observation window elapsed.
    Completed,
    /// Drain mode saw an attempt without traffic.
    Drained,
    /// Drain mode received its message budget.
    LimitReached,
    Closed,
    Malformed(String),
    Transport(Error),
    /// No session could be opened.
    ConnectFailed(Error),
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Completed => write!(f, "completed"),
            Termination::Drained => write!(f, "no more messages"),
            Termination::LimitReached => write!(f, "message limit reached"),
            Termination::Closed => write!(f, "closed by server"),
            Termination::Malformed(detail) => write!(f, "malformed frame: {}", detail),
            Termination::Transport(error) => write!(f, "{}", error),
            Termination::ConnectFailed(error) => write!(f, "{}", error),
        }
    }
}

/// Tally of one listen or drain run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenSummary {
    pub total_messages: u64,
    pub counts_by_type: BTreeMap<String, u64>,
    #[serde(with = "seconds")]
    pub duration_observed: Duration,
    /// Attempts that passed without traffic.
    pub idle_attempts: u64,
    pub termination: Termination,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_snapshot: Option<Snapshot>,
}

impl Default for ListenSummary {
    fn default() -> Self {
        Self {
            total_messages: 0,
            counts_by_type: BTreeMap::new(),
            duration_observed: Duration::ZERO,
            idle_attempts: 0,
            termination: Termination::Completed,
            last_snapshot: None,
        }
    }
}

impl ListenSummary {
    /// A run that never started because no session could be opened.
    #[must_use]
    pub fn connect_failed(error: Error, elapsed: Duration) -> Self {
        Self {
            duration_observed: elapsed,
            termination: Termination::ConnectFailed(error),
            ..Self::default()
        }
    }

    /// A run that ended because its opening command could not be sent.
    #[must_use]
    pub fn from_send_failure(error: Error, elapsed: Duration) -> Self {
        Self {
            duration_observed: elapsed,
            termination: Termination::Transport(error),
            ..Self::default()
        }
    }

    /// Fold one event into the tally.
    pub fn record(&mut self, event: &ListenEvent) {
        match event {
            ListenEvent::Message(envelope) => {
                self.total_messages += 1;
                *self.counts_by_type.entry(envelope.kind.clone()).or_insert(0) += 1;
                if envelope.is(kinds::SNAPSHOT) {
                    match envelope.snapshot() {
                        Ok(snapshot) => self.last_snapshot = Some(snapshot),
                        Err(e) => debug!(error = %e, "snapshot payload not understood"),
                    }
                }
            }
            ListenEvent::Idle { .. } => self.idle_attempts += 1,
            ListenEvent::Closed(_) => self.termination = Termination::Closed,
            ListenEvent::Malformed(detail) => {
                self.termination = Termination::Malformed(detail.clone());
            }
            ListenEvent::Failed(error) => self.termination = Termination::Transport(error.clone()),
        }
    }

    /// Number of envelopes seen with this `type`.
    #[must_use]
    pub fn count(&self, kind: &str) -> u64 {
        self.counts_by_type.get(kind).copied().unwrap_or(0)
    }

    fn finish(mut self, elapsed: Duration) -> Self {
        self.duration_observed = elapsed;
        self
    }
}

impl Report for ListenSummary {
    fn passed(&self) -> bool {
        matches!(
            self.termination,
            Termination::Completed | Termination::Drained | Termination::LimitReached
        )
    }
}

impl fmt::Display for ListenSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} messages in {:.2}s",
            self.total_messages,
            self.duration_observed.as_secs_f64()
        )?;
        if !self.counts_by_type.is_empty() {
            let counts: Vec<String> = self
                .counts_by_type
                .iter()
                .map(|(kind, count)| format!("{}: {}", kind, count))
                .collect();
            write!(f, " ({})", counts.join(", "))?;
        }
        write!(f, "; {}", self.termination)?;
        if let Some(snapshot) = &self.last_snapshot {
            write!(f, "; last snapshot: {}", snapshot)?;
        }
        Ok(())
    }
}

/// Fixed-duration passive receive loop.
#[derive(Debug, Clone)]
pub struct Listener {
    duration: Duration,
    per_attempt: Duration,
    greeting: Vec<Envelope>,
}

impl Listener {
    /// Listen for `duration` with one-second attempts and no greeting.
    #[must_use]
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            per_attempt: Duration::from_secs(1),
            greeting: Vec::new(),
        }
    }

    /// Listen for `duration` using the configured per-attempt wait.
    #[must_use]
    pub fn from_config(duration: Duration, config: &Config) -> Self {
        Self::new(duration).with_per_attempt(config.timeouts.receive)
    }

    /// Set the per-attempt wait, raised to [`MIN_ATTEMPT`] if shorter.
    #[must_use]
    pub fn with_per_attempt(mut self, per_attempt: Duration) -> Self {
        self.per_attempt = per_attempt.max(MIN_ATTEMPT);
        self
    }

    /// Send `envelope` when listening starts. May be called repeatedly.
    #[must_use]
    pub fn with_greeting(mut self, envelope: Envelope) -> Self {
        self.greeting.push(envelope);
        self
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    #[must_use]
    pub fn per_attempt(&self) -> Duration {
        self.per_attempt
    }

    /// Lazily observe the session.
    ///
    /// The window starts on the first poll, when the greeting is sent. The
    /// stream ends at the deadline or right after a terminal event, and
    /// cannot be restarted.
    pub fn events<'s, T>(
        &self,
        session: &'s mut Session<T>,
    ) -> impl Stream<Item = ListenEvent> + use<'s, T>
    where
        T: AsyncRead + AsyncWrite + Unpin + 's,
    {
        let cursor = Cursor {
            session,
            greeting: self.greeting.clone(),
            duration: self.duration,
            per_attempt: self.per_attempt,
            window: None,
            done: false,
        };
        stream::unfold(cursor, |mut cursor| async move {
            let event = cursor.next_event().await?;
            Some((event, cursor))
        })
    }

    /// Observe the whole window and summarize it.
    pub async fn run<T>(&self, session: &mut Session<T>) -> ListenSummary
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        self.run_with(session, |_| {}).await
    }

    /// [`Listener::run`], calling `on_event` for every event as it happens.
    pub async fn run_with<T, F>(&self, session: &mut Session<T>, mut on_event: F) -> ListenSummary
    where
        T: AsyncRead + AsyncWrite + Unpin,
        F: FnMut(&ListenEvent),
    {
        let started = Instant::now();
        let mut summary = ListenSummary::default();
        info!(duration = ?self.duration, per_attempt = ?self.per_attempt, "listening");

        let events = self.events(session);
        let mut events = std::pin::pin!(events);
        while let Some(event) = events.next().await {
            log_event(&event);
            on_event(&event);
            summary.record(&event);
        }

        let summary = summary.finish(started.elapsed());
        info!(%summary, "listen finished");
        summary
    }
}

struct Cursor<'s, T> {
    session: &'s mut Session<T>,
    greeting: Vec<Envelope>,
    duration: Duration,
    per_attempt: Duration,
    window: Option<(Instant, Instant)>,
    done: bool,
}

impl<T: AsyncRead + AsyncWrite + Unpin> Cursor<'_, T> {
    async fn next_event(&mut self) -> Option<ListenEvent> {
        if self.done {
            return None;
        }

        let (started, deadline) = match self.window {
            Some(window) => window,
            None => {
                let started = Instant::now();
                let window = (started, started + self.duration);
                self.window = Some(window);
                for envelope in std::mem::take(&mut self.greeting) {
                    if let Err(e) = self.session.send(&envelope).await {
                        self.done = true;
                        return Some(ListenEvent::Failed(e));
                    }
                }
                window
            }
        };

        let now = Instant::now();
        if now >= deadline {
            self.done = true;
            return None;
        }

        let attempt_deadline = (now + self.per_attempt).min(deadline);
        let event = match receive_before(&mut *self.session, attempt_deadline).await {
            Ok(Outcome::Message(envelope)) => ListenEvent::Message(envelope),
            Ok(Outcome::TimedOut) => ListenEvent::Idle {
                elapsed: started.elapsed(),
            },
            Ok(Outcome::Closed(frame)) => ListenEvent::Closed(frame),
            Ok(Outcome::Malformed(detail)) => ListenEvent::Malformed(detail),
            Err(e) => ListenEvent::Failed(e),
        };
        self.done = event.is_terminal();
        Some(event)
    }
}

/// Receive until an attempt passes without traffic or `max_messages`
/// envelopes have arrived.
pub async fn drain<T>(
    session: &mut Session<T>,
    max_messages: u64,
    per_attempt: Duration,
) -> ListenSummary
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let per_attempt = per_attempt.max(MIN_ATTEMPT);
    let started = Instant::now();
    let mut summary = ListenSummary::default();

    loop {
        if summary.total_messages >= max_messages {
            summary.termination = Termination::LimitReached;
            break;
        }

        let event = match receive_within(session, per_attempt).await {
            Ok(Outcome::Message(envelope)) => ListenEvent::Message(envelope),
            Ok(Outcome::TimedOut) => {
                debug!("no more messages");
                summary.termination = Termination::Drained;
                break;
            }
            Ok(Outcome::Closed(frame)) => ListenEvent::Closed(frame),
            Ok(Outcome::Malformed(detail)) => ListenEvent::Malformed(detail),
            Err(e) => ListenEvent::Failed(e),
        };
        log_event(&event);
        summary.record(&event);
        if event.is_terminal() {
            break;
        }
    }

    let summary = summary.finish(started.elapsed());
    info!(%summary, "drain finished");
    summary
}

fn log_event(event: &ListenEvent) {
    match event {
        ListenEvent::Message(envelope) if envelope.is(kinds::ERROR) => {
            warn!(%envelope, "server reported an error");
        }
        ListenEvent::Message(envelope) => debug!(kind = %envelope.kind, "received"),
        ListenEvent::Idle { elapsed } => debug!(?elapsed, "idle"),
        terminal => warn!(event = %terminal, "listening ended early"),
    }
}
