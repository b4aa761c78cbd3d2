//! Scoped runs: open a session, use it, always close it.
//!
//! These helpers are the intended entry points. Every exit path closes the
//! session, and a connection failure still yields a report instead of an
//! error, so callers can treat every run uniformly.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{error, info};

use crate::config::Config;
use crate::envelope::Envelope;
use crate::listener::{ListenEvent, ListenSummary, Listener, drain};
use crate::payload::ParticleSpec;
use crate::scenario::{Runner, Scenario, ScenarioResult};
use crate::session::Session;

/// Run `scenario` against `config.endpoint` on a fresh session.
pub async fn run_scenario(config: &Config, scenario: &Scenario) -> ScenarioResult {
    let started = Instant::now();
    let mut session = match Session::open(&config.endpoint, config).await {
        Ok(session) => session,
        Err(e) => {
            error!(endpoint = %config.endpoint, error = %e, "cannot connect");
            return ScenarioResult::connect_failed(scenario.name(), e, started.elapsed());
        }
    };

    let result = Runner::new(scenario, config).run(&mut session).await;
    session.close().await;
    result
}

/// Listen passively on a fresh session.
pub async fn listen(config: &Config, listener: &Listener) -> ListenSummary {
    listen_with(config, listener, |_| {}).await
}

/// [`listen`], calling `on_event` for every event as it happens.
pub async fn listen_with<F>(config: &Config, listener: &Listener, on_event: F) -> ListenSummary
where
    F: FnMut(&ListenEvent),
{
    let started = Instant::now();
    let mut session = match Session::open(&config.endpoint, config).await {
        Ok(session) => session,
        Err(e) => {
            error!(endpoint = %config.endpoint, error = %e, "cannot connect");
            return ListenSummary::connect_failed(e, started.elapsed());
        }
    };

    let summary = listener.run_with(&mut session, on_event).await;
    session.close().await;
    summary
}

/// Send one `createParticle` and drain whatever the server says back.
pub async fn probe(
    config: &Config,
    spec: &ParticleSpec,
    max_messages: u64,
    per_attempt: Duration,
) -> ListenSummary {
    let started = Instant::now();
    let mut session = match Session::open(&config.endpoint, config).await {
        Ok(session) => session,
        Err(e) => {
            error!(endpoint = %config.endpoint, error = %e, "cannot connect");
            return ListenSummary::connect_failed(e, started.elapsed());
        }
    };

    info!(particle = %spec, "probing");
    let summary = match session.send(&Envelope::create_particle(spec)).await {
        Ok(()) => drain(&mut session, max_messages, per_attempt).await,
        Err(e) => ListenSummary::from_send_failure(e, started.elapsed()),
    };
    session.close().await;
    summary
}
