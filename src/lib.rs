//! # wsprobe - black-box protocol harness for particle-simulation servers
//!
//! `wsprobe` connects to a simulation server over WebSocket, sends typed JSON
//! command envelopes and asserts on the responses under bounded waits.
//!
//! ## Features
//!
//! - **Scoped sessions** that are closed on every exit path
//! - **Strict envelope codec** that never fills in defaults
//! - **Timed receives** that tell silence, closure and garbage apart
//! - **Fail-fast scenarios** with poll-with-backoff snapshot assertions
//! - **Passive listening** as a lazy event stream or a summary
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use wsprobe::{Config, harness, scenario::builtin};
//!
//! # async fn demo() {
//! let config = Config::from_env();
//! let result = harness::run_scenario(&config, &builtin::create_particle(config.settle)).await;
//! println!("{}", result);
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod envelope;
pub mod error;
pub mod harness;
pub mod listener;
pub mod message;
pub mod payload;
pub mod protocol;
pub mod receiver;
pub mod report;
pub mod scenario;
pub mod session;

#[cfg(test)]
mod testing;

pub use config::{Config, Limits, SnapshotPolicy, Timeouts};
pub use envelope::{Envelope, decode, encode};
pub use error::{Error, Result};
pub use listener::{ListenEvent, ListenSummary, Listener, Termination};
pub use message::{CloseCode, CloseFrame, Message};
pub use payload::{Metrics, ParticleSpec, Position, ServerError, Snapshot};
pub use receiver::{Outcome, receive_before, receive_within};
pub use report::Report;
pub use scenario::{Expectation, RunState, Runner, Scenario, ScenarioResult, Step};
pub use session::{Session, SessionState};
