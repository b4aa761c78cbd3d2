//! Typed payloads of the particle-simulation protocol.
//!
//! Only the fields the harness asserts on are typed. Particle records are
//! kept as opaque JSON and extra metrics are preserved untouched.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Cartesian position of a particle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Payload of a `createParticle` command.
///
/// The species is not validated locally; the server is the authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleSpec {
    #[serde(rename = "type")]
    pub species: String,
    pub position: Position,
}

impl ParticleSpec {
    #[must_use]
    pub fn new(species: impl Into<String>, position: Position) -> Self {
        Self {
            species: species.into(),
            position,
        }
    }

    #[must_use]
    pub fn proton(position: Position) -> Self {
        Self::new("proton", position)
    }

    #[must_use]
    pub fn neutron(position: Position) -> Self {
        Self::new("neutron", position)
    }
}

impl fmt::Display for ParticleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.species, self.position)
    }
}

/// Aggregate simulation metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    /// Total energy in GeV.
    pub total_energy: f64,
    /// Any further metrics the server reports.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// Payload of a `snapshot` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Particle records in server order.
    pub particles: Vec<Value>,
    /// Simulated seconds since start.
    pub simulation_time: f64,
    pub metrics: Metrics,
}

impl Snapshot {
    #[must_use]
    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} particles, t={:.3}s, E={:.3} GeV",
            self.particle_count(),
            self.simulation_time,
            self.metrics.total_energy
        )
    }
}

/// Payload of an `error` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    pub message: String,
}
