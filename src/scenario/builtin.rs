//! The stock create-and-verify workloads.

use std::time::Duration;

use crate::envelope::Envelope;
use crate::payload::{ParticleSpec, Position};
use crate::scenario::{Expectation, Scenario};

/// Where the stock proton is created.
pub const PROTON_POSITION: Position = Position::new(5.0, 5.0, 5.0);

/// Where the stock neutron is created.
pub const NEUTRON_POSITION: Position = Position::new(-5.0, -5.0, -5.0);

/// Baseline, create one proton, settle, expect the count to increase.
#[must_use]
pub fn create_particle(settle: Duration) -> Scenario {
    Scenario::new("create-particle")
        .capture_baseline()
        .send(Envelope::create_particle(&ParticleSpec::proton(
            PROTON_POSITION,
        )))
        .wait(settle)
        .expect(Expectation::particle_count_increased())
}

/// [`create_particle`], then a neutron checked against the snapshot that
/// verified the proton.
#[must_use]
pub fn create_particle_pair(settle: Duration) -> Scenario {
    Scenario::new("create-particle-pair")
        .capture_baseline()
        .send(Envelope::create_particle(&ParticleSpec::proton(
            PROTON_POSITION,
        )))
        .wait(settle)
        .expect(Expectation::particle_count_increased())
        .send(Envelope::create_particle(&ParticleSpec::neutron(
            NEUTRON_POSITION,
        )))
        .wait(settle)
        .expect(Expectation::particle_count_increased())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::Step;

    #[test]
    fn test_create_particle_steps() {
        let scenario = create_particle(Duration::from_millis(500));
        assert_eq!(scenario.len(), 4);
        assert!(matches!(scenario.steps()[0], Step::CaptureBaseline));
        match &scenario.steps()[1] {
            Step::SendCommand(envelope) => {
                let payload = envelope.payload.as_ref().unwrap();
                assert_eq!(payload["type"], "proton");
                assert_eq!(payload["position"]["y"], 5.0);
            }
            other => panic!("unexpected step {}", other),
        }
        assert!(matches!(scenario.steps()[2], Step::Wait(d) if d == Duration::from_millis(500)));
    }

    #[test]
    fn test_pair_creates_neutron_second() {
        let scenario = create_particle_pair(Duration::ZERO);
        assert_eq!(scenario.len(), 7);
        match &scenario.steps()[4] {
            Step::SendCommand(envelope) => {
                let payload = envelope.payload.as_ref().unwrap();
                assert_eq!(payload["type"], "neutron");
                assert_eq!(payload["position"]["z"], -5.0);
            }
            other => panic!("unexpected step {}", other),
        }
        assert!(matches!(scenario.steps()[6], Step::ExpectSnapshotDelta(_)));
    }
}
