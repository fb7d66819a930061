//! Capability gate: which jobs plain AMQP delivery can carry

use conveyor_core::{Capability, Job};

/// Queue features the AMQP driver does not implement
pub const UNSUPPORTED: [Capability; 2] = [Capability::Delayable, Capability::Prioritized];

/// Check if a job can be pushed through plain point-to-point/broadcast delivery
pub fn can_push(job: &dyn Job) -> bool {
    unsupported_capability(job).is_none()
}

/// First required capability the driver cannot provide
pub fn unsupported_capability(job: &dyn Job) -> Option<Capability> {
    job.capabilities()
        .iter()
        .copied()
        .find(|capability| UNSUPPORTED.contains(capability))
}
