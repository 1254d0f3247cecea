//! Simulated network behaviour of a node's acceptor side.

use std::time::Duration;

use rand::Rng;

use crate::error::PaxosError;

pub const SMALL_DELAY: Duration = Duration::from_millis(100);
pub const LARGE_DELAY: Duration = Duration::from_millis(1000);
pub const UNRELIABLE_DROP_PROBABILITY: f64 = 0.3;
pub const UNRELIABLE_MAX_JITTER: Duration = Duration::from_millis(2000);

/// How a node behaves before answering a request.
///
/// Only the responding path is affected; a node's own outbound requests are never delayed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum FaultProfile {
    /// Answer at once.
    #[default]
    Immediate,
    /// Answer after a short fixed delay.
    SmallDelay(Duration),
    /// Answer after a long fixed delay.
    LargeDelay(Duration),
    /// With `drop_probability` fail the exchange outright, otherwise answer after a random
    /// delay in `0..=max_jitter`.
    Unreliable {
        drop_probability: f64,
        max_jitter: Duration,
    },
}

/// What the fault profile decided for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultAction {
    Respond { after: Duration },
    Drop,
}

impl FaultProfile {
    pub fn small_delay() -> Self {
        FaultProfile::SmallDelay(SMALL_DELAY)
    }

    pub fn large_delay() -> Self {
        FaultProfile::LargeDelay(LARGE_DELAY)
    }

    pub fn unreliable() -> Self {
        FaultProfile::Unreliable {
            drop_probability: UNRELIABLE_DROP_PROBABILITY,
            max_jitter: UNRELIABLE_MAX_JITTER,
        }
    }

    /// Unreliable profile with validated parameters.
    pub fn unreliable_with(
        drop_probability: f64,
        max_jitter: Duration,
    ) -> Result<Self, PaxosError> {
        if !(0.0..=1.0).contains(&drop_probability) {
            return Err(PaxosError::InvalidConfiguration(format!(
                "drop probability must be within 0.0..=1.0, got {drop_probability}"
            )));
        }
        Ok(FaultProfile::Unreliable {
            drop_probability,
            max_jitter,
        })
    }

    /// Decide the fate of a single request.
    pub fn plan(&self, rng: &mut impl Rng) -> FaultAction {
        match *self {
            FaultProfile::Immediate => FaultAction::Respond {
                after: Duration::ZERO,
            },
            FaultProfile::SmallDelay(delay) | FaultProfile::LargeDelay(delay) => {
                FaultAction::Respond { after: delay }
            }
            FaultProfile::Unreliable {
                drop_probability,
                max_jitter,
            } => {
                let probability = if drop_probability.is_finite() {
                    drop_probability.clamp(0.0, 1.0)
                } else {
                    0.0
                };
                if rng.random_bool(probability) {
                    return FaultAction::Drop;
                }
                let max_ms = u64::try_from(max_jitter.as_millis()).unwrap_or(u64::MAX);
                FaultAction::Respond {
                    after: Duration::from_millis(rng.random_range(0..=max_ms)),
                }
            }
        }
    }
}

impl FaultAction {
    /// Suspend the responding path, then report whether a reply may be sent.
    pub async fn apply(self) -> Result<(), PaxosError> {
        match self {
            FaultAction::Respond { after } => {
                if !after.is_zero() {
                    tokio::time::sleep(after).await;
                }
                Ok(())
            }
            FaultAction::Drop => Err(PaxosError::SimulatedDrop),
        }
    }
}
