//! Counter-strike decisions
//!
//! A release of the last held movement key is answered with a press of the
//! opposite key. Short taps get a short pulse from the emergency range,
//! longer holds carry more momentum and get a pulse from the long range.
//! Every pulse length is drawn fresh so the timing never repeats exactly.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt;
use std::time::Duration;
use tracing::debug;

use crate::config::PolicyConfig;
use crate::keys::{combo_reverse, KeySet, TrackedKey};
use crate::Result;

/// One counter-press for the injection worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InjectionTask {
    pub key: TrackedKey,
    pub hold: Duration,
}

impl InjectionTask {
    pub fn new(key: TrackedKey, hold: Duration) -> Self {
        Self { key, hold }
    }

    pub fn hold_ms(&self) -> u64 {
        self.hold.as_millis() as u64
    }
}

impl fmt::Display for InjectionTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} for {}ms", self.key, self.hold_ms())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrikeKind {
    /// Release before the threshold
    Short,
    /// Release at or after the threshold
    Long,
}

impl fmt::Display for StrikeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Short => write!(f, "short"),
            Self::Long => write!(f, "long"),
        }
    }
}

/// Counter-press decided for one release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Strike {
    pub kind: StrikeKind,
    pub tasks: Vec<InjectionTask>,
}

/// Decides whether and how to counter a released key
pub struct CounterStrikePolicy {
    config: PolicyConfig,
    rng: Mutex<StdRng>,
}

impl CounterStrikePolicy {
    /// Create a policy with an entropy-seeded generator
    pub fn new(config: PolicyConfig) -> Result<Self> {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Create a policy with a fixed seed
    pub fn with_seed(config: PolicyConfig, seed: u64) -> Result<Self> {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: PolicyConfig, rng: StdRng) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            rng: Mutex::new(rng),
        })
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Counter a single released key
    pub fn decide(
        &self,
        released: TrackedKey,
        held_for: Duration,
        others_held: bool,
    ) -> Option<Strike> {
        self.decide_chord(released, held_for, others_held, KeySet::EMPTY)
    }

    /// Counter a release, reversing the whole chord when combo reverse is on
    pub fn decide_chord(
        &self,
        released: TrackedKey,
        held_for: Duration,
        others_held: bool,
        chord: KeySet,
    ) -> Option<Strike> {
        if others_held {
            debug!(key = %released, "other tracked keys still held, suppressing");
            return None;
        }

        let counter_keys = self
            .config
            .combo_reverse
            .then(|| combo_reverse(chord))
            .flatten()
            .unwrap_or_else(|| [released.reverse()].into_iter().collect());

        let (kind, range) = if held_for < self.config.press_threshold {
            (StrikeKind::Short, self.config.emergency_hold)
        } else {
            (StrikeKind::Long, self.config.long_hold)
        };
        let hold = range.sample(&mut *self.rng.lock());

        debug!(
            key = %released,
            held_ms = held_for.as_millis() as u64,
            kind = %kind,
            counter = %counter_keys,
            hold_ms = hold.as_millis() as u64,
            "counter-strike decided"
        );

        Some(Strike {
            kind,
            tasks: counter_keys
                .iter()
                .map(|key| InjectionTask::new(key, hold))
                .collect(),
        })
    }
}
