//! AutoStop - counter-strafe emergency stop for WASD movement
//!
//! This library provides components for:
//! - Tracking how long the movement keys are held
//! - Deciding on a randomized counter-press when one is released
//! - Injecting counter-presses one at a time on a worker thread
//! - Global key hooks and key simulation backends (rdev, ydotool)

pub mod clock;
pub mod config;
pub mod controller;
pub mod debounce;
pub mod engine;
pub mod injector;
pub mod input_listener;
pub mod keys;
pub mod observer;
pub mod policy;
pub mod queue;
pub mod router;
pub mod ticker;
pub mod tracker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, EngineConfig, HoldRange, PolicyConfig, SettingsForm};
pub use controller::Controller;
pub use engine::Engine;
pub use injector::{KeyInjector, RdevInjector, YdotoolInjector};
pub use input_listener::{KeyHook, RawKeySink, RdevHook};
pub use keys::{KeySet, TrackedKey};
pub use observer::{EngineEvent, EngineObserver};
pub use policy::{CounterStrikePolicy, InjectionTask, Strike, StrikeKind};
pub use router::{KeyEventRouter, RawEventKind, RawKeyEvent};
pub use tracker::KeyStateTracker;

use thiserror::Error;

/// Main error type for AutoStop
#[derive(Error, Debug)]
pub enum AutoStopError {
    #[error("Invalid {name} range: min {min}ms is greater than max {max}ms")]
    InvalidRange {
        name: &'static str,
        min: u64,
        max: u64,
    },

    #[error("Invalid press threshold: {0}")]
    InvalidThreshold(String),

    #[error("Field '{field}' is not a whole number of milliseconds: '{value}'")]
    NotANumber { field: &'static str, value: String },

    #[error("Engine is not configured")]
    NotConfigured,

    #[error("Failed to read config file {path}: {source}")]
    ConfigRead {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to access input devices: {0}")]
    InputAccess(String),

    #[error("Failed to send input event: {0}")]
    SendEvent(String),

    #[error("Injection queue is closed")]
    QueueClosed,
}

impl AutoStopError {
    /// True for errors raised while validating configuration input
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRange { .. }
                | Self::InvalidThreshold(_)
                | Self::NotANumber { .. }
                | Self::ConfigRead { .. }
                | Self::ConfigParse(_)
        )
    }
}

pub type Result<T, E = AutoStopError> = std::result::Result<T, E>;
