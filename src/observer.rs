//! Status notifications for front ends
//!
//! Events are advisory. The engine never waits on an observer and never
//! changes behavior based on what it does with them.

use std::fmt;
use std::time::Duration;

use crate::keys::TrackedKey;
use crate::policy::{InjectionTask, StrikeKind};

/// Something a front end may want to display
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Started,
    Stopped,
    KeyPressed {
        key: TrackedKey,
    },
    KeyReleased {
        key: TrackedKey,
        held_for: Duration,
    },
    /// Release ignored because another movement key is still down
    Suppressed {
        key: TrackedKey,
    },
    /// A counter-strike was handed to the injection queue
    StrikeQueued {
        released: TrackedKey,
        kind: StrikeKind,
        tasks: Vec<InjectionTask>,
    },
    /// A debounced strike was dropped because a key went down again
    StrikeCancelled {
        released: TrackedKey,
    },
    Injected {
        task: InjectionTask,
    },
    InjectionFailed {
        task: InjectionTask,
        error: String,
    },
    /// Queued tasks dropped at shutdown
    TasksAbandoned {
        count: usize,
    },
    /// Periodic report while running
    Tick {
        uptime: Duration,
    },
}

impl fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::KeyPressed { key } => write!(f, "{} pressed", key),
            Self::KeyReleased { key, held_for } => {
                write!(f, "{} held for {:.3}s", key, held_for.as_secs_f64())
            }
            Self::Suppressed { key } => write!(
                f,
                "{} released while other keys are held, no counter-strike",
                key
            ),
            Self::StrikeQueued {
                released,
                kind,
                tasks,
            } => {
                let tasks: Vec<String> = tasks.iter().map(ToString::to_string).collect();
                write!(f, "{} stop after {}: {}", kind, released, tasks.join(", "))
            }
            Self::StrikeCancelled { released } => {
                write!(f, "stop after {} cancelled by a new press", released)
            }
            Self::Injected { task } => write!(f, "pressed {}", task),
            Self::InjectionFailed { task, error } => {
                write!(f, "failed to press {}: {}", task, error)
            }
            Self::TasksAbandoned { count } => {
                write!(f, "dropped {} queued counter-press(es)", count)
            }
            Self::Tick { uptime } => write!(f, "running for {:.3}s", uptime.as_secs_f64()),
        }
    }
}

/// Subscriber for engine events. Called from the hook and worker threads.
pub trait EngineObserver: Send + Sync {
    fn on_event(&self, event: &EngineEvent);
}

impl<F> EngineObserver for F
where
    F: Fn(&EngineEvent) + Send + Sync,
{
    fn on_event(&self, event: &EngineEvent) {
        self(event)
    }
}

/// Observer that forwards events over a channel
pub struct ChannelObserver {
    sender: crossbeam_channel::Sender<EngineEvent>,
}

impl ChannelObserver {
    pub fn new(sender: crossbeam_channel::Sender<EngineEvent>) -> Self {
        Self { sender }
    }
}

impl EngineObserver for ChannelObserver {
    fn on_event(&self, event: &EngineEvent) {
        // A dropped receiver just means nobody is watching.
        let _ = self.sender.send(event.clone());
    }
}

/// Create a channel observer and the receiving end
pub fn create_event_channel() -> (ChannelObserver, crossbeam_channel::Receiver<EngineEvent>) {
    let (sender, receiver) = crossbeam_channel::unbounded();
    (ChannelObserver::new(sender), receiver)
}
