//! Raw key events to counter-strikes
//!
//! The router runs on the hook thread. It updates the tracker, asks the
//! policy what to do about a release, and hands the result to the injection
//! queue. It never presses a key itself.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::clock::Clock;
use crate::debounce::ReleaseDebouncer;
use crate::input_listener::RawKeySink;
use crate::keys::TrackedKey;
use crate::observer::{EngineEvent, EngineObserver};
use crate::policy::{CounterStrikePolicy, Strike};
use crate::queue::InjectionQueue;
use crate::tracker::KeyStateTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEventKind {
    Down,
    Up,
}

/// Key event as delivered by the OS hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawKeyEvent {
    pub kind: RawEventKind,
    pub name: String,
}

impl RawKeyEvent {
    /// Create a new raw event
    pub fn new(kind: RawEventKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    /// Key-down event for the named key
    pub fn down(name: impl Into<String>) -> Self {
        Self::new(RawEventKind::Down, name)
    }

    /// Key-up event for the named key
    pub fn up(name: impl Into<String>) -> Self {
        Self::new(RawEventKind::Up, name)
    }
}

/// Drops hook events caused by our own injected key presses
///
/// The worker registers each event it is about to send; a matching hook
/// event within the window is swallowed once.
pub struct EchoFilter {
    window: Duration,
    clock: Arc<dyn Clock>,
    expected: Mutex<Vec<(TrackedKey, RawEventKind, Instant)>>,
}

impl EchoFilter {
    /// A zero window disables filtering
    pub fn new(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            window,
            clock,
            expected: Mutex::new(Vec::new()),
        }
    }

    /// Register an event we are about to inject
    pub fn expect(&self, key: TrackedKey, kind: RawEventKind) {
        if self.window.is_zero() {
            return;
        }
        let deadline = self.clock.now() + self.window;
        self.expected.lock().push((key, kind, deadline));
    }

    /// True if the event is the echo of an injected one
    pub fn take(&self, key: TrackedKey, kind: RawEventKind) -> bool {
        if self.window.is_zero() {
            return false;
        }
        let now = self.clock.now();
        let mut expected = self.expected.lock();
        expected.retain(|(_, _, deadline)| *deadline >= now);
        match expected.iter().position(|(k, e, _)| *k == key && *e == kind) {
            Some(idx) => {
                expected.remove(idx);
                true
            }
            None => false,
        }
    }
}

struct Debounce {
    delay: Duration,
    debouncer: ReleaseDebouncer,
    released: Mutex<Option<TrackedKey>>,
}

/// Routes raw key events through tracker, policy and queue
pub struct KeyEventRouter {
    tracker: KeyStateTracker,
    policy: CounterStrikePolicy,
    queue: InjectionQueue,
    echo: Arc<EchoFilter>,
    observer: Arc<dyn EngineObserver>,
    debounce: Option<Debounce>,
}

impl KeyEventRouter {
    pub fn new(
        tracker: KeyStateTracker,
        policy: CounterStrikePolicy,
        queue: InjectionQueue,
        echo: Arc<EchoFilter>,
        observer: Arc<dyn EngineObserver>,
    ) -> Self {
        Self {
            tracker,
            policy,
            queue,
            echo,
            observer,
            debounce: None,
        }
    }

    /// Hold final-release strikes back for `delay`; zero disables it
    pub fn with_release_debounce(mut self, delay: Duration) -> Self {
        self.debounce = (!delay.is_zero()).then(|| Debounce {
            delay,
            debouncer: ReleaseDebouncer::new(),
            released: Mutex::new(None),
        });
        self
    }

    /// Held-key state for this run
    pub fn tracker(&self) -> &KeyStateTracker {
        &self.tracker
    }

    /// Handle one raw event
    pub fn on_raw_event(&self, event: &RawKeyEvent) {
        let Some(key) = TrackedKey::from_raw_name(&event.name) else {
            return;
        };
        if self.echo.take(key, event.kind) {
            trace!(key = %key, kind = ?event.kind, "ignoring injected echo");
            return;
        }
        match event.kind {
            RawEventKind::Down => self.on_down(key),
            RawEventKind::Up => self.on_up(key),
        }
    }

    fn on_down(&self, key: TrackedKey) {
        if !self.tracker.on_press(key) {
            return;
        }
        debug!("{} pressed", key);
        self.observer.on_event(&EngineEvent::KeyPressed { key });

        if let Some(debounce) = &self.debounce {
            if debounce.debouncer.cancel() {
                if let Some(released) = debounce.released.lock().take() {
                    debug!("Stop after {} cancelled by {} press", released, key);
                    self.observer
                        .on_event(&EngineEvent::StrikeCancelled { released });
                }
            }
        }
    }

    fn on_up(&self, key: TrackedKey) {
        let Some(release) = self.tracker.release(key) else {
            return;
        };
        debug!("{} held for {:.3}s", key, release.held_for.as_secs_f64());
        self.observer.on_event(&EngineEvent::KeyReleased {
            key,
            held_for: release.held_for,
        });

        let strike = self.policy.decide_chord(
            key,
            release.held_for,
            release.others_held(),
            release.chord,
        );
        let Some(strike) = strike else {
            if release.others_held() {
                debug!("Other movement keys still held ({}), no stop", release.still_held);
                self.observer.on_event(&EngineEvent::Suppressed { key });
            }
            return;
        };

        match &self.debounce {
            Some(debounce) => {
                *debounce.released.lock() = Some(key);
                let queue = self.queue.clone();
                let observer = Arc::clone(&self.observer);
                debounce.debouncer.schedule(debounce.delay, move || {
                    dispatch(&queue, observer.as_ref(), key, strike);
                });
            }
            None => dispatch(&self.queue, self.observer.as_ref(), key, strike),
        }
    }

    /// Drop any pending strike and forget held keys
    pub fn shutdown(&self) {
        if let Some(debounce) = &self.debounce {
            debounce.debouncer.cancel();
            debounce.released.lock().take();
        }
        self.tracker.reset();
    }
}

impl RawKeySink for KeyEventRouter {
    fn on_raw_event(&self, event: RawKeyEvent) {
        KeyEventRouter::on_raw_event(self, &event);
    }
}

fn dispatch(
    queue: &InjectionQueue,
    observer: &dyn EngineObserver,
    released: TrackedKey,
    strike: Strike,
) {
    for task in &strike.tasks {
        if let Err(e) = queue.enqueue(*task) {
            debug!("Dropping {}: {}", task, e);
            return;
        }
    }
    debug!(
        "{} stop after {}: {} task(s), {} waiting",
        strike.kind,
        released,
        strike.tasks.len(),
        queue.len()
    );
    observer.on_event(&EngineEvent::StrikeQueued {
        released,
        kind: strike.kind,
        tasks: strike.tasks,
    });
}
