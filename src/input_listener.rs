//! Global keyboard hook using rdev

use parking_lot::Mutex;
use rdev::{listen, Event, EventType, Key};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::router::{RawEventKind, RawKeyEvent};
use crate::{AutoStopError, Result};

/// Receiver of raw keyboard events
pub trait RawKeySink: Send + Sync {
    fn on_raw_event(&self, event: RawKeyEvent);
}

/// A global key-event source the engine attaches to while running
pub trait KeyHook: Send + Sync {
    /// Start delivering events to `sink`, replacing any previous sink
    fn hook(&self, sink: Arc<dyn RawKeySink>) -> Result<()>;

    /// Stop delivering events
    fn unhook(&self);
}

type SinkSlot = Arc<Mutex<Option<Arc<dyn RawKeySink>>>>;

/// How long `hook` waits for `rdev::listen` to fail before assuming success
const LISTEN_STARTUP_GRACE: Duration = Duration::from_millis(200);

/// Hook backed by `rdev::listen`
///
/// rdev offers no way to stop a listener, so one background thread is
/// started on the first `hook` and lives for the rest of the process.
/// `unhook` only detaches the sink.
pub struct RdevHook {
    sink: SinkSlot,
    listener: Mutex<Option<thread::JoinHandle<()>>>,
}

impl RdevHook {
    pub fn new() -> Self {
        Self {
            sink: Arc::new(Mutex::new(None)),
            listener: Mutex::new(None),
        }
    }

    fn spawn_listener(&self) -> Result<thread::JoinHandle<()>> {
        let sink = Arc::clone(&self.sink);
        let (err_tx, err_rx) = crossbeam_channel::bounded(1);

        let handle = thread::spawn(move || {
            info!("Input listener started");

            let callback = move |event: Event| {
                let Some(raw) = raw_event(&event) else {
                    return;
                };
                let target = sink.lock().clone();
                if let Some(target) = target {
                    target.on_raw_event(raw);
                }
            };

            if let Err(e) = listen(callback) {
                error!("Error in input listener: {:?}", e);
                let _ = err_tx.send(format!("{:?}", e));
            }
        });

        match err_rx.recv_timeout(LISTEN_STARTUP_GRACE) {
            Ok(e) => Err(AutoStopError::InputAccess(format!(
                "Failed to start keyboard listener: {}",
                e
            ))),
            Err(_) => Ok(handle),
        }
    }
}

impl Default for RdevHook {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyHook for RdevHook {
    fn hook(&self, sink: Arc<dyn RawKeySink>) -> Result<()> {
        let mut listener = self.listener.lock();
        if listener.as_ref().is_some_and(|h| h.is_finished()) {
            *listener = None;
        }
        if listener.is_none() {
            *listener = Some(self.spawn_listener()?);
        }
        *self.sink.lock() = Some(sink);
        debug!("Keyboard hook attached");
        Ok(())
    }

    fn unhook(&self) {
        *self.sink.lock() = None;
        debug!("Keyboard hook detached");
    }
}

/// Convert an rdev event to a raw key event; non-keyboard events are dropped
fn raw_event(event: &Event) -> Option<RawKeyEvent> {
    let (kind, key) = match event.event_type {
        EventType::KeyPress(key) => (RawEventKind::Down, key),
        EventType::KeyRelease(key) => (RawEventKind::Up, key),
        _ => return None,
    };
    Some(RawKeyEvent::new(kind, key_name(key)))
}

/// Raw key name for an rdev key. The movement letters are lowercase,
/// everything else is the rdev variant name.
fn key_name(key: Key) -> String {
    let letter = match key {
        Key::KeyA => "a",
        Key::KeyD => "d",
        Key::KeyS => "s",
        Key::KeyW => "w",
        other => return format!("{:?}", other),
    };
    letter.to_string()
}
