//! Periodic uptime reports for a running engine

use crossbeam_channel::{bounded, select, tick, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, trace};

use crate::observer::{EngineEvent, EngineObserver};

/// Emits `EngineEvent::Tick` on a fixed interval until stopped
pub struct UptimeTicker {
    stop: Option<Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl UptimeTicker {
    /// Start ticking; the first tick fires one interval after `started_at`
    pub fn spawn(
        interval: Duration,
        started_at: Instant,
        observer: Arc<dyn EngineObserver>,
    ) -> Self {
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let handle = thread::spawn(move || {
            let ticks = tick(interval);
            loop {
                let keep_going = select! {
                    recv(ticks) -> _ => {
                        let uptime = started_at.elapsed();
                        trace!(uptime_ms = uptime.as_millis() as u64, "tick");
                        observer.on_event(&EngineEvent::Tick { uptime });
                        true
                    }
                    recv(stop_rx) -> _ => false,
                };
                if !keep_going {
                    break;
                }
            }
        });
        Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        }
    }

    /// Stop ticking and wait for the thread; no tick is emitted afterwards
    pub fn stop(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Uptime ticker panicked");
            }
        }
    }
}

impl Drop for UptimeTicker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn ticks_until_stopped() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let observer: Arc<dyn EngineObserver> = Arc::new(move |e: &EngineEvent| {
            if let EngineEvent::Tick { uptime } = e {
                sink.lock().push(*uptime);
            }
        });

        let started = Instant::now();
        let mut ticker = UptimeTicker::spawn(Duration::from_millis(10), started, observer);
        let deadline = Instant::now() + Duration::from_secs(2);
        while seen.lock().len() < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        ticker.stop();

        let count = seen.lock().len();
        assert!(count >= 3);
        let uptimes = seen.lock().clone();
        assert!(uptimes.windows(2).all(|w| w[0] <= w[1]));
        assert!(uptimes[0] >= Duration::from_millis(10));

        thread::sleep(Duration::from_millis(40));
        assert_eq!(seen.lock().len(), count);
    }
}
