//! Serialized counter-press injection
//!
//! Tasks are executed one at a time on a single worker thread: press the
//! key, hold it, release it. The worker waits on the task queue and a stop
//! channel together, so a stop request is seen as soon as no task is in
//! flight; a task that has started always finishes with its release.

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::injector::KeyInjector;
use crate::observer::{EngineEvent, EngineObserver};
use crate::policy::InjectionTask;
use crate::router::{EchoFilter, RawEventKind};
use crate::{AutoStopError, Result};

/// FIFO of counter-presses waiting for the worker
#[derive(Clone)]
pub struct InjectionQueue {
    sender: Sender<InjectionTask>,
    receiver: Receiver<InjectionTask>,
    running: Arc<AtomicBool>,
}

impl InjectionQueue {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender,
            receiver,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Add a task. Never blocks; fails only once the queue is stopped.
    pub fn enqueue(&self, task: InjectionTask) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(AutoStopError::QueueClosed);
        }
        self.sender
            .send(task)
            .map_err(|_| AutoStopError::QueueClosed)
    }

    /// Tasks queued and not yet picked up by the worker
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// True when the worker has nothing left to pick up
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn drain(&self) -> Vec<InjectionTask> {
        self.receiver.try_iter().collect()
    }

    /// Start the single worker thread draining this queue
    pub fn spawn_worker(
        &self,
        injector: Arc<dyn KeyInjector>,
        echo: Arc<EchoFilter>,
        observer: Arc<dyn EngineObserver>,
        poll_interval: Duration,
    ) -> InjectionWorker {
        let receiver = self.receiver.clone();
        let running = Arc::clone(&self.running);
        // Never sent on; dropping the sender wakes the worker.
        let (stop_tx, stop_rx) = bounded::<()>(0);

        let handle = thread::spawn(move || {
            info!("Injection worker started");
            let mut abandoned = 0;

            while running.load(Ordering::SeqCst) {
                let keep_going = select! {
                    recv(receiver) -> task => match task {
                        Ok(task) if running.load(Ordering::SeqCst) => {
                            execute(&task, injector.as_ref(), &echo, observer.as_ref());
                            true
                        }
                        Ok(_) => {
                            abandoned += 1;
                            false
                        }
                        Err(_) => false,
                    },
                    recv(stop_rx) -> _ => false,
                    default(poll_interval) => true,
                };
                if !keep_going {
                    break;
                }
            }

            abandoned += receiver.try_iter().count();
            if abandoned > 0 {
                debug!("Abandoned {} queued counter-press(es)", abandoned);
                observer.on_event(&EngineEvent::TasksAbandoned { count: abandoned });
            }
            info!("Injection worker stopped");
        });

        InjectionWorker {
            running: Arc::clone(&self.running),
            stop: Some(stop_tx),
            handle: Some(handle),
        }
    }
}

impl Default for InjectionQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Press, hold and release one key. Backend errors are reported and
/// swallowed so the worker keeps going.
fn execute(
    task: &InjectionTask,
    injector: &dyn KeyInjector,
    echo: &EchoFilter,
    observer: &dyn EngineObserver,
) {
    debug!("Injecting {}", task);

    echo.expect(task.key, RawEventKind::Down);
    let pressed = injector.press(task.key);
    if pressed.is_ok() {
        thread::sleep(task.hold);
    }
    // Always release, even after a failed press, so nothing stays down.
    echo.expect(task.key, RawEventKind::Up);
    let released = injector.release(task.key);

    match pressed.and(released) {
        Ok(()) => observer.on_event(&EngineEvent::Injected { task: *task }),
        Err(e) => {
            error!("Failed to inject {}: {}", task, e);
            observer.on_event(&EngineEvent::InjectionFailed {
                task: *task,
                error: e.to_string(),
            });
        }
    }
}

/// Handle to the running worker thread
pub struct InjectionWorker {
    running: Arc<AtomicBool>,
    stop: Option<Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl InjectionWorker {
    /// Ask the worker to stop and wait for it. Tasks not yet started are
    /// dropped; the one in flight completes first.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Injection worker panicked");
            }
        }
    }

    /// True until the worker thread has exited
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for InjectionWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
