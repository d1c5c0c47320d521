//! One emergency-stop run: hook, router and injection worker
//!
//! The engine is `Stopped` or `Running`. Each start builds a fresh tracker,
//! policy and queue from the engine's config; stop unhooks the keyboard,
//! drops pending strikes and joins the worker. Starting twice or stopping
//! twice does nothing.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::injector::KeyInjector;
use crate::input_listener::KeyHook;
use crate::observer::{EngineEvent, EngineObserver};
use crate::policy::CounterStrikePolicy;
use crate::queue::{InjectionQueue, InjectionWorker};
use crate::router::{EchoFilter, KeyEventRouter};
use crate::ticker::UptimeTicker;
use crate::tracker::KeyStateTracker;
use crate::Result;

struct Running {
    router: Arc<KeyEventRouter>,
    worker: InjectionWorker,
    ticker: Option<UptimeTicker>,
    started_at: Instant,
}

pub struct Engine {
    config: EngineConfig,
    hook: Arc<dyn KeyHook>,
    injector: Arc<dyn KeyInjector>,
    observer: Arc<dyn EngineObserver>,
    clock: Arc<dyn Clock>,
    seed: Option<u64>,
    running: Mutex<Option<Running>>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        hook: Arc<dyn KeyHook>,
        injector: Arc<dyn KeyInjector>,
        observer: Arc<dyn EngineObserver>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            hook,
            injector,
            observer,
            clock: Arc::new(SystemClock),
            seed: None,
            running: Mutex::new(None),
        })
    }

    /// Use another time source for key timing
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Seed hold-time draws for reproducible runs
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Settings every run of this engine uses
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Hook the keyboard and start the injection worker
    pub fn start(&self) -> Result<()> {
        let mut running = self.running.lock();
        if running.is_some() {
            warn!("Engine already running");
            return Ok(());
        }

        let policy = match self.seed {
            Some(seed) => CounterStrikePolicy::with_seed(self.config.policy, seed)?,
            None => CounterStrikePolicy::new(self.config.policy)?,
        };
        let queue = InjectionQueue::new();
        let echo = Arc::new(EchoFilter::new(self.config.echo_window, Arc::clone(&self.clock)));
        let router = Arc::new(
            KeyEventRouter::new(
                KeyStateTracker::new(Arc::clone(&self.clock)),
                policy,
                queue.clone(),
                Arc::clone(&echo),
                Arc::clone(&self.observer),
            )
            .with_release_debounce(self.config.release_debounce),
        );

        let mut worker = queue.spawn_worker(
            Arc::clone(&self.injector),
            echo,
            Arc::clone(&self.observer),
            self.config.poll_interval,
        );

        if let Err(e) = self.hook.hook(router.clone()) {
            worker.stop();
            return Err(e);
        }

        info!(
            "Engine started: threshold={}ms, short={}-{}ms, long={}-{}ms",
            self.config.policy.press_threshold.as_millis(),
            self.config.policy.emergency_hold.min_ms,
            self.config.policy.emergency_hold.max_ms,
            self.config.policy.long_hold.min_ms,
            self.config.policy.long_hold.max_ms,
        );
        let started_at = Instant::now();
        let ticker = (!self.config.tick_interval.is_zero()).then(|| {
            UptimeTicker::spawn(
                self.config.tick_interval,
                started_at,
                Arc::clone(&self.observer),
            )
        });
        *running = Some(Running {
            router,
            worker,
            ticker,
            started_at,
        });
        drop(running);
        self.observer.on_event(&EngineEvent::Started);
        Ok(())
    }

    /// Unhook the keyboard and stop the worker. Blocks until a counter-press
    /// in flight has been released.
    pub fn stop(&self) {
        let Some(mut run) = self.running.lock().take() else {
            return;
        };
        if let Some(ticker) = run.ticker.as_mut() {
            ticker.stop();
        }
        self.hook.unhook();
        run.router.shutdown();
        run.worker.stop();
        info!("Engine stopped after {:.1}s", run.started_at.elapsed().as_secs_f64());
        self.observer.on_event(&EngineEvent::Stopped);
    }

    /// True between a successful start and the next stop
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Time since the current run started
    pub fn uptime(&self) -> Option<Duration> {
        self.running
            .lock()
            .as_ref()
            .map(|run| run.started_at.elapsed())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}
