//! Front-end facing lifecycle: settings in, start/stop, status out

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{EngineConfig, SettingsForm};
use crate::engine::Engine;
use crate::injector::KeyInjector;
use crate::input_listener::KeyHook;
use crate::observer::EngineObserver;
use crate::{AutoStopError, Result};

/// Keeps the last accepted settings and the engine built from them
///
/// New settings never touch a running engine; they take effect on the
/// next start.
pub struct Controller {
    hook: Arc<dyn KeyHook>,
    injector: Arc<dyn KeyInjector>,
    observer: Arc<dyn EngineObserver>,
    config: Option<EngineConfig>,
    engine: Option<Engine>,
}

impl Controller {
    pub fn new(
        hook: Arc<dyn KeyHook>,
        injector: Arc<dyn KeyInjector>,
        observer: Arc<dyn EngineObserver>,
    ) -> Self {
        Self {
            hook,
            injector,
            observer,
            config: None,
            engine: None,
        }
    }

    /// Replace the settings. On error the previous settings stay.
    pub fn configure(&mut self, config: EngineConfig) -> Result<()> {
        config.validate()?;
        if self.is_running() {
            info!("Settings updated; they apply after the next start");
        }
        self.config = Some(config);
        Ok(())
    }

    /// Parse and apply the text fields of a settings form, keeping the
    /// other engine settings (or the defaults) as they are
    pub fn configure_form(&mut self, form: &SettingsForm) -> Result<()> {
        let policy = form.parse()?;
        let config = match self.config {
            Some(current) => EngineConfig { policy, ..current },
            None => EngineConfig::new(policy),
        };
        self.configure(config)
    }

    /// The last accepted configuration
    pub fn config(&self) -> Option<&EngineConfig> {
        self.config.as_ref()
    }

    /// Start with the current settings. No-op while running.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            warn!("Already running");
            return Ok(());
        }
        let config = self.config.ok_or(AutoStopError::NotConfigured)?;

        // Stale engines from an earlier run stop in their Drop.
        self.engine = None;
        let engine = Engine::new(
            config,
            Arc::clone(&self.hook),
            Arc::clone(&self.injector),
            Arc::clone(&self.observer),
        )?;
        engine.start()?;
        self.engine = Some(engine);
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(engine) = self.engine.take() {
            engine.stop();
        }
    }

    /// True while an engine run is active
    pub fn is_running(&self) -> bool {
        self.engine.as_ref().is_some_and(Engine::is_running)
    }

    /// Running time for a timer display
    pub fn uptime(&self) -> Option<Duration> {
        self.engine.as_ref().and_then(Engine::uptime)
    }
}
