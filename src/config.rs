//! Configuration management for AutoStop
//!
//! There are three ways in: the command line, a TOML file, and the text
//! fields of a settings form. All of them end up as a validated
//! [`EngineConfig`], which is fixed for the lifetime of one engine run.
//!
//! ```toml
//! press_threshold_ms = 100
//! combo_reverse = false
//!
//! [emergency_hold]
//! min_ms = 20
//! max_ms = 40
//!
//! [long_hold]
//! min_ms = 60
//! max_ms = 90
//! ```

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::{AutoStopError, Result};

/// Inclusive range of counter-press hold times in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl HoldRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    /// Reject inverted ranges. `min == max` is allowed.
    pub fn validate(&self, name: &'static str) -> Result<()> {
        if self.min_ms > self.max_ms {
            return Err(AutoStopError::InvalidRange {
                name,
                min: self.min_ms,
                max: self.max_ms,
            });
        }
        Ok(())
    }

    pub fn contains(&self, ms: u64) -> bool {
        (self.min_ms..=self.max_ms).contains(&ms)
    }

    /// Draw a hold time uniformly from the range. Must be validated first.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        Duration::from_millis(rng.gen_range(self.min_ms..=self.max_ms))
    }
}

impl FromStr for HoldRange {
    type Err = AutoStopError;

    /// Parses `20-40`, `20..40` or a single `30`
    fn from_str(s: &str) -> Result<Self> {
        let parse = |part: &str| {
            part.trim()
                .parse::<u64>()
                .map_err(|_| AutoStopError::NotANumber {
                    field: "hold range",
                    value: s.to_string(),
                })
        };

        let bounds = s.split_once("..").or_else(|| s.split_once('-'));
        match bounds {
            Some((min, max)) => Ok(Self::new(parse(min)?, parse(max)?)),
            None => {
                let ms = parse(s)?;
                Ok(Self::new(ms, ms))
            }
        }
    }
}

/// Counter-strike decision parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyConfig {
    /// Releases shorter than this get a short counter-press
    pub press_threshold: Duration,
    /// Hold range for short releases
    pub emergency_hold: HoldRange,
    /// Hold range for releases at or above the threshold
    pub long_hold: HoldRange,
    /// Counter a diagonal combo with both opposite keys
    pub combo_reverse: bool,
}

impl PolicyConfig {
    /// Create a validated policy config
    pub fn new(
        press_threshold: Duration,
        emergency_hold: HoldRange,
        long_hold: HoldRange,
    ) -> Result<Self> {
        let config = Self {
            press_threshold,
            emergency_hold,
            long_hold,
            combo_reverse: false,
        };
        config.validate()?;
        Ok(config)
    }

    /// Counter diagonal combos with both opposite keys
    pub fn with_combo_reverse(mut self, enabled: bool) -> Self {
        self.combo_reverse = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.emergency_hold.validate("emergency hold")?;
        self.long_hold.validate("long hold")
    }
}

/// Convert a threshold given in fractional seconds
pub fn threshold_from_secs(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| AutoStopError::InvalidThreshold(format!("{} seconds: {}", secs, e)))
}

/// Everything one engine run needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub policy: PolicyConfig,
    /// Idle wake-up of the injection worker, at most one second
    pub poll_interval: Duration,
    /// How often a running engine reports its uptime; zero disables ticks
    pub tick_interval: Duration,
    /// Delay before a final-release strike fires; zero fires immediately
    pub release_debounce: Duration,
    /// How long after an injected press/release the hook echo is ignored
    pub echo_window: Duration,
}

impl EngineConfig {
    pub fn new(policy: PolicyConfig) -> Self {
        Self {
            policy,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            tick_interval: Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
            release_debounce: Duration::ZERO,
            echo_window: Duration::from_millis(DEFAULT_ECHO_WINDOW_MS),
        }
    }

    /// Set the worker idle wake-up, clamped to 1ms..=1s
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL);
        self
    }

    /// Set the uptime report interval
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Delay final-release strikes
    pub fn with_release_debounce(mut self, delay: Duration) -> Self {
        self.release_debounce = delay;
        self
    }

    /// Set how long injected events are expected back from the hook
    pub fn with_echo_window(mut self, window: Duration) -> Self {
        self.echo_window = window;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.policy.validate()
    }
}

const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;
const DEFAULT_ECHO_WINDOW_MS: u64 = 30;

/// Key simulation backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// rdev simulate (X11, Windows, macOS)
    #[default]
    Rdev,
    /// ydotool via the ydotoold daemon (Wayland)
    Ydotool,
}

/// File and command-line configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub press_threshold_ms: u64,
    /// Threshold in fractional seconds; takes precedence over the ms value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub press_threshold_secs: Option<f64>,
    pub emergency_hold: HoldRange,
    pub long_hold: HoldRange,
    pub combo_reverse: bool,
    pub release_debounce_ms: u64,
    pub echo_window_ms: u64,
    pub poll_interval_ms: u64,
    pub tick_interval_ms: u64,
    pub backend: Backend,
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            press_threshold_ms: 100,
            press_threshold_secs: None,
            emergency_hold: HoldRange::new(20, 40),
            long_hold: HoldRange::new(60, 90),
            combo_reverse: false,
            release_debounce_ms: 0,
            echo_window_ms: DEFAULT_ECHO_WINDOW_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            backend: Backend::default(),
            verbose: false,
        }
    }
}

impl Config {
    /// Load a TOML config file; missing keys take their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| AutoStopError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        Ok(toml::from_str(&contents)?)
    }

    /// Set the threshold in milliseconds
    pub fn with_threshold_ms(mut self, ms: u64) -> Self {
        self.press_threshold_ms = ms;
        self.press_threshold_secs = None;
        self
    }

    /// Set the threshold in fractional seconds, e.g. 0.1
    pub fn with_threshold_secs(mut self, secs: f64) -> Self {
        self.press_threshold_secs = Some(secs);
        self
    }

    /// The effective press threshold
    pub fn press_threshold(&self) -> Result<Duration> {
        match self.press_threshold_secs {
            Some(secs) => threshold_from_secs(secs),
            None => Ok(Duration::from_millis(self.press_threshold_ms)),
        }
    }

    /// Set the short stop hold range
    pub fn with_emergency_hold(mut self, range: HoldRange) -> Self {
        self.emergency_hold = range;
        self
    }

    /// Set the long stop hold range
    pub fn with_long_hold(mut self, range: HoldRange) -> Self {
        self.long_hold = range;
        self
    }

    /// Counter diagonal combos with both opposite keys
    pub fn with_combo_reverse(mut self, enabled: bool) -> Self {
        self.combo_reverse = enabled;
        self
    }

    /// Delay final-release strikes by this many milliseconds
    pub fn with_release_debounce_ms(mut self, ms: u64) -> Self {
        self.release_debounce_ms = ms;
        self
    }

    /// Select the key simulation backend
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Enable verbose logging
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Validate and convert into the engine's view of the settings
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let policy = PolicyConfig::new(
            self.press_threshold()?,
            self.emergency_hold,
            self.long_hold,
        )?
        .with_combo_reverse(self.combo_reverse);

        Ok(EngineConfig::new(policy)
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
            .with_tick_interval(Duration::from_millis(self.tick_interval_ms))
            .with_release_debounce(Duration::from_millis(self.release_debounce_ms))
            .with_echo_window(Duration::from_millis(self.echo_window_ms)))
    }
}

/// Raw text of a settings form, as typed by the user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsForm {
    pub press_threshold_ms: String,
    pub emergency_min_ms: String,
    pub emergency_max_ms: String,
    pub long_min_ms: String,
    pub long_max_ms: String,
}

impl SettingsForm {
    /// Parse every field and validate the ranges
    pub fn parse(&self) -> Result<PolicyConfig> {
        let threshold = parse_ms("press threshold", &self.press_threshold_ms)?;
        let emergency = HoldRange::new(
            parse_ms("emergency min", &self.emergency_min_ms)?,
            parse_ms("emergency max", &self.emergency_max_ms)?,
        );
        let long = HoldRange::new(
            parse_ms("long min", &self.long_min_ms)?,
            parse_ms("long max", &self.long_max_ms)?,
        );
        PolicyConfig::new(Duration::from_millis(threshold), emergency, long)
    }
}

fn parse_ms(field: &'static str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| AutoStopError::NotANumber {
            field,
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::io::Write;

    fn form(threshold: &str, e: (&str, &str), l: (&str, &str)) -> SettingsForm {
        SettingsForm {
            press_threshold_ms: threshold.into(),
            emergency_min_ms: e.0.into(),
            emergency_max_ms: e.1.into(),
            long_min_ms: l.0.into(),
            long_max_ms: l.1.into(),
        }
    }

    #[test]
    fn inverted_range_is_rejected() {
        let err = PolicyConfig::new(
            Duration::from_millis(100),
            HoldRange::new(50, 10),
            HoldRange::new(60, 90),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            AutoStopError::InvalidRange { name: "emergency hold", min: 50, max: 10 }
        ));
        assert!(err.is_config_error());
    }

    #[test]
    fn degenerate_range_is_deterministic() {
        let range = HoldRange::new(30, 30);
        range.validate("emergency hold").unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            assert_eq!(range.sample(&mut rng), Duration::from_millis(30));
        }
    }

    #[test]
    fn hold_range_parses_cli_forms() {
        assert_eq!("20-40".parse::<HoldRange>().unwrap(), HoldRange::new(20, 40));
        assert_eq!("20..40".parse::<HoldRange>().unwrap(), HoldRange::new(20, 40));
        assert_eq!(" 35 ".parse::<HoldRange>().unwrap(), HoldRange::new(35, 35));
        assert!("twenty-40".parse::<HoldRange>().is_err());
    }

    #[test]
    fn form_parses_valid_fields() {
        let policy = form("100", ("20", "40"), (" 60 ", "90")).parse().unwrap();
        assert_eq!(policy.press_threshold, Duration::from_millis(100));
        assert_eq!(policy.emergency_hold, HoldRange::new(20, 40));
        assert_eq!(policy.long_hold, HoldRange::new(60, 90));
        assert!(!policy.combo_reverse);
    }

    #[test]
    fn form_rejects_non_numeric_fields() {
        let err = form("100", ("20", "abc"), ("60", "90")).parse().unwrap_err();
        match err {
            AutoStopError::NotANumber { field, value } => {
                assert_eq!(field, "emergency max");
                assert_eq!(value, "abc");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(form("", ("20", "40"), ("60", "90")).parse().is_err());
        assert!(form("100", ("-5", "40"), ("60", "90")).parse().is_err());
    }

    #[test]
    fn form_rejects_inverted_long_range() {
        let err = form("100", ("20", "40"), ("90", "60")).parse().unwrap_err();
        assert!(matches!(err, AutoStopError::InvalidRange { name: "long hold", .. }));
    }

    #[test]
    fn fractional_threshold_seconds() {
        assert_eq!(threshold_from_secs(0.1).unwrap(), Duration::from_millis(100));
        assert!(threshold_from_secs(-1.0).is_err());
        assert!(threshold_from_secs(f64::NAN).is_err());
    }

    #[test]
    fn threshold_secs_overrides_ms() {
        let config = Config::default().with_threshold_secs(0.25);
        assert_eq!(
            config.engine_config().unwrap().policy.press_threshold,
            Duration::from_millis(250)
        );

        let err = Config::default().with_threshold_secs(-0.5).engine_config().unwrap_err();
        assert!(matches!(err, AutoStopError::InvalidThreshold(_)));

        let config = config.with_threshold_ms(80);
        assert_eq!(config.press_threshold().unwrap(), Duration::from_millis(80));
    }

    #[test]
    fn threshold_secs_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "press_threshold_secs = 0.125").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.press_threshold().unwrap(), Duration::from_millis(125));
    }

    #[test]
    fn poll_interval_is_clamped() {
        let far = Config {
            poll_interval_ms: u64::MAX,
            ..Config::default()
        };
        assert_eq!(far.engine_config().unwrap().poll_interval, Duration::from_secs(1));

        let zero = Config {
            poll_interval_ms: 0,
            ..Config::default()
        };
        assert_eq!(zero.engine_config().unwrap().poll_interval, Duration::from_millis(1));
    }

    #[test]
    fn config_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "press_threshold_ms = 150\ncombo_reverse = true\nbackend = \"ydotool\"\n\n[emergency_hold]\nmin_ms = 10\nmax_ms = 15\n"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.press_threshold_ms, 150);
        assert_eq!(config.emergency_hold, HoldRange::new(10, 15));
        assert_eq!(config.long_hold, Config::default().long_hold);
        assert_eq!(config.backend, Backend::Ydotool);

        let engine = config.engine_config().unwrap();
        assert!(engine.policy.combo_reverse);
        assert_eq!(engine.poll_interval, Duration::from_millis(100));
    }

    #[test]
    fn config_file_with_unknown_key_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "press_treshold_ms = 150").unwrap();
        assert!(matches!(
            Config::load(file.path()),
            Err(AutoStopError::ConfigParse(_))
        ));
    }

    #[test]
    fn missing_config_file_reports_path() {
        let err = Config::load("/nonexistent/autostop.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/autostop.toml"));
    }

    #[test]
    fn invalid_file_ranges_fail_conversion() {
        let config = Config::default().with_long_hold(HoldRange::new(100, 1));
        assert!(config.engine_config().is_err());
    }
}
