use serde::Deserialize;
use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub monitor: MonitorConfig,
    pub bias: BiasConfig,
    pub logging: LoggingConfig,
}

/// Background monitor settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Seconds between monitoring sweeps
    pub interval_secs: u64,
}

/// Bias detection thresholds and severities
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BiasConfig {
    /// Tolerated relative deviation of an arm from its equal share
    pub selection_deviation: f64,
    /// Severity contributed by selection bias
    pub selection_severity: f64,
    /// Fraction of its expected share a segment may fall short
    pub under_representation: f64,
    /// Severity contributed by cultural bias
    pub cultural_severity: f64,
    /// Tolerated spread between per-arm dropout rates
    pub dropout_spread: f64,
    /// Severity contributed by dropout bias
    pub dropout_severity: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

impl Default for BiasConfig {
    fn default() -> Self {
        Self {
            selection_deviation: 0.20,
            selection_severity: 0.3,
            under_representation: 0.20,
            cultural_severity: 0.4,
            dropout_spread: 0.15,
            dropout_severity: 0.25,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl MonitorConfig {
    /// The sweep interval as a `Duration`
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl EngineConfig {
    /// Load configuration from `config/default`, `config/local`, and
    /// `TRIALGATE__`-prefixed environment variables, in that order
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("TRIALGATE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
