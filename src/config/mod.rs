mod engine_config;

pub use engine_config::{BiasConfig, EngineConfig, LogFormat, LoggingConfig, MonitorConfig};
