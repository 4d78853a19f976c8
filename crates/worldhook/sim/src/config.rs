//! Configuration for worldhook-sim

use serde::{Deserialize, Serialize};
use worldhook_types::CaptureConfig;

/// Main simulator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimConfig {
    /// Mediator configuration
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Report configuration
    #[serde(default)]
    pub report: ReportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// What the replay report contains
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Pretty-print the JSON report
    #[serde(default = "default_true")]
    pub pretty: bool,

    /// Include the final block map
    #[serde(default = "default_true")]
    pub include_blocks: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            pretty: true,
            include_blocks: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl SimConfig {
    /// Load configuration from defaults, an optional file and the environment
    ///
    /// Environment keys use a `WORLDHOOK_` prefix and `__` between nested
    /// keys, e.g. `WORLDHOOK_CAPTURE__MAX_CAPTURE_DEPTH=8`.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&SimConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Add environment variables with WORLDHOOK_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("WORLDHOOK")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: SimConfig = builder.build()?.try_deserialize()?;
        config
            .capture
            .validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(config)
    }
}
