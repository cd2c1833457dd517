use anyhow::{Context, Result};
use cavok_metar::provider::{METNO_TAFMETAR_URL, REQUEST_TIMEOUT_SECS, USER_AGENT};
use cavok_metar::{normalize_icao, ProviderOptions};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Timeouts above this are allowed but probably a mistake
const LONG_TIMEOUT_SECS: u64 = 60;

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// met.no connection settings
    #[serde(default)]
    pub metar: MetarConfig,

    /// Airports to monitor
    #[serde(default)]
    pub stations: Vec<StationConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetarConfig {
    /// tafmetar endpoint URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// User-Agent sent with every request (met.no requires one)
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_endpoint() -> String {
    METNO_TAFMETAR_URL.to_string()
}

fn default_user_agent() -> String {
    USER_AGENT.to_string()
}

fn default_request_timeout_secs() -> u64 {
    REQUEST_TIMEOUT_SECS
}

impl Default for MetarConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl MetarConfig {
    pub fn provider_options(&self) -> ProviderOptions {
        ProviderOptions {
            endpoint: self.endpoint.clone(),
            user_agent: self.user_agent.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationConfig {
    /// Four-letter ICAO airport code
    pub icao: String,
}

impl StationConfig {
    pub fn new(icao: impl Into<String>) -> Self {
        Self { icao: icao.into() }
    }
}

impl Config {
    /// Config written on first run
    pub fn starter() -> Self {
        Self {
            metar: MetarConfig::default(),
            stations: vec![StationConfig::new("ENGM")],
        }
    }

    /// Load configuration from the default location, creating it if it doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, writing the starter config there if missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::starter();
            config.save_to(path)?;
            tracing::info!("Wrote default configuration to {}", path.display());
            return Ok(config);
        }

        let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated(path: Option<&Path>) -> Result<(Self, ValidationResult)> {
        let config = match path {
            Some(p) => Self::load_from(p)?,
            None => Self::load()?,
        };
        let validation = config.validate();

        if !validation.is_valid() {
            anyhow::bail!(
                "Configuration validation failed: {}",
                validation.error_summary()
            );
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_url(&self.metar.endpoint, "metar.endpoint", &mut result);

        if self.metar.user_agent.trim().is_empty() {
            result.add_error("metar.user_agent", "User-Agent must not be empty");
        }

        if self.metar.request_timeout_secs == 0 {
            result.add_error(
                "metar.request_timeout_secs",
                "Request timeout must be greater than 0",
            );
        } else if self.metar.request_timeout_secs > LONG_TIMEOUT_SECS {
            result.add_warning(
                "metar.request_timeout_secs",
                format!("Request timeout is more than {} seconds", LONG_TIMEOUT_SECS),
            );
        }

        if self.stations.is_empty() {
            result.add_warning("stations", "No stations configured - nothing will be polled");
        }

        let mut seen = HashSet::new();
        for (i, station) in self.stations.iter().enumerate() {
            let field = format!("stations[{}].icao", i);
            match normalize_icao(&station.icao) {
                Some(code) => {
                    if !seen.insert(code.clone()) {
                        result.add_error(field, format!("Duplicate station: {}", code));
                    }
                }
                None => result.add_error(
                    field,
                    format!("'{}' is not a four-letter ICAO code", station.icao),
                ),
            }
        }

        result
    }

    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Normalized ICAO codes of the configured stations
    pub fn station_codes(&self) -> Vec<String> {
        self.stations
            .iter()
            .filter_map(|s| normalize_icao(&s.icao))
            .collect()
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the path to the configuration file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("cavok");

        Ok(config_dir.join("config.toml"))
    }
}
