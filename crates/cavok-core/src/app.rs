use std::sync::Arc;

use cavok_metar::{MetarError, MetarProvider, Supervisor};

use crate::error::{AppError, ConfigError};
use crate::Config;

/// Outcome of starting the configured stations
#[derive(Debug, Default)]
pub struct StartSummary {
    pub started: Vec<String>,
    pub failed: Vec<(String, MetarError)>,
}

/// Main application state and lifecycle manager
pub struct App {
    config: Arc<Config>,
    supervisor: Arc<Supervisor>,
}

impl App {
    /// Create a new application instance from a validated config
    pub fn new(config: Config) -> Result<Self, AppError> {
        let validation = config.validate();
        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }

        let provider = MetarProvider::new(config.metar.provider_options())?;
        tracing::debug!("Using endpoint {}", provider.endpoint());

        Ok(Self {
            config: Arc::new(config),
            supervisor: Arc::new(Supervisor::new(Arc::new(provider))),
        })
    }

    /// Start polling every configured station.
    ///
    /// A station whose first fetch fails is skipped and reported in the
    /// summary; starting fails only if no station could be started.
    pub async fn start(&self) -> Result<StartSummary, AppError> {
        let codes = self.config.station_codes();
        if codes.is_empty() {
            return Err(ConfigError::MissingSetting("stations".to_string()).into());
        }

        tracing::info!("Starting {} station(s)", codes.len());
        let mut summary = StartSummary::default();

        for code in codes {
            match self.supervisor.add_station(&code).await {
                Ok(icao) => summary.started.push(icao),
                Err(e) => {
                    tracing::error!("Could not start {}: {} ({})", code, e, e.user_message());
                    summary.failed.push((code, e));
                }
            }
        }

        if summary.started.is_empty() {
            let (code, err) = summary
                .failed
                .pop()
                .ok_or_else(|| ConfigError::MissingSetting("stations".to_string()))?;
            tracing::error!("No station could be started (last failure: {})", code);
            return Err(err.into());
        }

        tracing::info!("Application started successfully");
        Ok(summary)
    }

    /// Stop every station loop
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down application");
        self.supervisor.shutdown().await;
    }

    /// Get reference to application config
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn supervisor(&self) -> Arc<Supervisor> {
        self.supervisor.clone()
    }
}
