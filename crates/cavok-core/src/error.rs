//! Application-level error types.
//!
//! Station-level failures come from `cavok_metar::MetarError`; this module
//! wraps them together with configuration and I/O failures and provides
//! short, actionable messages for display.

use cavok_metar::MetarError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("METAR error: {0}")]
    Metar(#[from] MetarError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Returns a user-friendly message suitable for display.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Config(e) => e.user_message(),
            AppError::Metar(e) => e.user_message(),
            AppError::Io(_) => "A file operation failed. Please try again.",
            AppError::Other(_) => "An unexpected error occurred. Please try again.",
        }
    }

    /// Whether retrying later may succeed without changing anything
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Metar(e) if e.is_transient())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing required setting: {0}")]
    MissingSetting(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
            ConfigError::MissingSetting(_) => "A required setting is missing. Check your settings.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metar_error_conversion() {
        let app_err: AppError = MetarError::NotFound.into();
        assert!(matches!(app_err, AppError::Metar(MetarError::NotFound)));
        assert_eq!(app_err.to_string(), "METAR error: Error 404, wrong airport?");
        assert!(!app_err.is_transient());
    }

    #[test]
    fn test_user_message_propagation() {
        let app_err = AppError::Metar(MetarError::NotFound);
        assert_eq!(app_err.user_message(), "Airport not found. Check the ICAO code.");

        let app_err = AppError::Config(ConfigError::MissingSetting("stations".into()));
        assert_eq!(
            app_err.user_message(),
            "A required setting is missing. Check your settings."
        );
    }

    #[test]
    fn test_transient_errors() {
        let app_err = AppError::Metar(MetarError::EmptyResponse);
        assert!(app_err.is_transient());
        assert!(!AppError::Config(ConfigError::Invalid("x".into())).is_transient());
    }
}
