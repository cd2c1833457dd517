use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Textual form that marks a variable wind direction
pub const VARIABLE_WIND: &str = "VRB";

/// Numeric report field, keeping the text it was decoded from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Number {
    pub repr: String,
    pub value: Option<f64>,
}

impl Number {
    pub fn new(repr: impl Into<String>, value: Option<f64>) -> Self {
        Self {
            repr: repr.into(),
            value,
        }
    }

    /// True when the textual form is the variable-wind marker
    pub fn is_variable(&self) -> bool {
        self.repr == VARIABLE_WIND
    }
}

/// Structured decode of a METAR report.
///
/// Only the fields the sensors consume are kept; everything is optional
/// because stations routinely omit or mask groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedReport {
    pub station: String,
    pub observation_time: Option<DateTime<Utc>>,
    /// Knots
    pub wind_speed: Option<Number>,
    /// Knots
    pub wind_gust: Option<Number>,
    /// Degrees true, `repr` is `VRB` when variable
    pub wind_direction: Option<Number>,
    /// Degrees Celsius
    pub temperature: Option<Number>,
    /// Degrees Celsius
    pub dew_point: Option<Number>,
}

/// The most recently fetched report for one station.
///
/// Never mutated after construction; the coordinator replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub raw_report: String,
    pub parsed: Option<ParsedReport>,
    pub fetch_time: DateTime<Utc>,
    pub expires_hint: Option<String>,
}

/// Descriptive data shared by every sensor of one station
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationRef {
    pub icao: String,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub sw_version: String,
    pub configuration_url: String,
}

impl StationRef {
    pub fn new(icao: &str) -> Self {
        Self {
            icao: icao.to_string(),
            name: format!("CAVOK: {}", icao),
            manufacturer: "Met.no".to_string(),
            model: "METAR Weather Station".to_string(),
            sw_version: env!("CARGO_PKG_VERSION").to_string(),
            configuration_url: format!("https://metar-taf.com/metar/{}", icao),
        }
    }
}

/// Published state of a station loop
#[derive(Debug, Clone)]
pub struct StationState {
    pub snapshot: Option<std::sync::Arc<WeatherSnapshot>>,
    pub last_update_success: bool,
    pub last_error: Option<String>,
    pub next_interval: Duration,
}

/// Normalize user input into an ICAO code (trimmed, uppercase).
///
/// Returns `None` unless the result is exactly four ASCII letters or digits.
pub fn normalize_icao(input: &str) -> Option<String> {
    let code = input.trim().to_ascii_uppercase();
    if code.len() == 4 && code.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some(code)
    } else {
        None
    }
}

/// Report decoding errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Empty report")]
    Empty,
    #[error("Missing station identifier in '{0}'")]
    MissingStation(String),
    #[error("Missing or invalid observation time in '{0}'")]
    InvalidTime(String),
}

/// METAR provider errors
#[derive(Debug, thiserror::Error)]
pub enum MetarError {
    #[error("Error 404, wrong airport?")]
    NotFound,
    #[error("Error with connecting to API: {message} - {kind}")]
    Fetch { message: String, kind: String },
    #[error("Empty response from Met.no")]
    EmptyResponse,
    #[error("HTTP client error: {0}")]
    Client(String),
    #[error("Invalid ICAO code: '{0}'")]
    InvalidIcao(String),
    #[error("Station already registered: {0}")]
    DuplicateStation(String),
    #[error("Unknown station: {0}")]
    UnknownStation(String),
    #[error("Shutting down")]
    ShuttingDown,
}

impl MetarError {
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            "TimeoutError"
        } else if err.is_connect() {
            "ConnectError"
        } else if err.is_status() {
            "StatusError"
        } else if err.is_body() || err.is_decode() {
            "BodyError"
        } else {
            "RequestError"
        };
        MetarError::Fetch {
            message: err.to_string(),
            kind: kind.to_string(),
        }
    }

    /// Whether the next scheduled poll may succeed without user action
    pub fn is_transient(&self) -> bool {
        matches!(self, MetarError::Fetch { .. } | MetarError::EmptyResponse)
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            MetarError::NotFound => "Airport not found. Check the ICAO code.",
            MetarError::Fetch { .. } => "Could not reach met.no. Will retry shortly.",
            MetarError::EmptyResponse => "met.no returned no report. Will retry shortly.",
            MetarError::Client(_) => "Failed to set up the HTTP client.",
            MetarError::InvalidIcao(_) => "ICAO codes are four letters, e.g. ENGM.",
            MetarError::DuplicateStation(_) => "This airport is already being monitored.",
            MetarError::UnknownStation(_) => "This airport is not being monitored.",
            MetarError::ShuttingDown => "The application is shutting down.",
        }
    }
}
