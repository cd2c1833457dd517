//! Sensor projections over the current [`WeatherSnapshot`].
//!
//! Every projection is a pure read of the snapshot: a missing snapshot, a
//! report that failed to decode and a missing field all come out as `None`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

use crate::types::{Number, StationRef, StationState, WeatherSnapshot};

const KMH_PER_KNOT: f64 = 1.852;
/// Above this temperature the wind-chill model does not apply
const REAL_FEEL_MAX_TEMP_C: f64 = 10.0;
/// Below this wind speed the wind-chill model does not apply
const REAL_FEEL_MIN_WIND_KMH: f64 = 4.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    RawReport,
    ObservationTime,
    WindSpeed,
    WindGust,
    WindDirection,
    Temperature,
    DewPoint,
    RealFeel,
}

impl SensorKind {
    pub const ALL: [SensorKind; 8] = [
        SensorKind::RawReport,
        SensorKind::ObservationTime,
        SensorKind::WindSpeed,
        SensorKind::WindGust,
        SensorKind::WindDirection,
        SensorKind::Temperature,
        SensorKind::DewPoint,
        SensorKind::RealFeel,
    ];

    pub fn unique_id_suffix(&self) -> &'static str {
        match self {
            Self::RawReport => "metar_raw",
            Self::ObservationTime => "time",
            Self::WindSpeed => "wind_speed",
            Self::WindGust => "wind_gust",
            Self::WindDirection => "wind_direction",
            Self::Temperature => "temp_sensor",
            Self::DewPoint => "dewpoint_sensor",
            Self::RealFeel => "real_feel",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::RawReport => "METAR",
            Self::ObservationTime => "Time",
            Self::WindSpeed => "Wind Speed",
            Self::WindGust => "Wind Gust",
            Self::WindDirection => "Wind Direction",
            Self::Temperature => "Temperature",
            Self::DewPoint => "Dew Point",
            Self::RealFeel => "Real Feel",
        }
    }

    pub fn unit(&self) -> Option<&'static str> {
        match self {
            Self::RawReport | Self::ObservationTime => None,
            Self::WindSpeed | Self::WindGust => Some("kn"),
            Self::WindDirection => Some("°"),
            Self::Temperature | Self::DewPoint | Self::RealFeel => Some("°C"),
        }
    }

    /// Project this sensor's value out of a snapshot
    pub fn project(&self, snapshot: Option<&WeatherSnapshot>) -> Option<SensorValue> {
        let snapshot = snapshot?;
        if let Self::RawReport = self {
            return Some(SensorValue::Text(snapshot.raw_report.clone()));
        }

        let report = snapshot.parsed.as_ref()?;
        match self {
            Self::RawReport => None,
            Self::ObservationTime => report.observation_time.map(SensorValue::Timestamp),
            Self::WindSpeed => number_value(&report.wind_speed),
            Self::WindGust => number_value(&report.wind_gust),
            Self::WindDirection => match &report.wind_direction {
                Some(direction) if direction.is_variable() => None,
                other => number_value(other),
            },
            Self::Temperature => number_value(&report.temperature),
            Self::DewPoint => number_value(&report.dew_point),
            Self::RealFeel => {
                let temperature = report.temperature.as_ref()?.value?;
                let wind_speed = report.wind_speed.as_ref()?.value?;
                Some(SensorValue::Number(real_feel(temperature, wind_speed)))
            }
        }
    }
}

fn number_value(field: &Option<Number>) -> Option<SensorValue> {
    field.as_ref()?.value.map(SensorValue::Number)
}

/// Wind-chill style "feels like" temperature.
///
/// Returns the air temperature unchanged when it is above 10 °C or the wind
/// is below 4.8 km/h, otherwise the model value rounded to two decimals.
pub fn real_feel(temperature_c: f64, wind_speed_knots: f64) -> f64 {
    let wind_kmh = wind_speed_knots * KMH_PER_KNOT;
    if temperature_c > REAL_FEEL_MAX_TEMP_C || wind_kmh < REAL_FEEL_MIN_WIND_KMH {
        return temperature_c;
    }

    let wind_factor = wind_kmh.powf(0.16);
    let feel = 13.12 + 0.6215 * temperature_c - 11.37 * wind_factor
        + 0.3965 * temperature_c * wind_factor;
    (feel * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SensorValue {
    Text(String),
    Timestamp(DateTime<Utc>),
    Number(f64),
}

impl std::fmt::Display for SensorValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorValue::Text(s) => write!(f, "{}", s),
            SensorValue::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
            SensorValue::Number(n) => write!(f, "{}", n),
        }
    }
}

/// Point-in-time reading of one sensor
#[derive(Debug, Clone, Serialize)]
pub struct SensorReading {
    pub unique_id: String,
    pub name: String,
    pub value: Option<SensorValue>,
    pub unit: Option<&'static str>,
}

/// One sensor of one station, bound to that station's published state
#[derive(Debug, Clone)]
pub struct Sensor {
    station: Arc<StationRef>,
    kind: SensorKind,
    state: watch::Receiver<StationState>,
}

impl Sensor {
    pub fn new(station: Arc<StationRef>, kind: SensorKind, state: watch::Receiver<StationState>) -> Self {
        Self {
            station,
            kind,
            state,
        }
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    pub fn station(&self) -> &StationRef {
        &self.station
    }

    pub fn unique_id(&self) -> String {
        format!("{}_{}", self.station.icao, self.kind.unique_id_suffix())
    }

    pub fn name(&self) -> String {
        format!("{} {}", self.station.icao, self.kind.label())
    }

    /// Whether the last poll of this sensor's station succeeded
    pub fn available(&self) -> bool {
        self.state.borrow().last_update_success
    }

    pub fn value(&self) -> Option<SensorValue> {
        let snapshot = self.current_snapshot();
        self.kind.project(snapshot.as_deref())
    }

    /// Extra attributes; only the raw report sensor carries any
    pub fn attributes(&self) -> Option<serde_json::Value> {
        if self.kind != SensorKind::RawReport {
            return None;
        }
        let snapshot = self.current_snapshot();
        Some(serde_json::json!({
            "last_update": snapshot.as_ref().map(|s| s.fetch_time),
            "source": "Met.no",
            "Expires": snapshot.as_ref().and_then(|s| s.expires_hint.clone()),
        }))
    }

    pub fn reading(&self) -> SensorReading {
        SensorReading {
            unique_id: self.unique_id(),
            name: self.name(),
            value: self.value(),
            unit: self.kind.unit(),
        }
    }

    fn current_snapshot(&self) -> Option<Arc<WeatherSnapshot>> {
        // Clone the Arc out so the watch lock is not held while projecting.
        self.state.borrow().snapshot.clone()
    }
}

/// Build every sensor for a station
pub fn station_sensors(station: Arc<StationRef>, state: &watch::Receiver<StationState>) -> Vec<Sensor> {
    SensorKind::ALL
        .iter()
        .map(|kind| Sensor::new(station.clone(), *kind, state.clone()))
        .collect()
}
