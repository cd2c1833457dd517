//! METAR decoding.
//!
//! The provider only needs a handful of groups from a report, so the
//! built-in decoder walks the tokens for station, time, wind and
//! temperature and ignores the rest. Anything more complete can be plugged
//! in through [`ReportDecoder`].

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};

use crate::types::{DecodeError, Number, ParsedReport, VARIABLE_WIND};

const KNOTS_PER_MPS: f64 = 1.943_844;
const KMH_PER_KNOT: f64 = 1.852;
/// How far ahead of the reference clock a report time may be before it is
/// taken to belong to the previous month
const CLOCK_SKEW_MINUTES: i64 = 60;

/// Turns raw report text into a [`ParsedReport`].
pub trait ReportDecoder: Send + Sync {
    /// `reference` is used to resolve the day-of-month timestamp in the report.
    fn decode(&self, raw: &str, reference: DateTime<Utc>) -> Result<ParsedReport, DecodeError>;
}

/// Decoder for the station, time, wind and temperature groups.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetarDecoder;

impl ReportDecoder for MetarDecoder {
    fn decode(&self, raw: &str, reference: DateTime<Utc>) -> Result<ParsedReport, DecodeError> {
        let mut tokens = raw
            .split_whitespace()
            .take_while(|t| *t != "RMK")
            .peekable();

        if tokens.peek().is_none() {
            return Err(DecodeError::Empty);
        }
        if matches!(tokens.peek(), Some(&"METAR") | Some(&"SPECI")) {
            tokens.next();
        }

        let station = match tokens.next() {
            Some(s) if s.len() == 4 && s.chars().all(|c| c.is_ascii_alphanumeric()) => {
                s.to_string()
            }
            _ => return Err(DecodeError::MissingStation(raw.to_string())),
        };

        let observation_time = tokens
            .next()
            .and_then(|t| parse_time_group(t, reference))
            .ok_or_else(|| DecodeError::InvalidTime(raw.to_string()))?;

        let mut report = ParsedReport {
            station,
            observation_time: Some(observation_time),
            wind_speed: None,
            wind_gust: None,
            wind_direction: None,
            temperature: None,
            dew_point: None,
        };

        let mut wind_seen = false;
        for token in tokens {
            if matches!(token, "AUTO" | "COR" | "NIL") {
                continue;
            }
            if !wind_seen {
                if let Some(wind) = parse_wind_group(token) {
                    report.wind_direction = wind.direction;
                    report.wind_speed = wind.speed;
                    report.wind_gust = wind.gust;
                    wind_seen = true;
                    continue;
                }
            }
            if let Some((temperature, dew_point)) = parse_temperature_group(token) {
                report.temperature = Some(temperature);
                report.dew_point = dew_point;
                break;
            }
        }

        Ok(report)
    }
}

/// `DDHHMMZ`, resolved to the most recent matching date at or before `reference`
fn parse_time_group(token: &str, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let digits = token.strip_suffix('Z')?;
    if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let day: u32 = digits[0..2].parse().ok()?;
    let hour: u32 = digits[2..4].parse().ok()?;
    let minute: u32 = digits[4..6].parse().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }

    let limit = reference + Duration::minutes(CLOCK_SKEW_MINUTES);
    let (mut year, mut month) = (reference.year(), reference.month());

    // Day 31 may need to skip a short month, so look back a few months.
    for _ in 0..4 {
        if let Some(candidate) = NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(hour, minute, 0))
            .map(|dt| Utc.from_utc_datetime(&dt))
        {
            if candidate <= limit {
                return Some(candidate);
            }
        }
        if month == 1 {
            year -= 1;
            month = 12;
        } else {
            month -= 1;
        }
    }
    None
}

struct WindGroup {
    direction: Option<Number>,
    speed: Option<Number>,
    gust: Option<Number>,
}

/// `dddff(Gfff)KT`, also `MPS` and `KMH`. Speeds are returned in knots.
fn parse_wind_group(token: &str) -> Option<WindGroup> {
    let (body, factor) = if let Some(b) = token.strip_suffix("KT") {
        (b, 1.0)
    } else if let Some(b) = token.strip_suffix("MPS") {
        (b, KNOTS_PER_MPS)
    } else if let Some(b) = token.strip_suffix("KMH") {
        (b, 1.0 / KMH_PER_KNOT)
    } else {
        return None;
    };
    if body.len() < 5 || !body.is_ascii() {
        return None;
    }

    let (dir_text, rest) = body.split_at(3);
    let direction = if dir_text == VARIABLE_WIND {
        Some(Number::new(VARIABLE_WIND, None))
    } else if dir_text == "///" {
        None
    } else if dir_text.chars().all(|c| c.is_ascii_digit()) {
        Some(Number::new(dir_text, dir_text.parse::<f64>().ok()))
    } else {
        return None;
    };

    let (speed_text, gust_text) = match rest.split_once('G') {
        Some((s, g)) => (s, Some(g)),
        None => (rest, None),
    };

    let speed = parse_speed(speed_text, factor)?;
    let gust = match gust_text {
        Some(g) => parse_speed(g, factor)?,
        None => None,
    };

    Some(WindGroup {
        direction,
        speed,
        gust,
    })
}

/// Outer `None` means the text is not a speed at all, inner `None` a masked one.
fn parse_speed(text: &str, factor: f64) -> Option<Option<Number>> {
    if !text.is_empty() && text.chars().all(|c| c == '/') {
        return Some(None);
    }
    let digits = text.strip_prefix('P').unwrap_or(text);
    if !(2..=3).contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let value: f64 = digits.parse().ok()?;
    Some(Some(Number::new(text, Some(value * factor))))
}

/// `TT/DD` with `M` marking negative values; dew point may be missing
fn parse_temperature_group(token: &str) -> Option<(Number, Option<Number>)> {
    let (temp_text, dew_text) = token.split_once('/')?;
    let temperature = parse_signed(temp_text)?;
    let dew_point = if dew_text.is_empty() || dew_text == "//" {
        None
    } else {
        Some(parse_signed(dew_text)?)
    };
    Some((temperature, dew_point))
}

fn parse_signed(text: &str) -> Option<Number> {
    let (negative, digits) = match text.strip_prefix('M') {
        Some(d) => (true, d),
        None => (false, text),
    };
    if digits.len() != 2 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let value: f64 = digits.parse().ok()?;
    Some(Number::new(text, Some(if negative { -value } else { value })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 12, 14, 5, 0).unwrap()
    }

    fn decode(raw: &str) -> Result<ParsedReport, DecodeError> {
        MetarDecoder.decode(raw, reference())
    }

    #[test]
    fn test_decode_full_report() {
        let report = decode("ENGM 121350Z 19012G25KT 9999 FEW020 M05/M07 Q1013 NOSIG").unwrap();

        assert_eq!(report.station, "ENGM");
        assert_eq!(
            report.observation_time,
            Some(Utc.with_ymd_and_hms(2024, 3, 12, 13, 50, 0).unwrap())
        );
        assert_eq!(report.wind_direction.as_ref().and_then(|d| d.value), Some(190.0));
        assert_eq!(report.wind_speed.as_ref().and_then(|s| s.value), Some(12.0));
        assert_eq!(report.wind_gust.as_ref().and_then(|g| g.value), Some(25.0));
        assert_eq!(report.temperature.as_ref().and_then(|t| t.value), Some(-5.0));
        assert_eq!(report.dew_point.as_ref().and_then(|d| d.value), Some(-7.0));
    }

    #[test]
    fn test_decode_metar_prefix_and_auto() {
        let report = decode("METAR ENBR 121320Z AUTO 27005KT CAVOK 08/03 Q1020").unwrap();
        assert_eq!(report.station, "ENBR");
        assert_eq!(report.wind_speed.and_then(|s| s.value), Some(5.0));
        assert_eq!(report.temperature.and_then(|t| t.value), Some(8.0));
    }

    #[test]
    fn test_decode_variable_wind() {
        let report = decode("ENGM 121350Z VRB03KT CAVOK 12/04 Q1013").unwrap();
        let direction = report.wind_direction.unwrap();
        assert!(direction.is_variable());
        assert_eq!(direction.value, None);
        assert_eq!(report.wind_speed.and_then(|s| s.value), Some(3.0));
        assert!(report.wind_gust.is_none());
    }

    #[test]
    fn test_decode_mps_converted_to_knots() {
        let report = decode("UUEE 121330Z 24005MPS 9999 BKN030 02/M01 Q1008").unwrap();
        let speed = report.wind_speed.and_then(|s| s.value).unwrap();
        assert!((speed - 9.71922).abs() < 1e-6);
    }

    #[test]
    fn test_decode_missing_dew_point() {
        let report = decode("ENGM 121350Z 00000KT CAVOK 15/ Q1013").unwrap();
        assert_eq!(report.temperature.and_then(|t| t.value), Some(15.0));
        assert!(report.dew_point.is_none());
        assert_eq!(report.wind_speed.and_then(|s| s.value), Some(0.0));
    }

    #[test]
    fn test_decode_masked_wind() {
        let report = decode("ENGM 121350Z /////KT 9999 OVC010 03/02 Q1001").unwrap();
        assert!(report.wind_direction.is_none());
        assert!(report.wind_speed.is_none());
        assert_eq!(report.temperature.and_then(|t| t.value), Some(3.0));
    }

    #[test]
    fn test_decode_ignores_remarks() {
        let report = decode("KJFK 121351Z 31010KT 10SM CLR 07/M03 A3012 RMK AO2 T00721033").unwrap();
        assert_eq!(report.temperature.and_then(|t| t.value), Some(7.0));
        assert_eq!(report.dew_point.and_then(|d| d.value), Some(-3.0));
    }

    #[test]
    fn test_time_from_previous_month() {
        let report = decode("ENGM 302350Z 19012KT 9999 05/01 Q1013").unwrap();
        assert_eq!(
            report.observation_time,
            Some(Utc.with_ymd_and_hms(2024, 1, 30, 23, 50, 0).unwrap())
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert_eq!(decode("   "), Err(DecodeError::Empty));
        assert!(matches!(decode("NOT A METAR"), Err(DecodeError::MissingStation(_))));
        assert!(matches!(decode("ENGM 99X"), Err(DecodeError::InvalidTime(_))));
        assert!(matches!(decode("ENGM 122599Z 19012KT"), Err(DecodeError::InvalidTime(_))));
    }
}
