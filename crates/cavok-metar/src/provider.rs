use chrono::Utc;
use reqwest::header::EXPIRES;
use reqwest::{Client, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

use crate::decode::{MetarDecoder, ReportDecoder};
use crate::schedule::next_poll_interval;
use crate::types::{MetarError, WeatherSnapshot};

pub const METNO_TAFMETAR_URL: &str = "https://api.met.no/weatherapi/tafmetar/1.0/";
pub const REQUEST_TIMEOUT_SECS: u64 = 10;
pub const USER_AGENT: &str = concat!("cavok/", env!("CARGO_PKG_VERSION"));

/// Connection settings for [`MetarProvider`]
#[derive(Debug, Clone)]
pub struct ProviderOptions {
    pub endpoint: String,
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            endpoint: METNO_TAFMETAR_URL.to_string(),
            user_agent: USER_AGENT.to_string(),
            timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Result of one poll.
///
/// `next_interval` is `Some` whenever response headers were inspected, even
/// if reading the body failed afterwards. `None` means keep the current one.
#[derive(Debug)]
pub struct PollOutcome {
    pub result: Result<WeatherSnapshot, MetarError>,
    pub next_interval: Option<Duration>,
}

impl PollOutcome {
    fn failed(err: MetarError) -> Self {
        Self {
            result: Err(err),
            next_interval: None,
        }
    }
}

/// Fetches METAR reports from the met.no tafmetar endpoint.
#[derive(Clone)]
pub struct MetarProvider {
    client: Arc<Client>,
    endpoint: String,
    decoder: Arc<dyn ReportDecoder>,
}

impl std::fmt::Debug for MetarProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetarProvider")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl MetarProvider {
    pub fn new(options: ProviderOptions) -> Result<Self, MetarError> {
        let client = Client::builder()
            .timeout(options.timeout)
            .user_agent(options.user_agent)
            .build()
            .map_err(|e| MetarError::Client(e.to_string()))?;

        Ok(Self {
            client: Arc::new(client),
            endpoint: options.endpoint,
            decoder: Arc::new(MetarDecoder),
        })
    }

    /// Replace the built-in report decoder
    pub fn with_decoder(mut self, decoder: Arc<dyn ReportDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fetch the latest report for `icao`.
    #[instrument(skip(self), level = "debug")]
    pub async fn poll(&self, icao: &str) -> PollOutcome {
        tracing::debug!("Fetching new data from met.no");
        let request = self.client.get(&self.endpoint).query(&[
            ("icao", icao),
            ("content", "metar"),
            ("content_type", "text/plain"),
        ]);
        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => return PollOutcome::failed(MetarError::from_reqwest(e)),
        };

        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!("Request to {} returned 404", response.url());
            return PollOutcome::failed(MetarError::NotFound);
        }

        let response = match response.error_for_status() {
            Ok(r) => r,
            Err(e) => return PollOutcome::failed(MetarError::from_reqwest(e)),
        };

        // Headers are inspected before the body so the interval is updated
        // even when the body turns out to be unusable.
        let expires_hint = response
            .headers()
            .get(EXPIRES)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());
        let next_interval = next_poll_interval(expires_hint.as_deref(), Utc::now());

        PollOutcome {
            result: self.read_snapshot(response, expires_hint).await,
            next_interval: Some(next_interval),
        }
    }

    async fn read_snapshot(
        &self,
        response: Response,
        expires_hint: Option<String>,
    ) -> Result<WeatherSnapshot, MetarError> {
        let text = response.text().await.map_err(MetarError::from_reqwest)?;
        let stripped = text.trim();

        // The endpoint may put a header line first; the report is the last line.
        let raw_report = match stripped.lines().last() {
            Some(line) if !stripped.is_empty() => line.to_string(),
            _ => return Err(MetarError::EmptyResponse),
        };
        tracing::debug!("Fetched raw data: {}", raw_report);

        let fetch_time = Utc::now();
        let parsed = match self.decoder.decode(&raw_report, fetch_time) {
            Ok(report) => {
                tracing::debug!("Parsing of METAR OK: {:?}", report);
                Some(report)
            }
            Err(e) => {
                tracing::error!("Error parsing METAR: {}", e);
                None
            }
        };

        Ok(WeatherSnapshot {
            raw_report,
            parsed,
            fetch_time,
            expires_hint,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DecodeError, ParsedReport};
    use chrono::DateTime;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const API_PATH: &str = "/weatherapi/tafmetar/1.0/";

    fn provider_for(server: &MockServer) -> MetarProvider {
        MetarProvider::new(ProviderOptions {
            endpoint: format!("{}{}", server.uri(), API_PATH),
            ..ProviderOptions::default()
        })
        .unwrap()
    }

    struct RejectAll;

    impl ReportDecoder for RejectAll {
        fn decode(&self, raw: &str, _: DateTime<Utc>) -> Result<ParsedReport, DecodeError> {
            Err(DecodeError::MissingStation(raw.to_string()))
        }
    }

    #[tokio::test]
    async fn test_poll_sends_expected_request() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(API_PATH))
            .and(query_param("icao", "ENGM"))
            .and(query_param("content", "metar"))
            .and(query_param("content_type", "text/plain"))
            .and(header("User-Agent", USER_AGENT))
            .respond_with(ResponseTemplate::new(200).set_body_string("ENGM 121350Z 19012KT 9999 05/01 Q1013"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let outcome = provider_for(&mock_server).poll("ENGM").await;
        let snapshot = outcome.result.unwrap();

        assert_eq!(snapshot.raw_report, "ENGM 121350Z 19012KT 9999 05/01 Q1013");
        assert!(snapshot.parsed.is_some());
        assert!(snapshot.expires_hint.is_none());
        assert_eq!(outcome.next_interval, Some(crate::schedule::DEFAULT_INTERVAL));
    }

    #[tokio::test]
    async fn test_last_line_wins() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(API_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("\nSTATION HEADER\nENGM 121350Z 19012KT 9999 05/01 Q1013\n\n"),
            )
            .mount(&mock_server)
            .await;

        let snapshot = provider_for(&mock_server).poll("ENGM").await.result.unwrap();
        assert_eq!(snapshot.raw_report, "ENGM 121350Z 19012KT 9999 05/01 Q1013");
    }

    #[tokio::test]
    async fn test_decode_failure_keeps_raw_report() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(API_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("ENGM 121350Z 19012KT"))
            .mount(&mock_server)
            .await;

        let provider = provider_for(&mock_server).with_decoder(Arc::new(RejectAll));
        let snapshot = provider.poll("ENGM").await.result.unwrap();

        assert_eq!(snapshot.raw_report, "ENGM 121350Z 19012KT");
        assert!(snapshot.parsed.is_none());
    }

    #[tokio::test]
    async fn test_icao_is_sent_as_single_query_value() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(API_PATH))
            .and(query_param("icao", "EN&content=taf"))
            .and(query_param("content", "metar"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&mock_server)
            .await;

        let outcome = provider_for(&mock_server).poll("EN&content=taf").await;
        assert!(matches!(outcome.result, Err(MetarError::NotFound)));
    }

    #[tokio::test]
    async fn test_non_ascii_expires_kept_as_hint() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(API_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .append_header(
                        "Expires",
                        reqwest::header::HeaderValue::from_bytes(b"soon \xe9t\xe9").unwrap(),
                    )
                    .set_body_string("ENGM 121350Z 19012KT 9999 05/01 Q1013"),
            )
            .mount(&mock_server)
            .await;

        let outcome = provider_for(&mock_server).poll("ENGM").await;
        let hint = outcome.result.unwrap().expires_hint.unwrap();

        assert!(hint.starts_with("soon "));
        assert_eq!(outcome.next_interval, Some(crate::schedule::DEFAULT_INTERVAL));
    }

    #[tokio::test]
    async fn test_not_found() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(API_PATH))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let outcome = provider_for(&mock_server).poll("XXXX").await;

        assert!(matches!(outcome.result, Err(MetarError::NotFound)));
        assert!(outcome.next_interval.is_none());
    }

    #[tokio::test]
    async fn test_server_error_is_fetch_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(API_PATH))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let outcome = provider_for(&mock_server).poll("ENGM").await;

        match outcome.result {
            Err(MetarError::Fetch { kind, .. }) => assert_eq!(kind, "StatusError"),
            other => panic!("expected fetch error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_body_still_updates_interval() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(API_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Expires", "garbage")
                    .set_body_string("  \n\t \n"),
            )
            .mount(&mock_server)
            .await;

        let outcome = provider_for(&mock_server).poll("ENGM").await;

        assert!(matches!(outcome.result, Err(MetarError::EmptyResponse)));
        assert_eq!(outcome.next_interval, Some(crate::schedule::DEFAULT_INTERVAL));
    }
}
