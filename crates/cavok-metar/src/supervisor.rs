//! Registry of running station loops, keyed by ICAO code.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::coordinator::{ReportSource, StationCoordinator, StationHandle};
use crate::sensors::Sensor;
use crate::types::{normalize_icao, MetarError, StationRef, StationState};

pub struct Supervisor {
    source: Arc<dyn ReportSource>,
    stations: RwLock<HashMap<String, StationHandle>>,
    shutdown: CancellationToken,
}

impl Supervisor {
    pub fn new(source: Arc<dyn ReportSource>) -> Self {
        Self {
            source,
            stations: RwLock::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Start monitoring an airport.
    ///
    /// The first fetch has to succeed; otherwise nothing is registered and
    /// the error is returned. Returns the normalized ICAO code.
    #[instrument(skip(self), level = "info")]
    pub async fn add_station(&self, icao: &str) -> Result<String, MetarError> {
        let icao = normalize_icao(icao).ok_or_else(|| MetarError::InvalidIcao(icao.to_string()))?;
        if self.stations.read().contains_key(&icao) {
            return Err(MetarError::DuplicateStation(icao));
        }

        let mut coordinator = StationCoordinator::new(self.source.clone(), StationRef::new(&icao));
        coordinator.first_refresh().await?;

        // Another caller may have registered the same code while we were fetching.
        let mut stations = self.stations.write();
        if self.shutdown.is_cancelled() {
            return Err(MetarError::ShuttingDown);
        }
        if stations.contains_key(&icao) {
            return Err(MetarError::DuplicateStation(icao));
        }
        let handle = coordinator.spawn(self.shutdown.child_token());
        stations.insert(icao.clone(), handle);
        tracing::info!("Monitoring {}", icao);

        Ok(icao)
    }

    /// Stop monitoring an airport and wait for its loop to end
    pub async fn remove_station(&self, icao: &str) -> Result<(), MetarError> {
        let key = normalize_icao(icao).ok_or_else(|| MetarError::InvalidIcao(icao.to_string()))?;
        let handle = self
            .stations
            .write()
            .remove(&key)
            .ok_or(MetarError::UnknownStation(key))?;
        handle.stop().await;
        Ok(())
    }

    /// Monitored ICAO codes, sorted
    pub fn stations(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.stations.read().keys().cloned().collect();
        codes.sort();
        codes
    }

    pub fn state(&self, icao: &str) -> Option<StationState> {
        let key = normalize_icao(icao)?;
        self.stations.read().get(&key).map(|h| h.state())
    }

    pub fn sensors(&self, icao: &str) -> Option<Vec<Sensor>> {
        let key = normalize_icao(icao)?;
        self.stations.read().get(&key).map(|h| h.sensors())
    }

    pub fn subscribe(&self, icao: &str) -> Option<tokio::sync::watch::Receiver<StationState>> {
        let key = normalize_icao(icao)?;
        self.stations.read().get(&key).map(|h| h.subscribe())
    }

    /// Cancel every loop and wait for all of them
    pub async fn shutdown(&self) {
        let handles: Vec<StationHandle> = {
            let mut stations = self.stations.write();
            self.shutdown.cancel();
            stations.drain().map(|(_, h)| h).collect()
        };
        tracing::info!("Stopping {} station(s)", handles.len());
        for handle in handles {
            handle.stop().await;
        }
    }
}
