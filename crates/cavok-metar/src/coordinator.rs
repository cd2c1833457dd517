//! Per-station poll loop.
//!
//! A coordinator owns the poll interval of one station and publishes a
//! [`StationState`] through a watch channel. Polls run one after another on
//! a single task, so a tick never starts while a poll is still in flight.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::provider::{MetarProvider, PollOutcome};
use crate::schedule::DEFAULT_INTERVAL;
use crate::sensors::{station_sensors, Sensor};
use crate::types::{MetarError, StationRef, StationState};

/// Anything that can produce a [`PollOutcome`] for an airport
#[async_trait]
pub trait ReportSource: Send + Sync {
    async fn poll(&self, icao: &str) -> PollOutcome;
}

#[async_trait]
impl ReportSource for MetarProvider {
    async fn poll(&self, icao: &str) -> PollOutcome {
        MetarProvider::poll(self, icao).await
    }
}

pub struct StationCoordinator {
    station: Arc<StationRef>,
    source: Arc<dyn ReportSource>,
    state_tx: watch::Sender<StationState>,
    interval: Duration,
}

impl StationCoordinator {
    pub fn new(source: Arc<dyn ReportSource>, station: StationRef) -> Self {
        let (state_tx, _) = watch::channel(StationState {
            snapshot: None,
            last_update_success: false,
            last_error: None,
            next_interval: DEFAULT_INTERVAL,
        });

        Self {
            station: Arc::new(station),
            source,
            state_tx,
            interval: DEFAULT_INTERVAL,
        }
    }

    pub fn station(&self) -> Arc<StationRef> {
        self.station.clone()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn subscribe(&self) -> watch::Receiver<StationState> {
        self.state_tx.subscribe()
    }

    /// Poll once and publish the result.
    pub async fn refresh(&mut self) -> Result<(), MetarError> {
        let outcome = self.source.poll(&self.station.icao).await;
        self.apply(outcome)
    }

    /// Initial poll; a station that cannot be fetched once is not started.
    pub async fn first_refresh(&mut self) -> Result<(), MetarError> {
        tracing::debug!("Starting CAVOK for airport: {}", self.station.icao);
        self.refresh().await
    }

    fn apply(&mut self, outcome: PollOutcome) -> Result<(), MetarError> {
        if let Some(interval) = outcome.next_interval {
            self.interval = interval;
        }
        let interval = self.interval;

        match outcome.result {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                self.state_tx.send_modify(|state| {
                    state.snapshot = Some(snapshot);
                    state.last_update_success = true;
                    state.last_error = None;
                    state.next_interval = interval;
                });
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                self.state_tx.send_modify(|state| {
                    state.last_update_success = false;
                    state.last_error = Some(message);
                    state.next_interval = interval;
                });
                Err(e)
            }
        }
    }

    /// Start the poll loop on the current runtime.
    pub fn spawn(self, cancel: CancellationToken) -> StationHandle {
        let station = self.station.clone();
        let state_rx = self.subscribe();
        let join = tokio::spawn(self.run(cancel.clone()));

        StationHandle {
            station,
            state_rx,
            cancel,
            join,
        }
    }

    async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(
            "Polling {} every {:?} until told otherwise",
            self.station.icao,
            self.interval
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }

            // Dropping the poll future aborts the request; nothing is published.
            let outcome = tokio::select! {
                _ = cancel.cancelled() => break,
                outcome = self.source.poll(&self.station.icao) => outcome,
            };

            match self.apply(outcome) {
                Ok(()) => tracing::debug!(
                    "Updated {}, next poll in {:?}",
                    self.station.icao,
                    self.interval
                ),
                Err(e) => tracing::warn!(
                    "Update of {} failed: {} (next poll in {:?})",
                    self.station.icao,
                    e,
                    self.interval
                ),
            }
        }

        tracing::info!("Stopped polling {}", self.station.icao);
    }
}

/// A running station loop
#[derive(Debug)]
pub struct StationHandle {
    station: Arc<StationRef>,
    state_rx: watch::Receiver<StationState>,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl StationHandle {
    pub fn station(&self) -> &StationRef {
        &self.station
    }

    /// Copy of the currently published state
    pub fn state(&self) -> StationState {
        self.state_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StationState> {
        self.state_rx.clone()
    }

    pub fn sensors(&self) -> Vec<Sensor> {
        station_sensors(self.station.clone(), &self.state_rx)
    }

    /// Cancel the loop and wait for it to finish
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.join.await {
            tracing::error!("Poll loop for {} ended abnormally: {}", self.station.icao, e);
        }
    }
}
