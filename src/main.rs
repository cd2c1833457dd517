use anyhow::Result;
use cavok_core::{App, Config};
use cavok_metar::Sensor;
use tokio::task::JoinSet;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize core
    cavok_core::init()?;

    let (config, _warnings) = Config::load_validated(None)?;
    let app = App::new(config)?;

    let summary = match app.start().await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!("{}", e.user_message());
            return Err(e.into());
        }
    };

    tracing::info!(
        "CAVOK started: {} station(s) polling, {} failed",
        summary.started.len(),
        summary.failed.len()
    );

    let supervisor = app.supervisor();
    let mut reporters = JoinSet::new();
    for icao in supervisor.stations() {
        let (Some(mut rx), Some(sensors)) = (supervisor.subscribe(&icao), supervisor.sensors(&icao))
        else {
            continue;
        };
        reporters.spawn(async move {
            report(&sensors);
            while rx.changed().await.is_ok() {
                report(&sensors);
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received Ctrl-C");

    // Graceful shutdown
    app.shutdown().await;
    reporters.abort_all();

    Ok(())
}

fn report(sensors: &[Sensor]) {
    for sensor in sensors {
        let reading = sensor.reading();
        let value = reading
            .value
            .as_ref()
            .map_or_else(|| "unknown".to_string(), |v| v.to_string());

        match serde_json::to_string(&reading) {
            Ok(json) => match sensor.attributes() {
                Some(attributes) => tracing::info!(
                    available = sensor.available(),
                    %attributes,
                    "{} = {} {}",
                    reading.name,
                    value,
                    json
                ),
                None => tracing::info!(
                    available = sensor.available(),
                    "{} = {} {}",
                    reading.name,
                    value,
                    json
                ),
            },
            Err(e) => tracing::warn!("Could not serialize {}: {}", reading.unique_id, e),
        }
    }
}
