//! METAR polling for CAVOK
//!
//! Fetches aviation weather reports from the met.no tafmetar API, schedules
//! re-polls from the `Expires` header and projects the decoded report into
//! sensor values.

pub mod coordinator;
pub mod decode;
pub mod provider;
pub mod schedule;
pub mod sensors;
pub mod supervisor;
pub mod types;

pub use coordinator::{ReportSource, StationCoordinator, StationHandle};
pub use decode::{MetarDecoder, ReportDecoder};
pub use provider::{MetarProvider, PollOutcome, ProviderOptions};
pub use sensors::{real_feel, Sensor, SensorKind, SensorReading, SensorValue};
pub use supervisor::Supervisor;
pub use types::*;
