//! Device position acquisition with accuracy-aware retry and a cached fallback.

mod engine;
mod error;
mod simulated;
mod source;
mod store;

pub use engine::{Acquisition, LocationAcquisitionEngine, SampleOrigin};
pub use error::LocationError;
pub use simulated::{SimulatedPositionSource, SimulationSettings};
pub use source::{PositionError, PositionRequest, PositionSource};
pub use store::{
    JsonFileLocationStore, LocationStore, MemoryLocationStore, StoreError, LOCATION_FILE_VERSION,
};
