use crate::location::sim::SimulatedPlatform;
use crate::location::LocationAcquisitionFlow;
use std::sync::Mutex;

pub struct AppState {
    pub flow: Mutex<LocationAcquisitionFlow<SimulatedPlatform>>,
}
