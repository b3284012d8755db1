//! Model implementations served by the runtime.

mod simulated;

pub use simulated::{
    SimulatedLoader, SimulatedModelConfig, SimulatedVoice, DEFAULT_SAMPLE_RATE,
};
