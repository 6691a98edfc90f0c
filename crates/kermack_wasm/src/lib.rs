//! WASM bindings for `kermack_core`.

mod analysis;
mod simulation;

pub use analysis::{basic_reproduction_number, herd_immunity_threshold, outbreak_summary};
pub use simulation::WasmSimulation;
