//! Outbreak summary helpers.

use crate::simulation::{parse_incidence, WasmSimulation};
use kermack_core::analysis::{
    basic_reproduction_number as core_r0, disease_free_state, final_size,
    herd_immunity_threshold as core_herd_immunity, linear_stability, NewtonSettings,
};
use kermack_core::model::{Parameters, State};
use serde::Serialize;
use serde_wasm_bindgen::to_value;
use wasm_bindgen::prelude::*;

fn closed_parameters(
    population: f64,
    transmission_rate: f64,
    recovery_rate: f64,
    incidence: &str,
) -> Result<Parameters, JsValue> {
    Ok(Parameters::new(population, transmission_rate)
        .with_recovery_rate(recovery_rate)
        .with_incidence(parse_incidence(incidence)?))
}

#[wasm_bindgen]
pub fn basic_reproduction_number(
    population: f64,
    transmission_rate: f64,
    recovery_rate: f64,
    incidence: &str,
) -> Result<f64, JsValue> {
    let parameters = closed_parameters(population, transmission_rate, recovery_rate, incidence)?;
    Ok(core_r0(&parameters))
}

#[wasm_bindgen]
pub fn herd_immunity_threshold(
    population: f64,
    transmission_rate: f64,
    recovery_rate: f64,
    incidence: &str,
) -> Result<f64, JsValue> {
    let parameters = closed_parameters(population, transmission_rate, recovery_rate, incidence)?;
    Ok(core_herd_immunity(&parameters))
}

/// Summary payload combining the closed-form quantities for one outbreak.
#[derive(Serialize)]
struct OutbreakSummary {
    r0: f64,
    herd_immunity_threshold: f64,
    initial_growth_rate: f64,
    final_susceptible: f64,
    attack_rate: f64,
}

#[wasm_bindgen]
pub fn outbreak_summary(
    initial_state: Vec<f64>,
    transmission_rate: f64,
    recovery_rate: f64,
    incidence: &str,
) -> Result<JsValue, JsValue> {
    let initial = State::try_from(initial_state.as_slice())
        .map_err(|e| JsValue::from_str(&e.to_string()))?;
    let parameters =
        closed_parameters(initial.total(), transmission_rate, recovery_rate, incidence)?;
    let size = final_size(&parameters, &initial, NewtonSettings::default())
        .map_err(|e| JsValue::from_str(&format!("Final size solve failed: {}", e)))?;
    let stability = linear_stability(&parameters, &disease_free_state(&parameters));

    let summary = OutbreakSummary {
        r0: core_r0(&parameters),
        herd_immunity_threshold: core_herd_immunity(&parameters),
        initial_growth_rate: stability.spectral_abscissa,
        final_susceptible: size.susceptible,
        attack_rate: size.attack_rate,
    };
    to_value(&summary).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

#[wasm_bindgen]
impl WasmSimulation {
    /// Step, time and size of the infection peak.
    pub fn peak_infection(&self) -> Result<JsValue, JsValue> {
        let peak = self
            .trajectory
            .peak_infection()
            .ok_or_else(|| JsValue::from_str("Empty trajectory."))?;
        to_value(&peak).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    pub fn peak_step(&self) -> Option<u32> {
        self.trajectory.peak_infection().map(|peak| peak.step as u32)
    }
}
