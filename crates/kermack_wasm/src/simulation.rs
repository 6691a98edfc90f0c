//! WASM wrapper around a completed integration run.

use kermack_core::integrator::{integrate_with, simulate, IntegrationSettings};
use kermack_core::model::{Incidence, Parameters, State};
use kermack_core::solvers::Scheme;
use kermack_core::trajectory::Trajectory;
use serde_wasm_bindgen::to_value;
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub struct WasmSimulation {
    pub(crate) trajectory: Trajectory,
}

pub(crate) fn parse_incidence(name: &str) -> Result<Incidence, JsValue> {
    match name {
        "mass_action" => Ok(Incidence::MassAction),
        "frequency" | "frequency_dependent" => Ok(Incidence::FrequencyDependent),
        _ => Err(JsValue::from_str("Unknown incidence")),
    }
}

fn to_js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

#[wasm_bindgen]
impl WasmSimulation {
    /// Seeded outbreak with the default recovery rate and RK4.
    #[wasm_bindgen(constructor)]
    pub fn new(
        population: f64,
        initial_infected: f64,
        transmission_rate: f64,
        step_count: Option<u32>,
        step_size: Option<f64>,
    ) -> Result<WasmSimulation, JsValue> {
        console_error_panic_hook::set_once();

        let trajectory = simulate(
            population,
            initial_infected,
            transmission_rate,
            step_count.map(|n| n as usize),
            step_size,
        )
        .map_err(to_js_error)?;
        Ok(WasmSimulation { trajectory })
    }

    /// Fully specified run: every rate, the incidence form and the scheme.
    #[allow(clippy::too_many_arguments)]
    pub fn configured(
        initial_state: Vec<f64>,
        transmission_rate: f64,
        recovery_rate: f64,
        birth_rate: f64,
        death_rate: f64,
        immunity_loss_rate: f64,
        incidence: &str,
        scheme: &str,
        step_count: u32,
        step_size: f64,
        extinction_threshold: Option<f64>,
    ) -> Result<WasmSimulation, JsValue> {
        console_error_panic_hook::set_once();

        let initial = State::try_from(initial_state.as_slice()).map_err(to_js_error)?;
        let parameters = Parameters::new(initial.total(), transmission_rate)
            .with_recovery_rate(recovery_rate)
            .with_vital_dynamics(birth_rate, death_rate)
            .with_immunity_loss_rate(immunity_loss_rate)
            .with_incidence(parse_incidence(incidence)?);
        let scheme = Scheme::from_name(scheme).ok_or_else(|| JsValue::from_str("Unknown solver"))?;
        let settings = IntegrationSettings {
            step_count: step_count as usize,
            step_size,
            scheme,
            extinction_threshold,
            ..IntegrationSettings::default()
        };

        let trajectory = integrate_with(initial, &parameters, &settings).map_err(to_js_error)?;
        Ok(WasmSimulation { trajectory })
    }

    pub fn len(&self) -> usize {
        self.trajectory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trajectory.is_empty()
    }

    pub fn times(&self) -> Vec<f64> {
        self.trajectory.times().to_vec()
    }

    pub fn susceptible(&self) -> Vec<f64> {
        self.trajectory.susceptible()
    }

    pub fn infected(&self) -> Vec<f64> {
        self.trajectory.infected()
    }

    pub fn recovered(&self) -> Vec<f64> {
        self.trajectory.recovered()
    }

    pub fn clamped_mass(&self) -> f64 {
        self.trajectory.diagnostics().clamped_mass
    }

    pub fn numeric_instability(&self) -> bool {
        self.trajectory.diagnostics().numeric_instability
    }

    /// `{ time, susceptible, infected, recovered }` for plotting.
    pub fn to_columns(&self) -> Result<JsValue, JsValue> {
        to_value(&self.trajectory.columns())
            .map_err(|err| JsValue::from_str(&format!("Serialization error: {err}")))
    }

    pub fn diagnostics(&self) -> Result<JsValue, JsValue> {
        to_value(self.trajectory.diagnostics())
            .map_err(|err| JsValue::from_str(&format!("Serialization error: {err}")))
    }
}
