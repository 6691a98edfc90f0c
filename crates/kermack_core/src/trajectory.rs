//! Integration output: the time series of compartment states.

use crate::model::{Compartment, State};
use serde::{Deserialize, Serialize};

/// What happened numerically during a run.
///
/// None of this makes the run fail; a caller that cares about precision
/// checks [`Diagnostics::numeric_instability`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Largest relative gap between the compartment total (with clamping
    /// undone) and the total the vital dynamics predict.
    pub max_relative_drift: f64,
    /// Total amount added back by resetting negative compartments to zero.
    pub clamped_mass: f64,
    /// Number of compartment values that were clamped.
    pub clamp_events: usize,
    /// First step after which the infected compartment was cut off.
    pub extinction_step: Option<usize>,
    /// Drift exceeded the configured tolerance or became non-finite.
    pub numeric_instability: bool,
}

/// Plot-library-agnostic view: one time column plus one column per compartment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrajectoryColumns {
    pub time: Vec<f64>,
    pub susceptible: Vec<f64>,
    pub infected: Vec<f64>,
    pub recovered: Vec<f64>,
}

/// Peak of the infected compartment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    pub step: usize,
    pub time: f64,
    pub infected: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    times: Vec<f64>,
    states: Vec<State>,
    diagnostics: Diagnostics,
}

impl Trajectory {
    pub(crate) fn new(times: Vec<f64>, states: Vec<State>, diagnostics: Diagnostics) -> Self {
        debug_assert_eq!(times.len(), states.len());
        Self {
            times,
            states,
            diagnostics,
        }
    }

    /// Number of samples, including the initial condition.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn get(&self, index: usize) -> Option<(f64, State)> {
        Some((*self.times.get(index)?, *self.states.get(index)?))
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, State)> + '_ {
        self.times.iter().copied().zip(self.states.iter().copied())
    }

    pub fn initial_state(&self) -> Option<State> {
        self.states.first().copied()
    }

    pub fn final_state(&self) -> Option<State> {
        self.states.last().copied()
    }

    pub fn series(&self, compartment: Compartment) -> Vec<f64> {
        self.states.iter().map(|s| s.get(compartment)).collect()
    }

    pub fn susceptible(&self) -> Vec<f64> {
        self.series(Compartment::Susceptible)
    }

    pub fn infected(&self) -> Vec<f64> {
        self.series(Compartment::Infected)
    }

    pub fn recovered(&self) -> Vec<f64> {
        self.series(Compartment::Recovered)
    }

    /// Compartment sum at every sample.
    pub fn totals(&self) -> Vec<f64> {
        self.states.iter().map(State::total).collect()
    }

    /// Earliest sample with the largest infected count.
    pub fn peak_infection(&self) -> Option<Peak> {
        let mut peak: Option<Peak> = None;
        for (step, (time, state)) in self.iter().enumerate() {
            if peak.map_or(true, |p| state.infected > p.infected) {
                peak = Some(Peak {
                    step,
                    time,
                    infected: state.infected,
                });
            }
        }
        peak
    }

    pub fn columns(&self) -> TrajectoryColumns {
        TrajectoryColumns {
            time: self.times.clone(),
            susceptible: self.susceptible(),
            infected: self.infected(),
            recovered: self.recovered(),
        }
    }
}
