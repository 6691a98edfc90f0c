//! Kermack–McKendrick compartment equations.
//!
//! The right-hand side is a handful of algebraic rates. Nothing here
//! validates its input; the integrator checks parameters and initial state
//! before the first evaluation.

use crate::error::{ensure_non_negative, ensure_positive, EpidemicError, Result};
use crate::traits::{constant, DynamicalSystem, Scalar};
use serde::{Deserialize, Serialize};

/// Number of compartments in the model (S, I, R).
pub const COMPARTMENTS: usize = 3;

/// How new infections scale with the compartment sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Incidence {
    /// `β·S·I`: β is the transmission coefficient per individual.
    #[default]
    MassAction,
    /// `β·S·I/N` with N the current compartment total.
    FrequencyDependent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compartment {
    Susceptible,
    Infected,
    Recovered,
}

impl Compartment {
    /// Position of the compartment in a state vector.
    pub fn index(self) -> usize {
        match self {
            Compartment::Susceptible => 0,
            Compartment::Infected => 1,
            Compartment::Recovered => 2,
        }
    }
}

/// Fixed kinetic parameters of one run.
///
/// Rates are per unit time (days, by convention). Birth, death and immunity
/// loss default to zero, which gives the closed SIR model whose compartment
/// sum is conserved.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    pub population: f64,
    pub transmission_rate: f64,
    pub recovery_rate: f64,
    pub birth_rate: f64,
    pub death_rate: f64,
    pub immunity_loss_rate: f64,
    pub incidence: Incidence,
}

impl Parameters {
    /// Closed S→I model with mass-action incidence and no recovery.
    pub fn new(population: f64, transmission_rate: f64) -> Self {
        Self {
            population,
            transmission_rate,
            recovery_rate: 0.0,
            birth_rate: 0.0,
            death_rate: 0.0,
            immunity_loss_rate: 0.0,
            incidence: Incidence::MassAction,
        }
    }

    pub fn with_recovery_rate(mut self, recovery_rate: f64) -> Self {
        self.recovery_rate = recovery_rate;
        self
    }

    /// Adds births (proportional to the whole population) and deaths
    /// (proportional to each compartment).
    pub fn with_vital_dynamics(mut self, birth_rate: f64, death_rate: f64) -> Self {
        self.birth_rate = birth_rate;
        self.death_rate = death_rate;
        self
    }

    pub fn with_immunity_loss_rate(mut self, immunity_loss_rate: f64) -> Self {
        self.immunity_loss_rate = immunity_loss_rate;
        self
    }

    pub fn with_incidence(mut self, incidence: Incidence) -> Self {
        self.incidence = incidence;
        self
    }

    /// True when births, deaths and waning immunity are all absent.
    pub fn is_closed(&self) -> bool {
        self.birth_rate == 0.0 && self.death_rate == 0.0 && self.immunity_loss_rate == 0.0
    }

    /// Net per-capita growth rate of the total population (`α − μ`).
    pub fn net_growth_rate(&self) -> f64 {
        self.birth_rate - self.death_rate
    }

    /// Total population expected at time `t` under the vital dynamics.
    pub fn expected_total(&self, t: f64) -> f64 {
        let growth = self.net_growth_rate();
        if growth == 0.0 {
            self.population
        } else {
            self.population * (growth * t).exp()
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure_positive("population", self.population)?;
        ensure_non_negative("transmission_rate", self.transmission_rate)?;
        ensure_non_negative("recovery_rate", self.recovery_rate)?;
        ensure_non_negative("birth_rate", self.birth_rate)?;
        ensure_non_negative("death_rate", self.death_rate)?;
        ensure_non_negative("immunity_loss_rate", self.immunity_loss_rate)?;
        Ok(())
    }
}

/// Compartment sizes at one time point.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct State {
    pub susceptible: f64,
    pub infected: f64,
    pub recovered: f64,
}

impl State {
    pub fn new(susceptible: f64, infected: f64, recovered: f64) -> Self {
        Self {
            susceptible,
            infected,
            recovered,
        }
    }

    /// Everyone not initially infected starts susceptible.
    pub fn seeded(population: f64, initial_infected: f64) -> Self {
        Self::new(population - initial_infected, initial_infected, 0.0)
    }

    pub fn total(&self) -> f64 {
        self.susceptible + self.infected + self.recovered
    }

    pub fn get(&self, compartment: Compartment) -> f64 {
        self.to_array()[compartment.index()]
    }

    pub fn to_array(self) -> [f64; COMPARTMENTS] {
        [self.susceptible, self.infected, self.recovered]
    }

    pub fn from_array(values: [f64; COMPARTMENTS]) -> Self {
        Self::new(values[0], values[1], values[2])
    }
}

impl<'a> TryFrom<&'a [f64]> for State {
    type Error = EpidemicError;

    fn try_from(values: &'a [f64]) -> Result<Self> {
        match values {
            [s, i, r] => Ok(Self::new(*s, *i, *r)),
            _ => Err(EpidemicError::DimensionMismatch {
                expected: COMPARTMENTS,
                actual: values.len(),
            }),
        }
    }
}

/// Instantaneous rate of change of each compartment, ordered S, I, R.
pub fn derivative(state: &State, parameters: &Parameters) -> [f64; COMPARTMENTS] {
    let mut out = [0.0; COMPARTMENTS];
    rates(parameters, &state.to_array(), &mut out);
    out
}

fn rates<T: Scalar>(p: &Parameters, y: &[T], out: &mut [T]) {
    let (s, i, r) = (y[0], y[1], y[2]);
    let beta = constant::<T>(p.transmission_rate);
    let gamma = constant::<T>(p.recovery_rate);
    let alpha = constant::<T>(p.birth_rate);
    let mu = constant::<T>(p.death_rate);
    let f = constant::<T>(p.immunity_loss_rate);

    let total = s + i + r;
    let incidence = match p.incidence {
        Incidence::MassAction => beta * s * i,
        Incidence::FrequencyDependent if total > T::zero() => beta * s * i / total,
        Incidence::FrequencyDependent => T::zero(),
    };

    out[0] = -incidence + alpha * total - mu * s + f * r;
    out[1] = incidence - gamma * i - mu * i;
    out[2] = gamma * i - mu * r - f * r;
}

/// Adapter that lets the steppers drive the compartment equations.
///
/// Intermediate stages of the multi-stage schemes can dip below zero. Rates
/// are evaluated at the non-negative part of the state, so incidence never
/// changes sign inside a step.
#[derive(Debug, Clone, Copy)]
pub struct SirModel {
    pub parameters: Parameters,
}

impl SirModel {
    pub fn new(parameters: Parameters) -> Self {
        Self { parameters }
    }
}

impl<T: Scalar> DynamicalSystem<T> for SirModel {
    fn dimension(&self) -> usize {
        COMPARTMENTS
    }

    fn apply(&self, _t: T, x: &[T], out: &mut [T]) {
        let clamped = [
            x[0].max(T::zero()),
            x[1].max(T::zero()),
            x[2].max(T::zero()),
        ];
        rates(&self.parameters, &clamped, out);
    }
}
