//! Closed-form outbreak quantities and linear stability of the equilibria.

use crate::error::{ensure_non_negative, ensure_positive, EpidemicError, Result};
use crate::model::{Incidence, Parameters, State, COMPARTMENTS};
use nalgebra::{Complex, DMatrix};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NewtonSettings {
    pub max_steps: usize,
    /// Convergence threshold on the Newton update, relative to the initial
    /// susceptible count.
    pub tolerance: f64,
}

impl Default for NewtonSettings {
    fn default() -> Self {
        Self {
            max_steps: 50,
            tolerance: 1e-12,
        }
    }
}

/// Expected secondary infections caused by one case in a fully susceptible
/// population.
pub fn basic_reproduction_number(parameters: &Parameters) -> f64 {
    let contact = match parameters.incidence {
        Incidence::MassAction => parameters.transmission_rate * parameters.population,
        Incidence::FrequencyDependent => parameters.transmission_rate,
    };
    let removal = parameters.recovery_rate + parameters.death_rate;
    if contact == 0.0 {
        0.0
    } else if removal == 0.0 {
        f64::INFINITY
    } else {
        contact / removal
    }
}

/// Immune fraction above which an outbreak cannot grow.
pub fn herd_immunity_threshold(parameters: &Parameters) -> f64 {
    let r0 = basic_reproduction_number(parameters);
    if r0 > 1.0 {
        1.0 - 1.0 / r0
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FinalSize {
    /// Susceptible individuals left once the outbreak is over.
    pub susceptible: f64,
    /// Everyone else; the infected compartment is empty at the end.
    pub recovered: f64,
    /// Fraction of the population infected during the outbreak.
    pub attack_rate: f64,
    pub iterations: usize,
}

/// Solves the Kermack–McKendrick final-size relation
/// `S∞ = S0 · exp(-κ (S0 + I0 - S∞))` for a closed population.
///
/// Newton iteration starts from `S∞ = 0`; the residual is concave there, so
/// the iterates approach the smallest root from below.
pub fn final_size(
    parameters: &Parameters,
    initial: &State,
    settings: NewtonSettings,
) -> Result<FinalSize> {
    parameters.validate()?;
    ensure_closed(parameters)?;
    ensure_non_negative("initial_susceptible", initial.susceptible)?;
    ensure_non_negative("initial_infected", initial.infected)?;
    ensure_non_negative("initial_recovered", initial.recovered)?;
    let total = initial.total();
    ensure_positive("initial_total", total)?;
    if settings.max_steps == 0 {
        return Err(EpidemicError::invalid(
            "max_steps",
            0.0,
            "must be greater than zero",
        ));
    }
    ensure_positive("tolerance", settings.tolerance)?;

    let s0 = initial.susceptible;
    let (susceptible, iterations) =
        if parameters.transmission_rate == 0.0 || initial.infected == 0.0 {
            (s0, 0)
        } else if parameters.recovery_rate == 0.0 {
            (0.0, 0)
        } else {
            let kappa = match parameters.incidence {
                Incidence::MassAction => parameters.transmission_rate / parameters.recovery_rate,
                Incidence::FrequencyDependent => {
                    parameters.transmission_rate / (parameters.recovery_rate * total)
                }
            };
            solve_final_size(s0, s0 + initial.infected, kappa, settings)?
        };

    Ok(FinalSize {
        susceptible,
        recovered: total - susceptible,
        attack_rate: (s0 - susceptible) / total,
        iterations,
    })
}

fn ensure_closed(parameters: &Parameters) -> Result<()> {
    const REASON: &str = "final-size relation requires a closed population";
    if parameters.is_closed() {
        return Ok(());
    }
    for (name, value) in [
        ("birth_rate", parameters.birth_rate),
        ("death_rate", parameters.death_rate),
        ("immunity_loss_rate", parameters.immunity_loss_rate),
    ] {
        if value != 0.0 {
            return Err(EpidemicError::invalid(name, value, REASON));
        }
    }
    Ok(())
}

fn solve_final_size(
    s0: f64,
    m: f64,
    kappa: f64,
    settings: NewtonSettings,
) -> Result<(f64, usize)> {
    let step_tolerance = settings.tolerance * s0.max(1.0);
    let mut x = 0.0;
    let mut residual = f64::INFINITY;

    for iteration in 1..=settings.max_steps {
        let escaped = s0 * (-kappa * (m - x)).exp();
        residual = x - escaped;
        let slope = 1.0 - kappa * escaped;
        if slope <= 0.0 || !slope.is_finite() {
            break;
        }

        let delta = residual / slope;
        x -= delta;
        if delta.abs() <= step_tolerance {
            return Ok((x.clamp(0.0, s0), iteration));
        }
    }

    Err(EpidemicError::ConvergenceFailure {
        iterations: settings.max_steps,
        residual: residual.abs(),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplexNumber {
    pub re: f64,
    pub im: f64,
}

impl From<Complex<f64>> for ComplexNumber {
    fn from(value: Complex<f64>) -> Self {
        Self {
            re: value.re,
            im: value.im,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilityReport {
    /// Row-major 3x3 Jacobian.
    pub jacobian: Vec<f64>,
    pub eigenvalues: Vec<ComplexNumber>,
    /// Largest real part among the eigenvalues.
    pub spectral_abscissa: f64,
}

/// Whole population susceptible, nobody infected.
pub fn disease_free_state(parameters: &Parameters) -> State {
    State::new(parameters.population, 0.0, 0.0)
}

/// Partial derivatives of the compartment rates, row-major (row = rate,
/// column = compartment).
pub fn jacobian(parameters: &Parameters, state: &State) -> Vec<f64> {
    let State {
        susceptible: s,
        infected: i,
        recovered: r,
    } = *state;
    let beta = parameters.transmission_rate;
    let gamma = parameters.recovery_rate;
    let alpha = parameters.birth_rate;
    let mu = parameters.death_rate;
    let f = parameters.immunity_loss_rate;

    // Partials of the incidence term with respect to S, I, R.
    let (inc_s, inc_i, inc_r) = match parameters.incidence {
        Incidence::MassAction => (beta * i, beta * s, 0.0),
        Incidence::FrequencyDependent => {
            let n = s + i + r;
            if n > 0.0 {
                let cross = beta * s * i / (n * n);
                (beta * i / n - cross, beta * s / n - cross, -cross)
            } else {
                (0.0, 0.0, 0.0)
            }
        }
    };

    vec![
        -inc_s + alpha - mu,
        -inc_i + alpha,
        -inc_r + alpha + f,
        inc_s,
        inc_i - gamma - mu,
        inc_r,
        0.0,
        gamma,
        -mu - f,
    ]
}

/// Linearizes the model at `state` and reports the eigenvalues.
///
/// At [`disease_free_state`] the spectral abscissa is the initial
/// exponential growth rate of the outbreak whenever it is positive.
pub fn linear_stability(parameters: &Parameters, state: &State) -> StabilityReport {
    let jacobian = jacobian(parameters, state);
    let matrix = DMatrix::from_row_slice(COMPARTMENTS, COMPARTMENTS, &jacobian);
    let eigenvalues: Vec<Complex<f64>> = matrix.complex_eigenvalues().iter().copied().collect();
    let spectral_abscissa = eigenvalues
        .iter()
        .map(|lambda| lambda.re)
        .fold(f64::NEG_INFINITY, f64::max);

    StabilityReport {
        jacobian,
        eigenvalues: eigenvalues.into_iter().map(ComplexNumber::from).collect(),
        spectral_abscissa,
    }
}
