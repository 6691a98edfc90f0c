//! Fixed-step integration of the compartment equations.

use crate::error::{ensure_non_negative, ensure_positive, EpidemicError, Result};
use crate::model::{Parameters, SirModel, State, COMPARTMENTS};
use crate::solvers::Scheme;
use crate::traits::Steppable;
use crate::trajectory::{Diagnostics, Trajectory};
use serde::{Deserialize, Serialize};

/// One year of daily steps.
pub const DEFAULT_STEP_COUNT: usize = 365;
pub const DEFAULT_STEP_SIZE: f64 = 1.0;
/// Recovery rate used by [`simulate`]: a four-day infectious period.
pub const DEFAULT_RECOVERY_RATE: f64 = 0.25;
pub const DEFAULT_CONSERVATION_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntegrationSettings {
    pub step_count: usize,
    pub step_size: f64,
    pub scheme: Scheme,
    /// Relative tolerance on the compartment total, used to accept the
    /// initial state and to flag drift during the run.
    pub conservation_tolerance: f64,
    /// Infected counts that drop below this after a step are moved to
    /// recovered, ending the outbreak.
    pub extinction_threshold: Option<f64>,
}

impl Default for IntegrationSettings {
    fn default() -> Self {
        Self {
            step_count: DEFAULT_STEP_COUNT,
            step_size: DEFAULT_STEP_SIZE,
            scheme: Scheme::Rk4,
            conservation_tolerance: DEFAULT_CONSERVATION_TOLERANCE,
            extinction_threshold: None,
        }
    }
}

impl IntegrationSettings {
    pub fn validate(&self) -> Result<()> {
        if self.step_count == 0 {
            return Err(EpidemicError::invalid(
                "step_count",
                0.0,
                "at least one step is required",
            ));
        }
        ensure_positive("step_size", self.step_size)?;
        ensure_positive("conservation_tolerance", self.conservation_tolerance)?;
        if let Some(threshold) = self.extinction_threshold {
            ensure_non_negative("extinction_threshold", threshold)?;
        }
        Ok(())
    }

    /// Simulated duration.
    pub fn horizon(&self) -> f64 {
        self.step_count as f64 * self.step_size
    }
}

/// Integrates from `initial_state` with the default scheme (RK4).
pub fn integrate(
    initial_state: State,
    parameters: &Parameters,
    step_count: usize,
    step_size: f64,
) -> Result<Trajectory> {
    let settings = IntegrationSettings {
        step_count,
        step_size,
        ..IntegrationSettings::default()
    };
    integrate_with(initial_state, parameters, &settings)
}

/// Produces a trajectory of `settings.step_count + 1` samples.
///
/// All inputs are checked before the first step; on error nothing is
/// computed. Negative compartments produced by discretization error are
/// reset to zero after each step. This keeps the rates meaningful but adds
/// the clamped amount to the compartment total, which is reported in
/// [`Diagnostics::clamped_mass`].
pub fn integrate_with(
    initial_state: State,
    parameters: &Parameters,
    settings: &IntegrationSettings,
) -> Result<Trajectory> {
    parameters.validate()?;
    settings.validate()?;
    validate_initial_state(&initial_state, parameters, settings.conservation_tolerance)?;

    log::debug!(
        "integrating {:?} for {} steps of {} with {:?}",
        parameters,
        settings.step_count,
        settings.step_size,
        settings.scheme
    );

    let model = SirModel::new(*parameters);
    let mut stepper = settings.scheme.build::<f64>(COMPARTMENTS);
    let mut monitor = ConservationMonitor::new(parameters, settings.conservation_tolerance);

    let mut times = Vec::with_capacity(settings.step_count + 1);
    let mut states = Vec::with_capacity(settings.step_count + 1);
    times.push(0.0);
    states.push(initial_state);

    // Working buffer; every emitted State is a copy of it.
    let mut buffer = initial_state.to_array();

    for step in 1..=settings.step_count {
        let mut t = (step - 1) as f64 * settings.step_size;
        stepper.step(&model, &mut t, &mut buffer, settings.step_size);
        let t = step as f64 * settings.step_size;

        let (mass, count) = clamp_negative(&mut buffer);
        monitor.record_clamp(mass, count);

        if let Some(threshold) = settings.extinction_threshold {
            if cut_off_infection(&mut buffer, threshold) {
                monitor.record_extinction(step);
            }
        }

        let state = State::from_array(buffer);
        monitor.observe(t, &state);
        times.push(t);
        states.push(state);
    }

    let diagnostics = monitor.finish();
    if diagnostics.clamp_events > 0 {
        log::warn!(
            "clamped {} negative compartment values ({:e} individuals); the total is conserved only up to that amount",
            diagnostics.clamp_events,
            diagnostics.clamped_mass
        );
    }
    if diagnostics.numeric_instability {
        log::warn!(
            "compartment total drifted by {:e} (relative) with {:e} clamped, above tolerance {:e}; consider a smaller step size",
            diagnostics.max_relative_drift,
            diagnostics.clamped_mass,
            settings.conservation_tolerance
        );
    }
    log::debug!("integration finished: {diagnostics:?}");

    Ok(Trajectory::new(times, states, diagnostics))
}

/// Runs the default model from a seeded outbreak.
///
/// Mass-action incidence with [`DEFAULT_RECOVERY_RATE`]; everyone not
/// initially infected starts susceptible. Step count and size fall back to
/// [`DEFAULT_STEP_COUNT`] and [`DEFAULT_STEP_SIZE`].
///
/// Recovery is always on, so a zero `transmission_rate` keeps susceptible
/// fixed but still lets the infected decay into recovered. Use
/// [`integrate`] with a zero recovery rate for a frozen state.
pub fn simulate(
    population: f64,
    initial_infected: f64,
    transmission_rate: f64,
    step_count: Option<usize>,
    step_size: Option<f64>,
) -> Result<Trajectory> {
    ensure_positive("population", population)?;
    ensure_non_negative("initial_infected", initial_infected)?;
    if initial_infected > population {
        return Err(EpidemicError::invalid(
            "initial_infected",
            initial_infected,
            "must not exceed the population",
        ));
    }

    let parameters =
        Parameters::new(population, transmission_rate).with_recovery_rate(DEFAULT_RECOVERY_RATE);
    let settings = IntegrationSettings {
        step_count: step_count.unwrap_or(DEFAULT_STEP_COUNT),
        step_size: step_size.unwrap_or(DEFAULT_STEP_SIZE),
        ..IntegrationSettings::default()
    };
    integrate_with(
        State::seeded(population, initial_infected),
        &parameters,
        &settings,
    )
}

fn validate_initial_state(state: &State, parameters: &Parameters, tolerance: f64) -> Result<()> {
    ensure_non_negative("initial_susceptible", state.susceptible)?;
    ensure_non_negative("initial_infected", state.infected)?;
    ensure_non_negative("initial_recovered", state.recovered)?;

    let total = state.total();
    if (total - parameters.population).abs() > tolerance * parameters.population {
        return Err(EpidemicError::invalid(
            "initial_total",
            total,
            "compartments must sum to the population",
        ));
    }
    Ok(())
}

/// Resets negative entries to zero, returning the mass added and the count.
fn clamp_negative(values: &mut [f64]) -> (f64, usize) {
    let mut mass = 0.0;
    let mut count = 0;
    for value in values.iter_mut() {
        if *value < 0.0 {
            mass -= *value;
            count += 1;
            *value = 0.0;
        }
    }
    (mass, count)
}

/// Moves a sub-threshold infected remainder into recovered.
fn cut_off_infection(values: &mut [f64; COMPARTMENTS], threshold: f64) -> bool {
    let infected = values[1];
    if infected > 0.0 && infected < threshold {
        values[2] += infected;
        values[1] = 0.0;
        true
    } else {
        false
    }
}

struct ConservationMonitor<'a> {
    parameters: &'a Parameters,
    tolerance: f64,
    diagnostics: Diagnostics,
}

impl<'a> ConservationMonitor<'a> {
    fn new(parameters: &'a Parameters, tolerance: f64) -> Self {
        Self {
            parameters,
            tolerance,
            diagnostics: Diagnostics::default(),
        }
    }

    fn record_clamp(&mut self, mass: f64, count: usize) {
        self.diagnostics.clamped_mass += mass;
        self.diagnostics.clamp_events += count;
    }

    fn record_extinction(&mut self, step: usize) {
        if self.diagnostics.extinction_step.is_none() {
            self.diagnostics.extinction_step = Some(step);
        }
    }

    fn observe(&mut self, t: f64, state: &State) {
        let expected = self.parameters.expected_total(t);
        if self.diagnostics.clamped_mass > self.tolerance * expected {
            self.diagnostics.numeric_instability = true;
        }

        let unclamped = state.total() - self.diagnostics.clamped_mass;
        let drift = (unclamped - expected).abs() / expected;

        if !drift.is_finite() {
            self.diagnostics.max_relative_drift = f64::INFINITY;
            self.diagnostics.numeric_instability = true;
        } else if drift > self.diagnostics.max_relative_drift {
            self.diagnostics.max_relative_drift = drift;
            if drift > self.tolerance {
                self.diagnostics.numeric_instability = true;
            }
        }
    }

    fn finish(self) -> Diagnostics {
        self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Incidence;

    const N: f64 = 1_000_000.0;

    fn scenario(scheme: Scheme) -> Trajectory {
        let parameters = Parameters::new(N, 2e-6).with_recovery_rate(DEFAULT_RECOVERY_RATE);
        let settings = IntegrationSettings {
            step_count: 100,
            scheme,
            ..IntegrationSettings::default()
        };
        integrate_with(State::seeded(N, 100.0), &parameters, &settings)
            .expect("scenario should integrate")
    }

    fn assert_invalid(result: Result<Trajectory>, expected_name: &str) {
        match result {
            Err(EpidemicError::InvalidParameter { name, .. }) => assert_eq!(name, expected_name),
            other => panic!("expected InvalidParameter({expected_name}), got {other:?}"),
        }
    }

    fn non_increasing(values: &[f64]) -> bool {
        values.windows(2).all(|w| w[1] <= w[0])
    }

    #[test]
    fn concrete_outbreak_rises_and_burns_out() {
        let trajectory = simulate(N, 100.0, 2e-6, Some(100), None).expect("valid inputs");
        assert_eq!(trajectory.len(), 101);
        assert_eq!(trajectory.times()[100], 100.0);

        let susceptible = trajectory.susceptible();
        assert_eq!(susceptible[0], 999_900.0);
        assert!(non_increasing(&susceptible));
        let floor = susceptible[100];
        assert!(floor > 0.0 && floor < 1_000.0, "susceptible floor {floor}");

        let peak = trajectory.peak_infection().expect("non-empty");
        assert!(peak.step > 0 && peak.step < 30, "peak at step {}", peak.step);
        assert!(peak.infected > 100_000.0);
        let infected = trajectory.infected();
        assert!(infected[100] < 1.0, "infected at horizon {}", infected[100]);

        for total in trajectory.totals() {
            assert!((total - N).abs() <= 1e-6 * N, "total {total}");
        }
        let diagnostics = trajectory.diagnostics();
        assert_eq!(diagnostics.clamp_events, 0);
        assert!(!diagnostics.numeric_instability);
    }

    #[test]
    fn trajectory_starts_at_initial_condition() {
        let initial = State::new(600.0, 300.0, 100.0);
        let parameters = Parameters::new(1_000.0, 1e-3).with_recovery_rate(0.1);
        let trajectory = integrate(initial, &parameters, 10, 0.5).expect("valid inputs");
        assert_eq!(trajectory.get(0), Some((0.0, initial)));
        assert_eq!(trajectory.len(), 11);
        assert_eq!(trajectory.times()[10], 5.0);
    }

    #[test]
    fn susceptible_never_increases_for_frequency_dependent_runs() {
        let parameters = Parameters::new(1_000.0, 0.5)
            .with_recovery_rate(0.1)
            .with_incidence(Incidence::FrequencyDependent);
        for scheme in [Scheme::ForwardEuler, Scheme::Rk4, Scheme::Tsit5] {
            let settings = IntegrationSettings {
                step_count: 400,
                step_size: 0.25,
                scheme,
                ..IntegrationSettings::default()
            };
            let trajectory = integrate_with(State::seeded(1_000.0, 1.0), &parameters, &settings)
                .expect("valid inputs");
            assert!(non_increasing(&trajectory.susceptible()), "{scheme:?}");
            assert!(trajectory.diagnostics().max_relative_drift < 1e-9);
        }
    }

    #[test]
    fn zero_transmission_leaves_state_unchanged() {
        let initial = State::new(900.0, 100.0, 0.0);
        let parameters = Parameters::new(1_000.0, 0.0);
        let trajectory = integrate(initial, &parameters, 50, 1.0).expect("valid inputs");
        assert!(trajectory.states().iter().all(|s| *s == initial));
    }

    #[test]
    fn zero_transmission_with_recovery_spreads_no_infection() {
        let initial = State::new(900.0, 100.0, 0.0);
        let parameters = Parameters::new(1_000.0, 0.0).with_recovery_rate(0.2);
        let trajectory = integrate(initial, &parameters, 50, 1.0).expect("valid inputs");
        assert!(trajectory.susceptible().iter().all(|&s| s == 900.0));
        assert!(non_increasing(&trajectory.infected()));
    }

    #[test]
    fn zero_initial_infected_stays_zero() {
        let trajectory = simulate(N, 0.0, 2e-6, Some(100), None).expect("valid inputs");
        assert!(trajectory.infected().iter().all(|&i| i == 0.0));
        assert!(trajectory.susceptible().iter().all(|&s| s == N));
    }

    #[test]
    fn identical_inputs_give_identical_trajectories() {
        for scheme in [Scheme::ForwardEuler, Scheme::Rk4, Scheme::Tsit5] {
            assert_eq!(scenario(scheme), scenario(scheme));
        }
    }

    #[test]
    fn coarse_euler_clamps_and_reports_the_clamped_mass() {
        let trajectory = scenario(Scheme::ForwardEuler);
        let diagnostics = *trajectory.diagnostics();
        assert!(diagnostics.clamp_events > 0);
        assert!(diagnostics.clamped_mass > 0.0);
        assert!(trajectory
            .states()
            .iter()
            .all(|s| s.susceptible >= 0.0 && s.infected >= 0.0 && s.recovered >= 0.0));

        let final_total = trajectory.final_state().expect("non-empty").total();
        assert!((final_total - N - diagnostics.clamped_mass).abs() <= 1e-6 * N);
        assert!(diagnostics.max_relative_drift <= 1e-6);
        assert!(diagnostics.numeric_instability);
    }

    fn coarse_run(scheme: Scheme, step_size: f64, recovery_rate: f64) -> Trajectory {
        let parameters = Parameters::new(N, 2e-6).with_recovery_rate(recovery_rate);
        let settings = IntegrationSettings {
            step_count: 200,
            step_size,
            scheme,
            ..IntegrationSettings::default()
        };
        integrate_with(State::seeded(N, 100.0), &parameters, &settings).expect("valid inputs")
    }

    #[test]
    fn susceptible_never_increases_at_coarse_steps() {
        for scheme in [Scheme::ForwardEuler, Scheme::Rk4, Scheme::Tsit5] {
            for step_size in [0.5, 1.0, 1.5, 2.0, 3.0, 5.0, 10.0] {
                for recovery_rate in [0.0, DEFAULT_RECOVERY_RATE] {
                    let trajectory = coarse_run(scheme, step_size, recovery_rate);
                    let label = format!("{scheme:?} dt={step_size} gamma={recovery_rate}");
                    assert!(non_increasing(&trajectory.susceptible()), "{label}");
                    assert!(
                        trajectory.states().iter().all(|s| s.susceptible >= 0.0
                            && s.infected >= 0.0
                            && s.recovered >= 0.0),
                        "{label}"
                    );
                    assert!(
                        trajectory.totals().iter().all(|total| total.is_finite()),
                        "{label}"
                    );
                }
            }
        }
    }

    #[test]
    fn coarse_rk4_clamping_is_flagged() {
        for (step_size, recovery_rate) in [(3.0, DEFAULT_RECOVERY_RATE), (10.0, 0.0)] {
            let trajectory = coarse_run(Scheme::Rk4, step_size, recovery_rate);
            let diagnostics = trajectory.diagnostics();
            assert!(diagnostics.clamped_mass > 1.0, "dt={step_size}");
            assert!(diagnostics.numeric_instability, "dt={step_size}");
        }
    }

    #[test]
    fn fine_steps_are_not_flagged() {
        for scheme in [Scheme::ForwardEuler, Scheme::Rk4, Scheme::Tsit5] {
            let diagnostics = *coarse_run(scheme, 0.5, DEFAULT_RECOVERY_RATE).diagnostics();
            assert_eq!(diagnostics.clamped_mass, 0.0, "{scheme:?}");
            assert!(!diagnostics.numeric_instability, "{scheme:?}");
        }
    }

    #[test]
    fn extinction_threshold_moves_remainder_to_recovered() {
        let parameters = Parameters::new(N, 2e-6).with_recovery_rate(DEFAULT_RECOVERY_RATE);
        let settings = IntegrationSettings {
            step_count: 100,
            extinction_threshold: Some(0.5),
            ..IntegrationSettings::default()
        };
        let trajectory =
            integrate_with(State::seeded(N, 100.0), &parameters, &settings).expect("valid inputs");

        let step = trajectory
            .diagnostics()
            .extinction_step
            .expect("outbreak should die out");
        let infected = trajectory.infected();
        assert!(infected[step - 1] >= 0.5);
        assert!(infected[step..].iter().all(|&i| i == 0.0));
        for total in trajectory.totals() {
            assert!((total - N).abs() <= 1e-6 * N);
        }
    }

    #[test]
    fn balanced_vital_dynamics_conserve_the_total() {
        let parameters = Parameters::new(10_000.0, 5e-5)
            .with_recovery_rate(0.1)
            .with_vital_dynamics(0.01, 0.01)
            .with_immunity_loss_rate(0.02);
        let trajectory =
            integrate(State::seeded(10_000.0, 10.0), &parameters, 200, 0.5).expect("valid inputs");
        for total in trajectory.totals() {
            assert!((total - 10_000.0).abs() <= 1e-6);
        }
    }

    #[test]
    fn net_growth_follows_exponential_total() {
        let parameters = Parameters::new(10_000.0, 5e-5)
            .with_recovery_rate(0.1)
            .with_vital_dynamics(0.02, 0.01);
        let trajectory =
            integrate(State::seeded(10_000.0, 10.0), &parameters, 100, 1.0).expect("valid inputs");
        let (t, state) = trajectory.get(100).expect("last sample");
        let expected = 10_000.0 * (0.01 * t).exp();
        assert!((state.total() - expected).abs() / expected < 1e-9);
        assert!(!trajectory.diagnostics().numeric_instability);
    }

    #[test]
    fn overflow_is_flagged_not_raised() {
        let parameters = Parameters::new(N, 1e300);
        let settings = IntegrationSettings {
            step_count: 3,
            scheme: Scheme::ForwardEuler,
            ..IntegrationSettings::default()
        };
        let trajectory =
            integrate_with(State::seeded(N, 100.0), &parameters, &settings).expect("valid inputs");
        assert!(trajectory.diagnostics().numeric_instability);
        assert_eq!(trajectory.len(), 4);
    }

    #[test]
    fn negative_population_is_rejected() {
        assert_invalid(simulate(-5.0, 0.0, 2e-6, None, None), "population");
    }

    #[test]
    fn entry_point_rejects_bad_arguments() {
        assert_invalid(simulate(0.0, 0.0, 2e-6, None, None), "population");
        assert_invalid(simulate(N, -1.0, 2e-6, None, None), "initial_infected");
        assert_invalid(simulate(N, N + 1.0, 2e-6, None, None), "initial_infected");
        assert_invalid(simulate(N, 1.0, -2e-6, None, None), "transmission_rate");
        assert_invalid(simulate(N, 1.0, 2e-6, Some(0), None), "step_count");
        assert_invalid(simulate(N, 1.0, 2e-6, None, Some(0.0)), "step_size");
        assert_invalid(simulate(N, 1.0, 2e-6, None, Some(-1.0)), "step_size");
        assert_invalid(simulate(f64::NAN, 1.0, 2e-6, None, None), "population");
    }

    #[test]
    fn initial_state_must_match_population() {
        let parameters = Parameters::new(1_000.0, 1e-3);
        assert_invalid(
            integrate(State::new(500.0, 10.0, 0.0), &parameters, 10, 1.0),
            "initial_total",
        );
        assert_invalid(
            integrate(State::new(1_010.0, -10.0, 0.0), &parameters, 10, 1.0),
            "initial_infected",
        );
    }

    #[test]
    fn settings_reject_bad_tolerances() {
        let parameters = Parameters::new(1_000.0, 1e-3);
        let initial = State::seeded(1_000.0, 1.0);
        let settings = IntegrationSettings {
            conservation_tolerance: 0.0,
            ..IntegrationSettings::default()
        };
        assert_invalid(
            integrate_with(initial, &parameters, &settings),
            "conservation_tolerance",
        );
        let settings = IntegrationSettings {
            extinction_threshold: Some(-0.5),
            ..IntegrationSettings::default()
        };
        assert_invalid(
            integrate_with(initial, &parameters, &settings),
            "extinction_threshold",
        );
    }

    #[test]
    fn default_horizon_covers_a_year() {
        let settings = IntegrationSettings::default();
        assert_eq!(settings.horizon(), 365.0);
        assert_eq!(settings.scheme, Scheme::Rk4);
    }
}
