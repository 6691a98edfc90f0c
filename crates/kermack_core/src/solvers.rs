use crate::traits::{constant, DynamicalSystem, Scalar, Steppable};
use serde::{Deserialize, Serialize};

/// Fixed-step explicit schemes available to the integrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Scheme {
    /// First order. Cheap, but coarse steps with large rates overshoot and
    /// trigger clamping.
    ForwardEuler,
    /// Classic fourth-order Runge-Kutta.
    #[default]
    Rk4,
    /// Tsitouras 5(4) tableau, fifth-order solution only.
    Tsit5,
}

impl Scheme {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "euler" | "forward_euler" => Some(Scheme::ForwardEuler),
            "rk4" => Some(Scheme::Rk4),
            "tsit5" => Some(Scheme::Tsit5),
            _ => None,
        }
    }

    pub fn build<T: Scalar>(self, dim: usize) -> Stepper<T> {
        match self {
            Scheme::ForwardEuler => Stepper::ForwardEuler(ForwardEuler::new(dim)),
            Scheme::Rk4 => Stepper::Rk4(RK4::new(dim)),
            Scheme::Tsit5 => Stepper::Tsit5(Tsit5::new(dim)),
        }
    }
}

/// A stepper chosen at runtime.
pub enum Stepper<T: Scalar> {
    ForwardEuler(ForwardEuler<T>),
    Rk4(RK4<T>),
    Tsit5(Tsit5<T>),
}

impl<T: Scalar> Steppable<T> for Stepper<T> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        match self {
            Stepper::ForwardEuler(s) => s.step(system, t, state, dt),
            Stepper::Rk4(s) => s.step(system, t, state, dt),
            Stepper::Tsit5(s) => s.step(system, t, state, dt),
        }
    }
}

/// Forward Euler: y_next = y + dt * f(t, y)
pub struct ForwardEuler<T: Scalar> {
    k: Vec<T>,
}

impl<T: Scalar> ForwardEuler<T> {
    pub fn new(dim: usize) -> Self {
        Self {
            k: vec![T::zero(); dim],
        }
    }
}

impl<T: Scalar> Steppable<T> for ForwardEuler<T> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        system.apply(*t, state, &mut self.k);
        for (y, k) in state.iter_mut().zip(&self.k) {
            *y = *y + dt * *k;
        }
        *t = *t + dt;
    }
}

/// Classic Runge-Kutta 4th Order Solver
pub struct RK4<T: Scalar> {
    k1: Vec<T>,
    k2: Vec<T>,
    k3: Vec<T>,
    k4: Vec<T>,
    tmp: Vec<T>,
}

impl<T: Scalar> RK4<T> {
    pub fn new(dim: usize) -> Self {
        let z = T::zero();
        Self {
            k1: vec![z; dim],
            k2: vec![z; dim],
            k3: vec![z; dim],
            k4: vec![z; dim],
            tmp: vec![z; dim],
        }
    }
}

impl<T: Scalar> Steppable<T> for RK4<T> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        let half = constant::<T>(0.5);
        let sixth = constant::<T>(1.0 / 6.0);
        let two = constant::<T>(2.0);

        let t0 = *t;

        // k1 = f(t, y)
        system.apply(t0, state, &mut self.k1);

        // k2 = f(t + dt/2, y + dt*k1/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k1[i] * half;
        }
        system.apply(t0 + dt * half, &self.tmp, &mut self.k2);

        // k3 = f(t + dt/2, y + dt*k2/2)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k2[i] * half;
        }
        system.apply(t0 + dt * half, &self.tmp, &mut self.k3);

        // k4 = f(t + dt, y + dt*k3)
        for i in 0..state.len() {
            self.tmp[i] = state[i] + dt * self.k3[i];
        }
        system.apply(t0 + dt, &self.tmp, &mut self.k4);

        for i in 0..state.len() {
            state[i] = state[i]
                + dt * sixth * (self.k1[i] + two * self.k2[i] + two * self.k3[i] + self.k4[i]);
        }

        *t = t0 + dt;
    }
}

const TSIT5_STAGES: usize = 6;

const TSIT5_C: [f64; TSIT5_STAGES] = [0.0, 0.161, 0.327, 0.9, 0.9800255409045097, 1.0];

// Lower-triangular: row i holds the weights of k_0..k_{i-1}.
const TSIT5_A: [[f64; TSIT5_STAGES - 1]; TSIT5_STAGES] = [
    [0.0, 0.0, 0.0, 0.0, 0.0],
    [0.161, 0.0, 0.0, 0.0, 0.0],
    [-0.008480655492356989, 0.335480655492357, 0.0, 0.0, 0.0],
    [2.898, -6.359447987781783, 4.361447987781783, 0.0, 0.0],
    [
        5.325864828439257,
        -11.748883564062828,
        7.4955393428898365,
        -0.09249506636175525,
        0.0,
    ],
    [
        5.86145544294642,
        -12.92096931784711,
        8.159367898576159,
        -0.071584973281401,
        -0.028269050394068383,
    ],
];

const TSIT5_B: [f64; TSIT5_STAGES] = [
    0.09646076681806523,
    0.01,
    0.4798896504144996,
    1.379008574103742,
    -3.290069515436099,
    2.324710524099774,
];

/// Tsitouras 5/4 Solver, advanced with the fifth-order weights at a fixed step.
pub struct Tsit5<T: Scalar> {
    k: [Vec<T>; TSIT5_STAGES],
    tmp: Vec<T>,
}

impl<T: Scalar> Tsit5<T> {
    pub fn new(dim: usize) -> Self {
        Self {
            k: std::array::from_fn(|_| vec![T::zero(); dim]),
            tmp: vec![T::zero(); dim],
        }
    }
}

impl<T: Scalar> Steppable<T> for Tsit5<T> {
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T) {
        let t0 = *t;

        system.apply(t0, state, &mut self.k[0]);

        for stage in 1..TSIT5_STAGES {
            for i in 0..state.len() {
                let mut acc = T::zero();
                for (j, &a) in TSIT5_A[stage][..stage].iter().enumerate() {
                    acc = acc + constant::<T>(a) * self.k[j][i];
                }
                self.tmp[i] = state[i] + dt * acc;
            }
            let tc = t0 + constant::<T>(TSIT5_C[stage]) * dt;
            system.apply(tc, &self.tmp, &mut self.k[stage]);
        }

        // The fifth-order weights are not all positive. If the combined slope
        // of any component has the opposite sign of every stage slope, the
        // step falls back to the first stage (explicit Euler).
        let mut overshoot = false;
        for i in 0..state.len() {
            let mut acc = T::zero();
            let (mut lo, mut hi) = (self.k[0][i], self.k[0][i]);
            for (j, &b) in TSIT5_B.iter().enumerate() {
                acc = acc + constant::<T>(b) * self.k[j][i];
                lo = lo.min(self.k[j][i]);
                hi = hi.max(self.k[j][i]);
            }
            self.tmp[i] = acc;
            if (hi <= T::zero() && acc > T::zero()) || (lo >= T::zero() && acc < T::zero()) {
                overshoot = true;
            }
        }

        let slope = if overshoot { &self.k[0] } else { &self.tmp };
        for (y, k) in state.iter_mut().zip(slope) {
            *y = *y + dt * *k;
        }

        *t = t0 + dt;
    }
}
