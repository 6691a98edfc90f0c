use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types that can be used as scalars in compartment models.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// Lifts an `f64` constant into the scalar type.
///
/// Every `Float` type can represent an `f64` approximately, so the
/// conversion only yields NaN for exotic scalar types.
pub fn constant<T: Scalar>(value: f64) -> T {
    T::from_f64(value).unwrap_or_else(T::nan)
}

/// Represents a system of ordinary differential equations.
pub trait DynamicalSystem<T: Scalar> {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates the vector field.
    /// x: current state
    /// t: current time
    /// out: buffer to write dx/dt into
    fn apply(&self, t: T, x: &[T], out: &mut [T]);
}

/// A trait for solvers that can step a system forward.
pub trait Steppable<T: Scalar> {
    /// Performs one step of size dt.
    /// t: current time (updated after step)
    /// state: current state (updated after step)
    /// dt: step size
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T);
}
