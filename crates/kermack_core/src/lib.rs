pub mod analysis;
pub mod error;
pub mod integrator;
pub mod model;
pub mod solvers;
pub mod trajectory;
/// The `kermack_core` crate integrates Kermack–McKendrick (SIR-family)
/// compartment models over time.
///
/// Key components:
/// - **Model**: `Parameters`, `State` and the pure `derivative` function.
/// - **Traits**: `Scalar`, `DynamicalSystem`, `Steppable` (solver abstraction).
/// - **Solvers**: fixed-step Forward Euler, RK4 and Tsit5.
/// - **Integrator**: validated step loop producing a `Trajectory` with
///   non-negative compartments and conservation diagnostics.
/// - **Analysis**: R0, herd-immunity threshold, final size, linear stability.
pub mod traits;

pub use error::{EpidemicError, Result};
pub use integrator::{integrate, integrate_with, simulate, IntegrationSettings};
pub use model::{derivative, Compartment, Incidence, Parameters, State};
pub use solvers::Scheme;
pub use trajectory::{Diagnostics, Trajectory, TrajectoryColumns};
