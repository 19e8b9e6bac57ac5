//! Deterministic and stochastic SIR epidemic modelling.
//!
//! - [`sir`]: one-day steppers (discrete recurrence, RK4/Euler integrator)
//! - [`runner`]: full-horizon runs, summaries and stepper cross-validation
//! - [`sensitivity`]: (β, γ) parameter sweeps
//! - [`classroom`]: exact binomial vs. Monte Carlo classroom infections

pub mod analysis;
pub mod classroom;
pub mod config;
pub mod errors;
pub mod logging;
pub mod params;
pub mod runner;
pub mod sensitivity;
pub mod sir;
pub mod util;

pub use classroom::{ClassroomDistribution, ClassroomModel};
pub use errors::{Error, Warning};
pub use params::ModelParameters;
pub use runner::{cross_validate, SimulationResult, SimulationRunner, Summary};
pub use sensitivity::{SensitivityAnalyzer, SensitivityGridResult};
pub use sir::{ContinuousIntegrator, DiscreteStepper, IntegrationMethod, SIRState, StepDiagnostics, Stepper};
