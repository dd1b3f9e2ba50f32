//! An adiabatic cloud-parcel model: κ-Köhler aerosol activation driven by
//! a rising parcel's supersaturation history, integrated with pluggable ODE
//! solver backends.

pub mod activation;
pub mod aerosol;
pub mod config;
pub mod constants;
pub mod kernel;
pub mod kohler;
pub mod model;
pub mod solver;
pub mod state;
pub mod thermo;
pub mod trajectory;

pub mod errors;

pub use activation::{ActivationResult, BinActivation};
pub use config::ParcelConfig;
pub use errors::{ParcelError, ParcelResult};
pub use kernel::{CondensationKernel, KernelParams, UpdraftProfile};
pub use model::{CompletedRun, FailedRun, ParcelModel};
pub use solver::SolverBackend;
pub use trajectory::Trajectory;
