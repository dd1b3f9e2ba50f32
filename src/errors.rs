use thiserror::Error;

/// Error type for parcel-model runs.
///
/// Configuration problems are detected eagerly while a model is being
/// assembled and never surface mid-integration. Integration failures carry
/// the last accepted simulated time so callers can diagnose where a run
/// broke down instead of receiving a bare error code.
#[derive(Error, Debug, Clone)]
pub enum ParcelError {
    /// Invalid aerosol, environment or solver parameters.
    #[error("invalid configuration: {0}")]
    Configuration(String),
    /// The requested solver backend cannot be used in this build/runtime.
    #[error("solver backend '{backend}' is unavailable: {reason}")]
    BackendUnavailable { backend: String, reason: String },
    /// An internal root-find (equilibrium radius, critical point) failed.
    #[error("root-finding failed for {what}: {reason}")]
    RootFindFailure { what: String, reason: String },
    /// The solver could not meet the requested tolerance within its step budget.
    #[error("solver failed to converge at t = {t} s: {detail}")]
    ConvergenceFailure { t: f64, detail: String },
    /// The step size collapsed below its floor, indicating stiffness beyond
    /// the selected backend's capability.
    #[error("step size collapsed below the floor at t = {t} s (h = {h:e} s)")]
    StepSizeUnderflow { t: f64, h: f64 },
    /// Defensive check tripped by the condensation kernel. Always fatal.
    #[error("non-physical state at t = {t} s: {detail}")]
    NonPhysicalState { t: f64, detail: String },
}

/// Convenience type for `Result<T, ParcelError>`.
pub type ParcelResult<T> = Result<T, ParcelError>;
