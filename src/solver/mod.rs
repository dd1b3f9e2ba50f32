//! A uniform contract over interchangeable ODE solver backends.
//!
//! Every backend consumes the same right-hand-side trait ([`OdeSystem`]) and
//! produces the same [`RawSolution`], normalizing step-size control,
//! relative/absolute tolerance interpretation and event detection. Backend
//! selection is a configuration-time decision; once a run has started the
//! backend is fixed.
//!
//! Event detection is uniform across backends: it is performed host-side on
//! dense output (cubic Hermite interpolation between accepted steps plus
//! bisection), never through solver-embedded callbacks, so backends without
//! native root-finding behave identically to those with it.

mod event;
mod explicit;
mod multistep;

pub use event::{DetectedEvent, EventAction, EventMonitor, EventSpec};

use crate::errors::{ParcelError, ParcelResult};
use crate::state::StateVector;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Right-hand side of an ODE system `dy/dt = f(t, y)`.
///
/// This is the one surface every backend binds to. Implementations must be
/// pure: backends probe trial states that are later rejected, and repeated
/// or speculative calls must be side-effect free.
pub trait OdeSystem {
    /// Dimension of the state vector.
    fn dim(&self) -> usize;

    /// Evaluate the derivative at `(t, y)` into `dydt`.
    ///
    /// Must not allocate; `dydt` is caller-provided scratch. Errors are
    /// fatal to the run.
    fn rhs(&self, t: f64, y: &StateVector, dydt: &mut StateVector) -> ParcelResult<()>;

    /// Fill `jac` with the analytic Jacobian `df/dy` and return `true`, or
    /// return `false` to let implicit backends fall back to finite
    /// differences.
    fn analytic_jacobian(&self, _t: f64, _y: &StateVector, _jac: &mut DMatrix<f64>) -> bool {
        false
    }
}

/// The available solver backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverBackend {
    /// Fixed-step classic Runge-Kutta (`ode_solvers`). Ignores tolerances;
    /// the step size is the output step. Cheap baseline for smooth problems.
    Rk4,
    /// Adaptive explicit Dormand-Prince 5(4) (`ode_solvers`) with dense
    /// sampled output.
    Dopri5,
    /// Adaptive multistep starting on an Adams predictor-corrector and
    /// switching automatically to BDF with Newton iteration when corrector
    /// convergence indicates stiffness.
    AdamsBdf,
    /// Backward-differentiation formulas (orders 1-2) with Newton iteration
    /// and a finite-difference or system-supplied Jacobian.
    Bdf,
    /// CVODE via native SUNDIALS. Recognized so that configurations naming
    /// it fail cleanly at configuration time in builds without SUNDIALS
    /// support, rather than mid-run.
    Cvode,
}

impl SolverBackend {
    pub fn name(&self) -> &'static str {
        match self {
            SolverBackend::Rk4 => "rk4",
            SolverBackend::Dopri5 => "dopri5",
            SolverBackend::AdamsBdf => "adams_bdf",
            SolverBackend::Bdf => "bdf",
            SolverBackend::Cvode => "cvode",
        }
    }

    /// Whether this backend can run in the current build. Checked when a
    /// model is configured, never during integration.
    pub fn availability(&self) -> ParcelResult<()> {
        match self {
            SolverBackend::Cvode => Err(ParcelError::BackendUnavailable {
                backend: self.name().to_string(),
                reason: "this build does not include SUNDIALS support".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

/// Tolerances and budgets, interpreted identically by every backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverOptions {
    /// Relative tolerance on each state component.
    pub rtol: f64,
    /// Absolute tolerance on each state component.
    pub atol: f64,
    /// Budget of attempted steps before the run is declared non-convergent.
    pub max_steps: usize,
    /// Output sampling interval for backends with dense output, s.
    pub output_step: f64,
    /// Initial step size; chosen automatically when `None`.
    pub first_step: Option<f64>,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            rtol: 1e-6,
            atol: 1e-10,
            max_steps: 500_000,
            output_step: 1.0,
            first_step: None,
        }
    }
}

/// Integration bookkeeping reported alongside a trajectory.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SolverStats {
    pub rhs_evaluations: usize,
    pub jacobian_evaluations: usize,
    pub newton_iterations: usize,
    pub accepted_steps: usize,
    pub rejected_steps: usize,
}

/// The accepted time/state sequence produced by a backend, before being
/// packaged into a `Trajectory`.
#[derive(Debug, Clone)]
pub struct RawSolution {
    pub times: Vec<f64>,
    pub states: Vec<StateVector>,
    pub stats: SolverStats,
    pub event: Option<DetectedEvent>,
}

impl RawSolution {
    pub(crate) fn empty() -> Self {
        Self {
            times: Vec::new(),
            states: Vec::new(),
            stats: SolverStats::default(),
            event: None,
        }
    }

    /// Simulated time of the last accepted step, if any.
    pub fn last_time(&self) -> Option<f64> {
        self.times.last().copied()
    }
}

/// An integration error together with the partial solution up to the last
/// accepted step, which is retained for diagnostics rather than discarded.
#[derive(Debug, Clone)]
pub struct IntegrationFailure {
    pub error: ParcelError,
    pub partial: RawSolution,
}

/// Advance `system` from `t_span.0` to `t_span.1` with the selected backend.
///
/// The one entry point all backends share. `event`, when given, is monitored
/// across every accepted step regardless of backend capabilities.
pub fn integrate<S: OdeSystem>(
    backend: SolverBackend,
    system: &S,
    y0: &StateVector,
    t_span: (f64, f64),
    options: &SolverOptions,
    event: Option<&EventSpec<'_>>,
) -> Result<RawSolution, IntegrationFailure> {
    match backend {
        SolverBackend::Rk4 => explicit::integrate_rk4(system, y0, t_span, options, event),
        SolverBackend::Dopri5 => explicit::integrate_dopri5(system, y0, t_span, options, event),
        SolverBackend::AdamsBdf => {
            multistep::integrate(system, y0, t_span, options, event, multistep::Mode::AutoSwitch)
        }
        SolverBackend::Bdf => {
            multistep::integrate(system, y0, t_span, options, event, multistep::Mode::Bdf)
        }
        SolverBackend::Cvode => Err(IntegrationFailure {
            error: backend.availability().unwrap_err(),
            partial: RawSolution::empty(),
        }),
    }
}

/// Weighted root-mean-square norm of `delta` with per-component weights
/// `1 / (atol + rtol |y_i|)`. A value of 1 means "exactly at tolerance".
pub(crate) fn wrms_norm(delta: &StateVector, y: &StateVector, options: &SolverOptions) -> f64 {
    let n = delta.len();
    let mut acc = 0.0;
    for i in 0..n {
        let w = 1.0 / (options.atol + options.rtol * y[i].abs());
        let e = delta[i] * w;
        acc += e * e;
    }
    (acc / n as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_names_round_trip_through_serde() {
        for backend in [
            SolverBackend::Rk4,
            SolverBackend::Dopri5,
            SolverBackend::AdamsBdf,
            SolverBackend::Bdf,
            SolverBackend::Cvode,
        ] {
            let json = serde_json::to_string(&backend).unwrap();
            assert_eq!(json, format!("\"{}\"", backend.name()));
            let back: SolverBackend = serde_json::from_str(&json).unwrap();
            assert_eq!(back, backend);
        }
    }

    #[test]
    fn cvode_is_unavailable_in_this_build() {
        assert!(matches!(
            SolverBackend::Cvode.availability(),
            Err(ParcelError::BackendUnavailable { .. })
        ));
        assert!(SolverBackend::Bdf.availability().is_ok());
        assert!(SolverBackend::Dopri5.availability().is_ok());
    }

    #[test]
    fn wrms_norm_is_one_at_tolerance() {
        let options = SolverOptions {
            rtol: 0.0,
            atol: 1e-6,
            ..Default::default()
        };
        let y = StateVector::zeros(4);
        let delta = StateVector::from_element(4, 1e-6);
        let norm = wrms_norm(&delta, &y, &options);
        assert!((norm - 1.0).abs() < 1e-12);
    }
}
