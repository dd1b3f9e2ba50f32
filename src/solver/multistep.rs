//! In-crate adaptive multistep backends.
//!
//! Two method families share one stepping loop:
//!
//! - an Adams-Bashforth predictor with trapezoidal corrector (functional
//!   iteration), efficient while the problem is non-stiff;
//! - backward-differentiation formulas of orders 1-2 with Newton iteration,
//!   for the stiff regime around droplet activation.
//!
//! The `AutoSwitch` mode starts on Adams and moves to BDF when the
//! functional corrector repeatedly fails to converge, the classic symptom
//! of stiffness. Step size is controlled through the weighted RMS norm of
//! the predictor-corrector difference, so relative/absolute tolerances mean
//! the same thing here as in every other backend.
//!
//! All per-run workspaces (Jacobian, LU factorization, iteration vectors)
//! are owned by this stepping loop and released on every exit path,
//! including failures.

use super::event::{self, DetectedEvent, EventAction, EventSpec};
use super::{wrms_norm, IntegrationFailure, OdeSystem, RawSolution, SolverOptions, SolverStats};
use crate::errors::ParcelError;
use crate::state::StateVector;
use log::info;
use nalgebra::DMatrix;

const MAX_NEWTON_ITERATIONS: usize = 4;
const MAX_FIXED_POINT_ITERATIONS: usize = 3;
/// Iteration convergence threshold, in units of the step tolerance.
const CORRECTOR_TOL: f64 = 0.3;
/// Accumulated functional-corrector failures before Adams hands over to
/// BDF. Not reset on accepted steps: a non-stiff problem runs below its
/// stability boundary and accumulates none, while a stiff one keeps
/// bouncing off it.
const STIFFNESS_THRESHOLD: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Mode {
    /// Start on Adams, switch to BDF on stiffness.
    AutoSwitch,
    /// BDF from the first step.
    Bdf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Adams,
    Bdf,
}

enum StepOutcome {
    Accepted {
        y_new: StateVector,
        f_new: StateVector,
        err: f64,
    },
    Rejected {
        err: f64,
    },
    CorrectorFailed,
}

pub(super) fn integrate<S: OdeSystem>(
    system: &S,
    y0: &StateVector,
    t_span: (f64, f64),
    options: &SolverOptions,
    event: Option<&EventSpec<'_>>,
    mode: Mode,
) -> Result<RawSolution, IntegrationFailure> {
    let n = system.dim();
    let (t0, t_end) = t_span;
    let span = t_end - t0;
    let mut stats = SolverStats::default();

    let mut t = t0;
    let mut y = y0.clone();
    let mut f = StateVector::zeros(n);
    if let Err(error) = system.rhs(t, &y, &mut f) {
        return Err(IntegrationFailure {
            error,
            partial: RawSolution::empty(),
        });
    }
    stats.rhs_evaluations += 1;

    let mut times = vec![t];
    let mut states = vec![y.clone()];
    let mut detected: Option<DetectedEvent> = None;

    let mut h = options.first_step.unwrap_or((span * 1e-6).max(1e-9));
    let h_floor = span * 1e-14;

    // one step of history: (t, y, f) at the previous accepted point
    let mut prev: Option<(f64, StateVector, StateVector)> = None;
    let mut method = match mode {
        Mode::AutoSwitch => Method::Adams,
        Mode::Bdf => Method::Bdf,
    };
    let mut corrector_failures = 0usize;
    let mut attempts = 0usize;

    while t < t_end - 1e-12 * span.abs().max(1.0) {
        if attempts >= options.max_steps {
            return Err(IntegrationFailure {
                error: ParcelError::ConvergenceFailure {
                    t,
                    detail: format!("attempted-step budget of {} exhausted", options.max_steps),
                },
                partial: RawSolution {
                    times,
                    states,
                    stats,
                    event: detected,
                },
            });
        }
        attempts += 1;
        let h_try = h.min(t_end - t);

        let outcome = match method {
            Method::Adams => adams_step(system, options, &mut stats, prev.as_ref(), t, &y, &f, h_try),
            Method::Bdf => bdf_step(system, options, &mut stats, prev.as_ref(), t, &y, &f, h_try),
        };

        match outcome {
            Err(error) => {
                // kernel errors are fatal to the run, never retried locally
                return Err(IntegrationFailure {
                    error,
                    partial: RawSolution {
                        times,
                        states,
                        stats,
                        event: detected,
                    },
                });
            }
            Ok(StepOutcome::Accepted { y_new, f_new, err }) => {
                stats.accepted_steps += 1;
                let t_new = t + h_try;

                if detected.is_none() {
                    if let Some(spec) = event {
                        if let Some(found) =
                            event::locate(system, spec, t, &y, &f, t_new, &y_new, &f_new)
                        {
                            if spec.action == EventAction::Halt {
                                times.push(found.t);
                                states.push(found.state.clone());
                                return Ok(RawSolution {
                                    times,
                                    states,
                                    stats,
                                    event: Some(found),
                                });
                            }
                            detected = Some(found);
                        }
                    }
                }

                prev = Some((
                    t,
                    std::mem::replace(&mut y, y_new),
                    std::mem::replace(&mut f, f_new),
                ));
                t = t_new;
                times.push(t);
                states.push(y.clone());

                let factor = (0.9 * err.max(1e-10).powf(-1.0 / 3.0)).clamp(0.2, 4.0);
                h = h_try * factor;
            }
            Ok(StepOutcome::Rejected { err }) => {
                stats.rejected_steps += 1;
                let factor = (0.9 * err.max(1.0).powf(-1.0 / 3.0)).clamp(0.1, 0.5);
                h = h_try * factor;
                if h < h_floor {
                    return Err(IntegrationFailure {
                        error: ParcelError::StepSizeUnderflow { t, h },
                        partial: RawSolution {
                            times,
                            states,
                            stats,
                            event: detected,
                        },
                    });
                }
            }
            Ok(StepOutcome::CorrectorFailed) => {
                stats.rejected_steps += 1;
                corrector_failures += 1;
                if mode == Mode::AutoSwitch
                    && method == Method::Adams
                    && corrector_failures >= STIFFNESS_THRESHOLD
                {
                    info!(
                        "functional corrector failed {} times by t = {:.4} s; \
                         switching from Adams to BDF",
                        corrector_failures, t
                    );
                    method = Method::Bdf;
                } else {
                    h = h_try * 0.25;
                    if h < h_floor {
                        return Err(IntegrationFailure {
                            error: ParcelError::StepSizeUnderflow { t, h },
                            partial: RawSolution {
                                times,
                                states,
                                stats,
                                event: detected,
                            },
                        });
                    }
                }
            }
        }
    }

    Ok(RawSolution {
        times,
        states,
        stats,
        event: detected,
    })
}

/// One Adams-Bashforth/trapezoid predictor-corrector attempt.
#[allow(clippy::too_many_arguments)]
fn adams_step<S: OdeSystem>(
    system: &S,
    options: &SolverOptions,
    stats: &mut SolverStats,
    prev: Option<&(f64, StateVector, StateVector)>,
    t: f64,
    y: &StateVector,
    f: &StateVector,
    h: f64,
) -> Result<StepOutcome, ParcelError> {
    let t_new = t + h;

    // variable-step AB2 predictor, forward Euler on the first step
    let y_pred = match prev {
        Some((t_prev, _, f_prev)) => {
            let r = h / (2.0 * (t - t_prev));
            y + f * (h * (1.0 + r)) - f_prev * (h * r)
        }
        None => y + f * h,
    };

    // trapezoidal corrector by functional iteration; divergence here is the
    // stiffness signal the auto-switching mode listens for
    let mut y_corr = y_pred.clone();
    let mut f_new = StateVector::zeros(y.len());
    let mut converged = false;
    for _ in 0..MAX_FIXED_POINT_ITERATIONS {
        system.rhs(t_new, &y_corr, &mut f_new)?;
        stats.rhs_evaluations += 1;
        let y_next = y + (f + &f_new) * (0.5 * h);
        let delta = &y_next - &y_corr;
        y_corr = y_next;
        if wrms_norm(&delta, y, options) < CORRECTOR_TOL {
            converged = true;
            break;
        }
    }
    if !converged {
        return Ok(StepOutcome::CorrectorFailed);
    }
    system.rhs(t_new, &y_corr, &mut f_new)?;
    stats.rhs_evaluations += 1;

    let err = wrms_norm(&(&y_corr - &y_pred), y, options) / 6.0;
    if err <= 1.0 {
        Ok(StepOutcome::Accepted {
            y_new: y_corr,
            f_new,
            err,
        })
    } else {
        Ok(StepOutcome::Rejected { err })
    }
}

/// One BDF attempt: backward Euler on the first step, variable-step BDF2
/// afterwards, solved by Newton iteration.
#[allow(clippy::too_many_arguments)]
fn bdf_step<S: OdeSystem>(
    system: &S,
    options: &SolverOptions,
    stats: &mut SolverStats,
    prev: Option<&(f64, StateVector, StateVector)>,
    t: f64,
    y: &StateVector,
    f: &StateVector,
    h: f64,
) -> Result<StepOutcome, ParcelError> {
    let n = y.len();
    let t_new = t + h;

    // history polynomial: y_new = psi + h * beta * f(t_new, y_new)
    let (psi, beta, y_pred, err_coeff) = match prev {
        Some((t_prev, y_prev, f_prev)) => {
            let h_prev = t - t_prev;
            let rho = h / h_prev;
            let denom = 1.0 + 2.0 * rho;
            let a = (1.0 + rho) * (1.0 + rho) / denom;
            let b = -(rho * rho) / denom;
            let beta = (1.0 + rho) / denom;
            let psi = y * a + y_prev * b;
            // second-order Taylor predictor with a backward-difference
            // estimate of the curvature
            let y_pred = y + f * h + (f - f_prev) * (0.5 * h * h / h_prev);
            (psi, beta, y_pred, 1.0 / 3.0)
        }
        None => (y.clone(), 1.0, y + f * h, 0.5),
    };

    let mut jac = DMatrix::<f64>::zeros(n, n);
    if !system.analytic_jacobian(t_new, &y_pred, &mut jac) {
        finite_difference_jacobian(system, t_new, &y_pred, &mut jac, stats)?;
    }
    stats.jacobian_evaluations += 1;
    let newton_matrix = DMatrix::<f64>::identity(n, n) - &jac * (h * beta);
    let lu = newton_matrix.lu();

    let mut u = y_pred.clone();
    let mut f_u = StateVector::zeros(n);
    let mut converged = false;
    for _ in 0..MAX_NEWTON_ITERATIONS {
        system.rhs(t_new, &u, &mut f_u)?;
        stats.rhs_evaluations += 1;
        let residual = &u - &f_u * (h * beta) - &psi;
        let delta = match lu.solve(&residual) {
            Some(delta) => delta,
            None => return Ok(StepOutcome::CorrectorFailed),
        };
        u -= &delta;
        stats.newton_iterations += 1;
        if wrms_norm(&delta, y, options) < CORRECTOR_TOL {
            converged = true;
            break;
        }
    }
    if !converged {
        return Ok(StepOutcome::CorrectorFailed);
    }
    system.rhs(t_new, &u, &mut f_u)?;
    stats.rhs_evaluations += 1;

    let err = wrms_norm(&(&u - &y_pred), y, options) * err_coeff;
    if err <= 1.0 {
        Ok(StepOutcome::Accepted {
            y_new: u,
            f_new: f_u,
            err,
        })
    } else {
        Ok(StepOutcome::Rejected { err })
    }
}

/// Forward-difference Jacobian, one column per RHS evaluation.
fn finite_difference_jacobian<S: OdeSystem>(
    system: &S,
    t: f64,
    y: &StateVector,
    jac: &mut DMatrix<f64>,
    stats: &mut SolverStats,
) -> Result<(), ParcelError> {
    let n = y.len();
    let mut f0 = StateVector::zeros(n);
    system.rhs(t, y, &mut f0)?;
    stats.rhs_evaluations += 1;

    let sqrt_eps = f64::EPSILON.sqrt();
    let mut y_pert = y.clone();
    let mut f_pert = StateVector::zeros(n);
    for j in 0..n {
        let delta = sqrt_eps * (y[j].abs() + sqrt_eps);
        y_pert[j] = y[j] + delta;
        system.rhs(t, &y_pert, &mut f_pert)?;
        stats.rhs_evaluations += 1;
        for i in 0..n {
            jac[(i, j)] = (f_pert[i] - f0[i]) / delta;
        }
        y_pert[j] = y[j];
    }
    Ok(())
}
