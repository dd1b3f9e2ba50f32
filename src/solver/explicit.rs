//! Explicit backends provided by the `ode_solvers` crate.
//!
//! `ode_solvers` steppers cannot propagate errors out of the RHS callback
//! and have no event interface, so both concerns are adapted here: kernel
//! failures are parked in a shared cell and re-raised after stepping, and
//! events are located host-side on the sampled output.

use super::event::{self, DetectedEvent, EventAction, EventSpec};
use super::{IntegrationFailure, OdeSystem, RawSolution, SolverOptions, SolverStats};
use crate::errors::{ParcelError, ParcelResult};
use crate::state::StateVector;
use log::warn;
use ode_solvers::dop_shared::IntegrationError;
use ode_solvers::dopri5::Dopri5;
use ode_solvers::rk4::Rk4;
use std::cell::RefCell;
use std::rc::Rc;

/// Bridges [`OdeSystem`] to the `ode_solvers::System` contract.
///
/// The stepper takes the system by value, so the failure slot is shared
/// through an `Rc` kept by the caller. After the first RHS failure the
/// derivative is zeroed; the run is abandoned as soon as the stepper
/// returns.
struct SystemAdapter<'a, S: OdeSystem> {
    inner: &'a S,
    failure: Rc<RefCell<Option<ParcelError>>>,
}

impl<S: OdeSystem> ode_solvers::System<f64, StateVector> for SystemAdapter<'_, S> {
    fn system(&self, t: f64, y: &StateVector, dydt: &mut StateVector) {
        if self.failure.borrow().is_some() {
            dydt.fill(0.0);
            return;
        }
        if let Err(e) = self.inner.rhs(t, y, dydt) {
            *self.failure.borrow_mut() = Some(e);
            dydt.fill(0.0);
        }
    }
}

pub(super) fn integrate_dopri5<S: OdeSystem>(
    system: &S,
    y0: &StateVector,
    t_span: (f64, f64),
    options: &SolverOptions,
    event: Option<&EventSpec<'_>>,
) -> Result<RawSolution, IntegrationFailure> {
    let failure = Rc::new(RefCell::new(None));
    let adapter = SystemAdapter {
        inner: system,
        failure: Rc::clone(&failure),
    };
    let mut stepper = Dopri5::new(
        adapter,
        t_span.0,
        t_span.1,
        options.output_step,
        y0.clone(),
        options.rtol,
        options.atol,
    );
    let outcome = stepper.integrate();

    let (times, states) = collect(stepper.results().get());
    finish(system, event, times, states, t_span.1, outcome, &failure)
}

pub(super) fn integrate_rk4<S: OdeSystem>(
    system: &S,
    y0: &StateVector,
    t_span: (f64, f64),
    options: &SolverOptions,
    event: Option<&EventSpec<'_>>,
) -> Result<RawSolution, IntegrationFailure> {
    let failure = Rc::new(RefCell::new(None));
    let adapter = SystemAdapter {
        inner: system,
        failure: Rc::clone(&failure),
    };
    // fixed-step method: the output step doubles as the integration step
    let mut stepper = Rk4::new(adapter, t_span.0, y0.clone(), t_span.1, options.output_step);
    let outcome = stepper.integrate();

    let (times, states) = collect(stepper.results().get());
    finish(system, event, times, states, t_span.1, outcome, &failure)
}

fn collect(results: (&Vec<f64>, &Vec<StateVector>)) -> (Vec<f64>, Vec<StateVector>) {
    (results.0.clone(), results.1.clone())
}

fn finish<S: OdeSystem>(
    system: &S,
    event: Option<&EventSpec<'_>>,
    mut times: Vec<f64>,
    mut states: Vec<StateVector>,
    t_end: f64,
    outcome: Result<ode_solvers::dop_shared::Stats, IntegrationError>,
    failure: &Rc<RefCell<Option<ParcelError>>>,
) -> Result<RawSolution, IntegrationFailure> {
    let mut stats = SolverStats::default();
    let last_t = times.last().copied().unwrap_or(f64::NAN);

    // a kernel error takes precedence over whatever the stepper reports,
    // since the zeroed derivatives it saw afterwards are meaningless
    if let Some(error) = failure.borrow_mut().take() {
        let cutoff = match &error {
            ParcelError::NonPhysicalState { t, .. } => *t,
            _ => last_t,
        };
        let keep = times.iter().take_while(|t| **t < cutoff).count();
        times.truncate(keep);
        states.truncate(keep);
        return Err(IntegrationFailure {
            error,
            partial: RawSolution {
                times,
                states,
                stats,
                event: None,
            },
        });
    }

    match outcome {
        Ok(s) => {
            stats.rhs_evaluations = s.num_eval as usize;
            stats.accepted_steps = s.accepted_steps as usize;
            stats.rejected_steps = s.rejected_steps as usize;
        }
        Err(e) => {
            let error = match e {
                IntegrationError::MaxNumStepReached { .. } => ParcelError::ConvergenceFailure {
                    t: last_t,
                    detail: "maximum number of steps reached".to_string(),
                },
                IntegrationError::StepSizeUnderflow { .. } => ParcelError::StepSizeUnderflow {
                    t: last_t,
                    h: 0.0,
                },
                IntegrationError::StiffnessDetected { .. } => ParcelError::ConvergenceFailure {
                    t: last_t,
                    detail: "stiffness detected; use the bdf or adams_bdf backend".to_string(),
                },
            };
            return Err(IntegrationFailure {
                error,
                partial: RawSolution {
                    times,
                    states,
                    stats,
                    event: None,
                },
            });
        }
    }

    if let Err(error) = extend_to_end(system, &mut times, &mut states, t_end) {
        return Err(IntegrationFailure {
            error,
            partial: RawSolution {
                times,
                states,
                stats,
                event: None,
            },
        });
    }

    let detected = match event {
        Some(spec) => scan_for_event(system, spec, &mut times, &mut states),
        None => None,
    };

    Ok(RawSolution {
        times,
        states,
        stats,
        event: detected,
    })
}

/// The steppers emit samples at `x0 + n * dx`; when `dx` does not divide the
/// span the terminal state never appears in the output. The endpoint is
/// recovered by re-integrating the short remaining gap with fixed
/// Runge-Kutta substeps.
fn extend_to_end<S: OdeSystem>(
    system: &S,
    times: &mut Vec<f64>,
    states: &mut Vec<StateVector>,
    t_end: f64,
) -> ParcelResult<()> {
    let (last_t, last_y) = match (times.last(), states.last()) {
        (Some(t), Some(y)) => (*t, y.clone()),
        _ => return Ok(()),
    };
    let gap = t_end - last_t;
    if gap <= 1e-12 * t_end.abs().max(1.0) {
        return Ok(());
    }

    const SUBSTEPS: usize = 32;
    let h = gap / SUBSTEPS as f64;
    let n = last_y.len();
    let mut y = last_y;
    let mut k1 = StateVector::zeros(n);
    let mut k2 = StateVector::zeros(n);
    let mut k3 = StateVector::zeros(n);
    let mut k4 = StateVector::zeros(n);
    for i in 0..SUBSTEPS {
        let t = last_t + i as f64 * h;
        system.rhs(t, &y, &mut k1)?;
        let y2 = &y + &k1 * (0.5 * h);
        system.rhs(t + 0.5 * h, &y2, &mut k2)?;
        let y3 = &y + &k2 * (0.5 * h);
        system.rhs(t + 0.5 * h, &y3, &mut k3)?;
        let y4 = &y + &k3 * h;
        system.rhs(t + h, &y4, &mut k4)?;
        y += (&k1 + &k2 * 2.0 + &k3 * 2.0 + &k4) * (h / 6.0);
    }
    times.push(t_end);
    states.push(y);
    Ok(())
}

/// Post-hoc event pass over the sampled output. On `Halt` the solution is
/// truncated at the crossing.
fn scan_for_event<S: OdeSystem>(
    system: &S,
    spec: &EventSpec<'_>,
    times: &mut Vec<f64>,
    states: &mut Vec<StateVector>,
) -> Option<DetectedEvent> {
    if times.len() < 2 {
        return None;
    }
    let n = system.dim();
    let mut f_prev = StateVector::zeros(n);
    let mut f_next = StateVector::zeros(n);
    if system.rhs(times[0], &states[0], &mut f_prev).is_err() {
        warn!("event scan skipped: derivative unavailable at the first sample");
        return None;
    }
    for i in 1..times.len() {
        if system.rhs(times[i], &states[i], &mut f_next).is_err() {
            warn!("event scan stopped at t = {}", times[i]);
            return None;
        }
        if let Some(found) = event::locate(
            system,
            spec,
            times[i - 1],
            &states[i - 1],
            &f_prev,
            times[i],
            &states[i],
            &f_next,
        ) {
            if spec.action == EventAction::Halt {
                times.truncate(i);
                states.truncate(i);
                times.push(found.t);
                states.push(found.state.clone());
            }
            return Some(found);
        }
        std::mem::swap(&mut f_prev, &mut f_next);
    }
    None
}
