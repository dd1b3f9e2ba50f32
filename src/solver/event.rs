//! Host-side event detection on dense output.
//!
//! Backends report accepted steps `(t, y, dy)`; when the monitored scalar
//! changes sign from positive to non-positive between two accepted steps,
//! the crossing time is refined by bisection on a cubic Hermite
//! reconstruction of the solution over that interval. This keeps the event
//! contract identical across backends, including those with no native
//! root-finding.

use super::OdeSystem;
use crate::state::StateVector;
use log::warn;

/// Scalar function of the state whose falling zero-crossing marks an event.
pub trait EventMonitor {
    /// Evaluate the monitored quantity at `(t, y)` with derivative `dydt`.
    fn value(&self, t: f64, y: &StateVector, dydt: &StateVector) -> f64;
}

/// What to do once the event fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventAction {
    /// Record the crossing and keep integrating to the end of the span.
    Record,
    /// Stop the run at the crossing.
    Halt,
}

/// An event request handed to the integrator.
pub struct EventSpec<'a> {
    pub monitor: &'a dyn EventMonitor,
    pub action: EventAction,
    /// Width, in seconds, to which the crossing time is refined.
    pub refine_tol: f64,
}

/// A located event: the refined crossing time and the interpolated state.
#[derive(Debug, Clone)]
pub struct DetectedEvent {
    pub t: f64,
    pub state: StateVector,
}

/// Cubic Hermite interpolation of the state over one accepted step.
pub(crate) fn hermite(
    t: f64,
    t0: f64,
    y0: &StateVector,
    f0: &StateVector,
    t1: f64,
    y1: &StateVector,
    f1: &StateVector,
) -> StateVector {
    let h = t1 - t0;
    let s = (t - t0) / h;
    let s2 = s * s;
    let s3 = s2 * s;
    let h00 = 2.0 * s3 - 3.0 * s2 + 1.0;
    let h10 = s3 - 2.0 * s2 + s;
    let h01 = -2.0 * s3 + 3.0 * s2;
    let h11 = s3 - s2;
    y0 * h00 + f0 * (h10 * h) + y1 * h01 + f1 * (h11 * h)
}

/// Check one accepted step for a falling crossing of the monitored scalar
/// and, if found, refine it by bisection.
///
/// Interpolated states are re-differentiated through the system so the
/// monitor always sees a consistent `(y, dy)` pair. If the system rejects
/// an interpolated state the bracket midpoint found so far is used.
pub(crate) fn locate<S: OdeSystem>(
    system: &S,
    spec: &EventSpec<'_>,
    t0: f64,
    y0: &StateVector,
    f0: &StateVector,
    t1: f64,
    y1: &StateVector,
    f1: &StateVector,
) -> Option<DetectedEvent> {
    let g0 = spec.monitor.value(t0, y0, f0);
    let g1 = spec.monitor.value(t1, y1, f1);
    if !(g0 > 0.0 && g1 <= 0.0) {
        return None;
    }

    let mut lo = t0;
    let mut hi = t1;
    let mut scratch = StateVector::zeros(y0.len());
    for _ in 0..64 {
        if hi - lo < spec.refine_tol {
            break;
        }
        let mid = 0.5 * (lo + hi);
        let ym = hermite(mid, t0, y0, f0, t1, y1, f1);
        if system.rhs(mid, &ym, &mut scratch).is_err() {
            warn!(
                "event refinement aborted at t = {}: interpolated state rejected",
                mid
            );
            break;
        }
        if spec.monitor.value(mid, &ym, &scratch) > 0.0 {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    let t_event = 0.5 * (lo + hi);
    Some(DetectedEvent {
        t: t_event,
        state: hermite(t_event, t0, y0, f0, t1, y1, f1),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ParcelResult;
    use is_close::is_close;

    /// Harmonic oscillator y'' = -y as a first-order system.
    struct Oscillator;

    impl OdeSystem for Oscillator {
        fn dim(&self) -> usize {
            2
        }

        fn rhs(&self, _t: f64, y: &StateVector, dydt: &mut StateVector) -> ParcelResult<()> {
            dydt[0] = y[1];
            dydt[1] = -y[0];
            Ok(())
        }
    }

    /// Fires when the first component passes its maximum (derivative falls
    /// through zero).
    struct PeakOfFirstComponent;

    impl EventMonitor for PeakOfFirstComponent {
        fn value(&self, _t: f64, _y: &StateVector, dydt: &StateVector) -> f64 {
            dydt[0]
        }
    }

    fn eval(system: &Oscillator, t: f64, y: &StateVector) -> StateVector {
        let mut f = StateVector::zeros(2);
        system.rhs(t, y, &mut f).unwrap();
        f
    }

    #[test]
    fn hermite_reproduces_endpoints() {
        let sys = Oscillator;
        let y0 = StateVector::from_vec(vec![0.0, 1.0]);
        let y1 = StateVector::from_vec(vec![(0.3f64).sin(), (0.3f64).cos()]);
        let f0 = eval(&sys, 0.0, &y0);
        let f1 = eval(&sys, 0.3, &y1);
        let at0 = hermite(0.0, 0.0, &y0, &f0, 0.3, &y1, &f1);
        let at1 = hermite(0.3, 0.0, &y0, &f0, 0.3, &y1, &f1);
        assert!((&at0 - &y0).amax() < 1e-14);
        assert!((&at1 - &y1).amax() < 1e-14);
    }

    #[test]
    fn locates_sine_peak() {
        // y(t) = sin(t) peaks at pi/2; bracket it with exact states on
        // either side and let the bisection find the crossing
        let sys = Oscillator;
        let spec = EventSpec {
            monitor: &PeakOfFirstComponent,
            action: EventAction::Record,
            refine_tol: 1e-10,
        };
        let (t0, t1) = (1.2_f64, 1.9_f64);
        let y0 = StateVector::from_vec(vec![t0.sin(), t0.cos()]);
        let y1 = StateVector::from_vec(vec![t1.sin(), t1.cos()]);
        let f0 = eval(&sys, t0, &y0);
        let f1 = eval(&sys, t1, &y1);

        let event = locate(&sys, &spec, t0, &y0, &f0, t1, &y1, &f1).unwrap();
        // the crossing is as accurate as cubic Hermite interpolation over a
        // 0.7 s bracket, not as the bisection tolerance
        assert!(
            is_close!(event.t, std::f64::consts::FRAC_PI_2, abs_tol = 1e-4),
            "event at t = {}",
            event.t
        );
        assert!((event.state[0] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn no_event_without_falling_crossing() {
        let sys = Oscillator;
        let spec = EventSpec {
            monitor: &PeakOfFirstComponent,
            action: EventAction::Record,
            refine_tol: 1e-10,
        };
        // rising segment of the sine: derivative stays positive
        let (t0, t1) = (0.1_f64, 0.8_f64);
        let y0 = StateVector::from_vec(vec![t0.sin(), t0.cos()]);
        let y1 = StateVector::from_vec(vec![t1.sin(), t1.cos()]);
        let f0 = eval(&sys, t0, &y0);
        let f1 = eval(&sys, t1, &y1);
        assert!(locate(&sys, &spec, t0, &y0, &f0, t1, &y1, &f1).is_none());
    }
}
