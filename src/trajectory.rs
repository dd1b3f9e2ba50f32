//! Immutable storage of an integration's sampled output.
//!
//! The solver backends hand over `Vec`s of accepted states; here they are
//! packed into contiguous `ndarray` storage (one row per sample, columns in
//! state-vector layout) for cheap column extraction and snapshot views.
//! Partial trajectories from failed runs use the same container.

use crate::solver::{DetectedEvent, RawSolution, SolverStats};
use crate::state::{StateView, IDX_ALTITUDE, IDX_PRESSURE, IDX_SUPERSATURATION, IDX_TEMPERATURE, N_METEO};
use ndarray::{Array1, Array2, ArrayView1};

#[derive(Debug, Clone)]
pub struct Trajectory {
    times: Array1<f64>,
    /// One row per sample, `N_METEO + n_bins` columns.
    states: Array2<f64>,
    stats: SolverStats,
    event: Option<DetectedEvent>,
    complete: bool,
}

impl Trajectory {
    pub(crate) fn from_raw(raw: RawSolution, complete: bool) -> Self {
        let n_samples = raw.times.len();
        let n_vars = raw.states.first().map_or(0, |y| y.len());
        let mut states = Array2::zeros((n_samples, n_vars));
        for (i, y) in raw.states.iter().enumerate() {
            for (j, v) in y.iter().enumerate() {
                states[(i, j)] = *v;
            }
        }
        Self {
            times: Array1::from_vec(raw.times),
            states,
            stats: raw.stats,
            event: raw.event,
            complete,
        }
    }

    /// Number of stored samples.
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Whether the run reached the end of its time span.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn times(&self) -> &Array1<f64> {
        &self.times
    }

    pub fn states(&self) -> &Array2<f64> {
        &self.states
    }

    pub fn stats(&self) -> &SolverStats {
        &self.stats
    }

    pub fn event(&self) -> Option<&DetectedEvent> {
        self.event.as_ref()
    }

    /// Snapshot view of sample `index`.
    pub fn state_at(&self, index: usize) -> StateView<'_> {
        let n_vars = self.states.ncols();
        let flat = self
            .states
            .as_slice()
            .expect("trajectory storage is standard layout");
        StateView::new(&flat[index * n_vars..(index + 1) * n_vars])
    }

    /// Series of one state-vector component across all samples.
    pub fn column(&self, index: usize) -> ArrayView1<'_, f64> {
        self.states.column(index)
    }

    pub fn altitude_series(&self) -> ArrayView1<'_, f64> {
        self.column(IDX_ALTITUDE)
    }

    pub fn pressure_series(&self) -> ArrayView1<'_, f64> {
        self.column(IDX_PRESSURE)
    }

    pub fn temperature_series(&self) -> ArrayView1<'_, f64> {
        self.column(IDX_TEMPERATURE)
    }

    pub fn supersaturation_series(&self) -> ArrayView1<'_, f64> {
        self.column(IDX_SUPERSATURATION)
    }

    /// Wet-radius series of one aerosol bin (flattened population order).
    pub fn wet_radius_series(&self, bin: usize) -> ArrayView1<'_, f64> {
        self.column(N_METEO + bin)
    }

    /// The supersaturation maximum and the time it occurred, `(t, s_max)`.
    ///
    /// When the run detected the dS/dt zero crossing the event-refined value
    /// is used; otherwise the stored samples are scanned, which is accurate
    /// to the output resolution only.
    pub fn max_supersaturation(&self) -> Option<(f64, f64)> {
        if let Some(event) = &self.event {
            return Some((event.t, event.state[IDX_SUPERSATURATION]));
        }
        // an empty partial trajectory has a 0x0 state array; column
        // extraction on it is out of bounds
        if self.is_empty() {
            return None;
        }
        let series = self.supersaturation_series();
        let mut best: Option<(f64, f64)> = None;
        for (i, s) in series.iter().enumerate() {
            if best.map_or(true, |(_, sb)| *s > sb) {
                best = Some((self.times[i], *s));
            }
        }
        best
    }

    /// Largest relative drift of total water (vapor + condensed) from its
    /// initial value, the conservation diagnostic.
    pub fn total_water_drift(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        let initial = self.state_at(0).total_water();
        let mut worst = 0.0f64;
        for i in 1..self.len() {
            let drift = (self.state_at(i).total_water() - initial).abs();
            worst = worst.max(drift);
        }
        Some(worst / initial.abs().max(f64::MIN_POSITIVE))
    }
}
