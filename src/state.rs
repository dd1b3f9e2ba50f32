//! Layout of the ODE state vector and read-only views over it.
//!
//! The state vector is `[z, P, T, wv, wc, S, r_0 .. r_{n-1}]` where the
//! trailing block holds one wet radius per aerosol bin in flattened
//! population order. The same layout is used by the kernel, the solver
//! backends and the trajectory, so the indices live here and nowhere else.

use nalgebra::DVector;

/// Parcel altitude above the starting level, m.
pub const IDX_ALTITUDE: usize = 0;
/// Ambient pressure, Pa.
pub const IDX_PRESSURE: usize = 1;
/// Parcel temperature, K.
pub const IDX_TEMPERATURE: usize = 2;
/// Water vapor mixing ratio, kg/kg.
pub const IDX_VAPOR: usize = 3;
/// Condensed liquid water mixing ratio, kg/kg.
pub const IDX_LIQUID: usize = 4;
/// Supersaturation (fractional, 0 = saturation).
pub const IDX_SUPERSATURATION: usize = 5;
/// Number of meteorological components ahead of the wet-radius block.
pub const N_METEO: usize = 6;

/// The ODE state vector type shared by all solver backends.
pub type StateVector = DVector<f64>;

/// Borrowed, read-only view of one parcel state snapshot.
///
/// Works over any contiguous slice in state-vector layout, so it can wrap
/// both live `StateVector`s and rows of a stored trajectory.
#[derive(Debug, Clone, Copy)]
pub struct StateView<'a> {
    y: &'a [f64],
}

impl<'a> StateView<'a> {
    pub fn new(y: &'a [f64]) -> Self {
        debug_assert!(y.len() >= N_METEO);
        Self { y }
    }

    pub fn from_vector(y: &'a StateVector) -> Self {
        Self::new(y.as_slice())
    }

    pub fn altitude(&self) -> f64 {
        self.y[IDX_ALTITUDE]
    }

    pub fn pressure(&self) -> f64 {
        self.y[IDX_PRESSURE]
    }

    pub fn temperature(&self) -> f64 {
        self.y[IDX_TEMPERATURE]
    }

    pub fn vapor_mixing_ratio(&self) -> f64 {
        self.y[IDX_VAPOR]
    }

    pub fn liquid_mixing_ratio(&self) -> f64 {
        self.y[IDX_LIQUID]
    }

    pub fn supersaturation(&self) -> f64 {
        self.y[IDX_SUPERSATURATION]
    }

    /// Total water mixing ratio (vapor + condensed), the conserved quantity.
    pub fn total_water(&self) -> f64 {
        self.vapor_mixing_ratio() + self.liquid_mixing_ratio()
    }

    pub fn n_bins(&self) -> usize {
        self.y.len() - N_METEO
    }

    pub fn wet_radius(&self, bin: usize) -> f64 {
        self.y[N_METEO + bin]
    }

    pub fn wet_radii(&self) -> &'a [f64] {
        &self.y[N_METEO..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use is_close::is_close;

    #[test]
    fn view_accessors_follow_layout() {
        let y = StateVector::from_vec(vec![10.0, 8e4, 280.0, 5e-3, 1e-6, 1e-3, 1e-7, 2e-7]);
        let view = StateView::from_vector(&y);
        assert_eq!(view.altitude(), 10.0);
        assert_eq!(view.pressure(), 8e4);
        assert_eq!(view.temperature(), 280.0);
        assert_eq!(view.supersaturation(), 1e-3);
        assert_eq!(view.n_bins(), 2);
        assert_eq!(view.wet_radius(0), 1e-7);
        assert_eq!(view.wet_radii(), &[1e-7, 2e-7]);
        assert!(is_close!(view.total_water(), 5.001e-3));
    }
}
