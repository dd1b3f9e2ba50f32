//! The condensation kernel: right-hand side of the parcel ODE system.
//!
//! This is the hot path. Every solver backend calls [`CondensationKernel::rhs`]
//! thousands of times per run, including on speculative trial states that are
//! later rejected, so the kernel is pure, allocation-free per call and keeps
//! the aerosol description in flattened parallel arrays.

use crate::aerosol::AerosolPopulation;
use crate::constants::{CP_AIR, G, MW_AIR, MW_WATER, R_GAS, RHO_WATER};
use crate::errors::{ParcelError, ParcelResult};
use crate::kohler::equilibrium_supersaturation;
use crate::solver::{EventMonitor, OdeSystem};
use crate::state::{
    StateVector, StateView, IDX_ALTITUDE, IDX_LIQUID, IDX_PRESSURE, IDX_SUPERSATURATION,
    IDX_TEMPERATURE, IDX_VAPOR, N_METEO,
};
use crate::thermo::{
    hydrostatic_pressure_tendency, latent_heat, moist_air_density, saturation_vapor_pressure,
    thermal_conductivity_corrected, vapor_diffusivity_corrected,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Updraft velocity forcing, either fixed or a piecewise-linear function of
/// time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdraftProfile {
    /// Constant updraft speed, m/s.
    Constant { speed: f64 },
    /// Piecewise-linear `(time, speed)` table, held at the end values
    /// outside the tabulated span.
    Profile { points: Vec<(f64, f64)> },
}

impl UpdraftProfile {
    pub fn constant(speed: f64) -> Self {
        Self::Constant { speed }
    }

    /// Updraft speed at time `t`, m/s.
    pub fn speed_at(&self, t: f64) -> f64 {
        match self {
            UpdraftProfile::Constant { speed } => *speed,
            UpdraftProfile::Profile { points } => {
                match points.iter().position(|(tp, _)| *tp >= t) {
                    // before or at the first knot
                    Some(0) => points[0].1,
                    Some(i) => {
                        let (t0, w0) = points[i - 1];
                        let (t1, w1) = points[i];
                        w0 + (w1 - w0) * (t - t0) / (t1 - t0)
                    }
                    // beyond the last knot
                    None => points[points.len() - 1].1,
                }
            }
        }
    }

    pub(crate) fn validate(&self) -> ParcelResult<()> {
        match self {
            UpdraftProfile::Constant { speed } => {
                if !speed.is_finite() {
                    return Err(ParcelError::Configuration(format!(
                        "updraft speed must be finite, got {}",
                        speed
                    )));
                }
            }
            UpdraftProfile::Profile { points } => {
                if points.is_empty() {
                    return Err(ParcelError::Configuration(
                        "updraft profile needs at least one point".to_string(),
                    ));
                }
                for window in points.windows(2) {
                    if window[1].0 <= window[0].0 {
                        return Err(ParcelError::Configuration(format!(
                            "updraft profile times must be strictly increasing ({} then {})",
                            window[0].0, window[1].0
                        )));
                    }
                }
                if points.iter().any(|(t, w)| !t.is_finite() || !w.is_finite()) {
                    return Err(ParcelError::Configuration(
                        "updraft profile entries must be finite".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Immutable physical parameters of the kernel. Everything the RHS needs
/// beyond the state vector is threaded through here, never through globals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelParams {
    /// Mass (condensation) accommodation coefficient, dimensionless.
    pub accommodation_coefficient: f64,
    /// Thermal accommodation coefficient, dimensionless.
    pub thermal_accommodation: f64,
    /// Updraft forcing.
    pub updraft: UpdraftProfile,
}

impl Default for KernelParams {
    fn default() -> Self {
        Self {
            accommodation_coefficient: 1.0,
            thermal_accommodation: 0.96,
            updraft: UpdraftProfile::constant(1.0),
        }
    }
}

impl KernelParams {
    pub(crate) fn validate(&self) -> ParcelResult<()> {
        for (name, value) in [
            ("accommodation coefficient", self.accommodation_coefficient),
            ("thermal accommodation", self.thermal_accommodation),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ParcelError::Configuration(format!(
                    "{} must lie in (0, 1], got {}",
                    name, value
                )));
            }
        }
        self.updraft.validate()
    }
}

/// The parcel RHS: adiabatic ascent plus per-bin diffusional droplet growth.
///
/// The population is shared read-only; the flattened per-bin arrays are
/// precomputed once so the hot loop touches contiguous memory.
#[derive(Debug, Clone)]
pub struct CondensationKernel {
    params: KernelParams,
    population: Arc<AerosolPopulation>,
    dry_radii: Vec<f64>,
    kappas: Vec<f64>,
    numbers: Vec<f64>,
}

impl CondensationKernel {
    pub fn new(population: Arc<AerosolPopulation>, params: KernelParams) -> ParcelResult<Self> {
        params.validate()?;
        let n = population.n_bins();
        let mut dry_radii = Vec::with_capacity(n);
        let mut kappas = Vec::with_capacity(n);
        let mut numbers = Vec::with_capacity(n);
        for (species, bin) in population.iter_bins() {
            dry_radii.push(bin.dry_radius);
            kappas.push(species.kappa);
            numbers.push(bin.number);
        }
        Ok(Self {
            params,
            population,
            dry_radii,
            kappas,
            numbers,
        })
    }

    pub fn population(&self) -> &Arc<AerosolPopulation> {
        &self.population
    }

    pub fn params(&self) -> &KernelParams {
        &self.params
    }

    /// Defensive checks on the incoming state. Non-finite components and
    /// meteorological values far outside the physical envelope are fatal.
    /// Wet radii are exempt: adaptive steppers probe trial states that can
    /// undershoot the dry core, and the growth law answers those with a
    /// corrective derivative rather than an error.
    fn check_state(&self, t: f64, y: &StateVector) -> ParcelResult<()> {
        if y.iter().any(|v| !v.is_finite()) {
            return Err(ParcelError::NonPhysicalState {
                t,
                detail: "non-finite component in the state vector".to_string(),
            });
        }
        let temperature = y[IDX_TEMPERATURE];
        if !(100.0..400.0).contains(&temperature) {
            return Err(ParcelError::NonPhysicalState {
                t,
                detail: format!("temperature {} K outside (100, 400) K", temperature),
            });
        }
        let s = y[IDX_SUPERSATURATION];
        if !(-1.0..1.0).contains(&s) {
            return Err(ParcelError::NonPhysicalState {
                t,
                detail: format!("supersaturation {} outside (-1, 1)", s),
            });
        }
        Ok(())
    }
}

impl OdeSystem for CondensationKernel {
    fn dim(&self) -> usize {
        N_METEO + self.dry_radii.len()
    }

    fn rhs(&self, t: f64, y: &StateVector, dydt: &mut StateVector) -> ParcelResult<()> {
        self.check_state(t, y)?;
        let view = StateView::from_vector(y);
        let pressure = view.pressure();
        let temperature = view.temperature();
        let wv = view.vapor_mixing_ratio();
        let s = view.supersaturation();

        let w = self.params.updraft.speed_at(t);
        let air_density = moist_air_density(pressure, temperature, wv);
        let pv_sat = saturation_vapor_pressure(temperature);
        let lv = latent_heat(temperature);

        // per-bin diffusional growth and the summed condensed-water flux
        let mut dwc_dt = 0.0;
        for (i, r) in view.wet_radii().iter().enumerate() {
            let r_dry = self.dry_radii[i];
            // predictor overshoot can drive a trial radius below the dry
            // core; the growth law is evaluated at the core itself, giving
            // a bounded derivative that pushes the radius back up
            let r = (*r).max(r_dry);

            let dv = vapor_diffusivity_corrected(
                temperature,
                pressure,
                r,
                self.params.accommodation_coefficient,
            );
            let ka = thermal_conductivity_corrected(
                temperature,
                r,
                air_density,
                self.params.thermal_accommodation,
            );
            // inverse growth coefficient: vapor diffusion plus heat
            // conduction resistances in series
            let g_inv = RHO_WATER * R_GAS * temperature / (pv_sat * dv * MW_WATER)
                + lv * RHO_WATER * (lv * MW_WATER / (R_GAS * temperature) - 1.0)
                / (ka * temperature);

            let s_eq = equilibrium_supersaturation(r, r_dry, temperature, self.kappas[i]);
            let mut dr_dt = (s - s_eq) / (g_inv * r);
            // evaporation stops at the dry core
            if dr_dt < 0.0 && r <= r_dry {
                dr_dt = 0.0;
            }
            dydt[N_METEO + i] = dr_dt;

            dwc_dt += self.numbers[i] * r * r * dr_dt;
        }
        dwc_dt *= 4.0 * std::f64::consts::PI * RHO_WATER / air_density;
        let dwv_dt = -dwc_dt;

        let dt_dt = -G * w / CP_AIR - lv * dwv_dt / CP_AIR;

        // adiabatic production vs condensational depletion of supersaturation
        let alpha = G * MW_WATER * lv / (CP_AIR * R_GAS * temperature * temperature)
            - G * MW_AIR / (R_GAS * temperature);
        let gamma = pressure * MW_AIR / (MW_WATER * pv_sat)
            + MW_WATER * lv * lv / (CP_AIR * R_GAS * temperature * temperature);

        dydt[IDX_ALTITUDE] = w;
        dydt[IDX_PRESSURE] = hydrostatic_pressure_tendency(pressure, temperature, wv, w);
        dydt[IDX_TEMPERATURE] = dt_dt;
        dydt[IDX_VAPOR] = dwv_dt;
        dydt[IDX_LIQUID] = dwc_dt;
        dydt[IDX_SUPERSATURATION] = alpha * w - gamma * dwc_dt;
        Ok(())
    }
}

/// Fires when the supersaturation tendency falls through zero, i.e. at the
/// supersaturation maximum.
pub struct SupersaturationPeak;

impl EventMonitor for SupersaturationPeak {
    fn value(&self, _t: f64, _y: &StateVector, dydt: &StateVector) -> f64 {
        dydt[IDX_SUPERSATURATION]
    }
}
