//! Thermodynamic helper functions.
//!
//! Pure, stateless mappings from the evolving parcel state (pressure,
//! temperature, vapor content) to derived atmospheric quantities. Stiff
//! solvers probe trial states that are later rejected, so every function here
//! must be safe to call an unbounded number of times with arbitrary inputs
//! and can have no side effects.

use crate::constants::*;

/// Saturation vapor pressure over a plane water surface.
///
/// Bolton (1980) empirical fit, accurate to 0.1% between -30 and +35 C.
///
/// unit: Pa
pub fn saturation_vapor_pressure(temperature: f64) -> f64 {
    let t_c = temperature - ZERO_CELSIUS;
    611.2 * (17.67 * t_c / (t_c + 243.5)).exp()
}

/// Latent heat of vaporization of water, linear fit around 0 C.
///
/// unit: J kg^-1
pub fn latent_heat(temperature: f64) -> f64 {
    let t_c = temperature - ZERO_CELSIUS;
    (2501.0 - 2.37 * t_c) * 1e3
}

/// Surface tension of a water-air interface.
///
/// unit: J m^-2
pub fn surface_tension_water(temperature: f64) -> f64 {
    let t_c = temperature - ZERO_CELSIUS;
    0.0761 - 1.55e-4 * t_c
}

/// Thermal conductivity of dry air (continuum value).
///
/// unit: W m^-1 K^-1
pub fn thermal_conductivity_air(temperature: f64) -> f64 {
    1e-3 * (4.39 + 0.071 * temperature)
}

/// Thermal conductivity of air corrected for non-continuum effects near a
/// droplet of radius `radius`, given the thermal accommodation coefficient.
///
/// unit: W m^-1 K^-1
pub fn thermal_conductivity_corrected(
    temperature: f64,
    radius: f64,
    air_density: f64,
    thermal_accommodation: f64,
) -> f64 {
    let ka = thermal_conductivity_air(temperature);
    let denom = 1.0
        + (ka / (thermal_accommodation * radius * air_density * CP_AIR))
            * (2.0 * std::f64::consts::PI * MW_AIR / (R_GAS * temperature)).sqrt();
    ka / denom
}

/// Diffusivity of water vapor in air (continuum value).
///
/// Hall & Pruppacher (1976) fit.
///
/// unit: m^2 s^-1
pub fn vapor_diffusivity(temperature: f64, pressure: f64) -> f64 {
    1e-4 * 0.211 * (temperature / ZERO_CELSIUS).powf(1.94) * (P_STANDARD / pressure)
}

/// Vapor diffusivity corrected for non-continuum effects near a droplet of
/// radius `radius`, given the mass accommodation coefficient.
///
/// unit: m^2 s^-1
pub fn vapor_diffusivity_corrected(
    temperature: f64,
    pressure: f64,
    radius: f64,
    accommodation: f64,
) -> f64 {
    let dv = vapor_diffusivity(temperature, pressure);
    let denom = 1.0
        + (dv / (accommodation * radius))
            * (2.0 * std::f64::consts::PI * MW_WATER / (R_GAS * temperature)).sqrt();
    dv / denom
}

/// Virtual temperature of moist air with vapor mixing ratio `wv`.
///
/// unit: K
pub fn virtual_temperature(temperature: f64, wv: f64) -> f64 {
    temperature * (1.0 + 0.608 * wv)
}

/// Density of moist air.
///
/// unit: kg m^-3
pub fn moist_air_density(pressure: f64, temperature: f64, wv: f64) -> f64 {
    pressure / (R_DRY_AIR * virtual_temperature(temperature, wv))
}

/// Hydrostatic pressure tendency for a parcel rising at `w`.
///
/// dP/dt = -rho g w
///
/// unit: Pa s^-1
pub fn hydrostatic_pressure_tendency(pressure: f64, temperature: f64, wv: f64, w: f64) -> f64 {
    -moist_air_density(pressure, temperature, wv) * G * w
}

#[cfg(test)]
mod tests {
    use super::*;
    use is_close::is_close;

    #[test]
    fn saturation_pressure_at_freezing() {
        assert!(is_close!(saturation_vapor_pressure(ZERO_CELSIUS), 611.2));
    }

    #[test]
    fn saturation_pressure_increases_with_temperature() {
        let mut last = saturation_vapor_pressure(250.0);
        for t in 251..320 {
            let es = saturation_vapor_pressure(t as f64);
            assert!(es > last, "es not monotone at T = {}", t);
            last = es;
        }
    }

    #[test]
    fn latent_heat_at_freezing() {
        assert!(is_close!(latent_heat(ZERO_CELSIUS), 2.501e6));
    }

    #[test]
    fn standard_air_density() {
        // ISA surface conditions, dry air
        let rho = moist_air_density(P_STANDARD, 288.15, 0.0);
        assert!((rho - 1.225).abs() < 0.01, "rho = {}", rho);
    }

    #[test]
    fn moist_air_is_lighter() {
        let dry = moist_air_density(P_STANDARD, 288.15, 0.0);
        let moist = moist_air_density(P_STANDARD, 288.15, 0.01);
        assert!(moist < dry);
    }

    #[test]
    fn non_continuum_corrections_reduce_transport() {
        let t = 280.0;
        let p = 80_000.0;
        let rho = moist_air_density(p, t, 0.0);
        for r in [5e-8, 1e-7, 1e-6, 1e-5] {
            let dv = vapor_diffusivity_corrected(t, p, r, 1.0);
            assert!(dv < vapor_diffusivity(t, p));
            let ka = thermal_conductivity_corrected(t, r, rho, 0.96);
            assert!(ka < thermal_conductivity_air(t));
        }
        // corrections vanish for large droplets
        let dv_large = vapor_diffusivity_corrected(t, p, 1e-3, 1.0);
        assert!(is_close!(dv_large, vapor_diffusivity(t, p), rel_tol = 1e-2));
    }

    #[test]
    fn hydrostatic_tendency_sign_follows_updraft() {
        assert!(hydrostatic_pressure_tendency(P_STANDARD, 288.15, 0.0, 1.0) < 0.0);
        assert!(hydrostatic_pressure_tendency(P_STANDARD, 288.15, 0.0, -1.0) > 0.0);
        assert_eq!(hydrostatic_pressure_tendency(P_STANDARD, 288.15, 0.0, 0.0), 0.0);
    }
}
