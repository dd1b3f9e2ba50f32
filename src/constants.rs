//! Physical constants used throughout the model.
//!
//! Everything in this crate is strict SI (Pa, K, kg, m, s, mol). Mixing unit
//! systems is a configuration error, so the constants are defined once here
//! and threaded through explicitly rather than read from any mutable state.

/// Gravitational acceleration
/// unit: m s^-2
pub const G: f64 = 9.81;

/// Specific heat of dry air at constant pressure
/// unit: J kg^-1 K^-1
pub const CP_AIR: f64 = 1004.5;

/// Density of liquid water
/// unit: kg m^-3
pub const RHO_WATER: f64 = 1000.0;

/// Universal gas constant
/// unit: J mol^-1 K^-1
pub const R_GAS: f64 = 8.314462;

/// Specific gas constant of dry air
/// unit: J kg^-1 K^-1
pub const R_DRY_AIR: f64 = 287.05;

/// Molecular weight of water
/// unit: kg mol^-1
pub const MW_WATER: f64 = 18.0153e-3;

/// Molecular weight of dry air
/// unit: kg mol^-1
pub const MW_AIR: f64 = 28.9644e-3;

/// Ratio of the molecular weights of water vapor and dry air
pub const EPSILON: f64 = MW_WATER / MW_AIR;

/// 0 degrees Celsius
/// unit: K
pub const ZERO_CELSIUS: f64 = 273.15;

/// Standard surface pressure
/// unit: Pa
pub const P_STANDARD: f64 = 101325.0;
