//! Structured, serde-consumable run configuration.
//!
//! The crate consumes an already-deserialized description; parsing files
//! into these structs (and choosing the format) is the caller's business.
//! All validation is eager: a [`ParcelConfig`] that builds a model cleanly
//! will not produce configuration errors mid-run.

use crate::aerosol::{AerosolBin, AerosolMode, AerosolSpecies, Lognorm};
use crate::errors::{ParcelError, ParcelResult};
use crate::kernel::KernelParams;
use crate::solver::{SolverBackend, SolverOptions};
use serde::{Deserialize, Serialize};

/// Complete description of one parcel-model setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParcelConfig {
    /// Aerosol modes; an empty list is the particle-free degenerate case.
    #[serde(default)]
    pub aerosol: Vec<AerosolModeConfig>,
    pub environment: EnvironmentConfig,
    #[serde(default)]
    pub kernel: KernelParams,
    #[serde(default)]
    pub solver: SolverConfig,
}

/// One aerosol mode: a species plus how its size distribution is given.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AerosolModeConfig {
    pub species: AerosolSpecies,
    pub distribution: DistributionConfig,
}

impl AerosolModeConfig {
    pub fn build(&self) -> ParcelResult<AerosolMode> {
        let bins = match &self.distribution {
            DistributionConfig::Bins { bins } => bins
                .iter()
                .map(|b| AerosolBin {
                    dry_radius: b.dry_radius,
                    number: b.number,
                })
                .collect(),
            DistributionConfig::Lognormal {
                mean_radius,
                geo_std_dev,
                number,
                n_bins,
            } => Lognorm {
                mean_radius: *mean_radius,
                geo_std_dev: *geo_std_dev,
                number: *number,
            }
            .to_bins(*n_bins)?,
        };
        AerosolMode::new(self.species.clone(), bins)
    }
}

/// Size distribution of a mode: explicit bins or a lognormal to discretize.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionConfig {
    Bins {
        bins: Vec<BinConfig>,
    },
    Lognormal {
        /// Geometric mean (median) radius, m.
        mean_radius: f64,
        /// Geometric standard deviation, dimensionless.
        geo_std_dev: f64,
        /// Total number concentration, m^-3.
        number: f64,
        #[serde(default = "default_bin_count")]
        n_bins: usize,
    },
}

fn default_bin_count() -> usize {
    50
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BinConfig {
    /// Dry radius, m.
    pub dry_radius: f64,
    /// Number concentration, m^-3.
    pub number: f64,
}

/// Initial thermodynamic environment of the parcel.
///
/// Moisture is given either as a fractional supersaturation or as a
/// relative humidity (RH 1.0 = saturation); exactly one of the two.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Initial pressure, Pa.
    pub pressure: f64,
    /// Initial temperature, K.
    pub temperature: f64,
    #[serde(default)]
    pub supersaturation: Option<f64>,
    #[serde(default)]
    pub relative_humidity: Option<f64>,
}

impl EnvironmentConfig {
    /// The initial fractional supersaturation, however it was specified.
    pub fn initial_supersaturation(&self) -> ParcelResult<f64> {
        match (self.supersaturation, self.relative_humidity) {
            (Some(s), None) => Ok(s),
            (None, Some(rh)) => Ok(rh - 1.0),
            (Some(_), Some(_)) => Err(ParcelError::Configuration(
                "give either supersaturation or relative_humidity, not both".to_string(),
            )),
            (None, None) => Err(ParcelError::Configuration(
                "one of supersaturation or relative_humidity is required".to_string(),
            )),
        }
    }

    pub(crate) fn validate(&self) -> ParcelResult<()> {
        if !(self.pressure.is_finite() && self.pressure > 0.0) {
            return Err(ParcelError::Configuration(format!(
                "pressure must be positive and finite, got {}",
                self.pressure
            )));
        }
        if !(100.0..400.0).contains(&self.temperature) {
            return Err(ParcelError::Configuration(format!(
                "temperature {} K outside the supported range (100, 400) K",
                self.temperature
            )));
        }
        let s = self.initial_supersaturation()?;
        if !(-1.0..1.0).contains(&s) {
            return Err(ParcelError::Configuration(format!(
                "initial supersaturation {} outside (-1, 1)",
                s
            )));
        }
        Ok(())
    }
}

/// Solver selection and tolerances.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub backend: SolverBackend,
    pub rtol: f64,
    pub atol: f64,
    pub max_steps: usize,
    /// Output sampling interval for dense-output backends, s.
    pub output_step: f64,
    pub first_step: Option<f64>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        let options = SolverOptions::default();
        Self {
            backend: SolverBackend::AdamsBdf,
            rtol: options.rtol,
            atol: options.atol,
            max_steps: options.max_steps,
            output_step: options.output_step,
            first_step: options.first_step,
        }
    }
}

impl SolverConfig {
    pub fn options(&self) -> SolverOptions {
        SolverOptions {
            rtol: self.rtol,
            atol: self.atol,
            max_steps: self.max_steps,
            output_step: self.output_step,
            first_step: self.first_step,
        }
    }

    pub(crate) fn validate(&self) -> ParcelResult<()> {
        for (name, value) in [
            ("rtol", self.rtol),
            ("atol", self.atol),
            ("output_step", self.output_step),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ParcelError::Configuration(format!(
                    "{} must be positive and finite, got {}",
                    name, value
                )));
            }
        }
        if self.max_steps == 0 {
            return Err(ParcelError::Configuration(
                "max_steps must be at least 1".to_string(),
            ));
        }
        if let Some(h0) = self.first_step {
            if !(h0.is_finite() && h0 > 0.0) {
                return Err(ParcelError::Configuration(format!(
                    "first_step must be positive and finite, got {}",
                    h0
                )));
            }
        }
        self.backend.availability()
    }
}
