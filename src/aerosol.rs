//! Aerosol description: species, size bins, modes and the population fed to
//! the condensation kernel.
//!
//! Everything here is immutable once constructed and validated. A population
//! can be shared (via `Arc`) across any number of concurrent runs since no
//! run ever mutates it.

use crate::errors::{ParcelError, ParcelResult};
use crate::kohler::kohler_crit;
use serde::{Deserialize, Serialize};

/// Upper bound of the physically observed hygroscopicity range
/// (sea salt sits around 1.3).
pub const KAPPA_MAX: f64 = 1.4;

/// Chemical/physical metadata for one aerosol species.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AerosolSpecies {
    /// Species label, e.g. "(NH4)2SO4"
    pub name: String,
    /// Hygroscopicity parameter kappa (Petters & Kreidenweis)
    pub kappa: f64,
    /// Dry particle density
    /// unit: kg m^-3
    pub density: f64,
    /// Molecular weight
    /// unit: kg mol^-1
    pub molecular_weight: f64,
}

impl AerosolSpecies {
    fn validate(&self) -> ParcelResult<()> {
        if !(0.0..=KAPPA_MAX).contains(&self.kappa) {
            return Err(ParcelError::Configuration(format!(
                "species '{}': kappa = {} outside the physical range [0, {}]",
                self.name, self.kappa, KAPPA_MAX
            )));
        }
        if !(self.density > 0.0) {
            return Err(ParcelError::Configuration(format!(
                "species '{}': density must be positive, got {}",
                self.name, self.density
            )));
        }
        if !(self.molecular_weight > 0.0) {
            return Err(ParcelError::Configuration(format!(
                "species '{}': molecular weight must be positive, got {}",
                self.name, self.molecular_weight
            )));
        }
        Ok(())
    }
}

/// A single size bin: a dry radius and the number of particles it carries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AerosolBin {
    /// Dry (solute core) radius
    /// unit: m
    pub dry_radius: f64,
    /// Number concentration
    /// unit: m^-3
    pub number: f64,
}

/// One aerosol mode: a species plus its discretized size distribution.
///
/// Bins are kept sorted by increasing dry radius. The ordering carries the
/// tie-breaking semantics of the diagnostics (smallest to largest); the
/// integration itself does not depend on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AerosolMode {
    pub species: AerosolSpecies,
    bins: Vec<AerosolBin>,
}

impl AerosolMode {
    pub fn new(species: AerosolSpecies, mut bins: Vec<AerosolBin>) -> ParcelResult<Self> {
        species.validate()?;
        for bin in &bins {
            if !(bin.dry_radius > 0.0) || !bin.dry_radius.is_finite() {
                return Err(ParcelError::Configuration(format!(
                    "species '{}': dry radius must be positive, got {}",
                    species.name, bin.dry_radius
                )));
            }
            if !(bin.number > 0.0) || !bin.number.is_finite() {
                return Err(ParcelError::Configuration(format!(
                    "species '{}': number concentration must be positive, got {}",
                    species.name, bin.number
                )));
            }
        }
        bins.sort_by(|a, b| a.dry_radius.total_cmp(&b.dry_radius));
        Ok(Self { species, bins })
    }

    pub fn bins(&self) -> &[AerosolBin] {
        &self.bins
    }

    pub fn total_number(&self) -> f64 {
        self.bins.iter().map(|b| b.number).sum()
    }
}

/// The full aerosol burden carried by the parcel: zero or more modes.
///
/// An empty population is valid and describes the particle-free degenerate
/// case in which supersaturation grows at the adiabatic rate with no
/// condensational damping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AerosolPopulation {
    modes: Vec<AerosolMode>,
}

impl AerosolPopulation {
    pub fn new(modes: Vec<AerosolMode>) -> Self {
        Self { modes }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn modes(&self) -> &[AerosolMode] {
        &self.modes
    }

    /// Total number of size bins across all modes.
    pub fn n_bins(&self) -> usize {
        self.modes.iter().map(|m| m.bins.len()).sum()
    }

    /// Total particle number concentration, m^-3.
    pub fn total_number(&self) -> f64 {
        self.modes.iter().map(|m| m.total_number()).sum()
    }

    /// Iterate over all bins across modes, in mode order, yielding the
    /// species alongside each bin. This flattened order defines the layout
    /// of the wet-radius block of the ODE state vector.
    pub fn iter_bins(&self) -> impl Iterator<Item = (&AerosolSpecies, &AerosolBin)> {
        self.modes
            .iter()
            .flat_map(|m| m.bins.iter().map(move |b| (&m.species, b)))
    }

    /// Critical (radius, supersaturation) per bin at the given temperature,
    /// in flattened bin order.
    pub fn critical_points(&self, temperature: f64) -> Vec<(f64, f64)> {
        self.iter_bins()
            .map(|(species, bin)| kohler_crit(temperature, bin.dry_radius, species.kappa))
            .collect()
    }
}

/// Lognormal size distribution used to discretize a mode into bins.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Lognorm {
    /// Geometric mean (median) radius
    /// unit: m
    pub mean_radius: f64,
    /// Geometric standard deviation (dimensionless, > 1)
    pub geo_std_dev: f64,
    /// Total number concentration
    /// unit: m^-3
    pub number: f64,
}

impl Lognorm {
    /// Number density per unit radius, dN/dr.
    pub fn pdf(&self, r: f64) -> f64 {
        let ln_sigma = self.geo_std_dev.ln();
        let x = (r / self.mean_radius).ln() / ln_sigma;
        self.number / ((2.0 * std::f64::consts::PI).sqrt() * ln_sigma * r)
            * (-0.5 * x * x).exp()
    }

    /// Discretize into `n` bins over +/- 6 geometric standard deviations,
    /// integrating the pdf over each bin with Simpson's rule. Bin radii are
    /// the geometric midpoints of the bin edges.
    pub fn to_bins(&self, n: usize) -> ParcelResult<Vec<AerosolBin>> {
        if n == 0 {
            return Err(ParcelError::Configuration(
                "lognormal mode must be discretized into at least one bin".to_string(),
            ));
        }
        if !(self.geo_std_dev > 1.0) {
            return Err(ParcelError::Configuration(format!(
                "geometric standard deviation must exceed 1, got {}",
                self.geo_std_dev
            )));
        }
        if !(self.mean_radius > 0.0) || !(self.number > 0.0) {
            return Err(ParcelError::Configuration(format!(
                "lognormal mode requires positive mean radius and number, got {} and {}",
                self.mean_radius, self.number
            )));
        }

        let ln_sigma = self.geo_std_dev.ln();
        let lo = self.mean_radius.ln() - 6.0 * ln_sigma;
        let step = 12.0 * ln_sigma / n as f64;

        let mut bins = Vec::with_capacity(n);
        for i in 0..n {
            let a = (lo + step * i as f64).exp();
            let b = (lo + step * (i + 1) as f64).exp();
            bins.push(AerosolBin {
                dry_radius: (a * b).sqrt(),
                number: simpson(|r| self.pdf(r), a, b, 8),
            });
        }
        Ok(bins)
    }
}

fn simpson(f: impl Fn(f64) -> f64, a: f64, b: f64, intervals: usize) -> f64 {
    let n = intervals.max(2) & !1; // even
    let h = (b - a) / n as f64;
    let mut acc = f(a) + f(b);
    for i in 1..n {
        let w = if i % 2 == 0 { 2.0 } else { 4.0 };
        acc += w * f(a + h * i as f64);
    }
    acc * h / 3.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use is_close::is_close;

    fn sulfate() -> AerosolSpecies {
        AerosolSpecies {
            name: "(NH4)2SO4".to_string(),
            kappa: 0.6,
            density: 1760.0,
            molecular_weight: 132.14e-3,
        }
    }

    #[test]
    fn mode_sorts_bins_by_dry_radius() {
        let mode = AerosolMode::new(
            sulfate(),
            vec![
                AerosolBin { dry_radius: 1e-7, number: 1e8 },
                AerosolBin { dry_radius: 3e-8, number: 2e8 },
                AerosolBin { dry_radius: 6e-8, number: 3e8 },
            ],
        )
        .unwrap();
        let radii: Vec<f64> = mode.bins().iter().map(|b| b.dry_radius).collect();
        assert_eq!(radii, vec![3e-8, 6e-8, 1e-7]);
        assert!(is_close!(mode.total_number(), 6e8));
    }

    #[test]
    fn rejects_nonpositive_parameters() {
        assert!(AerosolMode::new(
            sulfate(),
            vec![AerosolBin { dry_radius: -1e-8, number: 1e8 }]
        )
        .is_err());
        assert!(AerosolMode::new(
            sulfate(),
            vec![AerosolBin { dry_radius: 1e-8, number: 0.0 }]
        )
        .is_err());

        let mut bad = sulfate();
        bad.kappa = 2.5;
        assert!(AerosolMode::new(bad, vec![AerosolBin { dry_radius: 1e-8, number: 1e8 }]).is_err());
    }

    #[test]
    fn empty_population_is_valid() {
        let pop = AerosolPopulation::empty();
        assert_eq!(pop.n_bins(), 0);
        assert_eq!(pop.total_number(), 0.0);
    }

    #[test]
    fn lognormal_discretization_conserves_number() {
        let dist = Lognorm {
            mean_radius: 5e-8,
            geo_std_dev: 2.0,
            number: 1e8,
        };
        for n in [20, 50, 200] {
            let bins = dist.to_bins(n).unwrap();
            let total: f64 = bins.iter().map(|b| b.number).sum();
            assert!(
                is_close!(total, dist.number, rel_tol = 1e-2),
                "n = {}: total = {}",
                n,
                total
            );
        }
    }

    #[test]
    fn lognormal_peak_sits_at_the_median_radius() {
        let dist = Lognorm {
            mean_radius: 5e-8,
            geo_std_dev: 1.8,
            number: 1e8,
        };
        let bins = dist.to_bins(101).unwrap();
        let densest = bins
            .iter()
            .max_by(|a, b| a.number.total_cmp(&b.number))
            .unwrap();
        // the dN/dlnr mode of a lognormal is at the median radius; with
        // log-spaced bins the most populated bin sits on top of it
        assert!(
            (densest.dry_radius / dist.mean_radius).ln().abs() < 2.0 * (1.8f64).ln() / 10.0,
            "densest bin at {}",
            densest.dry_radius
        );
    }

    #[test]
    fn critical_points_ordered_by_dry_radius() {
        let mode = AerosolMode::new(
            sulfate(),
            vec![
                AerosolBin { dry_radius: 3e-8, number: 1e8 },
                AerosolBin { dry_radius: 6e-8, number: 1e8 },
                AerosolBin { dry_radius: 1.2e-7, number: 1e8 },
            ],
        )
        .unwrap();
        let pop = AerosolPopulation::new(vec![mode]);
        let crits = pop.critical_points(280.0);
        assert!(crits[0].1 > crits[1].1);
        assert!(crits[1].1 > crits[2].1);
    }
}
