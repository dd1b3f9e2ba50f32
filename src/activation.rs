//! Post-run activation analysis.
//!
//! Decides, bin by bin, whether the droplets actually grew past their
//! Koehler critical radius during the run (the kinetic criterion), and
//! alongside it the equilibrium count of bins whose critical
//! supersaturation was reached at all. The gap between the two is the
//! kinetic limitation of activation.

use crate::aerosol::AerosolPopulation;
use crate::kohler::kohler_crit;
use crate::state::IDX_TEMPERATURE;
use crate::trajectory::Trajectory;

/// Activation verdict for one aerosol bin, in flattened population order.
#[derive(Debug, Clone, Copy)]
pub struct BinActivation {
    /// Dry radius, m.
    pub dry_radius: f64,
    /// Number concentration, m^-3.
    pub number: f64,
    pub kappa: f64,
    /// Critical radius at the temperature of the supersaturation maximum, m.
    pub critical_radius: f64,
    /// Critical supersaturation (fractional).
    pub critical_supersaturation: f64,
    /// Largest wet radius reached during the run, m.
    pub max_wet_radius: f64,
    /// Kinetic criterion: the bin grew beyond its critical radius.
    pub activated: bool,
}

/// Aggregate activation diagnostics for one completed (or partial) run.
#[derive(Debug, Clone)]
pub struct ActivationResult {
    /// Maximum fractional supersaturation reached.
    pub max_supersaturation: f64,
    /// Simulated time of the maximum, s.
    pub time_of_max: f64,
    pub bins: Vec<BinActivation>,
    /// Number concentration of kinetically activated droplets, m^-3.
    pub droplet_number: f64,
    /// Number concentration whose critical supersaturation was reached
    /// (equilibrium criterion), m^-3.
    pub equilibrium_number: f64,
    /// Total aerosol number concentration, m^-3.
    pub total_number: f64,
}

impl ActivationResult {
    /// Derive the diagnostics from a trajectory and the population that
    /// produced it. Returns `None` for an empty trajectory.
    ///
    /// Critical points are evaluated once, at the parcel temperature when
    /// the supersaturation peaked; the Kelvin coefficient varies little
    /// over the few degrees a run spans.
    pub fn diagnose(trajectory: &Trajectory, population: &AerosolPopulation) -> Option<Self> {
        let (time_of_max, max_supersaturation) = trajectory.max_supersaturation()?;
        let temperature = match trajectory.event() {
            Some(event) => event.state[IDX_TEMPERATURE],
            None => {
                let series = trajectory.supersaturation_series();
                let mut idx = 0;
                for (i, s) in series.iter().enumerate() {
                    if *s > series[idx] {
                        idx = i;
                    }
                }
                trajectory.state_at(idx).temperature()
            }
        };

        let mut bins = Vec::with_capacity(population.n_bins());
        let mut droplet_number = 0.0;
        let mut equilibrium_number = 0.0;
        for (i, (species, bin)) in population.iter_bins().enumerate() {
            let (critical_radius, critical_supersaturation) =
                kohler_crit(temperature, bin.dry_radius, species.kappa);

            let mut max_wet_radius = trajectory
                .wet_radius_series(i)
                .iter()
                .fold(0.0f64, |acc, r| acc.max(*r));
            if let Some(event) = trajectory.event() {
                max_wet_radius = max_wet_radius.max(event.state[crate::state::N_METEO + i]);
            }

            let activated = max_wet_radius > critical_radius;
            if activated {
                droplet_number += bin.number;
            }
            if critical_supersaturation <= max_supersaturation {
                equilibrium_number += bin.number;
            }
            bins.push(BinActivation {
                dry_radius: bin.dry_radius,
                number: bin.number,
                kappa: species.kappa,
                critical_radius,
                critical_supersaturation,
                max_wet_radius,
                activated,
            });
        }

        Some(Self {
            max_supersaturation,
            time_of_max,
            bins,
            droplet_number,
            equilibrium_number,
            total_number: population.total_number(),
        })
    }

    /// Kinetically activated fraction of the total number, in [0, 1].
    pub fn activated_fraction(&self) -> f64 {
        if self.total_number > 0.0 {
            self.droplet_number / self.total_number
        } else {
            0.0
        }
    }

    /// Equilibrium-activated fraction of the total number, in [0, 1].
    pub fn equilibrium_fraction(&self) -> f64 {
        if self.total_number > 0.0 {
            self.equilibrium_number / self.total_number
        } else {
            0.0
        }
    }
}
