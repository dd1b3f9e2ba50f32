//! The model orchestrator: configuration, equilibrium initialization and
//! the run state machine.
//!
//! A [`ParcelModel`] is the *configured* state: fully validated, immutable
//! and shareable across threads. [`ParcelModel::run`] performs one
//! integration with no run-scoped state outliving the call, and returns
//! either a [`CompletedRun`] or a [`FailedRun`] that still carries the
//! partial trajectory for diagnosis.

use crate::activation::ActivationResult;
use crate::aerosol::AerosolPopulation;
use crate::config::{EnvironmentConfig, ParcelConfig, SolverConfig};
use crate::constants::{EPSILON, RHO_WATER};
use crate::errors::{ParcelError, ParcelResult};
use crate::kernel::{CondensationKernel, KernelParams, SupersaturationPeak};
use crate::kohler::equilibrium_radius;
use crate::solver::{self, EventAction, EventSpec, SolverBackend, SolverOptions};
use crate::state::StateVector;
use crate::thermo::{moist_air_density, saturation_vapor_pressure};
use crate::trajectory::Trajectory;
use log::{debug, info, warn};
use std::sync::Arc;

/// Width to which the supersaturation-peak crossing time is refined, s.
const EVENT_REFINE_TOL: f64 = 1e-6;

/// A validated, reusable parcel-model setup.
#[derive(Debug)]
pub struct ParcelModel {
    kernel: CondensationKernel,
    population: Arc<AerosolPopulation>,
    backend: SolverBackend,
    options: SolverOptions,
    y0: StateVector,
}

/// A run that reached the end of its time span.
#[derive(Debug, Clone)]
pub struct CompletedRun {
    pub trajectory: Trajectory,
    pub activation: ActivationResult,
}

/// A run that broke down mid-integration. The trajectory up to the last
/// accepted step is retained.
#[derive(Debug, Clone)]
pub struct FailedRun {
    pub error: ParcelError,
    pub trajectory: Trajectory,
}

impl FailedRun {
    /// Simulated time of the last accepted step, if any step was accepted.
    pub fn last_time(&self) -> Option<f64> {
        let n = self.trajectory.len();
        (n > 0).then(|| self.trajectory.times()[n - 1])
    }
}

impl ParcelModel {
    /// Validate the setup and bring the parcel to its initial equilibrium.
    ///
    /// Each bin starts at the wet radius in equilibrium with the initial
    /// supersaturation; the initial vapor content follows from the
    /// saturation pressure and the condensed water from the equilibrium
    /// droplets. A bin that would start super-critical (ambient S at or
    /// above its critical value) is a configuration error.
    pub fn new(
        population: Arc<AerosolPopulation>,
        environment: EnvironmentConfig,
        kernel_params: KernelParams,
        solver: SolverConfig,
    ) -> ParcelResult<Self> {
        environment.validate()?;
        solver.validate()?;
        let kernel = CondensationKernel::new(Arc::clone(&population), kernel_params)?;

        let s0 = environment.initial_supersaturation()?;
        let temperature = environment.temperature;
        let pressure = environment.pressure;
        let pv_sat = saturation_vapor_pressure(temperature);
        if pressure <= pv_sat {
            return Err(ParcelError::Configuration(format!(
                "pressure {} Pa does not exceed the saturation vapor pressure {:.1} Pa",
                pressure, pv_sat
            )));
        }
        let wv0 = (1.0 + s0) * EPSILON * pv_sat / (pressure - pv_sat);
        let air_density = moist_air_density(pressure, temperature, wv0);

        let n_bins = population.n_bins();
        let mut radii = Vec::with_capacity(n_bins);
        let mut wc0 = 0.0;
        for (species, bin) in population.iter_bins() {
            let r0 = equilibrium_radius(s0, temperature, bin.dry_radius, species.kappa)?;
            let rd3 = bin.dry_radius.powi(3);
            wc0 += 4.0 / 3.0 * std::f64::consts::PI * RHO_WATER * bin.number
                * (r0.powi(3) - rd3)
                / air_density;
            debug!(
                "bin r_dry = {:.3e} m starts at wet radius {:.3e} m",
                bin.dry_radius, r0
            );
            radii.push(r0);
        }

        let mut y0 = vec![0.0, pressure, temperature, wv0, wc0, s0];
        y0.extend_from_slice(&radii);

        info!(
            "parcel model configured: {} bins, backend {}, T = {} K, P = {} Pa, S = {:+.3e}",
            n_bins,
            solver.backend.name(),
            temperature,
            pressure,
            s0
        );
        Ok(Self {
            kernel,
            population,
            backend: solver.backend,
            options: solver.options(),
            y0: StateVector::from_vec(y0),
        })
    }

    /// Build from a structured configuration.
    pub fn from_config(config: &ParcelConfig) -> ParcelResult<Self> {
        let modes = config
            .aerosol
            .iter()
            .map(|mode| mode.build())
            .collect::<ParcelResult<Vec<_>>>()?;
        Self::new(
            Arc::new(AerosolPopulation::new(modes)),
            config.environment,
            config.kernel.clone(),
            config.solver.clone(),
        )
    }

    /// The same setup with a different solver; re-running under new
    /// tolerances or another backend is always an explicit caller decision.
    pub fn with_solver(&self, solver: SolverConfig) -> ParcelResult<Self> {
        solver.validate()?;
        Ok(Self {
            kernel: self.kernel.clone(),
            population: Arc::clone(&self.population),
            backend: solver.backend,
            options: solver.options(),
            y0: self.y0.clone(),
        })
    }

    pub fn population(&self) -> &Arc<AerosolPopulation> {
        &self.population
    }

    pub fn backend(&self) -> SolverBackend {
        self.backend
    }

    pub fn initial_state(&self) -> &StateVector {
        &self.y0
    }

    /// Integrate the parcel for `duration` seconds of simulated time.
    ///
    /// The supersaturation maximum (falling zero crossing of dS/dt) is
    /// located during the run and recorded; integration continues to the
    /// end of the span.
    pub fn run(&self, duration: f64) -> Result<CompletedRun, FailedRun> {
        if !(duration.is_finite() && duration > 0.0) {
            return Err(FailedRun {
                error: ParcelError::Configuration(format!(
                    "run duration must be positive and finite, got {}",
                    duration
                )),
                trajectory: Trajectory::from_raw(solver::RawSolution::empty(), false),
            });
        }

        let monitor = SupersaturationPeak;
        let spec = EventSpec {
            monitor: &monitor,
            action: EventAction::Record,
            refine_tol: EVENT_REFINE_TOL,
        };

        match solver::integrate(
            self.backend,
            &self.kernel,
            &self.y0,
            (0.0, duration),
            &self.options,
            Some(&spec),
        ) {
            Ok(raw) => {
                info!(
                    "run completed: {} samples, {} rhs evaluations, {} accepted / {} rejected steps",
                    raw.times.len(),
                    raw.stats.rhs_evaluations,
                    raw.stats.accepted_steps,
                    raw.stats.rejected_steps
                );
                let trajectory = Trajectory::from_raw(raw, true);
                let activation = ActivationResult::diagnose(&trajectory, &self.population)
                    .expect("a completed run holds at least the initial sample");
                Ok(CompletedRun {
                    trajectory,
                    activation,
                })
            }
            Err(failure) => {
                warn!(
                    "run failed at t = {:?} s: {}",
                    failure.partial.last_time(),
                    failure.error
                );
                Err(FailedRun {
                    error: failure.error,
                    trajectory: Trajectory::from_raw(failure.partial, false),
                })
            }
        }
    }
}
