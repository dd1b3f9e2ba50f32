//! End-to-end parcel runs exercising the physical invariants: water mass
//! conservation, monotonic ascent, a single supersaturation maximum and
//! size-ordered activation.

use std::sync::Arc;

use is_close::is_close;
use parcel_model::aerosol::{AerosolBin, AerosolMode, AerosolPopulation, AerosolSpecies};
use parcel_model::config::{EnvironmentConfig, SolverConfig};
use parcel_model::kernel::{KernelParams, UpdraftProfile};
use parcel_model::model::ParcelModel;
use parcel_model::solver::SolverBackend;
use parcel_model::ParcelError;

fn sulfate() -> AerosolSpecies {
    AerosolSpecies {
        name: "(NH4)2SO4".to_string(),
        kappa: 0.6,
        density: 1760.0,
        molecular_weight: 132.14e-3,
    }
}

fn environment(s0: f64) -> EnvironmentConfig {
    EnvironmentConfig {
        pressure: 80_000.0,
        temperature: 280.0,
        supersaturation: Some(s0),
        relative_humidity: None,
    }
}

/// Single 50 nm mode at 100 cm^-3, the reference scenario.
fn reference_population() -> Arc<AerosolPopulation> {
    let mode = AerosolMode::new(
        sulfate(),
        vec![AerosolBin {
            dry_radius: 5e-8,
            number: 1e8,
        }],
    )
    .unwrap();
    Arc::new(AerosolPopulation::new(vec![mode]))
}

fn reference_model(solver: SolverConfig) -> ParcelModel {
    ParcelModel::new(
        reference_population(),
        environment(0.0),
        KernelParams::default(),
        solver,
    )
    .unwrap()
}

#[test]
fn reference_scenario_activates_the_mode() {
    let model = reference_model(SolverConfig::default());
    let run = model.run(300.0).unwrap();
    assert!(run.trajectory.is_complete());

    // a lone 50 nm mode at 100 cm^-3 is a weak vapor sink: the peak lands
    // well above the mode's ~0.18% critical supersaturation but below the
    // few-percent regime of aerosol-free ascent
    let (t_max, s_max) = run.trajectory.max_supersaturation().unwrap();
    assert!(
        (2e-3..5e-2).contains(&s_max),
        "S_max = {} at t = {}",
        s_max,
        t_max
    );
    assert!(t_max > 0.0 && t_max < 300.0);

    assert!(run.activation.bins[0].activated);
    assert!(is_close!(run.activation.droplet_number, 1e8));
    assert!(is_close!(run.activation.activated_fraction(), 1.0));
    // at this peak the equilibrium criterion agrees
    assert!(is_close!(run.activation.equilibrium_fraction(), 1.0));
}

#[test]
fn total_water_is_conserved() {
    let solver = SolverConfig {
        rtol: 1e-8,
        ..SolverConfig::default()
    };
    let run = reference_model(solver).run(300.0).unwrap();
    let drift = run.trajectory.total_water_drift().unwrap();
    assert!(drift < 1e-5, "total water drifted by {}", drift);
}

#[test]
fn ascent_is_monotonic_and_supersaturation_unimodal() {
    let run = reference_model(SolverConfig::default()).run(300.0).unwrap();

    let z = run.trajectory.altitude_series();
    for i in 1..z.len() {
        assert!(z[i] >= z[i - 1], "altitude decreased at sample {}", i);
    }

    let s = run.trajectory.supersaturation_series();
    let peak = (0..s.len())
        .max_by(|a, b| s[*a].total_cmp(&s[*b]))
        .unwrap();
    for i in 1..=peak {
        assert!(
            s[i] >= s[i - 1] - 1e-6,
            "S not rising before the peak at sample {}",
            i
        );
    }
    for i in peak + 1..s.len() {
        assert!(
            s[i] <= s[i - 1] + 1e-6,
            "S not falling after the peak at sample {}",
            i
        );
    }
}

#[test]
fn activation_is_ordered_by_dry_size() {
    let mode = AerosolMode::new(
        sulfate(),
        vec![
            AerosolBin {
                dry_radius: 4e-8,
                number: 5e7,
            },
            AerosolBin {
                dry_radius: 8e-8,
                number: 5e7,
            },
        ],
    )
    .unwrap();
    let model = ParcelModel::new(
        Arc::new(AerosolPopulation::new(vec![mode])),
        environment(0.0),
        KernelParams::default(),
        SolverConfig::default(),
    )
    .unwrap();
    let run = model.run(300.0).unwrap();

    let bins = &run.activation.bins;
    assert!(bins[0].critical_supersaturation > bins[1].critical_supersaturation);
    assert!(bins[0].critical_radius < bins[1].critical_radius);
    // the larger core always activates at least as readily as the smaller
    assert!(bins[1].activated || !bins[0].activated);
    assert!(bins[1].max_wet_radius > bins[0].max_wet_radius);
    // at these conditions the 80 nm core must activate
    assert!(bins[1].activated);
    assert!(run.activation.droplet_number >= 5e7);

    // and no later in simulated time than the 40 nm core
    let first_crossing = |bin: usize| {
        run.trajectory
            .wet_radius_series(bin)
            .iter()
            .position(|r| *r > bins[bin].critical_radius)
    };
    if let (Some(small), Some(large)) = (first_crossing(0), first_crossing(1)) {
        assert!(large <= small, "large bin crossed at sample {}, small at {}", large, small);
    }
}

#[test]
fn particle_free_parcel_matches_the_adiabatic_production_rate() {
    let solver = SolverConfig {
        backend: SolverBackend::Dopri5,
        output_step: 0.5,
        ..SolverConfig::default()
    };
    let model = ParcelModel::new(
        Arc::new(AerosolPopulation::empty()),
        environment(0.0),
        KernelParams::default(),
        solver,
    )
    .unwrap();
    let run = model.run(5.0).unwrap();

    // with no condensation sink, dS/dt = alpha(T, P) w; over 5 s the
    // coefficients barely move, so S(5) ~ alpha * 5
    let s = run.trajectory.supersaturation_series();
    let s_end = s[s.len() - 1];
    assert!(s_end > 0.0);
    let per_second = s_end / 5.0;
    assert!(
        (4e-4..7e-4).contains(&per_second),
        "adiabatic production rate {} s^-1",
        per_second
    );
}

#[test]
fn still_parcel_stays_at_equilibrium() {
    let params = KernelParams {
        updraft: UpdraftProfile::constant(0.0),
        ..KernelParams::default()
    };
    // equilibrium relaxation of sub-100 nm droplets is stiff; an explicit
    // backend would crawl here
    let solver = SolverConfig {
        backend: SolverBackend::Bdf,
        ..SolverConfig::default()
    };
    let model = ParcelModel::new(
        reference_population(),
        environment(-0.02),
        params,
        solver,
    )
    .unwrap();
    let run = model.run(10.0).unwrap();

    let first = run.trajectory.state_at(0);
    let last = run.trajectory.state_at(run.trajectory.len() - 1);
    assert!((last.supersaturation() - first.supersaturation()).abs() < 1e-6);
    assert!(is_close!(last.wet_radius(0), first.wet_radius(0), rel_tol = 1e-3));
    assert_eq!(last.altitude(), 0.0);
}

#[test]
fn exhausted_step_budget_fails_with_a_partial_trajectory() {
    let solver = SolverConfig {
        max_steps: 5,
        ..SolverConfig::default()
    };
    let failed = reference_model(solver).run(300.0).unwrap_err();
    assert!(matches!(failed.error, ParcelError::ConvergenceFailure { .. }));
    assert!(!failed.trajectory.is_complete());
    assert!(!failed.trajectory.is_empty());
    let last = failed.last_time().unwrap();
    assert!(last < 300.0);
}

#[test]
fn json_config_drives_a_full_run() {
    let json = r#"{
        "aerosol": [{
            "species": {
                "name": "(NH4)2SO4",
                "kappa": 0.6,
                "density": 1760.0,
                "molecular_weight": 0.13214
            },
            "distribution": {
                "lognormal": {
                    "mean_radius": 5e-8,
                    "geo_std_dev": 1.6,
                    "number": 1e8,
                    "n_bins": 20
                }
            }
        }],
        "environment": {
            "pressure": 80000.0,
            "temperature": 280.0,
            "relative_humidity": 0.98
        },
        "solver": {
            "backend": "adams_bdf"
        }
    }"#;
    let config: parcel_model::ParcelConfig = serde_json::from_str(json).unwrap();
    let model = ParcelModel::from_config(&config).unwrap();
    assert_eq!(model.population().n_bins(), 20);

    let run = model.run(120.0).unwrap();
    assert!(run.trajectory.is_complete());
    let (_, s_max) = run.trajectory.max_supersaturation().unwrap();
    assert!(s_max > 0.0);
    // the big end of the distribution activates, the small end does not
    let fraction = run.activation.activated_fraction();
    assert!(
        fraction > 0.0 && fraction < 1.0,
        "activated fraction = {}",
        fraction
    );
}
