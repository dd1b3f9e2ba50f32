//! kappa-Koehler theory (Petters & Kreidenweis, 2007).
//!
//! Relates the equilibrium supersaturation over an aqueous droplet to its
//! dry size and a single hygroscopicity parameter kappa. These routines are
//! pure and are shared between the condensation kernel (hot path), the
//! equilibrium initialization root-find and the activation diagnostics.

use crate::constants::{MW_WATER, RHO_WATER, R_GAS};
use crate::errors::{ParcelError, ParcelResult};
use crate::thermo::surface_tension_water;

/// Kelvin (curvature) coefficient `A` such that the curvature term of the
/// Koehler curve is `exp(A / r)`.
///
/// unit: m
pub fn kelvin_coefficient(temperature: f64) -> f64 {
    2.0 * MW_WATER * surface_tension_water(temperature)
        / (R_GAS * temperature * RHO_WATER)
}

/// Equilibrium supersaturation at the surface of a droplet of wet radius
/// `r` grown on a dry core of radius `r_dry` with hygroscopicity `kappa`.
///
/// The textbook form is `S_eq = s(r) exp(a) - 1` with water activity
/// `s = (r^3 - r_dry^3) / (r^3 - (1 - kappa) r_dry^3)` and `a = A / r`.
/// Both factors tend to 1 for large wet radii and the subtraction cancels
/// catastrophically, which matters because activated bins live exactly in
/// that regime. The expression is therefore rearranged as
///
/// `S_eq = exp(a) (s - 1) + expm1(a)`
///
/// where `s - 1 = -kappa r_dry^3 / (r^3 - (1 - kappa) r_dry^3)` is computed
/// without subtracting near-equal quantities.
pub fn equilibrium_supersaturation(r: f64, r_dry: f64, temperature: f64, kappa: f64) -> f64 {
    let a = kelvin_coefficient(temperature) / r;
    let rd3 = r_dry * r_dry * r_dry;
    let r3 = r * r * r;
    let activity_minus_one = -(kappa * rd3) / (r3 - (1.0 - kappa) * rd3);
    a.exp() * activity_minus_one + a.exp_m1()
}

/// Critical radius and critical supersaturation of a dry particle: the
/// point where the Koehler curve attains its maximum.
///
/// Found by golden-section search in log-radius over `[r_dry, 5e-4 m]`.
/// The small-`A` analytic approximation is avoided: it degrades for large
/// or nearly insoluble particles, exactly where the diagnostics need the
/// critical point most.
pub fn kohler_crit(temperature: f64, r_dry: f64, kappa: f64) -> (f64, f64) {
    const INV_PHI: f64 = 0.618_033_988_749_894_8;

    let mut lo = (r_dry * (1.0 + 1e-9)).ln();
    let mut hi = 5e-4_f64.ln();
    let s_at = |x: f64| equilibrium_supersaturation(x.exp(), r_dry, temperature, kappa);

    let mut x1 = hi - INV_PHI * (hi - lo);
    let mut x2 = lo + INV_PHI * (hi - lo);
    let mut s1 = s_at(x1);
    let mut s2 = s_at(x2);
    for _ in 0..200 {
        if hi - lo < 1e-14 {
            break;
        }
        if s1 < s2 {
            lo = x1;
            x1 = x2;
            s1 = s2;
            x2 = lo + INV_PHI * (hi - lo);
            s2 = s_at(x2);
        } else {
            hi = x2;
            x2 = x1;
            s2 = s1;
            x1 = hi - INV_PHI * (hi - lo);
            s1 = s_at(x1);
        }
    }
    let r_crit = (0.5 * (lo + hi)).exp();
    (r_crit, s_at(0.5 * (lo + hi)))
}

/// Wet radius at which a particle is in equilibrium with ambient
/// supersaturation `s_ambient`.
///
/// The Koehler curve is monotone increasing on `(r_dry, r_crit)`, so the
/// root is bracketed and found by bisection. Fails if the requested
/// supersaturation is at or above the particle's critical value, in which
/// case no stable equilibrium exists (the bin would start super-critical,
/// which is a configuration problem, not an integration one).
pub fn equilibrium_radius(
    s_ambient: f64,
    temperature: f64,
    r_dry: f64,
    kappa: f64,
) -> ParcelResult<f64> {
    let (r_crit, s_crit) = kohler_crit(temperature, r_dry, kappa);
    if s_ambient >= s_crit {
        return Err(ParcelError::RootFindFailure {
            what: format!("equilibrium radius of r_dry = {:.3e} m", r_dry),
            reason: format!(
                "ambient supersaturation {:.4e} is at or above the critical value {:.4e}",
                s_ambient, s_crit
            ),
        });
    }

    let mut lo = r_dry * (1.0 + 1e-12);
    let mut hi = r_crit;
    // S_eq(lo) -> -1 at the dry core, S_eq(hi) = s_crit > s_ambient
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if (hi - lo) / mid < 1e-14 {
            break;
        }
        let s_mid = equilibrium_supersaturation(mid, r_dry, temperature, kappa);
        if s_mid < s_ambient {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    Ok(0.5 * (lo + hi))
}
