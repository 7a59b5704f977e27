// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Operational Analysis Engine - Meteorological Toolkit

//! Slice-based helpers for preparing meteorological reference channels
//! (wind vectors, air density, shear, veer) before they enter a run.
//!
//! All functions are element-wise over equal-length slices and return a
//! fresh vector; inputs are never modified.

/// Specific gas constant for dry air, J/(kg·K).
pub const R_DRY_AIR: f64 = 287.058;

/// Standard gravity, m/s².
pub const STANDARD_GRAVITY: f64 = 9.80665;

const SHEAR_MAX_ITER: usize = 100;
const SHEAR_TOL: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MetError {
    #[error("input length mismatch: expected {expected}, found {found}")]
    LengthMismatch { expected: usize, found: usize },

    #[error("negative {quantity} at index {index}")]
    Negative { quantity: &'static str, index: usize },

    #[error("at least two sensors are required, found {found}")]
    TooFewSensors { found: usize },

    #[error("sensor heights must be positive and distinct")]
    InvalidHeights,

    #[error("reference sensor {index} does not exist")]
    UnknownReference { index: usize },
}

fn same_len(a: &[f64], b: &[f64]) -> Result<(), MetError> {
    if a.len() != b.len() {
        return Err(MetError::LengthMismatch { expected: a.len(), found: b.len() });
    }
    Ok(())
}

fn reject_negative(values: &[f64], quantity: &'static str) -> Result<(), MetError> {
    match values.iter().position(|&v| v < 0.0) {
        Some(index) => Err(MetError::Negative { quantity, index }),
        None => Ok(()),
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

// ─── Wind Vectors ───────────────────────────────────────────────────────────

/// Meteorological direction (degrees, the direction the wind blows from)
/// of the zonal `u` and meridional `v` components. Always in [0, 360).
pub fn wind_direction(u: &[f64], v: &[f64]) -> Result<Vec<f64>, MetError> {
    same_len(u, v)?;
    Ok(u.iter()
        .zip(v)
        .map(|(&u, &v)| {
            let wd = 180.0 + u.atan2(v).to_degrees();
            if wd >= 360.0 { wd - 360.0 } else { wd }
        })
        .collect())
}

/// Zonal and meridional components of speed and direction, rounded to ten
/// decimals so cardinal directions give exact zeros.
pub fn uv_components(speed: &[f64], direction: &[f64]) -> Result<(Vec<f64>, Vec<f64>), MetError> {
    same_len(speed, direction)?;
    reject_negative(speed, "wind speed")?;
    reject_negative(direction, "wind direction")?;
    Ok(speed
        .iter()
        .zip(direction)
        .map(|(&ws, &wd)| {
            let rad = wd.to_radians();
            (round_to(-ws * rad.sin(), 10), round_to(-ws * rad.cos(), 10))
        })
        .unzip())
}

// ─── Thermodynamics ─────────────────────────────────────────────────────────

/// Dry-air density (kg/m³) from temperature (K) and pressure (Pa).
pub fn air_density(temperature_k: &[f64], pressure_pa: &[f64]) -> Result<Vec<f64>, MetError> {
    same_len(temperature_k, pressure_pa)?;
    reject_negative(temperature_k, "temperature")?;
    reject_negative(pressure_pa, "pressure")?;
    Ok(temperature_k
        .iter()
        .zip(pressure_pa)
        .map(|(&t, &p)| p / t / R_DRY_AIR)
        .collect())
}

/// Hydrostatic extrapolation of pressure from height `z0` to `z1` given
/// the mean layer temperature.
pub fn extrapolate_pressure(
    p0: &[f64],
    temp_avg_k: &[f64],
    z0: f64,
    z1: f64,
) -> Result<Vec<f64>, MetError> {
    same_len(p0, temp_avg_k)?;
    reject_negative(p0, "pressure")?;
    reject_negative(temp_avg_k, "temperature")?;
    Ok(p0
        .iter()
        .zip(temp_avg_k)
        .map(|(&p, &t)| p * (-STANDARD_GRAVITY * (z1 - z0) / R_DRY_AIR / t).exp())
        .collect())
}

/// IEC 61400-12-1 density normalization: `ws * (rho / mean(rho))^(1/3)`.
pub fn density_adjusted_wind_speed(wind_speed: &[f64], density: &[f64]) -> Result<Vec<f64>, MetError> {
    same_len(wind_speed, density)?;
    if density.is_empty() {
        return Ok(Vec::new());
    }
    let finite: Vec<f64> = density.iter().copied().filter(|d| d.is_finite()).collect();
    let rho_mean = finite.iter().sum::<f64>() / finite.len() as f64;
    Ok(wind_speed
        .iter()
        .zip(density)
        .map(|(&ws, &rho)| ws * (rho / rho_mean).cbrt())
        .collect())
}

// ─── Turbulence, Shear & Veer ───────────────────────────────────────────────

/// Standard deviation over mean of the wind speed.
pub fn turbulence_intensity(mean: &[f64], std_dev: &[f64]) -> Result<Vec<f64>, MetError> {
    same_len(mean, std_dev)?;
    Ok(mean.iter().zip(std_dev).map(|(&m, &s)| s / m).collect())
}

/// One anemometer: mounting height (m) and its speed series.
#[derive(Debug, Clone, Copy)]
pub struct Anemometer<'a> {
    pub height: f64,
    pub speeds: &'a [f64],
}

/// Power-law shear exponent per row.
///
/// Two sensors use the closed form `ln(ub/ua) / ln(hb/ha)`. With three or
/// more, heights and speeds are normalized by the `reference` sensor and
/// `u = h^alpha` is fitted by least squares on the speeds themselves, so
/// noisy rows weigh residuals in m/s rather than in log space. Rows with
/// fewer than two usable measurements yield `None`.
pub fn shear(sensors: &[Anemometer<'_>], reference: usize) -> Result<Vec<Option<f64>>, MetError> {
    if sensors.len() < 2 {
        return Err(MetError::TooFewSensors { found: sensors.len() });
    }
    let rows = sensors[0].speeds.len();
    for s in sensors {
        same_len(sensors[0].speeds, s.speeds)?;
        if !(s.height > 0.0) {
            return Err(MetError::InvalidHeights);
        }
    }
    for (i, a) in sensors.iter().enumerate() {
        if sensors[i + 1..].iter().any(|b| b.height == a.height) {
            return Err(MetError::InvalidHeights);
        }
    }

    let finite = |x: f64| if x.is_finite() { Some(x) } else { None };

    if let [a, b] = sensors {
        let dh = (b.height / a.height).ln();
        return Ok((0..rows)
            .map(|r| finite((b.speeds[r] / a.speeds[r]).ln() / dh))
            .collect());
    }

    let base = sensors.get(reference).ok_or(MetError::UnknownReference { index: reference })?;
    Ok((0..rows)
        .map(|r| {
            let u0 = base.speeds[r];
            let points: Vec<(f64, f64)> = sensors
                .iter()
                .filter_map(|s| {
                    let x = (s.height / base.height).ln();
                    let y = finite((s.speeds[r] / u0).ln())?;
                    Some((x, y))
                })
                .collect();
            if points.len() < 2 {
                return None;
            }
            power_law_exponent(&points)
        })
        .collect())
}

/// Least-squares `alpha` for `u = h^alpha` over normalized `(h, u)` points.
/// Damped Gauss-Newton, started from the log-space slope.
fn power_law_exponent(points: &[(f64, f64)]) -> Option<f64> {
    let sse = |alpha: f64| points.iter().map(|&(h, u)| (u - h.powf(alpha)).powi(2)).sum::<f64>();

    let (sxy, sxx) = points
        .iter()
        .filter(|&&(_, u)| u > 0.0)
        .fold((0.0, 0.0), |(sxy, sxx), &(h, u)| (sxy + h.ln() * u.ln(), sxx + h.ln() * h.ln()));
    let mut alpha = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    let mut cost = sse(alpha);

    for _ in 0..SHEAR_MAX_ITER {
        let (mut jr, mut jj) = (0.0, 0.0);
        for &(h, u) in points {
            let fitted = h.powf(alpha);
            let slope = fitted * h.ln();
            jr += slope * (u - fitted);
            jj += slope * slope;
        }
        if !(jj > 0.0) {
            break;
        }
        let mut step = jr / jj;
        // Halve the step until the fit improves
        let mut improved = false;
        for _ in 0..40 {
            let next = sse(alpha + step);
            if next.is_finite() && next <= cost {
                alpha += step;
                cost = next;
                improved = true;
                break;
            }
            step *= 0.5;
        }
        if !improved || step.abs() < SHEAR_TOL {
            break;
        }
    }

    if alpha.is_finite() { Some(alpha) } else { None }
}

/// Direction change per metre between two heights, with the change
/// wrapped to (-180, 180].
pub fn veer(dir_a: &[f64], height_a: f64, dir_b: &[f64], height_b: f64) -> Result<Vec<f64>, MetError> {
    same_len(dir_a, dir_b)?;
    if height_a == height_b {
        return Err(MetError::InvalidHeights);
    }
    let dz = height_b - height_a;
    Ok(dir_a
        .iter()
        .zip(dir_b)
        .map(|(&a, &b)| {
            let mut delta = b - a;
            if delta > 180.0 {
                delta -= 360.0;
            } else if delta <= -180.0 {
                delta += 360.0;
            }
            delta / dz
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn direction_of_cardinal_winds() {
        // wind from the north blows southward: v < 0
        let wd = wind_direction(&[0.0, -5.0, 0.0, 5.0], &[-5.0, 0.0, 5.0, 0.0]).expect("test: direction");
        assert!(close(wd[0], 0.0));
        assert!(close(wd[1], 90.0));
        assert!(close(wd[2], 180.0));
        assert!(close(wd[3], 270.0));
        assert!(wd.iter().all(|&d| (0.0..360.0).contains(&d)));
    }

    #[test]
    fn components_invert_direction() {
        let (u, v) = uv_components(&[10.0, 10.0], &[90.0, 225.0]).expect("test: components");
        assert_eq!(u[0], -10.0);
        assert_eq!(v[0], 0.0);
        let wd = wind_direction(&u, &v).expect("test: direction");
        assert!(close(wd[0], 90.0));
        assert!(close(wd[1], 225.0));
    }

    #[test]
    fn negative_inputs_are_rejected() {
        assert_eq!(
            uv_components(&[1.0, -1.0], &[0.0, 0.0]),
            Err(MetError::Negative { quantity: "wind speed", index: 1 })
        );
        assert!(air_density(&[288.15], &[-1.0]).is_err());
        assert!(extrapolate_pressure(&[101_325.0], &[-3.0], 0.0, 100.0).is_err());
        assert_eq!(
            air_density(&[1.0, 2.0], &[1.0]),
            Err(MetError::LengthMismatch { expected: 2, found: 1 })
        );
    }

    #[test]
    fn standard_atmosphere_density() {
        let rho = air_density(&[288.15], &[101_325.0]).expect("test: density");
        assert!((rho[0] - 1.225).abs() < 1e-3);
    }

    #[test]
    fn pressure_falls_with_height() {
        let p = extrapolate_pressure(&[101_325.0, 90_000.0], &[288.15, 280.0], 0.0, 100.0).expect("test: p");
        assert!(p[0] < 101_325.0 && p[0] > 100_000.0);
        let back = extrapolate_pressure(&p, &[288.15, 280.0], 100.0, 0.0).expect("test: p");
        assert!((back[0] - 101_325.0).abs() < 1e-6);
        assert!((back[1] - 90_000.0).abs() < 1e-6);
    }

    #[test]
    fn density_adjustment_is_identity_at_mean_density() {
        let adj = density_adjusted_wind_speed(&[8.0, 8.0], &[1.2, 1.2]).expect("test: adjust");
        assert!(close(adj[0], 8.0) && close(adj[1], 8.0));
        let adj = density_adjusted_wind_speed(&[8.0, 8.0], &[1.0, 1.4]).expect("test: adjust");
        assert!(adj[0] < 8.0 && adj[1] > 8.0);
    }

    #[test]
    fn turbulence_intensity_ratio() {
        let ti = turbulence_intensity(&[10.0, 5.0], &[1.0, 1.0]).expect("test: ti");
        assert!(close(ti[0], 0.1) && close(ti[1], 0.2));
    }

    #[test]
    fn shear_two_heights_closed_form() {
        let lower = [5.0, 6.0];
        let upper = [5.0 * 2f64.powf(0.2), 6.0 * 2f64.powf(0.14)];
        let alpha = shear(&[
            Anemometer { height: 40.0, speeds: &lower },
            Anemometer { height: 80.0, speeds: &upper },
        ], 0).expect("test: shear");
        assert!(close(alpha[0].expect("test: alpha"), 0.2));
        assert!(close(alpha[1].expect("test: alpha"), 0.14));
    }

    #[test]
    fn shear_fit_recovers_power_law() {
        let heights = [40.0, 60.0, 80.0, 100.0];
        let cols: Vec<Vec<f64>> = heights
            .iter()
            .map(|&h| vec![7.0 * (h / 80.0_f64).powf(0.18), f64::NAN])
            .collect();
        let sensors: Vec<Anemometer> = heights
            .iter()
            .zip(&cols)
            .map(|(&height, c)| Anemometer { height, speeds: c })
            .collect();
        let alpha = shear(&sensors, 2).expect("test: shear");
        assert!(close(alpha[0].expect("test: alpha"), 0.18));
        assert_eq!(alpha[1], None);
    }

    #[test]
    fn shear_fit_minimizes_speed_residuals() {
        let heights = [40.0, 60.0, 80.0, 100.0];
        let row = [5.2, 6.9, 7.0, 7.9];
        let cols: Vec<[f64; 1]> = row.iter().map(|&u| [u]).collect();
        let sensors: Vec<Anemometer> = heights
            .iter()
            .zip(&cols)
            .map(|(&height, c)| Anemometer { height, speeds: c })
            .collect();
        let alpha = shear(&sensors, 2).expect("test: shear")[0].expect("test: alpha");

        // Stationary point of the squared speed residuals
        let points: Vec<(f64, f64)> = heights.iter().zip(&row).map(|(h, u)| (h / 80.0, u / 7.0)).collect();
        let gradient: f64 = points
            .iter()
            .map(|&(h, u)| (u - h.powf(alpha)) * h.powf(alpha) * h.ln())
            .sum();
        assert!(gradient.abs() < 1e-9, "gradient {gradient}");

        let log_slope = {
            let sxy: f64 = points.iter().map(|(h, u)| h.ln() * u.ln()).sum();
            let sxx: f64 = points.iter().map(|(h, _)| h.ln() * h.ln()).sum();
            sxy / sxx
        };
        assert!((alpha - log_slope).abs() > 1e-6, "noisy row should not reduce to the log-space slope");
    }

    #[test]
    fn shear_requires_usable_sensors() {
        let s = [1.0];
        assert_eq!(shear(&[Anemometer { height: 10.0, speeds: &s }], 0), Err(MetError::TooFewSensors { found: 1 }));
        let twins = [Anemometer { height: 10.0, speeds: &s }, Anemometer { height: 10.0, speeds: &s }];
        assert_eq!(shear(&twins, 0), Err(MetError::InvalidHeights));
        let three = [
            Anemometer { height: 10.0, speeds: &s },
            Anemometer { height: 20.0, speeds: &s },
            Anemometer { height: 30.0, speeds: &s },
        ];
        assert_eq!(shear(&three, 5), Err(MetError::UnknownReference { index: 5 }));
    }

    #[test]
    fn veer_wraps_direction_change() {
        let v = veer(&[350.0, 10.0, 90.0], 40.0, &[10.0, 350.0, 270.0], 80.0).expect("test: veer");
        assert!(close(v[0], 0.5));
        assert!(close(v[1], -0.5));
        assert!(close(v[2], 4.5));
    }
}
