//! Transfer-function fitter (C7): `fit_linear` + Gauss-Newton `fit_nonlinear`,
//! plus the top-level `approximate_curve` entry point.

use crate::curve::{Curve, TransferFunction};
use crate::error::{Error, Result};
use crate::linalg::{log2_, pow_, Matrix3x3};

/// Result of [`fit_linear`]: the line `y = c*x + f` fit to the first
/// `lin_points` samples of a curve, with `d` the last x it was fit through.
#[derive(Clone, Copy, Debug)]
pub struct LinearFit {
    pub c: f32,
    pub d: f32,
    pub f: f32,
    pub lin_points: usize,
}

/// Bracketed max-slope/min-slope walk fitting the curve's linear piece.
///
/// Walks `x = i*dx` for `i in 1..N`, narrowing the admissible slope interval
/// `[slope_min, slope_max]` by each point's tolerance band, and stops once the
/// interval becomes empty. `lin_points` is the count of points the final line
/// passes through within `tol`.
pub fn fit_linear(curve: &Curve, n: usize, tol: f32) -> LinearFit {
    assert!(n > 1);
    let dx = 1.0 / (n - 1) as f32;

    let f = curve.eval(0.0);
    let mut lin_points = 1usize;
    let mut c = 0.0f32;
    let mut slope_min = f32::NEG_INFINITY;
    let mut slope_max = f32::INFINITY;

    for i in 1..n {
        let x = i as f32 * dx;
        let y = curve.eval(x);

        let slope_max_i = (y + tol - f) / x;
        let slope_min_i = (y - tol - f) / x;
        if slope_max_i < slope_min || slope_max < slope_min_i {
            break;
        }
        slope_max = slope_max.min(slope_max_i);
        slope_min = slope_min.max(slope_min_i);

        let cur_slope = (y - f) / x;
        if slope_min <= cur_slope && cur_slope <= slope_max {
            lin_points = i + 1;
            c = cur_slope;
        }
    }

    let d = (lin_points - 1) as f32 * dx;
    LinearFit { c, d, f, lin_points }
}

/// Residual and analytic gradient of the inverse-roundtrip error at `x`,
/// against the nonlinear-branch parameters `p = [g, a, b]`.
///
/// `tf.c/d/f` are held fixed; see module docs on the `e` substitution that
/// lets the nonlinear branch be written purely in `g, a, b`.
fn rg_nonlinear(x: f32, curve: &Curve, tf: &TransferFunction, p: [f32; 3]) -> (f32, [f32; 3]) {
    let y = curve.eval(x);
    let (g, a, b) = (p[0], p[1], p[2]);
    let (c, d, f) = (tf.c, tf.d, tf.f);

    let cap_y = (a * y + b).max(0.0);
    let cap_d = a * d + b;

    let dfdp = [
        0.693_147_18 * log2_(cap_y) * pow_(cap_y, g) - 0.693_147_18 * log2_(cap_d) * pow_(cap_d, g),
        y * g * pow_(cap_y, g - 1.0) - d * g * pow_(cap_d, g - 1.0),
        g * pow_(cap_y, g - 1.0) - g * pow_(cap_d, g - 1.0),
    ];

    let f_inv = pow_(cap_y, g) - pow_(cap_d, g) + c * d + f;
    (x - f_inv, dfdp)
}

/// One Gauss-Newton update of `p` from `N` samples over `[x0, x0+(N-1)dx]`.
///
/// Returns `false` if the updated parameters are non-finite (including when
/// the normal-equations matrix fails to invert).
fn gauss_newton_step(
    curve: &Curve,
    tf: &TransferFunction,
    p: &mut [f32; 3],
    x0: f32,
    dx: f32,
    n: usize,
) -> bool {
    let mut lhs = [[0.0f64; 3]; 3];
    let mut rhs = [0.0f64; 3];

    for i in 0..n {
        let x = x0 + i as f32 * dx;
        let (resid, dfdp) = rg_nonlinear(x, curve, tf, *p);
        for r in 0..3 {
            for c in 0..3 {
                lhs[r][c] += dfdp[r] as f64 * dfdp[c] as f64;
            }
            rhs[r] += dfdp[r] as f64 * resid as f64;
        }
    }

    // Parameters that never appear leave a zero row/column; pin to identity
    // so the matrix stays invertible (equivalent to freezing that parameter).
    for k in 0..3 {
        let row_zero = (0..3).all(|c| lhs[k][c] == 0.0);
        let col_zero = (0..3).all(|r| lhs[r][k] == 0.0);
        if row_zero && col_zero {
            lhs[k][k] = 1.0;
        }
    }

    let lhs_f32 = Matrix3x3 {
        vals: [
            [lhs[0][0] as f32, lhs[0][1] as f32, lhs[0][2] as f32],
            [lhs[1][0] as f32, lhs[1][1] as f32, lhs[1][2] as f32],
            [lhs[2][0] as f32, lhs[2][1] as f32, lhs[2][2] as f32],
        ],
    };
    let lhs_inv = match lhs_f32.invert() {
        Ok(m) => m,
        Err(_) => return false,
    };
    let rhs_f32 = [rhs[0] as f32, rhs[1] as f32, rhs[2] as f32];
    let dp = lhs_inv.mul_vec3(rhs_f32);

    p[0] += dp[0];
    p[1] += dp[1];
    p[2] += dp[2];
    p.iter().all(|v| v.is_finite())
}

/// Fit `tf`'s nonlinear piece `(g, a, b)` to the points `[L, N)` via up to
/// three Gauss-Newton steps, holding `c, d, f` fixed.
fn fit_nonlinear(curve: &Curve, l: usize, n: usize, tf: &mut TransferFunction) -> bool {
    let mut p = [tf.g, tf.a, tf.b];
    let dx = 1.0 / (n - 1) as f32;

    for _ in 0..3 {
        if p[1] < 0.0 {
            return false;
        }
        if p[1] * tf.d + p[2] < 0.0 {
            p[2] = -p[1] * tf.d;
        }
        if !gauss_newton_step(curve, tf, &mut p, l as f32 * dx, dx, n - l) {
            return false;
        }
    }

    if p[1] < 0.0 {
        return false;
    }
    if p[1] * tf.d + p[2] < 0.0 {
        p[2] = -p[1] * tf.d;
    }

    tf.g = p[0];
    tf.a = p[1];
    tf.b = p[2];
    tf.e = tf.c * tf.d + tf.f - pow_(tf.a * tf.d + tf.b, tf.g);
    true
}

/// Max absolute error of roundtripping `curve` through `inv_tf` over at least
/// 256 samples (or `curve`'s own entry count, whichever is larger).
pub(crate) fn max_roundtrip_error(curve: &Curve, inv_tf: &TransferFunction) -> f32 {
    let n = curve.entries().max(256);
    let dx = 1.0 / (n - 1) as f32;
    let mut err = 0.0f32;
    for i in 0..n {
        let x = i as f32 * dx;
        let y = curve.eval(x);
        err = err.max((x - inv_tf.eval(y)).abs());
    }
    err
}

const TOLERANCES: [f32; 2] = [1.5 / 65535.0, 1.0 / 512.0];

/// Approximate a tabulated curve with a 7-parameter [`TransferFunction`].
///
/// Tries both tolerances in [`TOLERANCES`], picking the candidate with the
/// smallest round-trip error. Fails with [`Error::Degenerate`] if neither
/// tolerance produces a usable, invertible fit.
pub fn approximate_curve(curve: &Curve) -> Result<(TransferFunction, f32)> {
    let n = curve.entries();
    if n == 0 {
        return Err(Error::Unsupported("cannot approximate a parametric curve with a curve"));
    }
    if n == 1 || n as u64 > i32::MAX as u64 {
        return Err(Error::OutOfRange("curve must have between 2 and INT_MAX entries"));
    }
    let n = n as usize;
    let dx = 1.0 / (n - 1) as f32;

    let mut best: Option<(TransferFunction, f32)> = None;

    for &tol in &TOLERANCES {
        let lin = fit_linear(curve, n, tol);
        let mut tf = TransferFunction {
            g: 0.0,
            a: 0.0,
            b: 0.0,
            c: lin.c,
            d: lin.d,
            e: 0.0,
            f: lin.f,
        };

        if lin.lin_points == n {
            tf = TransferFunction {
                g: 1.0,
                a: tf.c,
                b: tf.f,
                c: 0.0,
                d: 0.0,
                e: 0.0,
                f: 0.0,
            };
        } else if lin.lin_points == n - 1 {
            let y_last = curve.eval((n - 1) as f32 * dx);
            let y_prev = curve.eval((n - 2) as f32 * dx);
            let a = (y_last - y_prev) / dx;
            let b = y_prev - a * (n - 2) as f32 * dx;
            tf.g = 1.0;
            tf.a = a;
            tf.b = b;
            tf.e = 0.0;
        } else {
            let mid = (lin.lin_points + n) / 2;
            let mid_x = mid as f32 / (n - 1) as f32;
            let mid_y = curve.eval(mid_x);
            tf.g = log2_(mid_y) / log2_(mid_x);
            tf.a = 1.0;
            tf.b = 0.0;
            tf.e = tf.c * tf.d + tf.f - pow_(tf.a * tf.d + tf.b, tf.g);

            let mut tf_inv = match tf.invert() {
                Ok(inv) => inv,
                Err(_) => continue,
            };
            if !fit_nonlinear(curve, lin.lin_points, n, &mut tf_inv) {
                continue;
            }
            tf = match tf_inv.invert() {
                Ok(t) => t,
                Err(_) => continue,
            };
        }

        let tf_inv = match tf.invert() {
            Ok(inv) => inv,
            Err(_) => continue,
        };
        let err = max_roundtrip_error(curve, &tf_inv);
        if best.map(|(_, best_err)| err < best_err).unwrap_or(true) {
            best = Some((tf, err));
        }
    }

    match best {
        Some((tf, err)) if err.is_finite() => Ok((tf, err)),
        _ => Err(Error::Degenerate("transfer function fit did not converge within tolerance")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn srgb() -> TransferFunction {
        TransferFunction {
            g: 2.4,
            a: 1.0 / 1.055,
            b: 0.055 / 1.055,
            c: 1.0 / 12.92,
            d: 0.04045,
            e: 0.0,
            f: 0.0,
        }
    }

    fn sample_curve(tf: TransferFunction, entries: usize) -> Vec<u8> {
        (0..entries)
            .map(|i| {
                let x = i as f32 / (entries - 1) as f32;
                (tf.eval(x).clamp(0.0, 1.0) * 255.0).round() as u8
            })
            .collect()
    }

    #[test]
    fn approximates_srgb_curve_closely() {
        let tf = srgb();
        let data = sample_curve(tf, 256);
        let curve = Curve::Table8 { data: &data };
        let (approx, max_error) = approximate_curve(&curve).unwrap();
        assert!(max_error < 1.0 / 100.0, "max_error={max_error}");
        assert!((approx.g - tf.g).abs() < 0.2, "approx={approx:?}");
    }

    #[test]
    fn linear_table_fits_as_pure_gamma_one() {
        let data: Vec<u8> = (0..=255).collect();
        let curve = Curve::Table8 { data: &data };
        let (tf, max_error) = approximate_curve(&curve).unwrap();
        assert!((tf.g - 1.0).abs() < 1e-3);
        assert!(max_error < 1.0 / 100.0);
    }

    #[test]
    fn parametric_curve_cannot_be_approximated() {
        let curve = Curve::Parametric(TransferFunction::IDENTITY);
        assert!(matches!(approximate_curve(&curve), Err(Error::Unsupported(_))));
    }

    #[test]
    fn fit_linear_identifies_fully_linear_ramp() {
        let data: Vec<u8> = (0..=255).collect();
        let curve = Curve::Table8 { data: &data };
        let fit = fit_linear(&curve, 256, 1.0 / 512.0);
        assert_eq!(fit.lin_points, 256);
        assert!((fit.c - 1.0).abs() < 1e-3);
    }
}
