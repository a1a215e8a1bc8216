//! Built-in profiles (C10): the sRGB default used when a caller passes `None`
//! (§4.8 "null profiles default to sRGB"), plus the profile-equivalence check
//! used by tests and by callers validating a round-tripped ICC profile.

use std::sync::OnceLock;

use crate::curve::{Curve, TransferFunction};
use crate::linalg::Matrix3x3;
use crate::pixel::{AlphaFormat, PixelFormat};
use crate::profile::{DataColorSpace, ICCProfile, Pcs};

/// The sRGB transfer function, piecewise linear-then-power per IEC 61966-2-1.
pub const SRGB_TF: TransferFunction = TransferFunction {
    g: 2.4,
    a: 1.0 / 1.055,
    b: 0.055 / 1.055,
    c: 1.0 / 12.92,
    d: 0.04045,
    e: 0.0,
    f: 0.0,
};

/// sRGB primaries and D65 white point, adapted to the PCS's D50, as a
/// `RGB -> XYZD50` matrix (Bradford-adapted, the values ICC profiles in the
/// wild carry in their `rXYZ`/`gXYZ`/`bXYZ` tags).
const SRGB_TO_XYZD50: Matrix3x3 = Matrix3x3 {
    vals: [
        [0.4360747, 0.3850649, 0.1430804],
        [0.2225045, 0.7168786, 0.0606169],
        [0.0139322, 0.0971045, 0.7141733],
    ],
};

fn build_srgb() -> ICCProfile<'static> {
    ICCProfile::synthetic(
        DataColorSpace::Rgb,
        Pcs::Xyz,
        [
            Curve::Parametric(SRGB_TF),
            Curve::Parametric(SRGB_TF),
            Curve::Parametric(SRGB_TF),
        ],
        SRGB_TO_XYZD50,
    )
}

fn build_xyzd50() -> ICCProfile<'static> {
    ICCProfile::synthetic(
        DataColorSpace::Rgb,
        Pcs::Xyz,
        [
            Curve::Parametric(TransferFunction::IDENTITY),
            Curve::Parametric(TransferFunction::IDENTITY),
            Curve::Parametric(TransferFunction::IDENTITY),
        ],
        Matrix3x3::IDENTITY,
    )
}

/// The built-in sRGB profile, used whenever a caller passes `None` for a
/// profile. Backed by a `OnceLock` so it can be handed out as `&'static`,
/// satisfying any caller-chosen lifetime.
pub fn srgb() -> &'static ICCProfile<'static> {
    static SRGB: OnceLock<ICCProfile<'static>> = OnceLock::new();
    SRGB.get_or_init(build_srgb)
}

/// A profile representing the PCS itself (identity TRC, identity matrix):
/// device values are already `XYZD50`.
pub fn xyzd50() -> &'static ICCProfile<'static> {
    static XYZD50: OnceLock<ICCProfile<'static>> = OnceLock::new();
    XYZD50.get_or_init(build_xyzd50)
}

/// 252 of the 256 possible byte values (every value except 10, 43, 192, 241:
/// skcms's own choice of "awkward" probe points to skip, since those four
/// land exactly on representable sRGB-table boundaries and would pass even a
/// badly wrong transform).
const PROBE_BYTES: [u8; 252] = {
    let mut bytes = [0u8; 252];
    let mut i = 0u16;
    let mut n = 0usize;
    while i < 256 {
        if i != 10 && i != 43 && i != 192 && i != 241 {
            bytes[n] = i as u8;
            n += 1;
        }
        i += 1;
    }
    bytes
};

/// Whether `a` and `b` produce the same result (within 1 of 255 per channel)
/// when used as the *destination* of a transform from a fixed, "awkward"
/// probe image, i.e. whether they're colorimetrically interchangeable.
pub fn approximately_equal_profiles(a: &ICCProfile, b: &ICCProfile) -> bool {
    use crate::compile::compile;
    use crate::pixel::Layout;

    let n = PROBE_BYTES.len();
    let mut src = vec![0u8; n * 4];
    for (i, &byte) in PROBE_BYTES.iter().enumerate() {
        src[i * 4] = byte;
        src[i * 4 + 1] = byte;
        src[i * 4 + 2] = byte;
        src[i * 4 + 3] = 255;
    }

    let fmt = PixelFormat::new(Layout::Rgba8888);
    let mut out_a = vec![0u8; n * 4];
    let mut out_b = vec![0u8; n * 4];

    let run = |profile: &ICCProfile, out: &mut [u8]| -> bool {
        let program = match compile(
            Some(profile),
            fmt,
            AlphaFormat::Unpremul,
            Some(xyzd50()),
            fmt,
            AlphaFormat::Unpremul,
            n,
        ) {
            Ok(p) => p,
            Err(_) => return false,
        };
        crate::exec::run(&program, &src, out, n).is_ok()
    };

    if !run(a, &mut out_a) || !run(b, &mut out_b) {
        return false;
    }

    out_a
        .iter()
        .zip(out_b.iter())
        .all(|(x, y)| (*x as i16 - *y as i16).abs() <= 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn srgb_is_usable_as_source_and_destination() {
        let profile = srgb();
        assert!(profile.usable_as_source());
        assert!(profile.usable_as_destination());
    }

    #[test]
    fn srgb_is_colorimetrically_equal_to_itself() {
        assert!(approximately_equal_profiles(srgb(), srgb()));
    }

    #[test]
    fn probe_bytes_excludes_the_four_awkward_values() {
        assert_eq!(PROBE_BYTES.len(), 252);
        assert!(!PROBE_BYTES.contains(&10));
        assert!(!PROBE_BYTES.contains(&43));
        assert!(!PROBE_BYTES.contains(&192));
        assert!(!PROBE_BYTES.contains(&241));
    }
}
