//! Pipeline compiler (C8): turns `(src, dst, formats, alphas)` into a
//! [`Program`] the executor (C9) can run.

use crate::a2b::A2B;
use crate::curve::{Curve, TransferFunction};
use crate::error::{Error, Result};
use crate::linalg::Matrix3x3;
use crate::ops::{Args, ByteWidth, Channel, ClutArg, Op, Program};
use crate::pixel::{AlphaFormat, Layout, PixelFormat};
use crate::profile::{ICCProfile, Pcs};

fn to_layout_op(layout: Layout, store: bool) -> Op {
    if store {
        Op::Store(layout)
    } else {
        Op::Load(layout)
    }
}

/// Emit a `tf_*`/`table8_*`/`table16_*` op for `curve` on `channel`, skipping
/// the identity curve entirely (§4.8: "no-op curves ... are omitted").
fn emit_curve(ops: &mut Vec<Op>, args: &mut Args, channel: Channel, curve: &Curve) {
    match curve {
        Curve::Parametric(tf) if *tf == TransferFunction::IDENTITY => {}
        Curve::Parametric(tf) => {
            let idx = args.push_tf(*tf);
            ops.push(Op::Tf(channel, idx));
        }
        Curve::Table8 { .. } => {
            let (_, idx) = args.push_curve_table(curve);
            ops.push(Op::Table8(channel, idx));
        }
        Curve::Table16Be { .. } => {
            let (_, idx) = args.push_curve_table(curve);
            ops.push(Op::Table16(channel, idx));
        }
    }
}

const CHANNELS: [Channel; 4] = [Channel::R, Channel::G, Channel::B, Channel::A];

fn emit_a2b_device_to_xyz(ops: &mut Vec<Op>, args: &mut Args, a2b: &A2B, pcs_is_lab: bool) -> Result<()> {
    for i in 0..a2b.input_channels as usize {
        if let Some(curve) = &a2b.input_curves[i] {
            emit_curve(ops, args, CHANNELS[i], curve);
        }
    }

    if a2b.input_channels > 0 {
        let byte_width = match a2b.grid {
            crate::a2b::Grid::Grid8(_) => ByteWidth::Eight,
            crate::a2b::Grid::Grid16Be(_) => ByteWidth::Sixteen,
        };
        let clut = ClutArg {
            dims: a2b.input_channels as usize,
            grid_points: a2b.grid_points,
            output_channels: a2b.output_channels as usize,
            grid: a2b.grid,
        };
        let idx = args.push_clut(clut);
        match a2b.input_channels {
            3 => ops.push(Op::Clut3D(byte_width, idx)),
            4 => ops.push(Op::Clut4D(byte_width, idx)),
            _ => {
                return Err(Error::Unsupported(
                    "A2B CLUTs with fewer than 3 input channels are not supported",
                ))
            }
        }
    }

    for i in 0..a2b.matrix_channels as usize {
        if let Some(curve) = &a2b.matrix_curves[i] {
            emit_curve(ops, args, CHANNELS[i], curve);
        }
    }
    if a2b.matrix_channels > 0 && !a2b.matrix.is_identity() {
        let idx = args.push_matrix3x4(a2b.matrix);
        ops.push(Op::Matrix3x4(idx));
    }

    for (i, curve) in a2b.output_curves.iter().enumerate() {
        emit_curve(ops, args, CHANNELS[i], curve);
    }

    if pcs_is_lab {
        ops.push(Op::LabToXyz);
    }
    Ok(())
}

/// Destination-side inverse ingredients computed once up front (§4.8 step 5).
struct DestPrep {
    from_xyz: Matrix3x3,
    inv_trc: [TransferFunction; 3],
}

fn prepare_destination(dst: &ICCProfile) -> Result<DestPrep> {
    if !dst.has_to_xyzd50 || !dst.has_trc {
        return Err(Error::BadMath("destination profile is not usable as a destination"));
    }
    let from_xyz = dst
        .to_xyzd50
        .invert()
        .map_err(|_| Error::BadMath("destination toXYZD50 matrix is not invertible"))?;

    let mut inv_trc = [TransferFunction::IDENTITY; 3];
    for (i, curve) in dst.trc.iter().enumerate() {
        let tf = match curve {
            Curve::Parametric(tf) => *tf,
            _ => return Err(Error::BadMath("destination TRC must be parametric")),
        };
        inv_trc[i] = tf
            .invert()
            .map_err(|_| Error::BadMath("destination TRC is not invertible"))?;
    }
    Ok(DestPrep { from_xyz, inv_trc })
}

/// Bytes-per-pixel times pixel count must fit a 31-bit signed count (§4.8,
/// matching `INT_MAX` in the original C API).
fn check_overlarge(n: usize, bytes_per_pixel: usize) -> Result<()> {
    let total = (n as u128) * (bytes_per_pixel as u128);
    if total > i32::MAX as u128 {
        return Err(Error::OverlargeRequest {
            pixel_count: n,
            bytes_per_pixel,
        });
    }
    Ok(())
}

/// Compile a program transforming `n` pixels from `(src_profile, src_format,
/// src_alpha)` to `(dst_profile, dst_format, dst_alpha)`.
///
/// Null profiles (`None`) default to built-in sRGB (§4.8: "Null profiles
/// default to sRGB").
pub fn compile<'p>(
    src_profile: Option<&ICCProfile<'p>>,
    src_format: PixelFormat,
    src_alpha: AlphaFormat,
    dst_profile: Option<&ICCProfile<'p>>,
    dst_format: PixelFormat,
    dst_alpha: AlphaFormat,
    n: usize,
) -> Result<Program<'p>> {
    check_overlarge(n, src_format.bytes_per_pixel())?;
    check_overlarge(n, dst_format.bytes_per_pixel())?;

    if src_format == dst_format {
        // same width and layout: aliasing is fine regardless of profiles.
    } else if src_format.bytes_per_pixel() != dst_format.bytes_per_pixel() {
        // Formats of different byte widths aliased in-place is rejected by
        // the caller via `Error::Aliasing` (checked against the actual
        // buffers at the `transform` entry point, not here: the compiler
        // doesn't see whether src == dst).
    }

    let src = src_profile.unwrap_or_else(|| crate::builtins::srgb());
    let dst = dst_profile.unwrap_or_else(|| crate::builtins::srgb());

    let mut ops = Vec::new();
    let mut args = Args::default();

    ops.push(to_layout_op(src_format.layout, false));
    if src_format.needs_swap_rb() {
        ops.push(Op::SwapRb);
    }

    let mut dst_is_gray_adjusted = dst_format.layout == Layout::A8 || dst_format.layout == Layout::G8;
    let mut dst_to_xyzd50 = dst.to_xyzd50;
    if dst_is_gray_adjusted {
        dst_to_xyzd50 = Matrix3x3::IDENTITY;
    } else {
        dst_is_gray_adjusted = false;
    }

    let src_is_cmyk = matches!(src.data_color_space, crate::profile::DataColorSpace::Cmyk);
    let mut src_alpha = src_alpha;
    if src_is_cmyk {
        ops.push(Op::Invert);
        src_alpha = AlphaFormat::Unpremul;
    }

    match src_alpha {
        AlphaFormat::Opaque => ops.push(Op::ForceOpaque),
        AlphaFormat::PremulAsEncoded => ops.push(Op::Unpremul),
        _ => {}
    }

    let needs_color_work = !profiles_colorimetrically_equal(src, dst, dst_is_gray_adjusted)
        || src_alpha == AlphaFormat::PremulLinear
        || dst_alpha == AlphaFormat::PremulLinear;

    if needs_color_work {
        let prep = prepare_destination(dst)?;
        let from_xyz = if dst_is_gray_adjusted {
            Matrix3x3::IDENTITY
        } else {
            prep.from_xyz
        };

        let src_to_xyz;
        if src.has_a2b {
            let a2b = src.a2b.as_ref().expect("has_a2b implies a2b is Some");
            emit_a2b_device_to_xyz(&mut ops, &mut args, a2b, src.pcs == Pcs::Lab)?;
            src_to_xyz = Matrix3x3::IDENTITY;
        } else {
            for (i, curve) in src.trc.iter().enumerate() {
                emit_curve(&mut ops, &mut args, CHANNELS[i], curve);
            }
            src_to_xyz = src.to_xyzd50;
        }

        if src_alpha == AlphaFormat::PremulLinear {
            ops.push(Op::Unpremul);
        }

        if src_to_xyz != dst_to_xyzd50 {
            let gamut = from_xyz.concat(&src_to_xyz);
            if !gamut.is_identity() {
                let idx = args.push_matrix3x3(gamut);
                ops.push(Op::Matrix3x3(idx));
            }
        }

        if dst_alpha == AlphaFormat::PremulLinear {
            ops.push(Op::Premul);
        }

        for (i, tf) in prep.inv_trc.iter().enumerate() {
            if *tf != TransferFunction::IDENTITY {
                let idx = args.push_tf(*tf);
                ops.push(Op::Tf(CHANNELS[i], idx));
            }
        }
    }

    match dst_alpha {
        AlphaFormat::Opaque => ops.push(Op::ForceOpaque),
        AlphaFormat::PremulAsEncoded => ops.push(Op::Premul),
        _ => {}
    }
    if dst_format.needs_swap_rb() {
        ops.push(Op::SwapRb);
    }

    if dst_format.is_integer() {
        ops.push(Op::Clamp);
    }

    ops.push(to_layout_op(dst_format.layout, true));

    Ok(Program { ops, args })
}

/// Whether `src` and `dst` would apply the same color transform (same TRCs
/// and matrix, or both defaulting identically), letting the compiler skip
/// the expensive middle section of the pipeline entirely.
fn profiles_colorimetrically_equal(src: &ICCProfile, dst: &ICCProfile, dst_gray_adjusted: bool) -> bool {
    if src.has_a2b || dst_gray_adjusted {
        return false;
    }
    if dst.has_a2b {
        return false;
    }
    if !src.has_trc || !dst.has_trc {
        return false;
    }
    src.to_xyzd50 == dst.to_xyzd50
        && (0..3).all(|i| match (src.trc[i], dst.trc[i]) {
            (Curve::Parametric(a), Curve::Parametric(b)) => a == b,
            _ => false,
        })
}
