//! The pipeline executor (C9): runs a compiled [`Program`] over a batch of
//! pixels.
//!
//! Pixels are processed `lanes` at a time into a fixed-width [`Lanes`]
//! register file (four `[f32; MAX_LANES]` arrays: r, g, b, a), one op at a
//! time, matching the flat op alphabet `compile` emitted. `lanes` is chosen
//! once per process via [`lane_width`] and is a plain scalar fallback of 1
//! unless a wider vector unit is detected; there's no unsafe SIMD here, only
//! straight-line scalar loops shaped so LLVM's auto-vectorizer (helped by
//! `#[multiversion]`) can pack them into the detected width.

use multiversion::multiversion;

use crate::a2b::Grid;
use crate::curve::{Curve, TransferFunction};
use crate::error::{Error, Result};
use crate::linalg::{Matrix3x3, Matrix3x4};
use crate::ops::{Args, Channel, ClutArg, Op, Program};
use crate::pixel::Layout;

/// Widest lane count this executor supports. AVX2 gives 8 f32 lanes; we cap
/// at 16 to leave room without ever needing a runtime-sized allocation for
/// the per-batch register file.
const MAX_LANES: usize = 16;

fn probe_lane_width() -> usize {
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") {
            return 8;
        }
        if is_x86_feature_detected!("sse4.1") {
            return 4;
        }
    }
    #[cfg(target_arch = "aarch64")]
    {
        if std::arch::is_aarch64_feature_detected!("neon") {
            return 4;
        }
    }
    1
}

/// The lane count this process will use, probed once and cached (§5: a
/// `OnceLock` gives release/acquire semantics for free, so every caller after
/// the first sees a fully-initialized value with no extra synchronization).
pub fn lane_width() -> usize {
    use std::sync::OnceLock;
    static LANES: OnceLock<usize> = OnceLock::new();
    *LANES.get_or_init(probe_lane_width)
}

/// The four color registers, `lanes` pixels wide.
#[derive(Clone, Copy)]
struct Lanes {
    r: [f32; MAX_LANES],
    g: [f32; MAX_LANES],
    b: [f32; MAX_LANES],
    a: [f32; MAX_LANES],
    count: usize,
}

impl Lanes {
    fn zeroed(count: usize) -> Self {
        Lanes {
            r: [0.0; MAX_LANES],
            g: [0.0; MAX_LANES],
            b: [0.0; MAX_LANES],
            a: [1.0; MAX_LANES],
            count,
        }
    }

    fn channel(&self, ch: Channel) -> &[f32; MAX_LANES] {
        match ch {
            Channel::R => &self.r,
            Channel::G => &self.g,
            Channel::B => &self.b,
            Channel::A => &self.a,
        }
    }

    fn channel_mut(&mut self, ch: Channel) -> &mut [f32; MAX_LANES] {
        match ch {
            Channel::R => &mut self.r,
            Channel::G => &mut self.g,
            Channel::B => &mut self.b,
            Channel::A => &mut self.a,
        }
    }

    fn swap_rb(&mut self) {
        for i in 0..self.count {
            std::mem::swap(&mut self.r[i], &mut self.b[i]);
        }
    }

    fn clamp(&mut self) {
        for i in 0..self.count {
            self.r[i] = self.r[i].clamp(0.0, 1.0);
            self.g[i] = self.g[i].clamp(0.0, 1.0);
            self.b[i] = self.b[i].clamp(0.0, 1.0);
            self.a[i] = self.a[i].clamp(0.0, 1.0);
        }
    }

    fn invert(&mut self) {
        for i in 0..self.count {
            self.r[i] = 1.0 - self.r[i];
            self.g[i] = 1.0 - self.g[i];
            self.b[i] = 1.0 - self.b[i];
            self.a[i] = 1.0 - self.a[i];
        }
    }

    fn force_opaque(&mut self) {
        for i in 0..self.count {
            self.a[i] = 1.0;
        }
    }

    fn premul(&mut self) {
        for i in 0..self.count {
            self.r[i] *= self.a[i];
            self.g[i] *= self.a[i];
            self.b[i] *= self.a[i];
        }
    }

    fn unpremul(&mut self) {
        for i in 0..self.count {
            let scale = if (1.0 / self.a[i]).is_finite() { 1.0 / self.a[i] } else { 0.0 };
            self.r[i] *= scale;
            self.g[i] *= scale;
            self.b[i] *= scale;
        }
    }

    fn apply_matrix3x3(&mut self, m: &Matrix3x3) {
        for i in 0..self.count {
            let v = m.mul_vec3([self.r[i], self.g[i], self.b[i]]);
            self.r[i] = v[0];
            self.g[i] = v[1];
            self.b[i] = v[2];
        }
    }

    fn apply_matrix3x4(&mut self, m: &Matrix3x4) {
        for i in 0..self.count {
            let v = m.apply([self.r[i], self.g[i], self.b[i]]);
            self.r[i] = v[0];
            self.g[i] = v[1];
            self.b[i] = v[2];
        }
    }

    /// CIELAB (as encoded by an ICC `Lab` PCS: L in [0, 100], a/b in
    /// [-128, 127] but stored here normalized to [0, 1]) to XYZD50.
    fn lab_to_xyz(&mut self) {
        fn finv(t: f32) -> f32 {
            if t > 6.0 / 29.0 {
                t * t * t
            } else {
                3.0 * (6.0f32 / 29.0).powi(2) * (t - 4.0 / 29.0)
            }
        }
        const WHITE_D50: [f32; 3] = [0.9642, 1.0, 0.8249];
        for i in 0..self.count {
            let l = self.r[i] * 100.0;
            let a = self.g[i] * 255.0 - 128.0;
            let b = self.b[i] * 255.0 - 128.0;
            let fy = (l + 16.0) / 116.0;
            let fx = fy + a / 500.0;
            let fz = fy - b / 200.0;
            self.r[i] = finv(fx) * WHITE_D50[0];
            self.g[i] = finv(fy) * WHITE_D50[1];
            self.b[i] = finv(fz) * WHITE_D50[2];
        }
    }

    fn apply_tf(&mut self, ch: Channel, tf: &TransferFunction) {
        let count = self.count;
        let chan = self.channel_mut(ch);
        for v in chan.iter_mut().take(count) {
            *v = tf.eval(*v);
        }
    }

    fn apply_table8(&mut self, ch: Channel, data: &[u8]) {
        let curve = Curve::Table8 { data };
        let count = self.count;
        let chan = self.channel_mut(ch);
        for v in chan.iter_mut().take(count) {
            *v = curve.eval(*v);
        }
    }

    fn apply_table16(&mut self, ch: Channel, data: &[u8]) {
        let curve = Curve::Table16Be { data };
        let count = self.count;
        let chan = self.channel_mut(ch);
        for v in chan.iter_mut().take(count) {
            *v = curve.eval(*v);
        }
    }

    fn apply_clut(&mut self, dims: usize, clut: &ClutArg) {
        for i in 0..self.count {
            let values = [self.r[i], self.g[i], self.b[i], self.a[i]];
            let out = clut_sample(&clut.grid, dims, &clut.grid_points, clut.output_channels, values);
            self.r[i] = out[0];
            self.g[i] = out[1];
            self.b[i] = out[2];
            if dims == 4 {
                self.a[i] = 1.0;
            }
        }
    }
}

/// Recursive linear interpolation over an N-dimensional CLUT (§4.9).
///
/// Walks dimensions from `0` (channel r) to `dims - 1`, each contributing a
/// lerp weight; grid-point strides grow as dimensions are consumed, so
/// channel 0 is the fastest-varying index into `grid`.
fn clut_sample(grid: &Grid, dims: usize, grid_points: &[u8; 4], output_channels: usize, values: [f32; 4]) -> [f32; 3] {
    fn rec(
        d: usize,
        dims: usize,
        grid_points: &[u8; 4],
        output_channels: usize,
        values: &[f32; 4],
        grid: &Grid,
        stride: usize,
        index: usize,
    ) -> [f32; 3] {
        if d == dims {
            return [
                grid.sample(output_channels, index, 0),
                grid.sample(output_channels, index, 1),
                grid.sample(output_channels, index, 2),
            ];
        }
        let gp = grid_points[d] as usize;
        let x = values[d].clamp(0.0, 1.0) * (gp - 1) as f32;
        let lo = (x.floor() as usize).min(gp.saturating_sub(2));
        let hi = lo + 1;
        let t = x - lo as f32;
        let lo_out = rec(d + 1, dims, grid_points, output_channels, values, grid, stride * gp, index + stride * lo);
        let hi_out = rec(d + 1, dims, grid_points, output_channels, values, grid, stride * gp, index + stride * hi);
        [
            lo_out[0] + t * (hi_out[0] - lo_out[0]),
            lo_out[1] + t * (hi_out[1] - lo_out[1]),
            lo_out[2] + t * (hi_out[2] - lo_out[2]),
        ]
    }
    rec(0, dims, grid_points, output_channels, &values, grid, 1, 0)
}

fn half_bits_to_f32(bits: u16) -> f32 {
    let sign = (bits & 0x8000) as u32;
    let exp = (bits >> 10) & 0x1F;
    let mantissa = (bits & 0x03FF) as u32;

    if exp == 0 {
        // Denormals flush to zero (§4.9), sign preserved.
        return f32::from_bits(sign << 16);
    }
    if exp == 0x1F {
        let f_mantissa = if mantissa != 0 { 0x0040_0000 } else { 0 };
        return f32::from_bits((sign << 16) | 0x7F80_0000 | f_mantissa);
    }
    let f_exp = (exp as u32 + (127 - 15)) << 23;
    let f_mantissa = mantissa << 13;
    f32::from_bits((sign << 16) | f_exp | f_mantissa)
}

fn f32_to_half_bits(f: f32) -> u16 {
    let bits = f.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exp = ((bits >> 23) & 0xFF) as i32;
    let mantissa = bits & 0x007F_FFFF;

    if exp == 0xFF {
        let half_mantissa = if mantissa != 0 { 0x0200 } else { 0 };
        return sign | 0x7C00 | half_mantissa;
    }
    let unbiased = exp - 127;
    let half_exp = unbiased + 15;
    if half_exp >= 0x1F {
        return sign | 0x7C00;
    }
    if half_exp <= 0 {
        // Underflows a half normal: flush to zero rather than encode a
        // denormal the decoder would flush right back anyway.
        return sign;
    }
    let half_mantissa = (mantissa >> 13) as u16;
    sign | ((half_exp as u16) << 10) | half_mantissa
}

fn to_u(x: f32, max: f32) -> u32 {
    (x.mul_add(max, 0.5)).clamp(0.0, max) as u32
}

/// Unpack one pixel's worth of bytes into the next free lane of `regs`.
fn decode_pixel(layout: Layout, bytes: &[u8], regs: &mut Lanes, lane: usize) {
    match layout {
        Layout::A8 => {
            regs.a[lane] = bytes[0] as f32 / 255.0;
        }
        Layout::G8 => {
            let v = bytes[0] as f32 / 255.0;
            regs.r[lane] = v;
            regs.g[lane] = v;
            regs.b[lane] = v;
            regs.a[lane] = 1.0;
        }
        Layout::Abgr4444 => {
            let word = u16::from_be_bytes([bytes[0], bytes[1]]);
            regs.r[lane] = ((word >> 12) & 0xF) as f32 / 15.0;
            regs.g[lane] = ((word >> 8) & 0xF) as f32 / 15.0;
            regs.b[lane] = ((word >> 4) & 0xF) as f32 / 15.0;
            regs.a[lane] = (word & 0xF) as f32 / 15.0;
        }
        Layout::Rgb565 => {
            let word = u16::from_be_bytes([bytes[0], bytes[1]]);
            regs.r[lane] = (word & 0x1F) as f32 / 31.0;
            regs.g[lane] = ((word >> 5) & 0x3F) as f32 / 63.0;
            regs.b[lane] = ((word >> 11) & 0x1F) as f32 / 31.0;
            regs.a[lane] = 1.0;
        }
        Layout::Rgb888 => {
            regs.r[lane] = bytes[0] as f32 / 255.0;
            regs.g[lane] = bytes[1] as f32 / 255.0;
            regs.b[lane] = bytes[2] as f32 / 255.0;
            regs.a[lane] = 1.0;
        }
        Layout::Rgba8888 => {
            regs.r[lane] = bytes[0] as f32 / 255.0;
            regs.g[lane] = bytes[1] as f32 / 255.0;
            regs.b[lane] = bytes[2] as f32 / 255.0;
            regs.a[lane] = bytes[3] as f32 / 255.0;
        }
        Layout::Rgba1010102 => {
            let word = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            regs.r[lane] = (word & 0x3FF) as f32 / 1023.0;
            regs.g[lane] = ((word >> 10) & 0x3FF) as f32 / 1023.0;
            regs.b[lane] = ((word >> 20) & 0x3FF) as f32 / 1023.0;
            regs.a[lane] = ((word >> 30) & 0x3) as f32 / 3.0;
        }
        Layout::Rgb161616Be => {
            regs.r[lane] = u16::from_be_bytes([bytes[0], bytes[1]]) as f32 / 65535.0;
            regs.g[lane] = u16::from_be_bytes([bytes[2], bytes[3]]) as f32 / 65535.0;
            regs.b[lane] = u16::from_be_bytes([bytes[4], bytes[5]]) as f32 / 65535.0;
            regs.a[lane] = 1.0;
        }
        Layout::Rgba16161616Be => {
            regs.r[lane] = u16::from_be_bytes([bytes[0], bytes[1]]) as f32 / 65535.0;
            regs.g[lane] = u16::from_be_bytes([bytes[2], bytes[3]]) as f32 / 65535.0;
            regs.b[lane] = u16::from_be_bytes([bytes[4], bytes[5]]) as f32 / 65535.0;
            regs.a[lane] = u16::from_be_bytes([bytes[6], bytes[7]]) as f32 / 65535.0;
        }
        Layout::RgbHalf => {
            regs.r[lane] = half_bits_to_f32(u16::from_ne_bytes([bytes[0], bytes[1]]));
            regs.g[lane] = half_bits_to_f32(u16::from_ne_bytes([bytes[2], bytes[3]]));
            regs.b[lane] = half_bits_to_f32(u16::from_ne_bytes([bytes[4], bytes[5]]));
            regs.a[lane] = 1.0;
        }
        Layout::RgbaHalf => {
            regs.r[lane] = half_bits_to_f32(u16::from_ne_bytes([bytes[0], bytes[1]]));
            regs.g[lane] = half_bits_to_f32(u16::from_ne_bytes([bytes[2], bytes[3]]));
            regs.b[lane] = half_bits_to_f32(u16::from_ne_bytes([bytes[4], bytes[5]]));
            regs.a[lane] = half_bits_to_f32(u16::from_ne_bytes([bytes[6], bytes[7]]));
        }
        Layout::RgbFloat => {
            regs.r[lane] = f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            regs.g[lane] = f32::from_ne_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
            regs.b[lane] = f32::from_ne_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
            regs.a[lane] = 1.0;
        }
        Layout::RgbaFloat => {
            regs.r[lane] = f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            regs.g[lane] = f32::from_ne_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
            regs.b[lane] = f32::from_ne_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
            regs.a[lane] = f32::from_ne_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
        }
    }
}

/// Pack one lane of `regs` back into its pixel's worth of bytes. Integer
/// formats assume a preceding `Clamp` op already bounded the values.
fn encode_pixel(layout: Layout, regs: &Lanes, lane: usize, bytes: &mut [u8]) {
    match layout {
        Layout::A8 => {
            bytes[0] = to_u(regs.a[lane], 255.0) as u8;
        }
        Layout::G8 => {
            bytes[0] = to_u(regs.g[lane], 255.0) as u8;
        }
        Layout::Abgr4444 => {
            let r = to_u(regs.r[lane], 15.0) as u16;
            let g = to_u(regs.g[lane], 15.0) as u16;
            let b = to_u(regs.b[lane], 15.0) as u16;
            let a = to_u(regs.a[lane], 15.0) as u16;
            let word = (r << 12) | (g << 8) | (b << 4) | a;
            bytes[0..2].copy_from_slice(&word.to_be_bytes());
        }
        Layout::Rgb565 => {
            let r = to_u(regs.r[lane], 31.0) as u16;
            let g = to_u(regs.g[lane], 63.0) as u16;
            let b = to_u(regs.b[lane], 31.0) as u16;
            let word = r | (g << 5) | (b << 11);
            bytes[0..2].copy_from_slice(&word.to_be_bytes());
        }
        Layout::Rgb888 => {
            bytes[0] = to_u(regs.r[lane], 255.0) as u8;
            bytes[1] = to_u(regs.g[lane], 255.0) as u8;
            bytes[2] = to_u(regs.b[lane], 255.0) as u8;
        }
        Layout::Rgba8888 => {
            bytes[0] = to_u(regs.r[lane], 255.0) as u8;
            bytes[1] = to_u(regs.g[lane], 255.0) as u8;
            bytes[2] = to_u(regs.b[lane], 255.0) as u8;
            bytes[3] = to_u(regs.a[lane], 255.0) as u8;
        }
        Layout::Rgba1010102 => {
            let r = to_u(regs.r[lane], 1023.0);
            let g = to_u(regs.g[lane], 1023.0);
            let b = to_u(regs.b[lane], 1023.0);
            let a = to_u(regs.a[lane], 3.0);
            let word = r | (g << 10) | (b << 20) | (a << 30);
            bytes[0..4].copy_from_slice(&word.to_be_bytes());
        }
        Layout::Rgb161616Be => {
            bytes[0..2].copy_from_slice(&(to_u(regs.r[lane], 65535.0) as u16).to_be_bytes());
            bytes[2..4].copy_from_slice(&(to_u(regs.g[lane], 65535.0) as u16).to_be_bytes());
            bytes[4..6].copy_from_slice(&(to_u(regs.b[lane], 65535.0) as u16).to_be_bytes());
        }
        Layout::Rgba16161616Be => {
            bytes[0..2].copy_from_slice(&(to_u(regs.r[lane], 65535.0) as u16).to_be_bytes());
            bytes[2..4].copy_from_slice(&(to_u(regs.g[lane], 65535.0) as u16).to_be_bytes());
            bytes[4..6].copy_from_slice(&(to_u(regs.b[lane], 65535.0) as u16).to_be_bytes());
            bytes[6..8].copy_from_slice(&(to_u(regs.a[lane], 65535.0) as u16).to_be_bytes());
        }
        Layout::RgbHalf => {
            bytes[0..2].copy_from_slice(&f32_to_half_bits(regs.r[lane]).to_ne_bytes());
            bytes[2..4].copy_from_slice(&f32_to_half_bits(regs.g[lane]).to_ne_bytes());
            bytes[4..6].copy_from_slice(&f32_to_half_bits(regs.b[lane]).to_ne_bytes());
        }
        Layout::RgbaHalf => {
            bytes[0..2].copy_from_slice(&f32_to_half_bits(regs.r[lane]).to_ne_bytes());
            bytes[2..4].copy_from_slice(&f32_to_half_bits(regs.g[lane]).to_ne_bytes());
            bytes[4..6].copy_from_slice(&f32_to_half_bits(regs.b[lane]).to_ne_bytes());
            bytes[6..8].copy_from_slice(&f32_to_half_bits(regs.a[lane]).to_ne_bytes());
        }
        Layout::RgbFloat => {
            bytes[0..4].copy_from_slice(&regs.r[lane].to_ne_bytes());
            bytes[4..8].copy_from_slice(&regs.g[lane].to_ne_bytes());
            bytes[8..12].copy_from_slice(&regs.b[lane].to_ne_bytes());
        }
        Layout::RgbaFloat => {
            bytes[0..4].copy_from_slice(&regs.r[lane].to_ne_bytes());
            bytes[4..8].copy_from_slice(&regs.g[lane].to_ne_bytes());
            bytes[8..12].copy_from_slice(&regs.b[lane].to_ne_bytes());
            bytes[12..16].copy_from_slice(&regs.a[lane].to_ne_bytes());
        }
    }
}

#[multiversion(targets("x86_64+avx2", "x86_64+sse4.1", "aarch64+neon"))]
fn load_layout(layout: Layout, src: &[u8], lanes: usize) -> Lanes {
    let bpp = layout.bytes_per_pixel();
    let mut regs = Lanes::zeroed(lanes);
    for lane in 0..lanes {
        decode_pixel(layout, &src[lane * bpp..(lane + 1) * bpp], &mut regs, lane);
    }
    regs
}

#[multiversion(targets("x86_64+avx2", "x86_64+sse4.1", "aarch64+neon"))]
fn store_layout(layout: Layout, regs: &Lanes, dst: &mut [u8], lanes: usize) {
    let bpp = layout.bytes_per_pixel();
    for lane in 0..lanes {
        encode_pixel(layout, regs, lane, &mut dst[lane * bpp..(lane + 1) * bpp]);
    }
}

#[multiversion(targets("x86_64+avx2", "x86_64+sse4.1", "aarch64+neon"))]
fn apply_middle_ops(ops: &[Op], args: &Args, regs: &mut Lanes) {
    for op in ops {
        match op {
            Op::Load(_) | Op::Store(_) => unreachable!("load/store handled by the caller"),
            Op::SwapRb => regs.swap_rb(),
            Op::Clamp => regs.clamp(),
            Op::Invert => regs.invert(),
            Op::ForceOpaque => regs.force_opaque(),
            Op::Premul => regs.premul(),
            Op::Unpremul => regs.unpremul(),
            Op::Matrix3x3(idx) => regs.apply_matrix3x3(&args.matrices3x3[*idx as usize]),
            Op::Matrix3x4(idx) => regs.apply_matrix3x4(&args.matrices3x4[*idx as usize]),
            Op::LabToXyz => regs.lab_to_xyz(),
            Op::Tf(ch, idx) => regs.apply_tf(*ch, &args.tfs[*idx as usize]),
            Op::Table8(ch, idx) => regs.apply_table8(*ch, args.table8[*idx as usize]),
            Op::Table16(ch, idx) => regs.apply_table16(*ch, args.table16[*idx as usize]),
            Op::Clut3D(_, idx) => regs.apply_clut(3, &args.cluts[*idx as usize]),
            Op::Clut4D(_, idx) => regs.apply_clut(4, &args.cluts[*idx as usize]),
        }
    }
}

fn endpoints(program: &Program) -> Result<(Layout, Layout)> {
    let src_layout = match program.ops.first() {
        Some(Op::Load(l)) => *l,
        _ => return Err(Error::Unsupported("program does not start with a load")),
    };
    let dst_layout = match program.ops.last() {
        Some(Op::Store(l)) => *l,
        _ => return Err(Error::Unsupported("program does not end with a store")),
    };
    Ok((src_layout, dst_layout))
}

fn middle(program: &Program) -> &[Op] {
    &program.ops[1..program.ops.len() - 1]
}

/// Run `program` over `n` pixels from `src` into `dst`. `src` and `dst` must
/// not overlap; for in-place conversion, use [`run_in_place`].
pub fn run(program: &Program, src: &[u8], dst: &mut [u8], n: usize) -> Result<()> {
    let (src_layout, dst_layout) = endpoints(program)?;
    let src_bpp = src_layout.bytes_per_pixel();
    let dst_bpp = dst_layout.bytes_per_pixel();

    if src.len() < n * src_bpp {
        return Err(Error::Truncated {
            offset: 0,
            size: n * src_bpp,
            available: src.len(),
        });
    }
    if dst.len() < n * dst_bpp {
        return Err(Error::Truncated {
            offset: 0,
            size: n * dst_bpp,
            available: dst.len(),
        });
    }

    let lanes = lane_width().min(MAX_LANES);
    let ops = middle(program);
    let full_batches = n / lanes;
    for batch in 0..full_batches {
        let src_off = batch * lanes * src_bpp;
        let dst_off = batch * lanes * dst_bpp;
        let mut regs = load_layout(src_layout, &src[src_off..src_off + lanes * src_bpp], lanes);
        apply_middle_ops(ops, &program.args, &mut regs);
        store_layout(dst_layout, &regs, &mut dst[dst_off..dst_off + lanes * dst_bpp], lanes);
    }

    let remaining = n - full_batches * lanes;
    if remaining > 0 {
        let tail_src_off = full_batches * lanes * src_bpp;
        let tail_dst_off = full_batches * lanes * dst_bpp;
        let mut scratch_src = vec![0u8; lanes * src_bpp];
        scratch_src[..remaining * src_bpp].copy_from_slice(&src[tail_src_off..tail_src_off + remaining * src_bpp]);
        let mut regs = load_layout(src_layout, &scratch_src, lanes);
        apply_middle_ops(ops, &program.args, &mut regs);
        let mut scratch_dst = vec![0u8; lanes * dst_bpp];
        store_layout(dst_layout, &regs, &mut scratch_dst, lanes);
        dst[tail_dst_off..tail_dst_off + remaining * dst_bpp]
            .copy_from_slice(&scratch_dst[..remaining * dst_bpp]);
    }
    Ok(())
}

/// Run `program` over `n` pixels in `buf`, reading and writing the same
/// bytes. Only valid when the source and destination layouts share a byte
/// width; [`crate::transform::transform_in_place`] checks this before
/// calling in.
pub fn run_in_place(program: &Program, buf: &mut [u8], n: usize) -> Result<()> {
    let (src_layout, dst_layout) = endpoints(program)?;
    let bpp = src_layout.bytes_per_pixel();
    if bpp != dst_layout.bytes_per_pixel() {
        return Err(Error::Aliasing);
    }
    if buf.len() < n * bpp {
        return Err(Error::Truncated {
            offset: 0,
            size: n * bpp,
            available: buf.len(),
        });
    }

    let lanes = lane_width().min(MAX_LANES);
    let ops = middle(program);
    let full_batches = n / lanes;
    for batch in 0..full_batches {
        let off = batch * lanes * bpp;
        let chunk = &mut buf[off..off + lanes * bpp];
        let mut regs = load_layout(src_layout, chunk, lanes);
        apply_middle_ops(ops, &program.args, &mut regs);
        store_layout(dst_layout, &regs, chunk, lanes);
    }

    let remaining = n - full_batches * lanes;
    if remaining > 0 {
        let off = full_batches * lanes * bpp;
        let mut scratch = vec![0u8; lanes * bpp];
        scratch[..remaining * bpp].copy_from_slice(&buf[off..off + remaining * bpp]);
        let mut regs = load_layout(src_layout, &scratch, lanes);
        apply_middle_ops(ops, &program.args, &mut regs);
        store_layout(dst_layout, &regs, &mut scratch, lanes);
        buf[off..off + remaining * bpp].copy_from_slice(&scratch[..remaining * bpp]);
    }
    Ok(())
}
