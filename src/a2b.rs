//! Decodes `mft1`, `mft2`, and `mAB ` tags into a uniform [`A2B`] record (C5).

use crate::byteio::ByteReader;
use crate::curve::Curve;
use crate::curve_parse::parse_curve;
use crate::error::{Error, Result};
use crate::linalg::Matrix3x4;

const SIG_MFT1: u32 = u32::from_be_bytes(*b"mft1");
const SIG_MFT2: u32 = u32::from_be_bytes(*b"mft2");
const SIG_MAB: u32 = u32::from_be_bytes(*b"mAB ");

/// A device->PCS pipeline: `A-curves -> CLUT -> M-curves -> Matrix -> B-curves`.
///
/// `input_channels == 0` means "skip A+CLUT"; `matrix_channels == 0` means
/// "skip M+Matrix". `output_channels` is always 3.
#[derive(Clone, Debug)]
pub struct A2B<'a> {
    pub input_channels: u8,
    pub output_channels: u8,
    pub matrix_channels: u8,
    pub grid_points: [u8; 4],
    pub grid: Grid<'a>,
    pub input_curves: [Option<Curve<'a>>; 4],
    pub matrix_curves: [Option<Curve<'a>>; 3],
    pub output_curves: [Curve<'a>; 3],
    pub matrix: Matrix3x4,
}

#[derive(Clone, Copy, Debug)]
pub enum Grid<'a> {
    Grid8(&'a [u8]),
    Grid16Be(&'a [u8]),
}

impl<'a> Grid<'a> {
    /// Sample output channel `c` (0..output_channels) at flat `index`.
    pub fn sample(&self, output_channels: usize, index: usize, c: usize) -> f32 {
        match self {
            Grid::Grid8(bytes) => bytes[index * output_channels + c] as f32 / 255.0,
            Grid::Grid16Be(bytes) => {
                let o = (index * output_channels + c) * 2;
                let hi = bytes[o] as u32;
                let lo = bytes[o + 1] as u32;
                ((hi << 8) | lo) as f32 / 65535.0
            }
        }
    }
}

/// Parse the tag payload at `offset` (whose type signature is `mft1`, `mft2`,
/// or `mAB `) into an [`A2B`] record, then canonicalize identity tables.
pub fn parse_a2b<'a>(reader: ByteReader<'a>, offset: usize, pcs_is_xyz: bool) -> Result<A2B<'a>> {
    let sig = reader.read_u32_be(offset)?;
    let mut a2b = match sig {
        SIG_MFT1 => parse_mft(reader, offset, 1)?,
        SIG_MFT2 => parse_mft(reader, offset, 2)?,
        SIG_MAB => parse_mab(reader, offset, pcs_is_xyz)?,
        _ => {
            return Err(Error::BadSignature {
                expected: "mft1, mft2, or mAB ",
                found: sig,
            })
        }
    };
    canonicalize_identities(&mut a2b);
    Ok(a2b)
}

fn parse_mft<'a>(reader: ByteReader<'a>, offset: usize, byte_width: usize) -> Result<A2B<'a>> {
    // Common header: type(4) reserved(4) input_channels(1) output_channels(1)
    // grid_points(1) reserved(1) matrix(36).
    let input_channels = reader.read_u8(offset + 8)?;
    let output_channels = reader.read_u8(offset + 9)?;
    let grid_points = reader.read_u8(offset + 10)?;

    if output_channels != 3 {
        return Err(Error::OutOfRange("mft output_channels must be 3"));
    }
    if input_channels < 1 || input_channels > 4 {
        return Err(Error::OutOfRange("mft input_channels must be in [1, 4]"));
    }
    if grid_points < 2 {
        return Err(Error::OutOfRange("mft grid_points must be >= 2"));
    }

    // The embedded pre-matrix (36 bytes at offset+12) is required to be
    // identity for unsupported PCSXYZ input and is otherwise discarded: we
    // never apply it.
    let common_len = 12 + 36;
    let (input_entries, output_entries, variable_offset) = if byte_width == 1 {
        (256u32, 256u32, offset + common_len)
    } else {
        let input_entries = reader.read_u16_be(offset + common_len)? as u32;
        let output_entries = reader.read_u16_be(offset + common_len + 2)? as u32;
        if !(2..=4096).contains(&input_entries) || !(2..=4096).contains(&output_entries) {
            return Err(Error::OutOfRange("mft2 table entry count must be in [2, 4096]"));
        }
        (input_entries, output_entries, offset + common_len + 4)
    };

    let grid_points_arr = {
        let mut g = [0u8; 4];
        for slot in g.iter_mut().take(input_channels as usize) {
            *slot = grid_points;
        }
        g
    };

    let byte_len_per_input = input_entries as usize * byte_width;
    let byte_len_per_output = output_entries as usize * byte_width;
    let byte_len_all_input = input_channels as usize * byte_len_per_input;
    let byte_len_all_output = output_channels as usize * byte_len_per_output;

    let mut grid_size: usize = output_channels as usize * byte_width;
    for i in 0..input_channels as usize {
        grid_size *= grid_points_arr[i] as usize;
    }

    let total = byte_len_all_input + grid_size + byte_len_all_output;
    let table_bytes = reader.read_bytes(variable_offset, total)?;

    let mut input_curves: [Option<Curve<'a>>; 4] = [None, None, None, None];
    for (i, slot) in input_curves.iter_mut().enumerate().take(input_channels as usize) {
        let data = &table_bytes[i * byte_len_per_input..(i + 1) * byte_len_per_input];
        *slot = Some(if byte_width == 1 {
            Curve::Table8 { data }
        } else {
            Curve::Table16Be { data }
        });
    }

    let grid_bytes = &table_bytes[byte_len_all_input..byte_len_all_input + grid_size];
    let grid = if byte_width == 1 {
        Grid::Grid8(grid_bytes)
    } else {
        Grid::Grid16Be(grid_bytes)
    };

    let output_table_base = byte_len_all_input + grid_size;
    let output_curves = std::array::from_fn(|i| {
        let data = &table_bytes
            [output_table_base + i * byte_len_per_output..output_table_base + (i + 1) * byte_len_per_output];
        if byte_width == 1 {
            Curve::Table8 { data }
        } else {
            Curve::Table16Be { data }
        }
    });

    Ok(A2B {
        input_channels,
        output_channels,
        matrix_channels: 0,
        grid_points: grid_points_arr,
        grid,
        input_curves,
        matrix_curves: [None, None, None],
        output_curves,
        matrix: Matrix3x4::IDENTITY,
    })
}

fn read_curve_sequence<'a>(
    reader: ByteReader<'a>,
    base: usize,
    mut curve_offset: u32,
    count: usize,
) -> Result<Vec<Curve<'a>>> {
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let (curve, consumed) = parse_curve(reader, base + curve_offset as usize)?;
        out.push(curve);
        let aligned = (consumed as u32 + 3) & !3u32;
        curve_offset = curve_offset
            .checked_add(aligned)
            .ok_or(Error::Truncated {
                offset: base,
                size: aligned as usize,
                available: reader.len(),
            })?;
    }
    Ok(out)
}

fn parse_mab<'a>(reader: ByteReader<'a>, offset: usize, pcs_is_xyz: bool) -> Result<A2B<'a>> {
    let input_channels = reader.read_u8(offset + 8)?;
    let output_channels = reader.read_u8(offset + 9)?;
    if output_channels != 3 {
        return Err(Error::OutOfRange("mAB output_channels must be 3"));
    }
    if input_channels > 4 {
        return Err(Error::OutOfRange("mAB input_channels must be <= 4"));
    }

    let b_curve_offset = reader.read_u32_be(offset + 12)?;
    let matrix_offset = reader.read_u32_be(offset + 16)?;
    let m_curve_offset = reader.read_u32_be(offset + 20)?;
    let clut_offset = reader.read_u32_be(offset + 24)?;
    let a_curve_offset = reader.read_u32_be(offset + 28)?;

    if b_curve_offset == 0 {
        return Err(Error::OutOfRange("mAB B-curves are required"));
    }
    let b_curves = read_curve_sequence(reader, offset, b_curve_offset, output_channels as usize)?;
    let output_curves: [Curve<'a>; 3] = [b_curves[0], b_curves[1], b_curves[2]];

    let (matrix_channels, matrix_curves, matrix) = if m_curve_offset != 0 {
        if matrix_offset == 0 {
            return Err(Error::OutOfRange("mAB M-curves require a matrix"));
        }
        let m_curves = read_curve_sequence(reader, offset, m_curve_offset, output_channels as usize)?;
        let encoding_factor = if pcs_is_xyz { 65535.0 / 32768.0 } else { 1.0 };
        let mtx_base = offset + matrix_offset as usize;
        let mut vals = [[0.0f32; 3]; 3];
        let mut translation = [0.0f32; 3];
        for r in 0..3 {
            for c in 0..3 {
                vals[r][c] = encoding_factor * reader.read_s15f16_be(mtx_base + (r * 3 + c) * 4)?;
            }
            translation[r] = encoding_factor * reader.read_s15f16_be(mtx_base + (9 + r) * 4)?;
        }
        (
            output_channels,
            [Some(m_curves[0]), Some(m_curves[1]), Some(m_curves[2])],
            Matrix3x4 {
                matrix: crate::linalg::Matrix3x3 { vals },
                translation,
            },
        )
    } else {
        if matrix_offset != 0 {
            return Err(Error::OutOfRange("mAB matrix requires M-curves"));
        }
        (0u8, [None, None, None], Matrix3x4::IDENTITY)
    };

    let (input_channels_out, grid_points, grid, input_curves) = if a_curve_offset != 0 {
        if clut_offset == 0 {
            return Err(Error::OutOfRange("mAB A-curves require a CLUT"));
        }
        let a_curves = read_curve_sequence(reader, offset, a_curve_offset, input_channels as usize)?;
        let mut input_curves: [Option<Curve<'a>>; 4] = [None, None, None, None];
        for (slot, c) in input_curves.iter_mut().zip(a_curves.iter()) {
            *slot = Some(*c);
        }

        let clut_base = offset + clut_offset as usize;
        let grid_points_bytes = reader.read_bytes(clut_base, 16)?;
        let byte_width = reader.read_u8(clut_base + 16)?;
        let mut grid_points = [0u8; 4];
        let mut grid_size: usize = output_channels as usize * byte_width as usize;
        for i in 0..input_channels as usize {
            let gp = grid_points_bytes[i];
            if gp < 2 {
                return Err(Error::OutOfRange("CLUT grid_points must be >= 2"));
            }
            grid_points[i] = gp;
            grid_size *= gp as usize;
        }
        let variable_offset = clut_base + 20;
        let grid_bytes = reader.read_bytes(variable_offset, grid_size)?;
        let grid = match byte_width {
            1 => Grid::Grid8(grid_bytes),
            2 => Grid::Grid16Be(grid_bytes),
            _ => return Err(Error::OutOfRange("CLUT byte width must be 1 or 2")),
        };
        (input_channels, grid_points, grid, input_curves)
    } else {
        if clut_offset != 0 {
            return Err(Error::OutOfRange("mAB CLUT requires A-curves"));
        }
        if input_channels != output_channels {
            return Err(Error::OutOfRange(
                "mAB without A/CLUT requires input_channels == output_channels",
            ));
        }
        (0u8, [0u8; 4], Grid::Grid8(&[]), [None, None, None, None])
    };

    Ok(A2B {
        input_channels: input_channels_out,
        output_channels,
        matrix_channels,
        grid_points,
        grid,
        input_curves,
        matrix_curves,
        output_curves,
        matrix,
    })
}

fn is_identity_table(curve: &Curve, tol: f32) -> bool {
    let entries = curve.entries();
    if entries < 2 {
        return false;
    }
    let n = entries as usize;
    let fit = crate::fit::fit_linear(curve, n, tol);
    fit.lin_points == n && fit.c == 1.0 && fit.f == 0.0
}

fn canonicalize_identities(a2b: &mut A2B) {
    for i in 0..a2b.input_channels as usize {
        if let Some(curve) = a2b.input_curves[i] {
            let tol = 1.0 / (2.0 * curve.entries() as f32);
            if curve.entries() >= 2 && is_identity_table(&curve, tol) {
                a2b.input_curves[i] = Some(Curve::Parametric(crate::curve::TransferFunction::IDENTITY));
            }
        }
    }
    for i in 0..a2b.matrix_channels as usize {
        if let Some(curve) = a2b.matrix_curves[i] {
            let tol = 1.0 / (2.0 * curve.entries() as f32);
            if curve.entries() >= 2 && is_identity_table(&curve, tol) {
                a2b.matrix_curves[i] = Some(Curve::Parametric(crate::curve::TransferFunction::IDENTITY));
            }
        }
    }
    for curve in a2b.output_curves.iter_mut() {
        let tol = 1.0 / (2.0 * curve.entries() as f32);
        if curve.entries() >= 2 && is_identity_table(curve, tol) {
            *curve = Curve::Parametric(crate::curve::TransferFunction::IDENTITY);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mft1_bytes(grid_points: u8, table: &[u8]) -> Vec<u8> {
        let mut v = vec![0u8; 48];
        v[0..4].copy_from_slice(b"mft1");
        v[8] = 1; // input_channels
        v[9] = 3; // output_channels
        v[10] = grid_points;
        v.extend_from_slice(table);
        v
    }

    #[test]
    fn mft1_identity_canonicalizes() {
        // 1 input channel, 256-entry identity ramp in, 2-point grid (2 entries
        // of 3 output bytes each = identity passthrough), 256-entry identity out.
        let input: Vec<u8> = (0..256).map(|i| i as u8).collect();
        let grid: Vec<u8> = vec![0, 0, 0, 255, 255, 255];
        let output: Vec<u8> = (0..256).map(|i| i as u8).collect();
        let mut table = Vec::new();
        table.extend_from_slice(&input);
        table.extend_from_slice(&grid);
        table.extend_from_slice(&output);

        let bytes = mft1_bytes(2, &table);
        let reader = ByteReader::new(&bytes);
        let a2b = parse_a2b(reader, 0, false).unwrap();
        assert_eq!(a2b.input_channels, 1);
        assert!(a2b.input_curves[0].unwrap().is_identity());
        assert!(a2b.output_curves[0].is_identity());
    }

    #[test]
    fn mft1_rejects_bad_output_channels() {
        let mut bytes = vec![0u8; 48];
        bytes[0..4].copy_from_slice(b"mft1");
        bytes[8] = 1;
        bytes[9] = 4; // invalid: must be 3
        bytes[10] = 2;
        let reader = ByteReader::new(&bytes);
        assert!(matches!(parse_a2b(reader, 0, false), Err(Error::OutOfRange(_))));
    }
}
