//! Top-level ICC profile parser (C6): header, tag table, TRC/XYZ and A2B paths.

use crate::a2b::{parse_a2b, A2B};
use crate::byteio::ByteReader;
use crate::curve::{Curve, TransferFunction};
use crate::curve_parse::parse_curve;
use crate::error::{Error, Result};
use crate::linalg::Matrix3x3;

const HEADER_LEN: usize = 132;
const TAG_ENTRY_LEN: usize = 12;

const SIG_ACSP: u32 = u32::from_be_bytes(*b"acsp");
const SIG_XYZ_PCS: u32 = u32::from_be_bytes(*b"XYZ ");
const SIG_LAB_PCS: u32 = u32::from_be_bytes(*b"Lab ");
const SIG_GRAY: u32 = u32::from_be_bytes(*b"GRAY");
const SIG_RGB: u32 = u32::from_be_bytes(*b"RGB ");
const SIG_CMYK: u32 = u32::from_be_bytes(*b"CMYK");

const SIG_R_TRC: u32 = u32::from_be_bytes(*b"rTRC");
const SIG_G_TRC: u32 = u32::from_be_bytes(*b"gTRC");
const SIG_B_TRC: u32 = u32::from_be_bytes(*b"bTRC");
const SIG_K_TRC: u32 = u32::from_be_bytes(*b"kTRC");
const SIG_R_XYZ: u32 = u32::from_be_bytes(*b"rXYZ");
const SIG_G_XYZ: u32 = u32::from_be_bytes(*b"gXYZ");
const SIG_B_XYZ: u32 = u32::from_be_bytes(*b"bXYZ");
const SIG_A2B0: u32 = u32::from_be_bytes(*b"A2B0");
const SIG_A2B1: u32 = u32::from_be_bytes(*b"A2B1");
const SIG_CHAD: u32 = u32::from_be_bytes(*b"chad");
const SIG_SF32: u32 = u32::from_be_bytes(*b"sf32");
const SIG_XYZ_TYPE: u32 = u32::from_be_bytes(*b"XYZ ");

/// Data color space a profile's device values are encoded in.
///
/// Only the spaces this crate's pipeline understands; any other signature is
/// preserved in [`DataColorSpace::Other`] so callers can still reject it with
/// context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataColorSpace {
    Gray,
    Rgb,
    Cmyk,
    Other(u32),
}

impl DataColorSpace {
    fn from_sig(sig: u32) -> Self {
        match sig {
            SIG_GRAY => DataColorSpace::Gray,
            SIG_RGB => DataColorSpace::Rgb,
            SIG_CMYK => DataColorSpace::Cmyk,
            other => DataColorSpace::Other(other),
        }
    }
}

/// Profile connection space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pcs {
    Xyz,
    Lab,
}

struct TagEntry {
    signature: u32,
    offset: u32,
    size: u32,
}

/// A parsed ICC profile, borrowing from the caller's byte buffer.
///
/// Every [`Curve`]/[`A2B`] table inside aliases `buffer`; the profile is
/// valid only as long as `buffer` is, and nothing here copies the payload.
pub struct ICCProfile<'a> {
    buffer: &'a [u8],
    reader: ByteReader<'a>,
    pub size: u32,
    pub version: u32,
    pub data_color_space: DataColorSpace,
    pub pcs: Pcs,
    tags: Vec<TagEntry>,

    pub has_trc: bool,
    pub trc: [Curve<'a>; 3],
    pub has_to_xyzd50: bool,
    pub to_xyzd50: Matrix3x3,
    pub has_a2b: bool,
    pub a2b: Option<A2B<'a>>,
    /// Chromatic adaptation matrix, parsed but never applied (§4.6 supplement).
    pub chad: Option<Matrix3x3>,
}

impl<'a> ICCProfile<'a> {
    pub fn buffer(&self) -> &'a [u8] {
        self.buffer
    }

    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    /// Raw `(signature, payload)` of the tag at `index`, if any.
    pub fn get_tag_by_index(&self, index: usize) -> Option<(u32, &'a [u8])> {
        let entry = self.tags.get(index)?;
        self.reader
            .read_bytes(entry.offset as usize, entry.size as usize)
            .ok()
            .map(|bytes| (entry.signature, bytes))
    }

    /// Raw payload of the first tag matching `signature`, if any.
    pub fn get_tag_by_signature(&self, signature: u32) -> Option<&'a [u8]> {
        let entry = self.tags.iter().find(|t| t.signature == signature)?;
        self.reader
            .read_bytes(entry.offset as usize, entry.size as usize)
            .ok()
    }

    /// `has_a2b || (has_trc && has_to_xyzd50)`.
    pub fn usable_as_source(&self) -> bool {
        self.has_a2b || (self.has_trc && self.has_to_xyzd50)
    }

    /// `has_trc`, all three TRCs parametric and invertible, and `to_xyzd50` invertible.
    pub fn usable_as_destination(&self) -> bool {
        if !self.has_trc || !self.has_to_xyzd50 {
            return false;
        }
        if self.to_xyzd50.invert().is_err() {
            return false;
        }
        self.trc.iter().all(|c| match c {
            Curve::Parametric(tf) => tf.is_invertible(),
            _ => false,
        })
    }

    /// When all three TRCs are parametric and identical, the single shared TF.
    pub fn single_channel_tf(&self) -> Option<TransferFunction> {
        if !self.has_trc {
            return None;
        }
        match (self.trc[0], self.trc[1], self.trc[2]) {
            (Curve::Parametric(a), Curve::Parametric(b), Curve::Parametric(c)) if a == b && b == c => {
                Some(a)
            }
            _ => None,
        }
    }

    /// Replace table TRCs with fitted, invertible parametric TRCs so this
    /// profile can be used as a transform destination.
    ///
    /// A TRC that's already parametric and invertible is left as-is; any
    /// other TRC (a table, or a non-invertible parametric curve) is run
    /// through [`crate::fit::approximate_curve`]. Fails if the profile has no
    /// TRC/XYZ path, `to_xyzd50` doesn't invert, or any TRC's fit doesn't
    /// converge.
    pub fn make_usable_as_destination(&mut self) -> Result<()> {
        if !self.has_trc || !self.has_to_xyzd50 {
            return Err(Error::BadMath(
                "profile has no TRC/XYZ path to use as a destination",
            ));
        }
        self.to_xyzd50
            .invert()
            .map_err(|_| Error::BadMath("destination toXYZD50 matrix is not invertible"))?;

        let mut fitted = [TransferFunction::IDENTITY; 3];
        for (i, curve) in self.trc.iter().enumerate() {
            fitted[i] = match curve {
                Curve::Parametric(tf) if tf.invert().is_ok() => *tf,
                curve => crate::fit::approximate_curve(curve)?.0,
            };
        }
        for (slot, tf) in self.trc.iter_mut().zip(fitted) {
            *slot = Curve::Parametric(tf);
        }
        Ok(())
    }

    /// Like [`Self::make_usable_as_destination`], but additionally collapses
    /// the three (now parametric) TRCs down to whichever single curve best
    /// approximates all three original curves, so the destination has one
    /// shared TRC instead of three.
    ///
    /// Picks the candidate (among the three fitted TFs) whose inverse
    /// round-trips all three *original* curves with the smallest maximum
    /// error.
    pub fn make_usable_as_destination_with_single_curve(&mut self) -> Result<()> {
        let original_trc = self.trc;
        self.make_usable_as_destination()?;

        let mut best = 0usize;
        let mut best_err = f32::INFINITY;
        for i in 0..3 {
            let tf = match self.trc[i] {
                Curve::Parametric(tf) => tf,
                _ => unreachable!("make_usable_as_destination leaves only parametric TRCs"),
            };
            let inv = tf
                .invert()
                .map_err(|_| Error::BadMath("fitted TRC is not invertible"))?;
            let mut err = 0.0f32;
            for original in &original_trc {
                err = err.max(crate::fit::max_roundtrip_error(original, &inv));
            }
            if err < best_err {
                best_err = err;
                best = i;
            }
        }

        let shared = self.trc[best];
        self.trc = [shared, shared, shared];
        Ok(())
    }

    /// Build a profile with no backing bytes: used for the built-in sRGB/XYZD50
    /// defaults, which have no tag table to point into.
    pub(crate) fn synthetic(
        data_color_space: DataColorSpace,
        pcs: Pcs,
        trc: [Curve<'a>; 3],
        to_xyzd50: Matrix3x3,
    ) -> Self {
        ICCProfile {
            buffer: &[],
            reader: ByteReader::new(&[]),
            size: 0,
            version: 0x0400_0000,
            data_color_space,
            pcs,
            tags: Vec::new(),
            has_trc: true,
            trc,
            has_to_xyzd50: true,
            to_xyzd50,
            has_a2b: false,
            a2b: None,
            chad: None,
        }
    }
}

fn find_tag(entries: &[TagEntry], sig: u32) -> Option<usize> {
    entries.iter().position(|t| t.signature == sig)
}

fn curve_from_tag<'a>(reader: ByteReader<'a>, entry: &TagEntry) -> Result<Curve<'a>> {
    if entry.size < 4 {
        return Err(Error::Truncated {
            offset: entry.offset as usize,
            size: 4,
            available: entry.size as usize,
        });
    }
    let (curve, _) = parse_curve(reader, entry.offset as usize)?;
    Ok(curve)
}

fn read_xyz_tag(reader: ByteReader, entry: &TagEntry) -> Result<[f32; 3]> {
    let sig = reader.read_u32_be(entry.offset as usize)?;
    if sig != SIG_XYZ_TYPE || entry.size < 20 {
        return Err(Error::BadSignature {
            expected: "XYZ ",
            found: sig,
        });
    }
    let base = entry.offset as usize;
    Ok([
        reader.read_s15f16_be(base + 8)?,
        reader.read_s15f16_be(base + 12)?,
        reader.read_s15f16_be(base + 16)?,
    ])
}

/// Parse an ICC profile from `buf`, validating header, tag table, PCS, and
/// selecting the TRC/XYZ and/or A2B representations.
pub fn parse(buf: &[u8]) -> Result<ICCProfile<'_>> {
    if buf.len() < HEADER_LEN {
        return Err(Error::Truncated {
            offset: 0,
            size: HEADER_LEN,
            available: buf.len(),
        });
    }
    let reader = ByteReader::new(buf);

    let size = reader.read_u32_be(0)?;
    let version = reader.read_u32_be(8)?;
    let data_color_space_sig = reader.read_u32_be(16)?;
    let pcs_sig = reader.read_u32_be(20)?;
    let signature = reader.read_u32_be(36)?;
    let illuminant_x = reader.read_s15f16_be(68)?;
    let illuminant_y = reader.read_s15f16_be(72)?;
    let illuminant_z = reader.read_s15f16_be(76)?;
    let tag_count = reader.read_u32_be(128)?;

    let tag_table_size = tag_count as u64 * TAG_ENTRY_LEN as u64;
    if signature != SIG_ACSP
        || size as usize > buf.len()
        || (size as u64) < HEADER_LEN as u64 + tag_table_size
    {
        return Err(Error::BadSignature {
            expected: "acsp",
            found: signature,
        });
    }
    if (version >> 24) > 4 {
        return Err(Error::Unsupported("profile major version > 4"));
    }

    if (illuminant_x - 0.9642).abs() > 0.01
        || (illuminant_y - 1.0000).abs() > 0.01
        || (illuminant_z - 0.8249).abs() > 0.01
    {
        return Err(Error::OutOfRange("illuminant is not D50"));
    }

    let mut tags = Vec::with_capacity(tag_count as usize);
    for i in 0..tag_count as usize {
        let base = HEADER_LEN + i * TAG_ENTRY_LEN;
        let sig = reader.read_u32_be(base)?;
        let offset = reader.read_u32_be(base + 4)?;
        let tag_size = reader.read_u32_be(base + 8)?;
        let tag_end = offset as u64 + tag_size as u64;
        if tag_size < 4 || tag_end > size as u64 {
            return Err(Error::OutOfRange("tag entry offset/size exceeds profile size"));
        }
        tags.push(TagEntry {
            signature: sig,
            offset,
            size: tag_size,
        });
    }

    let pcs = match pcs_sig {
        SIG_XYZ_PCS => Pcs::Xyz,
        SIG_LAB_PCS => Pcs::Lab,
        _ => return Err(Error::Unsupported("profile connection space must be XYZ or Lab")),
    };
    let pcs_is_xyz = pcs == Pcs::Xyz;
    let data_color_space = DataColorSpace::from_sig(data_color_space_sig);

    let mut has_trc = false;
    let mut trc = [
        Curve::Parametric(TransferFunction::IDENTITY),
        Curve::Parametric(TransferFunction::IDENTITY),
        Curve::Parametric(TransferFunction::IDENTITY),
    ];
    let mut has_to_xyzd50 = false;
    let mut to_xyzd50 = Matrix3x3::IDENTITY;

    if data_color_space == DataColorSpace::Gray {
        if let Some(idx) = find_tag(&tags, SIG_K_TRC) {
            let curve = curve_from_tag(reader, &tags[idx])?;
            trc = [curve, curve, curve];
            has_trc = true;
            if pcs_is_xyz {
                to_xyzd50 = Matrix3x3 {
                    vals: [
                        [illuminant_x, 0.0, 0.0],
                        [0.0, illuminant_y, 0.0],
                        [0.0, 0.0, illuminant_z],
                    ],
                };
                has_to_xyzd50 = true;
            }
        }
    }

    if !has_trc {
        if let (Some(ri), Some(gi), Some(bi)) = (
            find_tag(&tags, SIG_R_TRC),
            find_tag(&tags, SIG_G_TRC),
            find_tag(&tags, SIG_B_TRC),
        ) {
            trc = [
                curve_from_tag(reader, &tags[ri])?,
                curve_from_tag(reader, &tags[gi])?,
                curve_from_tag(reader, &tags[bi])?,
            ];
            has_trc = true;
        }

        if let (Some(ri), Some(gi), Some(bi)) = (
            find_tag(&tags, SIG_R_XYZ),
            find_tag(&tags, SIG_G_XYZ),
            find_tag(&tags, SIG_B_XYZ),
        ) {
            // Colorant XYZ values become matrix columns, not rows.
            let r = read_xyz_tag(reader, &tags[ri])?;
            let g = read_xyz_tag(reader, &tags[gi])?;
            let b = read_xyz_tag(reader, &tags[bi])?;
            to_xyzd50 = Matrix3x3 {
                vals: [
                    [r[0], g[0], b[0]],
                    [r[1], g[1], b[1]],
                    [r[2], g[2], b[2]],
                ],
            };
            has_to_xyzd50 = true;
        }
    }

    let mut has_a2b = false;
    let mut a2b = None;
    for sig in [SIG_A2B0, SIG_A2B1] {
        if let Some(idx) = find_tag(&tags, sig) {
            a2b = Some(parse_a2b(reader, tags[idx].offset as usize, pcs_is_xyz)?);
            has_a2b = true;
            break;
        }
    }

    let chad = find_tag(&tags, SIG_CHAD).and_then(|idx| {
        let entry = &tags[idx];
        let type_sig = reader.read_u32_be(entry.offset as usize).ok()?;
        if type_sig != SIG_SF32 || entry.size < 44 {
            return None;
        }
        let base = entry.offset as usize + 8;
        let mut vals = [[0.0f32; 3]; 3];
        for (r, row) in vals.iter_mut().enumerate() {
            for (c, cell) in row.iter_mut().enumerate() {
                *cell = reader.read_s15f16_be(base + (r * 3 + c) * 4).ok()?;
            }
        }
        Some(Matrix3x3 { vals })
    });

    let profile = ICCProfile {
        buffer: buf,
        reader,
        size,
        version,
        data_color_space,
        pcs,
        tags,
        has_trc,
        trc,
        has_to_xyzd50,
        to_xyzd50,
        has_a2b,
        a2b,
        chad,
    };

    if !profile.usable_as_source() {
        return Err(Error::OutOfRange(
            "profile has neither a usable TRC+XYZ path nor an A2B path",
        ));
    }
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_u32(buf: &mut Vec<u8>, v: u32) {
        buf.extend_from_slice(&v.to_be_bytes());
    }
    fn push_s15f16(buf: &mut Vec<u8>, v: f32) {
        push_u32(buf, ((v * 65536.0) as i32) as u32);
    }
    fn xyz_payload(x: f32, y: f32, z: f32) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(b"XYZ ");
        v.extend_from_slice(&[0, 0, 0, 0]);
        push_s15f16(&mut v, x);
        push_s15f16(&mut v, y);
        push_s15f16(&mut v, z);
        v
    }

    /// Minimal matrix/TRC RGB profile with sRGB-like curves so parsing and
    /// the destination-usability checks both succeed.
    fn build_srgb_like_profile() -> Vec<u8> {
        let mut curve_payload = Vec::new();
        curve_payload.extend_from_slice(b"para");
        curve_payload.extend_from_slice(&[0, 0, 0, 0]); // reserved
        curve_payload.extend_from_slice(&[0, 1]); // function type 1
        curve_payload.extend_from_slice(&[0, 0]); // reserved
        for v in [2.4f32, 1.0 / 1.055, 0.055 / 1.055] {
            push_s15f16(&mut curve_payload, v);
        }

        let tags: Vec<(u32, Vec<u8>)> = vec![
            (u32::from_be_bytes(*b"rTRC"), curve_payload.clone()),
            (u32::from_be_bytes(*b"gTRC"), curve_payload.clone()),
            (u32::from_be_bytes(*b"bTRC"), curve_payload),
            (u32::from_be_bytes(*b"rXYZ"), xyz_payload(0.436066, 0.222488, 0.013916)),
            (u32::from_be_bytes(*b"gXYZ"), xyz_payload(0.385147, 0.716873, 0.097076)),
            (u32::from_be_bytes(*b"bXYZ"), xyz_payload(0.143066, 0.060608, 0.714096)),
        ];

        let table_len = tags.len() * TAG_ENTRY_LEN;
        let mut payload_offset = HEADER_LEN + table_len;
        let mut entries = Vec::new();
        let mut payload_bytes = Vec::new();
        for (sig, payload) in &tags {
            entries.push((*sig, payload_offset as u32, payload.len() as u32));
            payload_bytes.extend_from_slice(payload);
            payload_offset += payload.len();
            while payload_offset % 4 != 0 {
                payload_bytes.push(0);
                payload_offset += 1;
            }
        }

        let total_size = payload_offset as u32;
        let mut buf = Vec::new();
        push_u32(&mut buf, total_size); // size
        push_u32(&mut buf, 0); // cmm_type
        push_u32(&mut buf, 0x0400_0000); // version 4.0
        push_u32(&mut buf, u32::from_be_bytes(*b"mntr")); // profile class
        push_u32(&mut buf, u32::from_be_bytes(*b"RGB ")); // data color space
        push_u32(&mut buf, u32::from_be_bytes(*b"XYZ ")); // pcs
        buf.extend_from_slice(&[0u8; 12]); // creation date time
        buf.extend_from_slice(b"acsp");
        push_u32(&mut buf, 0); // platform
        push_u32(&mut buf, 0); // flags
        push_u32(&mut buf, 0); // manufacturer
        push_u32(&mut buf, 0); // model
        buf.extend_from_slice(&[0u8; 8]); // attributes
        push_u32(&mut buf, 0); // rendering intent
        push_s15f16(&mut buf, 0.9642);
        push_s15f16(&mut buf, 1.0000);
        push_s15f16(&mut buf, 0.8249);
        push_u32(&mut buf, 0); // creator
        buf.extend_from_slice(&[0u8; 16]); // profile id
        buf.extend_from_slice(&[0u8; 28]); // reserved
        push_u32(&mut buf, tags.len() as u32); // tag count
        assert_eq!(buf.len(), HEADER_LEN);

        for (sig, offset, size) in &entries {
            push_u32(&mut buf, *sig);
            push_u32(&mut buf, *offset);
            push_u32(&mut buf, *size);
        }
        buf.extend_from_slice(&payload_bytes);
        buf
    }

    #[test]
    fn parses_matrix_trc_profile() {
        let bytes = build_srgb_like_profile();
        let profile = parse(&bytes).unwrap();
        assert!(profile.has_trc);
        assert!(profile.has_to_xyzd50);
        assert!(profile.usable_as_source());
        assert!(profile.usable_as_destination());
    }

    #[test]
    fn colorant_xyz_becomes_matrix_columns() {
        let bytes = build_srgb_like_profile();
        let profile = parse(&bytes).unwrap();
        // Red colorant's XYZ lands in column 0.
        assert!((profile.to_xyzd50.vals[0][0] - 0.436066).abs() < 1e-4);
        assert!((profile.to_xyzd50.vals[1][0] - 0.222488).abs() < 1e-4);
        assert!((profile.to_xyzd50.vals[2][0] - 0.013916).abs() < 1e-4);
    }

    #[test]
    fn truncated_header_fails() {
        let bytes = vec![0u8; 131];
        assert!(matches!(parse(&bytes), Err(Error::Truncated { .. })));
    }

    #[test]
    fn bad_signature_fails() {
        let mut bytes = vec![0u8; 132];
        bytes[36..40].copy_from_slice(&0u32.to_be_bytes());
        assert!(matches!(parse(&bytes), Err(Error::BadSignature { .. })));
    }

    #[test]
    fn parse_is_deterministic() {
        let bytes = build_srgb_like_profile();
        let a = parse(&bytes).unwrap();
        let b = parse(&bytes).unwrap();
        assert_eq!(a.to_xyzd50, b.to_xyzd50);
    }

    /// A matrix/TRC profile whose TRCs are 16-bit `curv` tables (not
    /// `para`), so [`ICCProfile::make_usable_as_destination`] has real work
    /// to do fitting them back to parametric curves.
    fn build_table_trc_profile() -> Vec<u8> {
        let srgb_tf = crate::builtins::SRGB_TF;
        let mut curve_payload = Vec::new();
        curve_payload.extend_from_slice(b"curv");
        curve_payload.extend_from_slice(&[0, 0, 0, 0]); // reserved
        curve_payload.extend_from_slice(&256u32.to_be_bytes());
        for i in 0..256u32 {
            let x = i as f32 / 255.0;
            let y = (srgb_tf.eval(x).clamp(0.0, 1.0) * 65535.0).round() as u16;
            curve_payload.extend_from_slice(&y.to_be_bytes());
        }

        let tags: Vec<(u32, Vec<u8>)> = vec![
            (u32::from_be_bytes(*b"rTRC"), curve_payload.clone()),
            (u32::from_be_bytes(*b"gTRC"), curve_payload.clone()),
            (u32::from_be_bytes(*b"bTRC"), curve_payload),
            (u32::from_be_bytes(*b"rXYZ"), xyz_payload(0.436066, 0.222488, 0.013916)),
            (u32::from_be_bytes(*b"gXYZ"), xyz_payload(0.385147, 0.716873, 0.097076)),
            (u32::from_be_bytes(*b"bXYZ"), xyz_payload(0.143066, 0.060608, 0.714096)),
        ];

        let table_len = tags.len() * TAG_ENTRY_LEN;
        let mut payload_offset = HEADER_LEN + table_len;
        let mut entries = Vec::new();
        let mut payload_bytes = Vec::new();
        for (sig, payload) in &tags {
            entries.push((*sig, payload_offset as u32, payload.len() as u32));
            payload_bytes.extend_from_slice(payload);
            payload_offset += payload.len();
            while payload_offset % 4 != 0 {
                payload_bytes.push(0);
                payload_offset += 1;
            }
        }

        let total_size = payload_offset as u32;
        let mut buf = Vec::new();
        push_u32(&mut buf, total_size);
        push_u32(&mut buf, 0);
        push_u32(&mut buf, 0x0400_0000);
        push_u32(&mut buf, u32::from_be_bytes(*b"mntr"));
        push_u32(&mut buf, u32::from_be_bytes(*b"RGB "));
        push_u32(&mut buf, u32::from_be_bytes(*b"XYZ "));
        buf.extend_from_slice(&[0u8; 12]);
        buf.extend_from_slice(b"acsp");
        push_u32(&mut buf, 0);
        push_u32(&mut buf, 0);
        push_u32(&mut buf, 0);
        push_u32(&mut buf, 0);
        buf.extend_from_slice(&[0u8; 8]);
        push_u32(&mut buf, 0);
        push_s15f16(&mut buf, 0.9642);
        push_s15f16(&mut buf, 1.0000);
        push_s15f16(&mut buf, 0.8249);
        push_u32(&mut buf, 0);
        buf.extend_from_slice(&[0u8; 16]);
        buf.extend_from_slice(&[0u8; 28]);
        push_u32(&mut buf, tags.len() as u32);
        assert_eq!(buf.len(), HEADER_LEN);

        for (sig, offset, size) in &entries {
            push_u32(&mut buf, *sig);
            push_u32(&mut buf, *offset);
            push_u32(&mut buf, *size);
        }
        buf.extend_from_slice(&payload_bytes);
        buf
    }

    #[test]
    fn table_trc_profile_is_not_directly_usable_as_destination() {
        let bytes = build_table_trc_profile();
        let profile = parse(&bytes).unwrap();
        assert!(profile.usable_as_source());
        assert!(!profile.usable_as_destination());
    }

    #[test]
    fn make_usable_as_destination_fits_table_trcs() {
        let bytes = build_table_trc_profile();
        let mut profile = parse(&bytes).unwrap();
        profile.make_usable_as_destination().unwrap();
        assert!(profile.usable_as_destination());
        for curve in &profile.trc {
            assert!(matches!(curve, Curve::Parametric(tf) if tf.is_invertible()));
        }
    }

    #[test]
    fn make_usable_with_single_curve_unifies_all_three() {
        let bytes = build_table_trc_profile();
        let mut profile = parse(&bytes).unwrap();
        profile.make_usable_as_destination_with_single_curve().unwrap();
        assert!(profile.usable_as_destination());
        let (r, g, b) = (profile.trc[0], profile.trc[1], profile.trc[2]);
        match (r, g, b) {
            (Curve::Parametric(a), Curve::Parametric(c), Curve::Parametric(d)) => {
                assert_eq!(a, c);
                assert_eq!(c, d);
            }
            _ => panic!("expected all three TRCs to be parametric"),
        }
    }
}
