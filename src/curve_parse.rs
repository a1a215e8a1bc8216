//! Decodes `curv` and `para` tag payloads into [`Curve`] (C4).

use crate::byteio::ByteReader;
use crate::curve::{Curve, TransferFunction};
use crate::error::{Error, Result};

const SIG_CURV: u32 = u32::from_be_bytes(*b"curv");
const SIG_PARA: u32 = u32::from_be_bytes(*b"para");

/// Parse a `curv` or `para` tag payload starting at `offset` within `reader`.
///
/// Returns the curve and the number of bytes consumed (including the 8-byte
/// type-signature-plus-reserved header), so callers concatenating several
/// curves (as `mAB ` does) can advance past it with 4-byte alignment.
pub fn parse_curve<'a>(reader: ByteReader<'a>, offset: usize) -> Result<(Curve<'a>, usize)> {
    let sig = reader.read_u32_be(offset)?;
    match sig {
        SIG_CURV => parse_curv(reader, offset),
        SIG_PARA => parse_para(reader, offset),
        _ => Err(Error::BadSignature {
            expected: "curv or para",
            found: sig,
        }),
    }
}

fn parse_curv<'a>(reader: ByteReader<'a>, offset: usize) -> Result<(Curve<'a>, usize)> {
    let count = reader.read_u32_be(offset + 8)?;
    match count {
        0 => Ok((Curve::Parametric(TransferFunction::IDENTITY), 12)),
        1 => {
            let raw = reader.read_u16_be(offset + 12)?;
            let gamma = raw as f32 / 256.0;
            let tf = TransferFunction {
                g: gamma,
                a: 1.0,
                b: 0.0,
                c: 0.0,
                d: 0.0,
                e: 0.0,
                f: 0.0,
            };
            Ok((Curve::Parametric(tf), 14))
        }
        n => {
            let table_start = offset + 12;
            let data = reader.read_bytes(table_start, n as usize * 2)?;
            Ok((Curve::Table16Be { data }, 12 + n as usize * 2))
        }
    }
}

fn parse_para<'a>(reader: ByteReader<'a>, offset: usize) -> Result<(Curve<'a>, usize)> {
    let function_type = reader.read_u16_be(offset + 8)?;
    // offset+10..+12 is reserved.
    let params_start = offset + 12;
    let n = match function_type {
        0 => 1,
        1 => 3,
        2 => 4,
        3 => 5,
        4 => 7,
        _ => return Err(Error::Unsupported("unknown parametric curve function type")),
    };
    let mut p = [0.0f32; 7];
    for (i, slot) in p.iter_mut().enumerate().take(n) {
        *slot = reader.read_s15f16_be(params_start + i * 4)?;
    }

    let tf = match function_type {
        0 => TransferFunction {
            g: p[0],
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 0.0,
            e: 0.0,
            f: 0.0,
        },
        1 => {
            let (g, a, b) = (p[0], p[1], p[2]);
            if a == 0.0 {
                return Err(Error::BadMath("parametric curve type 1 has a == 0"));
            }
            TransferFunction {
                g,
                a,
                b,
                c: 0.0,
                d: -b / a,
                e: 0.0,
                f: 0.0,
            }
        }
        2 => {
            let (g, a, b, e) = (p[0], p[1], p[2], p[3]);
            if a == 0.0 {
                return Err(Error::BadMath("parametric curve type 2 has a == 0"));
            }
            TransferFunction {
                g,
                a,
                b,
                c: 0.0,
                d: -b / a,
                e,
                f: e,
            }
        }
        3 => TransferFunction {
            g: p[0],
            a: p[1],
            b: p[2],
            c: p[3],
            d: p[4],
            e: 0.0,
            f: 0.0,
        },
        4 => TransferFunction {
            g: p[0],
            a: p[1],
            b: p[2],
            c: p[3],
            d: p[4],
            e: p[5],
            f: p[6],
        },
        _ => unreachable!(),
    };

    if !tf.is_valid() {
        return Err(Error::BadMath("parametric curve produced an invalid transfer function"));
    }
    Ok((Curve::Parametric(tf), 12 + n * 4))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader_for(bytes: &[u8]) -> ByteReader<'_> {
        ByteReader::new(bytes)
    }

    #[test]
    fn curv_identity() {
        let data = [b'c', b'u', b'r', b'v', 0, 0, 0, 0, 0, 0, 0, 0];
        let (curve, consumed) = parse_curve(reader_for(&data), 0).unwrap();
        assert!(curve.is_identity());
        assert_eq!(consumed, 12);
    }

    #[test]
    fn curv_gamma() {
        // gamma 2.2 as u8.8 fixed: 2.2*256 = 563 = 0x0233
        let data = [b'c', b'u', b'r', b'v', 0, 0, 0, 0, 0, 0, 0, 1, 0x02, 0x33];
        let (curve, consumed) = parse_curve(reader_for(&data), 0).unwrap();
        assert_eq!(consumed, 14);
        match curve {
            Curve::Parametric(tf) => assert!((tf.g - 563.0 / 256.0).abs() < 1e-4),
            _ => panic!("expected parametric"),
        }
    }

    #[test]
    fn para_type0_pure_gamma() {
        let mut data = vec![b'p', b'a', b'r', b'a', 0, 0, 0, 0, 0, 0, 0, 0];
        // g = 2.2 as s15.16
        data.extend_from_slice(&((2.2f32 * 65536.0) as i32).to_be_bytes());
        let (curve, consumed) = parse_curve(reader_for(&data), 0).unwrap();
        assert_eq!(consumed, 16);
        match curve {
            Curve::Parametric(tf) => {
                assert!((tf.g - 2.2).abs() < 1e-3);
                assert_eq!(tf.d, 0.0);
            }
            _ => panic!("expected parametric"),
        }
    }

    #[test]
    fn para_type1_derives_d() {
        let mut data = vec![b'p', b'a', b'r', b'a', 0, 0, 0, 1, 0, 0, 0, 0];
        for v in [2.4f32, 1.0 / 1.055, 0.055 / 1.055] {
            data.extend_from_slice(&((v * 65536.0) as i32).to_be_bytes());
        }
        let (curve, _) = parse_curve(reader_for(&data), 0).unwrap();
        match curve {
            Curve::Parametric(tf) => {
                let expected_d = -(0.055 / 1.055) / (1.0 / 1.055);
                assert!((tf.d - expected_d).abs() < 1e-4);
            }
            _ => panic!("expected parametric"),
        }
    }

    #[test]
    fn para_unknown_function_type_is_unsupported() {
        let data = [b'p', b'a', b'r', b'a', 0, 0, 0, 9, 0, 0, 0, 0];
        assert!(matches!(
            parse_curve(reader_for(&data), 0),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn bad_signature_rejected() {
        let data = [b'x', b'x', b'x', b'x', 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(matches!(
            parse_curve(reader_for(&data), 0),
            Err(Error::BadSignature { .. })
        ));
    }
}
