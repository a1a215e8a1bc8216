//! The pipeline op alphabet (C8) and its externally-stored arguments.
//!
//! The op enum is kept fixed-width: anything wider than "which pixel format"
//! or "which channel" lives in [`Args`], indexed by a `u16`. This is what lets
//! the executor's inner loop be a flat `match` over a `Vec<Op>` instead of a
//! heap of boxed closures.

use crate::curve::{Curve, TransferFunction};
use crate::linalg::{Matrix3x3, Matrix3x4};
use crate::pixel::Layout;

/// Which of the four color registers an op concerns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    R,
    G,
    B,
    A,
}

/// CLUT sample width, mirroring [`crate::a2b::Grid`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ByteWidth {
    Eight,
    Sixteen,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Load(Layout),
    Store(Layout),
    SwapRb,
    Clamp,
    Invert,
    ForceOpaque,
    Premul,
    Unpremul,
    Matrix3x3(u16),
    Matrix3x4(u16),
    LabToXyz,
    /// Apply a parametric transfer function to one channel.
    Tf(Channel, u16),
    /// Apply an 8-bit table curve to one channel.
    Table8(Channel, u16),
    /// Apply a 16-bit big-endian table curve to one channel.
    Table16(Channel, u16),
    /// 3-D CLUT over (r, g, b); forces nothing (CMYK never uses this one).
    Clut3D(ByteWidth, u16),
    /// 4-D CLUT over (r, g, b, a); forces `a = 1` afterward (K absorbed).
    Clut4D(ByteWidth, u16),
}

/// A CLUT descriptor: grid shape plus the raw sample bytes.
#[derive(Clone, Copy, Debug)]
pub struct ClutArg<'a> {
    pub dims: usize,
    pub grid_points: [u8; 4],
    pub output_channels: usize,
    pub grid: crate::a2b::Grid<'a>,
}

/// Every op argument pool the compiled program's [`Op`]s index into.
///
/// Kept as parallel `Vec`s (rather than one `Vec<enum>`) so each op only
/// carries the index it actually needs and the executor never matches on an
/// argument type it didn't ask for.
#[derive(Clone, Debug, Default)]
pub struct Args<'a> {
    pub matrices3x3: Vec<Matrix3x3>,
    pub matrices3x4: Vec<Matrix3x4>,
    pub tfs: Vec<TransferFunction>,
    pub table8: Vec<&'a [u8]>,
    pub table16: Vec<&'a [u8]>,
    pub cluts: Vec<ClutArg<'a>>,
}

impl<'a> Args<'a> {
    pub fn push_matrix3x3(&mut self, m: Matrix3x3) -> u16 {
        self.matrices3x3.push(m);
        (self.matrices3x3.len() - 1) as u16
    }

    pub fn push_matrix3x4(&mut self, m: Matrix3x4) -> u16 {
        self.matrices3x4.push(m);
        (self.matrices3x4.len() - 1) as u16
    }

    pub fn push_tf(&mut self, tf: TransferFunction) -> u16 {
        self.tfs.push(tf);
        (self.tfs.len() - 1) as u16
    }

    pub fn push_curve_table(&mut self, curve: &Curve<'a>) -> (bool, u16) {
        match curve {
            Curve::Table8 { data } => {
                self.table8.push(data);
                (false, (self.table8.len() - 1) as u16)
            }
            Curve::Table16Be { data } => {
                self.table16.push(data);
                (true, (self.table16.len() - 1) as u16)
            }
            Curve::Parametric(_) => unreachable!("push_curve_table called on a parametric curve"),
        }
    }

    pub fn push_clut(&mut self, clut: ClutArg<'a>) -> u16 {
        self.cluts.push(clut);
        (self.cluts.len() - 1) as u16
    }
}

/// A compiled transform: an op list plus the arguments those ops index into.
#[derive(Clone, Debug, Default)]
pub struct Program<'a> {
    pub ops: Vec<Op>,
    pub args: Args<'a>,
}
