//! Error taxonomy for ICC parsing and pixel transforms.

use thiserror::Error;

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong parsing a profile or compiling/running a transform.
///
/// Every failure mode in the crate maps to exactly one of these kinds; callers
/// that only care about success/failure can match on the discriminant and
/// ignore the fields.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A bounds-checked read would have run past the end of the buffer.
    #[error("truncated: offset {offset} + size {size} exceeds buffer of {available} bytes")]
    Truncated {
        offset: usize,
        size: usize,
        available: usize,
    },

    /// A header or tag payload type signature is not one this crate understands.
    #[error("bad signature: expected one of {expected}, found {found:#010x}")]
    BadSignature { expected: &'static str, found: u32 },

    /// A field is structurally well-formed but out of its legal range.
    #[error("out of range: {0}")]
    OutOfRange(&'static str),

    /// A mathematical operation (division, matrix inversion, TF inversion) failed.
    #[error("bad math: {0}")]
    BadMath(&'static str),

    /// The input is syntactically valid ICC but describes something out of scope.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    /// A transfer-function fit failed to converge within its tolerance budget.
    #[error("degenerate: {0}")]
    Degenerate(&'static str),

    /// The requested pixel count times the format's byte width overflows a 31-bit count.
    #[error("overlarge request: {pixel_count} pixels at {bytes_per_pixel} bytes/px")]
    OverlargeRequest {
        pixel_count: usize,
        bytes_per_pixel: usize,
    },

    /// An in-place transform was requested between formats of different byte widths.
    #[error("aliasing: src and dst are the same buffer but differ in byte width")]
    Aliasing,
}
