//! Little-endian payload encoding for steady-state exchanges.
//!
//! Counts and indices are `u32`, vectors are three `f64`. A payload is a
//! bare sequence of one element type; its length is implied by the frame
//! size, so a size that is not a multiple of the element size is
//! malformed.

use std::error::Error;
use std::fmt;

use glam::DVec3;

/// Size of one encoded `u32`.
pub const U32_BYTES: usize = 4;
/// Size of one encoded vector.
pub const VEC_BYTES: usize = 24;

/// A payload whose size does not fit its element type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WireError {
    /// Payload size in bytes.
    pub len: usize,
    /// Element size the payload should be a multiple of.
    pub element: usize,
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "payload of {} bytes is not a multiple of {}",
            self.len, self.element
        )
    }
}

impl Error for WireError {}

// ── Writers ─────────────────────────────────────────────────────

/// Append a little-endian u32.
pub fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

/// Append a vector as three little-endian f64.
pub fn put_vec(buf: &mut Vec<u8>, v: DVec3) {
    buf.extend_from_slice(&v.x.to_le_bytes());
    buf.extend_from_slice(&v.y.to_le_bytes());
    buf.extend_from_slice(&v.z.to_le_bytes());
}

/// Encode a sequence of u32.
pub fn encode_u32s<I: IntoIterator<Item = u32>>(values: I) -> Vec<u8> {
    let iter = values.into_iter();
    let mut buf = Vec::with_capacity(iter.size_hint().0 * U32_BYTES);
    for v in iter {
        put_u32(&mut buf, v);
    }
    buf
}

/// Encode a sequence of vectors.
pub fn encode_vecs<I: IntoIterator<Item = DVec3>>(values: I) -> Vec<u8> {
    let iter = values.into_iter();
    let mut buf = Vec::with_capacity(iter.size_hint().0 * VEC_BYTES);
    for v in iter {
        put_vec(&mut buf, v);
    }
    buf
}

// ── Readers ─────────────────────────────────────────────────────

fn f64_at(bytes: &[u8], at: usize) -> f64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    f64::from_le_bytes(raw)
}

/// Number of elements of size `element` in a payload.
pub fn element_count(bytes: &[u8], element: usize) -> Result<usize, WireError> {
    if bytes.len() % element != 0 {
        return Err(WireError {
            len: bytes.len(),
            element,
        });
    }
    Ok(bytes.len() / element)
}

/// Decode a sequence of u32.
pub fn decode_u32s(bytes: &[u8]) -> Result<Vec<u32>, WireError> {
    element_count(bytes, U32_BYTES)?;
    Ok(bytes
        .chunks_exact(U32_BYTES)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Decode a sequence of vectors, appending to `out`.
pub fn decode_vecs_into(bytes: &[u8], out: &mut Vec<DVec3>) -> Result<usize, WireError> {
    let n = element_count(bytes, VEC_BYTES)?;
    out.reserve(n);
    for c in bytes.chunks_exact(VEC_BYTES) {
        out.push(DVec3::new(f64_at(c, 0), f64_at(c, 8), f64_at(c, 16)));
    }
    Ok(n)
}

/// Decode a sequence of vectors into an existing slice of the same length.
///
/// Returns the number of vectors in the payload; `out` is only written
/// when that number equals `out.len()`.
pub fn decode_vecs_to_slice(bytes: &[u8], out: &mut [DVec3]) -> Result<usize, WireError> {
    let n = element_count(bytes, VEC_BYTES)?;
    if n == out.len() {
        for (slot, c) in out.iter_mut().zip(bytes.chunks_exact(VEC_BYTES)) {
            *slot = DVec3::new(f64_at(c, 0), f64_at(c, 8), f64_at(c, 16));
        }
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vectors_keep_exact_bits() {
        let v = vec![DVec3::new(1e-9, -0.0, f64::MIN_POSITIVE), DVec3::splat(3.5)];
        let mut out = Vec::new();
        assert_eq!(decode_vecs_into(&encode_vecs(v.clone()), &mut out), Ok(2));
        assert_eq!(out, v);
        assert!(out[0].y.is_sign_negative());
    }

    #[test]
    fn ragged_payload_is_rejected() {
        assert_eq!(
            decode_u32s(&[1, 2, 3]),
            Err(WireError { len: 3, element: 4 })
        );
        let mut out = Vec::new();
        assert!(decode_vecs_into(&[0; 25], &mut out).is_err());
    }

    #[test]
    fn slice_decode_leaves_mismatched_target_untouched() {
        let bytes = encode_vecs([DVec3::ONE]);
        let mut out = [DVec3::ZERO; 2];
        assert_eq!(decode_vecs_to_slice(&bytes, &mut out), Ok(1));
        assert_eq!(out, [DVec3::ZERO; 2]);
    }

    #[test]
    fn u32_layout_is_little_endian() {
        assert_eq!(encode_u32s([0x0102_0304]), vec![4, 3, 2, 1]);
        assert_eq!(decode_u32s(&[4, 3, 2, 1]), Ok(vec![0x0102_0304]));
    }
}
