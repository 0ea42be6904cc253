//! Wire frames exchanged with the peer.
//!
//! No I/O happens here; this is pure data transformation.
//!
//! # State frame (sent every tick)
//!
//! Six IEEE-754 `f32` values, **little-endian**, no header:
//!
//! ```text
//!  0       4       8       12      16      20      24
//! +-------+-------+-------+-------+-------+-------+
//! |  s0   |  s1   |  s2   |  s3   |  s4   |  s5   |
//! +-------+-------+-------+-------+-------+-------+
//! ```
//!
//! Every component is in `[-1.0, 1.0]` (the bridge clamps before encoding).
//!
//! # Observation frame (received)
//!
//! Peer-defined.  The transport treats it as opaque bytes;
//! [`decode_f32s`] is offered for peers that reply with packed
//! little-endian floats (the reference peer sends [`OBSERVATION_DIM`]).

use crate::error::FrameError;

/// Components in the state vector.
pub const STATE_DIM: usize = 6;
/// Byte length of an encoded state frame.
pub const STATE_FRAME_LEN: usize = STATE_DIM * 4;
/// Components in the reference peer's observation.
pub const OBSERVATION_DIM: usize = 12;

/// Encode the state vector as a 24-byte frame.
pub fn encode_state(state: &[f32; STATE_DIM]) -> [u8; STATE_FRAME_LEN] {
    let mut buf = [0u8; STATE_FRAME_LEN];
    for (chunk, v) in buf.chunks_exact_mut(4).zip(state) {
        chunk.copy_from_slice(&v.to_le_bytes());
    }
    buf
}

/// Decode a 24-byte state frame.
pub fn decode_state(buf: &[u8]) -> Result<[f32; STATE_DIM], FrameError> {
    if buf.len() != STATE_FRAME_LEN {
        return Err(FrameError::Length {
            expected: STATE_FRAME_LEN,
            actual: buf.len(),
        });
    }
    let mut state = [0f32; STATE_DIM];
    for (v, chunk) in state.iter_mut().zip(buf.chunks_exact(4)) {
        *v = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    Ok(state)
}

/// Pack any number of floats, little-endian.
pub fn encode_f32s(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Unpack a payload of little-endian floats.
pub fn decode_f32s(buf: &[u8]) -> Result<Vec<f32>, FrameError> {
    if buf.len() % 4 != 0 {
        return Err(FrameError::Misaligned(buf.len()));
    }
    Ok(buf
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}
