//! Length-prefixed JSON framing: `[len: u32 big-endian][payload]`.

use crate::snapshot::GridSnapshot;
use crate::StreamError;

pub fn encode_frame(snapshot: &GridSnapshot) -> Result<Vec<u8>, StreamError> {
    let payload = serde_json::to_vec(snapshot)?;
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decode one frame from `bytes`, returning the snapshot and the total
/// number of bytes consumed.
pub fn decode_frame(bytes: &[u8]) -> Result<(GridSnapshot, usize), StreamError> {
    if bytes.len() < 4 {
        return Err(StreamError::Truncated(bytes.len()));
    }
    let len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    if bytes.len() < 4 + len {
        return Err(StreamError::Truncated(bytes.len()));
    }
    let snapshot = serde_json::from_slice(&bytes[4..4 + len])?;
    Ok((snapshot, 4 + len))
}
