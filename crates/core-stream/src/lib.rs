//! Debug stream: JSON grid snapshots over length-prefixed TCP frames.
//!
//! The stream is a passive observer. The pipeline hands finished snapshots
//! (built by value, so no reader ever sees a half-updated grid) to the
//! server task through a small channel; all network blocking happens on the
//! server task, never on the pipeline thread. A send failure drops the
//! client and the server returns to listening.

pub mod server;
pub mod snapshot;
pub mod wire;

pub use server::serve;
pub use snapshot::{build_snapshot, GridSnapshot};
pub use wire::{decode_frame, encode_frame};

use thiserror::Error;

/// Stream-side failures. None of these reach the pipeline; the server task
/// logs them and recovers by itself.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("snapshot encode failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("stream io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame too short: {0} bytes")]
    Truncated(usize),
}
