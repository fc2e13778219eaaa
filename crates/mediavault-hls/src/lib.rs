#![forbid(unsafe_code)]

//! HLS derivation: external transcoding, segment obfuscation, manifest
//! rewriting.
//!
//! The transcoder binary is an opaque collaborator with a file-in /
//! file-out contract. Everything after it is this crate's job:
//! encrypting segments in place, rewriting the playlist to route
//! segment and key fetches through the obfuscation layer, and
//! encrypting the playlist itself.

mod error;
mod pipeline;
mod serve;
mod transcoder;

pub use error::{HlsError, HlsResult};
pub use pipeline::SegmentationPipeline;
pub use serve::{read_manifest, read_segment, rewrite_for_serving};
pub use transcoder::{FfmpegTranscoder, Transcoder};
