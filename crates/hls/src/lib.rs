//! HLS writer core.
//!
//! Ingests coded media samples, groups them into segments and partial
//! segments across one or several variants and alternate renditions, and
//! emits media playlists, a multivariant playlist and the binary segment
//! payloads for live, low-latency and VOD HLS delivery.
//!
//! The pipeline per written sample:
//!
//! ```text
//! sample -> SampleProcessor -> SampleQueue -> (PartQueue) -> TracksMuxer
//!        -> Playlist -> HlsWriter -> Storage
//! ```
//!
//! Everything is synchronous and single-threaded; storage is the only I/O
//! boundary. See [`HlsWriter`] for the entry point.

mod config;
mod error;
mod master;
mod muxer;
mod part;
mod playlist;
mod processor;
mod queue;
mod sample;
mod storage;
#[cfg(test)]
mod testutil;
mod variant;
mod writer;

pub use config::{Mode, SegmentType, ServerControl, WriterConfig, WriterType};
pub use error::{HlsWriterError, Result};
pub use playlist::{Part, Playlist, Segment};
pub use sample::{Codec, MediaSample, Track, TrackKind};
pub use storage::{DirStorage, MemoryStorage, Storage, StorageError};
pub use variant::{VariantAttrs, VariantDesc, VariantRole};
pub use writer::{HlsWriter, PartCallback, SegmentCallback, WriterStats};
