//! CMAF / fragmented-MP4 writer.
//!
//! Produces the two artifact kinds HLS needs from an fMP4 muxer: the init
//! segment (`ftyp` + `moov` with `mvex`) built once per codec
//! configuration, and media fragments (`styp` + `sidx` + `moof` + `mdat`)
//! built per segment or, in low-latency operation, per partial segment.

mod boxes;
mod fragment;
mod init;

pub use boxes::{find_box, iter_boxes, BoxHeader};
pub use fragment::{build_fragment, build_segment, build_styp, FragmentSample, TrackFragment};
pub use init::build_init_segment;

use aac::AudioSpecificConfig;

/// Codec-specific configuration for one track in the init segment.
#[derive(Debug, Clone)]
pub enum TrackCodec {
    /// H.264: `avc1` sample entry with an `avcC` record.
    Avc(h264::AvcDecoderConfigurationRecord),
    /// H.265: `hvc1` sample entry with an `hvcC` record.
    Hevc(h265::HevcDecoderConfigurationRecord),
    /// AAC: `mp4a` sample entry with an `esds` record.
    Aac(AudioSpecificConfig),
    /// AV1: `av01` sample entry with an `av1C` record.
    Av1(av1::Av1CodecConfigurationRecord),
}

impl TrackCodec {
    /// Whether the sample entry is a visual one.
    pub fn is_video(&self) -> bool {
        !matches!(self, TrackCodec::Aac(_))
    }
}

/// Per-track parameters for the init segment.
#[derive(Debug, Clone)]
pub struct TrackInit {
    /// 1-based track id, also referenced by fragments.
    pub track_id: u32,
    /// Media timescale in ticks per second.
    pub timescale: u32,
    /// Visual width in pixels (0 for audio).
    pub width: u32,
    /// Visual height in pixels (0 for audio).
    pub height: u32,
    /// Codec configuration.
    pub codec: TrackCodec,
}
