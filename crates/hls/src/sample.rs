use bytes::Bytes;

/// Track media kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    /// Video; the first video track leads segmentation.
    Video,
    /// Audio.
    Audio,
}

/// Supported codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// H.264 / AVC
    H264,
    /// H.265 / HEVC
    H265,
    /// AAC
    Aac,
    /// AV1 (fMP4 only)
    Av1,
}

/// A track registered with a variant.
#[derive(Debug, Clone)]
pub struct Track {
    /// Track id, unique within the variant.
    pub id: u32,
    /// Media kind.
    pub kind: TrackKind,
    /// Codec.
    pub codec: Codec,
    /// Ticks per second for this track's timestamps.
    pub timescale: u32,
    /// Codec-private data: SPS/PPS (H.264), VPS/SPS/PPS (H.265) as Annex-B
    /// or length-prefixed NAL units, an AudioSpecificConfig (AAC), or a
    /// sequence-header OBU (AV1). Video parameter sets may instead be
    /// recovered from in-band samples.
    pub priv_data: Option<Bytes>,
}

impl Track {
    /// A video track with no up-front parameter sets.
    pub fn video(id: u32, codec: Codec, timescale: u32) -> Self {
        Self { id, kind: TrackKind::Video, codec, timescale, priv_data: None }
    }

    /// An audio track.
    pub fn audio(id: u32, codec: Codec, timescale: u32) -> Self {
        Self { id, kind: TrackKind::Audio, codec, timescale, priv_data: None }
    }

    /// Attach codec-private data.
    pub fn with_priv_data(mut self, priv_data: impl Into<Bytes>) -> Self {
        self.priv_data = Some(priv_data.into());
        self
    }
}

/// One coded media sample handed to the writer.
///
/// Timestamps are ticks in the owning track's timescale. A missing `dts`
/// defaults to `pts` during processing.
#[derive(Debug, Clone)]
pub struct MediaSample {
    /// The owning track id.
    pub track_id: u32,
    /// Decode timestamp; defaults to `pts`.
    pub dts: Option<i64>,
    /// Presentation timestamp.
    pub pts: i64,
    /// Duration in track ticks.
    pub duration: u32,
    /// Sync/keyframe flag as supplied by the caller; video detection
    /// overrides it.
    pub sync: bool,
    /// Coded payload.
    pub payload: Bytes,
    /// Optional wall-clock capture time in Unix milliseconds.
    pub timestamp_ms: Option<i64>,
}

impl MediaSample {
    /// A sample with `dts == pts`.
    pub fn new(track_id: u32, pts: i64, duration: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            track_id,
            dts: None,
            pts,
            duration,
            sync: false,
            payload: payload.into(),
            timestamp_ms: None,
        }
    }

    /// Set an explicit decode timestamp.
    pub fn with_dts(mut self, dts: i64) -> Self {
        self.dts = Some(dts);
        self
    }

    /// Mark as a sync sample.
    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// Attach a wall-clock capture time.
    pub fn with_timestamp_ms(mut self, timestamp_ms: i64) -> Self {
        self.timestamp_ms = Some(timestamp_ms);
        self
    }

    /// The effective decode timestamp.
    pub fn dts(&self) -> i64 {
        self.dts.unwrap_or(self.pts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dts_defaults_to_pts() {
        let sample = MediaSample::new(1, 9000, 3000, vec![1, 2, 3]);
        assert_eq!(sample.dts(), 9000);
        assert_eq!(sample.with_dts(6000).dts(), 6000);
    }

    #[test]
    fn track_builders() {
        let track = Track::video(1, Codec::H264, 90_000);
        assert_eq!(track.kind, TrackKind::Video);
        assert!(track.priv_data.is_none());

        let track = Track::audio(2, Codec::Aac, 48_000).with_priv_data(vec![0x11, 0x90]);
        assert_eq!(track.priv_data.unwrap().as_ref(), &[0x11, 0x90]);
    }
}
