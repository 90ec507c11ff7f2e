use crate::config::SegmentType;
use crate::error::{HlsWriterError, Result};
use crate::muxer::TracksMuxer;
use crate::playlist::Playlist;
use crate::processor::SampleProcessor;
use crate::sample::{Track, TrackKind};

/// Whether a stream is a selectable variant or an alternate rendition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantRole {
    /// Listed with `#EXT-X-STREAM-INF`.
    Variant,
    /// Listed with `#EXT-X-MEDIA`.
    Rendition,
}

/// Multivariant-playlist attributes of a variant or rendition.
#[derive(Debug, Clone, Default)]
pub struct VariantAttrs {
    /// Rendition group this rendition belongs to (`GROUP-ID`).
    pub group_id: Option<String>,
    /// Audio group a variant references (`AUDIO`).
    pub audio: Option<String>,
    /// Subtitles group a variant references (`SUBTITLES`).
    pub subtitles: Option<String>,
    /// Rendition `DEFAULT=YES`.
    pub default: bool,
    /// Rendition `AUTOSELECT=YES`.
    pub auto_select: bool,
    /// Rendition `LANGUAGE`.
    pub language: Option<String>,
    /// Rendition `NAME`; falls back to the variant id.
    pub name: Option<String>,
}

/// Everything needed to register a variant or rendition.
#[derive(Debug, Clone)]
pub struct VariantDesc {
    /// Unique id; becomes the storage namespace.
    pub id: String,
    /// The tracks muxed into this stream.
    pub tracks: Vec<Track>,
    /// Multivariant attributes.
    pub attrs: VariantAttrs,
}

impl VariantDesc {
    /// A descriptor with default attributes.
    pub fn new(id: impl Into<String>, tracks: Vec<Track>) -> Self {
        Self { id: id.into(), tracks, attrs: VariantAttrs::default() }
    }

    /// Set multivariant attributes.
    pub fn with_attrs(mut self, attrs: VariantAttrs) -> Self {
        self.attrs = attrs;
        self
    }
}

/// One variant's full muxing state.
pub(crate) struct Variant {
    pub id: String,
    pub role: VariantRole,
    pub tracks: Vec<Track>,
    pub processors: Vec<SampleProcessor>,
    pub muxer: TracksMuxer,
    pub playlist: Playlist,
    /// Id of the variant whose queue drives segmentation, when this one
    /// has no video lead of its own.
    pub depends_on: Option<String>,
    pub attrs: VariantAttrs,
    /// Counter feeding `segment_{k}` resource names.
    pub next_segment: u64,
    /// Counter feeding `init_{n}.mp4` resource names.
    pub next_init: u64,
    /// Part counter within the open segment.
    pub next_part: u64,
    /// URI of the current init header once stored.
    pub init_uri: Option<String>,
    /// Re-emit the init header on the next readiness check.
    pub force_new_init: bool,
    /// URI of this variant's media playlist once stored.
    pub playlist_uri: Option<String>,
    /// Segments written over the variant's lifetime.
    pub segments_written: u64,
    /// Parts written over the variant's lifetime.
    pub parts_written: u64,
    /// Media payload bytes handed to storage.
    pub bytes_written: u64,
}

impl Variant {
    pub fn new(
        desc: VariantDesc,
        role: VariantRole,
        segment_type: SegmentType,
        max_segments: usize,
    ) -> Result<Self> {
        if desc.tracks.is_empty() {
            return Err(HlsWriterError::NoTracks);
        }
        for (i, track) in desc.tracks.iter().enumerate() {
            if desc.tracks[..i].iter().any(|other| other.id == track.id) {
                return Err(HlsWriterError::DuplicateTrack(track.id));
            }
        }

        let processors: Vec<SampleProcessor> = desc
            .tracks
            .iter()
            .map(|track| SampleProcessor::new(track, segment_type))
            .collect::<Result<_>>()?;

        let muxer = if segment_type.is_fmp4() {
            TracksMuxer::cmaf(desc.tracks.iter().map(|t| (t.id, t.timescale)).collect())
        } else {
            let mut triples = Vec::with_capacity(desc.tracks.len());
            for (track, processor) in desc.tracks.iter().zip(&processors) {
                triples.push((track.id, track.timescale, processor.ts_stream_type()?));
            }
            TracksMuxer::mpeg_ts(triples)?
        };

        Ok(Self {
            id: desc.id,
            role,
            tracks: desc.tracks,
            processors,
            muxer,
            playlist: Playlist::new(max_segments),
            depends_on: None,
            attrs: desc.attrs,
            next_segment: 0,
            next_init: 0,
            next_part: 0,
            init_uri: None,
            force_new_init: false,
            playlist_uri: None,
            segments_written: 0,
            parts_written: 0,
            bytes_written: 0,
        })
    }

    /// The first video track, which leads segmentation.
    pub fn lead_track(&self) -> Option<&Track> {
        self.tracks.iter().find(|t| t.kind == TrackKind::Video)
    }

    /// Index of a track id within this variant. Panics on unknown ids
    /// (programmer error per the writer contract).
    pub fn track_index(&self, track_id: u32) -> usize {
        self.tracks
            .iter()
            .position(|t| t.id == track_id)
            .unwrap_or_else(|| panic!("unknown track id {track_id} for variant {}", self.id))
    }

    /// Whether every track has codec configuration.
    pub fn ready(&self) -> bool {
        self.processors.iter().all(|p| p.ready())
    }

    /// Comma-joinable codec strings of this variant's tracks.
    pub fn codec_strings(&self) -> Vec<String> {
        self.processors.iter().filter_map(|p| p.codec_string()).collect()
    }

    /// Dimensions of the first video track, once known.
    pub fn resolution(&self) -> Option<(u32, u32)> {
        self.processors
            .iter()
            .find(|p| p.kind() == TrackKind::Video)
            .and_then(|p| p.dimensions())
    }

    /// The CMAF track configurations for the init segment.
    pub fn cmaf_track_inits(&self) -> Result<Vec<cmaf::TrackInit>> {
        self.tracks
            .iter()
            .zip(&self.processors)
            .map(|(track, processor)| {
                let (width, height) = processor.dimensions().unwrap_or((0, 0));
                Ok(cmaf::TrackInit {
                    track_id: track.id,
                    timescale: track.timescale,
                    width,
                    height,
                    codec: processor.cmaf_codec()?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::Codec;

    #[test]
    fn rejects_empty_and_duplicate_tracks() {
        let desc = VariantDesc::new("v0", vec![]);
        assert!(matches!(
            Variant::new(desc, VariantRole::Variant, SegmentType::Fmp4, 6),
            Err(HlsWriterError::NoTracks)
        ));

        let desc = VariantDesc::new(
            "v0",
            vec![Track::video(1, Codec::H264, 90_000), Track::video(1, Codec::H265, 90_000)],
        );
        assert!(matches!(
            Variant::new(desc, VariantRole::Variant, SegmentType::Fmp4, 6),
            Err(HlsWriterError::DuplicateTrack(1))
        ));
    }

    #[test]
    fn lead_track_is_first_video() {
        let desc = VariantDesc::new(
            "v0",
            vec![
                Track::audio(5, Codec::Aac, 48_000).with_priv_data(vec![0x11, 0x90]),
                Track::video(1, Codec::H264, 90_000),
            ],
        );
        let variant = Variant::new(desc, VariantRole::Variant, SegmentType::Fmp4, 6).unwrap();
        assert_eq!(variant.lead_track().unwrap().id, 1);
        assert!(!variant.ready()); // video has no parameter sets yet
    }

    #[test]
    #[should_panic(expected = "unknown track id")]
    fn unknown_track_panics() {
        let desc = VariantDesc::new("v0", vec![Track::video(1, Codec::H264, 90_000)]);
        let variant = Variant::new(desc, VariantRole::Variant, SegmentType::Fmp4, 6).unwrap();
        variant.track_index(9);
    }
}
