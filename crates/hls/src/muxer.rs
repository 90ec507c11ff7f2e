use bytes::Bytes;

use crate::error::{HlsWriterError, Result};
use crate::part::PartGroup;
use crate::sample::MediaSample;

/// Per-track accounting for a flushed segment.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SegmentTrackStats {
    pub track_id: u32,
    pub timescale: u32,
    /// Ticks of media muxed into the segment.
    pub ticks: u64,
    /// Dts of the first sample in the segment.
    pub first_dts: Option<i64>,
}

/// A closed segment's payload plus accounting.
pub(crate) struct FlushedSegment {
    pub data: Bytes,
    pub tracks: Vec<SegmentTrackStats>,
}

struct CmafTrack {
    track_id: u32,
    timescale: u32,
    buffered: Vec<MediaSample>,
    /// Ticks muxed before the current segment; feeds `tfdt`.
    base_ticks: u64,
    /// Ticks already emitted into the current segment as parts.
    segment_ticks: u64,
    first_dts: Option<i64>,
}

/// CMAF muxer: buffers samples per track and emits fragments.
pub(crate) struct CmafTracksMuxer {
    tracks: Vec<CmafTrack>,
    /// `mfhd` sequence number of the next fragment, starting at 1.
    sequence_number: u32,
    /// Accumulated fragment bytes of the in-flight segment (low latency).
    segment_data: Vec<u8>,
}

impl CmafTracksMuxer {
    fn new(tracks: Vec<(u32, u32)>) -> Self {
        Self {
            tracks: tracks
                .into_iter()
                .map(|(track_id, timescale)| CmafTrack {
                    track_id,
                    timescale,
                    buffered: Vec::new(),
                    base_ticks: 0,
                    segment_ticks: 0,
                    first_dts: None,
                })
                .collect(),
            sequence_number: 1,
            segment_data: Vec::new(),
        }
    }

    fn track_mut(&mut self, track_id: u32) -> &mut CmafTrack {
        self.tracks
            .iter_mut()
            .find(|t| t.track_id == track_id)
            .expect("sample references a registered track")
    }

    fn push_sample(&mut self, sample: MediaSample) {
        let track = self.track_mut(sample.track_id);
        if track.first_dts.is_none() {
            track.first_dts = Some(sample.dts());
        }
        track.buffered.push(sample);
    }

    fn fragment_for(track: &CmafTrack, samples: &[MediaSample]) -> cmaf::TrackFragment {
        let mut data = Vec::with_capacity(samples.iter().map(|s| s.payload.len()).sum());
        let mut table = Vec::with_capacity(samples.len());
        for sample in samples {
            data.extend_from_slice(&sample.payload);
            table.push(cmaf::FragmentSample {
                duration: sample.duration,
                size: sample.payload.len() as u32,
                is_sync: sample.sync,
                cts_offset: (sample.pts - sample.dts()) as i32,
            });
        }
        cmaf::TrackFragment {
            track_id: track.track_id,
            timescale: track.timescale,
            base_decode_time: track.base_ticks + track.segment_ticks,
            samples: table,
            data,
        }
    }

    /// Emit one sub-fragment for a part group; returns the part's bytes.
    fn push_part(&mut self, group: PartGroup) -> Bytes {
        let mut fragments = Vec::with_capacity(group.len());
        let mut ticks_per_track = Vec::with_capacity(group.len());
        for (track_id, samples) in &group {
            let track = self
                .tracks
                .iter_mut()
                .find(|t| t.track_id == *track_id)
                .expect("part references a registered track");
            if track.first_dts.is_none() {
                track.first_dts = samples.first().map(|s| s.dts());
            }
            fragments.push(Self::fragment_for(track, samples));
            ticks_per_track
                .push((*track_id, samples.iter().map(|s| s.duration as u64).sum::<u64>()));
        }

        let mut part = if self.segment_data.is_empty() { cmaf::build_styp() } else { Vec::new() };
        part.extend_from_slice(&cmaf::build_fragment(self.sequence_number, &fragments));
        self.sequence_number += 1;

        for (track_id, ticks) in ticks_per_track {
            self.track_mut(track_id).segment_ticks += ticks;
        }
        self.segment_data.extend_from_slice(&part);
        Bytes::from(part)
    }

    fn flush_segment(&mut self) -> Option<FlushedSegment> {
        let has_buffered = self.tracks.iter().any(|t| !t.buffered.is_empty());
        if !has_buffered && self.segment_data.is_empty() {
            return None;
        }

        let fragments: Vec<cmaf::TrackFragment> = self
            .tracks
            .iter()
            .filter(|t| !t.buffered.is_empty())
            .map(|t| Self::fragment_for(t, &t.buffered))
            .collect();

        let data = if self.segment_data.is_empty() {
            // Whole segment at once: styp + sidx per track + fragment.
            let data = cmaf::build_segment(self.sequence_number, &fragments);
            self.sequence_number += 1;
            data
        } else {
            // Parts already flowed out; wrap the leftovers as the closing
            // fragment.
            if !fragments.is_empty() {
                let tail = cmaf::build_fragment(self.sequence_number, &fragments);
                self.sequence_number += 1;
                self.segment_data.extend_from_slice(&tail);
            }
            std::mem::take(&mut self.segment_data)
        };

        let mut stats = Vec::with_capacity(self.tracks.len());
        for track in &mut self.tracks {
            let buffered_ticks: u64 = track.buffered.iter().map(|s| s.duration as u64).sum();
            let ticks = track.segment_ticks + buffered_ticks;
            stats.push(SegmentTrackStats {
                track_id: track.track_id,
                timescale: track.timescale,
                ticks,
                first_dts: track.first_dts,
            });
            track.base_ticks += ticks;
            track.segment_ticks = 0;
            track.first_dts = None;
            track.buffered.clear();
        }

        Some(FlushedSegment { data: Bytes::from(data), tracks: stats })
    }
}

struct TsTrack {
    track_id: u32,
    timescale: u32,
    pid: u16,
    segment_ticks: u64,
    first_dts: Option<i64>,
}

/// MPEG-TS muxer: packetizes immediately, PSI at every segment head.
pub(crate) struct TsTracksMuxer {
    writer: ts::TsWriter,
    tracks: Vec<TsTrack>,
    segment: Vec<u8>,
}

impl TsTracksMuxer {
    fn new(tracks: Vec<(u32, u32, ts::StreamType)>) -> Result<Self> {
        let mut streams = Vec::with_capacity(tracks.len());
        let mut states = Vec::with_capacity(tracks.len());
        for (index, (track_id, timescale, stream_type)) in tracks.into_iter().enumerate() {
            let pid = ts::PID_ES_BASE + index as u16;
            let stream_id = if stream_type.is_video() {
                ts::PES_STREAM_ID_VIDEO
            } else {
                ts::PES_STREAM_ID_AUDIO
            };
            streams.push(ts::TsStream::new(pid, stream_type, stream_id));
            states.push(TsTrack { track_id, timescale, pid, segment_ticks: 0, first_dts: None });
        }
        Ok(Self { writer: ts::TsWriter::new(streams)?, tracks: states, segment: Vec::new() })
    }

    fn push_sample(&mut self, sample: MediaSample) -> Result<()> {
        if self.segment.is_empty() {
            self.writer.write_psi(&mut self.segment);
        }

        let track = self
            .tracks
            .iter_mut()
            .find(|t| t.track_id == sample.track_id)
            .expect("sample references a registered track");
        if track.first_dts.is_none() {
            track.first_dts = Some(sample.dts());
        }
        track.segment_ticks += sample.duration as u64;

        let scale = |value: i64| (value as i128 * 90_000 / track.timescale as i128) as u64;
        let pid = track.pid;
        let (pts, dts) = (scale(sample.pts), scale(sample.dts()));
        self.writer.write_sample(&mut self.segment, pid, &sample.payload, pts, dts, sample.sync)?;
        Ok(())
    }

    fn flush_segment(&mut self) -> Option<FlushedSegment> {
        if self.segment.is_empty() {
            return None;
        }
        let data = Bytes::from(std::mem::take(&mut self.segment));
        let mut stats = Vec::with_capacity(self.tracks.len());
        for track in &mut self.tracks {
            stats.push(SegmentTrackStats {
                track_id: track.track_id,
                timescale: track.timescale,
                ticks: track.segment_ticks,
                first_dts: track.first_dts,
            });
            track.segment_ticks = 0;
            track.first_dts = None;
        }
        Some(FlushedSegment { data, tracks: stats })
    }
}

/// Container-polymorphic muxer, one per variant.
pub(crate) enum TracksMuxer {
    Cmaf(CmafTracksMuxer),
    MpegTs(TsTracksMuxer),
}

impl TracksMuxer {
    /// A CMAF muxer over `(track_id, timescale)` pairs.
    pub fn cmaf(tracks: Vec<(u32, u32)>) -> Self {
        TracksMuxer::Cmaf(CmafTracksMuxer::new(tracks))
    }

    /// An MPEG-TS muxer over `(track_id, timescale, stream_type)` triples.
    pub fn mpeg_ts(tracks: Vec<(u32, u32, ts::StreamType)>) -> Result<Self> {
        Ok(TracksMuxer::MpegTs(TsTracksMuxer::new(tracks)?))
    }

    /// Build the init segment (CMAF only; MPEG-TS has none).
    pub fn init_segment(&self, tracks: Vec<cmaf::TrackInit>) -> Option<Bytes> {
        match self {
            TracksMuxer::Cmaf(_) => Some(Bytes::from(cmaf::build_init_segment(&tracks))),
            TracksMuxer::MpegTs(_) => None,
        }
    }

    /// Accept one normalized sample into the open segment.
    pub fn push_sample(&mut self, sample: MediaSample) -> Result<()> {
        match self {
            TracksMuxer::Cmaf(muxer) => {
                muxer.push_sample(sample);
                Ok(())
            }
            TracksMuxer::MpegTs(muxer) => muxer.push_sample(sample),
        }
    }

    /// Append a partial-segment fragment (low latency, CMAF only).
    pub fn push_part(&mut self, group: PartGroup) -> Result<Bytes> {
        match self {
            TracksMuxer::Cmaf(muxer) => Ok(muxer.push_part(group)),
            TracksMuxer::MpegTs(_) => {
                Err(HlsWriterError::Muxing("partial segments require CMAF".into()))
            }
        }
    }

    /// Close the open segment, if any media was muxed into it.
    pub fn flush_segment(&mut self) -> Option<FlushedSegment> {
        match self {
            TracksMuxer::Cmaf(muxer) => muxer.flush_segment(),
            TracksMuxer::MpegTs(muxer) => muxer.flush_segment(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(dts: i64, duration: u32, sync: bool) -> MediaSample {
        MediaSample::new(1, dts, duration, vec![0xAAu8; 32]).with_sync(sync)
    }

    fn audio(dts: i64, duration: u32) -> MediaSample {
        MediaSample::new(2, dts, duration, vec![0x55u8; 16]).with_sync(true)
    }

    #[test]
    fn cmaf_flush_produces_segment_and_advances_base_time() {
        let mut muxer = TracksMuxer::cmaf(vec![(1, 90_000), (2, 48_000)]);
        muxer.push_sample(video(0, 3000, true)).unwrap();
        muxer.push_sample(video(3000, 3000, false)).unwrap();
        muxer.push_sample(audio(0, 1024)).unwrap();

        let flushed = muxer.flush_segment().unwrap();
        assert!(cmaf::find_box(&flushed.data, b"styp").is_some());
        assert!(cmaf::find_box(&flushed.data, b"moof").is_some());
        assert_eq!(flushed.tracks[0].ticks, 6000);
        assert_eq!(flushed.tracks[1].ticks, 1024);
        assert_eq!(flushed.tracks[0].first_dts, Some(0));

        // Next segment's tfdt starts where the first ended.
        muxer.push_sample(video(6000, 3000, true)).unwrap();
        let second = muxer.flush_segment().unwrap();
        if let TracksMuxer::Cmaf(inner) = &muxer {
            assert_eq!(inner.tracks[0].base_ticks, 9000);
        }
        assert_eq!(second.tracks[0].ticks, 3000);
    }

    #[test]
    fn cmaf_empty_flush_is_none() {
        let mut muxer = TracksMuxer::cmaf(vec![(1, 90_000)]);
        assert!(muxer.flush_segment().is_none());
    }

    #[test]
    fn cmaf_parts_accumulate_into_segment() {
        let mut muxer = TracksMuxer::cmaf(vec![(1, 90_000)]);

        let part0 = muxer.push_part(vec![(1, vec![video(0, 3000, true)])]).unwrap();
        let part1 = muxer.push_part(vec![(1, vec![video(3000, 3000, false)])]).unwrap();
        // First part leads with styp, later ones are bare fragments.
        assert!(cmaf::find_box(&part0, b"styp").is_some());
        assert!(cmaf::find_box(&part1, b"styp").is_none());
        assert!(cmaf::find_box(&part1, b"moof").is_some());

        muxer.push_sample(video(6000, 3000, false)).unwrap();
        let flushed = muxer.flush_segment().unwrap();
        // Segment = part0 + part1 + tail fragment.
        assert!(flushed.data.starts_with(&part0));
        assert_eq!(&flushed.data[part0.len()..part0.len() + part1.len()], &part1[..]);
        assert!(flushed.data.len() > part0.len() + part1.len());
        assert_eq!(flushed.tracks[0].ticks, 9000);
    }

    #[test]
    fn ts_segments_are_packet_aligned_with_leading_psi() {
        let mut muxer = TracksMuxer::mpeg_ts(vec![
            (1, 90_000, ts::StreamType::H264),
            (2, 48_000, ts::StreamType::AdtsAac),
        ])
        .unwrap();

        muxer.push_sample(video(0, 3000, true)).unwrap();
        muxer.push_sample(audio(0, 1024)).unwrap();
        let flushed = muxer.flush_segment().unwrap();

        assert_eq!(flushed.data.len() % 188, 0);
        // PAT at offset 0, PMT at offset 188.
        assert_eq!(flushed.data[0], 0x47);
        let pid0 = ((flushed.data[1] as u16 & 0x1F) << 8) | flushed.data[2] as u16;
        let pid1 = ((flushed.data[189] as u16 & 0x1F) << 8) | flushed.data[190] as u16;
        assert_eq!(pid0, 0x0000);
        assert_eq!(pid1, 0x1000);
    }

    #[test]
    fn ts_rejects_parts() {
        let mut muxer = TracksMuxer::mpeg_ts(vec![(1, 90_000, ts::StreamType::H264)]).unwrap();
        assert!(muxer.push_part(vec![(1, vec![video(0, 3000, true)])]).is_err());
    }

    #[test]
    fn ts_audio_dts_rescaled_to_90khz() {
        let mut muxer =
            TracksMuxer::mpeg_ts(vec![(1, 48_000, ts::StreamType::AdtsAac)]).unwrap();
        muxer.push_sample(MediaSample::new(1, 48_000, 1024, vec![1u8; 8]).with_sync(true)).unwrap();
        let flushed = muxer.flush_segment().unwrap();

        // Skip PAT + PMT; the PES header carries PTS 90_000.
        let pes_packet = &flushed.data[2 * 188..];
        // Stuffed packet: payload at the tail. Find the PES start code.
        let start = pes_packet.windows(4).position(|w| w == [0, 0, 1, 0xC0]).unwrap();
        let pts_bytes = &pes_packet[start + 9..start + 14];
        let pts = (((pts_bytes[0] >> 1) & 0x07) as u64) << 30
            | (pts_bytes[1] as u64) << 22
            | (((pts_bytes[2] >> 1) & 0x7F) as u64) << 15
            | (pts_bytes[3] as u64) << 7
            | ((pts_bytes[4] >> 1) & 0x7F) as u64;
        assert_eq!(pts, 90_000);
    }
}
