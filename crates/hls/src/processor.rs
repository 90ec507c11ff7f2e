use aac::AudioSpecificConfig;
use bytes::Bytes;
use crc32fast::Hasher;
use tracing::warn;

use crate::config::SegmentType;
use crate::error::{HlsWriterError, Result};
use crate::sample::{Codec, MediaSample, Track, TrackKind};

/// How many samples a track may produce without codec configuration before
/// the stall diagnostic fires.
const CONFIG_STALL_THRESHOLD: u32 = 100;

/// Per-codec parameter set state recovered from `priv_data` or in-band
/// samples.
enum CodecState {
    Avc { sps: Vec<Bytes>, pps: Vec<Bytes> },
    Hevc { vps: Vec<Bytes>, sps: Vec<Bytes>, pps: Vec<Bytes> },
    Aac { config: Option<AudioSpecificConfig> },
    Av1 { seq: Option<Bytes> },
}

/// Normalizes caller payloads into the byte layout the chosen container
/// expects and recovers codec-private data from in-band parameter sets.
pub(crate) struct SampleProcessor {
    track_id: u32,
    kind: TrackKind,
    codec: Codec,
    timescale: u32,
    fmp4: bool,
    state: CodecState,
    config_crc: Option<u32>,
    config_dirty: bool,
    samples_without_config: u32,
    stall_reported: bool,
}

fn crc(parts: &[&[u8]]) -> u32 {
    let mut hasher = Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize()
}

fn split_units(payload: &[u8]) -> Vec<&[u8]> {
    if h264::is_annex_b(payload) {
        h264::annex_b_units(payload)
    } else {
        h264::length_prefixed_units(payload)
    }
}

impl SampleProcessor {
    /// Build a processor for one track, consuming its up-front `priv_data`.
    pub fn new(track: &Track, segment_type: SegmentType) -> Result<Self> {
        let fmp4 = segment_type.is_fmp4();
        let state = match track.codec {
            Codec::H264 => CodecState::Avc { sps: Vec::new(), pps: Vec::new() },
            Codec::H265 => CodecState::Hevc { vps: Vec::new(), sps: Vec::new(), pps: Vec::new() },
            Codec::Aac => CodecState::Aac { config: None },
            Codec::Av1 => {
                if !fmp4 {
                    return Err(HlsWriterError::Av1RequiresFmp4(track.id));
                }
                CodecState::Av1 { seq: None }
            }
        };

        let mut processor = Self {
            track_id: track.id,
            kind: track.kind,
            codec: track.codec,
            timescale: track.timescale,
            fmp4,
            state,
            config_crc: None,
            config_dirty: false,
            samples_without_config: 0,
            stall_reported: false,
        };

        if let Some(priv_data) = &track.priv_data {
            processor.absorb_priv_data(priv_data)?;
        }
        if track.codec == Codec::Aac && !processor.ready() {
            return Err(HlsWriterError::AacConfigMissing(track.id));
        }

        Ok(processor)
    }

    /// The owning track id.
    pub fn track_id(&self) -> u32 {
        self.track_id
    }

    /// The track kind.
    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// The track timescale.
    pub fn timescale(&self) -> u32 {
        self.timescale
    }

    fn absorb_priv_data(&mut self, priv_data: &Bytes) -> Result<()> {
        match self.codec {
            Codec::H264 | Codec::H265 => {
                let units: Vec<Bytes> = split_units(priv_data)
                    .into_iter()
                    .map(Bytes::copy_from_slice)
                    .collect();
                for unit in units {
                    self.classify_parameter_set(unit);
                }
            }
            Codec::Aac => {
                let parsed = AudioSpecificConfig::parse(priv_data).map_err(|e| {
                    HlsWriterError::Track {
                        track: self.track_id,
                        reason: format!("bad audio specific config: {e}"),
                    }
                })?;
                // The muxers re-serialize the config; an escape-coded
                // sampling frequency cannot be carried.
                parsed.build().map_err(|e| HlsWriterError::Track {
                    track: self.track_id,
                    reason: format!("unsupported audio specific config: {e}"),
                })?;
                if let CodecState::Aac { config } = &mut self.state {
                    *config = Some(parsed);
                }
            }
            Codec::Av1 => {
                av1::SequenceHeader::parse_obu(priv_data).map_err(|e| HlsWriterError::Track {
                    track: self.track_id,
                    reason: format!("bad AV1 sequence header: {e}"),
                })?;
                if let CodecState::Av1 { seq } = &mut self.state {
                    *seq = Some(priv_data.clone());
                }
            }
        }
        self.refresh_config_crc();
        Ok(())
    }

    fn classify_parameter_set(&mut self, unit: Bytes) {
        match &mut self.state {
            CodecState::Avc { sps, pps } => match h264::NalUnitType::from_header(unit[0]) {
                h264::NalUnitType::Sps => upsert(sps, unit),
                h264::NalUnitType::Pps => upsert(pps, unit),
                _ => {}
            },
            CodecState::Hevc { vps, sps, pps } => {
                match h265::NalUnitType::from_header(unit[0]) {
                    h265::NalUnitType::Vps => upsert(vps, unit),
                    h265::NalUnitType::Sps => upsert(sps, unit),
                    h265::NalUnitType::Pps => upsert(pps, unit),
                    _ => {}
                }
            }
            _ => {}
        }
    }

    fn refresh_config_crc(&mut self) {
        let new_crc = match &self.state {
            CodecState::Avc { sps, pps } => {
                let parts: Vec<&[u8]> = sps.iter().chain(pps).map(|b| b.as_ref()).collect();
                crc(&parts)
            }
            CodecState::Hevc { vps, sps, pps } => {
                let parts: Vec<&[u8]> =
                    vps.iter().chain(sps).chain(pps).map(|b| b.as_ref()).collect();
                crc(&parts)
            }
            CodecState::Aac { config } => match config {
                Some(c) => {
                    let asc = c.build().unwrap_or_default();
                    crc(&[asc.as_slice()])
                }
                None => return,
            },
            CodecState::Av1 { seq } => match seq {
                Some(s) => crc(&[s.as_ref()]),
                None => return,
            },
        };

        if self.config_crc != Some(new_crc) {
            if self.config_crc.is_some() {
                self.config_dirty = true;
            }
            self.config_crc = Some(new_crc);
        }
    }

    /// Whether codec configuration changed since the last init header.
    /// Reading clears the flag.
    pub fn take_config_dirty(&mut self) -> bool {
        std::mem::take(&mut self.config_dirty)
    }

    /// Whether the track has enough codec configuration to describe itself.
    pub fn ready(&self) -> bool {
        match &self.state {
            CodecState::Avc { sps, pps } => !sps.is_empty() && !pps.is_empty(),
            CodecState::Hevc { vps, sps, pps } => {
                !vps.is_empty() && !sps.is_empty() && !pps.is_empty()
            }
            CodecState::Aac { config } => config.is_some(),
            CodecState::Av1 { seq } => seq.is_some(),
        }
    }

    /// Normalize one sample: fill `dts`, detect sync, convert the payload
    /// layout for the container, recover parameter sets.
    pub fn process(&mut self, mut sample: MediaSample) -> Result<MediaSample> {
        sample.dts = Some(sample.dts());

        match self.codec {
            Codec::H264 => self.process_avc(&mut sample),
            Codec::H265 => self.process_hevc(&mut sample),
            Codec::Aac => self.process_aac(&mut sample)?,
            Codec::Av1 => self.process_av1(&mut sample)?,
        }

        if !self.ready() {
            self.samples_without_config += 1;
            if self.samples_without_config >= CONFIG_STALL_THRESHOLD && !self.stall_reported {
                self.stall_reported = true;
                warn!(
                    track = self.track_id,
                    samples = self.samples_without_config,
                    "track still has no codec configuration; init header emission is stalled"
                );
            }
        }

        Ok(sample)
    }

    fn process_avc(&mut self, sample: &mut MediaSample) {
        let units: Vec<Bytes> = split_units(&sample.payload)
            .into_iter()
            .map(Bytes::copy_from_slice)
            .collect();

        let mut keyframe = false;
        let mut has_aud = false;
        for (i, unit) in units.iter().enumerate() {
            match h264::NalUnitType::from_header(unit[0]) {
                h264::NalUnitType::IdrSlice => keyframe = true,
                h264::NalUnitType::Sps | h264::NalUnitType::Pps => {
                    self.classify_parameter_set(unit.clone())
                }
                h264::NalUnitType::AccessUnitDelimiter if i == 0 => has_aud = true,
                _ => {}
            }
        }
        self.refresh_config_crc();

        sample.sync = keyframe;
        sample.payload = if self.fmp4 {
            Bytes::from(h264::to_length_prefixed(&units))
        } else {
            let mut all: Vec<&[u8]> = Vec::with_capacity(units.len() + 1);
            let aud = h264::aud_nal();
            if !has_aud {
                all.push(&aud[..]);
            }
            all.extend(units.iter().map(|u| u.as_ref()));
            Bytes::from(h264::to_annex_b(&all))
        };
    }

    fn process_hevc(&mut self, sample: &mut MediaSample) {
        let payload = sample.payload.clone();
        let units: Vec<&[u8]> = if h265::is_annex_b(&payload) {
            h265::annex_b_units(&payload)
        } else {
            h265::length_prefixed_units(&payload)
        };

        let mut keyframe = false;
        let mut has_aud = false;
        for (i, unit) in units.iter().enumerate() {
            match h265::NalUnitType::from_header(unit[0]) {
                h265::NalUnitType::Irap => keyframe = true,
                h265::NalUnitType::Vps | h265::NalUnitType::Sps | h265::NalUnitType::Pps => {
                    self.classify_parameter_set(Bytes::copy_from_slice(unit))
                }
                h265::NalUnitType::AccessUnitDelimiter if i == 0 => has_aud = true,
                _ => {}
            }
        }
        self.refresh_config_crc();

        sample.sync = keyframe;
        sample.payload = if self.fmp4 {
            Bytes::from(h264::to_length_prefixed(&units))
        } else {
            let mut all: Vec<&[u8]> = Vec::with_capacity(units.len() + 1);
            let aud = h265::aud_nal();
            if !has_aud {
                all.push(&aud[..]);
            }
            all.extend(units.iter().copied());
            Bytes::from(h264::to_annex_b(&all))
        };
    }

    fn process_aac(&mut self, sample: &mut MediaSample) -> Result<()> {
        // AAC samples are always sync samples.
        sample.sync = true;

        if aac::is_adts(&sample.payload) {
            let header = aac::AdtsHeader::parse(&sample.payload).map_err(|e| {
                HlsWriterError::Track { track: self.track_id, reason: format!("bad ADTS frame: {e}") }
            })?;
            let mut recovered = false;
            if let CodecState::Aac { config } = &mut self.state {
                if config.is_none() {
                    *config = Some(header.config);
                    recovered = true;
                }
            }
            if recovered {
                self.refresh_config_crc();
            }
            if self.fmp4 {
                sample.payload = sample.payload.slice(header.header_length..);
            }
        } else if !self.fmp4 {
            // Wrap raw AAC in ADTS for the transport stream.
            let config = match &self.state {
                CodecState::Aac { config: Some(config) } => *config,
                _ => return Err(HlsWriterError::AacConfigMissing(self.track_id)),
            };
            let header =
                aac::AdtsHeader::build(&config, sample.payload.len()).map_err(|e| {
                    HlsWriterError::Track {
                        track: self.track_id,
                        reason: format!("cannot build ADTS header: {e}"),
                    }
                })?;
            let mut framed = Vec::with_capacity(header.len() + sample.payload.len());
            framed.extend_from_slice(&header);
            framed.extend_from_slice(&sample.payload);
            sample.payload = Bytes::from(framed);
        }
        Ok(())
    }

    fn process_av1(&mut self, sample: &mut MediaSample) -> Result<()> {
        let units = av1::obu_units(&sample.payload).map_err(|e| HlsWriterError::Track {
            track: self.track_id,
            reason: format!("bad AV1 temporal unit: {e}"),
        })?;

        if sample.sync {
            let seq = units
                .iter()
                .find(|u| u.obu_type == av1::ObuType::SequenceHeader)
                .map(|u| Bytes::copy_from_slice(u.raw));
            if let Some(seq) = seq {
                if let CodecState::Av1 { seq: slot } = &mut self.state {
                    *slot = Some(seq);
                }
                self.refresh_config_crc();
            }
        }
        Ok(())
    }

    /// RFC 6381 codec string once configuration is known.
    pub fn codec_string(&self) -> Option<String> {
        match &self.state {
            CodecState::Avc { sps, .. } => {
                Some(h264::Sps::parse(sps.first()?).ok()?.codec_string())
            }
            CodecState::Hevc { sps, .. } => {
                Some(h265::Sps::parse(sps.first()?).ok()?.codec_string())
            }
            CodecState::Aac { config } => Some(config.as_ref()?.codec_string()),
            CodecState::Av1 { seq } => {
                Some(av1::SequenceHeader::parse_obu(seq.as_ref()?).ok()?.codec_string())
            }
        }
    }

    /// Coded dimensions for video tracks.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match &self.state {
            CodecState::Avc { sps, .. } => {
                let sps = h264::Sps::parse(sps.first()?).ok()?;
                Some((sps.width, sps.height))
            }
            CodecState::Hevc { sps, .. } => {
                let sps = h265::Sps::parse(sps.first()?).ok()?;
                Some((sps.width, sps.height))
            }
            CodecState::Av1 { seq } => {
                let seq = av1::SequenceHeader::parse_obu(seq.as_ref()?).ok()?;
                Some((seq.max_frame_width, seq.max_frame_height))
            }
            CodecState::Aac { .. } => None,
        }
    }

    /// The CMAF track configuration once ready.
    pub fn cmaf_codec(&self) -> Result<cmaf::TrackCodec> {
        let err = || HlsWriterError::Track {
            track: self.track_id,
            reason: "codec configuration incomplete".into(),
        };
        match &self.state {
            CodecState::Avc { sps, pps } => {
                let record = h264::AvcDecoderConfigurationRecord::from_parameter_sets(
                    sps.clone(),
                    pps.clone(),
                )?;
                Ok(cmaf::TrackCodec::Avc(record))
            }
            CodecState::Hevc { vps, sps, pps } => {
                let record = h265::HevcDecoderConfigurationRecord::from_parameter_sets(
                    vps.clone(),
                    sps.clone(),
                    pps.clone(),
                )?;
                Ok(cmaf::TrackCodec::Hevc(record))
            }
            CodecState::Aac { config } => Ok(cmaf::TrackCodec::Aac((*config).ok_or_else(err)?)),
            CodecState::Av1 { seq } => {
                let seq = seq.clone().ok_or_else(err)?;
                Ok(cmaf::TrackCodec::Av1(av1::Av1CodecConfigurationRecord::from_sequence_header(
                    seq,
                )?))
            }
        }
    }

    /// The PMT stream type for the transport-stream container.
    pub fn ts_stream_type(&self) -> Result<ts::StreamType> {
        match self.codec {
            Codec::H264 => Ok(ts::StreamType::H264),
            Codec::H265 => Ok(ts::StreamType::H265),
            Codec::Aac => Ok(ts::StreamType::AdtsAac),
            Codec::Av1 => Err(HlsWriterError::Av1RequiresFmp4(self.track_id)),
        }
    }
}

/// Install a parameter set: a repeat of the current set is a no-op, a
/// different one replaces it (codec configuration rotated).
fn upsert(list: &mut Vec<Bytes>, unit: Bytes) {
    if list.iter().any(|existing| existing == &unit) {
        return;
    }
    list.clear();
    list.push(unit);
}
