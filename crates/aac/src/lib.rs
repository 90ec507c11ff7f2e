//! AAC audio header handling.
//!
//! Decodes the top fields of an AudioSpecificConfig (ISO/IEC 14496-3) and
//! converts between raw AAC frames and their ADTS framing. The HLS writer
//! carries raw frames inside fMP4 segments and ADTS frames inside MPEG-TS
//! segments, so both directions are needed.

use std::io;

use bitio::{BitReader, BitWriter};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

/// Length of an ADTS header without CRC protection.
pub const ADTS_HEADER_LEN: usize = 7;

/// Audio Object Type.
/// ISO/IEC 14496-3:2019(E) - 1.5.1.2.6
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioObjectType {
    /// AAC main
    AacMain,
    /// AAC LC
    AacLowComplexity,
    /// Any other object type
    Unknown(u16),
}

impl AudioObjectType {
    /// Converts an AudioObjectType to a u16
    pub const fn as_u16(&self) -> u16 {
        match self {
            AudioObjectType::AacMain => 1,
            AudioObjectType::AacLowComplexity => 2,
            AudioObjectType::Unknown(value) => *value,
        }
    }

    /// Converts a u16 to an AudioObjectType
    pub const fn from_u16(value: u16) -> Self {
        match value {
            1 => AudioObjectType::AacMain,
            2 => AudioObjectType::AacLowComplexity,
            _ => AudioObjectType::Unknown(value),
        }
    }
}

impl From<u16> for AudioObjectType {
    fn from(value: u16) -> Self {
        Self::from_u16(value)
    }
}

/// Sampling Frequency Index.
///
/// Encodes the commonly used sampling frequencies in 4 bits.
/// ISO/IEC 14496-3:2019(E) - 1.6.2.4 (Table 1.22)
#[derive(FromPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SampleFrequencyIndex {
    /// 96000 Hz
    Freq96000 = 0x0,
    /// 88200 Hz
    Freq88200 = 0x1,
    /// 64000 Hz
    Freq64000 = 0x2,
    /// 48000 Hz
    Freq48000 = 0x3,
    /// 44100 Hz
    Freq44100 = 0x4,
    /// 32000 Hz
    Freq32000 = 0x5,
    /// 24000 Hz
    Freq24000 = 0x6,
    /// 22050 Hz
    Freq22050 = 0x7,
    /// 16000 Hz
    Freq16000 = 0x8,
    /// 12000 Hz
    Freq12000 = 0x9,
    /// 11025 Hz
    Freq11025 = 0xA,
    /// 8000 Hz
    Freq8000 = 0xB,
    /// 7350 Hz
    Freq7350 = 0xC,
}

impl SampleFrequencyIndex {
    /// Convert the index to the frequency in Hz.
    pub const fn to_freq(&self) -> u32 {
        match self {
            SampleFrequencyIndex::Freq96000 => 96000,
            SampleFrequencyIndex::Freq88200 => 88200,
            SampleFrequencyIndex::Freq64000 => 64000,
            SampleFrequencyIndex::Freq48000 => 48000,
            SampleFrequencyIndex::Freq44100 => 44100,
            SampleFrequencyIndex::Freq32000 => 32000,
            SampleFrequencyIndex::Freq24000 => 24000,
            SampleFrequencyIndex::Freq22050 => 22050,
            SampleFrequencyIndex::Freq16000 => 16000,
            SampleFrequencyIndex::Freq12000 => 12000,
            SampleFrequencyIndex::Freq11025 => 11025,
            SampleFrequencyIndex::Freq8000 => 8000,
            SampleFrequencyIndex::Freq7350 => 7350,
        }
    }

    /// Find the table index for an exact frequency.
    pub fn from_freq(freq: u32) -> Option<Self> {
        (0x0u8..=0xC).find_map(|idx| {
            let candidate = Self::from_u8(idx)?;
            (candidate.to_freq() == freq).then_some(candidate)
        })
    }
}

/// The decoded top fields of an AudioSpecificConfig.
/// ISO/IEC 14496-3:2019(E) - 1.6
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSpecificConfig {
    /// Audio Object Type
    pub audio_object_type: AudioObjectType,
    /// Sampling Frequency
    pub sampling_frequency: u32,
    /// Channel Configuration
    pub channel_configuration: u8,
}

impl AudioSpecificConfig {
    /// Parse the top fields of an AudioSpecificConfig.
    /// ISO/IEC 14496-3:2019(E) - 1.6.2.1 (Table 1.19)
    pub fn parse(data: &[u8]) -> io::Result<Self> {
        let mut reader = BitReader::new(data);

        // GetAudioObjectType() - Table 1.20
        let mut audio_object_type = reader.read_bits(5)? as u16;
        if audio_object_type == 31 {
            audio_object_type = 32 + reader.read_bits(6)? as u16;
        }

        let frequency_index = reader.read_bits(4)? as u8;
        let sampling_frequency = if frequency_index == 0xF {
            // Escape value, explicit 24-bit frequency follows.
            reader.read_bits(24)? as u32
        } else {
            SampleFrequencyIndex::from_u8(frequency_index)
                .ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidData, "invalid sampling frequency index")
                })?
                .to_freq()
        };

        let channel_configuration = reader.read_bits(4)? as u8;

        Ok(Self {
            audio_object_type: audio_object_type.into(),
            sampling_frequency,
            channel_configuration,
        })
    }

    /// Serialize back to the two-byte AudioSpecificConfig layout.
    ///
    /// Only the common case is supported: object type below 31 and a
    /// sampling frequency present in the index table.
    pub fn build(&self) -> io::Result<Vec<u8>> {
        let frequency_index =
            SampleFrequencyIndex::from_freq(self.sampling_frequency).ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidData, "sampling frequency not in index table")
            })?;

        let mut writer = BitWriter::new();
        writer.write_bits(self.audio_object_type.as_u16() as u64, 5);
        writer.write_bits(frequency_index as u8 as u64, 4);
        writer.write_bits(self.channel_configuration as u64, 4);
        // GASpecificConfig: frame_length_flag, depends_on_core_coder, extension_flag
        writer.write_bits(0, 3);
        Ok(writer.finish())
    }

    /// RFC 6381 codec string, e.g. `mp4a.40.2`.
    pub fn codec_string(&self) -> String {
        format!("mp4a.40.{}", self.audio_object_type.as_u16())
    }
}

/// Whether the payload starts with the 12-bit ADTS sync word `0xFFF`.
pub fn is_adts(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0xFF && (data[1] & 0xF0) == 0xF0
}

/// A decoded fixed+variable ADTS header.
/// ISO/IEC 14496-3:2019(E) - 1.A.2.2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsHeader {
    /// Decoded AudioSpecificConfig equivalent fields.
    pub config: AudioSpecificConfig,
    /// Total frame length including the header itself.
    pub frame_length: usize,
    /// Header length: 7 bytes, or 9 when CRC protection is present.
    pub header_length: usize,
}

impl AdtsHeader {
    /// Parse an ADTS header from the start of `data`.
    pub fn parse(data: &[u8]) -> io::Result<Self> {
        if data.len() < ADTS_HEADER_LEN {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "short ADTS header"));
        }
        if !is_adts(data) {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "missing ADTS sync word"));
        }

        let protection_absent = data[1] & 0x01 != 0;
        let profile = (data[2] >> 6) & 0x03;
        let frequency_index = (data[2] >> 2) & 0x0F;
        let channel_configuration = ((data[2] & 0x01) << 2) | (data[3] >> 6);
        let frame_length =
            ((data[3] as usize & 0x03) << 11) | ((data[4] as usize) << 3) | (data[5] as usize >> 5);

        let sampling_frequency = SampleFrequencyIndex::from_u8(frequency_index)
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidData, "invalid sampling frequency index")
            })?
            .to_freq();

        Ok(Self {
            config: AudioSpecificConfig {
                // ADTS `profile` is the object type minus one.
                audio_object_type: AudioObjectType::from_u16(profile as u16 + 1),
                sampling_frequency,
                channel_configuration,
            },
            frame_length,
            header_length: if protection_absent { 7 } else { 9 },
        })
    }

    /// Build a 7-byte ADTS header (no CRC) for a raw frame of
    /// `payload_len` bytes.
    pub fn build(
        config: &AudioSpecificConfig,
        payload_len: usize,
    ) -> io::Result<[u8; ADTS_HEADER_LEN]> {
        let frequency_index = SampleFrequencyIndex::from_freq(config.sampling_frequency)
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidData, "sampling frequency not in index table")
            })? as u8;

        let object_type = config.audio_object_type.as_u16();
        if object_type == 0 || object_type > 4 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "object type not representable in ADTS",
            ));
        }
        let profile = (object_type - 1) as u8;
        let frame_length = payload_len + ADTS_HEADER_LEN;
        if frame_length > 0x1FFF {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "ADTS frame too large"));
        }

        let channels = config.channel_configuration & 0x07;
        let mut header = [0u8; ADTS_HEADER_LEN];
        header[0] = 0xFF;
        // Sync low nibble, MPEG-4, layer 0, protection absent.
        header[1] = 0xF1;
        header[2] = (profile << 6) | (frequency_index << 2) | (channels >> 2);
        header[3] = ((channels & 0x03) << 6) | ((frame_length >> 11) as u8 & 0x03);
        header[4] = (frame_length >> 3) as u8;
        header[5] = ((frame_length as u8 & 0x07) << 5) | 0x1F;
        // Buffer fullness low bits all ones, one raw data block.
        header[6] = 0xFC;
        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asc_parse() {
        // AAC LC, 44.1 kHz, stereo.
        let data = [0x12, 0x10];
        let config = AudioSpecificConfig::parse(&data).unwrap();
        assert_eq!(config.audio_object_type, AudioObjectType::AacLowComplexity);
        assert_eq!(config.sampling_frequency, 44100);
        assert_eq!(config.channel_configuration, 2);
        assert_eq!(config.codec_string(), "mp4a.40.2");
    }

    #[test]
    fn test_asc_build_round_trip() {
        let config = AudioSpecificConfig {
            audio_object_type: AudioObjectType::AacLowComplexity,
            sampling_frequency: 48000,
            channel_configuration: 2,
        };
        let built = config.build().unwrap();
        assert_eq!(built.len(), 2);
        assert_eq!(AudioSpecificConfig::parse(&built).unwrap(), config);
    }

    #[test]
    fn test_adts_round_trip() {
        let config = AudioSpecificConfig {
            audio_object_type: AudioObjectType::AacLowComplexity,
            sampling_frequency: 44100,
            channel_configuration: 2,
        };
        let payload = [0xDEu8; 120];
        let header = AdtsHeader::build(&config, payload.len()).unwrap();

        let mut frame = header.to_vec();
        frame.extend_from_slice(&payload);

        assert!(is_adts(&frame));
        let parsed = AdtsHeader::parse(&frame).unwrap();
        assert_eq!(parsed.config, config);
        assert_eq!(parsed.frame_length, payload.len() + ADTS_HEADER_LEN);
        assert_eq!(parsed.header_length, 7);
    }

    #[test]
    fn test_freq_index_lookup() {
        assert_eq!(
            SampleFrequencyIndex::from_freq(48000),
            Some(SampleFrequencyIndex::Freq48000)
        );
        assert_eq!(
            SampleFrequencyIndex::from_freq(44100),
            Some(SampleFrequencyIndex::Freq44100)
        );
        assert_eq!(SampleFrequencyIndex::from_freq(47999), None);
    }

    #[test]
    fn test_not_adts() {
        assert!(!is_adts(&[0x21, 0x10, 0x04]));
        assert!(AdtsHeader::parse(&[0x21, 0x10, 0x04, 0x60, 0x8C, 0x1C, 0x00]).is_err());
    }
}
