//! A header-only AV1 toolkit for the HLS writer.
//!
//! Walks the OBU layer of an AV1 temporal unit (leb128 sizes), extracts the
//! sequence header OBU, decodes the fields that drive the `av01` codec
//! string and track dimensions, and builds the `av1C` codec configuration
//! record for the fMP4 sample entry.

mod obu;
mod seq;

use std::io;

use bytes::Bytes;

pub use obu::{find_sequence_header, obu_units, Obu, ObuType};
pub use seq::SequenceHeader;

/// The AV1 Codec Configuration Record (`av1C` box payload).
/// <https://aomediacodec.github.io/av1-isobmff/#av1codecconfigurationbox-syntax>
#[derive(Debug, Clone, PartialEq)]
pub struct Av1CodecConfigurationRecord {
    /// `seq_profile` from the sequence header.
    pub seq_profile: u8,
    /// `seq_level_idx` of the first operating point.
    pub seq_level_idx_0: u8,
    /// `seq_tier` of the first operating point.
    pub seq_tier_0: bool,
    /// `high_bitdepth` flag.
    pub high_bitdepth: bool,
    /// `twelve_bit` flag.
    pub twelve_bit: bool,
    /// `mono_chrome` flag.
    pub monochrome: bool,
    /// `subsampling_x` flag.
    pub chroma_subsampling_x: bool,
    /// `subsampling_y` flag.
    pub chroma_subsampling_y: bool,
    /// `chroma_sample_position`.
    pub chroma_sample_position: u8,
    /// The sequence header OBU carried verbatim (header + payload).
    pub config_obu: Bytes,
}

impl Av1CodecConfigurationRecord {
    /// Build a record from a sequence header OBU (complete, with header).
    pub fn from_sequence_header(config_obu: Bytes) -> io::Result<Self> {
        let header = SequenceHeader::parse_obu(&config_obu)?;
        Ok(Self {
            seq_profile: header.seq_profile,
            seq_level_idx_0: header.seq_level_idx_0,
            seq_tier_0: header.seq_tier_0,
            high_bitdepth: header.bit_depth > 8,
            twelve_bit: header.bit_depth == 12,
            monochrome: header.mono_chrome,
            chroma_subsampling_x: header.subsampling_x,
            chroma_subsampling_y: header.subsampling_y,
            chroma_sample_position: header.chroma_sample_position,
            config_obu,
        })
    }

    /// Serialize the record.
    pub fn build(&self, out: &mut Vec<u8>) {
        out.push(0b1000_0001); // marker + version 1
        out.push((self.seq_profile << 5) | (self.seq_level_idx_0 & 0x1F));
        out.push(
            ((self.seq_tier_0 as u8) << 7)
                | ((self.high_bitdepth as u8) << 6)
                | ((self.twelve_bit as u8) << 5)
                | ((self.monochrome as u8) << 4)
                | ((self.chroma_subsampling_x as u8) << 3)
                | ((self.chroma_subsampling_y as u8) << 2)
                | (self.chroma_sample_position & 0x03),
        );
        out.push(0); // no initial_presentation_delay
        out.extend_from_slice(&self.config_obu);
    }

    /// Serialized size in bytes.
    pub fn size(&self) -> usize {
        4 + self.config_obu.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_layout() {
        let record = Av1CodecConfigurationRecord {
            seq_profile: 0,
            seq_level_idx_0: 8,
            seq_tier_0: false,
            high_bitdepth: false,
            twelve_bit: false,
            monochrome: false,
            chroma_subsampling_x: true,
            chroma_subsampling_y: true,
            chroma_sample_position: 0,
            config_obu: Bytes::from_static(&[0x0A, 0x02, 0x00, 0x00]),
        };

        let mut out = Vec::new();
        record.build(&mut out);
        assert_eq!(out.len(), record.size());
        assert_eq!(out[0], 0x81);
        assert_eq!(out[1], 0x08);
        assert_eq!(out[2], 0b0000_1100);
        assert_eq!(&out[4..], &[0x0A, 0x02, 0x00, 0x00]);
    }
}
