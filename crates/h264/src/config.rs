use std::io::{self, Write};

use byteorder::{BigEndian, WriteBytesExt};
use bytes::Bytes;

use crate::Sps;

/// The AVC Decoder Configuration Record (`avcC` box payload).
/// ISO/IEC 14496-15:2022(E) - 5.3.2.1.2
#[derive(Debug, Clone, PartialEq)]
pub struct AvcDecoderConfigurationRecord {
    /// `profile_idc` from the SPS.
    pub profile_indication: u8,
    /// The constraint flags byte from the SPS.
    pub profile_compatibility: u8,
    /// `level_idc` from the SPS.
    pub level_indication: u8,
    /// Sequence parameter sets, ascending SPS id.
    pub sps: Vec<Bytes>,
    /// Picture parameter sets, ascending PPS id.
    pub pps: Vec<Bytes>,
}

impl AvcDecoderConfigurationRecord {
    /// Assemble a record from raw parameter set NAL units. The first SPS
    /// provides the profile/level bytes.
    pub fn from_parameter_sets(sps: Vec<Bytes>, pps: Vec<Bytes>) -> io::Result<Self> {
        let first = sps
            .first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing SPS"))?;
        let parsed = Sps::parse(first)?;

        Ok(Self {
            profile_indication: parsed.profile_idc,
            profile_compatibility: parsed.constraint_flags,
            level_indication: parsed.level_idc,
            sps,
            pps,
        })
    }

    /// Serialize the record. Four-byte NALU lengths are always signalled.
    pub fn build(&self, writer: &mut impl Write) -> io::Result<()> {
        writer.write_u8(1)?; // configuration_version
        writer.write_u8(self.profile_indication)?;
        writer.write_u8(self.profile_compatibility)?;
        writer.write_u8(self.level_indication)?;
        writer.write_u8(0b1111_1100 | 3)?; // length_size_minus_one = 3

        writer.write_u8(0b1110_0000 | (self.sps.len() as u8 & 0x1F))?;
        for sps in &self.sps {
            writer.write_u16::<BigEndian>(sps.len() as u16)?;
            writer.write_all(sps)?;
        }

        writer.write_u8(self.pps.len() as u8)?;
        for pps in &self.pps {
            writer.write_u16::<BigEndian>(pps.len() as u16)?;
            writer.write_all(pps)?;
        }

        Ok(())
    }

    /// Serialized size in bytes.
    pub fn size(&self) -> usize {
        7 + self.sps.iter().map(|s| 2 + s.len()).sum::<usize>()
            + self.pps.iter().map(|p| 2 + p.len()).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_layout() {
        let record = AvcDecoderConfigurationRecord {
            profile_indication: 100,
            profile_compatibility: 0,
            level_indication: 31,
            sps: vec![Bytes::from_static(&[0x67, 0x64, 0x00, 0x1F])],
            pps: vec![Bytes::from_static(&[0x68, 0xEB])],
        };

        let mut out = Vec::new();
        record.build(&mut out).unwrap();

        assert_eq!(out.len(), record.size());
        assert_eq!(out[0], 1);
        assert_eq!(out[1], 100);
        assert_eq!(out[3], 31);
        assert_eq!(out[4] & 0x03, 3);
        assert_eq!(out[5] & 0x1F, 1); // one SPS
        assert_eq!(&out[6..8], &[0x00, 0x04]);
        assert_eq!(&out[8..12], &[0x67, 0x64, 0x00, 0x1F]);
        assert_eq!(out[12], 1); // one PPS
    }
}
