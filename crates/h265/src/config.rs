use std::io::{self, Write};

use byteorder::{BigEndian, WriteBytesExt};
use bytes::Bytes;

use crate::{ProfileTierLevel, Sps};

/// The HEVC Decoder Configuration Record (`hvcC` box payload).
/// ISO/IEC 14496-15:2022(E) - 8.3.3.1
#[derive(Debug, Clone, PartialEq)]
pub struct HevcDecoderConfigurationRecord {
    /// Profile/tier/level copied from the SPS.
    pub profile_tier_level: ProfileTierLevel,
    /// `chroma_format_idc` from the SPS.
    pub chroma_format_idc: u8,
    /// Luma bit depth from the SPS.
    pub bit_depth_luma: u8,
    /// Chroma bit depth from the SPS.
    pub bit_depth_chroma: u8,
    /// Video parameter sets.
    pub vps: Vec<Bytes>,
    /// Sequence parameter sets.
    pub sps: Vec<Bytes>,
    /// Picture parameter sets.
    pub pps: Vec<Bytes>,
}

impl HevcDecoderConfigurationRecord {
    /// Assemble a record from raw parameter set NAL units. The first SPS
    /// provides the profile/tier/level and format fields.
    pub fn from_parameter_sets(
        vps: Vec<Bytes>,
        sps: Vec<Bytes>,
        pps: Vec<Bytes>,
    ) -> io::Result<Self> {
        let first = sps
            .first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing SPS"))?;
        let parsed = Sps::parse(first)?;

        Ok(Self {
            profile_tier_level: parsed.profile_tier_level,
            chroma_format_idc: parsed.chroma_format_idc,
            bit_depth_luma: parsed.bit_depth_luma,
            bit_depth_chroma: parsed.bit_depth_chroma,
            vps,
            sps,
            pps,
        })
    }

    fn write_array(
        writer: &mut impl Write,
        nal_type: u8,
        units: &[Bytes],
    ) -> io::Result<()> {
        writer.write_u8(0b1000_0000 | (nal_type & 0x3F))?; // array_completeness set
        writer.write_u16::<BigEndian>(units.len() as u16)?;
        for unit in units {
            writer.write_u16::<BigEndian>(unit.len() as u16)?;
            writer.write_all(unit)?;
        }
        Ok(())
    }

    /// Serialize the record. Four-byte NALU lengths are always signalled.
    pub fn build(&self, writer: &mut impl Write) -> io::Result<()> {
        let ptl = &self.profile_tier_level;

        writer.write_u8(1)?; // configuration_version
        writer.write_u8(
            (ptl.profile_space << 6) | ((ptl.tier_flag as u8) << 5) | (ptl.profile_idc & 0x1F),
        )?;
        writer.write_u32::<BigEndian>(ptl.profile_compatibility_flags)?;
        writer.write_all(&ptl.constraint_indicator_flags.to_be_bytes()[2..])?;
        writer.write_u8(ptl.level_idc)?;
        writer.write_u16::<BigEndian>(0xF000)?; // min_spatial_segmentation_idc
        writer.write_u8(0xFC)?; // parallelismType unknown
        writer.write_u8(0xFC | (self.chroma_format_idc & 0x03))?;
        writer.write_u8(0xF8 | ((self.bit_depth_luma - 8) & 0x07))?;
        writer.write_u8(0xF8 | ((self.bit_depth_chroma - 8) & 0x07))?;
        writer.write_u16::<BigEndian>(0)?; // avgFrameRate
        // constantFrameRate=0, numTemporalLayers=1, temporalIdNested=1, lengthSizeMinusOne=3
        writer.write_u8((1 << 3) | (1 << 2) | 3)?;

        writer.write_u8(3)?; // numOfArrays: VPS, SPS, PPS
        Self::write_array(writer, 32, &self.vps)?;
        Self::write_array(writer, 33, &self.sps)?;
        Self::write_array(writer, 34, &self.pps)?;

        Ok(())
    }

    /// Serialized size in bytes.
    pub fn size(&self) -> usize {
        23 + [&self.vps, &self.sps, &self.pps]
            .iter()
            .map(|units| 3 + units.iter().map(|u| 2 + u.len()).sum::<usize>())
            .sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_ptl() -> ProfileTierLevel {
        ProfileTierLevel {
            profile_space: 0,
            tier_flag: false,
            profile_idc: 1,
            profile_compatibility_flags: 0x6000_0000,
            constraint_indicator_flags: 0xB000_0000_0000,
            level_idc: 93,
        }
    }

    #[test]
    fn build_layout() {
        let record = HevcDecoderConfigurationRecord {
            profile_tier_level: sample_ptl(),
            chroma_format_idc: 1,
            bit_depth_luma: 8,
            bit_depth_chroma: 8,
            vps: vec![Bytes::from_static(&[0x40, 0x01])],
            sps: vec![Bytes::from_static(&[0x42, 0x01, 0x02])],
            pps: vec![Bytes::from_static(&[0x44, 0x01])],
        };

        let mut out = Vec::new();
        record.build(&mut out).unwrap();

        assert_eq!(out.len(), record.size());
        assert_eq!(out[0], 1);
        assert_eq!(out[1], 0x01); // space 0, main tier, profile 1
        assert_eq!(&out[2..6], &0x6000_0000u32.to_be_bytes());
        assert_eq!(out[12], 93);
        assert_eq!(out[22], 3); // three arrays
        assert_eq!(out[23] & 0x3F, 32); // VPS array first
    }
}
