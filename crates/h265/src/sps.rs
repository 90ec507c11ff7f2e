use std::io;

use bitio::{BitReader, BitReaderExpGolombExt};

/// The `profile_tier_level()` fields the writer consumes.
/// ITU-T H.265 - 7.3.3
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileTierLevel {
    /// `general_profile_space` (0 in conforming streams).
    pub profile_space: u8,
    /// `general_tier_flag`: false = Main tier, true = High tier.
    pub tier_flag: bool,
    /// `general_profile_idc`, e.g. 1 (Main), 2 (Main 10).
    pub profile_idc: u8,
    /// `general_profile_compatibility_flag[j]` packed MSB-first.
    pub profile_compatibility_flags: u32,
    /// The 48 constraint indicator bits.
    pub constraint_indicator_flags: u64,
    /// `general_level_idc` (level * 30), e.g. 93 for level 3.1.
    pub level_idc: u8,
}

impl ProfileTierLevel {
    fn parse(reader: &mut BitReader<'_>, max_sub_layers_minus1: u8) -> io::Result<Self> {
        let profile_space = reader.read_bits(2)? as u8;
        let tier_flag = reader.read_bit()?;
        let profile_idc = reader.read_bits(5)? as u8;
        let profile_compatibility_flags = reader.read_bits(32)? as u32;
        let constraint_indicator_flags = reader.read_bits(48)?;
        let level_idc = reader.read_bits(8)? as u8;

        let mut profile_present = [false; 8];
        let mut level_present = [false; 8];
        for i in 0..max_sub_layers_minus1 as usize {
            profile_present[i] = reader.read_bit()?;
            level_present[i] = reader.read_bit()?;
        }
        if max_sub_layers_minus1 > 0 {
            for _ in max_sub_layers_minus1..8 {
                reader.skip_bits(2)?; // reserved_zero_2bits
            }
        }
        for i in 0..max_sub_layers_minus1 as usize {
            if profile_present[i] {
                reader.skip_bits(88)?;
            }
            if level_present[i] {
                reader.skip_bits(8)?;
            }
        }

        Ok(Self {
            profile_space,
            tier_flag,
            profile_idc,
            profile_compatibility_flags,
            constraint_indicator_flags,
            level_idc,
        })
    }

    /// RFC 6381 / ISO 14496-15 Annex E codec string, e.g. `hvc1.1.6.L93.B0`.
    pub fn codec_string(&self) -> String {
        let mut out = String::from("hvc1.");

        match self.profile_space {
            1 => out.push('A'),
            2 => out.push('B'),
            3 => out.push('C'),
            _ => {}
        }
        out.push_str(&format!("{}.", self.profile_idc));

        // Compatibility flags are rendered in reverse bit order.
        out.push_str(&format!("{:X}.", self.profile_compatibility_flags.reverse_bits()));

        out.push(if self.tier_flag { 'H' } else { 'L' });
        out.push_str(&format!("{}", self.level_idc));

        // Constraint bytes, trailing zero bytes omitted.
        let bytes = self.constraint_indicator_flags.to_be_bytes();
        let constraints = &bytes[2..]; // 48 bits
        let used = constraints
            .iter()
            .rposition(|&b| b != 0)
            .map(|p| p + 1)
            .unwrap_or(0);
        for byte in &constraints[..used] {
            out.push_str(&format!(".{byte:X}"));
        }

        out
    }
}

/// The SPS fields the writer consumes.
/// ITU-T H.265 - 7.3.2.2
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sps {
    /// The profile/tier/level structure driving the codec string.
    pub profile_tier_level: ProfileTierLevel,
    /// `chroma_format_idc`.
    pub chroma_format_idc: u8,
    /// Decoded picture width in luma samples after the conformance window.
    pub width: u32,
    /// Decoded picture height in luma samples after the conformance window.
    pub height: u32,
    /// `bit_depth_luma_minus8` + 8.
    pub bit_depth_luma: u8,
    /// `bit_depth_chroma_minus8` + 8.
    pub bit_depth_chroma: u8,
}

/// Remove `emulation_prevention_three_byte`s (`00 00 03` -> `00 00`).
fn strip_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut zeros = 0u8;
    for &byte in data {
        if zeros >= 2 && byte == 0x03 {
            zeros = 0;
            continue;
        }
        if byte == 0 {
            zeros += 1;
        } else {
            zeros = 0;
        }
        out.push(byte);
    }
    out
}

impl Sps {
    /// Parse an SPS NAL unit (two-byte header included, emulation
    /// prevention bytes still present).
    pub fn parse(nal: &[u8]) -> io::Result<Self> {
        if nal.len() < 2 || (nal[0] >> 1) & 0x3F != 33 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "not an SPS NAL unit"));
        }

        let rbsp = strip_emulation_prevention(&nal[2..]);
        let mut reader = BitReader::new(&rbsp);

        let _sps_video_parameter_set_id = reader.read_bits(4)?;
        let max_sub_layers_minus1 = reader.read_bits(3)? as u8;
        let _temporal_id_nesting_flag = reader.read_bit()?;

        let profile_tier_level = ProfileTierLevel::parse(&mut reader, max_sub_layers_minus1)?;

        let _sps_seq_parameter_set_id = reader.read_exp_golomb()?;
        let chroma_format_idc = reader.read_exp_golomb()? as u8;
        if chroma_format_idc == 3 {
            let _separate_colour_plane_flag = reader.read_bit()?;
        }

        let pic_width_in_luma_samples = reader.read_exp_golomb()?;
        let pic_height_in_luma_samples = reader.read_exp_golomb()?;

        let (mut win_left, mut win_right, mut win_top, mut win_bottom) = (0, 0, 0, 0);
        if reader.read_bit()? {
            // conformance_window_flag
            win_left = reader.read_exp_golomb()?;
            win_right = reader.read_exp_golomb()?;
            win_top = reader.read_exp_golomb()?;
            win_bottom = reader.read_exp_golomb()?;
        }

        let bit_depth_luma = reader.read_exp_golomb()? as u8 + 8;
        let bit_depth_chroma = reader.read_exp_golomb()? as u8 + 8;

        let (sub_width, sub_height) = match chroma_format_idc {
            1 => (2, 2),
            2 => (2, 1),
            _ => (1, 1),
        };
        let width = pic_width_in_luma_samples - (win_left + win_right) * sub_width;
        let height = pic_height_in_luma_samples - (win_top + win_bottom) * sub_height;

        Ok(Self {
            profile_tier_level,
            chroma_format_idc,
            width: width as u32,
            height: height as u32,
            bit_depth_luma,
            bit_depth_chroma,
        })
    }

    /// RFC 6381 codec string for this SPS.
    pub fn codec_string(&self) -> String {
        self.profile_tier_level.codec_string()
    }
}

#[cfg(test)]
mod tests {
    use bitio::{BitWriter, BitWriterExpGolombExt};

    use super::*;

    /// Build a syntactically valid single-layer SPS.
    fn build_sps(profile_idc: u8, level_idc: u8, width: u64, height: u64) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.write_bits(0x42, 8); // nal type 33
        w.write_bits(0x01, 8);
        w.write_bits(0, 4); // vps id
        w.write_bits(0, 3); // max_sub_layers_minus1
        w.write_bit(true); // temporal id nesting

        // profile_tier_level
        w.write_bits(0, 2); // profile space
        w.write_bit(false); // tier
        w.write_bits(profile_idc as u64, 5);
        w.write_bits(1u64 << (31 - profile_idc as u64), 32); // compat flag
        w.write_bits(0xB000_0000_0000u64, 48); // progressive + frame-only
        w.write_bits(level_idc as u64, 8);

        w.write_exp_golomb(0); // sps id
        w.write_exp_golomb(1); // chroma 4:2:0
        w.write_exp_golomb(width);
        w.write_exp_golomb(height);
        w.write_bit(false); // no conformance window
        w.write_exp_golomb(0); // bit_depth_luma_minus8
        w.write_exp_golomb(0); // bit_depth_chroma_minus8
        w.write_bit(true); // padding so the reader never starves
        w.write_bits(0, 16);
        w.finish()
    }

    #[test]
    fn parse_main_profile() {
        let sps = Sps::parse(&build_sps(1, 93, 1920, 1080)).unwrap();
        assert_eq!(sps.profile_tier_level.profile_idc, 1);
        assert_eq!(sps.profile_tier_level.level_idc, 93);
        assert_eq!(sps.width, 1920);
        assert_eq!(sps.height, 1080);
        assert!(!sps.profile_tier_level.tier_flag);
    }

    #[test]
    fn codec_string_main() {
        let sps = Sps::parse(&build_sps(1, 93, 1280, 720)).unwrap();
        // Main profile: compat flag bit 1 set, reversed renders as 6
        // together with bit 2 unset; with only bit 1 set it is 0x40000000
        // reversed = 2. The fixture sets exactly bit `profile_idc`.
        assert_eq!(sps.codec_string(), "hvc1.1.2.L93.B0");
    }

    #[test]
    fn codec_string_compat_union() {
        let ptl = ProfileTierLevel {
            profile_space: 0,
            tier_flag: false,
            profile_idc: 1,
            // Bits 1 and 2 (Main + Main 10) => reversed 0x6.
            profile_compatibility_flags: 0x6000_0000,
            constraint_indicator_flags: 0xB000_0000_0000,
            level_idc: 93,
        };
        assert_eq!(ptl.codec_string(), "hvc1.1.6.L93.B0");
    }

    #[test]
    fn reject_non_sps() {
        assert!(Sps::parse(&[0x40, 0x01, 0x00]).is_err());
    }
}
