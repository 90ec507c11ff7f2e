use std::io;

use bitio::{BitReader, BitReaderExpGolombExt};

/// The SPS fields the writer consumes.
///
/// This is a deliberately partial decode of ISO/IEC-14496-10-2022 - 7.3.2:
/// everything up to the frame cropping offsets is walked so that the
/// profile/level bytes and the coded picture dimensions come out right, and
/// the rest of the RBSP is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sps {
    /// The `profile_idc` byte, e.g. 66 (Baseline), 100 (High).
    pub profile_idc: u8,
    /// The constraint_setX flags packed in their byte (reserved bits zero).
    pub constraint_flags: u8,
    /// The `level_idc` byte, e.g. 31 for level 3.1.
    pub level_idc: u8,
    /// Decoded picture width in luma samples after cropping.
    pub width: u32,
    /// Decoded picture height in luma samples after cropping.
    pub height: u32,
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

fn skip_scaling_list(reader: &mut BitReader<'_>, size: u32) -> io::Result<()> {
    let mut last_scale = 8i64;
    let mut next_scale = 8i64;
    for _ in 0..size {
        if next_scale != 0 {
            let delta = reader.read_signed_exp_golomb()?;
            next_scale = (last_scale + delta + 256) % 256;
        }
        if next_scale != 0 {
            last_scale = next_scale;
        }
    }
    Ok(())
}

impl Sps {
    /// Parse an SPS NAL unit (header byte included, emulation prevention
    /// bytes still present).
    pub fn parse(nal: &[u8]) -> io::Result<Self> {
        if nal.is_empty() || nal[0] & 0x1F != 7 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "not an SPS NAL unit"));
        }

        let rbsp = strip_emulation_prevention(&nal[1..]);
        let mut reader = BitReader::new(&rbsp);

        let profile_idc = reader.read_bits(8)? as u8;
        let constraint_flags = reader.read_bits(8)? as u8;
        let level_idc = reader.read_bits(8)? as u8;
        let _seq_parameter_set_id = reader.read_exp_golomb()?;

        let mut chroma_format_idc = 1;
        if matches!(profile_idc, 100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134 | 135)
        {
            chroma_format_idc = reader.read_exp_golomb()?;
            if chroma_format_idc == 3 {
                let _separate_colour_plane_flag = reader.read_bit()?;
            }
            let _bit_depth_luma_minus8 = reader.read_exp_golomb()?;
            let _bit_depth_chroma_minus8 = reader.read_exp_golomb()?;
            let _qpprime_y_zero_transform_bypass_flag = reader.read_bit()?;
            if reader.read_bit()? {
                // seq_scaling_matrix_present_flag
                let count = if chroma_format_idc == 3 { 12 } else { 8 };
                for i in 0..count {
                    if reader.read_bit()? {
                        skip_scaling_list(&mut reader, if i < 6 { 16 } else { 64 })?;
                    }
                }
            }
        }

        let _log2_max_frame_num_minus4 = reader.read_exp_golomb()?;
        let pic_order_cnt_type = reader.read_exp_golomb()?;
        if pic_order_cnt_type == 0 {
            let _log2_max_pic_order_cnt_lsb_minus4 = reader.read_exp_golomb()?;
        } else if pic_order_cnt_type == 1 {
            let _delta_pic_order_always_zero_flag = reader.read_bit()?;
            let _offset_for_non_ref_pic = reader.read_signed_exp_golomb()?;
            let _offset_for_top_to_bottom_field = reader.read_signed_exp_golomb()?;
            let cycle_len = reader.read_exp_golomb()?;
            for _ in 0..cycle_len {
                let _offset_for_ref_frame = reader.read_signed_exp_golomb()?;
            }
        }

        let _max_num_ref_frames = reader.read_exp_golomb()?;
        let _gaps_in_frame_num_value_allowed_flag = reader.read_bit()?;

        let pic_width_in_mbs_minus1 = reader.read_exp_golomb()?;
        let pic_height_in_map_units_minus1 = reader.read_exp_golomb()?;
        let frame_mbs_only_flag = reader.read_bit()?;
        if !frame_mbs_only_flag {
            let _mb_adaptive_frame_field_flag = reader.read_bit()?;
        }
        let _direct_8x8_inference_flag = reader.read_bit()?;

        let (mut crop_left, mut crop_right, mut crop_top, mut crop_bottom) = (0, 0, 0, 0);
        if reader.read_bit()? {
            // frame_cropping_flag
            crop_left = reader.read_exp_golomb()?;
            crop_right = reader.read_exp_golomb()?;
            crop_top = reader.read_exp_golomb()?;
            crop_bottom = reader.read_exp_golomb()?;
        }

        // Crop units for the common 4:2:0 / 4:2:2 cases; monochrome and
        // 4:4:4 crop in single luma samples.
        let (sub_width, sub_height) = match chroma_format_idc {
            1 => (2, 2),
            2 => (2, 1),
            _ => (1, 1),
        };
        let frame_height_factor = if frame_mbs_only_flag { 1 } else { 2 };

        let width =
            (pic_width_in_mbs_minus1 + 1) * 16 - (crop_left + crop_right) * sub_width;
        let height = (pic_height_in_map_units_minus1 + 1) * 16 * frame_height_factor
            - (crop_top + crop_bottom) * sub_height * frame_height_factor;

        Ok(Self {
            profile_idc,
            constraint_flags,
            level_idc,
            width: width as u32,
            height: height as u32,
        })
    }

    /// RFC 6381 codec string, e.g. `avc1.64001F`.
    pub fn codec_string(&self) -> String {
        format!(
            "avc1.{:02X}{:02X}{:02X}",
            self.profile_idc, self.constraint_flags, self.level_idc
        )
    }
}

#[cfg(test)]
mod tests {
    use bitio::{BitWriter, BitWriterExpGolombExt};

    use super::*;

    /// Build a syntactically valid SPS RBSP for the given layout.
    fn build_sps(profile_idc: u8, level_idc: u8, width_mbs: u64, height_mbs: u64) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.write_bits(0x67, 8); // nal header: type 7
        w.write_bits(profile_idc as u64, 8);
        w.write_bits(0, 8); // constraint flags
        w.write_bits(level_idc as u64, 8);
        w.write_exp_golomb(0); // sps id
        if profile_idc == 100 {
            w.write_exp_golomb(1); // chroma_format_idc 4:2:0
            w.write_exp_golomb(0); // bit_depth_luma_minus8
            w.write_exp_golomb(0); // bit_depth_chroma_minus8
            w.write_bit(false); // qpprime
            w.write_bit(false); // no scaling matrix
        }
        w.write_exp_golomb(0); // log2_max_frame_num_minus4
        w.write_exp_golomb(2); // pic_order_cnt_type 2 (no extra fields)
        w.write_exp_golomb(3); // max_num_ref_frames
        w.write_bit(false); // gaps allowed
        w.write_exp_golomb(width_mbs - 1);
        w.write_exp_golomb(height_mbs - 1);
        w.write_bit(true); // frame_mbs_only
        w.write_bit(true); // direct_8x8
        w.write_bit(false); // no cropping
        w.write_bit(false); // vui absent
        w.write_bit(true); // rbsp stop bit
        w.finish()
    }

    #[test]
    fn parse_baseline_sps() {
        let sps = Sps::parse(&build_sps(66, 30, 40, 30)).unwrap();
        assert_eq!(sps.profile_idc, 66);
        assert_eq!(sps.level_idc, 30);
        assert_eq!(sps.width, 640);
        assert_eq!(sps.height, 480);
        assert_eq!(sps.codec_string(), "avc1.42001E");
    }

    #[test]
    fn parse_high_profile_sps() {
        let sps = Sps::parse(&build_sps(100, 31, 80, 45)).unwrap();
        assert_eq!(sps.profile_idc, 100);
        assert_eq!(sps.width, 1280);
        assert_eq!(sps.height, 720);
        assert_eq!(sps.codec_string(), "avc1.64001F");
    }

    #[test]
    fn reject_non_sps() {
        assert!(Sps::parse(&[0x65, 0x00]).is_err());
    }

    #[test]
    fn emulation_prevention_stripped() {
        assert_eq!(strip_emulation_prevention(&[0, 0, 3, 1]), vec![0, 0, 1]);
        assert_eq!(strip_emulation_prevention(&[0, 0, 3, 0, 0, 3, 2]), vec![0, 0, 0, 0, 2]);
        assert_eq!(strip_emulation_prevention(&[1, 2, 3]), vec![1, 2, 3]);
    }
}
