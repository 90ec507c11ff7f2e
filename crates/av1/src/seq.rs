use std::io;

use bitio::BitReader;

use crate::obu::{obu_units, ObuType};

/// The sequence header fields the writer consumes.
/// AV1 spec 5.5.1
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceHeader {
    /// `seq_profile`.
    pub seq_profile: u8,
    /// `seq_level_idx` of operating point 0.
    pub seq_level_idx_0: u8,
    /// `seq_tier` of operating point 0.
    pub seq_tier_0: bool,
    /// Decoded bit depth (8, 10 or 12).
    pub bit_depth: u8,
    /// `mono_chrome`.
    pub mono_chrome: bool,
    /// `subsampling_x`.
    pub subsampling_x: bool,
    /// `subsampling_y`.
    pub subsampling_y: bool,
    /// `chroma_sample_position` (0 when absent).
    pub chroma_sample_position: u8,
    /// `max_frame_width_minus_1` + 1.
    pub max_frame_width: u32,
    /// `max_frame_height_minus_1` + 1.
    pub max_frame_height: u32,
}

fn read_uvlc(reader: &mut BitReader<'_>) -> io::Result<u64> {
    let mut leading_zeros = 0u32;
    while !reader.read_bit()? {
        leading_zeros += 1;
        if leading_zeros >= 32 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "uvlc too long"));
        }
    }
    Ok(reader.read_bits(leading_zeros)? + (1u64 << leading_zeros) - 1)
}

fn skip_timing_info(reader: &mut BitReader<'_>) -> io::Result<()> {
    reader.skip_bits(32)?; // num_units_in_display_tick
    reader.skip_bits(32)?; // time_scale
    if reader.read_bit()? {
        // equal_picture_interval
        let _num_ticks_per_picture = read_uvlc(reader)?;
    }
    Ok(())
}

impl SequenceHeader {
    /// Parse a sequence header OBU including its OBU header and size field.
    pub fn parse_obu(obu: &[u8]) -> io::Result<Self> {
        let units = obu_units(obu)?;
        let seq = units
            .iter()
            .find(|u| u.obu_type == ObuType::SequenceHeader)
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidData, "not a sequence header OBU")
            })?;
        Self::parse_payload(seq.payload)
    }

    /// Parse the sequence header OBU payload.
    pub fn parse_payload(payload: &[u8]) -> io::Result<Self> {
        let mut reader = BitReader::new(payload);

        let seq_profile = reader.read_bits(3)? as u8;
        let _still_picture = reader.read_bit()?;
        let reduced_still_picture_header = reader.read_bit()?;

        let mut seq_level_idx_0 = 0;
        let mut seq_tier_0 = false;
        let mut decoder_model_info_present = false;
        let mut buffer_delay_length = 0u8;

        if reduced_still_picture_header {
            seq_level_idx_0 = reader.read_bits(5)? as u8;
        } else {
            if reader.read_bit()? {
                // timing_info_present_flag
                skip_timing_info(&mut reader)?;
                decoder_model_info_present = reader.read_bit()?;
                if decoder_model_info_present {
                    buffer_delay_length = reader.read_bits(5)? as u8 + 1;
                    reader.skip_bits(32)?; // num_units_in_decoding_tick
                    reader.skip_bits(10)?; // buffer_removal + frame_presentation lengths
                }
            }
            let initial_display_delay_present = reader.read_bit()?;
            let operating_points_cnt_minus_1 = reader.read_bits(5)? as u8;

            for i in 0..=operating_points_cnt_minus_1 {
                let _operating_point_idc = reader.read_bits(12)?;
                let seq_level_idx = reader.read_bits(5)? as u8;
                let seq_tier = if seq_level_idx > 7 { reader.read_bit()? } else { false };
                if i == 0 {
                    seq_level_idx_0 = seq_level_idx;
                    seq_tier_0 = seq_tier;
                }
                if decoder_model_info_present && reader.read_bit()? {
                    reader.skip_bits(buffer_delay_length as u32 * 2 + 1)?;
                }
                if initial_display_delay_present && reader.read_bit()? {
                    reader.skip_bits(4)?;
                }
            }
        }

        let frame_width_bits = reader.read_bits(4)? as u32 + 1;
        let frame_height_bits = reader.read_bits(4)? as u32 + 1;
        let max_frame_width = reader.read_bits(frame_width_bits)? as u32 + 1;
        let max_frame_height = reader.read_bits(frame_height_bits)? as u32 + 1;

        if !reduced_still_picture_header && reader.read_bit()? {
            // frame_id_numbers_present_flag
            reader.skip_bits(7)?; // delta/additional frame id lengths
        }

        reader.skip_bits(3)?; // use_128x128_superblock, filter_intra, intra_edge_filter

        if !reduced_still_picture_header {
            reader.skip_bits(4)?; // interintra, masked compound, warped motion, dual filter
            let enable_order_hint = reader.read_bit()?;
            if enable_order_hint {
                reader.skip_bits(2)?; // jnt_comp, ref_frame_mvs
            }
            if !reader.read_bit()? {
                // seq_choose_screen_content_tools == 0
                let force_screen_content = reader.read_bit()?;
                if force_screen_content && !reader.read_bit()? {
                    reader.skip_bits(1)?; // seq_force_integer_mv
                }
            } else if !reader.read_bit()? {
                // seq_force_screen_content_tools == SELECT, choose_integer_mv == 0
                reader.skip_bits(1)?;
            }
            if enable_order_hint {
                reader.skip_bits(3)?; // order_hint_bits_minus_1
            }
        }

        reader.skip_bits(3)?; // enable_superres, enable_cdef, enable_restoration

        // color_config()
        let high_bitdepth = reader.read_bit()?;
        let bit_depth = if seq_profile == 2 && high_bitdepth {
            if reader.read_bit()? { 12 } else { 10 }
        } else if high_bitdepth {
            10
        } else {
            8
        };

        let mono_chrome = if seq_profile == 1 { false } else { reader.read_bit()? };

        let mut identity_matrix = false;
        if reader.read_bit()? {
            // color_description_present_flag
            let color_primaries = reader.read_bits(8)?;
            let transfer_characteristics = reader.read_bits(8)?;
            let matrix_coefficients = reader.read_bits(8)?;
            identity_matrix =
                color_primaries == 1 && transfer_characteristics == 13 && matrix_coefficients == 0;
        }

        let (subsampling_x, subsampling_y, chroma_sample_position) = if mono_chrome {
            let _full_color_range = reader.read_bit()?;
            (true, true, 0)
        } else if identity_matrix {
            (false, false, 0)
        } else {
            let _full_color_range = reader.read_bit()?;
            let (x, y) = match seq_profile {
                0 => (true, true),
                1 => (false, false),
                _ => {
                    if bit_depth == 12 {
                        let x = reader.read_bit()?;
                        let y = if x { reader.read_bit()? } else { false };
                        (x, y)
                    } else {
                        (true, false)
                    }
                }
            };
            let position = if x && y { reader.read_bits(2)? as u8 } else { 0 };
            (x, y, position)
        };

        Ok(Self {
            seq_profile,
            seq_level_idx_0,
            seq_tier_0,
            bit_depth,
            mono_chrome,
            subsampling_x,
            subsampling_y,
            chroma_sample_position,
            max_frame_width,
            max_frame_height,
        })
    }

    /// RFC 6381 codec string, e.g. `av01.0.08M.08`.
    pub fn codec_string(&self) -> String {
        format!(
            "av01.{}.{:02}{}.{:02}",
            self.seq_profile,
            self.seq_level_idx_0,
            if self.seq_tier_0 { 'H' } else { 'M' },
            self.bit_depth
        )
    }
}

#[cfg(test)]
mod tests {
    use bitio::BitWriter;

    use super::*;

    /// Build a minimal sequence header OBU payload.
    fn build_payload(width: u32, height: u32, level: u8) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.write_bits(0, 3); // seq_profile 0
        w.write_bit(false); // still_picture
        w.write_bit(false); // reduced_still_picture_header
        w.write_bit(false); // timing_info_present
        w.write_bit(false); // initial_display_delay_present
        w.write_bits(0, 5); // one operating point
        w.write_bits(0, 12); // operating_point_idc
        w.write_bits(level as u64, 5);
        w.write_bits(15, 4); // frame_width_bits_minus_1
        w.write_bits(15, 4); // frame_height_bits_minus_1
        w.write_bits(width as u64 - 1, 16);
        w.write_bits(height as u64 - 1, 16);
        w.write_bit(false); // frame_id_numbers_present
        w.write_bits(0, 3); // superblock, filter_intra, intra_edge
        w.write_bits(0, 4); // compound tools
        w.write_bit(false); // enable_order_hint
        w.write_bit(true); // seq_choose_screen_content_tools
        w.write_bit(true); // seq_choose_integer_mv
        w.write_bits(0, 3); // superres, cdef, restoration
        w.write_bit(false); // high_bitdepth
        w.write_bit(false); // mono_chrome
        w.write_bit(false); // color_description_present
        w.write_bit(false); // full_color_range
        w.write_bits(0, 2); // chroma_sample_position
        w.write_bit(false); // separate_uv_delta_q
        w.write_bits(0, 8); // trailing
        w.finish()
    }

    #[test]
    fn parse_minimal_header() {
        let payload = build_payload(1920, 1080, 8);
        let header = SequenceHeader::parse_payload(&payload).unwrap();
        assert_eq!(header.seq_profile, 0);
        assert_eq!(header.seq_level_idx_0, 8);
        assert_eq!(header.bit_depth, 8);
        assert_eq!(header.max_frame_width, 1920);
        assert_eq!(header.max_frame_height, 1080);
        assert!(header.subsampling_x && header.subsampling_y);
        assert_eq!(header.codec_string(), "av01.0.08M.08");
    }

    #[test]
    fn parse_from_full_obu() {
        let payload = build_payload(640, 360, 4);
        let mut obu = vec![(1 << 3) | 0x02, payload.len() as u8];
        obu.extend_from_slice(&payload);

        let header = SequenceHeader::parse_obu(&obu).unwrap();
        assert_eq!(header.max_frame_width, 640);
        assert_eq!(header.codec_string(), "av01.0.04M.08");
    }
}
