//! Bitstream fixtures for tests: synthetic parameter sets and frames that
//! the header parsers accept.

use bitio::{BitWriter, BitWriterExpGolombExt};

/// AudioSpecificConfig: AAC-LC, 48 kHz, stereo.
pub const ASC_48K_STEREO: [u8; 2] = [0x11, 0x90];
/// AudioSpecificConfig: AAC-LC, 44.1 kHz, stereo.
pub const ASC_44K_STEREO: [u8; 2] = [0x12, 0x10];

/// A syntactically valid H.264 SPS NAL unit.
pub fn h264_sps(profile_idc: u8, level_idc: u8, mbs_w: u64, mbs_h: u64) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.write_bits(0x67, 8);
    w.write_bits(profile_idc as u64, 8);
    w.write_bits(0, 8); // constraint flags
    w.write_bits(level_idc as u64, 8);
    w.write_exp_golomb(0); // sps id
    if profile_idc == 100 {
        w.write_exp_golomb(1); // chroma 4:2:0
        w.write_exp_golomb(0);
        w.write_exp_golomb(0);
        w.write_bit(false);
        w.write_bit(false);
    }
    w.write_exp_golomb(0); // log2_max_frame_num_minus4
    w.write_exp_golomb(2); // pic_order_cnt_type
    w.write_exp_golomb(3); // max_num_ref_frames
    w.write_bit(false);
    w.write_exp_golomb(mbs_w - 1);
    w.write_exp_golomb(mbs_h - 1);
    w.write_bit(true); // frame_mbs_only
    w.write_bit(true); // direct_8x8
    w.write_bit(false); // no cropping
    w.write_bit(false); // no vui
    w.write_bit(true); // stop bit
    w.finish()
}

/// An H.264 keyframe access unit in Annex-B layout: SPS + PPS + IDR slice.
pub fn h264_keyframe(sps: &[u8], payload_len: usize) -> Vec<u8> {
    let pps = [0x68, 0xEB, 0xE3, 0xCB];
    let mut idr = vec![0x65, 0x88];
    idr.resize(2 + payload_len, 0xAB);
    let units: Vec<&[u8]> = vec![sps, &pps, &idr];
    h264::to_annex_b(&units)
}

/// An H.264 non-IDR access unit in Annex-B layout.
pub fn h264_frame(payload_len: usize) -> Vec<u8> {
    let mut slice = vec![0x41, 0x9A];
    slice.resize(2 + payload_len, 0xCD);
    let units: Vec<&[u8]> = vec![&slice];
    h264::to_annex_b(&units)
}

/// A syntactically valid single-layer H.265 SPS NAL unit.
pub fn h265_sps(
    profile_idc: u8,
    compatibility_flags: u32,
    level_idc: u8,
    width: u64,
    height: u64,
) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.write_bits(0x42, 8); // nal type 33
    w.write_bits(0x01, 8);
    w.write_bits(0, 4); // vps id
    w.write_bits(0, 3); // max_sub_layers_minus1
    w.write_bit(true); // temporal id nesting

    w.write_bits(0, 2); // profile space
    w.write_bit(false); // tier
    w.write_bits(profile_idc as u64, 5);
    w.write_bits(compatibility_flags as u64, 32);
    w.write_bits(0xB000_0000_0000u64, 48);
    w.write_bits(level_idc as u64, 8);

    w.write_exp_golomb(0); // sps id
    w.write_exp_golomb(1); // chroma 4:2:0
    w.write_exp_golomb(width);
    w.write_exp_golomb(height);
    w.write_bit(false); // no conformance window
    w.write_exp_golomb(0); // bit_depth_luma_minus8
    w.write_exp_golomb(0); // bit_depth_chroma_minus8
    w.write_bit(true);
    w.write_bits(0, 16);
    w.finish()
}

/// An H.265 keyframe access unit in Annex-B layout: VPS + SPS + PPS + IDR.
pub fn h265_keyframe(sps: &[u8], payload_len: usize) -> Vec<u8> {
    let vps = [0x40, 0x01, 0x0C, 0x01];
    let pps = [0x44, 0x01, 0xC1, 0x72];
    let mut idr = vec![0x26, 0x01]; // IDR_W_RADL
    idr.resize(2 + payload_len, 0xAB);
    let units: Vec<&[u8]> = vec![&vps, sps, &pps, &idr];
    h264::to_annex_b(&units)
}

/// An H.265 trailing-picture access unit in Annex-B layout.
pub fn h265_frame(payload_len: usize) -> Vec<u8> {
    let mut slice = vec![0x02, 0x01]; // TRAIL_R
    slice.resize(2 + payload_len, 0xCD);
    let units: Vec<&[u8]> = vec![&slice];
    h264::to_annex_b(&units)
}

/// A raw AAC frame payload.
pub fn aac_frame(len: usize) -> Vec<u8> {
    vec![0x5A; len]
}
