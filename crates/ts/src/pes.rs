//! PES packet assembly.
//! ISO/IEC 13818-1 - 2.4.3.6

/// PES stream id for the first video elementary stream.
pub const PES_STREAM_ID_VIDEO: u8 = 0xE0;

/// PES stream id for the first audio elementary stream.
pub const PES_STREAM_ID_AUDIO: u8 = 0xC0;

/// Encode a 33-bit timestamp for the PES header.
///
/// Layout: marker(4) ts[32:30](3) 1 ts[29:15](15) 1 ts[14:0](15) 1
pub fn encode_timestamp(ts: u64, marker: u8) -> [u8; 5] {
    [
        (marker << 4) | (((ts >> 30) & 0x07) as u8) << 1 | 0x01,
        ((ts >> 22) & 0xFF) as u8,
        ((((ts >> 15) & 0x7F) << 1) | 0x01) as u8,
        ((ts >> 7) & 0xFF) as u8,
        (((ts & 0x7F) << 1) | 0x01) as u8,
    ]
}

/// Build a complete PES packet: start code, stream id, header with PTS
/// (and DTS when it differs), then the payload.
///
/// Timestamps are 90 kHz clock values, masked to 33 bits. Video streams use
/// an unbounded packet length (0); audio carries the real length when it
/// fits 16 bits.
pub fn build_pes_packet(stream_id: u8, payload: &[u8], pts: u64, dts: u64, video: bool) -> Vec<u8> {
    let pts = pts & 0x1_FFFF_FFFF;
    let dts = dts & 0x1_FFFF_FFFF;
    let with_dts = dts != pts;
    let header_data_length: usize = if with_dts { 10 } else { 5 };

    let mut pes = Vec::with_capacity(9 + header_data_length + payload.len());
    pes.extend_from_slice(&[0x00, 0x00, 0x01, stream_id]);

    let body_len = 3 + header_data_length + payload.len();
    let packet_length = if video || body_len > 0xFFFF { 0 } else { body_len as u16 };
    pes.extend_from_slice(&packet_length.to_be_bytes());

    pes.push(0x80); // marker bits, no scrambling/priority/alignment
    pes.push(if with_dts { 0xC0 } else { 0x80 });
    pes.push(header_data_length as u8);

    if with_dts {
        pes.extend_from_slice(&encode_timestamp(pts, 0x03));
        pes.extend_from_slice(&encode_timestamp(dts, 0x01));
    } else {
        pes.extend_from_slice(&encode_timestamp(pts, 0x02));
    }

    pes.extend_from_slice(payload);
    pes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_round_trip() {
        let ts = 0x1_2345_6789u64 & 0x1_FFFF_FFFF;
        let bytes = encode_timestamp(ts, 0x02);

        let decoded = (((bytes[0] >> 1) & 0x07) as u64) << 30
            | (bytes[1] as u64) << 22
            | (((bytes[2] >> 1) & 0x7F) as u64) << 15
            | (bytes[3] as u64) << 7
            | ((bytes[4] >> 1) & 0x7F) as u64;
        assert_eq!(decoded, ts);
        assert_eq!(bytes[0] >> 4, 0x02);
        // marker bits
        assert_eq!(bytes[0] & 1, 1);
        assert_eq!(bytes[2] & 1, 1);
        assert_eq!(bytes[4] & 1, 1);
    }

    #[test]
    fn pes_pts_only() {
        let pes = build_pes_packet(PES_STREAM_ID_AUDIO, &[1, 2, 3], 90_000, 90_000, false);
        assert_eq!(&pes[0..4], &[0x00, 0x00, 0x01, 0xC0]);
        let length = u16::from_be_bytes([pes[4], pes[5]]) as usize;
        assert_eq!(length, 3 + 5 + 3);
        assert_eq!(pes[7], 0x80); // PTS only
        assert_eq!(pes[8], 5);
        assert_eq!(pes.len(), 9 + 5 + 3);
    }

    #[test]
    fn pes_pts_and_dts_video_unbounded() {
        let pes = build_pes_packet(PES_STREAM_ID_VIDEO, &[0; 10], 93_000, 90_000, true);
        assert_eq!(pes[3], 0xE0);
        assert_eq!(&pes[4..6], &[0, 0]); // unbounded
        assert_eq!(pes[7], 0xC0); // PTS + DTS
        assert_eq!(pes[8], 10);
        assert_eq!(pes.len(), 9 + 10 + 10);
    }
}
