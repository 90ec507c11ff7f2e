//! Media fragment assembly: `styp`, per-track `sidx`, `moof` and `mdat`.

use crate::boxes::{write_box_with, write_full_box_with};

/// Sample flags for a sync sample: `sample_depends_on` = 2.
const FLAGS_SYNC: u32 = 0x0200_0000;
/// Sample flags for a non-sync sample: depends on others, non-sync bit set.
const FLAGS_NON_SYNC: u32 = 0x0101_0000;

/// Per-sample metadata inside a fragment.
#[derive(Debug, Clone, Copy)]
pub struct FragmentSample {
    /// Duration in track timescale ticks.
    pub duration: u32,
    /// Payload size in bytes.
    pub size: u32,
    /// Sync (random access) sample.
    pub is_sync: bool,
    /// Composition time offset (pts - dts) in track ticks.
    pub cts_offset: i32,
}

/// One track's share of a fragment.
#[derive(Debug, Clone)]
pub struct TrackFragment {
    /// The track id from the init segment.
    pub track_id: u32,
    /// Track timescale (for the `sidx` box).
    pub timescale: u32,
    /// Sum of all sample durations muxed before this fragment, in track
    /// ticks. Becomes `tfdt.base_media_decode_time`.
    pub base_decode_time: u64,
    /// Per-sample table, in decode order.
    pub samples: Vec<FragmentSample>,
    /// Concatenated sample payloads, matching `samples` order.
    pub data: Vec<u8>,
}

impl TrackFragment {
    fn duration_ticks(&self) -> u64 {
        self.samples.iter().map(|s| s.duration as u64).sum()
    }
}

/// Build the `styp` box that leads a media segment.
pub fn build_styp() -> Vec<u8> {
    let mut buf = Vec::with_capacity(24);
    write_box_with(&mut buf, b"styp", |b| {
        b.extend_from_slice(b"msdh"); // major brand
        b.extend_from_slice(&0u32.to_be_bytes()); // minor version
        b.extend_from_slice(b"msdh");
        b.extend_from_slice(b"msix");
    });
    buf
}

/// Build a `moof` + `mdat` pair for the given tracks.
///
/// Sample data lands in the `mdat` in track order, each track's samples
/// back to back; `trun` data offsets are measured from the first byte of
/// the `moof` box as signalled by `default-base-is-moof`.
pub fn build_fragment(sequence_number: u32, tracks: &[TrackFragment]) -> Vec<u8> {
    let mut buf = Vec::new();
    let moof_start = buf.len();
    let mut offset_positions = Vec::with_capacity(tracks.len());

    write_box_with(&mut buf, b"moof", |b| {
        write_full_box_with(b, b"mfhd", 0, 0, |b| {
            b.extend_from_slice(&sequence_number.to_be_bytes());
        });

        for track in tracks {
            write_box_with(b, b"traf", |b| {
                // tfhd: default-base-is-moof
                write_full_box_with(b, b"tfhd", 0, 0x02_0000, |b| {
                    b.extend_from_slice(&track.track_id.to_be_bytes());
                });
                write_full_box_with(b, b"tfdt", 1, 0, |b| {
                    b.extend_from_slice(&track.base_decode_time.to_be_bytes());
                });
                // trun: data-offset, duration, size, flags, cts offsets
                write_full_box_with(b, b"trun", 1, 0x000F01, |b| {
                    b.extend_from_slice(&(track.samples.len() as u32).to_be_bytes());
                    offset_positions.push(b.len());
                    b.extend_from_slice(&0i32.to_be_bytes()); // patched below
                    for sample in &track.samples {
                        b.extend_from_slice(&sample.duration.to_be_bytes());
                        b.extend_from_slice(&sample.size.to_be_bytes());
                        let flags = if sample.is_sync { FLAGS_SYNC } else { FLAGS_NON_SYNC };
                        b.extend_from_slice(&flags.to_be_bytes());
                        b.extend_from_slice(&sample.cts_offset.to_be_bytes());
                    }
                });
            });
        }
    });

    // Patch each trun's data offset now that the moof size is known. The
    // first track's data begins 8 bytes into the mdat.
    let moof_size = buf.len() - moof_start;
    let mut data_offset = moof_size as i32 + 8;
    for (position, track) in offset_positions.into_iter().zip(tracks) {
        buf[position..position + 4].copy_from_slice(&data_offset.to_be_bytes());
        data_offset += track.data.len() as i32;
    }

    write_box_with(&mut buf, b"mdat", |b| {
        for track in tracks {
            b.extend_from_slice(&track.data);
        }
    });

    buf
}

/// Build a complete media segment: `styp`, one `sidx` per track, then the
/// `moof`/`mdat` fragment.
pub fn build_segment(sequence_number: u32, tracks: &[TrackFragment]) -> Vec<u8> {
    let fragment = build_fragment(sequence_number, tracks);

    let mut buf = build_styp();

    // Each sidx points past the remaining sidx boxes to the moof.
    const SIDX_SIZE: usize = 12 + 4 + 4 + 8 + 8 + 2 + 2 + 12;
    for (index, track) in tracks.iter().enumerate() {
        let first_offset = (tracks.len() - index - 1) * SIDX_SIZE;
        let starts_with_sap = track.samples.first().is_some_and(|s| s.is_sync);
        write_full_box_with(&mut buf, b"sidx", 1, 0, |b| {
            b.extend_from_slice(&track.track_id.to_be_bytes()); // reference_ID
            b.extend_from_slice(&track.timescale.to_be_bytes());
            b.extend_from_slice(&track.base_decode_time.to_be_bytes()); // earliest_presentation_time
            b.extend_from_slice(&(first_offset as u64).to_be_bytes());
            b.extend_from_slice(&0u16.to_be_bytes()); // reserved
            b.extend_from_slice(&1u16.to_be_bytes()); // reference_count
            // reference_type 0 + referenced_size
            b.extend_from_slice(&(fragment.len() as u32 & 0x7FFF_FFFF).to_be_bytes());
            b.extend_from_slice(&(track.duration_ticks() as u32).to_be_bytes());
            let sap = if starts_with_sap { 0x9000_0000u32 } else { 0 };
            b.extend_from_slice(&sap.to_be_bytes());
        });
    }

    buf.extend_from_slice(&fragment);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boxes::{find_box, iter_boxes};

    fn video_fragment(base: u64) -> TrackFragment {
        TrackFragment {
            track_id: 1,
            timescale: 90_000,
            base_decode_time: base,
            samples: vec![
                FragmentSample { duration: 3000, size: 5, is_sync: true, cts_offset: 0 },
                FragmentSample { duration: 3000, size: 3, is_sync: false, cts_offset: 3000 },
            ],
            data: vec![1, 2, 3, 4, 5, 6, 7, 8],
        }
    }

    fn audio_fragment() -> TrackFragment {
        TrackFragment {
            track_id: 2,
            timescale: 48_000,
            base_decode_time: 0,
            samples: vec![FragmentSample { duration: 1024, size: 4, is_sync: true, cts_offset: 0 }],
            data: vec![9, 9, 9, 9],
        }
    }

    #[test]
    fn fragment_structure() {
        let out = build_fragment(1, &[video_fragment(0), audio_fragment()]);
        let kinds: Vec<[u8; 4]> = iter_boxes(&out).iter().map(|b| b.box_type).collect();
        assert_eq!(kinds, vec![*b"moof", *b"mdat"]);

        let mdat = find_box(&out, b"mdat").unwrap();
        assert_eq!(mdat.size, 8 + 8 + 4);
        assert_eq!(&out[mdat.offset + 8..], &[1, 2, 3, 4, 5, 6, 7, 8, 9, 9, 9, 9]);
    }

    #[test]
    fn trun_sizes_sum_to_mdat_payload() {
        let tracks = [video_fragment(0), audio_fragment()];
        let out = build_fragment(7, &tracks);
        let mdat = find_box(&out, b"mdat").unwrap();
        let total: u32 = tracks
            .iter()
            .flat_map(|t| t.samples.iter())
            .map(|s| s.size)
            .sum();
        assert_eq!(total as usize, mdat.size - 8);
    }

    #[test]
    fn first_trun_offset_is_moof_size_plus_eight() {
        let tracks = [video_fragment(0)];
        let out = build_fragment(1, &tracks);
        let moof = find_box(&out, b"moof").unwrap();

        // Walk: moof -> traf -> trun, then read the data offset field.
        let moof_inner = &out[moof.offset + 8..moof.offset + moof.size];
        let traf = find_box(moof_inner, b"traf").unwrap();
        let traf_inner = &moof_inner[traf.offset + 8..traf.offset + traf.size];
        let trun = find_box(traf_inner, b"trun").unwrap();
        let trun_body = &traf_inner[trun.offset + 12..];
        let data_offset = i32::from_be_bytes([trun_body[4], trun_body[5], trun_body[6], trun_body[7]]);
        assert_eq!(data_offset as usize, moof.size + 8);
    }

    #[test]
    fn mfhd_sequence_number() {
        let out = build_fragment(42, &[audio_fragment()]);
        let moof = find_box(&out, b"moof").unwrap();
        let moof_inner = &out[moof.offset + 8..moof.offset + moof.size];
        let mfhd = find_box(moof_inner, b"mfhd").unwrap();
        let seq = u32::from_be_bytes(
            moof_inner[mfhd.offset + 12..mfhd.offset + 16].try_into().unwrap(),
        );
        assert_eq!(seq, 42);
    }

    #[test]
    fn tfdt_carries_base_decode_time() {
        let out = build_fragment(1, &[video_fragment(123_456)]);
        let moof = find_box(&out, b"moof").unwrap();
        let moof_inner = &out[moof.offset + 8..moof.offset + moof.size];
        let traf = find_box(moof_inner, b"traf").unwrap();
        let traf_inner = &moof_inner[traf.offset + 8..traf.offset + traf.size];
        let tfdt = find_box(traf_inner, b"tfdt").unwrap();
        let base = u64::from_be_bytes(
            traf_inner[tfdt.offset + 12..tfdt.offset + 20].try_into().unwrap(),
        );
        assert_eq!(base, 123_456);
    }

    #[test]
    fn segment_leads_with_styp_and_sidx_per_track() {
        let out = build_segment(1, &[video_fragment(0), audio_fragment()]);
        let kinds: Vec<[u8; 4]> = iter_boxes(&out).iter().map(|b| b.box_type).collect();
        assert_eq!(kinds, vec![*b"styp", *b"sidx", *b"sidx", *b"moof", *b"mdat"]);

        // The first sidx skips the second one to reach the moof.
        let boxes = iter_boxes(&out);
        let sidx0 = boxes[1];
        let body = &out[sidx0.offset + 12..];
        let first_offset = u64::from_be_bytes(body[16..24].try_into().unwrap());
        assert_eq!(first_offset as usize, boxes[2].size);
        assert_eq!(sidx0.size, boxes[2].size);
    }
}
