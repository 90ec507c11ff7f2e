//! Init segment assembly: `ftyp` + `moov` (`mvhd`, one `trak` per track,
//! `mvex` with one `trex` per track).

use crate::boxes::{write_box, write_box_with, write_full_box_with};
use crate::{TrackCodec, TrackInit};

/// Movie timescale for the `mvhd` box; track media use their own scales.
const MOVIE_TIMESCALE: u32 = 1000;

const MATRIX_IDENTITY: [u32; 9] = [0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000];

/// Build the complete init segment.
pub fn build_init_segment(tracks: &[TrackInit]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1024);

    write_box_with(&mut buf, b"ftyp", |b| {
        b.extend_from_slice(b"iso5"); // major brand
        b.extend_from_slice(&512u32.to_be_bytes()); // minor version
        b.extend_from_slice(b"iso6");
        b.extend_from_slice(b"mp41");
    });

    write_box_with(&mut buf, b"moov", |b| {
        write_mvhd(b, tracks);
        for track in tracks {
            write_trak(b, track);
        }
        write_box_with(b, b"mvex", |b| {
            for track in tracks {
                write_full_box_with(b, b"trex", 0, 0, |b| {
                    b.extend_from_slice(&track.track_id.to_be_bytes());
                    b.extend_from_slice(&1u32.to_be_bytes()); // default_sample_description_index
                    b.extend_from_slice(&0u32.to_be_bytes()); // default_sample_duration
                    b.extend_from_slice(&0u32.to_be_bytes()); // default_sample_size
                    b.extend_from_slice(&0u32.to_be_bytes()); // default_sample_flags
                });
            }
        });
    });

    buf
}

fn write_mvhd(buf: &mut Vec<u8>, tracks: &[TrackInit]) {
    let next_track_id = tracks.iter().map(|t| t.track_id).max().unwrap_or(0) + 1;
    write_full_box_with(buf, b"mvhd", 0, 0, |b| {
        b.extend_from_slice(&0u32.to_be_bytes()); // creation_time
        b.extend_from_slice(&0u32.to_be_bytes()); // modification_time
        b.extend_from_slice(&MOVIE_TIMESCALE.to_be_bytes());
        b.extend_from_slice(&0u32.to_be_bytes()); // duration (live)
        b.extend_from_slice(&0x0001_0000u32.to_be_bytes()); // rate 1.0
        b.extend_from_slice(&0x0100u16.to_be_bytes()); // volume 1.0
        b.extend_from_slice(&[0; 10]); // reserved
        for m in MATRIX_IDENTITY {
            b.extend_from_slice(&m.to_be_bytes());
        }
        b.extend_from_slice(&[0; 24]); // pre_defined
        b.extend_from_slice(&next_track_id.to_be_bytes());
    });
}

fn write_trak(buf: &mut Vec<u8>, track: &TrackInit) {
    write_box_with(buf, b"trak", |b| {
        write_tkhd(b, track);
        write_box_with(b, b"mdia", |b| {
            write_mdhd(b, track);
            write_hdlr(b, track);
            write_box_with(b, b"minf", |b| {
                if track.codec.is_video() {
                    write_full_box_with(b, b"vmhd", 0, 1, |b| {
                        b.extend_from_slice(&[0; 8]); // graphicsmode + opcolor
                    });
                } else {
                    write_full_box_with(b, b"smhd", 0, 0, |b| {
                        b.extend_from_slice(&[0; 4]); // balance + reserved
                    });
                }
                write_dinf(b);
                write_stbl(b, track);
            });
        });
    });
}

fn write_tkhd(buf: &mut Vec<u8>, track: &TrackInit) {
    // flags: track enabled + in movie
    write_full_box_with(buf, b"tkhd", 0, 3, |b| {
        b.extend_from_slice(&0u32.to_be_bytes()); // creation_time
        b.extend_from_slice(&0u32.to_be_bytes()); // modification_time
        b.extend_from_slice(&track.track_id.to_be_bytes());
        b.extend_from_slice(&0u32.to_be_bytes()); // reserved
        b.extend_from_slice(&0u32.to_be_bytes()); // duration
        b.extend_from_slice(&[0; 8]); // reserved
        b.extend_from_slice(&0i16.to_be_bytes()); // layer
        b.extend_from_slice(&0i16.to_be_bytes()); // alternate_group
        let volume: u16 = if track.codec.is_video() { 0 } else { 0x0100 };
        b.extend_from_slice(&volume.to_be_bytes());
        b.extend_from_slice(&0u16.to_be_bytes()); // reserved
        for m in MATRIX_IDENTITY {
            b.extend_from_slice(&m.to_be_bytes());
        }
        b.extend_from_slice(&(track.width << 16).to_be_bytes());
        b.extend_from_slice(&(track.height << 16).to_be_bytes());
    });
}

fn write_mdhd(buf: &mut Vec<u8>, track: &TrackInit) {
    write_full_box_with(buf, b"mdhd", 0, 0, |b| {
        b.extend_from_slice(&0u32.to_be_bytes()); // creation_time
        b.extend_from_slice(&0u32.to_be_bytes()); // modification_time
        b.extend_from_slice(&track.timescale.to_be_bytes());
        b.extend_from_slice(&0u32.to_be_bytes()); // duration
        b.extend_from_slice(&0x55C4u16.to_be_bytes()); // language "und"
        b.extend_from_slice(&0u16.to_be_bytes()); // pre_defined
    });
}

fn write_hdlr(buf: &mut Vec<u8>, track: &TrackInit) {
    write_full_box_with(buf, b"hdlr", 0, 0, |b| {
        b.extend_from_slice(&0u32.to_be_bytes()); // pre_defined
        if track.codec.is_video() {
            b.extend_from_slice(b"vide");
        } else {
            b.extend_from_slice(b"soun");
        }
        b.extend_from_slice(&[0; 12]); // reserved
        if track.codec.is_video() {
            b.extend_from_slice(b"VideoHandler\0");
        } else {
            b.extend_from_slice(b"SoundHandler\0");
        }
    });
}

fn write_dinf(buf: &mut Vec<u8>) {
    write_box_with(buf, b"dinf", |b| {
        write_full_box_with(b, b"dref", 0, 0, |b| {
            b.extend_from_slice(&1u32.to_be_bytes()); // entry_count
            // self-contained url entry
            write_full_box_with(b, b"url ", 0, 1, |_| {});
        });
    });
}

fn write_stbl(buf: &mut Vec<u8>, track: &TrackInit) {
    write_box_with(buf, b"stbl", |b| {
        write_full_box_with(b, b"stsd", 0, 0, |b| {
            b.extend_from_slice(&1u32.to_be_bytes()); // entry_count
            write_sample_entry(b, track);
        });
        for empty in [b"stts", b"stsc", b"stco"] {
            write_full_box_with(b, empty, 0, 0, |b| {
                b.extend_from_slice(&0u32.to_be_bytes()); // entry/chunk count
            });
        }
        write_full_box_with(b, b"stsz", 0, 0, |b| {
            b.extend_from_slice(&0u32.to_be_bytes()); // sample_size
            b.extend_from_slice(&0u32.to_be_bytes()); // sample_count
        });
    });
}

fn write_sample_entry(buf: &mut Vec<u8>, track: &TrackInit) {
    match &track.codec {
        TrackCodec::Avc(record) => {
            write_visual_entry(buf, b"avc1", track, |b| {
                write_box_with(b, b"avcC", |b| {
                    let mut content = Vec::with_capacity(record.size());
                    record.build(&mut content).expect("avcC build is infallible on Vec");
                    b.extend_from_slice(&content);
                });
            });
        }
        TrackCodec::Hevc(record) => {
            write_visual_entry(buf, b"hvc1", track, |b| {
                write_box_with(b, b"hvcC", |b| {
                    let mut content = Vec::with_capacity(record.size());
                    record.build(&mut content).expect("hvcC build is infallible on Vec");
                    b.extend_from_slice(&content);
                });
            });
        }
        TrackCodec::Av1(record) => {
            write_visual_entry(buf, b"av01", track, |b| {
                write_box_with(b, b"av1C", |b| {
                    let mut content = Vec::with_capacity(record.size());
                    record.build(&mut content);
                    b.extend_from_slice(&content);
                });
            });
        }
        TrackCodec::Aac(config) => {
            write_box_with(buf, b"mp4a", |b| {
                b.extend_from_slice(&[0; 6]); // reserved
                b.extend_from_slice(&1u16.to_be_bytes()); // data_reference_index
                b.extend_from_slice(&[0; 8]); // version/revision/vendor
                b.extend_from_slice(&(config.channel_configuration as u16).to_be_bytes());
                b.extend_from_slice(&16u16.to_be_bytes()); // samplesize
                b.extend_from_slice(&[0; 4]); // pre_defined + reserved
                b.extend_from_slice(&(config.sampling_frequency << 16).to_be_bytes());
                write_esds(b, config);
            });
        }
    }
}

fn write_visual_entry(
    buf: &mut Vec<u8>,
    entry_type: &[u8; 4],
    track: &TrackInit,
    write_config: impl FnOnce(&mut Vec<u8>),
) {
    write_box_with(buf, entry_type, |b| {
        b.extend_from_slice(&[0; 6]); // reserved
        b.extend_from_slice(&1u16.to_be_bytes()); // data_reference_index
        b.extend_from_slice(&[0; 16]); // pre_defined + reserved
        b.extend_from_slice(&(track.width as u16).to_be_bytes());
        b.extend_from_slice(&(track.height as u16).to_be_bytes());
        b.extend_from_slice(&0x0048_0000u32.to_be_bytes()); // horizresolution 72dpi
        b.extend_from_slice(&0x0048_0000u32.to_be_bytes()); // vertresolution
        b.extend_from_slice(&0u32.to_be_bytes()); // reserved
        b.extend_from_slice(&1u16.to_be_bytes()); // frame_count
        b.extend_from_slice(&[0; 32]); // compressorname
        b.extend_from_slice(&0x0018u16.to_be_bytes()); // depth 24
        b.extend_from_slice(&(-1i16).to_be_bytes()); // pre_defined
        write_config(b);
    });
}

fn write_esds(buf: &mut Vec<u8>, config: &aac::AudioSpecificConfig) {
    let asc = config.build().expect("configs stored in tracks use table frequencies");

    write_full_box_with(buf, b"esds", 0, 0, |b| {
        // DecoderSpecificInfo (tag 0x05)
        let dsi_len = asc.len();
        // DecoderConfigDescriptor (tag 0x04)
        let dcd_len = 13 + 2 + dsi_len;
        // ES_Descriptor (tag 0x03)
        let esd_len = 3 + 2 + dcd_len + 3;

        b.push(0x03);
        b.push(esd_len as u8);
        b.extend_from_slice(&0u16.to_be_bytes()); // ES_ID
        b.push(0); // flags

        b.push(0x04);
        b.push(dcd_len as u8);
        b.push(0x40); // objectTypeIndication: MPEG-4 audio
        b.push(0x15); // streamType audio, upstream 0, reserved 1
        b.extend_from_slice(&[0, 0, 0]); // bufferSizeDB
        b.extend_from_slice(&0u32.to_be_bytes()); // maxBitrate
        b.extend_from_slice(&0u32.to_be_bytes()); // avgBitrate

        b.push(0x05);
        b.push(dsi_len as u8);
        b.extend_from_slice(&asc);

        // SLConfigDescriptor (tag 0x06), predefined MP4
        b.push(0x06);
        b.push(0x01);
        b.push(0x02);
    });
}

#[cfg(test)]
mod tests {
    use aac::{AudioObjectType, AudioSpecificConfig};
    use bytes::Bytes;

    use super::*;
    use crate::boxes::{find_box, iter_boxes};

    fn avc_track() -> TrackInit {
        TrackInit {
            track_id: 1,
            timescale: 90_000,
            width: 1280,
            height: 720,
            codec: TrackCodec::Avc(h264::AvcDecoderConfigurationRecord {
                profile_indication: 100,
                profile_compatibility: 0,
                level_indication: 31,
                sps: vec![Bytes::from_static(&[0x67, 0x64, 0x00, 0x1F])],
                pps: vec![Bytes::from_static(&[0x68, 0xEB])],
            }),
        }
    }

    fn aac_track() -> TrackInit {
        TrackInit {
            track_id: 2,
            timescale: 48_000,
            width: 0,
            height: 0,
            codec: TrackCodec::Aac(AudioSpecificConfig {
                audio_object_type: AudioObjectType::AacLowComplexity,
                sampling_frequency: 48_000,
                channel_configuration: 2,
            }),
        }
    }

    #[test]
    fn init_segment_brands() {
        let init = build_init_segment(&[avc_track()]);
        let ftyp = find_box(&init, b"ftyp").unwrap();
        let content = &init[ftyp.offset + 8..ftyp.offset + ftyp.size];
        assert_eq!(&content[0..4], b"iso5");
        assert_eq!(&content[4..8], &512u32.to_be_bytes());
        assert_eq!(&content[8..12], b"iso6");
        assert_eq!(&content[12..16], b"mp41");
    }

    #[test]
    fn init_segment_has_moov_with_traks() {
        let init = build_init_segment(&[avc_track(), aac_track()]);
        let top: Vec<[u8; 4]> = iter_boxes(&init).iter().map(|b| b.box_type).collect();
        assert_eq!(top, vec![*b"ftyp", *b"moov"]);

        let moov = find_box(&init, b"moov").unwrap();
        let inner = &init[moov.offset + 8..moov.offset + moov.size];
        let kinds: Vec<[u8; 4]> = iter_boxes(inner).iter().map(|b| b.box_type).collect();
        assert_eq!(kinds, vec![*b"mvhd", *b"trak", *b"trak", *b"mvex"]);
    }

    #[test]
    fn mvex_has_trex_per_track() {
        let init = build_init_segment(&[avc_track(), aac_track()]);
        let moov = find_box(&init, b"moov").unwrap();
        let inner = &init[moov.offset + 8..moov.offset + moov.size];
        let mvex = find_box(inner, b"mvex").unwrap();
        let mvex_inner = &inner[mvex.offset + 8..mvex.offset + mvex.size];
        let trex_count = iter_boxes(mvex_inner)
            .iter()
            .filter(|b| &b.box_type == b"trex")
            .count();
        assert_eq!(trex_count, 2);
    }

    #[test]
    fn aac_entry_carries_esds() {
        let init = build_init_segment(&[aac_track()]);
        // The esds tag bytes appear inside the stsd entry.
        let needle = [0x05, 0x02, 0x11, 0x90]; // DSI tag + len + ASC for 48kHz stereo LC
        assert!(init.windows(needle.len()).any(|w| w == needle));
    }
}
