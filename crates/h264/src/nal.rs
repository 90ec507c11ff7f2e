use byteorder::{BigEndian, ByteOrder};

/// The NAL unit types the writer cares about.
/// ISO/IEC-14496-10-2022 - 7.4.1 (Table 7-1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalUnitType {
    /// Coded slice of a non-IDR picture (type 1)
    NonIdrSlice,
    /// Coded slice of an IDR picture (type 5)
    IdrSlice,
    /// Supplemental enhancement information (type 6)
    Sei,
    /// Sequence parameter set (type 7)
    Sps,
    /// Picture parameter set (type 8)
    Pps,
    /// Access unit delimiter (type 9)
    AccessUnitDelimiter,
    /// Everything else
    Other(u8),
}

impl NalUnitType {
    /// Classify a NAL unit from its header byte.
    pub const fn from_header(header: u8) -> Self {
        match header & 0x1F {
            1 => NalUnitType::NonIdrSlice,
            5 => NalUnitType::IdrSlice,
            6 => NalUnitType::Sei,
            7 => NalUnitType::Sps,
            8 => NalUnitType::Pps,
            9 => NalUnitType::AccessUnitDelimiter,
            other => NalUnitType::Other(other),
        }
    }
}

/// Whether the payload begins with a 3- or 4-byte Annex-B start code.
pub fn is_annex_b(data: &[u8]) -> bool {
    data.starts_with(&[0, 0, 1]) || data.starts_with(&[0, 0, 0, 1])
}

/// Split an Annex-B access unit into NAL units, accepting both 3- and
/// 4-byte start codes. Returns the units without their start codes.
pub fn annex_b_units(data: &[u8]) -> Vec<&[u8]> {
    let mut units = Vec::new();
    let mut start = None;
    let mut i = 0;

    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 {
            let code_len = if data[i + 2] == 1 {
                Some(3)
            } else if i + 4 <= data.len() && data[i + 2] == 0 && data[i + 3] == 1 {
                Some(4)
            } else {
                None
            };
            if let Some(code_len) = code_len {
                if let Some(unit_start) = start {
                    if i > unit_start {
                        units.push(&data[unit_start..i]);
                    }
                }
                i += code_len;
                start = Some(i);
                continue;
            }
        }
        i += 1;
    }

    if let Some(unit_start) = start {
        if unit_start < data.len() {
            units.push(&data[unit_start..]);
        }
    }

    units
}

/// Split a length-prefixed (AVCC layout) access unit into NAL units.
/// Malformed lengths terminate the walk early.
pub fn length_prefixed_units(data: &[u8]) -> Vec<&[u8]> {
    let mut units = Vec::new();
    let mut offset = 0;

    while offset + 4 <= data.len() {
        let len = BigEndian::read_u32(&data[offset..offset + 4]) as usize;
        offset += 4;
        if len == 0 || offset + len > data.len() {
            break;
        }
        units.push(&data[offset..offset + len]);
        offset += len;
    }

    units
}

/// Re-emit NAL units as `[u32 big-endian length][nalu]` concatenation.
pub fn to_length_prefixed<T: AsRef<[u8]>>(units: &[T]) -> Vec<u8> {
    let total: usize = units.iter().map(|u| 4 + u.as_ref().len()).sum();
    let mut out = Vec::with_capacity(total);
    for unit in units {
        let unit = unit.as_ref();
        out.extend_from_slice(&(unit.len() as u32).to_be_bytes());
        out.extend_from_slice(unit);
    }
    out
}

/// Re-emit NAL units joined by 4-byte Annex-B start codes.
pub fn to_annex_b<T: AsRef<[u8]>>(units: &[T]) -> Vec<u8> {
    let total: usize = units.iter().map(|u| 4 + u.as_ref().len()).sum();
    let mut out = Vec::with_capacity(total);
    for unit in units {
        out.extend_from_slice(&[0, 0, 0, 1]);
        out.extend_from_slice(unit.as_ref());
    }
    out
}

/// The access unit delimiter NAL unit (`pic_type` = any slice type).
pub const fn aud_nal() -> [u8; 2] {
    [0x09, 0xF0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_mixed_start_codes() {
        let mut data = Vec::new();
        data.extend_from_slice(&[0, 0, 0, 1, 0x67, 0xAA]);
        data.extend_from_slice(&[0, 0, 1, 0x68, 0xBB]);
        data.extend_from_slice(&[0, 0, 0, 1, 0x65, 0x11, 0x22]);

        let units = annex_b_units(&data);
        assert_eq!(units.len(), 3);
        assert_eq!(units[0], &[0x67, 0xAA]);
        assert_eq!(units[1], &[0x68, 0xBB]);
        assert_eq!(units[2], &[0x65, 0x11, 0x22]);
        assert_eq!(NalUnitType::from_header(units[2][0]), NalUnitType::IdrSlice);
    }

    #[test]
    fn length_prefixed_round_trip() {
        let units: Vec<&[u8]> = vec![&[0x67, 0x01], &[0x65, 0x02, 0x03]];
        let packed = to_length_prefixed(&units);
        assert_eq!(packed.len(), 4 + 2 + 4 + 3);

        let split = length_prefixed_units(&packed);
        assert_eq!(split, units);
    }

    #[test]
    fn annex_b_detection() {
        assert!(is_annex_b(&[0, 0, 1, 0x67]));
        assert!(is_annex_b(&[0, 0, 0, 1, 0x67]));
        assert!(!is_annex_b(&[0, 0, 0, 2, 0x67]));
    }

    #[test]
    fn annex_b_re_emit() {
        let units: Vec<&[u8]> = vec![&[0x09, 0xF0], &[0x65, 0x02]];
        let joined = to_annex_b(&units);
        let reparsed = annex_b_units(&joined);
        assert_eq!(reparsed, units);
    }

    #[test]
    fn truncated_length_prefix_stops() {
        let data = [0, 0, 0, 9, 0x65, 0x01];
        assert!(length_prefixed_units(&data).is_empty());
    }
}
