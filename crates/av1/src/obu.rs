use std::io;

/// OBU types.
/// AV1 spec 6.2.2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObuType {
    /// Sequence header (type 1)
    SequenceHeader,
    /// Temporal delimiter (type 2)
    TemporalDelimiter,
    /// Frame header (type 3)
    FrameHeader,
    /// Tile group (type 4)
    TileGroup,
    /// Metadata (type 5)
    Metadata,
    /// Frame (type 6)
    Frame,
    /// Padding (type 15)
    Padding,
    /// Everything else
    Other(u8),
}

impl ObuType {
    /// Classify an OBU from its header byte.
    pub const fn from_header(header: u8) -> Self {
        match (header >> 3) & 0x0F {
            1 => ObuType::SequenceHeader,
            2 => ObuType::TemporalDelimiter,
            3 => ObuType::FrameHeader,
            4 => ObuType::TileGroup,
            5 => ObuType::Metadata,
            6 => ObuType::Frame,
            15 => ObuType::Padding,
            other => ObuType::Other(other),
        }
    }
}

/// One OBU sliced out of a temporal unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Obu<'a> {
    /// The classified type.
    pub obu_type: ObuType,
    /// The complete OBU bytes: header, optional extension, size field,
    /// payload.
    pub raw: &'a [u8],
    /// The payload bytes only.
    pub payload: &'a [u8],
}

/// Read an unsigned leb128 value. Returns the value and the bytes consumed.
fn read_leb128(data: &[u8]) -> io::Result<(u64, usize)> {
    let mut value = 0u64;
    for i in 0..8 {
        let byte = *data
            .get(i)
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "truncated leb128"))?;
        value |= ((byte & 0x7F) as u64) << (i * 7);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(io::Error::new(io::ErrorKind::InvalidData, "leb128 too long"))
}

/// Split a temporal unit into OBUs. Every OBU must carry a size field
/// (`obu_has_size_field`), which is what encoders emit outside of Annex-B
/// transport.
pub fn obu_units(data: &[u8]) -> io::Result<Vec<Obu<'_>>> {
    let mut units = Vec::new();
    let mut offset = 0;

    while offset < data.len() {
        let start = offset;
        let header = data[offset];
        if header & 0x80 != 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "forbidden bit set"));
        }
        let has_extension = header & 0x04 != 0;
        let has_size = header & 0x02 != 0;
        offset += 1;
        if has_extension {
            offset += 1;
        }
        if !has_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "OBU without size field",
            ));
        }
        if offset >= data.len() {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated OBU header"));
        }

        let (size, size_len) = read_leb128(&data[offset..])?;
        offset += size_len;
        let end = offset + size as usize;
        if end > data.len() {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated OBU payload"));
        }

        units.push(Obu {
            obu_type: ObuType::from_header(header),
            raw: &data[start..end],
            payload: &data[offset..end],
        });
        offset = end;
    }

    Ok(units)
}

/// Find the sequence header OBU in a temporal unit, returning its complete
/// bytes (header + size + payload).
pub fn find_sequence_header(data: &[u8]) -> io::Result<Option<&[u8]>> {
    Ok(obu_units(data)?
        .into_iter()
        .find(|obu| obu.obu_type == ObuType::SequenceHeader)
        .map(|obu| obu.raw))
}
