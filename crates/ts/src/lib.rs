//! MPEG Transport Stream writer.
//!
//! Produces 188-byte TS packets for HLS segments: PSI tables (PAT and PMT)
//! at segment heads, PES-wrapped elementary stream payloads with PTS/DTS at
//! the 90 kHz clock, PCR on the program clock PID, random-access
//! signalling, adaptation-field stuffing and per-PID continuity counters.

use thiserror::Error;

mod pes;
mod psi;
mod writer;

pub use pes::{build_pes_packet, encode_timestamp, PES_STREAM_ID_AUDIO, PES_STREAM_ID_VIDEO};
pub use psi::crc32_mpeg;
pub use writer::{TsStream, TsWriter};

/// TS packet size in bytes
pub const TS_PACKET_SIZE: usize = 188;

/// Sync byte starting every packet
pub const SYNC_BYTE: u8 = 0x47;

/// PAT PID (always 0x0000)
pub const PID_PAT: u16 = 0x0000;

/// PMT PID used by this writer
pub const PID_PMT: u16 = 0x1000;

/// First elementary stream PID; also the PCR PID
pub const PID_ES_BASE: u16 = 0x0100;

/// Errors that can occur while writing TS packets
#[derive(Error, Debug)]
pub enum TsMuxError {
    #[error("Unknown PID: 0x{0:04x}")]
    UnknownPid(u16),

    #[error("Invalid PID: 0x{0:04x}")]
    InvalidPid(u16),

    #[error("PES payload is empty")]
    EmptyPayload,
}

/// Result type for TS writing operations
pub type Result<T> = std::result::Result<T, TsMuxError>;

/// Elementary stream types carried in the PMT
/// ISO/IEC 13818-1 (Table 2-29)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    /// H.264 / AVC video (0x1B)
    H264,
    /// H.265 / HEVC video (0x24)
    H265,
    /// ADTS AAC audio (0x0F)
    AdtsAac,
}

impl StreamType {
    /// The `stream_type` code written into the PMT.
    pub const fn code(&self) -> u8 {
        match self {
            StreamType::H264 => 0x1B,
            StreamType::H265 => 0x24,
            StreamType::AdtsAac => 0x0F,
        }
    }

    /// Whether this stream type carries video.
    pub const fn is_video(&self) -> bool {
        matches!(self, StreamType::H264 | StreamType::H265)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_type_codes() {
        assert_eq!(StreamType::H264.code(), 0x1B);
        assert_eq!(StreamType::H265.code(), 0x24);
        assert_eq!(StreamType::AdtsAac.code(), 0x0F);
        assert!(StreamType::H264.is_video());
        assert!(!StreamType::AdtsAac.is_video());
    }
}
