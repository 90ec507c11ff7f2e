use thiserror::Error;

use crate::storage::StorageError;

/// Errors surfaced by the writer.
///
/// Configuration and structural errors come out of construction and
/// `add_variant`/`add_rendition`; track errors out of `add_*`; storage
/// errors propagate verbatim and are fatal for the failing call.
/// Out-of-order timestamps and unknown track ids are programmer errors and
/// panic instead.
#[derive(Error, Debug)]
pub enum HlsWriterError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("cannot add {0} after writing has begun")]
    AlreadyMuxing(&'static str),

    #[error("a media playlist writer carries exactly one variant")]
    SingleVariantOnly,

    #[error("a media playlist writer cannot carry renditions")]
    RenditionNotAllowed,

    #[error("duplicate variant id: {0}")]
    DuplicateVariant(String),

    #[error("unknown variant id: {0}")]
    UnknownVariant(String),

    #[error("variant has no tracks")]
    NoTracks,

    #[error("duplicate track id {0} within variant")]
    DuplicateTrack(u32),

    #[error("track {track}: {reason}")]
    Track { track: u32, reason: String },

    #[error("track {0}: AAC requires audio-specific config data")]
    AacConfigMissing(u32),

    #[error("track {0}: AV1 requires an fMP4 container")]
    Av1RequiresFmp4(u32),

    #[error("muxing error: {0}")]
    Muxing(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result alias for writer operations.
pub type Result<T> = std::result::Result<T, HlsWriterError>;

impl From<ts::TsMuxError> for HlsWriterError {
    fn from(err: ts::TsMuxError) -> Self {
        HlsWriterError::Muxing(err.to_string())
    }
}

impl From<std::io::Error> for HlsWriterError {
    fn from(err: std::io::Error) -> Self {
        HlsWriterError::Muxing(err.to_string())
    }
}
