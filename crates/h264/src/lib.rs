//! A header-only H.264 (AVC) toolkit for the HLS writer.
//!
//! This crate deliberately stops at the layer the writer needs: splitting
//! access units into NAL units (Annex-B or length-prefixed), classifying
//! them, decoding the SPS fields that drive codec strings and track
//! dimensions, and building the `avcC` decoder configuration record that the
//! fMP4 sample entry embeds. Slice-level parsing is out of scope.

mod config;
mod nal;
mod sps;

pub use config::AvcDecoderConfigurationRecord;
pub use nal::{
    annex_b_units, aud_nal, is_annex_b, length_prefixed_units, to_annex_b, to_length_prefixed,
    NalUnitType,
};
pub use sps::Sps;
