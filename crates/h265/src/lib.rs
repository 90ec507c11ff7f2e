//! A header-only H.265 (HEVC) toolkit for the HLS writer.
//!
//! Covers NAL unit classification (two-byte headers, IRAP detection),
//! Annex-B and length-prefixed layouts, the SPS profile-tier-level walk that
//! feeds `hvc1` codec strings and track dimensions, and the `hvcC` decoder
//! configuration record builder.

mod config;
mod nal;
mod sps;

pub use config::HevcDecoderConfigurationRecord;
pub use nal::{annex_b_units, aud_nal, is_annex_b, length_prefixed_units, NalUnitType};
pub use sps::{ProfileTierLevel, Sps};
