//! Multivariant (master) playlist aggregation.

use crate::config::SegmentType;
use crate::variant::{Variant, VariantRole};

/// Collect the codec strings a variant advertises: its own tracks plus the
/// renditions of any group it references, deduplicated in order.
fn codec_union(variant: &Variant, variants: &[Variant]) -> Vec<String> {
    let mut codecs = variant.codec_strings();
    for group in [&variant.attrs.audio, &variant.attrs.subtitles].into_iter().flatten() {
        for other in variants {
            if other.role == VariantRole::Rendition
                && other.attrs.group_id.as_deref() == Some(group.as_str())
            {
                codecs.extend(other.codec_strings());
            }
        }
    }
    let mut unique = Vec::with_capacity(codecs.len());
    for codec in codecs {
        if !unique.contains(&codec) {
            unique.push(codec);
        }
    }
    unique
}

/// Bandwidth of a variant including a referenced audio group: own peak plus
/// the group's highest peak (and the same for averages).
fn aggregate_bandwidth(variant: &Variant, variants: &[Variant]) -> (u64, u64) {
    let (mut avg, mut peak) = variant.playlist.bandwidth();
    if let Some(group) = &variant.attrs.audio {
        let mut group_avg = 0;
        let mut group_peak = 0;
        for other in variants {
            if other.role == VariantRole::Rendition
                && other.attrs.group_id.as_deref() == Some(group.as_str())
            {
                let (a, p) = other.playlist.bandwidth();
                group_avg = group_avg.max(a);
                group_peak = group_peak.max(p);
            }
        }
        avg += group_avg;
        peak += group_peak;
    }
    (avg, peak)
}

/// Render the multivariant playlist.
pub(crate) fn render(variants: &[Variant], segment_type: SegmentType) -> String {
    let mut out = String::with_capacity(512);
    out.push_str("#EXTM3U\n");
    out.push_str(&format!("#EXT-X-VERSION:{}\n", segment_type.playlist_version()));
    out.push_str("#EXT-X-INDEPENDENT-SEGMENTS\n");

    for rendition in variants.iter().filter(|v| v.role == VariantRole::Rendition) {
        let Some(uri) = &rendition.playlist_uri else { continue };
        let group = rendition.attrs.group_id.as_deref().unwrap_or("default");
        let name = rendition.attrs.name.as_deref().unwrap_or(&rendition.id);
        out.push_str(&format!("#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"{group}\",NAME=\"{name}\""));
        if let Some(language) = &rendition.attrs.language {
            out.push_str(&format!(",LANGUAGE=\"{language}\""));
        }
        out.push_str(if rendition.attrs.default { ",DEFAULT=YES" } else { ",DEFAULT=NO" });
        if rendition.attrs.auto_select {
            out.push_str(",AUTOSELECT=YES");
        }
        out.push_str(&format!(",URI=\"{uri}\"\n"));
    }

    for variant in variants.iter().filter(|v| v.role == VariantRole::Variant) {
        let Some(uri) = &variant.playlist_uri else { continue };
        let (avg, peak) = aggregate_bandwidth(variant, variants);
        out.push_str(&format!("#EXT-X-STREAM-INF:BANDWIDTH={peak},AVERAGE-BANDWIDTH={avg}"));

        let codecs = codec_union(variant, variants);
        if !codecs.is_empty() {
            out.push_str(&format!(",CODECS=\"{}\"", codecs.join(",")));
        }
        if let Some((width, height)) = variant.resolution() {
            out.push_str(&format!(",RESOLUTION={width}x{height}"));
        }
        if let Some(audio) = &variant.attrs.audio {
            out.push_str(&format!(",AUDIO=\"{audio}\""));
        }
        if let Some(subtitles) = &variant.attrs.subtitles {
            out.push_str(&format!(",SUBTITLES=\"{subtitles}\""));
        }
        out.push_str(&format!("\n{uri}\n"));
    }

    out
}
