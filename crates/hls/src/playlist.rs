use std::collections::VecDeque;

use chrono::TimeZone;

use crate::config::ServerControl;

/// A partial segment entry.
#[derive(Debug, Clone)]
pub struct Part {
    /// Resource URI as returned by storage.
    pub uri: String,
    /// Duration in seconds.
    pub duration: f64,
    /// Carries `INDEPENDENT=YES` (starts with a sync sample).
    pub independent: bool,
}

/// A media segment entry.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Monotonically increasing index across the variant's lifetime.
    pub index: u64,
    /// Resource URI as returned by storage.
    pub uri: String,
    /// Payload size in bytes.
    pub size: u64,
    /// Duration in seconds.
    pub duration: f64,
    /// Wall-clock time of the first sample, Unix milliseconds.
    pub wallclock_ms: Option<i64>,
    /// Init header this segment introduces (`#EXT-X-MAP`).
    pub media_init: Option<String>,
    /// Preceded by `#EXT-X-DISCONTINUITY`.
    pub discontinuity: bool,
    /// Partial segments, oldest first. Pruned for old segments.
    pub parts: Vec<Part>,
}

/// Result of appending a segment to the window.
#[derive(Debug, Default)]
pub(crate) struct Appended {
    /// Segment evicted from the window; its storage must be deleted.
    pub evicted: Option<Segment>,
    /// Parts dropped under the low-latency retention rule.
    pub pruned_parts: Vec<Part>,
}

/// Inputs the playlist needs from the writer to render itself.
#[derive(Debug, Default, Clone)]
pub(crate) struct PlaylistContext {
    pub version: u8,
    pub vod: bool,
    pub ended: bool,
    pub low_latency: bool,
    pub server_control: ServerControl,
    /// `(uri, last_msn, last_part)` of every sibling variant.
    pub rendition_reports: Vec<(String, u64, u64)>,
    /// URI of the next expected part.
    pub preload_hint: Option<String>,
}

/// Sliding window of segments and parts for one variant.
#[derive(Debug)]
pub struct Playlist {
    segments: VecDeque<Segment>,
    /// Open segment accumulating parts (low latency).
    pending: Option<Segment>,
    media_sequence: u64,
    discontinuity_sequence: u64,
    /// `ceil(max segment duration)` in seconds.
    target_duration: u64,
    /// Max part duration in seconds.
    part_target_duration: f64,
    /// Init header the next appended segment inherits.
    pending_init: Option<String>,
    /// The next appended segment carries a discontinuity tag.
    pending_discontinuity: bool,
    /// 0 disables eviction.
    max_segments: usize,
}

impl Playlist {
    pub(crate) fn new(max_segments: usize) -> Self {
        Self {
            segments: VecDeque::new(),
            pending: None,
            media_sequence: 0,
            discontinuity_sequence: 0,
            target_duration: 0,
            part_target_duration: 0.0,
            pending_init: None,
            pending_discontinuity: false,
            max_segments,
        }
    }

    /// The media sequence number (index of the oldest segment).
    pub fn media_sequence(&self) -> u64 {
        self.media_sequence
    }

    /// Count of discontinuity tags that scrolled out of the window.
    pub fn discontinuity_sequence(&self) -> u64 {
        self.discontinuity_sequence
    }

    /// Advertised target duration in seconds.
    pub fn target_duration(&self) -> u64 {
        self.target_duration
    }

    /// Segments currently in the window.
    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }

    /// The next appended segment references this init header.
    pub(crate) fn add_init_header(&mut self, uri: String) {
        self.pending_init = Some(uri);
    }

    /// Mark the next appended segment with a discontinuity tag.
    pub(crate) fn add_discontinuity(&mut self) {
        self.pending_discontinuity = true;
    }

    /// Whether a discontinuity is waiting to be attached.
    pub(crate) fn discontinuity_pending(&self) -> bool {
        self.pending_discontinuity
    }

    /// Open a pending segment (if none) and append a part to it.
    pub(crate) fn add_part(&mut self, segment_index: u64, part: Part) {
        self.part_target_duration = self.part_target_duration.max(part.duration);
        let pending = self.pending.get_or_insert_with(|| Segment {
            index: segment_index,
            uri: String::new(),
            size: 0,
            duration: 0.0,
            wallclock_ms: None,
            media_init: None,
            discontinuity: false,
            parts: Vec::new(),
        });
        pending.parts.push(part);
    }

    /// Append a closed segment, evicting and pruning per the window rules.
    pub(crate) fn add_segment(&mut self, mut segment: Segment) -> Appended {
        // The pending segment materialized; keep its parts.
        if let Some(pending) = self.pending.take() {
            segment.parts = pending.parts;
        }
        if segment.media_init.is_none() {
            segment.media_init = self.pending_init.take();
        }
        segment.discontinuity |= std::mem::take(&mut self.pending_discontinuity);

        self.target_duration = self.target_duration.max(segment.duration.ceil() as u64);
        if self.segments.is_empty() {
            self.media_sequence = segment.index;
        }
        self.segments.push_back(segment);

        let mut appended = Appended::default();

        if self.max_segments != 0 && self.segments.len() > self.max_segments {
            let mut evicted = self.segments.pop_front().expect("window not empty");
            self.media_sequence += 1;
            if evicted.discontinuity {
                self.discontinuity_sequence += 1;
            }
            // The departing init reference moves to the segment now
            // becoming oldest, unless it already owns one.
            if let Some(init) = evicted.media_init.take() {
                if let Some(oldest) = self.segments.front_mut() {
                    if oldest.media_init.is_none() {
                        oldest.media_init = Some(init);
                    }
                }
            }
            appended.evicted = Some(evicted);
        }

        // Parts survive only on the last three segments.
        if self.segments.len() > 3 {
            let cutoff = self.segments.len() - 3;
            for segment in self.segments.iter_mut().take(cutoff) {
                if !segment.parts.is_empty() {
                    appended.pruned_parts.append(&mut segment.parts);
                }
            }
        }

        appended
    }

    /// `(segment index, part index)` of the newest part, for
    /// `#EXT-X-RENDITION-REPORT`.
    pub(crate) fn last_part(&self) -> Option<(u64, u64)> {
        if let Some(pending) = &self.pending {
            if !pending.parts.is_empty() {
                return Some((pending.index, pending.parts.len() as u64 - 1));
            }
        }
        self.segments
            .iter()
            .rev()
            .find(|s| !s.parts.is_empty())
            .map(|s| (s.index, s.parts.len() as u64 - 1))
    }

    /// `(average, peak)` bits per second across the window.
    pub(crate) fn bandwidth(&self) -> (u64, u64) {
        let mut total_bytes = 0u64;
        let mut total_duration = 0f64;
        let mut peak = 0u64;
        for segment in &self.segments {
            total_bytes += segment.size;
            total_duration += segment.duration;
            if segment.duration > 0.0 {
                peak = peak.max((segment.size as f64 * 8.0 / segment.duration) as u64);
            }
        }
        if total_duration <= 0.0 {
            return (0, 0);
        }
        ((total_bytes as f64 * 8.0 / total_duration) as u64, peak)
    }

    fn render_parts(out: &mut String, parts: &[Part]) {
        for part in parts {
            out.push_str(&format!(
                "#EXT-X-PART:DURATION={:.5},URI=\"{}\"",
                part.duration, part.uri
            ));
            if part.independent {
                out.push_str(",INDEPENDENT=YES");
            }
            out.push('\n');
        }
    }

    fn render_wallclock(out: &mut String, wallclock_ms: i64) {
        if let Some(datetime) = chrono::Utc.timestamp_millis_opt(wallclock_ms).single() {
            out.push_str(&format!(
                "#EXT-X-PROGRAM-DATE-TIME:{}\n",
                datetime.format("%Y-%m-%dT%H:%M:%S%.3fZ")
            ));
        }
    }

    /// Render the media playlist text.
    pub(crate) fn render(&self, ctx: &PlaylistContext) -> String {
        let mut out = String::with_capacity(1024);
        out.push_str("#EXTM3U\n");
        out.push_str(&format!("#EXT-X-VERSION:{}\n", ctx.version));
        out.push_str(&format!("#EXT-X-TARGETDURATION:{}\n", self.target_duration));
        out.push_str(&format!("#EXT-X-MEDIA-SEQUENCE:{}\n", self.media_sequence));
        out.push_str(&format!(
            "#EXT-X-DISCONTINUITY-SEQUENCE:{}\n",
            self.discontinuity_sequence
        ));
        if ctx.vod {
            out.push_str("#EXT-X-PLAYLIST-TYPE:VOD\n");
        }

        if ctx.low_latency || ctx.server_control.can_block_reload {
            let mut attrs = Vec::new();
            if ctx.server_control.can_block_reload {
                attrs.push("CAN-BLOCK-RELOAD=YES".to_string());
            }
            if ctx.low_latency {
                attrs.push(format!("PART-HOLD-BACK={:.3}", self.part_target_duration * 3.0));
            }
            out.push_str(&format!("#EXT-X-SERVER-CONTROL:{}\n", attrs.join(",")));
        }
        if ctx.low_latency && self.part_target_duration > 0.0 {
            out.push_str(&format!(
                "#EXT-X-PART-INF:PART-TARGET={:.3}\n",
                self.part_target_duration
            ));
        }

        for segment in &self.segments {
            if segment.discontinuity {
                out.push_str("#EXT-X-DISCONTINUITY\n");
            }
            if let Some(init) = &segment.media_init {
                out.push_str(&format!("#EXT-X-MAP:URI=\"{init}\"\n"));
            }
            if let Some(wallclock_ms) = segment.wallclock_ms {
                Self::render_wallclock(&mut out, wallclock_ms);
            }
            Self::render_parts(&mut out, &segment.parts);
            out.push_str(&format!("#EXTINF:{:.5},\n{}\n", segment.duration, segment.uri));
        }

        if let Some(pending) = &self.pending {
            if let Some(init) = &self.pending_init {
                out.push_str(&format!("#EXT-X-MAP:URI=\"{init}\"\n"));
            }
            Self::render_parts(&mut out, &pending.parts);
        }

        if ctx.low_latency && !ctx.ended {
            if let Some(hint) = &ctx.preload_hint {
                out.push_str(&format!("#EXT-X-PRELOAD-HINT:TYPE=PART,URI=\"{hint}\"\n"));
            }
            for (uri, last_msn, last_part) in &ctx.rendition_reports {
                out.push_str(&format!(
                    "#EXT-X-RENDITION-REPORT:URI=\"{uri}\",LAST-MSN={last_msn},LAST-PART={last_part}\n"
                ));
            }
        }

        if ctx.ended {
            out.push_str("#EXT-X-ENDLIST\n");
        }

        out
    }
}
