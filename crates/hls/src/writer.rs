use std::time::{SystemTime, UNIX_EPOCH};

use rustc_hash::FxHashMap;
use tracing::{debug, info};

use crate::config::{Mode, WriterConfig, WriterType};
use crate::error::{HlsWriterError, Result};
use crate::master;
use crate::muxer::FlushedSegment;
use crate::part::{PartGroup, PartQueue};
use crate::playlist::{Part, PlaylistContext, Segment};
use crate::queue::{QueueEvent, SampleQueue};
use crate::sample::MediaSample;
use crate::storage::{DirStorage, Storage};
use crate::variant::{Variant, VariantDesc, VariantRole};

/// Lifecycle statistics of one variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Segments handed to storage.
    pub segments_written: u64,
    /// Partial segments handed to storage.
    pub parts_written: u64,
    /// Media payload bytes handed to storage.
    pub bytes_written: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Init,
    Muxing,
    Closed,
}

/// The wall-clock anchor: frozen at the first sample across all variants.
#[derive(Debug, Clone, Copy)]
struct Anchor {
    base_ms: i64,
    base_dts: i64,
    timescale: u32,
}

fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

/// Callback fired when a segment becomes visible in a playlist.
pub type SegmentCallback = Box<dyn FnMut(&str, &Segment)>;
/// Callback fired when a part becomes visible in a playlist.
pub type PartCallback = Box<dyn FnMut(&str, &Part)>;

/// The HLS writer: a single-threaded, strictly ordered state transformer.
///
/// Feed it variants, then samples; playlists and segment payloads reach the
/// [`Storage`] collaborator synchronously before each call returns.
pub struct HlsWriter<S: Storage> {
    config: WriterConfig,
    storage: S,
    state: WriterState,
    variants: Vec<Variant>,
    index_by_id: FxHashMap<String, usize>,
    /// One sample queue per variant group.
    queues: Vec<SampleQueue>,
    /// Variant index -> queue index.
    queue_of_variant: Vec<usize>,
    /// Queue index -> member variant indexes (group leader first).
    members: Vec<Vec<usize>>,
    /// Per-variant part queues (low latency only).
    part_queues: Vec<Option<PartQueue>>,
    anchor: Option<Anchor>,
    on_segment_created: Option<SegmentCallback>,
    on_part_created: Option<PartCallback>,
}

impl HlsWriter<DirStorage> {
    /// Build a writer over directory storage rooted at
    /// `config.storage_dir`.
    pub fn create(config: WriterConfig) -> Result<Self> {
        let config = config.validate()?;
        let storage = DirStorage::new(&config.storage_dir)?;
        Self::with_storage(config, storage)
    }
}

impl<S: Storage> HlsWriter<S> {
    /// Build a writer over a caller-provided storage collaborator.
    pub fn with_storage(config: WriterConfig, storage: S) -> Result<Self> {
        let config = config.validate()?;
        Ok(Self {
            config,
            storage,
            state: WriterState::Init,
            variants: Vec::new(),
            index_by_id: FxHashMap::default(),
            queues: Vec::new(),
            queue_of_variant: Vec::new(),
            members: Vec::new(),
            part_queues: Vec::new(),
            anchor: None,
            on_segment_created: None,
            on_part_created: None,
        })
    }

    /// Fire a callback after each segment becomes visible.
    pub fn on_segment_created(&mut self, callback: SegmentCallback) {
        self.on_segment_created = Some(callback);
    }

    /// Fire a callback after each part becomes visible.
    pub fn on_part_created(&mut self, callback: PartCallback) {
        self.on_part_created = Some(callback);
    }

    /// Register a variant. Only valid before the first sample.
    pub fn add_variant(&mut self, desc: VariantDesc) -> Result<()> {
        self.add_stream(desc, VariantRole::Variant)
    }

    /// Register an alternate rendition. Only valid before the first sample
    /// and only for master-typed writers.
    pub fn add_rendition(&mut self, desc: VariantDesc) -> Result<()> {
        if self.config.writer_type == WriterType::Media {
            return Err(HlsWriterError::RenditionNotAllowed);
        }
        self.add_stream(desc, VariantRole::Rendition)
    }

    fn add_stream(&mut self, desc: VariantDesc, role: VariantRole) -> Result<()> {
        if self.state != WriterState::Init {
            return Err(HlsWriterError::AlreadyMuxing(match role {
                VariantRole::Variant => "variant",
                VariantRole::Rendition => "rendition",
            }));
        }
        if self.config.writer_type == WriterType::Media && !self.variants.is_empty() {
            return Err(HlsWriterError::SingleVariantOnly);
        }
        if self.index_by_id.contains_key(&desc.id) {
            return Err(HlsWriterError::DuplicateVariant(desc.id));
        }

        let variant =
            Variant::new(desc, role, self.config.segment_type, self.config.max_segments)?;
        info!(variant = %variant.id, ?role, tracks = variant.tracks.len(), "added stream");
        self.index_by_id.insert(variant.id.clone(), self.variants.len());
        self.variants.push(variant);
        Ok(())
    }

    /// Per-variant lifecycle statistics.
    pub fn stats(&self, variant_id: &str) -> Option<WriterStats> {
        let variant = &self.variants[*self.index_by_id.get(variant_id)?];
        Some(WriterStats {
            segments_written: variant.segments_written,
            parts_written: variant.parts_written,
            bytes_written: variant.bytes_written,
        })
    }

    /// First write: wire the sample queues and variant dependencies.
    fn start_muxing(&mut self) {
        let lead_variant = self.variants.iter().position(|v| v.lead_track().is_some());

        self.queue_of_variant = vec![usize::MAX; self.variants.len()];
        let mut leaders: Vec<usize> = Vec::new();

        for (idx, variant) in self.variants.iter().enumerate() {
            let own_lead = variant.lead_track().is_some();
            let leader = match (own_lead, lead_variant) {
                (true, _) => idx,
                // Align this variant's boundaries to the lead variant.
                (false, Some(lead)) if self.config.writer_type == WriterType::Master => lead,
                _ => idx,
            };
            if leader == idx {
                leaders.push(idx);
            }
            self.queue_of_variant[idx] = leader;
        }

        // Record the dependency by id rather than by reference.
        if let Some(lead) = lead_variant {
            let lead_id = self.variants[lead].id.clone();
            for idx in 0..self.variants.len() {
                if self.queue_of_variant[idx] == lead && idx != lead {
                    self.variants[idx].depends_on = Some(lead_id.clone());
                }
            }
        }

        // Build one queue per leader, then remap queue_of_variant to queue
        // indexes.
        let mut queue_index: FxHashMap<usize, usize> = FxHashMap::default();
        self.queues.clear();
        self.members = Vec::new();
        for &leader in &leaders {
            let variant = &self.variants[leader];
            let lead_track = variant
                .lead_track()
                .map(|t| (t.id, t.timescale))
                .unwrap_or_else(|| (variant.tracks[0].id, variant.tracks[0].timescale));
            let mut queue = SampleQueue::new(
                (leader, lead_track.0),
                lead_track.1,
                self.config.segment_duration_ms,
            );
            for track in &variant.tracks {
                if track.id != lead_track.0 {
                    queue.add_track((leader, track.id), track.timescale);
                }
            }
            queue_index.insert(leader, self.queues.len());
            self.queues.push(queue);
            self.members.push(vec![leader]);
        }
        for idx in 0..self.variants.len() {
            let leader = self.queue_of_variant[idx];
            let queue = queue_index[&leader];
            if leader != idx {
                for track in &self.variants[idx].tracks {
                    self.queues[queue].add_track((idx, track.id), track.timescale);
                }
                self.members[queue].push(idx);
            }
            self.queue_of_variant[idx] = queue;
        }

        // Part queues for low-latency operation.
        self.part_queues = Vec::with_capacity(self.variants.len());
        for variant in &self.variants {
            if self.config.low_latency() {
                let mut part_queue = PartQueue::new();
                for track in &variant.tracks {
                    part_queue.add_track(track.id, track.timescale, self.config.part_duration_ms);
                }
                self.part_queues.push(Some(part_queue));
            } else {
                self.part_queues.push(None);
            }
        }

        self.state = WriterState::Muxing;
        info!(variants = self.variants.len(), groups = self.queues.len(), "muxing started");
    }

    /// Write one sample into a variant.
    ///
    /// The sample's `track_id` must belong to the variant; unknown track
    /// ids panic (programmer error), unknown variant ids return a typed
    /// error.
    pub fn write_sample(&mut self, variant_id: &str, sample: MediaSample) -> Result<()> {
        if self.state == WriterState::Closed {
            return Err(HlsWriterError::Muxing("writer is closed".into()));
        }
        if self.state == WriterState::Init {
            self.start_muxing();
        }

        let idx = *self
            .index_by_id
            .get(variant_id)
            .ok_or_else(|| HlsWriterError::UnknownVariant(variant_id.to_string()))?;

        let track_index = self.variants[idx].track_index(sample.track_id);
        let timescale = self.variants[idx].tracks[track_index].timescale;
        let processed = self.variants[idx].processors[track_index].process(sample)?;

        if self.anchor.is_none() {
            self.anchor = Some(Anchor {
                base_ms: processed.timestamp_ms.unwrap_or_else(now_ms),
                base_dts: processed.dts(),
                timescale,
            });
        }

        self.ensure_init_header(idx)?;

        let queue = self.queue_of_variant[idx];
        let mut events = Vec::new();
        self.queues[queue].push((idx, processed.track_id), processed, &mut |event| {
            events.push(event)
        });
        self.handle_events(queue, events)
    }

    fn handle_events(&mut self, queue: usize, events: Vec<QueueEvent>) -> Result<()> {
        for event in events {
            match event {
                QueueEvent::Sample { variant, sample, .. } => self.route_sample(variant, sample)?,
                QueueEvent::Flush => self.flush_group(queue)?,
            }
        }
        Ok(())
    }

    fn route_sample(&mut self, idx: usize, sample: MediaSample) -> Result<()> {
        if self.part_queues[idx].is_none() {
            return self.variants[idx].muxer.push_sample(sample);
        }

        let track_id = sample.track_id;
        let mut groups: Vec<PartGroup> = Vec::new();
        if let Some(part_queue) = &mut self.part_queues[idx] {
            part_queue.push(track_id, sample, &mut |group| groups.push(group));
        }
        for group in groups {
            self.emit_part(idx, group)?;
        }
        Ok(())
    }

    /// Store one partial segment and publish the playlist revision.
    fn emit_part(&mut self, idx: usize, group: PartGroup) -> Result<()> {
        // The part duration is the longest track span in the window.
        let mut duration = 0f64;
        let mut independent = false;
        for (track_id, samples) in &group {
            let track_index = self.variants[idx].track_index(*track_id);
            let timescale = self.variants[idx].tracks[track_index].timescale as f64;
            let ticks: u64 = samples.iter().map(|s| s.duration as u64).sum();
            duration = duration.max(ticks as f64 / timescale);
            independent |= samples.iter().any(|s| s.sync);
        }

        let data = self.variants[idx].muxer.push_part(group)?;

        let variant = &mut self.variants[idx];
        let segment_index = variant.next_segment;
        let part_index = variant.next_part;
        let name = format!("segment_{segment_index}_part_{part_index}.m4s");
        let uri = self.storage.store_part(&variant.id, &name, &data)?;

        let part = Part { uri, duration, independent: independent || part_index == 0 };
        variant.playlist.add_part(segment_index, part.clone());
        variant.next_part += 1;
        variant.parts_written += 1;
        variant.bytes_written += data.len() as u64;
        debug!(variant = %variant.id, segment = segment_index, part = part_index, "part stored");

        if let Some(callback) = &mut self.on_part_created {
            callback(&self.variants[idx].id, &part);
        }

        self.store_variant_playlist(idx, false)
    }

    /// Close the open segment of every variant in a group, then refresh
    /// the master playlist.
    fn flush_group(&mut self, queue: usize) -> Result<()> {
        for idx in self.members[queue].clone() {
            self.flush_variant(idx)?;
        }
        self.store_master_playlist()
    }

    fn segment_wallclock(&self, flushed: &FlushedSegment) -> Option<i64> {
        let anchor = self.anchor?;
        let base_dts_ms = anchor.base_dts as i128 * 1000 / anchor.timescale as i128;
        let max_first_dts_ms = flushed
            .tracks
            .iter()
            .filter_map(|t| {
                t.first_dts.map(|dts| dts as i128 * 1000 / t.timescale as i128)
            })
            .max()?;
        Some(anchor.base_ms + (max_first_dts_ms - base_dts_ms) as i64)
    }

    fn flush_variant(&mut self, idx: usize) -> Result<()> {
        // Low latency: complete parts go out as parts, the open window
        // becomes the segment tail.
        if self.part_queues[idx].is_some() {
            let (leftover, tail) =
                self.part_queues[idx].as_mut().expect("checked above").drain();
            for group in leftover {
                self.emit_part(idx, group)?;
            }
            for (_, samples) in tail {
                for sample in samples {
                    self.variants[idx].muxer.push_sample(sample)?;
                }
            }
        }

        let Some(flushed) = self.variants[idx].muxer.flush_segment() else {
            return Ok(());
        };

        // Segment duration: the lead track's ticks, or the longest track
        // when no lead exists.
        let lead_id = self.variants[idx].lead_track().map(|t| t.id);
        let duration = flushed
            .tracks
            .iter()
            .filter(|t| lead_id.is_none() || lead_id == Some(t.track_id))
            .map(|t| t.ticks as f64 / t.timescale as f64)
            .fold(0f64, f64::max);
        let wallclock_ms = self.segment_wallclock(&flushed);

        let variant = &mut self.variants[idx];
        let index = variant.next_segment;
        let name = format!(
            "segment_{index}.{}",
            self.config.segment_type.segment_extension()
        );
        let uri = self.storage.store_segment(&variant.id, &name, &flushed.data)?;

        let appended = variant.playlist.add_segment(Segment {
            index,
            uri,
            size: flushed.data.len() as u64,
            duration,
            wallclock_ms,
            media_init: None,
            discontinuity: false,
            parts: Vec::new(),
        });
        variant.next_segment += 1;
        variant.next_part = 0;
        variant.segments_written += 1;
        variant.bytes_written += flushed.data.len() as u64;
        debug!(variant = %variant.id, segment = index, duration, "segment stored");

        if let Some(evicted) = appended.evicted {
            self.storage.delete_segment(&self.variants[idx].id, &evicted)?;
        }
        if !appended.pruned_parts.is_empty() {
            debug!(
                variant = %self.variants[idx].id,
                pruned = appended.pruned_parts.len(),
                "dropped parts outside the retention window"
            );
        }

        self.store_variant_playlist(idx, false)?;

        if self.on_segment_created.is_some() {
            let last = self.variants[idx].playlist.segments().last().cloned();
            if let (Some(callback), Some(segment)) = (&mut self.on_segment_created, last) {
                callback(&self.variants[idx].id, &segment);
            }
        }
        Ok(())
    }

    fn store_variant_playlist(&mut self, idx: usize, ended: bool) -> Result<()> {
        let low_latency = self.config.low_latency();

        let preload_hint = low_latency.then(|| {
            let variant = &self.variants[idx];
            format!("segment_{}_part_{}.m4s", variant.next_segment, variant.next_part)
        });

        let mut rendition_reports = Vec::new();
        if low_latency {
            for (other_idx, other) in self.variants.iter().enumerate() {
                if other_idx == idx {
                    continue;
                }
                let (Some(uri), Some((msn, part))) =
                    (&other.playlist_uri, other.playlist.last_part())
                else {
                    continue;
                };
                rendition_reports.push((uri.clone(), msn, part));
            }
        }

        let ctx = PlaylistContext {
            version: self.config.segment_type.playlist_version(),
            vod: self.config.mode == Mode::Vod,
            ended,
            low_latency,
            server_control: self.config.server_control,
            rendition_reports,
            preload_hint,
        };

        let text = self.variants[idx].playlist.render(&ctx);
        let uri = self.storage.store_playlist(&self.variants[idx].id, text.as_bytes())?;
        self.variants[idx].playlist_uri = Some(uri);
        Ok(())
    }

    fn store_master_playlist(&mut self) -> Result<()> {
        if self.config.writer_type != WriterType::Master {
            return Ok(());
        }
        let text = master::render(&self.variants, self.config.segment_type);
        self.storage.store_master_playlist(text.as_bytes())?;
        Ok(())
    }

    /// Emit (or rotate) the init header once every track has codec
    /// configuration.
    fn ensure_init_header(&mut self, idx: usize) -> Result<()> {
        if !self.config.segment_type.is_fmp4() {
            return Ok(());
        }

        let variant = &mut self.variants[idx];
        let mut dirty = false;
        for processor in &mut variant.processors {
            dirty |= processor.take_config_dirty();
        }
        if !variant.ready() {
            return Ok(());
        }
        if variant.init_uri.is_some() && !dirty && !variant.force_new_init {
            return Ok(());
        }

        let inits = variant.cmaf_track_inits()?;
        let data = variant
            .muxer
            .init_segment(inits)
            .ok_or_else(|| HlsWriterError::Muxing("container has no init header".into()))?;
        let name = format!("init_{}.mp4", variant.next_init);
        variant.next_init += 1;
        let uri = self.storage.store_init_header(&variant.id, &name, &data)?;
        info!(variant = %variant.id, %uri, "init header stored");
        variant.playlist.add_init_header(uri.clone());
        variant.init_uri = Some(uri);
        variant.force_new_init = false;
        Ok(())
    }

    /// Flush buffered media, then mark a discontinuity on one variant (or
    /// all of them) and restart the wall-clock chain.
    pub fn add_discontinuity(&mut self, variant_id: Option<&str>) -> Result<()> {
        if let Some(id) = variant_id {
            if !self.index_by_id.contains_key(id) {
                return Err(HlsWriterError::UnknownVariant(id.to_string()));
            }
        }

        if self.state == WriterState::Muxing {
            self.drain_and_flush_all()?;
        }

        for idx in 0..self.variants.len() {
            let targeted = match variant_id {
                Some(id) => self.variants[idx].id == id,
                None => true,
            };
            if targeted {
                self.variants[idx].playlist.add_discontinuity();
                self.variants[idx].force_new_init = true;
            }
        }

        // The next sample starts a fresh PROGRAM-DATE-TIME chain.
        self.anchor = None;
        Ok(())
    }

    fn drain_and_flush_all(&mut self) -> Result<()> {
        for queue in 0..self.queues.len() {
            let mut events = Vec::new();
            self.queues[queue].flush(&mut |event| events.push(event));
            for event in events {
                if let QueueEvent::Sample { variant, sample, .. } = event {
                    self.route_sample(variant, sample)?;
                }
            }
        }
        for queue in 0..self.queues.len() {
            self.flush_group(queue)?;
        }
        Ok(())
    }

    /// Flush everything and append `#EXT-X-ENDLIST`. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        match self.state {
            WriterState::Closed => return Ok(()),
            WriterState::Init => {
                self.state = WriterState::Closed;
                return Ok(());
            }
            WriterState::Muxing => {}
        }

        self.drain_and_flush_all()?;

        for idx in 0..self.variants.len() {
            self.store_variant_playlist(idx, true)?;
        }
        self.store_master_playlist()?;
        self.state = WriterState::Closed;
        info!("writer closed");
        Ok(())
    }
}
