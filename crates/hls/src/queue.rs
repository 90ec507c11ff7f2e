use std::collections::VecDeque;

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::sample::MediaSample;

/// A track's address inside a queue group: (variant index, track id).
pub(crate) type QueueKey = (usize, u32);

/// What the queue hands downstream.
#[derive(Debug)]
pub(crate) enum QueueEvent {
    /// Forward this sample to the owning variant's muxer (or part queue).
    Sample { variant: usize, track: u32, sample: MediaSample },
    /// Close the current segment of every variant in the group. Samples
    /// emitted afterwards belong to the next segment.
    Flush,
}

struct QueueTrack {
    timescale: u32,
    buffer: VecDeque<MediaSample>,
    /// Lead track only: ticks accumulated since the last boundary.
    duration_since_boundary: u64,
}

/// Aligns multi-track samples so that segment boundaries land on lead-track
/// sync samples, after every non-lead track has produced enough samples to
/// cover the boundary.
///
/// One queue serves a variant group: the lead variant plus any variants
/// whose segmentation depends on it.
pub(crate) struct SampleQueue {
    lead: QueueKey,
    lead_timescale: u32,
    tracks: FxHashMap<QueueKey, QueueTrack>,
    /// Non-lead keys in registration order, for deterministic drains.
    order: Vec<QueueKey>,
    /// Dts of the last lead sample handed to the muxer, in lead ticks.
    last_sample_timestamp: i64,
    target_duration_ticks: u64,
    buffering: bool,
}

impl SampleQueue {
    /// Create a queue led by `lead`. Every track (lead included) must be
    /// registered before samples arrive.
    pub fn new(lead: QueueKey, lead_timescale: u32, target_duration_ms: u64) -> Self {
        let mut tracks = FxHashMap::default();
        tracks.insert(
            lead,
            QueueTrack { timescale: lead_timescale, buffer: VecDeque::new(), duration_since_boundary: 0 },
        );
        Self {
            lead,
            lead_timescale,
            tracks,
            order: Vec::new(),
            last_sample_timestamp: i64::MIN,
            target_duration_ticks: target_duration_ms * lead_timescale as u64 / 1000,
            buffering: false,
        }
    }

    /// Register a non-lead track.
    pub fn add_track(&mut self, key: QueueKey, timescale: u32) {
        if key == self.lead {
            return;
        }
        self.tracks.insert(
            key,
            QueueTrack { timescale, buffer: VecDeque::new(), duration_since_boundary: 0 },
        );
        self.order.push(key);
    }

    fn rescale_to_lead(&self, dts: i64, timescale: u32) -> i64 {
        (dts as i128 * self.lead_timescale as i128 / timescale as i128) as i64
    }

    /// Push one processed sample.
    pub fn push(&mut self, key: QueueKey, sample: MediaSample, out: &mut impl FnMut(QueueEvent)) {
        if key == self.lead {
            self.push_lead(sample, out);
        } else {
            self.push_non_lead(key, sample, out);
        }
    }

    fn push_lead(&mut self, sample: MediaSample, out: &mut impl FnMut(QueueEvent)) {
        if self.buffering {
            self.tracks.get_mut(&self.lead).expect("lead registered").buffer.push_back(sample);
            return;
        }

        let duration = self.tracks[&self.lead].duration_since_boundary;
        let new_segment = sample.sync && duration >= self.target_duration_ticks;

        if new_segment {
            let waiting = self.order.iter().any(|key| self.tracks[key].buffer.is_empty());
            if waiting && !self.order.is_empty() {
                // Hold the boundary until every non-lead track caught up.
                trace!(dts = sample.dts(), "boundary reached, waiting for non-lead tracks");
                self.buffering = true;
                let lead = self.tracks.get_mut(&self.lead).expect("lead registered");
                lead.duration_since_boundary = 0;
                lead.buffer.push_back(sample);
                return;
            }

            self.flush_boundary(sample, out);
            return;
        }

        let dts = sample.dts();
        let lead = self.tracks.get_mut(&self.lead).expect("lead registered");
        lead.duration_since_boundary += sample.duration as u64;
        self.last_sample_timestamp = dts;
        out(QueueEvent::Sample { variant: self.lead.0, track: self.lead.1, sample });
        self.drain_non_lead_up_to(self.last_sample_timestamp, out);
    }

    /// Close the segment at `boundary` (a lead sync sample) and open the
    /// next one with it.
    fn flush_boundary(&mut self, boundary: MediaSample, out: &mut impl FnMut(QueueEvent)) {
        let boundary_ts = boundary.dts();
        // The closing segment keeps every non-lead sample at or below the
        // boundary.
        self.drain_non_lead_up_to(boundary_ts, out);
        out(QueueEvent::Flush);

        let lead = self.tracks.get_mut(&self.lead).expect("lead registered");
        lead.duration_since_boundary = boundary.duration as u64;
        self.last_sample_timestamp = boundary_ts;
        out(QueueEvent::Sample { variant: self.lead.0, track: self.lead.1, sample: boundary });
        self.drain_non_lead_up_to(boundary_ts, out);
    }

    fn push_non_lead(
        &mut self,
        key: QueueKey,
        sample: MediaSample,
        out: &mut impl FnMut(QueueEvent),
    ) {
        let timescale = self.tracks[&key].timescale;
        let mapped = self.rescale_to_lead(sample.dts(), timescale);

        if mapped <= self.last_sample_timestamp {
            // Belongs to the span already handed to the muxer.
            out(QueueEvent::Sample { variant: key.0, track: key.1, sample });
            return;
        }

        self.tracks.get_mut(&key).expect("track registered").buffer.push_back(sample);

        if self.buffering {
            let caught_up = self.order.iter().all(|key| !self.tracks[key].buffer.is_empty());
            if caught_up {
                self.catch_up_flush(out);
            }
        }
    }

    /// Every non-lead track produced a sample past the held boundary:
    /// flush the segment and release the buffered lead samples.
    fn catch_up_flush(&mut self, out: &mut impl FnMut(QueueEvent)) {
        self.buffering = false;

        let lead = self.tracks.get_mut(&self.lead).expect("lead registered");
        let mut held: Vec<MediaSample> = lead.buffer.drain(..).collect();
        if held.is_empty() {
            return;
        }
        let boundary = held.remove(0);
        self.flush_boundary(boundary, out);

        for sample in held {
            let dts = sample.dts();
            let lead = self.tracks.get_mut(&self.lead).expect("lead registered");
            lead.duration_since_boundary += sample.duration as u64;
            self.last_sample_timestamp = dts;
            out(QueueEvent::Sample { variant: self.lead.0, track: self.lead.1, sample });
        }
        self.drain_non_lead_up_to(self.last_sample_timestamp, out);
    }

    /// Forward buffered non-lead samples whose mapped dts does not exceed
    /// `limit` (in lead ticks).
    fn drain_non_lead_up_to(&mut self, limit: i64, out: &mut impl FnMut(QueueEvent)) {
        for key in self.order.clone() {
            loop {
                let track = self.tracks.get_mut(&key).expect("track registered");
                let Some(front) = track.buffer.front() else { break };
                let mapped =
                    (front.dts() as i128 * self.lead_timescale as i128 / track.timescale as i128) as i64;
                if mapped > limit {
                    break;
                }
                let sample = track.buffer.pop_front().expect("front checked");
                out(QueueEvent::Sample { variant: key.0, track: key.1, sample });
            }
        }
    }

    /// Drain every buffered sample regardless of target duration. Used at
    /// close time; the caller flushes the muxers afterwards.
    pub fn flush(&mut self, out: &mut impl FnMut(QueueEvent)) {
        self.buffering = false;
        let lead_samples: Vec<MediaSample> = self
            .tracks
            .get_mut(&self.lead)
            .expect("lead registered")
            .buffer
            .drain(..)
            .collect();
        for sample in lead_samples {
            let dts = sample.dts();
            self.last_sample_timestamp = dts;
            out(QueueEvent::Sample { variant: self.lead.0, track: self.lead.1, sample });
        }
        for key in self.order.clone() {
            let samples: Vec<MediaSample> =
                self.tracks.get_mut(&key).expect("track registered").buffer.drain(..).collect();
            for sample in samples {
                out(QueueEvent::Sample { variant: key.0, track: key.1, sample });
            }
        }
        let lead = self.tracks.get_mut(&self.lead).expect("lead registered");
        lead.duration_since_boundary = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEAD: QueueKey = (0, 1);
    const AUDIO: QueueKey = (0, 2);

    fn video_sample(dts: i64, duration: u32, sync: bool) -> MediaSample {
        MediaSample::new(1, dts, duration, vec![0u8; 4]).with_sync(sync)
    }

    fn audio_sample(dts: i64, duration: u32) -> MediaSample {
        MediaSample::new(2, dts, duration, vec![0u8; 2]).with_sync(true)
    }

    fn collect(queue: &mut SampleQueue, key: QueueKey, sample: MediaSample) -> Vec<String> {
        let mut events = Vec::new();
        queue.push(key, sample, &mut |event| {
            events.push(match event {
                QueueEvent::Sample { track, sample, .. } => {
                    format!("s{}@{}", track, sample.dts())
                }
                QueueEvent::Flush => "flush".to_string(),
            });
        });
        events
    }

    #[test]
    fn single_track_flushes_on_sync_after_target() {
        // 90 kHz lead, 2 s target = 180_000 ticks.
        let mut queue = SampleQueue::new(LEAD, 90_000, 2000);

        // 0.5 s samples; sync every 4th.
        let mut all = Vec::new();
        for i in 0..9 {
            let sync = i % 4 == 0;
            all.extend(collect(&mut queue, LEAD, video_sample(i * 45_000, 45_000, sync)));
        }

        // Boundary at sample 4 (dts 180000) and 8 (dts 360000).
        let flushes: Vec<usize> = all
            .iter()
            .enumerate()
            .filter(|(_, e)| e.as_str() == "flush")
            .map(|(i, _)| i)
            .collect();
        assert_eq!(flushes.len(), 2);
        assert_eq!(all[flushes[0] + 1], "s1@180000");
        assert_eq!(all[flushes[1] + 1], "s1@360000");
    }

    #[test]
    fn non_sync_sample_never_flushes() {
        let mut queue = SampleQueue::new(LEAD, 90_000, 2000);
        let mut all = Vec::new();
        for i in 0..20 {
            all.extend(collect(&mut queue, LEAD, video_sample(i * 45_000, 45_000, false)));
        }
        assert!(all.iter().all(|e| e != "flush"));
    }

    #[test]
    fn boundary_waits_for_audio_then_flushes() {
        let mut queue = SampleQueue::new(LEAD, 90_000, 2000);
        queue.add_track(AUDIO, 48_000);

        let mut all = Vec::new();
        // Audio keeps pace with video up front.
        for i in 0..5 {
            all.extend(collect(&mut queue, LEAD, video_sample(i * 45_000, 45_000, i == 0)));
            // 0.5 s of audio at 48 kHz.
            all.extend(collect(&mut queue, AUDIO, audio_sample(i * 24_000, 24_000)));
        }

        // The 2 s boundary arrives: audio has nothing buffered (all drained),
        // so the queue holds the boundary.
        let events = collect(&mut queue, LEAD, video_sample(5 * 45_000, 45_000, true));
        assert!(events.is_empty());

        // Audio sample past the boundary releases the flush.
        let events = collect(&mut queue, AUDIO, audio_sample(5 * 24_000, 24_000));
        let flush_pos = events.iter().position(|e| e == "flush").expect("flush released");
        // The boundary video sample opens the next segment right after.
        assert_eq!(events[flush_pos + 1], "s1@225000");
    }

    #[test]
    fn audio_below_boundary_lands_before_flush() {
        let mut queue = SampleQueue::new(LEAD, 90_000, 2000);
        queue.add_track(AUDIO, 90_000);

        collect(&mut queue, LEAD, video_sample(0, 90_000, true));
        collect(&mut queue, AUDIO, audio_sample(0, 90_000));
        collect(&mut queue, LEAD, video_sample(90_000, 90_000, false));
        // Audio ahead of the lead: buffered.
        assert!(collect(&mut queue, AUDIO, audio_sample(95_000, 90_000)).is_empty());
        assert!(collect(&mut queue, AUDIO, audio_sample(185_000, 90_000)).is_empty());

        // Boundary at 180000; buffered audio@95000 belongs to the closing
        // segment and must be emitted before the flush event.
        let events = collect(&mut queue, LEAD, video_sample(180_000, 90_000, true));
        let flush_pos = events.iter().position(|e| e == "flush").unwrap();
        assert!(events[..flush_pos].contains(&"s2@95000".to_string()));
        assert!(!events[..flush_pos].contains(&"s2@185000".to_string()));
    }

    #[test]
    fn stale_audio_forwarded_immediately() {
        let mut queue = SampleQueue::new(LEAD, 90_000, 2000);
        queue.add_track(AUDIO, 90_000);

        collect(&mut queue, LEAD, video_sample(0, 45_000, true));
        collect(&mut queue, LEAD, video_sample(45_000, 45_000, false));
        // Audio behind the last muxed lead dts goes straight through.
        let events = collect(&mut queue, AUDIO, audio_sample(30_000, 10_000));
        assert_eq!(events, vec!["s2@30000".to_string()]);
    }

    #[test]
    fn close_flush_drains_everything() {
        let mut queue = SampleQueue::new(LEAD, 90_000, 2000);
        queue.add_track(AUDIO, 90_000);

        collect(&mut queue, LEAD, video_sample(0, 45_000, true));
        collect(&mut queue, AUDIO, audio_sample(50_000, 10_000)); // buffered

        let mut events = Vec::new();
        queue.flush(&mut |event| {
            if let QueueEvent::Sample { track, .. } = event {
                events.push(track);
            }
        });
        assert_eq!(events, vec![2]);
    }
}
