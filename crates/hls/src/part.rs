use std::collections::VecDeque;

use rustc_hash::FxHashMap;

use crate::sample::MediaSample;

/// One partial-segment's worth of samples per track, handed to the muxer's
/// `push_part` entry point.
pub(crate) type PartGroup = Vec<(u32, Vec<MediaSample>)>;

struct PartTrack {
    /// Ticks per part window for this track.
    part_duration_ticks: i64,
    /// Samples of the currently open part.
    buffer: Vec<MediaSample>,
    /// Closed parts waiting for the other tracks.
    closed: VecDeque<Vec<MediaSample>>,
    /// Dts at which the open part closes.
    target: Option<i64>,
}

/// Slices the sample stream of one variant into partial-segment windows of
/// approximately the configured part duration.
pub(crate) struct PartQueue {
    tracks: FxHashMap<u32, PartTrack>,
    order: Vec<u32>,
}

impl PartQueue {
    pub fn new() -> Self {
        Self { tracks: FxHashMap::default(), order: Vec::new() }
    }

    /// Register a track before samples arrive.
    pub fn add_track(&mut self, track_id: u32, timescale: u32, part_duration_ms: u64) {
        self.tracks.insert(
            track_id,
            PartTrack {
                part_duration_ticks: (part_duration_ms as i64) * timescale as i64 / 1000,
                buffer: Vec::new(),
                closed: VecDeque::new(),
                target: None,
            },
        );
        self.order.push(track_id);
    }

    /// Push one sample; emits a part group when every track has a closed
    /// part ready.
    pub fn push(&mut self, track_id: u32, sample: MediaSample, out: &mut impl FnMut(PartGroup)) {
        let track = self.tracks.get_mut(&track_id).expect("part track registered");

        let dts = sample.dts();
        match track.target {
            Some(target) if dts >= target => {
                let closed = std::mem::take(&mut track.buffer);
                if !closed.is_empty() {
                    track.closed.push_back(closed);
                }
                track.target = Some(dts + track.part_duration_ticks);
                track.buffer.push(sample);
            }
            Some(_) => track.buffer.push(sample),
            None => {
                track.target = Some(dts + track.part_duration_ticks);
                track.buffer.push(sample);
            }
        }

        while self.order.iter().all(|id| !self.tracks[id].closed.is_empty()) {
            let group: PartGroup = self
                .order
                .iter()
                .map(|id| {
                    let part = self
                        .tracks
                        .get_mut(id)
                        .expect("part track registered")
                        .closed
                        .pop_front()
                        .expect("closed part present");
                    (*id, part)
                })
                .collect();
            out(group);
        }
    }

    /// Drain at segment flush: any complete-but-unemitted parts come out as
    /// groups (tracks without one contribute nothing), and the still-open
    /// buffers become the tail of the closing segment.
    pub fn drain(&mut self) -> (Vec<PartGroup>, PartGroup) {
        let mut groups = Vec::new();
        while self.order.iter().any(|id| !self.tracks[id].closed.is_empty()) {
            let group: PartGroup = self
                .order
                .iter()
                .filter_map(|id| {
                    self.tracks
                        .get_mut(id)
                        .expect("part track registered")
                        .closed
                        .pop_front()
                        .map(|part| (*id, part))
                })
                .collect();
            groups.push(group);
        }

        let mut tail: PartGroup = Vec::new();
        for id in &self.order {
            let track = self.tracks.get_mut(id).expect("part track registered");
            track.target = None;
            let samples = std::mem::take(&mut track.buffer);
            if !samples.is_empty() {
                tail.push((*id, samples));
            }
        }
        (groups, tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(track: u32, dts: i64, duration: u32) -> MediaSample {
        MediaSample::new(track, dts, duration, vec![0u8; 3]).with_sync(true)
    }

    #[test]
    fn single_track_parts_close_on_window() {
        let mut queue = PartQueue::new();
        // 90 kHz, 300 ms parts = 27_000 ticks.
        queue.add_track(1, 90_000, 300);

        let mut groups = Vec::new();
        // 100 ms samples: the 27_000 target closes after 3 samples.
        for i in 0..7 {
            queue.push(1, sample(1, i * 9_000, 9_000), &mut |g| groups.push(g));
        }

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0][0].1.len(), 3);
        assert_eq!(groups[0][0].1[0].dts(), 0);
        assert_eq!(groups[1][0].1[0].dts(), 27_000);
    }

    #[test]
    fn group_waits_for_every_track() {
        let mut queue = PartQueue::new();
        queue.add_track(1, 90_000, 300);
        queue.add_track(2, 48_000, 300);

        let mut groups = Vec::new();
        // Video crosses its window: one closed part for track 1.
        for i in 0..4 {
            queue.push(1, sample(1, i * 9_000, 9_000), &mut |g| groups.push(g));
        }
        assert!(groups.is_empty());

        // Audio crosses its window too (14_400 ticks at 48 kHz).
        for i in 0..4 {
            queue.push(2, sample(2, i * 4_800, 4_800), &mut |g| groups.push(g));
        }
        assert_eq!(groups.len(), 1);
        let group = &groups[0];
        assert_eq!(group.len(), 2);
        assert_eq!(group[0].0, 1);
        assert_eq!(group[1].0, 2);
    }

    #[test]
    fn drain_returns_leftovers_and_tail() {
        let mut queue = PartQueue::new();
        queue.add_track(1, 90_000, 300);

        let mut groups = Vec::new();
        for i in 0..4 {
            queue.push(1, sample(1, i * 9_000, 9_000), &mut |g| groups.push(g));
        }
        // One part closed (not emitted in single-track? it is emitted).
        assert_eq!(groups.len(), 1);

        let (leftover, tail) = queue.drain();
        assert!(leftover.is_empty());
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].1.len(), 1); // the sample that opened part 2
    }
}
