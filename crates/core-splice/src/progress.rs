use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Chunk durations kept for the rolling average.
const ROLLING_WINDOW: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub done: u64,
    pub total: u64,
    /// Estimated time left, from the recent per-chunk average.
    pub remaining: Duration,
}

impl Progress {
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        (self.done.saturating_mul(100) / self.total).min(100) as u8
    }
}

/// Receives progress ticks during a commit.
pub trait ProgressSink {
    fn progress(&mut self, progress: Progress);
}

impl<F: FnMut(Progress)> ProgressSink for F {
    fn progress(&mut self, progress: Progress) {
        self(progress)
    }
}

/// Groups chunk completions so at most `resolution` ticks are emitted.
#[derive(Debug)]
pub struct ProgressPacer {
    total: u64,
    group: u64,
    done: u64,
    recent: VecDeque<Duration>,
    last: Instant,
}

impl ProgressPacer {
    pub fn new(total_chunks: u64, resolution: u32) -> Self {
        let resolution = u64::from(resolution.max(1));
        Self {
            total: total_chunks,
            group: total_chunks.div_ceil(resolution).max(1),
            done: 0,
            recent: VecDeque::with_capacity(ROLLING_WINDOW),
            last: Instant::now(),
        }
    }

    pub fn group_size(&self) -> u64 {
        self.group
    }

    /// Record one finished chunk; returns a tick at group boundaries and at the end.
    pub fn chunk_done(&mut self) -> Option<Progress> {
        let now = Instant::now();
        self.record(now.duration_since(self.last));
        self.last = now;
        self.done += 1;
        (self.done % self.group == 0 || self.done == self.total).then(|| Progress {
            done: self.done,
            total: self.total,
            remaining: self.average() * self.total.saturating_sub(self.done) as u32,
        })
    }

    fn record(&mut self, took: Duration) {
        if self.recent.len() == ROLLING_WINDOW {
            self.recent.pop_front();
        }
        self.recent.push_back(took);
    }

    fn average(&self) -> Duration {
        if self.recent.is_empty() {
            return Duration::ZERO;
        }
        self.recent.iter().sum::<Duration>() / self.recent.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_are_grouped_to_resolution() {
        let mut p = ProgressPacer::new(1000, 50);
        assert_eq!(p.group_size(), 20);
        let ticks: Vec<Progress> = (0..1000).filter_map(|_| p.chunk_done()).collect();
        assert_eq!(ticks.len(), 50);
        assert_eq!(ticks[0].done, 20);
        let last = ticks[ticks.len() - 1];
        assert_eq!((last.done, last.percent()), (1000, 100));
        assert_eq!(last.remaining, Duration::ZERO);
    }

    #[test]
    fn few_chunks_tick_every_chunk_and_final_partial_group() {
        let mut p = ProgressPacer::new(3, 50);
        assert_eq!(p.group_size(), 1);
        assert_eq!((0..3).filter_map(|_| p.chunk_done()).count(), 3);

        let mut p = ProgressPacer::new(7, 3);
        let done: Vec<u64> = (0..7).filter_map(|_| p.chunk_done()).map(|t| t.done).collect();
        assert_eq!(done, vec![3, 6, 7]);
    }
}
