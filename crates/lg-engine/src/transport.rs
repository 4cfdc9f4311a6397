//! Musical clock that turns frame counts into bar boundaries.

use lg_ir::MusicalTime;

/// Receives bar-boundary events from the [`Transport`].
///
/// Called on the audio thread; implementations must be O(1) and
/// non-blocking.
pub trait TimeObserver {
    fn bar(&mut self);
}

/// Frame-accurate tempo clock.
#[derive(Clone, Debug)]
pub struct Transport {
    sample_rate: u32,
    bpm: f32,
    beats_per_bar: u32,
    frames_per_beat: u64,
    /// Frames elapsed in the current bar
    frame_in_bar: u64,
    /// Completed bars
    bars: u64,
}

impl Transport {
    pub fn new(sample_rate: u32, bpm: f32, beats_per_bar: u32) -> Self {
        let mut transport = Self {
            sample_rate,
            bpm,
            beats_per_bar: beats_per_bar.max(1),
            frames_per_beat: 0,
            frame_in_bar: 0,
            bars: 0,
        };
        transport.update_frames_per_beat();
        transport
    }

    fn update_frames_per_beat(&mut self) {
        let bpm = if self.bpm.is_finite() && self.bpm > 0.0 { self.bpm } else { 120.0 };
        self.bpm = bpm;
        self.frames_per_beat = ((self.sample_rate as f64 * 60.0) / bpm as f64).round().max(1.0) as u64;
        self.frame_in_bar = self.frame_in_bar.min(self.frames_per_bar() - 1);
    }

    /// Change tempo. The position inside the current bar is kept in frames.
    pub fn set_bpm(&mut self, bpm: f32) {
        self.bpm = bpm;
        self.update_frames_per_beat();
    }

    /// Follow a device running at a different rate than configured.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate.max(1);
        self.update_frames_per_beat();
    }

    pub fn bpm(&self) -> f32 {
        self.bpm
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.beats_per_bar
    }

    pub fn frames_per_beat(&self) -> u64 {
        self.frames_per_beat
    }

    pub fn frames_per_bar(&self) -> u64 {
        self.frames_per_beat * self.beats_per_bar as u64
    }

    /// Frames left before the next bar boundary (at least 1).
    pub fn frames_until_bar(&self) -> usize {
        (self.frames_per_bar() - self.frame_in_bar) as usize
    }

    /// Completed bars since start.
    pub fn bars(&self) -> u64 {
        self.bars
    }

    pub fn position(&self) -> MusicalTime {
        MusicalTime::from_frames(self.frame_in_bar, self.frames_per_beat)
            .add_beats(self.bars * self.beats_per_bar as u64)
    }

    /// Advance by `frames`, calling `bar()` on every observer once for each
    /// bar boundary crossed. Returns the number of boundaries crossed.
    pub fn advance<O: TimeObserver>(&mut self, frames: usize, observers: &mut [O]) -> u32 {
        let mut crossed = 0;
        let mut remaining = frames as u64;
        while remaining > 0 {
            let step = remaining.min(self.frames_per_bar() - self.frame_in_bar);
            self.frame_in_bar += step;
            remaining -= step;
            if self.frame_in_bar == self.frames_per_bar() {
                self.frame_in_bar = 0;
                self.bars += 1;
                crossed += 1;
                for observer in observers.iter_mut() {
                    observer.bar();
                }
            }
        }
        crossed
    }
}
