//! Beat-based time representation.
//!
//! `MusicalTime` uses beats as the universal time coordinate. The transport
//! converts its frame counter into one of these for display, and bars are
//! derived from it with the current beats-per-bar.

/// Sub-beats in one beat. Divisible by every integer from 1 to 16, so
/// halves, triplets, quintuplets and sixteenths are all exact.
pub const SUB_BEAT_UNIT: u32 = 720_720;

/// A position in musical time (beats + fractional sub-beat).
///
/// Ordering: beat is primary, sub_beat is secondary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct MusicalTime {
    /// Whole beats from transport start
    pub beat: u64,
    /// Fraction of a beat: 0..SUB_BEAT_UNIT
    pub sub_beat: u32,
}

impl MusicalTime {
    /// The zero position (transport start).
    pub const fn zero() -> Self {
        Self { beat: 0, sub_beat: 0 }
    }

    /// Create a time at an exact beat boundary.
    pub const fn from_beats(beat: u64) -> Self {
        Self { beat, sub_beat: 0 }
    }

    /// Convert a frame count at `frames_per_beat` into musical time.
    pub fn from_frames(frames: u64, frames_per_beat: u64) -> Self {
        if frames_per_beat == 0 {
            return Self::zero();
        }
        let beat = frames / frames_per_beat;
        let rem = frames % frames_per_beat;
        let sub_beat = (rem * SUB_BEAT_UNIT as u64 / frames_per_beat) as u32;
        Self { beat, sub_beat }
    }

    /// Zero-based bar index.
    pub fn bar(self, beats_per_bar: u32) -> u64 {
        if beats_per_bar == 0 {
            return 0;
        }
        self.beat / beats_per_bar as u64
    }

    /// Zero-based beat within the current bar.
    pub fn beat_in_bar(self, beats_per_bar: u32) -> u32 {
        if beats_per_bar == 0 {
            return 0;
        }
        (self.beat % beats_per_bar as u64) as u32
    }

    /// Advance by whole beats.
    pub fn add_beats(self, beats: u64) -> Self {
        Self {
            beat: self.beat + beats,
            sub_beat: self.sub_beat,
        }
    }
}

impl PartialOrd for MusicalTime {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MusicalTime {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        self.beat.cmp(&other.beat).then(self.sub_beat.cmp(&other.sub_beat))
    }
}

impl core::fmt::Display for MusicalTime {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{:06}", self.beat, self.sub_beat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_default() {
        assert_eq!(MusicalTime::zero(), MusicalTime::default());
    }

    #[test]
    fn ordering() {
        let t0 = MusicalTime::zero();
        let t1 = MusicalTime::from_beats(1);
        let t_half = MusicalTime { beat: 0, sub_beat: SUB_BEAT_UNIT / 2 };
        assert!(t0 < t_half);
        assert!(t_half < t1);
    }

    #[test]
    fn from_frames_splits_beat_and_fraction() {
        // 22050 frames per beat (120 BPM at 44.1 kHz)
        let t = MusicalTime::from_frames(22050 * 3 + 11025, 22050);
        assert_eq!(t.beat, 3);
        assert_eq!(t.sub_beat, SUB_BEAT_UNIT / 2);
    }

    #[test]
    fn from_frames_zero_rate_is_zero() {
        assert_eq!(MusicalTime::from_frames(100, 0), MusicalTime::zero());
    }

    #[test]
    fn bar_and_beat_in_bar() {
        let t = MusicalTime::from_beats(9);
        assert_eq!(t.bar(4), 2);
        assert_eq!(t.beat_in_bar(4), 1);
        assert_eq!(t.bar(0), 0);
    }

    #[test]
    fn add_beats_keeps_fraction() {
        let t = MusicalTime { beat: 1, sub_beat: 7 }.add_beats(3);
        assert_eq!(t, MusicalTime { beat: 4, sub_beat: 7 });
    }

    #[test]
    fn sub_beat_unit_divisibility() {
        for n in 1..=16 {
            assert_eq!(SUB_BEAT_UNIT % n, 0, "SUB_BEAT_UNIT not divisible by {}", n);
        }
    }
}
