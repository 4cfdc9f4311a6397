//! Planar f32 sample storage that clips record into and play back from.

use alloc::vec::Vec;
use core::ops::Range;
use core::sync::atomic::{AtomicUsize, Ordering};

use atomic_float::AtomicF32;

/// Maximum number of channels a store can hold.
pub const MAX_CHANNELS: u16 = 2;

/// Default block size for audio processing.
pub const BLOCK_SIZE: usize = 256;

/// A fixed-capacity, planar sample container.
///
/// Data is stored as `channels` contiguous planes of `capacity` frames each.
/// `data[ch * capacity + frame]` holds the sample for channel `ch` at `frame`.
///
/// A store never changes size. Growing a recording means allocating a larger
/// store and copying into it (see the engine's buffer transition). Samples
/// live in atomic cells so one thread may append frames while another copies
/// the frames already written, without locks. Only the owning clip writes.
#[derive(Debug)]
pub struct SampleStore {
    data: Vec<AtomicF32>,
    channels: u16,
    capacity: usize,
    /// Frames `[0, valid)` hold recorded or loaded audio.
    valid: AtomicUsize,
}

impl SampleStore {
    /// Allocate a silent store. `channels` is clamped to `1..=MAX_CHANNELS`.
    pub fn new(channels: u16, capacity: usize) -> Self {
        let channels = channels.clamp(1, MAX_CHANNELS);
        let data = (0..channels as usize * capacity)
            .map(|_| AtomicF32::new(0.0))
            .collect();
        Self {
            data,
            channels,
            capacity,
            valid: AtomicUsize::new(0),
        }
    }

    /// Build a stereo store holding exactly the given audio.
    ///
    /// The shorter of the two slices decides the length.
    pub fn from_planar(left: &[f32], right: &[f32]) -> Self {
        let frames = left.len().min(right.len());
        let store = Self::new(2, frames);
        for i in 0..frames {
            store.write_frame(i, left[i], right[i]);
        }
        store.set_valid_frames(frames);
        store
    }

    /// Number of channels.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Capacity in frames.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames written so far.
    pub fn valid_frames(&self) -> usize {
        self.valid.load(Ordering::Acquire)
    }

    /// Publish how many frames hold audio. Clamped to the capacity.
    pub fn set_valid_frames(&self, frames: usize) {
        self.valid.store(frames.min(self.capacity), Ordering::Release);
    }

    /// Writable frames left when writing from `head`.
    pub fn space_from(&self, head: usize) -> usize {
        self.capacity.saturating_sub(head)
    }

    fn index(&self, ch: u16, frame: usize) -> Option<usize> {
        if frame >= self.capacity {
            return None;
        }
        // mono stores answer every channel from plane 0
        let ch = if ch >= self.channels { 0 } else { ch };
        Some(ch as usize * self.capacity + frame)
    }

    /// Read one sample. Out-of-range frames read as silence.
    pub fn read(&self, ch: u16, frame: usize) -> f32 {
        self.index(ch, frame)
            .map_or(0.0, |i| self.data[i].load(Ordering::Relaxed))
    }

    /// Write one sample. Out-of-range frames are ignored.
    pub fn write(&self, ch: u16, frame: usize, value: f32) {
        if let Some(i) = self.index(ch, frame) {
            self.data[i].store(value, Ordering::Relaxed);
        }
    }

    /// Read a stereo frame.
    pub fn frame(&self, frame: usize) -> (f32, f32) {
        (self.read(0, frame), self.read(1, frame))
    }

    /// Write a stereo frame. A mono store keeps the average of both sides.
    pub fn write_frame(&self, frame: usize, left: f32, right: f32) {
        if self.channels == 1 {
            self.write(0, frame, (left + right) * 0.5);
        } else {
            self.write(0, frame, left);
            self.write(1, frame, right);
        }
    }

    /// Copy `frames` from `source` into the same positions of this store.
    ///
    /// The range is clipped to both capacities. Returns frames copied.
    pub fn copy_range_from(&self, source: &SampleStore, frames: Range<usize>) -> usize {
        let end = frames.end.min(self.capacity).min(source.capacity);
        let start = frames.start.min(end);
        for i in start..end {
            let (l, r) = source.frame(i);
            self.write_frame(i, l, r);
        }
        end - start
    }

    /// Copy the valid frames out into two plain planes.
    pub fn to_planar(&self) -> (Vec<f32>, Vec<f32>) {
        let frames = self.valid_frames();
        (0..frames).map(|i| self.frame(i)).unzip()
    }
}
