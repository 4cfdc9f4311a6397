//! Clip mode flags, queued transitions and their resolution at bar boundaries.
//!
//! All flags live in [`ClipShared`] as atomics. The control side sets queue
//! flags at any time; the real-time side reads and clears them in `bar()`.
//! The reported [`GridState`] is derived from the flags on every call and is
//! never stored.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};

use atomic_float::AtomicF32;
use lg_ir::GridState;

/// Clip state visible to both the real-time and the control side.
#[derive(Debug)]
pub struct ClipShared {
    track: usize,
    scene: usize,

    loaded: AtomicBool,
    playing: AtomicBool,
    recording: AtomicBool,

    queue_play: AtomicBool,
    queue_stop: AtomicBool,
    queue_record: AtomicBool,

    in_transit: AtomicBool,
    save_requested: AtomicBool,
    /// Bumped by every reset; hand-offs from an older generation are stale.
    generation: AtomicU32,

    beats: AtomicU32,
    progress: AtomicF32,
    recordhead: AtomicUsize,
    capacity: AtomicUsize,
    length: AtomicUsize,
    dropped_frames: AtomicU64,
}

impl ClipShared {
    pub fn new(track: usize, scene: usize) -> Self {
        Self {
            track,
            scene,
            loaded: AtomicBool::new(false),
            playing: AtomicBool::new(false),
            recording: AtomicBool::new(false),
            queue_play: AtomicBool::new(false),
            queue_stop: AtomicBool::new(false),
            queue_record: AtomicBool::new(false),
            in_transit: AtomicBool::new(false),
            save_requested: AtomicBool::new(false),
            generation: AtomicU32::new(0),
            beats: AtomicU32::new(0),
            progress: AtomicF32::new(0.0),
            recordhead: AtomicUsize::new(0),
            capacity: AtomicUsize::new(0),
            length: AtomicUsize::new(0),
            dropped_frames: AtomicU64::new(0),
        }
    }

    pub fn track(&self) -> usize {
        self.track
    }

    pub fn scene(&self) -> usize {
        self.scene
    }

    // --- Control side ---

    /// Queue playback for the next bar. `false` withdraws a pending play.
    pub fn queue_play(&self, play: bool) {
        self.queue_play.store(play, Ordering::Release);
    }

    pub fn queue_stop(&self) {
        self.queue_stop.store(true, Ordering::Release);
    }

    /// Queue recording for the next bar.
    ///
    /// The flag stays pending until the clip has a store to record into.
    pub fn queue_record(&self) {
        self.queue_record.store(true, Ordering::Release);
    }

    /// Takes effect immediately; only changes how existing audio is stretched.
    pub fn set_beats(&self, beats: u32) {
        self.beats.store(beats, Ordering::Relaxed);
    }

    /// Ask the real-time side for a read lease of the store.
    pub fn request_save(&self) {
        self.save_requested.store(true, Ordering::Release);
    }

    /// Return to the empty state immediately.
    ///
    /// Clears every flag and bumps the generation, so any hand-off prepared
    /// before this call is rejected. The real-time side releases its store on
    /// its next call.
    pub fn reset(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.queue_play.store(false, Ordering::Release);
        self.queue_stop.store(false, Ordering::Release);
        self.queue_record.store(false, Ordering::Release);
        self.save_requested.store(false, Ordering::Release);
        self.clear_modes();
        self.beats.store(0, Ordering::Relaxed);
        self.publish_heads(0, 0, 0, 0.0);
    }

    // --- Readers, safe from any thread ---

    pub fn loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    pub fn playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    pub fn queue_play_pending(&self) -> bool {
        self.queue_play.load(Ordering::Acquire)
    }

    pub fn queue_stop_pending(&self) -> bool {
        self.queue_stop.load(Ordering::Acquire)
    }

    pub fn queue_record_pending(&self) -> bool {
        self.queue_record.load(Ordering::Acquire)
    }

    /// True between a capacity request and the adoption of the new store.
    pub fn new_buffer_in_transit(&self) -> bool {
        self.in_transit.load(Ordering::Acquire)
    }

    pub fn save_requested(&self) -> bool {
        self.save_requested.load(Ordering::Acquire)
    }

    pub fn generation(&self) -> u32 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn beats(&self) -> u32 {
        self.beats.load(Ordering::Relaxed)
    }

    /// Playback position as a fraction of the loop, 0 when not playing.
    pub fn progress(&self) -> f32 {
        self.progress.load(Ordering::Relaxed)
    }

    /// Frames recorded so far.
    pub fn buffer_length(&self) -> usize {
        self.recordhead.load(Ordering::Relaxed)
    }

    /// Capacity of the installed store in frames.
    pub fn audio_buffer_size(&self) -> usize {
        self.capacity.load(Ordering::Relaxed)
    }

    pub fn record_space_available(&self) -> usize {
        self.audio_buffer_size().saturating_sub(self.buffer_length())
    }

    /// Loop length in frames.
    pub fn length(&self) -> usize {
        self.length.load(Ordering::Relaxed)
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Read and zero the dropped-frame counter.
    pub fn take_dropped_frames(&self) -> u64 {
        self.dropped_frames.swap(0, Ordering::Relaxed)
    }

    /// Derive the reportable state from the flags.
    pub fn state(&self) -> GridState {
        let queue_stop = self.queue_stop_pending();
        let queue_play = self.queue_play_pending();
        let queue_record = self.queue_record_pending();

        if self.recording() {
            if queue_stop || queue_play {
                GridState::StopQueued
            } else {
                GridState::Recording
            }
        } else if self.playing() {
            if queue_stop {
                GridState::StopQueued
            } else if queue_record {
                GridState::RecordQueued
            } else {
                GridState::Playing
            }
        } else if queue_record {
            GridState::RecordQueued
        } else if self.loaded() {
            if queue_play {
                GridState::PlayQueued
            } else {
                GridState::Stopped
            }
        } else {
            GridState::Empty
        }
    }

    // --- Real-time side ---

    /// Claim the transit flag. Returns false when a request is already out.
    pub fn begin_transit(&self) -> bool {
        self.in_transit
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn end_transit(&self) {
        self.in_transit.store(false, Ordering::Release);
    }

    pub(crate) fn set_loaded(&self, loaded: bool) {
        self.loaded.store(loaded, Ordering::Release);
    }

    /// Leave playback. Recording is untouched.
    pub(crate) fn set_stopped(&self) {
        self.playing.store(false, Ordering::Release);
    }

    /// Enter playback; recording is cleared first so both are never set.
    pub(crate) fn set_playing(&self) {
        self.recording.store(false, Ordering::Release);
        self.playing.store(true, Ordering::Release);
    }

    /// Enter recording; playback is cleared first so both are never set.
    pub(crate) fn set_recording(&self) {
        self.playing.store(false, Ordering::Release);
        self.recording.store(true, Ordering::Release);
    }

    pub(crate) fn clear_recording(&self) {
        self.recording.store(false, Ordering::Release);
    }

    pub(crate) fn clear_modes(&self) {
        self.playing.store(false, Ordering::Release);
        self.recording.store(false, Ordering::Release);
        self.loaded.store(false, Ordering::Release);
        self.in_transit.store(false, Ordering::Release);
    }

    pub(crate) fn clear_save_request(&self) {
        self.save_requested.store(false, Ordering::Release);
    }

    pub(crate) fn add_beats(&self, beats: u32) {
        self.beats.fetch_add(beats, Ordering::Relaxed);
    }

    pub(crate) fn add_dropped_frames(&self, frames: u64) {
        self.dropped_frames.fetch_add(frames, Ordering::Relaxed);
    }

    pub(crate) fn set_progress(&self, progress: f32) {
        self.progress.store(progress, Ordering::Relaxed);
    }

    pub(crate) fn publish_heads(&self, recordhead: usize, capacity: usize, length: usize, progress: f32) {
        self.recordhead.store(recordhead, Ordering::Relaxed);
        self.capacity.store(capacity, Ordering::Relaxed);
        self.length.store(length, Ordering::Relaxed);
        self.progress.store(progress, Ordering::Relaxed);
    }
}

/// Mode change chosen at a bar boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Stop,
    Record,
    Play,
}

/// Pick and consume at most one queued transition, stop > record > play.
///
/// A flag is cleared only when it is acted on. A pending record on a clip
/// without a store blocks play for this bar and stays queued; a pending play
/// on an unloaded clip stays queued.
pub(crate) fn take_transition(shared: &ClipShared, has_store: bool) -> Option<Transition> {
    if shared.queue_stop.swap(false, Ordering::AcqRel) {
        return Some(Transition::Stop);
    }
    if shared.queue_record_pending() {
        if !has_store {
            return None;
        }
        shared.queue_record.store(false, Ordering::Release);
        return Some(Transition::Record);
    }
    if shared.queue_play_pending() && shared.loaded() {
        shared.queue_play.store(false, Ordering::Release);
        return Some(Transition::Play);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded() -> ClipShared {
        let shared = ClipShared::new(0, 0);
        shared.set_loaded(true);
        shared
    }

    #[test]
    fn new_clip_is_empty() {
        let shared = ClipShared::new(2, 3);
        assert_eq!(shared.state(), GridState::Empty);
        assert_eq!((shared.track(), shared.scene()), (2, 3));
    }

    #[test]
    fn stop_beats_record_beats_play() {
        let shared = loaded();
        shared.queue_play(true);
        shared.queue_record();
        shared.queue_stop();

        assert_eq!(take_transition(&shared, true), Some(Transition::Stop));
        assert!(shared.queue_record_pending());
        assert!(shared.queue_play_pending());

        assert_eq!(take_transition(&shared, true), Some(Transition::Record));
        assert!(shared.queue_play_pending());

        assert_eq!(take_transition(&shared, true), Some(Transition::Play));
        assert_eq!(take_transition(&shared, true), None);
    }

    #[test]
    fn record_waits_for_store_and_blocks_play() {
        let shared = loaded();
        shared.queue_record();
        shared.queue_play(true);
        assert_eq!(take_transition(&shared, false), None);
        assert!(shared.queue_record_pending());
        assert!(shared.queue_play_pending());
    }

    #[test]
    fn play_on_unloaded_clip_stays_pending() {
        let shared = ClipShared::new(0, 0);
        shared.queue_play(true);
        assert_eq!(take_transition(&shared, false), None);
        assert!(shared.queue_play_pending());
    }

    #[test]
    fn queue_play_false_withdraws() {
        let shared = loaded();
        shared.queue_play(true);
        shared.queue_play(false);
        assert_eq!(shared.state(), GridState::Stopped);
        assert_eq!(take_transition(&shared, true), None);
    }

    #[test]
    fn state_table() {
        let shared = loaded();
        assert_eq!(shared.state(), GridState::Stopped);
        shared.queue_play(true);
        assert_eq!(shared.state(), GridState::PlayQueued);
        shared.queue_record();
        assert_eq!(shared.state(), GridState::RecordQueued);

        take_transition(&shared, true);
        shared.set_recording();
        assert_eq!(shared.state(), GridState::StopQueued); // play still queued

        take_transition(&shared, true);
        shared.set_playing();
        assert_eq!(shared.state(), GridState::Playing);
        shared.queue_record();
        assert_eq!(shared.state(), GridState::RecordQueued);
        shared.queue_stop();
        assert_eq!(shared.state(), GridState::StopQueued);
    }

    #[test]
    fn mode_setters_never_overlap() {
        let shared = loaded();
        shared.set_playing();
        shared.set_recording();
        assert!(shared.recording() && !shared.playing());
        shared.set_playing();
        assert!(shared.playing() && !shared.recording());
    }

    #[test]
    fn begin_transit_only_once() {
        let shared = loaded();
        assert!(shared.begin_transit());
        assert!(!shared.begin_transit());
        shared.end_transit();
        assert!(shared.begin_transit());
    }

    #[test]
    fn reset_clears_everything_and_bumps_generation() {
        let shared = loaded();
        shared.set_recording();
        shared.queue_play(true);
        shared.set_beats(8);
        assert!(shared.begin_transit());

        shared.reset();
        assert_eq!(shared.generation(), 1);
        assert!(!shared.loaded());
        assert!(!shared.recording());
        assert!(!shared.new_buffer_in_transit());
        assert!(!shared.queue_play_pending());
        assert_eq!(shared.beats(), 0);
        assert_eq!(shared.state(), GridState::Empty);
    }

    #[test]
    fn dropped_frames_take_resets() {
        let shared = ClipShared::new(0, 0);
        shared.add_dropped_frames(7);
        assert_eq!(shared.take_dropped_frames(), 7);
        assert_eq!(shared.dropped_frames(), 0);
    }
}
