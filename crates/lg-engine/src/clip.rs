//! The per-cell looper clip.
//!
//! A `Clip` lives on the audio thread. It records into and plays from a
//! [`SampleStore`], resolves queued mode changes on bar boundaries, and
//! swaps in larger stores handed over by the non-real-time side as the
//! recording grows. Nothing here allocates, frees or blocks once the clip is
//! built.

use std::sync::Arc;

use heapless::Deque;
use lg_ir::{GridState, SampleStore};
use ringbuf::traits::{Consumer, Producer};

use crate::config::EngineConfig;
use crate::frame::Frame;
use crate::state::{take_transition, ClipShared, Transition};
use crate::transit::{self, ClipEvent, ClipPort, EventProducer, Handoff, HandoffConsumer};
use crate::transport::TimeObserver;

/// Retired stores held back while the event ring is full.
const RETIRE_BACKLOG: usize = 8;

/// Save and reset, the two things every persistable part of a session does.
pub trait Stately {
    /// Start saving; the snapshot arrives on the non-real-time side.
    fn save(&mut self);
    /// Drop back to the initial, empty state.
    fn reset(&mut self);
}

/// Real-time half of a grid cell.
pub struct Clip {
    shared: Arc<ClipShared>,
    store: Option<Arc<SampleStore>>,
    /// Generation the installed store belongs to.
    generation: u32,
    /// Bumped on every install and release; growth is only accepted for
    /// the store it was prepared from.
    epoch: u32,

    playhead: f64,
    recordhead: usize,
    /// Loop length in frames; 0 until the first take is committed.
    length: usize,

    beats_per_bar: u32,
    low_water: usize,

    handoffs: HandoffConsumer,
    events: EventProducer,
    retired: Deque<Arc<SampleStore>, RETIRE_BACKLOG>,
}

impl Clip {
    /// Build an empty clip and the port the non-real-time side drives it with.
    pub fn new(track: usize, scene: usize, config: &EngineConfig) -> (Clip, ClipPort) {
        let shared = Arc::new(ClipShared::new(track, scene));
        let ((handoff_tx, handoff_rx), (event_tx, event_rx)) = transit::rings();
        let clip = Clip {
            shared: Arc::clone(&shared),
            store: None,
            generation: 0,
            epoch: 0,
            playhead: 0.0,
            recordhead: 0,
            length: 0,
            beats_per_bar: config.beats_per_bar,
            low_water: config.low_water_frames,
            handoffs: handoff_rx,
            events: event_tx,
            retired: Deque::new(),
        };
        let port = ClipPort::new(shared, handoff_tx, event_rx, config.channels);
        (clip, port)
    }

    pub fn shared(&self) -> &Arc<ClipShared> {
        &self.shared
    }

    pub fn track(&self) -> usize {
        self.shared.track()
    }

    pub fn scene(&self) -> usize {
        self.shared.scene()
    }

    // --- Hand-off processing ---

    /// Apply resets and install delivered stores.
    ///
    /// Runs at the top of every real-time entry point. The engine also calls
    /// it once per block so idle clips release and adopt stores promptly.
    pub fn poll(&mut self) {
        let generation = self.shared.generation();
        if generation != self.generation {
            self.generation = generation;
            self.release();
        }
        while let Some(handoff) = self.handoffs.try_pop() {
            self.set_requested_buffer(handoff);
        }
        self.flush_retired();
        if self.shared.save_requested() {
            self.save();
        }
    }

    /// Install a store delivered by the non-real-time side.
    ///
    /// Hand-offs from before the last reset are retired untouched. One from
    /// a reset this clip has not seen yet applies that reset first. A grown
    /// store is retired unless it was prepared from the installed store.
    pub fn set_requested_buffer(&mut self, handoff: Handoff) {
        let generation = handoff.generation();
        if generation < self.generation {
            self.retire(handoff.into_store());
            return;
        }
        if generation > self.generation {
            self.generation = generation;
            self.release();
        }
        match handoff {
            Handoff::Load { store, .. } => self.install_loaded(store),
            Handoff::Grow {
                store,
                epoch,
                copied,
                ..
            } => {
                if epoch == self.epoch && self.store.is_some() {
                    self.install_grown(store, copied);
                } else {
                    self.retire(store);
                }
            }
        }
    }

    /// Attach audio directly, from the thread that owns the clip.
    pub fn load(&mut self, store: Arc<SampleStore>) {
        self.poll();
        self.install_loaded(store);
    }

    fn install_loaded(&mut self, store: Arc<SampleStore>) {
        let valid = store.valid_frames();
        if let Some(old) = self.store.replace(store) {
            self.retire(old);
        }
        self.epoch = self.epoch.wrapping_add(1);
        self.playhead = 0.0;
        self.recordhead = valid;
        self.length = valid;
        // the take being recorded belonged to the replaced audio
        self.shared.clear_recording();
        self.shared.set_loaded(true);
        self.shared.end_transit();
        self.publish();
    }

    fn install_grown(&mut self, grown: Arc<SampleStore>, copied: usize) {
        if let Some(old) = self.store.take() {
            // frames written after the copy was taken
            grown.copy_range_from(&old, copied..self.recordhead);
            self.retire(old);
        }
        grown.set_valid_frames(self.recordhead);
        self.epoch = self.epoch.wrapping_add(1);
        self.store = Some(grown);
        self.shared.end_transit();
        self.publish();
    }

    /// Let go of the store after a reset.
    fn release(&mut self) {
        if let Some(old) = self.store.take() {
            self.retire(old);
        }
        self.epoch = self.epoch.wrapping_add(1);
        self.playhead = 0.0;
        self.recordhead = 0;
        self.length = 0;
        self.shared.clear_modes();
        self.publish();
    }

    fn retire(&mut self, store: Arc<SampleStore>) {
        if let Err(event) = self.events.try_push(ClipEvent::Retired(store)) {
            if let ClipEvent::Retired(store) = event {
                if let Err(store) = self.retired.push_back(store) {
                    // leak rather than free on the audio thread
                    core::mem::forget(store);
                }
            }
        }
    }

    fn flush_retired(&mut self) {
        while let Some(store) = self.retired.pop_front() {
            if let Err(event) = self.events.try_push(ClipEvent::Retired(store)) {
                if let ClipEvent::Retired(store) = event {
                    let _ = self.retired.push_front(store);
                }
                break;
            }
        }
    }

    fn request_growth(&mut self) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        if !self.shared.begin_transit() {
            return;
        }
        let event = ClipEvent::Grow {
            generation: self.generation,
            epoch: self.epoch,
            current: Arc::clone(store),
            min_capacity: self.recordhead + 2 * self.low_water,
        };
        if self.events.try_push(event).is_err() {
            self.shared.end_transit();
        }
    }

    fn publish(&self) {
        let capacity = self.store.as_ref().map_or(0, |s| s.capacity());
        self.shared
            .publish_heads(self.recordhead, capacity, self.length, self.progress());
    }

    // --- Real-time audio ---

    /// Next output frame, advancing the playhead by `speed`.
    ///
    /// `speed` may be negative or fractional. Silent when not playing, when
    /// there is no loop yet, or when `speed` is not finite.
    pub fn get_sample(&mut self, speed: f32) -> Frame {
        self.poll();
        if !speed.is_finite() || !self.shared.playing() {
            return Frame::silence();
        }
        let Some(store) = self.store.as_ref() else {
            return Frame::silence();
        };
        let length = self.length.min(store.capacity());
        if length == 0 {
            return Frame::silence();
        }

        // f64 keeps unit steps exact far past 2^24 frames
        let len = length as f64;
        let pos = self.playhead.rem_euclid(len);
        let index = (pos as usize).min(length - 1);
        let frac = (pos - index as f64) as f32;
        let next = if index + 1 >= length { 0 } else { index + 1 };
        let (l0, r0) = store.frame(index);
        let (l1, r1) = store.frame(next);
        let out = Frame::lerp(Frame::new(l0, r0), Frame::new(l1, r1), frac);

        let mut advanced = (pos + speed as f64).rem_euclid(len);
        if advanced >= len {
            advanced = 0.0;
        }
        self.playhead = advanced;
        self.shared.set_progress((advanced / len) as f32);
        out
    }

    /// Append `count` frames of input. Returns the frames actually written.
    ///
    /// Writes only what fits in the current store and counts the rest as
    /// dropped. Asks for a bigger store once the remaining space falls under
    /// the low-water mark. Invalid input writes nothing.
    pub fn record(&mut self, count: usize, left: &[f32], right: &[f32]) -> usize {
        if count == 0 || left.len() < count || right.len() < count {
            return 0;
        }
        self.poll();
        if !self.shared.recording() {
            return 0;
        }
        let Some(store) = self.store.as_ref() else {
            return 0;
        };

        let space = store.space_from(self.recordhead);
        let written = count.min(space);
        for i in 0..written {
            store.write_frame(self.recordhead + i, left[i], right[i]);
        }
        self.recordhead += written;
        store.set_valid_frames(self.recordhead);

        if written < count {
            self.shared.add_dropped_frames((count - written) as u64);
        }
        if space - written < self.low_water {
            self.request_growth();
        }
        self.publish();
        written
    }

    /// Playback rate that fits the loop into its beats at `frames_per_beat`.
    pub fn stretch_speed(&self, frames_per_beat: u64) -> f32 {
        let beats = self.shared.beats();
        if beats == 0 || self.length == 0 || frames_per_beat == 0 {
            return 1.0;
        }
        self.length as f32 / (beats as f64 * frames_per_beat as f64) as f32
    }

    // --- Mode changes ---

    fn commit_take(&mut self) {
        self.shared.clear_recording();
        if self.length == 0 {
            self.length = self.recordhead;
        }
    }

    fn apply(&mut self, transition: Transition) {
        match transition {
            Transition::Stop => {
                if self.shared.recording() {
                    self.commit_take();
                }
                self.shared.set_stopped();
            }
            Transition::Record => {
                if !self.shared.recording() {
                    self.shared.set_recording();
                }
            }
            Transition::Play => {
                if self.shared.recording() {
                    self.commit_take();
                }
                self.playhead = 0.0;
                self.shared.set_playing();
            }
        }
    }

    // --- Accessors ---

    pub fn state(&self) -> GridState {
        self.shared.state()
    }

    pub fn playing(&self) -> bool {
        self.shared.playing()
    }

    pub fn recording(&self) -> bool {
        self.shared.recording()
    }

    pub fn loaded(&self) -> bool {
        self.shared.loaded()
    }

    pub fn queue_play(&self, play: bool) {
        self.shared.queue_play(play);
    }

    pub fn queue_stop(&self) {
        self.shared.queue_stop();
    }

    pub fn queue_record(&self) {
        self.shared.queue_record();
    }

    pub fn set_beats(&self, beats: u32) {
        self.shared.set_beats(beats);
    }

    pub fn beats(&self) -> u32 {
        self.shared.beats()
    }

    pub fn progress(&self) -> f32 {
        if self.length == 0 || !self.shared.playing() {
            return 0.0;
        }
        (self.playhead / self.length as f64) as f32
    }

    pub fn playhead(&self) -> f64 {
        self.playhead
    }

    /// Frames recorded so far.
    pub fn buffer_length(&self) -> usize {
        self.recordhead
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Capacity of the installed store.
    pub fn audio_buffer_size(&self) -> usize {
        self.store.as_ref().map_or(0, |s| s.capacity())
    }

    pub fn record_space_available(&self) -> usize {
        self.store.as_ref().map_or(0, |s| s.space_from(self.recordhead))
    }

    pub fn new_buffer_in_transit(&self) -> bool {
        self.shared.new_buffer_in_transit()
    }

    /// Read one frame of the installed store.
    pub fn frame_at(&self, index: usize) -> Option<(f32, f32)> {
        let store = self.store.as_ref()?;
        (index < store.valid_frames()).then(|| store.frame(index))
    }
}

impl TimeObserver for Clip {
    /// Bar boundary: count recorded bars, then apply one queued transition.
    fn bar(&mut self) {
        self.poll();
        if self.shared.recording() && self.length == 0 {
            self.shared.add_beats(self.beats_per_bar);
        }
        if let Some(transition) = take_transition(&self.shared, self.store.is_some()) {
            self.apply(transition);
        }
        self.publish();
    }
}

impl Stately for Clip {
    /// Send a read lease of the store for the non-real-time side to copy.
    fn save(&mut self) {
        let event = ClipEvent::SaveLease {
            generation: self.generation,
            store: self.store.clone(),
            length: self.length,
            beats: self.shared.beats(),
        };
        if self.events.try_push(event).is_ok() {
            self.shared.clear_save_request();
        } else {
            // retried on the next poll
            self.shared.request_save();
        }
    }

    fn reset(&mut self) {
        self.shared.reset();
        self.generation = self.shared.generation();
        self.release();
    }
}

impl core::fmt::Debug for Clip {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Clip")
            .field("track", &self.track())
            .field("scene", &self.scene())
            .field("state", &self.state())
            .field("recordhead", &self.recordhead)
            .field("length", &self.length)
            .finish()
    }
}
