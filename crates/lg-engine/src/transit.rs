//! Store hand-off between the real-time clip and the non-real-time side.
//!
//! Each clip owns two single-producer single-consumer rings:
//!
//! - hand-offs, non-real-time → clip: new stores to install (a first load,
//!   or a grown copy of the current store);
//! - events, clip → non-real-time: growth requests, read leases for saving,
//!   and retired stores to be freed.
//!
//! The clip never allocates or frees a store. It swaps an `Arc` it was
//! handed and sends the old one back, so the last reference to any store is
//! always dropped on the non-real-time side.

use std::sync::Arc;

use lg_ir::SampleStore;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::state::ClipShared;

/// Pending hand-offs a clip can hold before delivery fails.
pub const HANDOFF_SLOTS: usize = 4;

/// Pending events a clip can hold before it backs off.
pub const EVENT_SLOTS: usize = 32;

/// A store on its way to the clip.
#[derive(Debug)]
pub enum Handoff {
    /// Replace whatever the clip holds; its valid frames become the loop.
    Load {
        generation: u32,
        store: Arc<SampleStore>,
    },
    /// A larger copy of the current store. Frames `[0, copied)` are already
    /// in it; the clip replays anything written after that on install.
    /// `epoch` names the store it was copied from.
    Grow {
        generation: u32,
        epoch: u32,
        store: Arc<SampleStore>,
        copied: usize,
    },
}

impl Handoff {
    pub fn generation(&self) -> u32 {
        match self {
            Handoff::Load { generation, .. } | Handoff::Grow { generation, .. } => *generation,
        }
    }

    pub fn into_store(self) -> Arc<SampleStore> {
        match self {
            Handoff::Load { store, .. } | Handoff::Grow { store, .. } => store,
        }
    }
}

/// Something the clip needs the non-real-time side to do.
#[derive(Debug)]
pub enum ClipEvent {
    /// Record space is low. `current` is a read lease of the active store.
    Grow {
        generation: u32,
        epoch: u32,
        current: Arc<SampleStore>,
        min_capacity: usize,
    },
    /// A store the clip no longer uses. Dropping it frees the memory.
    Retired(Arc<SampleStore>),
    /// Answer to a save request. `store` is `None` for an empty clip.
    SaveLease {
        generation: u32,
        store: Option<Arc<SampleStore>>,
        length: usize,
        beats: u32,
    },
}

/// Persistable copy of a clip, detached from the live store.
#[derive(Debug)]
pub struct SaveSnapshot {
    pub track: usize,
    pub scene: usize,
    pub beats: u32,
    /// Loop length in frames.
    pub length: usize,
    /// `None` when the clip was empty.
    pub store: Option<SampleStore>,
}

pub(crate) type HandoffProducer = HeapProd<Handoff>;
pub(crate) type HandoffConsumer = HeapCons<Handoff>;
pub(crate) type EventProducer = HeapProd<ClipEvent>;
pub(crate) type EventConsumer = HeapCons<ClipEvent>;

/// Allocate both rings for one clip.
pub(crate) fn rings() -> ((HandoffProducer, HandoffConsumer), (EventProducer, EventConsumer)) {
    (
        HeapRb::<Handoff>::new(HANDOFF_SLOTS).split(),
        HeapRb::<ClipEvent>::new(EVENT_SLOTS).split(),
    )
}

/// Build a larger copy of `current` holding everything written so far.
///
/// Capacity at least doubles, so a recording of any length goes through
/// O(log n) transitions. Returns the new store and the number of frames
/// copied; the clip replays frames past that point when it installs it.
pub fn prepare_growth(current: &SampleStore, min_capacity: usize) -> (SampleStore, usize) {
    let capacity = current.capacity().saturating_mul(2).max(min_capacity).max(1);
    let grown = SampleStore::new(current.channels(), capacity);
    let copied = current.valid_frames();
    grown.copy_range_from(current, 0..copied);
    grown.set_valid_frames(copied);
    (grown, copied)
}

/// Copy a leased store into a standalone snapshot for saving.
pub fn receive_save_buffer(lease: &SampleStore) -> SampleStore {
    let frames = lease.valid_frames();
    let copy = SampleStore::new(lease.channels(), frames);
    copy.copy_range_from(lease, 0..frames);
    copy.set_valid_frames(frames);
    copy
}

/// What one [`ClipPort::service`] pass did.
#[derive(Debug, Default)]
pub struct PortReport {
    pub grown: usize,
    pub retired: usize,
    /// Requests dropped because a reset happened since they were raised.
    pub stale: usize,
    pub snapshots: Vec<SaveSnapshot>,
}

/// The non-real-time end of a clip's rings.
pub struct ClipPort {
    shared: Arc<ClipShared>,
    handoffs: HandoffProducer,
    events: EventConsumer,
    channels: u16,
}

impl ClipPort {
    pub(crate) fn new(
        shared: Arc<ClipShared>,
        handoffs: HandoffProducer,
        events: EventConsumer,
        channels: u16,
    ) -> Self {
        Self {
            shared,
            handoffs,
            events,
            channels,
        }
    }

    pub fn shared(&self) -> &Arc<ClipShared> {
        &self.shared
    }

    /// Send a store to the clip. Gives it back if the ring is full.
    pub fn deliver(&mut self, handoff: Handoff) -> Result<(), Handoff> {
        self.handoffs.try_push(handoff)
    }

    /// Hand the clip a store with existing audio.
    pub fn load(&mut self, store: SampleStore) -> Result<(), Handoff> {
        self.deliver(Handoff::Load {
            generation: self.shared.generation(),
            store: Arc::new(store),
        })
    }

    /// Give an empty clip its first, silent store.
    pub fn allocate(&mut self, capacity: usize) -> Result<(), Handoff> {
        self.load(SampleStore::new(self.channels, capacity))
    }

    pub fn next_event(&mut self) -> Option<ClipEvent> {
        self.events.try_pop()
    }

    /// Drain the clip's events: prepare growth, free retired stores and
    /// turn save leases into snapshots.
    pub fn service(&mut self) -> PortReport {
        let mut report = PortReport::default();
        while let Some(event) = self.next_event() {
            match event {
                ClipEvent::Grow {
                    generation,
                    epoch,
                    current,
                    min_capacity,
                } => {
                    if generation != self.shared.generation() {
                        report.stale += 1;
                        continue;
                    }
                    let (grown, copied) = prepare_growth(&current, min_capacity);
                    log::debug!(
                        "clip {}/{}: grow {} -> {} frames ({} copied)",
                        self.shared.track(),
                        self.shared.scene(),
                        current.capacity(),
                        grown.capacity(),
                        copied
                    );
                    drop(current);
                    let handoff = Handoff::Grow {
                        generation,
                        epoch,
                        store: Arc::new(grown),
                        copied,
                    };
                    if self.deliver(handoff).is_err() {
                        // let the clip ask again on its next block
                        self.shared.end_transit();
                        log::warn!(
                            "clip {}/{}: hand-off ring full, growth deferred",
                            self.shared.track(),
                            self.shared.scene()
                        );
                    } else {
                        report.grown += 1;
                    }
                }
                ClipEvent::Retired(store) => {
                    drop(store);
                    report.retired += 1;
                }
                ClipEvent::SaveLease {
                    generation,
                    store,
                    length,
                    beats,
                } => {
                    if generation != self.shared.generation() {
                        report.stale += 1;
                        continue;
                    }
                    report.snapshots.push(SaveSnapshot {
                        track: self.shared.track(),
                        scene: self.shared.scene(),
                        beats,
                        length,
                        store: store.as_deref().map(receive_save_buffer),
                    });
                }
            }
        }
        report
    }
}

impl core::fmt::Debug for ClipPort {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ClipPort")
            .field("track", &self.shared.track())
            .field("scene", &self.shared.scene())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(capacity: usize, frames: usize) -> SampleStore {
        let store = SampleStore::new(2, capacity);
        for i in 0..frames {
            store.write_frame(i, i as f32, -(i as f32));
        }
        store.set_valid_frames(frames);
        store
    }

    #[test]
    fn growth_at_least_doubles() {
        let (grown, copied) = prepare_growth(&filled(8, 6), 0);
        assert_eq!(grown.capacity(), 16);
        assert_eq!(copied, 6);
        assert_eq!(grown.valid_frames(), 6);
        assert_eq!(grown.frame(5), (5.0, -5.0));
        assert_eq!(grown.frame(6), (0.0, 0.0));
    }

    #[test]
    fn growth_honours_min_capacity() {
        let (grown, _) = prepare_growth(&filled(8, 8), 100);
        assert_eq!(grown.capacity(), 100);
    }

    #[test]
    fn growth_from_zero_capacity() {
        let (grown, copied) = prepare_growth(&SampleStore::new(2, 0), 0);
        assert_eq!(grown.capacity(), 1);
        assert_eq!(copied, 0);
    }

    #[test]
    fn save_copy_is_trimmed_to_valid_frames() {
        let copy = receive_save_buffer(&filled(16, 5));
        assert_eq!(copy.capacity(), 5);
        assert_eq!(copy.valid_frames(), 5);
        assert_eq!(copy.frame(4), (4.0, -4.0));
    }

    #[test]
    fn handoff_accessors() {
        let h = Handoff::Grow {
            generation: 3,
            epoch: 1,
            store: Arc::new(SampleStore::new(1, 2)),
            copied: 0,
        };
        assert_eq!(h.generation(), 3);
        assert_eq!(h.into_store().capacity(), 2);
    }

    #[test]
    fn deliver_fails_when_ring_full() {
        let ((prod, _cons), (_eprod, econs)) = rings();
        let mut port = ClipPort::new(Arc::new(ClipShared::new(0, 0)), prod, econs, 2);
        for _ in 0..HANDOFF_SLOTS {
            assert!(port.allocate(4).is_ok());
        }
        assert!(port.allocate(4).is_err());
    }
}
