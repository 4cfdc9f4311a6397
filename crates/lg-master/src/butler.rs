//! Non-real-time servicing of clip ports.
//!
//! The butler owns the non-real-time end of every clip: it allocates first
//! stores, prepares grown stores, frees retired ones and turns save leases
//! into snapshots. It runs inline between offline render blocks, or on its
//! own thread during live playback.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use lg_engine::{ClipPort, SampleStore, SaveSnapshot};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Requests from the control side to the butler thread.
#[derive(Debug)]
pub enum ButlerCommand {
    /// Hand existing audio to a clip.
    Load {
        track: usize,
        scene: usize,
        store: SampleStore,
    },
    /// Give an empty clip its first store.
    Allocate { track: usize, scene: usize },
    /// Ask a clip for a save lease.
    Save { track: usize, scene: usize },
    Shutdown,
}

/// Totals from one [`Butler::service`] pass over all ports.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ButlerReport {
    pub grown: usize,
    pub retired: usize,
    pub stale: usize,
    pub saved: usize,
    pub dropped_frames: u64,
}

pub struct Butler {
    ports: Vec<ClipPort>,
    scenes: usize,
    initial_capacity: usize,
    snapshots: Vec<SaveSnapshot>,
}

impl Butler {
    /// `ports` are in the engine's row-major order.
    pub fn new(ports: Vec<ClipPort>, scenes: usize, initial_capacity: usize) -> Self {
        Self {
            ports,
            scenes,
            initial_capacity,
            snapshots: Vec::new(),
        }
    }

    fn port(&mut self, track: usize, scene: usize) -> Option<&mut ClipPort> {
        if scene >= self.scenes {
            return None;
        }
        self.ports.get_mut(track * self.scenes + scene)
    }

    /// Send audio to a clip. Returns false if the clip does not exist or
    /// its hand-off ring is full.
    pub fn load(&mut self, track: usize, scene: usize, store: SampleStore) -> bool {
        let frames = store.valid_frames();
        let Some(port) = self.port(track, scene) else {
            return false;
        };
        match port.load(store) {
            Ok(()) => {
                log::info!("clip {}/{}: loaded {} frames", track, scene, frames);
                true
            }
            Err(_) => {
                log::warn!("clip {}/{}: hand-off ring full, load dropped", track, scene);
                false
            }
        }
    }

    pub fn allocate(&mut self, track: usize, scene: usize) -> bool {
        let capacity = self.initial_capacity;
        let Some(port) = self.port(track, scene) else {
            return false;
        };
        match port.allocate(capacity) {
            Ok(()) => {
                log::debug!("clip {}/{}: allocated {} frames", track, scene, capacity);
                true
            }
            Err(_) => {
                log::warn!("clip {}/{}: hand-off ring full, allocation dropped", track, scene);
                false
            }
        }
    }

    pub fn request_save(&mut self, track: usize, scene: usize) -> bool {
        let Some(port) = self.port(track, scene) else {
            return false;
        };
        port.shared().request_save();
        true
    }

    /// Run one command. Returns false on shutdown.
    pub fn execute(&mut self, command: ButlerCommand) -> bool {
        match command {
            ButlerCommand::Load {
                track,
                scene,
                store,
            } => {
                self.load(track, scene, store);
            }
            ButlerCommand::Allocate { track, scene } => {
                self.allocate(track, scene);
            }
            ButlerCommand::Save { track, scene } => {
                self.request_save(track, scene);
            }
            ButlerCommand::Shutdown => return false,
        }
        true
    }

    /// Drain every port once.
    pub fn service(&mut self) -> ButlerReport {
        let mut total = ButlerReport::default();
        for port in &mut self.ports {
            let report = port.service();
            total.grown += report.grown;
            total.retired += report.retired;
            total.stale += report.stale;
            total.saved += report.snapshots.len();

            let shared = port.shared();
            let dropped = shared.take_dropped_frames();
            if dropped > 0 {
                log::warn!(
                    "clip {}/{}: {} input frames dropped waiting for a larger buffer",
                    shared.track(),
                    shared.scene(),
                    dropped
                );
                total.dropped_frames += dropped;
            }
            if report.stale > 0 {
                log::debug!(
                    "clip {}/{}: {} stale requests ignored after reset",
                    shared.track(),
                    shared.scene(),
                    report.stale
                );
            }
            for snapshot in report.snapshots {
                log::info!(
                    "clip {}/{}: saved {} frames, {} beats",
                    snapshot.track,
                    snapshot.scene,
                    snapshot.length,
                    snapshot.beats
                );
                self.snapshots.push(snapshot);
            }
        }
        total
    }

    /// Snapshots collected since the last call.
    pub fn take_snapshots(&mut self) -> Vec<SaveSnapshot> {
        std::mem::take(&mut self.snapshots)
    }

    /// Move the butler onto its own thread.
    ///
    /// Ports are serviced every `poll`, and immediately after each command.
    /// Snapshots are forwarded on `snapshots`. The thread exits on
    /// [`ButlerCommand::Shutdown`] or when every command sender is gone.
    pub fn spawn(
        mut self,
        commands: Receiver<ButlerCommand>,
        snapshots: Sender<SaveSnapshot>,
        poll: Duration,
    ) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("loopgrid-butler".into())
            .spawn(move || {
                log::debug!("butler started, polling every {:?}", poll);
                loop {
                    match commands.recv_timeout(poll) {
                        Ok(command) => {
                            if !self.execute(command) {
                                break;
                            }
                        }
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                    self.service();
                    for snapshot in self.take_snapshots() {
                        if snapshots.send(snapshot).is_err() {
                            log::warn!("snapshot receiver gone, save discarded");
                        }
                    }
                }
                // free whatever the clips sent back last
                self.service();
                log::debug!("butler stopped");
            })
    }
}
