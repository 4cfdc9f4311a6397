//! Headless controller for loopgrid.
//!
//! Owns a grid session and exposes the control surface a UI or CLI drives:
//! queueing clips, loading and saving audio, tempo, and either offline
//! rendering or live duplex audio.

mod butler;
mod config;
mod wav;

use atomic_float::AtomicF32;
use crossbeam_channel::{Receiver, Sender};
use lg_audio::{AudioBackend, CpalDuplex};
use lg_engine::{ClipShared, Engine, BLOCK_SIZE};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;

// Re-export common types so callers don't need lg-engine directly.
pub use butler::{Butler, ButlerCommand, ButlerReport};
pub use config::{ConfigError, LoopgridConfig};
pub use lg_audio::AudioError;
pub use lg_engine::{EngineConfig, Frame, GridState, MusicalTime, SampleStore, SaveSnapshot};

pub use wav::{frames_to_wav, write_wav};

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("no clip at track {track}, scene {scene}")]
    NoSuchClip { track: usize, scene: usize },
    #[error("offline rendering is not available once live audio has started")]
    Live,
    #[error(transparent)]
    Audio(#[from] AudioError),
    #[error("cannot start butler thread: {0}")]
    Thread(#[from] std::io::Error),
}

/// Point-in-time view of one clip for display.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClipStatus {
    pub state: GridState,
    pub beats: u32,
    /// Loop length in frames
    pub length: usize,
    /// Frames recorded so far
    pub buffer_length: usize,
    /// Capacity of the clip's store
    pub audio_buffer_size: usize,
    /// Playback position within the loop, 0..1
    pub progress: f32,
    pub new_buffer_in_transit: bool,
}

impl ClipStatus {
    fn read(shared: &ClipShared) -> Self {
        Self {
            state: shared.state(),
            beats: shared.beats(),
            length: shared.length(),
            buffer_length: shared.buffer_length(),
            audio_buffer_size: shared.audio_buffer_size(),
            progress: shared.progress(),
            new_buffer_in_transit: shared.new_buffer_in_transit(),
        }
    }
}

/// Grid controller. Starts offline; [`Controller::start_live`] hands the
/// engine to the audio device and the butler to its own thread.
pub struct Controller {
    config: LoopgridConfig,
    clips: Vec<Arc<ClipShared>>,
    bpm: Arc<AtomicF32>,
    offline: Option<Offline>,
    live: Option<LiveSession>,
    dropped_frames: u64,
}

struct Offline {
    engine: Engine,
    butler: Butler,
}

struct LiveSession {
    backend: CpalDuplex,
    commands: Sender<ButlerCommand>,
    snapshots: Receiver<SaveSnapshot>,
    butler: Option<JoinHandle<()>>,
}

impl Controller {
    pub fn new(config: LoopgridConfig) -> Self {
        let (engine, ports) = Engine::new(config.tracks, config.scenes, &config.engine);
        let clips = ports.iter().map(|port| Arc::clone(port.shared())).collect();
        let butler = Butler::new(ports, config.scenes, config.engine.initial_capacity_frames);
        Self {
            bpm: Arc::new(AtomicF32::new(engine.transport().bpm())),
            config,
            clips,
            offline: Some(Offline { engine, butler }),
            live: None,
            dropped_frames: 0,
        }
    }

    pub fn config(&self) -> &LoopgridConfig {
        &self.config
    }

    pub fn tracks(&self) -> usize {
        self.config.tracks
    }

    pub fn scenes(&self) -> usize {
        self.config.scenes
    }

    pub fn is_live(&self) -> bool {
        self.live.is_some()
    }

    fn shared(&self, track: usize, scene: usize) -> Result<&Arc<ClipShared>, ControllerError> {
        if track >= self.config.tracks || scene >= self.config.scenes {
            return Err(ControllerError::NoSuchClip { track, scene });
        }
        Ok(&self.clips[track * self.config.scenes + scene])
    }

    fn send(&mut self, command: ButlerCommand) {
        if let Some(live) = &self.live {
            if live.commands.send(command).is_err() {
                log::error!("butler thread is gone, command dropped");
            }
        } else if let Some(offline) = &mut self.offline {
            offline.butler.execute(command);
        }
    }

    // --- Clip control ---

    pub fn queue_play(&mut self, track: usize, scene: usize) -> Result<(), ControllerError> {
        self.shared(track, scene)?.queue_play(true);
        Ok(())
    }

    /// Withdraw a queued play that has not happened yet.
    pub fn cancel_play(&mut self, track: usize, scene: usize) -> Result<(), ControllerError> {
        self.shared(track, scene)?.queue_play(false);
        Ok(())
    }

    pub fn queue_stop(&mut self, track: usize, scene: usize) -> Result<(), ControllerError> {
        self.shared(track, scene)?.queue_stop();
        Ok(())
    }

    /// Queue recording. An empty clip gets its first store on the way.
    pub fn queue_record(&mut self, track: usize, scene: usize) -> Result<(), ControllerError> {
        let shared = Arc::clone(self.shared(track, scene)?);
        let needs_store = !shared.loaded() && !shared.queue_record_pending();
        shared.queue_record();
        if needs_store {
            self.send(ButlerCommand::Allocate { track, scene });
        }
        Ok(())
    }

    /// Empty the clip immediately.
    pub fn reset(&mut self, track: usize, scene: usize) -> Result<(), ControllerError> {
        self.shared(track, scene)?.reset();
        Ok(())
    }

    pub fn set_beats(&mut self, track: usize, scene: usize, beats: u32) -> Result<(), ControllerError> {
        self.shared(track, scene)?.set_beats(beats);
        Ok(())
    }

    /// Replace the clip's audio. Takes effect on the clip's next block.
    pub fn load(&mut self, track: usize, scene: usize, store: SampleStore) -> Result<(), ControllerError> {
        self.shared(track, scene)?;
        self.send(ButlerCommand::Load {
            track,
            scene,
            store,
        });
        Ok(())
    }

    /// Ask for a snapshot; collect it with [`Controller::take_snapshots`].
    pub fn save(&mut self, track: usize, scene: usize) -> Result<(), ControllerError> {
        self.shared(track, scene)?;
        self.send(ButlerCommand::Save { track, scene });
        Ok(())
    }

    /// Snapshots that have arrived since the last call.
    ///
    /// Offline, pending save requests are answered first.
    pub fn take_snapshots(&mut self) -> Vec<SaveSnapshot> {
        if let Some(live) = &self.live {
            return live.snapshots.try_iter().collect();
        }
        let Some(offline) = &mut self.offline else {
            return Vec::new();
        };
        offline.engine.process(&[], &mut []);
        self.dropped_frames += offline.butler.service().dropped_frames;
        offline.butler.take_snapshots()
    }

    pub fn state(&self, track: usize, scene: usize) -> Result<GridState, ControllerError> {
        Ok(self.shared(track, scene)?.state())
    }

    pub fn clip_status(&self, track: usize, scene: usize) -> Result<ClipStatus, ControllerError> {
        Ok(ClipStatus::read(self.shared(track, scene)?))
    }

    /// Tempo change; live sessions pick it up on the next audio callback.
    pub fn set_bpm(&mut self, bpm: f32) {
        if !bpm.is_finite() || bpm <= 0.0 {
            log::warn!("ignoring invalid tempo {}", bpm);
            return;
        }
        self.bpm.store(bpm, Ordering::Relaxed);
        if let Some(offline) = &mut self.offline {
            offline.engine.set_bpm(bpm);
        }
    }

    pub fn bpm(&self) -> f32 {
        self.bpm.load(Ordering::Relaxed)
    }

    /// Input frames lost to a full store during offline rendering.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    // --- Offline rendering ---

    /// Render one output frame per input frame, servicing the butler after
    /// every block. Deterministic for a given input and command sequence.
    pub fn render_offline(&mut self, input: &[Frame]) -> Result<Vec<Frame>, ControllerError> {
        let offline = self.offline.as_mut().ok_or(ControllerError::Live)?;
        let mut output = vec![Frame::silence(); input.len()];
        for (inp, out) in input.chunks(BLOCK_SIZE).zip(output.chunks_mut(BLOCK_SIZE)) {
            offline.engine.process(inp, out);
            self.dropped_frames += offline.butler.service().dropped_frames;
        }
        Ok(output)
    }

    /// Render `frames` frames of output with silent input.
    pub fn render_silence(&mut self, frames: usize) -> Result<Vec<Frame>, ControllerError> {
        self.render_offline(&vec![Frame::silence(); frames])
    }

    /// Frames left until the next bar boundary, offline only.
    pub fn frames_until_bar(&self) -> Option<usize> {
        self.offline
            .as_ref()
            .map(|offline| offline.engine.transport().frames_until_bar())
    }

    /// Transport position, offline only.
    pub fn position(&self) -> Option<MusicalTime> {
        self.offline
            .as_ref()
            .map(|offline| offline.engine.transport().position())
    }

    // --- Live audio ---

    /// Open the default devices and start duplex audio.
    ///
    /// The engine follows the device sample rate. Offline rendering is no
    /// longer available afterwards.
    pub fn start_live(&mut self) -> Result<(), ControllerError> {
        if self.live.is_some() {
            return Ok(());
        }
        let mut backend = CpalDuplex::open()?;
        let Offline { mut engine, butler } = self.offline.take().ok_or(ControllerError::Live)?;

        let rate = backend.sample_rate();
        if rate != self.config.engine.sample_rate {
            log::info!(
                "device runs at {} Hz, configured {} Hz; following the device",
                rate,
                self.config.engine.sample_rate
            );
            engine.set_sample_rate(rate);
        }

        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let (snapshot_tx, snapshot_rx) = crossbeam_channel::unbounded();
        let poll = Duration::from_millis(self.config.butler_poll_ms.max(1));
        let handle = butler.spawn(command_rx, snapshot_tx, poll)?;

        let mut live = LiveSession {
            backend,
            commands: command_tx,
            snapshots: snapshot_rx,
            butler: Some(handle),
        };
        if let Err(e) = live
            .backend
            .build_streams(engine, Arc::clone(&self.bpm))
            .and_then(|()| live.backend.start())
        {
            live.shutdown();
            return Err(e.into());
        }
        self.live = Some(live);
        Ok(())
    }

    /// Stop audio and the butler thread.
    pub fn stop_live(&mut self) {
        if let Some(mut live) = self.live.take() {
            if let Err(e) = live.backend.stop() {
                log::warn!("stopping audio: {}", e);
            }
            live.shutdown();
        }
    }
}

impl LiveSession {
    fn shutdown(&mut self) {
        let _ = self.commands.send(ButlerCommand::Shutdown);
        if let Some(handle) = self.butler.take() {
            let _ = handle.join();
        }
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new(LoopgridConfig::default())
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.stop_live();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> Controller {
        // 10 frames per beat, 40 per bar
        Controller::new(LoopgridConfig {
            tracks: 2,
            scenes: 2,
            butler_poll_ms: 1,
            engine: EngineConfig {
                sample_rate: 600,
                bpm: 3600.0,
                beats_per_bar: 4,
                channels: 2,
                initial_capacity_frames: 64,
                low_water_frames: 8,
            },
        })
    }

    #[test]
    fn addressing_errors() {
        let mut ctrl = controller();
        assert!(matches!(
            ctrl.queue_play(2, 0),
            Err(ControllerError::NoSuchClip { track: 2, scene: 0 })
        ));
        assert!(ctrl.state(0, 5).is_err());
        assert_eq!(ctrl.state(1, 1).unwrap(), GridState::Empty);
    }

    #[test]
    fn position_follows_rendering() {
        let mut ctrl = controller();
        assert_eq!(ctrl.position(), Some(MusicalTime::zero()));

        // two bars, one beat and half a beat
        ctrl.render_silence(95).unwrap();
        let pos = ctrl.position().unwrap();
        assert_eq!(pos, MusicalTime { beat: 9, sub_beat: 360_360 });
        assert_eq!(pos.bar(4), 2);
        assert_eq!(pos.beat_in_bar(4), 1);
    }

    #[test]
    fn queue_record_allocates_once() {
        let mut ctrl = controller();
        ctrl.queue_record(0, 0).unwrap();
        ctrl.queue_record(0, 0).unwrap();
        assert_eq!(ctrl.state(0, 0).unwrap(), GridState::RecordQueued);

        ctrl.render_silence(40).unwrap();
        let status = ctrl.clip_status(0, 0).unwrap();
        assert_eq!(status.state, GridState::Recording);
        assert_eq!(status.audio_buffer_size, 64);
    }

    #[test]
    fn cancel_play_withdraws() {
        let mut ctrl = controller();
        ctrl.load(0, 1, SampleStore::from_planar(&[0.5; 40], &[0.5; 40]))
            .unwrap();
        ctrl.render_silence(1).unwrap();
        ctrl.queue_play(0, 1).unwrap();
        assert_eq!(ctrl.state(0, 1).unwrap(), GridState::PlayQueued);
        ctrl.cancel_play(0, 1).unwrap();
        assert_eq!(ctrl.state(0, 1).unwrap(), GridState::Stopped);
    }

    #[test]
    fn save_round_trip() {
        let mut ctrl = controller();
        ctrl.load(1, 0, SampleStore::from_planar(&[0.25; 20], &[0.5; 20]))
            .unwrap();
        ctrl.set_beats(1, 0, 2).unwrap();
        ctrl.render_silence(1).unwrap();
        ctrl.save(1, 0).unwrap();

        let snapshots = ctrl.take_snapshots();
        assert_eq!(snapshots.len(), 1);
        let snapshot = &snapshots[0];
        assert_eq!((snapshot.track, snapshot.scene), (1, 0));
        assert_eq!(snapshot.beats, 2);
        assert_eq!(snapshot.length, 20);
        assert_eq!(snapshot.store.as_ref().unwrap().frame(3), (0.25, 0.5));
    }

    #[test]
    fn invalid_bpm_is_ignored() {
        let mut ctrl = controller();
        ctrl.set_bpm(-1.0);
        assert_eq!(ctrl.bpm(), 3600.0);
        ctrl.set_bpm(1800.0);
        assert_eq!(ctrl.bpm(), 1800.0);
        assert_eq!(ctrl.frames_until_bar(), Some(80));
    }
}
