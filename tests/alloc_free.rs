//! Allocation-free audio path tests.
//!
//! These tests verify that `Engine::process()` neither allocates nor frees
//! while clips record through several store growths, play, answer save
//! requests and get reset. Port servicing, which does allocate, runs
//! between blocks outside the checked region.
//!
//! Just run `cargo test`; no feature flags needed.

use assert_no_alloc::{assert_no_alloc, AllocDisabler};

#[cfg(debug_assertions)]
#[global_allocator]
static A: AllocDisabler = AllocDisabler;

use lg_engine::{ClipPort, Engine, EngineConfig, Frame, GridState, SampleStore};

const BLOCK: usize = 128;

/// 100 frames per beat, 400 per bar.
fn config() -> EngineConfig {
    EngineConfig {
        sample_rate: 6000,
        bpm: 3600.0,
        beats_per_bar: 4,
        channels: 2,
        initial_capacity_frames: 256,
        low_water_frames: 2 * BLOCK,
    }
}

fn input() -> Vec<Frame> {
    (0..BLOCK).map(|i| Frame::mono((i as f32 * 0.05).sin())).collect()
}

/// Process `blocks` blocks under the allocation check, servicing ports in
/// between. `each` runs before every block, outside the check.
fn run_checked(
    engine: &mut Engine,
    ports: &mut [ClipPort],
    blocks: usize,
    mut each: impl FnMut(usize, &mut Engine),
) {
    let input = input();
    let mut out = vec![Frame::silence(); BLOCK];
    for block in 0..blocks {
        each(block, engine);
        assert_no_alloc(|| engine.process(&input, &mut out));
        for port in ports.iter_mut() {
            port.service();
        }
    }
}

#[test]
fn recording_through_growth_alloc_free() {
    let config = config();
    let (mut engine, mut ports) = Engine::new(2, 2, &config);
    for port in &mut ports {
        port.allocate(config.initial_capacity_frames).unwrap();
    }
    for clip in engine.clips() {
        clip.queue_record();
    }

    run_checked(&mut engine, &mut ports, 200, |_, _| {});

    for clip in engine.clips() {
        assert!(clip.recording());
        // the first bar only arms the recording
        assert_eq!(clip.buffer_length(), 200 * BLOCK - 400);
        assert!(clip.audio_buffer_size() >= clip.buffer_length());
        assert!(clip.audio_buffer_size() >= 16 * config.initial_capacity_frames);
        assert_eq!(clip.shared().dropped_frames(), 0);
    }
}

#[test]
fn playback_save_and_reset_alloc_free() {
    let config = config();
    let (mut engine, mut ports) = Engine::new(1, 2, &config);
    let ramp: Vec<f32> = (0..800).map(|i| i as f32 / 800.0).collect();
    ports[0]
        .load(SampleStore::from_planar(&ramp, &ramp))
        .unwrap();
    ports[1].allocate(config.initial_capacity_frames).unwrap();

    engine.clip(0, 0).unwrap().queue_play(true);
    engine.clip(0, 0).unwrap().set_beats(4);
    engine.clip(0, 1).unwrap().queue_record();

    run_checked(&mut engine, &mut ports, 120, |block, engine| {
        let playing = engine.clip(0, 0).unwrap().shared();
        let recording = engine.clip(0, 1).unwrap().shared();
        match block {
            40 => playing.request_save(),
            60 => recording.reset(),
            80 => recording.queue_record(),
            _ => {}
        }
    });

    assert_eq!(engine.clip(0, 0).unwrap().state(), GridState::Playing);
    assert_eq!(engine.clip(0, 1).unwrap().state(), GridState::RecordQueued);
}

#[test]
fn play_record_handover_alloc_free() {
    let config = config();
    let (mut engine, mut ports) = Engine::new(1, 1, &config);
    ports[0].allocate(config.initial_capacity_frames).unwrap();
    engine.clip(0, 0).unwrap().queue_record();
    engine.clip(0, 0).unwrap().queue_play(true);

    // bar 1 arms recording, bar 2 commits the take and plays it
    run_checked(&mut engine, &mut ports, 20, |_, _| {});

    let clip = engine.clip(0, 0).unwrap();
    assert!(clip.playing());
    assert_eq!(clip.length(), 400);
    assert_eq!(clip.beats(), 4);
}
