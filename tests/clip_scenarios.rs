//! End-to-end clip behaviour through the controller's offline renderer.

use lg_master::{Controller, EngineConfig, Frame, GridState, LoopgridConfig, SampleStore};

const N: usize = 100;
const BAR: usize = 40;

/// 10 frames per beat, 40 per bar; empty clips start with N frames.
fn controller() -> Controller {
    Controller::new(LoopgridConfig {
        tracks: 2,
        scenes: 2,
        butler_poll_ms: 1,
        engine: EngineConfig {
            sample_rate: 600,
            bpm: 3600.0,
            beats_per_bar: 4,
            channels: 2,
            initial_capacity_frames: N,
            low_water_frames: 16,
        },
    })
}

/// Frame `i` of the test input is `(i/100, -i/100)`.
fn pattern(start: usize, count: usize) -> Vec<Frame> {
    (start..start + count)
        .map(|i| Frame::new(i as f32 / 100.0, -(i as f32) / 100.0))
        .collect()
}

fn to_bar(ctrl: &mut Controller) -> Vec<Frame> {
    let frames = ctrl.frames_until_bar().unwrap();
    ctrl.render_silence(frames).unwrap()
}

#[test]
fn growth_keeps_the_whole_take() {
    let mut ctrl = controller();
    ctrl.queue_record(0, 0).unwrap();
    to_bar(&mut ctrl);
    assert_eq!(ctrl.state(0, 0).unwrap(), GridState::Recording);

    ctrl.render_offline(&pattern(0, N - 10)).unwrap();
    assert!(ctrl.clip_status(0, 0).unwrap().new_buffer_in_transit);
    ctrl.render_offline(&pattern(N - 10, 20)).unwrap();

    let status = ctrl.clip_status(0, 0).unwrap();
    assert_eq!(status.buffer_length, N + 10);
    assert!(status.audio_buffer_size >= 2 * N);
    assert_eq!(ctrl.dropped_frames(), 0);

    ctrl.save(0, 0).unwrap();
    let snapshots = ctrl.take_snapshots();
    let store = snapshots[0].store.as_ref().unwrap();
    assert_eq!(store.valid_frames(), N + 10);
    for (i, expected) in pattern(0, N + 10).into_iter().enumerate() {
        assert_eq!(store.frame(i), (expected.left, expected.right), "frame {}", i);
    }
}

#[test]
fn record_wins_then_play_commits() {
    let mut ctrl = controller();
    ctrl.queue_play(1, 1).unwrap();
    ctrl.queue_record(1, 1).unwrap();
    to_bar(&mut ctrl);

    assert_eq!(ctrl.state(1, 1).unwrap(), GridState::StopQueued);
    let take = pattern(0, BAR);
    let silent = ctrl.render_offline(&take).unwrap();
    assert!(silent.iter().all(|f| *f == Frame::silence()));

    let status = ctrl.clip_status(1, 1).unwrap();
    assert_eq!(status.state, GridState::Playing);
    assert_eq!(status.length, BAR);
    assert_eq!(status.beats, 4);

    // one bar over four beats plays back at unit speed
    let out = ctrl.render_silence(2 * BAR).unwrap();
    assert_eq!(&out[..BAR], &take[..]);
    assert_eq!(&out[BAR..], &take[..]);
}

#[test]
fn stop_outranks_record_by_one_bar() {
    let mut ctrl = controller();
    let loop_frames = vec![0.5; BAR];
    ctrl.load(0, 1, SampleStore::from_planar(&loop_frames, &loop_frames))
        .unwrap();
    ctrl.queue_play(0, 1).unwrap();
    to_bar(&mut ctrl);
    assert_eq!(ctrl.state(0, 1).unwrap(), GridState::Playing);

    ctrl.queue_record(0, 1).unwrap();
    ctrl.queue_stop(0, 1).unwrap();
    assert_eq!(ctrl.state(0, 1).unwrap(), GridState::StopQueued);

    to_bar(&mut ctrl);
    assert_eq!(ctrl.state(0, 1).unwrap(), GridState::RecordQueued);
    to_bar(&mut ctrl);
    assert_eq!(ctrl.state(0, 1).unwrap(), GridState::Recording);
}

#[test]
fn reset_empties_and_clip_can_record_again() {
    let mut ctrl = controller();
    ctrl.queue_record(1, 0).unwrap();
    to_bar(&mut ctrl);
    ctrl.render_offline(&pattern(0, 95)).unwrap();

    ctrl.reset(1, 0).unwrap();
    let status = ctrl.clip_status(1, 0).unwrap();
    assert_eq!(status.state, GridState::Empty);
    assert_eq!(status.beats, 0);

    ctrl.render_silence(1).unwrap();
    let status = ctrl.clip_status(1, 0).unwrap();
    assert_eq!(status.audio_buffer_size, 0);
    assert_eq!(status.buffer_length, 0);

    ctrl.queue_record(1, 0).unwrap();
    to_bar(&mut ctrl);
    ctrl.render_offline(&pattern(0, 10)).unwrap();
    let status = ctrl.clip_status(1, 0).unwrap();
    assert_eq!(status.state, GridState::Recording);
    assert_eq!(status.buffer_length, 10);
    assert_eq!(status.audio_buffer_size, N);
}

#[test]
fn full_store_drops_until_growth_lands() {
    let mut ctrl = controller();
    ctrl.queue_record(0, 0).unwrap();
    to_bar(&mut ctrl);

    // the butler only runs after a whole block, so the store fills first
    ctrl.render_offline(&pattern(0, 256)).unwrap();
    assert_eq!(ctrl.clip_status(0, 0).unwrap().buffer_length, N);
    assert_eq!(ctrl.dropped_frames(), 156);

    ctrl.render_offline(&pattern(0, BAR)).unwrap();
    let status = ctrl.clip_status(0, 0).unwrap();
    assert_eq!(status.buffer_length, N + BAR);
    assert_eq!(ctrl.dropped_frames(), 156);
}

#[test]
fn playback_follows_tempo() {
    let mut ctrl = controller();
    let ramp: Vec<f32> = (0..80).map(|i| i as f32).collect();
    ctrl.load(1, 0, SampleStore::from_planar(&ramp, &ramp)).unwrap();
    ctrl.set_beats(1, 0, 4).unwrap();
    ctrl.queue_play(1, 0).unwrap();
    to_bar(&mut ctrl);

    // 80 frames over 4 beats of 10 frames: double speed
    let out = ctrl.render_silence(10).unwrap();
    let lefts: Vec<f32> = out.iter().map(|f| f.left).collect();
    assert_eq!(lefts, (0..10).map(|i| (2 * i) as f32).collect::<Vec<_>>());

    // 20 frames per beat: unit speed
    ctrl.set_bpm(1800.0);
    let out = ctrl.render_silence(5).unwrap();
    let lefts: Vec<f32> = out.iter().map(|f| f.left).collect();
    assert_eq!(lefts, vec![20.0, 21.0, 22.0, 23.0, 24.0]);
}

#[test]
fn stop_with_nothing_to_stop_is_harmless() {
    let mut ctrl = controller();
    ctrl.queue_stop(0, 0).unwrap();
    to_bar(&mut ctrl);
    assert_eq!(ctrl.state(0, 0).unwrap(), GridState::Empty);
    ctrl.queue_play(0, 0).unwrap();
    to_bar(&mut ctrl);
    // nothing loaded, the play stays queued
    let status = ctrl.clip_status(0, 0).unwrap();
    assert_eq!(status.state, GridState::Empty);
}
