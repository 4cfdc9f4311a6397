//! Main real-time engine: a grid of clips driven by the transport.

use lg_ir::BLOCK_SIZE;

use crate::clip::{Clip, Stately};
use crate::config::EngineConfig;
use crate::frame::Frame;
use crate::transit::ClipPort;
use crate::transport::Transport;

/// Runs every clip of a `tracks × scenes` grid once per audio block.
pub struct Engine {
    /// Clips, row-major by track
    clips: Vec<Clip>,
    tracks: usize,
    scenes: usize,
    /// Musical clock
    transport: Transport,
    /// Per-clip playback rate for the current segment
    speeds: Vec<f32>,
    /// Deinterleaved input scratch, BLOCK_SIZE frames each
    left: Vec<f32>,
    right: Vec<f32>,
}

impl Engine {
    /// Build the grid. Returns the ports for the non-real-time side, in the
    /// same row-major order as the clips.
    pub fn new(tracks: usize, scenes: usize, config: &EngineConfig) -> (Self, Vec<ClipPort>) {
        let mut clips = Vec::with_capacity(tracks * scenes);
        let mut ports = Vec::with_capacity(tracks * scenes);
        for track in 0..tracks {
            for scene in 0..scenes {
                let (clip, port) = Clip::new(track, scene, config);
                clips.push(clip);
                ports.push(port);
            }
        }

        let engine = Self {
            speeds: vec![1.0; clips.len()],
            clips,
            tracks,
            scenes,
            transport: Transport::new(config.sample_rate, config.bpm, config.beats_per_bar),
            left: vec![0.0; BLOCK_SIZE],
            right: vec![0.0; BLOCK_SIZE],
        };
        (engine, ports)
    }

    pub fn tracks(&self) -> usize {
        self.tracks
    }

    pub fn scenes(&self) -> usize {
        self.scenes
    }

    fn index(&self, track: usize, scene: usize) -> Option<usize> {
        (track < self.tracks && scene < self.scenes).then(|| track * self.scenes + scene)
    }

    pub fn clip(&self, track: usize, scene: usize) -> Option<&Clip> {
        self.index(track, scene).map(|i| &self.clips[i])
    }

    pub fn clip_mut(&mut self, track: usize, scene: usize) -> Option<&mut Clip> {
        self.index(track, scene).map(move |i| &mut self.clips[i])
    }

    pub fn clips(&self) -> &[Clip] {
        &self.clips
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn set_bpm(&mut self, bpm: f32) {
        self.transport.set_bpm(bpm);
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.transport.set_sample_rate(sample_rate);
    }

    /// Process one audio block.
    ///
    /// `input` is recorded into every recording clip; missing input frames
    /// read as silence. `output` receives the sum of all playing clips.
    /// Blocks are split at bar boundaries so queued transitions land on the
    /// exact frame.
    pub fn process(&mut self, input: &[Frame], output: &mut [Frame]) {
        for clip in &mut self.clips {
            clip.poll();
        }

        let frames = output.len();
        let mut offset = 0;
        while offset < frames {
            let chunk = (frames - offset)
                .min(BLOCK_SIZE)
                .min(self.transport.frames_until_bar());
            self.process_segment(input, &mut output[offset..offset + chunk], offset);
            self.transport.advance(chunk, &mut self.clips);
            offset += chunk;
        }
    }

    fn process_segment(&mut self, input: &[Frame], output: &mut [Frame], offset: usize) {
        let chunk = output.len();
        for i in 0..chunk {
            let frame = input.get(offset + i).copied().unwrap_or_default();
            self.left[i] = frame.left;
            self.right[i] = frame.right;
        }

        let frames_per_beat = self.transport.frames_per_beat();
        for (clip, speed) in self.clips.iter_mut().zip(self.speeds.iter_mut()) {
            if clip.recording() {
                clip.record(chunk, &self.left[..chunk], &self.right[..chunk]);
            }
            *speed = clip.stretch_speed(frames_per_beat);
        }

        for out in output.iter_mut() {
            let mut mixed = Frame::silence();
            for (clip, &speed) in self.clips.iter_mut().zip(self.speeds.iter()) {
                if clip.playing() {
                    mixed.mix(clip.get_sample(speed));
                }
            }
            *out = mixed;
        }
    }

    /// Render `frames` frames with silent input. Allocates; offline use only.
    pub fn render_frames(&mut self, frames: usize) -> Vec<Frame> {
        let mut out = vec![Frame::silence(); frames];
        self.process(&[], &mut out);
        out
    }
}

impl Stately for Engine {
    fn save(&mut self) {
        for clip in &mut self.clips {
            clip.save();
        }
    }

    fn reset(&mut self) {
        for clip in &mut self.clips {
            clip.reset();
        }
    }
}
