//! Engine configuration.

use lg_ir::BLOCK_SIZE;

/// Fixed parameters the engine is built with.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineConfig {
    /// Audio sample rate (e.g., 44100)
    pub sample_rate: u32,
    /// Initial tempo
    pub bpm: f32,
    /// Beats in one bar; also the beats a bar of recording adds to a new take
    pub beats_per_bar: u32,
    /// Channels per clip store (1 or 2)
    pub channels: u16,
    /// Frames in the first store allocated for an empty clip
    pub initial_capacity_frames: usize,
    /// Remaining record space below which a bigger store is requested
    pub low_water_frames: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            bpm: 120.0,
            beats_per_bar: 4,
            channels: 2,
            initial_capacity_frames: 44100,
            low_water_frames: 4 * BLOCK_SIZE,
        }
    }
}
