//! Core value types for the loopgrid clip engine.
//!
//! Everything here is shared between the real-time engine and the
//! non-real-time controller: the sample store clips record into, the
//! grid state reported to controllers, and beat-based time.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod grid_state;
mod musical_time;
mod sample_store;

pub use grid_state::GridState;
pub use musical_time::{MusicalTime, SUB_BEAT_UNIT};
pub use sample_store::{SampleStore, BLOCK_SIZE, MAX_CHANNELS};
