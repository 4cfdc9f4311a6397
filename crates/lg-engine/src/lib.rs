//! Clip engine for loopgrid.
//!
//! A grid of looper clips driven by a bar-counting transport. The
//! [`Engine`] and its [`Clip`]s run on the audio thread; each clip's
//! [`ClipPort`] is the non-real-time end that allocates, grows and frees
//! sample stores on its behalf.

mod clip;
mod config;
mod engine;
mod frame;
mod state;
pub mod transit;
mod transport;

pub use clip::{Clip, Stately};
pub use config::EngineConfig;
pub use engine::Engine;
pub use frame::Frame;
pub use lg_ir::{GridState, MusicalTime, SampleStore, BLOCK_SIZE};
pub use state::{ClipShared, Transition};
pub use transit::{
    prepare_growth, receive_save_buffer, ClipEvent, ClipPort, Handoff, PortReport, SaveSnapshot,
    EVENT_SLOTS, HANDOFF_SLOTS,
};
pub use transport::{TimeObserver, Transport};
