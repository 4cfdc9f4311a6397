//! Duplex audio backends for loopgrid.

mod cpal_backend;
mod traits;

pub use cpal_backend::CpalDuplex;
pub use traits::{AudioBackend, AudioError};
