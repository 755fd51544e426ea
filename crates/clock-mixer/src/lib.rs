//! Sample-accurate source mixer driven by an output device clock.
//!
//! The crate plays the role of a small audio driver: it owns buffers and
//! sources, renders them from a CPAL output callback, and exposes the device
//! clock so callers can schedule playback on an exact output frame.

pub mod config;
pub mod device;
pub mod error;
pub mod mixer;
pub mod playback;
pub mod sync;
pub mod wave;
