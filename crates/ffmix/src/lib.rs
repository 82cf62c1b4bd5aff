//! ffmix - RME Fireface control daemon
//!
//! Keeps three views of one mixer consistent: the card's DSP (driven over
//! the ALSA `amixer` text interface), an OSC GUI, and named snapshots on
//! disk. The heart of the crate is a declarative parameter surface: every
//! control is a named, typed parameter, and the relationships between
//! GUI-facing values and raw hardware controls are mappings in a dependency
//! graph that re-derives everything downstream of a change.
//!
//! Module map:
//! - [`params`] / [`mapping`]: the parameter store and the dependency graph
//! - [`gain`]: the dB/pan/raw-gain arithmetic
//! - [`device`]: the full parameter declaration table per card model
//! - [`surface`]: serialized mutation, edit hooks, snapshot capture
//! - [`alsa`] / [`osc`]: the hardware and GUI boundaries
//! - [`snapshots`] / [`scenes`] / [`daemon`]: persistence, background
//!   tasks, and the runtime that wires it all together

pub mod alsa;
pub mod daemon;
pub mod device;
pub mod gain;
pub mod mapping;
pub mod osc;
pub mod params;
pub mod scenes;
pub mod snapshots;
pub mod surface;
