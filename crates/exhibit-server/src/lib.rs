//! # exhibit-server
//!
//! Daemon library for an exhibit tag.
//!
//! This library wires the tag actor to its radios and exposes a local
//! bench API for inspecting and driving the tag without a phone.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod logging;
pub mod radio;
pub mod state;
