//! Shared building blocks for the radio appliance: configuration, the station
//! catalog, durable state, and the media-player backend.

pub mod catalog;
pub mod config;
pub mod platform;
pub mod playback;
pub mod player;
pub mod state;
