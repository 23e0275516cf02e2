//! Slidemix - audio mixing and slideshow video assembly
//!
//! Hosts submit jobs as data URLs through named entry points. Each job is
//! decoded, planned into an ffmpeg argument list, staged into a private
//! workspace and run in the background, resolving once with the output
//! bytes or a typed rejection.

pub mod bridge;
pub mod cli;
pub mod codec;
pub mod config;
pub mod error;
pub mod host;
pub mod jobs;
pub mod media;
pub mod plan;
pub mod progress;
pub mod server;
pub mod stager;
