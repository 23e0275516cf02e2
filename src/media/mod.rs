// Transcoding engine abstraction
//
// This module isolates the one external dependency of the job pipeline:
// - Commands: argument list builder shared with the planner
// - Processor: ffmpeg-backed engine implementation

pub mod commands;
pub mod processor;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

pub use commands::*;
pub use processor::*;

use crate::config::EngineConfig;
use crate::error::Result;

/// Receives the engine's output position in seconds as it encodes
pub type EngineProgress = dyn Fn(f64) + Send + Sync;

/// Main trait for the external transcoding engine
#[async_trait]
pub trait TranscodingEngine: Send + Sync {
    /// Run the engine with `args`, resolving relative file names against `work_dir`
    async fn run(&self, work_dir: &Path, args: &[String], progress: &EngineProgress) -> Result<()>;

    /// First line of the engine's version banner; fails when the binary
    /// cannot be executed
    async fn version(&self) -> Result<String>;
}

/// Factory for creating engine instances
pub struct EngineFactory;

impl EngineFactory {
    /// Create the default engine implementation (FFmpeg-based)
    pub fn create_engine(config: EngineConfig) -> Arc<dyn TranscodingEngine> {
        Arc::new(processor::FfmpegEngine::new(config))
    }
}
