use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::{Builder as TempDirBuilder, TempDir};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::config::StagingConfig;
use crate::error::{Result, SlidemixError};
use crate::media::TranscodingEngine;
use crate::plan::{ExecutionPlan, InputSource, PlanInput};
use crate::progress::ProgressReporter;

pub const PROGRESS_STAGING: u8 = 10;
pub const PROGRESS_STAGED: u8 = 50;
pub const PROGRESS_ENCODED: u8 = 90;
pub const PROGRESS_READ_BACK: u8 = 95;
pub const PROGRESS_DONE: u8 = 100;

/// Scratch directory holding one job's inputs and output.
///
/// Everything inside is removed when the workspace is dropped, whichever
/// way the job ends.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn create(config: &StagingConfig) -> Result<Self> {
        let mut builder = TempDirBuilder::new();
        builder.prefix(&config.prefix);
        let dir = match &config.work_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|e| SlidemixError::Staging(format!("Failed to create job workspace: {}", e)))?;

        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write one planned input under its file name
    pub async fn stage(&self, input: &PlanInput) -> Result<PathBuf> {
        let path = self.dir.path().join(&input.file_name);
        let bytes: &[u8] = match &input.source {
            InputSource::Asset(asset) => asset.payload(),
            InputSource::Generated(text) => text.as_bytes(),
        };

        fs::write(&path, bytes).await.map_err(|e| {
            SlidemixError::Staging(format!("Failed to write {} file: {}", input.role, e))
        })?;

        debug!("Staged {} ({} bytes) at {}", input.role, bytes.len(), path.display());
        Ok(path)
    }

    pub async fn read_output(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.dir.path().join(name);
        fs::read(&path)
            .await
            .map_err(|e| SlidemixError::Staging(format!("Failed to read output file: {}", e)))
    }

    /// Remove the workspace now and report cleanup problems
    pub fn close(self) -> Result<()> {
        self.dir.close()?;
        Ok(())
    }
}

/// Materializes a plan, runs the engine on it and collects the output
pub struct JobStager {
    config: StagingConfig,
    engine: Arc<dyn TranscodingEngine>,
}

impl JobStager {
    pub fn new(config: StagingConfig, engine: Arc<dyn TranscodingEngine>) -> Self {
        Self { config, engine }
    }

    pub async fn execute(&self, plan: ExecutionPlan, progress: &ProgressReporter) -> Result<Vec<u8>> {
        let workspace = Workspace::create(&self.config)?;
        progress.report(PROGRESS_STAGING);

        let total = plan.inputs().len().max(1);
        for (index, input) in plan.inputs().iter().enumerate() {
            workspace.stage(input).await?;
            progress.report_within(
                PROGRESS_STAGING,
                PROGRESS_STAGED,
                (index + 1) as f64 / total as f64,
            );
        }
        progress.report(PROGRESS_STAGED);

        info!("{} started: {}", plan.description(), plan.command_line());
        let estimate = plan.span().estimate().filter(|secs| *secs > 0.0);
        let reporter = progress.clone();
        let on_position = move |seconds: f64| {
            if let Some(total) = estimate {
                reporter.report_within(PROGRESS_STAGED, PROGRESS_ENCODED, seconds / total);
            }
        };
        self.engine
            .run(workspace.path(), plan.args(), &on_position)
            .await
            .map_err(|e| e.context(format!("{} failed", plan.description())))?;
        progress.report(PROGRESS_ENCODED);

        progress.report(PROGRESS_READ_BACK);
        let output = workspace.read_output(plan.output()).await?;

        if let Err(e) = workspace.close() {
            warn!("Failed to remove job workspace: {}", e);
        }

        info!("{} completed ({} bytes)", plan.description(), output.len());
        progress.report(PROGRESS_DONE);
        Ok(output)
    }
}
