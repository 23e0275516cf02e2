use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::debug;

use crate::bridge::{self, JobHandle, JobState};
use crate::codec;
use crate::config::Config;
use crate::error::{Result, SlidemixError};
use crate::media::TranscodingEngine;
use crate::plan::{AudioMixJob, Frame, MediaJob, QualityTier, VideoAssemblyJob, MIX_KIND, VIDEO_KIND};
use crate::progress::{ProgressReporter, ProgressSink};
use crate::stager::JobStager;

fn default_format() -> String {
    "mp4".to_string()
}

fn default_quality() -> String {
    "2".to_string()
}

/// Accept the quality setting as either a string or a bare number
fn quality_setting<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
    })
}

/// Parameters of a `mixAudio` call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixAudioRequest {
    pub main: String,
    pub background: String,
    pub volume: f64,
    /// Seconds; absent or 0 leaves the mix unbounded
    pub duration: Option<f64>,
}

impl MixAudioRequest {
    pub fn into_job(self) -> Result<MediaJob> {
        let main = codec::decode(&self.main).map_err(|e| e.context("Error parsing main audio"))?;
        let background = codec::decode(&self.background)
            .map_err(|e| e.context("Error parsing background audio"))?;

        let job = AudioMixJob::new(main, background, self.volume, self.duration.unwrap_or(0.0))?;
        Ok(MediaJob::AudioMix(job))
    }
}

/// One slide of a `createVideo` call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageInput {
    pub data: String,
    pub duration: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoSettings {
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default = "default_quality", deserialize_with = "quality_setting")]
    pub quality: String,
    #[serde(default)]
    pub duration: Option<f64>,
}

/// Parameters of a `createVideo` call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateVideoRequest {
    pub audio: String,
    pub images: Vec<ImageInput>,
    pub settings: VideoSettings,
}

impl CreateVideoRequest {
    pub fn into_job(self) -> Result<MediaJob> {
        let audio = codec::decode(&self.audio).map_err(|e| e.context("Error parsing audio"))?;

        let frames = self
            .images
            .into_iter()
            .enumerate()
            .map(|(index, image)| {
                let asset = codec::decode(&image.data)
                    .map_err(|e| e.context(format!("Error parsing image {}", index)))?;
                Ok(Frame {
                    image: asset,
                    display_duration: image.duration,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let settings = self.settings;
        let job = VideoAssemblyJob::new(
            audio,
            frames,
            settings.width,
            settings.height,
            &settings.format,
            QualityTier::from_setting(&settings.quality),
            settings.duration.unwrap_or(0.0),
        )?;
        Ok(MediaJob::VideoAssembly(job))
    }
}

/// Submits media jobs to the runtime and hands back their handles
pub struct MediaJobs {
    runtime: Handle,
    stager: Arc<JobStager>,
    sink: Option<Arc<dyn ProgressSink>>,
}

impl MediaJobs {
    /// Create a job front end on the current tokio runtime
    pub fn new(config: &Config, engine: Arc<dyn TranscodingEngine>) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| SlidemixError::Internal(format!("No async runtime available: {}", e)))?;
        Ok(Self::with_runtime(runtime, config, engine))
    }

    pub fn with_runtime(runtime: Handle, config: &Config, engine: Arc<dyn TranscodingEngine>) -> Self {
        Self {
            runtime,
            stager: Arc::new(JobStager::new(config.staging.clone(), engine)),
            sink: None,
        }
    }

    /// Register the sink that receives every job's progress
    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn mix_audio(&self, request: MixAudioRequest) -> JobHandle {
        self.submit(MIX_KIND, move || request.into_job())
    }

    pub fn create_video(&self, request: CreateVideoRequest) -> JobHandle {
        self.submit(VIDEO_KIND, move || request.into_job())
    }

    fn submit<P>(&self, kind: &'static str, prepare: P) -> JobHandle
    where
        P: FnOnce() -> Result<MediaJob> + Send + 'static,
    {
        let stager = self.stager.clone();
        let sink = self.sink.clone();

        bridge::spawn(&self.runtime, kind, move |tracker| async move {
            tracker.advance(JobState::Validating);
            let job = prepare()?;

            tracker.advance(JobState::Planning);
            let plan = job.plan();
            debug!("Planned {} job: {}", job.kind(), plan);

            tracker.advance(JobState::Executing);
            let progress = ProgressReporter::new(tracker.id(), sink);
            stager.execute(plan, &progress).await
        })
    }
}
