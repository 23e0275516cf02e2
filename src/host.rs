//! Host-facing entry points.
//!
//! A host calls jobs by name with loosely typed arguments, the way a
//! scripting environment passes them. The entry-point table is registered
//! once per process and only read afterwards.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::{debug, info};

use crate::bridge::JobHandle;
use crate::error::SlidemixError;
use crate::jobs::{CreateVideoRequest, MediaJobs, MixAudioRequest};

pub const MIX_AUDIO: &str = "mixAudio";
pub const CREATE_VIDEO: &str = "createVideo";

type EntryPoint = fn(&MediaJobs, &[Value]) -> JobHandle;

static ENTRY_POINTS: OnceLock<HashMap<&'static str, EntryPoint>> = OnceLock::new();

/// Register the callable entry points. Repeated calls are no-ops.
pub fn register_entry_points() -> &'static HashMap<&'static str, EntryPoint> {
    ENTRY_POINTS.get_or_init(|| {
        let mut table: HashMap<&'static str, EntryPoint> = HashMap::new();
        table.insert(MIX_AUDIO, mix_audio);
        table.insert(CREATE_VIDEO, create_video);
        info!("Registered {} host entry points", table.len());
        table
    })
}

/// Dispatches named host calls to media jobs
pub struct Host {
    jobs: MediaJobs,
}

impl Host {
    pub fn new(jobs: MediaJobs) -> Self {
        register_entry_points();
        Self { jobs }
    }

    /// Names of every callable entry point, sorted
    pub fn entry_points(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = register_entry_points().keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Call an entry point by name.
    ///
    /// Returns at once. Calls with an unknown name or the wrong number of
    /// arguments come back already rejected, before any job is scheduled.
    pub fn call(&self, name: &str, args: &[Value]) -> JobHandle {
        debug!("Host call {} with {} arguments", name, args.len());
        match register_entry_points().get(name) {
            Some(entry) => entry(&self.jobs, args),
            None => JobHandle::rejected(SlidemixError::InvalidInput(format!(
                "Unknown entry point '{}'",
                name
            ))),
        }
    }
}

fn mix_audio(jobs: &MediaJobs, args: &[Value]) -> JobHandle {
    if !(3..=4).contains(&args.len()) {
        return JobHandle::rejected(SlidemixError::InvalidInput(
            "Expected 3-4 arguments: mainAudioData, bgAudioData, volume, and optional duration"
                .to_string(),
        ));
    }

    match mix_request(args) {
        Ok(request) => jobs.mix_audio(request),
        Err(e) => JobHandle::rejected(e),
    }
}

fn mix_request(args: &[Value]) -> Result<MixAudioRequest, SlidemixError> {
    let main = string_arg(&args[0], "mainAudioData")?;
    let background = string_arg(&args[1], "bgAudioData")?;
    let volume = args[2]
        .as_f64()
        .ok_or_else(|| SlidemixError::InvalidInput("volume must be a number".to_string()))?;
    let duration = match args.get(3) {
        None | Some(Value::Null) => None,
        Some(value) => Some(value.as_f64().ok_or_else(|| {
            SlidemixError::InvalidInput("duration must be a number".to_string())
        })?),
    };

    Ok(MixAudioRequest {
        main,
        background,
        volume,
        duration,
    })
}

fn create_video(jobs: &MediaJobs, args: &[Value]) -> JobHandle {
    if args.len() != 3 {
        return JobHandle::rejected(SlidemixError::InvalidInput(
            "Expected 3 arguments: audioData, images, settings".to_string(),
        ));
    }

    match video_request(args) {
        Ok(request) => jobs.create_video(request),
        Err(e) => JobHandle::rejected(e),
    }
}

fn video_request(args: &[Value]) -> Result<CreateVideoRequest, SlidemixError> {
    let audio = string_arg(&args[0], "audioData")?;
    let images = serde_json::from_value(args[1].clone())
        .map_err(|e| SlidemixError::InvalidInput(format!("Error parsing images: {}", e)))?;
    let settings = serde_json::from_value(args[2].clone())
        .map_err(|e| SlidemixError::InvalidInput(format!("Error parsing settings: {}", e)))?;

    Ok(CreateVideoRequest {
        audio,
        images,
        settings,
    })
}

fn string_arg(value: &Value, name: &str) -> Result<String, SlidemixError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| SlidemixError::InvalidInput(format!("{} must be a string", name)))
}
