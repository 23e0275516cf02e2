//! Command planning for media jobs.
//!
//! A [`MediaJob`] is turned into an [`ExecutionPlan`]: the ordered engine
//! arguments plus the manifest of files the stager must lay down before the
//! engine runs. Planning is pure. File names are relative to the job
//! workspace, so identical jobs always produce identical plans.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::codec::{MediaAsset, MediaFormat};
use crate::error::{Result, SlidemixError};
use crate::media::{render_command_line, EngineArgs};

pub const MIX_AUDIO_CODEC: &str = "libmp3lame";
pub const MIX_AUDIO_QUALITY: u8 = 2;
pub const MIX_OUTPUT: &str = "output.mp3";
pub const DROPOUT_TRANSITION: u32 = 2;

pub const VIDEO_CODEC: &str = "libx264";
pub const VIDEO_PIXEL_FORMAT: &str = "yuv420p";
pub const VIDEO_AUDIO_CODEC: &str = "aac";
pub const VIDEO_AUDIO_BITRATE: &str = "192k";
pub const CONCAT_MANIFEST: &str = "concat.txt";

pub const MIX_KIND: &str = "mix";
pub const VIDEO_KIND: &str = "video";

/// Video compression preset; lower CRF means higher quality
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    High,
    #[default]
    Medium,
    Low,
}

impl QualityTier {
    /// Resolve a host quality setting.
    ///
    /// Hosts send `"1"`, `"2"` or `"3"`; names are accepted too. Anything
    /// else falls back to medium.
    pub fn from_setting(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "1" | "high" => QualityTier::High,
            "2" | "medium" => QualityTier::Medium,
            "3" | "low" => QualityTier::Low,
            other => {
                warn!("Unrecognized quality '{}', using medium", other);
                QualityTier::Medium
            }
        }
    }

    pub fn crf(&self) -> u8 {
        match self {
            QualityTier::High => 18,
            QualityTier::Medium => 23,
            QualityTier::Low => 28,
        }
    }
}

/// Named output resolutions offered to hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoSize {
    Sd480,
    Hd720,
    Hd1080,
    Uhd4k,
}

impl VideoSize {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            VideoSize::Sd480 => (854, 480),
            VideoSize::Hd720 => (1280, 720),
            VideoSize::Hd1080 => (1920, 1080),
            VideoSize::Uhd4k => (3840, 2160),
        }
    }
}

impl FromStr for VideoSize {
    type Err = SlidemixError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "480p" => Ok(VideoSize::Sd480),
            "720p" => Ok(VideoSize::Hd720),
            "1080p" => Ok(VideoSize::Hd1080),
            "4k" | "2160p" => Ok(VideoSize::Uhd4k),
            other => Err(SlidemixError::InvalidInput(format!(
                "Invalid video size '{}'. Valid sizes: 480p, 720p, 1080p, 4k",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AudioMixJob {
    pub main: MediaAsset,
    pub background: MediaAsset,
    pub background_volume: f64,
    /// Seconds; 0 leaves the output unbounded
    pub duration_limit: f64,
}

impl AudioMixJob {
    pub fn new(
        main: MediaAsset,
        background: MediaAsset,
        background_volume: f64,
        duration_limit: f64,
    ) -> Result<Self> {
        for (name, asset) in [("main", &main), ("background", &background)] {
            if asset.format() == MediaFormat::Unknown {
                return Err(SlidemixError::UnsupportedFormat(format!(
                    "{} audio has unrecognized media type '{}'",
                    name,
                    asset.mime()
                )));
            }
        }
        if !background_volume.is_finite() || background_volume < 0.0 {
            return Err(SlidemixError::InvalidInput(format!(
                "background volume must be a non-negative number, got {}",
                background_volume
            )));
        }
        check_limit(duration_limit)?;

        Ok(Self {
            main,
            background,
            background_volume,
            duration_limit,
        })
    }
}

/// One still image and how long it stays on screen
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: MediaAsset,
    pub display_duration: f64,
}

#[derive(Debug, Clone)]
pub struct VideoAssemblyJob {
    pub audio: MediaAsset,
    pub frames: Vec<Frame>,
    pub width: u32,
    pub height: u32,
    pub output_format: String,
    pub quality: QualityTier,
    /// Seconds; 0 leaves the output bounded only by the audio track
    pub duration_limit: f64,
}

impl VideoAssemblyJob {
    pub fn new(
        audio: MediaAsset,
        frames: Vec<Frame>,
        width: u32,
        height: u32,
        output_format: &str,
        quality: QualityTier,
        duration_limit: f64,
    ) -> Result<Self> {
        if frames.is_empty() {
            return Err(SlidemixError::InvalidInput(
                "at least one image is required".to_string(),
            ));
        }
        for (index, frame) in frames.iter().enumerate() {
            if !frame.display_duration.is_finite() || frame.display_duration <= 0.0 {
                return Err(SlidemixError::InvalidInput(format!(
                    "image {} has invalid duration {}",
                    index, frame.display_duration
                )));
            }
        }
        if width == 0 || height == 0 {
            return Err(SlidemixError::InvalidInput(format!(
                "output size must be positive, got {}x{}",
                width, height
            )));
        }
        let output_format = output_format.trim().to_ascii_lowercase();
        if output_format.is_empty() || !output_format.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(SlidemixError::InvalidInput(format!(
                "invalid output format '{}'",
                output_format
            )));
        }
        check_limit(duration_limit)?;

        Ok(Self {
            audio,
            frames,
            width,
            height,
            output_format,
            quality,
            duration_limit,
        })
    }

    /// Sum of all frame display durations
    pub fn frames_total(&self) -> f64 {
        self.frames.iter().map(|f| f.display_duration).sum()
    }
}

fn check_limit(limit: f64) -> Result<()> {
    if !limit.is_finite() || limit < 0.0 {
        return Err(SlidemixError::InvalidInput(format!(
            "duration must be a non-negative number, got {}",
            limit
        )));
    }
    Ok(())
}

/// Every job the planner understands
#[derive(Debug, Clone)]
pub enum MediaJob {
    AudioMix(AudioMixJob),
    VideoAssembly(VideoAssemblyJob),
}

impl MediaJob {
    pub fn kind(&self) -> &'static str {
        match self {
            MediaJob::AudioMix(_) => MIX_KIND,
            MediaJob::VideoAssembly(_) => VIDEO_KIND,
        }
    }

    pub fn plan(&self) -> ExecutionPlan {
        match self {
            MediaJob::AudioMix(job) => plan_audio_mix(job),
            MediaJob::VideoAssembly(job) => plan_video_assembly(job),
        }
    }
}

/// Content the stager writes for one named input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    Asset(MediaAsset),
    Generated(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanInput {
    pub role: String,
    pub file_name: String,
    pub source: InputSource,
}

/// How long the produced media will be, given its inputs' lengths
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputSpan {
    /// Mixed audio: as long as the longest input, optionally cut
    LongestInput { limit: Option<f64> },
    /// Slideshow: frames end or audio ends, whichever comes first
    ClampedToAudio { frames_total: f64, limit: Option<f64> },
}

impl OutputSpan {
    /// Output length in seconds given each input's length.
    ///
    /// For a mix pass `[main, background]`; for a slideshow pass `[audio]`.
    pub fn resolve(&self, input_secs: &[f64]) -> f64 {
        let (natural, limit) = match *self {
            OutputSpan::LongestInput { limit } => {
                (input_secs.iter().copied().fold(0.0, f64::max), limit)
            }
            OutputSpan::ClampedToAudio { frames_total, limit } => {
                let audio = input_secs.first().copied().unwrap_or(frames_total);
                (frames_total.min(audio), limit)
            }
        };
        limit.map_or(natural, |l| natural.min(l))
    }

    /// Best length guess without probing the inputs
    pub fn estimate(&self) -> Option<f64> {
        match *self {
            OutputSpan::LongestInput { limit } => limit,
            OutputSpan::ClampedToAudio { frames_total, limit } => {
                Some(limit.map_or(frames_total, |l| frames_total.min(l)))
            }
        }
    }
}

/// Immutable description of one engine invocation
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan {
    description: String,
    args: Vec<String>,
    inputs: Vec<PlanInput>,
    output: String,
    span: OutputSpan,
    background_gain: Option<f64>,
    crf: Option<u8>,
}

impl ExecutionPlan {
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn inputs(&self) -> &[PlanInput] {
        &self.inputs
    }

    pub fn input(&self, role: &str) -> Option<&PlanInput> {
        self.inputs.iter().find(|input| input.role == role)
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn span(&self) -> OutputSpan {
        self.span
    }

    pub fn background_gain(&self) -> Option<f64> {
        self.background_gain
    }

    pub fn crf(&self) -> Option<u8> {
        self.crf
    }

    /// The arguments as a single command line, as logged and printed on dry runs
    pub fn command_line(&self) -> String {
        render_command_line(&self.args)
    }
}

impl fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.description, self.command_line())
    }
}

fn optional_limit(limit: f64) -> Option<f64> {
    (limit > 0.0).then_some(limit)
}

/// Plan a background-music mix of two audio tracks.
pub fn plan_audio_mix(job: &AudioMixJob) -> ExecutionPlan {
    let main_name = format!("main.{}", job.main.format().extension());
    let bg_name = format!("bg.{}", job.background.format().extension());

    let mut args = EngineArgs::new().input(&main_name).input(&bg_name);
    if job.duration_limit > 0.0 {
        args = args.duration(job.duration_limit);
    }

    let graph = format!(
        "[1:a]volume={:.2}[bg];[0:a][bg]amix=inputs=2:duration=longest:dropout_transition={}",
        job.background_volume, DROPOUT_TRANSITION
    );
    let args = args
        .filter_complex(graph)
        .audio_codec(MIX_AUDIO_CODEC)
        .audio_quality(MIX_AUDIO_QUALITY)
        .output(MIX_OUTPUT);

    ExecutionPlan {
        description: "Audio mix".to_string(),
        args: args.into_vec(),
        inputs: vec![
            PlanInput {
                role: "main".to_string(),
                file_name: main_name,
                source: InputSource::Asset(job.main.clone()),
            },
            PlanInput {
                role: "background".to_string(),
                file_name: bg_name,
                source: InputSource::Asset(job.background.clone()),
            },
        ],
        output: MIX_OUTPUT.to_string(),
        span: OutputSpan::LongestInput {
            limit: optional_limit(job.duration_limit),
        },
        background_gain: Some(job.background_volume),
        crf: None,
    }
}

/// Plan a slideshow: frames concatenated in order over one audio track.
pub fn plan_video_assembly(job: &VideoAssemblyJob) -> ExecutionPlan {
    let audio_ext = match job.audio.format() {
        MediaFormat::Unknown => MediaFormat::Mp3.extension(),
        format => format.extension(),
    };
    let audio_name = format!("mixed_audio.{}", audio_ext);
    let output_name = format!("output.{}", job.output_format);

    let mut inputs = Vec::with_capacity(job.frames.len() + 2);
    let mut manifest = String::new();
    for (index, frame) in job.frames.iter().enumerate() {
        let file_name = format!("image_{}.{}", index, frame.image.extension());
        manifest.push_str(&format!("file '{}'\n", file_name));
        manifest.push_str(&format!("duration {:.3}\n", frame.display_duration));
        inputs.push(PlanInput {
            role: format!("frame_{}", index),
            file_name,
            source: InputSource::Asset(frame.image.clone()),
        });
    }
    // The concat demuxer ignores the last entry's duration unless it is repeated
    if let Some(last) = inputs.last() {
        manifest.push_str(&format!("file '{}'\n", last.file_name));
    }
    inputs.push(PlanInput {
        role: "concat".to_string(),
        file_name: CONCAT_MANIFEST.to_string(),
        source: InputSource::Generated(manifest),
    });
    inputs.push(PlanInput {
        role: "audio".to_string(),
        file_name: audio_name.clone(),
        source: InputSource::Asset(job.audio.clone()),
    });

    let crf = job.quality.crf();
    let mut args = EngineArgs::new()
        .input_format("concat")
        .args(["-safe", "0"])
        .input(CONCAT_MANIFEST)
        .input(&audio_name)
        .video_codec(VIDEO_CODEC)
        .pixel_format(VIDEO_PIXEL_FORMAT)
        .crf(crf)
        .audio_codec(VIDEO_AUDIO_CODEC)
        .audio_bitrate(VIDEO_AUDIO_BITRATE)
        .shortest();
    if job.duration_limit > 0.0 {
        args = args.duration(job.duration_limit);
    }
    let (w, h) = (job.width, job.height);
    let args = args
        .video_filter(format!(
            "scale={}:{}:force_original_aspect_ratio=decrease,pad={}:{}:(ow-iw)/2:(oh-ih)/2",
            w, h, w, h
        ))
        .output(&output_name);

    ExecutionPlan {
        description: "Video assembly".to_string(),
        args: args.into_vec(),
        inputs,
        output: output_name,
        span: OutputSpan::ClampedToAudio {
            frames_total: job.frames_total(),
            limit: optional_limit(job.duration_limit),
        },
        background_gain: None,
        crf: Some(crf),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(format: MediaFormat, mime: &str) -> MediaAsset {
        MediaAsset::new(vec![1, 2, 3], format, mime)
    }

    fn frame(duration: f64) -> Frame {
        Frame {
            image: asset(MediaFormat::Unknown, "image/jpeg"),
            display_duration: duration,
        }
    }

    fn mix_job(volume: f64, limit: f64) -> AudioMixJob {
        AudioMixJob::new(
            asset(MediaFormat::Wav, "audio/wav"),
            asset(MediaFormat::Mp3, "audio/mpeg"),
            volume,
            limit,
        )
        .unwrap()
    }

    fn video_job(quality: QualityTier) -> VideoAssemblyJob {
        VideoAssemblyJob::new(
            asset(MediaFormat::Mp3, "audio/mpeg"),
            vec![frame(2.0), frame(3.0), frame(1.5)],
            1280,
            720,
            "mp4",
            quality,
            0.0,
        )
        .unwrap()
    }

    #[test]
    fn test_audio_mix_command_line() {
        let plan = plan_audio_mix(&mix_job(0.3, 0.0));
        assert_eq!(
            plan.command_line(),
            "-i main.wav -i bg.mp3 -filter_complex \
             \"[1:a]volume=0.30[bg];[0:a][bg]amix=inputs=2:duration=longest:dropout_transition=2\" \
             -c:a libmp3lame -q:a 2 output.mp3"
        );
        assert_eq!(plan.output(), "output.mp3");
        assert_eq!(plan.background_gain(), Some(0.3));
        assert_eq!(plan.input("main").unwrap().file_name, "main.wav");
        assert_eq!(plan.input("background").unwrap().file_name, "bg.mp3");
    }

    #[test]
    fn test_audio_mix_span_is_longest_input() {
        let plan = plan_audio_mix(&mix_job(0.3, 0.0));
        assert_eq!(plan.span().resolve(&[3.0, 5.0]), 5.0);
        assert_eq!(plan.span().estimate(), None);
    }

    #[test]
    fn test_audio_mix_duration_limit() {
        let plan = plan_audio_mix(&mix_job(0.5, 4.0));
        let args = plan.args();
        let t = args.iter().position(|a| a == "-t").unwrap();
        assert_eq!(args[t + 1], "4.00");
        assert!(t < args.iter().position(|a| a == "-filter_complex").unwrap());
        assert_eq!(plan.span().resolve(&[3.0, 5.0]), 4.0);
    }

    #[test]
    fn test_audio_mix_is_deterministic() {
        let job = mix_job(0.75, 10.0);
        assert_eq!(plan_audio_mix(&job), plan_audio_mix(&job));
        assert_eq!(
            MediaJob::AudioMix(job.clone()).plan().args(),
            plan_audio_mix(&job).args()
        );
    }

    #[test]
    fn test_job_kind_names() {
        assert_eq!(MediaJob::AudioMix(mix_job(0.3, 0.0)).kind(), MIX_KIND);
        assert_eq!(MediaJob::VideoAssembly(video_job(QualityTier::Low)).kind(), VIDEO_KIND);
    }

    #[test]
    fn test_audio_mix_rejects_unknown_formats_and_bad_volume() {
        let unknown = AudioMixJob::new(
            asset(MediaFormat::Unknown, "audio/x-custom"),
            asset(MediaFormat::Mp3, "audio/mpeg"),
            0.5,
            0.0,
        );
        assert!(matches!(unknown, Err(SlidemixError::UnsupportedFormat(_))));

        let negative = AudioMixJob::new(
            asset(MediaFormat::Wav, "audio/wav"),
            asset(MediaFormat::Mp3, "audio/mpeg"),
            -1.0,
            0.0,
        );
        assert!(matches!(negative, Err(SlidemixError::InvalidInput(_))));
    }

    #[test]
    fn test_video_command_line() {
        let plan = plan_video_assembly(&video_job(QualityTier::Medium));
        assert_eq!(
            plan.command_line(),
            "-f concat -safe 0 -i concat.txt -i mixed_audio.mp3 -c:v libx264 -pix_fmt yuv420p \
             -crf 23 -c:a aac -b:a 192k -shortest \
             -vf \"scale=1280:720:force_original_aspect_ratio=decrease,pad=1280:720:(ow-iw)/2:(oh-ih)/2\" \
             output.mp4"
        );
    }

    #[test]
    fn test_video_quality_tiers() {
        assert_eq!(QualityTier::from_setting("1"), QualityTier::High);
        assert_eq!(QualityTier::from_setting("high"), QualityTier::High);
        assert_eq!(QualityTier::from_setting("3"), QualityTier::Low);
        assert_eq!(QualityTier::from_setting("ultra"), QualityTier::Medium);

        let high = plan_video_assembly(&video_job(QualityTier::from_setting("1")));
        assert_eq!(high.crf(), Some(18));

        let medium = plan_video_assembly(&video_job(QualityTier::Medium));
        let unknown = plan_video_assembly(&video_job(QualityTier::from_setting("best")));
        assert_eq!(medium, unknown);
    }

    #[test]
    fn test_video_span_clamped_to_audio() {
        let plan = plan_video_assembly(&video_job(QualityTier::High));
        assert_eq!(plan.span().estimate(), Some(6.5));
        assert_eq!(plan.span().resolve(&[4.0]), 4.0);
        assert_eq!(plan.span().resolve(&[10.0]), 6.5);
    }

    #[test]
    fn test_video_concat_manifest() {
        let plan = plan_video_assembly(&video_job(QualityTier::Medium));
        let concat = plan.input("concat").unwrap();
        assert_eq!(concat.file_name, CONCAT_MANIFEST);
        assert_eq!(
            concat.source,
            InputSource::Generated(
                "file 'image_0.jpg'\nduration 2.000\n\
                 file 'image_1.jpg'\nduration 3.000\n\
                 file 'image_2.jpg'\nduration 1.500\n\
                 file 'image_2.jpg'\n"
                    .to_string()
            )
        );
        assert_eq!(plan.inputs().len(), 5);
    }

    #[test]
    fn test_video_duration_limit_follows_shortest() {
        let job = VideoAssemblyJob::new(
            asset(MediaFormat::Wav, "audio/wav"),
            vec![frame(2.0)],
            640,
            480,
            "WEBM",
            QualityTier::Low,
            1.25,
        )
        .unwrap();
        let plan = plan_video_assembly(&job);
        let args = plan.args();
        let shortest = args.iter().position(|a| a == "-shortest").unwrap();
        assert_eq!(args[shortest + 1], "-t");
        assert_eq!(args[shortest + 2], "1.25");
        assert_eq!(plan.output(), "output.webm");
        assert_eq!(plan.input("audio").unwrap().file_name, "mixed_audio.wav");
    }

    #[test]
    fn test_video_job_validation() {
        let audio = asset(MediaFormat::Mp3, "audio/mpeg");
        let empty = VideoAssemblyJob::new(audio.clone(), vec![], 1280, 720, "mp4", QualityTier::Medium, 0.0);
        assert!(matches!(empty, Err(SlidemixError::InvalidInput(_))));

        let zero = VideoAssemblyJob::new(audio.clone(), vec![frame(0.0)], 1280, 720, "mp4", QualityTier::Medium, 0.0);
        assert!(matches!(zero, Err(SlidemixError::InvalidInput(_))));

        let nan = VideoAssemblyJob::new(audio.clone(), vec![frame(f64::NAN)], 1280, 720, "mp4", QualityTier::Medium, 0.0);
        assert!(matches!(nan, Err(SlidemixError::InvalidInput(_))));

        let traversal = VideoAssemblyJob::new(audio, vec![frame(1.0)], 1280, 720, "../x", QualityTier::Medium, 0.0);
        assert!(matches!(traversal, Err(SlidemixError::InvalidInput(_))));
    }

    #[test]
    fn test_video_size_presets() {
        assert_eq!("720p".parse::<VideoSize>().unwrap().dimensions(), (1280, 720));
        assert_eq!("4K".parse::<VideoSize>().unwrap().dimensions(), (3840, 2160));
        assert!("900p".parse::<VideoSize>().is_err());
    }
}
