use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Mix a background track under a main audio track
    Mix {
        /// Main audio file
        #[arg(short, long)]
        main: PathBuf,

        /// Background audio file
        #[arg(short, long)]
        background: PathBuf,

        /// Background volume factor
        #[arg(long, default_value = "0.5")]
        volume: f64,

        /// Maximum output length in seconds (0 for no limit)
        #[arg(short, long, default_value = "0")]
        duration: f64,

        /// Output MP3 file
        #[arg(short, long)]
        output: PathBuf,

        /// Print the engine command line without running it
        #[arg(long)]
        dry_run: bool,
    },

    /// Assemble a slideshow video from images and an audio track
    Video {
        /// Audio track
        #[arg(short, long)]
        audio: PathBuf,

        /// Slide as IMAGE=SECONDS, repeat in display order
        #[arg(short, long = "frame", value_parser = parse_frame, required = true)]
        frames: Vec<(PathBuf, f64)>,

        /// Output size preset (480p, 720p, 1080p, 4k)
        #[arg(short, long, default_value = "720p")]
        size: String,

        /// Output width, overrides the size preset
        #[arg(long, requires = "height")]
        width: Option<u32>,

        /// Output height, overrides the size preset
        #[arg(long, requires = "width")]
        height: Option<u32>,

        /// Container format
        #[arg(long, default_value = "mp4")]
        format: String,

        /// Quality: 1 (high), 2 (medium), 3 (low)
        #[arg(short, long, default_value = "2")]
        quality: String,

        /// Maximum output length in seconds (0 for no limit)
        #[arg(short, long, default_value = "0")]
        duration: f64,

        /// Output video file
        #[arg(short, long)]
        output: PathBuf,

        /// Print the engine command line without running it
        #[arg(long)]
        dry_run: bool,
    },

    /// Check that the transcoding engine is installed
    Check,

    /// Serve a web host with cross-origin isolation headers
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory to serve
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
}

/// Parse `path=seconds`; the last `=` separates the two so paths may contain one
pub fn parse_frame(value: &str) -> Result<(PathBuf, f64), String> {
    let (path, seconds) = value
        .rsplit_once('=')
        .ok_or_else(|| format!("expected IMAGE=SECONDS, got '{}'", value))?;
    let seconds: f64 = seconds
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration '{}' for {}", seconds, path))?;
    if path.is_empty() {
        return Err(format!("missing image path in '{}'", value));
    }
    Ok((PathBuf::from(path), seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame() {
        assert_eq!(parse_frame("slide.png=2.5"), Ok((PathBuf::from("slide.png"), 2.5)));
        assert_eq!(parse_frame("a=b.png=3"), Ok((PathBuf::from("a=b.png"), 3.0)));
        assert!(parse_frame("slide.png").is_err());
        assert!(parse_frame("slide.png=long").is_err());
        assert!(parse_frame("=3").is_err());
    }

    #[test]
    fn test_video_args() {
        let args = Args::try_parse_from([
            "slidemix", "video", "--audio", "track.mp3", "--frame", "a.png=2", "--frame", "b.jpg=3.5",
            "--quality", "1", "--output", "out.mp4", "--dry-run",
        ])
        .unwrap();

        let Commands::Video { frames, quality, size, dry_run, .. } = args.command else {
            panic!("expected video command");
        };
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1], (PathBuf::from("b.jpg"), 3.5));
        assert_eq!(quality, "1");
        assert_eq!(size, "720p");
        assert!(dry_run);
    }

    #[test]
    fn test_video_requires_a_frame() {
        let result = Args::try_parse_from([
            "slidemix", "video", "--audio", "track.mp3", "--output", "out.mp4",
        ]);
        assert!(result.is_err());
    }
}
