use std::fmt;

/// Ordered argument list for one transcoding engine invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineArgs {
    args: Vec<String>,
}

impl EngineArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Add input file, relative to the job workspace
    pub fn input<S: Into<String>>(self, name: S) -> Self {
        self.arg("-i").arg(name)
    }

    /// Add output file, relative to the job workspace
    pub fn output<S: Into<String>>(self, name: S) -> Self {
        self.arg(name)
    }

    /// Force the input demuxer
    pub fn input_format<S: Into<String>>(self, format: S) -> Self {
        self.arg("-f").arg(format)
    }

    /// Limit output length in seconds
    pub fn duration(self, seconds: f64) -> Self {
        self.arg("-t").arg(format!("{:.2}", seconds))
    }

    /// Set video codec
    pub fn video_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:v").arg(codec)
    }

    /// Set audio codec
    pub fn audio_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:a").arg(codec)
    }

    /// Set variable-bitrate audio quality level
    pub fn audio_quality(self, level: u8) -> Self {
        self.arg("-q:a").arg(level.to_string())
    }

    /// Set audio bitrate
    pub fn audio_bitrate<S: Into<String>>(self, bitrate: S) -> Self {
        self.arg("-b:a").arg(bitrate)
    }

    /// Set constant rate factor (lower is better quality)
    pub fn crf(self, crf: u8) -> Self {
        self.arg("-crf").arg(crf.to_string())
    }

    pub fn pixel_format<S: Into<String>>(self, format: S) -> Self {
        self.arg("-pix_fmt").arg(format)
    }

    /// Stop when the shortest stream ends
    pub fn shortest(self) -> Self {
        self.arg("-shortest")
    }

    /// Add video filter
    pub fn video_filter<S: Into<String>>(self, filter: S) -> Self {
        self.arg("-vf").arg(filter)
    }

    /// Add filter graph
    pub fn filter_complex<S: Into<String>>(self, graph: S) -> Self {
        self.arg("-filter_complex").arg(graph)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.args
    }

    pub fn into_vec(self) -> Vec<String> {
        self.args
    }
}

impl fmt::Display for EngineArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render_command_line(&self.args))
    }
}

/// Render arguments as one command line, quoting filter expressions.
pub fn render_command_line(args: &[String]) -> String {
    args.iter()
        .map(|arg| {
            if needs_quotes(arg) {
                format!("\"{}\"", arg)
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn needs_quotes(arg: &str) -> bool {
    arg.is_empty()
        || arg
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '[' | '(' | ';' | ',' | '=' | '\''))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_keeps_order() {
        let args = EngineArgs::new()
            .input("a.wav")
            .duration(12.5)
            .audio_codec("libmp3lame")
            .audio_quality(2)
            .output("out.mp3");

        assert_eq!(
            args.as_slice(),
            ["-i", "a.wav", "-t", "12.50", "-c:a", "libmp3lame", "-q:a", "2", "out.mp3"]
        );
    }

    #[test]
    fn test_render_quotes_filters_only() {
        let args = EngineArgs::new()
            .video_codec("libx264")
            .video_filter("scale=640:480,pad=640:480:(ow-iw)/2:(oh-ih)/2")
            .output("output.mp4");

        assert_eq!(
            args.to_string(),
            "-c:v libx264 -vf \"scale=640:480,pad=640:480:(ow-iw)/2:(oh-ih)/2\" output.mp4"
        );
    }
}
