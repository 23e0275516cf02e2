//! Data URL decoding into media assets.
//!
//! Hosts hand media over as `data:<mime>;base64,<payload>` strings. Decoding
//! validates the envelope and the base64 payload, then infers the media
//! format from the MIME type with a few fallbacks for the variants browsers
//! actually produce.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

use crate::error::{Result, SlidemixError};

const DATA_PREFIX: &str = "data:";
const BASE64_SEPARATOR: &str = ";base64,";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    Wav,
    Mp3,
    Ogg,
    Aac,
    Flac,
    Mp4,
    Avi,
    Webm,
    Mov,
    Unknown,
}

/// Exact MIME type lookup, in priority order for substring matching.
const MIME_TABLE: &[(&str, MediaFormat)] = &[
    ("audio/wav", MediaFormat::Wav),
    ("audio/x-wav", MediaFormat::Wav),
    ("audio/mpeg", MediaFormat::Mp3),
    ("audio/ogg", MediaFormat::Ogg),
    ("audio/aac", MediaFormat::Aac),
    ("audio/flac", MediaFormat::Flac),
    ("video/mp4", MediaFormat::Mp4),
    ("video/x-msvideo", MediaFormat::Avi),
    ("video/webm", MediaFormat::Webm),
    ("video/quicktime", MediaFormat::Mov),
];

impl MediaFormat {
    /// File extension used when the asset is written to disk
    pub fn extension(&self) -> &'static str {
        match self {
            MediaFormat::Wav => "wav",
            MediaFormat::Mp3 => "mp3",
            MediaFormat::Ogg => "ogg",
            MediaFormat::Aac => "aac",
            MediaFormat::Flac => "flac",
            MediaFormat::Mp4 => "mp4",
            MediaFormat::Avi => "avi",
            MediaFormat::Webm => "webm",
            MediaFormat::Mov => "mov",
            MediaFormat::Unknown => "unknown",
        }
    }

    /// Look a MIME type up in the fixed table.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime.trim().to_ascii_lowercase();
        MIME_TABLE
            .iter()
            .find(|(known, _)| *known == mime)
            .map(|(_, format)| *format)
    }

    /// Match a bare format name such as a MIME subtype (`mp3`, `x-flac`, `wave`).
    fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        let name = name.strip_prefix("x-").unwrap_or(name.as_str());
        match name {
            "wav" | "wave" | "vnd.wave" => Some(MediaFormat::Wav),
            "mp3" | "mpeg3" => Some(MediaFormat::Mp3),
            "ogg" | "vorbis" => Some(MediaFormat::Ogg),
            "aac" | "aacp" => Some(MediaFormat::Aac),
            "flac" => Some(MediaFormat::Flac),
            "mp4" => Some(MediaFormat::Mp4),
            "avi" | "msvideo" => Some(MediaFormat::Avi),
            "webm" => Some(MediaFormat::Webm),
            "mov" | "quicktime" => Some(MediaFormat::Mov),
            _ => None,
        }
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Decoded media payload owned by a single job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAsset {
    payload: Vec<u8>,
    format: MediaFormat,
    mime: String,
}

impl MediaAsset {
    pub fn new(payload: Vec<u8>, format: MediaFormat, mime: impl Into<String>) -> Self {
        Self {
            payload,
            format,
            mime: mime.into(),
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn format(&self) -> MediaFormat {
        self.format
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    /// Extension for the staged file.
    ///
    /// Still images have no entry in [`MediaFormat`]; they keep their own
    /// subtype so the engine's demuxer probes them correctly.
    pub fn extension(&self) -> &str {
        if self.format != MediaFormat::Unknown {
            return self.format.extension();
        }
        match self.mime.as_str() {
            "image/png" => "png",
            "image/gif" => "gif",
            "image/webp" => "webp",
            "image/bmp" => "bmp",
            _ => "jpg",
        }
    }
}

/// Decode a `data:<mime>;base64,<payload>` string.
pub fn decode(data_url: &str) -> Result<MediaAsset> {
    let rest = data_url.strip_prefix(DATA_PREFIX).ok_or_else(|| {
        SlidemixError::InvalidInput("invalid data URL format: missing 'data:' prefix".to_string())
    })?;

    let (header, encoded) = rest.split_once(BASE64_SEPARATOR).ok_or_else(|| {
        SlidemixError::InvalidInput("invalid data URL format: missing ';base64,' separator".to_string())
    })?;

    // Wrapped base64 is accepted; line breaks carry no data
    let encoded: Cow<'_, str> = if encoded.contains(['\r', '\n']) {
        Cow::Owned(encoded.chars().filter(|c| !matches!(c, '\r' | '\n')).collect())
    } else {
        Cow::Borrowed(encoded)
    };

    let payload = STANDARD
        .decode(encoded.as_bytes())
        .map_err(|e| SlidemixError::InvalidInput(format!("invalid base64 data: {}", e)))?;

    let mime = header
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    let format = detect_format(header, &mime)?;

    Ok(MediaAsset {
        payload,
        format,
        mime,
    })
}

/// Build a data URL from raw bytes.
pub fn encode(mime: &str, payload: &[u8]) -> String {
    format!("{}{}{}{}", DATA_PREFIX, mime, BASE64_SEPARATOR, STANDARD.encode(payload))
}

/// MIME type for a file extension, used when reading local files.
pub fn mime_for_extension(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "aac" => "audio/aac",
        "flac" => "audio/flac",
        "mp4" => "video/mp4",
        "avi" => "video/x-msvideo",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}

fn detect_format(header: &str, mime: &str) -> Result<MediaFormat> {
    if let Some(format) = MediaFormat::from_mime(mime) {
        return Ok(format);
    }

    let raw = header.to_ascii_lowercase();
    if let Some((_, format)) = MIME_TABLE.iter().find(|(known, _)| raw.contains(known)) {
        return Ok(*format);
    }

    if let Some((family, subtype)) = mime.split_once('/') {
        if let Some(format) = MediaFormat::from_name(subtype) {
            return Ok(format);
        }
        if matches!(family, "audio" | "video" | "image") {
            return Ok(MediaFormat::Unknown);
        }
    }

    Err(SlidemixError::UnsupportedFormat(format!(
        "unrecognized media type '{}'",
        mime
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_decode_known_mime_types() {
        let cases = [
            ("audio/mpeg", MediaFormat::Mp3),
            ("audio/wav", MediaFormat::Wav),
            ("audio/x-wav", MediaFormat::Wav),
            ("audio/ogg", MediaFormat::Ogg),
            ("audio/aac", MediaFormat::Aac),
            ("audio/flac", MediaFormat::Flac),
            ("video/mp4", MediaFormat::Mp4),
            ("video/webm", MediaFormat::Webm),
            ("video/quicktime", MediaFormat::Mov),
            ("video/x-msvideo", MediaFormat::Avi),
        ];
        let payload = b"RIFF\x00\x01\x02\xff";

        for (mime, expected) in cases {
            let asset = decode(&encode(mime, payload)).unwrap();
            assert_eq!(asset.format(), expected, "mime {}", mime);
            assert_eq!(asset.payload(), payload);
        }
    }

    #[test]
    fn test_decode_tolerates_mime_parameters() {
        let asset = decode("data:audio/wav;codecs=1;base64,AAEC").unwrap();
        assert_eq!(asset.format(), MediaFormat::Wav);
        assert_eq!(asset.payload(), &[0u8, 1, 2]);
    }

    #[test]
    fn test_decode_subtype_fallback() {
        assert_eq!(decode("data:audio/mp3;base64,AAEC").unwrap().format(), MediaFormat::Mp3);
        assert_eq!(decode("data:audio/x-flac;base64,AAEC").unwrap().format(), MediaFormat::Flac);
    }

    #[test]
    fn test_images_are_unknown_format() {
        let asset = decode("data:image/png;base64,iVBORw0KGgo=").unwrap();
        assert_eq!(asset.format(), MediaFormat::Unknown);
        assert_eq!(asset.extension(), "png");

        let jpeg = decode("data:image/jpeg;base64,/9j/4AAQ").unwrap();
        assert_eq!(jpeg.extension(), "jpg");
    }

    #[test]
    fn test_non_media_mime_is_unsupported() {
        let err = decode("data:text/plain;base64,aGVsbG8=").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    }

    #[test]
    fn test_malformed_data_urls_are_invalid_input() {
        let malformed = [
            "audio/wav;base64,AAEC",
            "data:audio/wav,AAEC",
            "data:audio/wav;base64,not base64!",
            "",
        ];
        for input in malformed {
            let err = decode(input).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput, "input {:?}", input);
        }
    }

    #[test]
    fn test_decode_skips_line_breaks_in_payload() {
        let asset = decode("data:audio/wav;base64,AA\r\nEC\n").unwrap();
        assert_eq!(asset.payload(), &[0, 1, 2]);
        assert_eq!(asset.format(), MediaFormat::Wav);

        let err = decode("data:audio/wav;base64,AA EC").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_mime_for_extension() {
        assert_eq!(mime_for_extension("MP3"), "audio/mpeg");
        assert_eq!(mime_for_extension("jpeg"), "image/jpeg");
        assert_eq!(mime_for_extension("xyz"), "application/octet-stream");
    }
}
