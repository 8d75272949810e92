// Domain rules - Target format policy and default action derivation

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::model::{CodecType, Container, Stream};

/// Output container format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Mp4,
    Matroska,
}

impl OutputFormat {
    /// Parse a format name (`mp4`, `matroska` or `mkv`)
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "mp4" => Some(OutputFormat::Mp4),
            "matroska" | "mkv" => Some(OutputFormat::Matroska),
            _ => None,
        }
    }

    /// File extension without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Matroska => "mkv",
        }
    }

    /// Muxer name passed to `-f`
    pub fn muxer(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Matroska => "matroska",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.muxer())
    }
}

/// Highest Constant Rate Factor the x264 and x265 encoders accept
pub const MAX_CRF: u8 = 51;

/// Target codecs and fixed encoder parameters for a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetFormatPolicy {
    pub video: String,
    pub audio: String,
    pub subtitle: String,
    /// Constant Rate Factor for converted video
    pub crf: u8,
    pub preset: String,
    pub pixel_format: String,
    /// Used when a converted audio stream does not report its own bit rate
    pub audio_bitrate_kbps: u32,
    pub output_format: OutputFormat,
}

impl Default for TargetFormatPolicy {
    fn default() -> Self {
        Self {
            video: "h264".to_string(),
            audio: "aac".to_string(),
            subtitle: "mov_text".to_string(),
            crf: 18,
            preset: "slow".to_string(),
            pixel_format: "yuv420p".to_string(),
            audio_bitrate_kbps: 384,
            output_format: OutputFormat::Mp4,
        }
    }
}

impl TargetFormatPolicy {
    /// Target codec for a stream type; other types have none
    pub fn target_for(&self, codec_type: &CodecType) -> Option<&str> {
        match codec_type {
            CodecType::Video => Some(&self.video),
            CodecType::Audio => Some(&self.audio),
            CodecType::Subtitle => Some(&self.subtitle),
            CodecType::Other(_) => None,
        }
    }
}

/// What happens to a stream during conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    Copy,
    Convert,
    Drop,
}

impl Disposition {
    /// Next disposition in the copy, convert, drop cycle
    pub fn next(self) -> Self {
        match self {
            Disposition::Copy => Disposition::Convert,
            Disposition::Convert => Disposition::Drop,
            Disposition::Drop => Disposition::Copy,
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Disposition::Copy => "copy",
            Disposition::Convert => "convert",
            Disposition::Drop => "drop",
        };
        f.write_str(name)
    }
}

/// Decided treatment of one stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Back-reference to the stream's prober index
    pub stream_index: usize,
    pub disposition: Disposition,
    /// Set iff the disposition is convert
    pub target_codec: Option<String>,
}

impl Action {
    pub fn copy(stream_index: usize) -> Self {
        Self {
            stream_index,
            disposition: Disposition::Copy,
            target_codec: None,
        }
    }

    pub fn convert(stream_index: usize, target_codec: impl Into<String>) -> Self {
        Self {
            stream_index,
            disposition: Disposition::Convert,
            target_codec: Some(target_codec.into()),
        }
    }

    pub fn drop(stream_index: usize) -> Self {
        Self {
            stream_index,
            disposition: Disposition::Drop,
            target_codec: None,
        }
    }

    /// Short description such as `convert -> h264`
    pub fn describe(&self) -> String {
        match (&self.disposition, &self.target_codec) {
            (Disposition::Convert, Some(codec)) => format!("convert -> {}", codec),
            (Disposition::Convert, None) => "convert -> ?".to_string(),
            (disposition, _) => disposition.to_string(),
        }
    }
}

/// Derive the default action for one stream.
///
/// A stream already in its type's target codec is copied, any other video,
/// audio or subtitle stream is converted to the target, and streams of any
/// other type are dropped.
pub fn derive_default(stream: &Stream, policy: &TargetFormatPolicy) -> Action {
    match policy.target_for(&stream.codec_type) {
        None => Action::drop(stream.index),
        Some(target) if stream.codec_name.as_deref() == Some(target) => {
            Action::copy(stream.index)
        }
        Some(target) => Action::convert(stream.index, target),
    }
}

/// Derive the initial action set for a container, keyed by stream index
pub fn derive_all(container: &Container, policy: &TargetFormatPolicy) -> BTreeMap<usize, Action> {
    container
        .streams
        .iter()
        .map(|stream| (stream.index, derive_default(stream, policy)))
        .collect()
}
