// Domain models - Containers and streams as reported by the prober

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::error::{VidnormError, VidnormResult};
use crate::utils::time::format_seconds;

/// Multimedia type of a stream
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecType {
    Video,
    Audio,
    Subtitle,
    /// Data, attachment or anything else the prober names
    Other(String),
}

impl CodecType {
    /// Parse the prober's `codec_type` entry
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "video" => CodecType::Video,
            "audio" => CodecType::Audio,
            "subtitle" => CodecType::Subtitle,
            other => CodecType::Other(other.to_string()),
        }
    }

    /// Name as the prober spells it
    pub fn as_str(&self) -> &str {
        match self {
            CodecType::Video => "video",
            CodecType::Audio => "audio",
            CodecType::Subtitle => "subtitle",
            CodecType::Other(name) => name,
        }
    }

    /// Per-type stream specifier letter used in codec options, if there is one
    pub fn specifier(&self) -> Option<char> {
        match self {
            CodecType::Video => Some('v'),
            CodecType::Audio => Some('a'),
            CodecType::Subtitle => Some('s'),
            CodecType::Other(_) => None,
        }
    }
}

impl fmt::Display for CodecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One elementary stream inside a container.
///
/// Only `index` and `codec_type` are guaranteed. Every other field is `None`
/// (or `false` for `is_default`) when the prober did not report it, and is
/// rendered as `unknown`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stream {
    /// Index reported by the prober, unique within the container
    pub index: usize,
    pub codec_type: CodecType,
    pub codec_name: Option<String>,
    pub codec_long_name: Option<String>,
    /// Bits per second
    pub bit_rate: Option<u64>,
    pub language: Option<String>,
    pub title: Option<String>,
    /// Default stream of its type
    pub is_default: bool,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Frames per second
    pub frame_rate: Option<f64>,
    pub pixel_format: Option<String>,
    pub field_order: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
    pub channel_layout: Option<String>,
}

impl Stream {
    /// Stream with only the required fields set
    pub fn new(index: usize, codec_type: CodecType) -> Self {
        Self {
            index,
            codec_type,
            codec_name: None,
            codec_long_name: None,
            bit_rate: None,
            language: None,
            title: None,
            is_default: false,
            width: None,
            height: None,
            frame_rate: None,
            pixel_format: None,
            field_order: None,
            sample_rate: None,
            channels: None,
            channel_layout: None,
        }
    }

    /// Builder-style codec name, mostly for tests and fixtures
    pub fn with_codec(mut self, codec_name: &str) -> Self {
        self.codec_name = Some(codec_name.to_string());
        self
    }

    /// Build a stream from one entry of the prober's `streams` array
    pub fn from_probe(path: &str, entry: &Value) -> VidnormResult<Self> {
        let index = entry
            .get("index")
            .and_then(integral_u64)
            .ok_or_else(|| VidnormError::insufficient(path, "stream index"))?;
        let codec_type = entry
            .get("codec_type")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                VidnormError::insufficient(path, format!("codec_type of stream {}", index))
            })?;

        let tags = entry.get("tags");
        let tag = |key: &str| tags.and_then(|t| t.get(key)).and_then(string_of);

        let mut stream = Stream::new(index as usize, CodecType::parse(codec_type));
        stream.codec_name = entry.get("codec_name").and_then(string_of);
        stream.codec_long_name = entry.get("codec_long_name").and_then(string_of);
        stream.bit_rate = entry.get("bit_rate").and_then(lenient_u64);
        stream.language = tag("language");
        stream.title = tag("title");
        stream.is_default = entry
            .get("disposition")
            .and_then(|d| d.get("default"))
            .and_then(lenient_u64)
            .map(|flag| flag != 0)
            .unwrap_or(false);

        match stream.codec_type {
            CodecType::Video => {
                stream.width = u32_field(entry, "width").or_else(|| u32_field(entry, "coded_width"));
                stream.height =
                    u32_field(entry, "height").or_else(|| u32_field(entry, "coded_height"));
                stream.frame_rate = entry
                    .get("avg_frame_rate")
                    .and_then(Value::as_str)
                    .and_then(parse_frame_rate)
                    .or_else(|| {
                        entry
                            .get("r_frame_rate")
                            .and_then(Value::as_str)
                            .and_then(parse_frame_rate)
                    });
                stream.pixel_format = entry.get("pix_fmt").and_then(string_of);
                stream.field_order = entry.get("field_order").and_then(string_of);
            }
            CodecType::Audio => {
                stream.sample_rate = u32_field(entry, "sample_rate");
                stream.channels = u32_field(entry, "channels");
                stream.channel_layout = entry.get("channel_layout").and_then(string_of);
            }
            _ => {}
        }

        Ok(stream)
    }

    /// Codec name, or `unknown`
    pub fn codec_label(&self) -> &str {
        self.codec_name.as_deref().unwrap_or(UNKNOWN)
    }

    /// Resolution as `WxH`, or `unknown`
    pub fn resolution(&self) -> String {
        match (self.width, self.height) {
            (Some(w), Some(h)) => format!("{}x{}", w, h),
            _ => UNKNOWN.to_string(),
        }
    }

    /// Bit rate in kb/s, rounded
    pub fn bit_rate_kbps(&self) -> Option<u64> {
        self.bit_rate.map(|bits| (bits as f64 / 1000.0).round() as u64)
    }

    /// One-line human description of the stream
    pub fn summary(&self) -> String {
        let mut head = vec![self.codec_type.to_string(), self.codec_label().to_string()];
        if let Some(language) = &self.language {
            head.push(language.clone());
        }
        if self.is_default {
            head.push("default".to_string());
        }

        let bit_rate = self
            .bit_rate_kbps()
            .map(|kbps| format!("{} kb/s", kbps))
            .unwrap_or_else(|| UNKNOWN.to_string());
        let specs = match self.codec_type {
            CodecType::Video => vec![
                format!("Resolution: {}", self.resolution()),
                format!("Bitrate: {}", bit_rate),
            ],
            CodecType::Audio => vec![
                format!(
                    "Channels: {}",
                    self.channel_layout
                        .clone()
                        .or_else(|| self.channels.map(|c| c.to_string()))
                        .unwrap_or_else(|| UNKNOWN.to_string())
                ),
                format!("Bitrate: {}", bit_rate),
            ],
            _ => vec![],
        };

        if specs.is_empty() {
            head.join(" ")
        } else {
            format!("{} | {}", head.join(" "), specs.join(" | "))
        }
    }
}

/// A media file and its streams
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Container {
    /// Source file, unique within a run
    pub path: PathBuf,
    /// Seconds; `None` when the prober could not tell
    pub duration: Option<f64>,
    pub format_name: Option<String>,
    pub format_long_name: Option<String>,
    /// Bytes
    pub size: Option<u64>,
    /// Bits per second
    pub bit_rate: Option<u64>,
    pub title: Option<String>,
    pub streams: Vec<Stream>,
}

impl Container {
    /// Container with only the required fields set
    pub fn new(path: impl Into<PathBuf>, duration: Option<f64>, streams: Vec<Stream>) -> Self {
        Self {
            path: path.into(),
            duration: duration.filter(|d| d.is_finite() && *d > 0.0),
            format_name: None,
            format_long_name: None,
            size: None,
            bit_rate: None,
            title: None,
            streams,
        }
    }

    /// Build a container from the prober's JSON document.
    ///
    /// `filename` and `duration` are looked up in the `format` object first and
    /// then at the top level. The duration entry must be present but may hold
    /// an unusable value, in which case the duration is unknown.
    pub fn from_probe(raw: &Value) -> VidnormResult<Self> {
        let format = raw.get("format");
        let lookup = |key: &str| format.and_then(|f| f.get(key)).or_else(|| raw.get(key));

        let path = lookup("filename")
            .and_then(Value::as_str)
            .ok_or_else(|| VidnormError::insufficient(UNKNOWN, "filename"))?;
        let duration_entry =
            lookup("duration").ok_or_else(|| VidnormError::insufficient(path, "duration"))?;
        let entries = raw
            .get("streams")
            .and_then(Value::as_array)
            .filter(|streams| !streams.is_empty())
            .ok_or_else(|| VidnormError::insufficient(path, "streams"))?;

        let streams = entries
            .iter()
            .map(|entry| Stream::from_probe(path, entry))
            .collect::<VidnormResult<Vec<_>>>()?;

        let mut seen = BTreeSet::new();
        if let Some(duplicate) = streams.iter().find(|stream| !seen.insert(stream.index)) {
            return Err(VidnormError::insufficient(
                path,
                format!("unique index for stream {}", duplicate.index),
            ));
        }

        let mut container = Container::new(path, lenient_f64(duration_entry), streams);
        container.format_name = lookup("format_name").and_then(string_of);
        container.format_long_name = lookup("format_long_name").and_then(string_of);
        container.size = lookup("size").and_then(lenient_u64);
        container.bit_rate = lookup("bit_rate").and_then(lenient_u64);
        container.title = format
            .and_then(|f| f.get("tags"))
            .and_then(|tags| tags.get("title"))
            .and_then(string_of);

        Ok(container)
    }

    /// Look up a stream by its prober index
    pub fn stream(&self, index: usize) -> Option<&Stream> {
        self.streams.iter().find(|stream| stream.index == index)
    }

    /// Display name of the source file
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Directory holding the source file
    pub fn directory(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }

    /// Duration as `HH:MM:SS`, or `unknown`
    pub fn length(&self) -> String {
        self.duration
            .map(format_seconds)
            .unwrap_or_else(|| UNKNOWN.to_string())
    }

    /// One-line description of the container itself
    pub fn summary(&self) -> String {
        let size = self
            .size
            .map(|bytes| format!("{:.2} MiB", bytes as f64 / (1024.0 * 1024.0)))
            .unwrap_or_else(|| UNKNOWN.to_string());
        let bit_rate = self
            .bit_rate
            .map(|bits| format!("{:.2} Mb/s", bits as f64 / 1_000_000.0))
            .unwrap_or_else(|| UNKNOWN.to_string());
        format!(
            "Length: {} | Size: {} | Bitrate: {} | Container: {}",
            self.length(),
            size,
            bit_rate,
            self.format_name.as_deref().unwrap_or(UNKNOWN)
        )
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "*** File: {} ***", self.path.display())?;
        if let Some(title) = &self.title {
            writeln!(f, "Title: {}", title)?;
        }
        writeln!(f, "{}", self.summary())?;
        for stream in &self.streams {
            writeln!(f, "  Stream {}: {}", stream.index, stream.summary())?;
            if let Some(title) = &stream.title {
                writeln!(f, "    Title: {}", title)?;
            }
        }
        Ok(())
    }
}

/// Rendering of any field the prober did not report
pub const UNKNOWN: &str = "unknown";

fn string_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn lenient_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn lenient_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

/// Like `lenient_u64`, but rejects fractional values instead of truncating
fn integral_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

fn u32_field(entry: &Value, key: &str) -> Option<u32> {
    entry
        .get(key)
        .and_then(lenient_u64)
        .and_then(|v| u32::try_from(v).ok())
        .filter(|v| *v > 0)
}

/// Parse a rational frame rate such as `24000/1001`
fn parse_frame_rate(rate: &str) -> Option<f64> {
    let (num, den) = match rate.split_once('/') {
        Some((num, den)) => (num.trim().parse::<f64>().ok()?, den.trim().parse::<f64>().ok()?),
        None => (rate.trim().parse::<f64>().ok()?, 1.0),
    };
    if den == 0.0 || num <= 0.0 {
        return None;
    }
    Some(num / den)
}
