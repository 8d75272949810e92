//! Conversion command construction
//!
//! Turns a container and its per-stream actions into the argument list for the
//! encoder binary. The progress flag is added by the launcher.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::domain::editor::SubtitleFile;
use crate::domain::model::{CodecType, Container};
use crate::domain::rules::{Action, Disposition, OutputFormat, TargetFormatPolicy};
use crate::error::{VidnormError, VidnormResult};

/// Encoder used for subtitle files attached from disk
pub const EXTERNAL_SUBTITLE_CODEC: &str = "mov_text";

/// Inputs to the command builder beyond the action set
#[derive(Debug, Clone, Copy)]
pub struct CommandOptions<'a> {
    pub policy: &'a TargetFormatPolicy,
    pub output_format: OutputFormat,
    pub subtitle_files: &'a [SubtitleFile],
}

impl<'a> CommandOptions<'a> {
    /// Options with no attached subtitle files and the policy's output format
    pub fn new(policy: &'a TargetFormatPolicy) -> Self {
        Self {
            policy,
            output_format: policy.output_format,
            subtitle_files: &[],
        }
    }
}

/// Encoder name for a target codec; unknown codecs pass through verbatim
pub fn encoder_for(codec: &str) -> &str {
    match codec {
        "h264" => "libx264",
        "hevc" | "h265" => "libx265",
        "av1" => "libsvtav1",
        "vp9" => "libvpx-vp9",
        "aac" => "aac",
        "opus" => "libopus",
        "mp3" => "libmp3lame",
        "subrip" | "srt" => "srt",
        other => other,
    }
}

/// Build the encoder argument list for a container.
///
/// Fails with [`VidnormError::InvalidActionSet`] when the action set names a
/// stream the container does not have, leaves a stream without an action,
/// disagrees with its own keys, or converts without a target codec.
pub fn build_command(
    container: &Container,
    actions: &BTreeMap<usize, Action>,
    destination: &Path,
    options: &CommandOptions<'_>,
) -> VidnormResult<Vec<String>> {
    validate(container, actions)?;

    let mut args: Vec<String> = ["-nostdin", "-v", "error", "-y", "-i"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    args.push(container.path.display().to_string());

    for subtitle in options.subtitle_files {
        args.push("-sub_charenc".to_string());
        args.push(subtitle.encoding.clone());
        args.push("-i".to_string());
        args.push(subtitle.path.display().to_string());
    }

    let mut streams: Vec<_> = container.streams.iter().collect();
    streams.sort_by_key(|stream| stream.index);

    let mut ordinals = TypeOrdinals::default();
    for stream in streams {
        let action = &actions[&stream.index];
        if action.disposition == Disposition::Drop {
            continue;
        }

        args.push("-map".to_string());
        args.push(format!("0:{}", stream.index));

        let (specifier, ordinal) = ordinals.next(&stream.codec_type);
        match action.disposition {
            Disposition::Copy => {
                args.push(specifier);
                args.push("copy".to_string());
            }
            Disposition::Convert => {
                // validate() guarantees a target for every convert
                let target = action.target_codec.as_deref().unwrap_or_default();
                args.push(specifier);
                args.push(encoder_for(target).to_string());
                match stream.codec_type {
                    CodecType::Video => {
                        let policy = options.policy;
                        args.extend([
                            "-preset".to_string(),
                            policy.preset.clone(),
                            "-crf".to_string(),
                            policy.crf.to_string(),
                            "-pix_fmt".to_string(),
                            policy.pixel_format.clone(),
                        ]);
                    }
                    CodecType::Audio => {
                        let rate = stream
                            .bit_rate_kbps()
                            .filter(|kbps| *kbps > 0)
                            .unwrap_or(u64::from(options.policy.audio_bitrate_kbps));
                        args.push(format!("-b:a:{}", ordinal));
                        args.push(format!("{}k", rate));
                    }
                    _ => {}
                }
            }
            Disposition::Drop => {}
        }
    }

    for (position, _) in options.subtitle_files.iter().enumerate() {
        args.push("-map".to_string());
        args.push(format!("{}:0", position + 1));
        let (specifier, _) = ordinals.next(&CodecType::Subtitle);
        args.push(specifier);
        args.push(EXTERNAL_SUBTITLE_CODEC.to_string());
    }

    args.push("-f".to_string());
    args.push(options.output_format.muxer().to_string());
    args.push(destination.display().to_string());

    Ok(args)
}

fn validate(container: &Container, actions: &BTreeMap<usize, Action>) -> VidnormResult<()> {
    let mut seen = BTreeSet::new();
    if let Some(stream) = container.streams.iter().find(|stream| !seen.insert(stream.index)) {
        return Err(VidnormError::invalid_actions(format!(
            "{} lists stream {} more than once",
            container.path.display(),
            stream.index
        )));
    }

    for (index, action) in actions {
        if *index != action.stream_index {
            return Err(VidnormError::invalid_actions(format!(
                "action keyed {} refers to stream {}",
                index, action.stream_index
            )));
        }
        if container.stream(*index).is_none() {
            return Err(VidnormError::invalid_actions(format!(
                "{} has no stream {}",
                container.path.display(),
                index
            )));
        }
        if action.disposition == Disposition::Convert && action.target_codec.is_none() {
            return Err(VidnormError::invalid_actions(format!(
                "stream {} is set to convert without a target codec",
                index
            )));
        }
    }

    if let Some(stream) = container
        .streams
        .iter()
        .find(|stream| !actions.contains_key(&stream.index))
    {
        return Err(VidnormError::invalid_actions(format!(
            "stream {} has no action",
            stream.index
        )));
    }

    Ok(())
}

/// Output stream counters, per type and overall
#[derive(Debug, Default)]
struct TypeOrdinals {
    video: usize,
    audio: usize,
    subtitle: usize,
    total: usize,
}

impl TypeOrdinals {
    /// Codec option specifier for the next output stream of a type, and its per-type ordinal
    fn next(&mut self, codec_type: &CodecType) -> (String, usize) {
        let absolute = self.total;
        self.total += 1;

        let counter = match codec_type {
            CodecType::Video => &mut self.video,
            CodecType::Audio => &mut self.audio,
            CodecType::Subtitle => &mut self.subtitle,
            CodecType::Other(_) => return (format!("-c:{}", absolute), absolute),
        };
        let ordinal = *counter;
        *counter += 1;

        let letter = codec_type.specifier().unwrap_or('v');
        (format!("-c:{}:{}", letter, ordinal), ordinal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::Stream;
    use crate::domain::rules::derive_all;
    use std::path::PathBuf;

    fn movie() -> Container {
        let mut audio = Stream::new(1, CodecType::Audio).with_codec("ac3");
        audio.bit_rate = Some(640_000);
        Container::new(
            "/library/movie.mkv",
            Some(5400.0),
            vec![
                Stream::new(0, CodecType::Video).with_codec("hevc"),
                audio,
                Stream::new(2, CodecType::Audio).with_codec("aac"),
                Stream::new(3, CodecType::Subtitle).with_codec("subrip"),
                Stream::new(4, CodecType::Other("attachment".to_string())),
            ],
        )
    }

    fn build(container: &Container, actions: &BTreeMap<usize, Action>) -> VidnormResult<Vec<String>> {
        let policy = TargetFormatPolicy::default();
        build_command(
            container,
            actions,
            &PathBuf::from("/library/movie.mp4"),
            &CommandOptions::new(&policy),
        )
    }

    fn maps(args: &[String]) -> Vec<String> {
        args.windows(2)
            .filter(|pair| pair[0] == "-map")
            .map(|pair| pair[1].clone())
            .collect()
    }

    #[test]
    fn test_default_plan_command() {
        let container = movie();
        let actions = derive_all(&container, &TargetFormatPolicy::default());
        let args = build(&container, &actions).unwrap();

        let expected: Vec<String> = [
            "-nostdin", "-v", "error", "-y", "-i", "/library/movie.mkv",
            "-map", "0:0", "-c:v:0", "libx264", "-preset", "slow", "-crf", "18", "-pix_fmt", "yuv420p",
            "-map", "0:1", "-c:a:0", "aac", "-b:a:0", "640k",
            "-map", "0:2", "-c:a:1", "copy",
            "-map", "0:3", "-c:s:0", "mov_text",
            "-f", "mp4", "/library/movie.mp4",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(args, expected);
    }

    #[test]
    fn test_dropped_streams_are_not_mapped() {
        let container = movie();
        let mut actions = derive_all(&container, &TargetFormatPolicy::default());
        actions.insert(1, Action::drop(1));
        actions.insert(3, Action::drop(3));

        let args = build(&container, &actions).unwrap();
        assert_eq!(maps(&args), vec!["0:0", "0:2"]);
        assert!(args.contains(&"-c:a:0".to_string()));
        assert!(!args.iter().any(|arg| arg.starts_with("-b:a")));
    }

    #[test]
    fn test_other_type_uses_absolute_ordinal() {
        let container = movie();
        let mut actions = derive_all(&container, &TargetFormatPolicy::default());
        actions.insert(2, Action::drop(2));
        actions.insert(4, Action::copy(4));

        let args = build(&container, &actions).unwrap();
        assert_eq!(maps(&args), vec!["0:0", "0:1", "0:3", "0:4"]);
        let position = args.iter().position(|arg| arg == "-c:3").unwrap();
        assert_eq!(args[position + 1], "copy");
    }

    #[test]
    fn test_audio_bitrate_falls_back_to_policy() {
        let container = Container::new(
            "a.avi",
            None,
            vec![Stream::new(0, CodecType::Audio).with_codec("mp3")],
        );
        let actions = derive_all(&container, &TargetFormatPolicy::default());

        let args = build(&container, &actions).unwrap();
        let position = args.iter().position(|arg| arg == "-b:a:0").unwrap();
        assert_eq!(args[position + 1], "384k");
    }

    #[test]
    fn test_subtitle_files_and_format() {
        let container = movie();
        let actions = derive_all(&container, &TargetFormatPolicy::default());
        let policy = TargetFormatPolicy::default();
        let subtitles = vec![
            SubtitleFile::new("/library/movie.en.srt", None),
            SubtitleFile::new("/library/movie.fr.srt", Some("latin1")),
        ];
        let options = CommandOptions {
            policy: &policy,
            output_format: OutputFormat::Matroska,
            subtitle_files: &subtitles,
        };

        let args =
            build_command(&container, &actions, Path::new("/out/movie.mkv"), &options).unwrap();
        let joined = args.join(" ");

        assert!(joined.starts_with(
            "-nostdin -v error -y -i /library/movie.mkv -sub_charenc UTF-8 -i /library/movie.en.srt -sub_charenc latin1 -i /library/movie.fr.srt -map 0:0"
        ));
        assert!(joined.ends_with(
            "-map 1:0 -c:s:1 mov_text -map 2:0 -c:s:2 mov_text -f matroska /out/movie.mkv"
        ));
    }

    #[test]
    fn test_rejects_unknown_stream() {
        let container = movie();
        let mut actions = derive_all(&container, &TargetFormatPolicy::default());
        actions.insert(9, Action::copy(9));

        assert!(matches!(
            build(&container, &actions),
            Err(VidnormError::InvalidActionSet { .. })
        ));
    }

    #[test]
    fn test_rejects_convert_without_target() {
        let container = movie();
        let mut actions = derive_all(&container, &TargetFormatPolicy::default());
        actions.get_mut(&0).unwrap().target_codec = None;

        assert!(matches!(
            build(&container, &actions),
            Err(VidnormError::InvalidActionSet { .. })
        ));
    }

    #[test]
    fn test_rejects_mismatched_key_and_missing_action() {
        let container = movie();
        let mut actions = derive_all(&container, &TargetFormatPolicy::default());
        actions.insert(2, Action::copy(3));
        assert!(build(&container, &actions).is_err());

        let mut actions = derive_all(&container, &TargetFormatPolicy::default());
        actions.remove(&4);
        assert!(build(&container, &actions).is_err());
    }

    #[test]
    fn test_rejects_repeated_stream_index() {
        let container = Container::new(
            "/library/twice.mkv",
            Some(60.0),
            vec![
                Stream::new(0, CodecType::Video).with_codec("hevc"),
                Stream::new(0, CodecType::Audio).with_codec("aac"),
            ],
        );
        let actions = derive_all(&container, &TargetFormatPolicy::default());

        let err = build(&container, &actions).unwrap_err();
        assert!(err.to_string().contains("stream 0 more than once"));
    }

    #[test]
    fn test_encoder_map() {
        assert_eq!(encoder_for("h264"), "libx264");
        assert_eq!(encoder_for("hevc"), "libx265");
        assert_eq!(encoder_for("av1"), "libsvtav1");
        assert_eq!(encoder_for("opus"), "libopus");
        assert_eq!(encoder_for("mov_text"), "mov_text");
        assert_eq!(encoder_for("flac"), "flac");
    }
}
