// Interactive action editor - State machine over one container's plan

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::domain::model::Container;
use crate::domain::rules::{derive_all, Action, Disposition, OutputFormat, TargetFormatPolicy};
use crate::engine::command::{build_command, CommandOptions};
use crate::error::{VidnormError, VidnormResult};
use crate::utils::path::{is_valid_stem, output_path};

/// Character encoding assumed for attached subtitle files
pub const DEFAULT_SUBTITLE_ENCODING: &str = "UTF-8";

/// External subtitle file attached to a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubtitleFile {
    pub path: PathBuf,
    pub encoding: String,
}

impl SubtitleFile {
    pub fn new(path: impl Into<PathBuf>, encoding: Option<&str>) -> Self {
        Self {
            path: path.into(),
            encoding: encoding
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .unwrap_or(DEFAULT_SUBTITLE_ENCODING)
                .to_string(),
        }
    }
}

/// Editing session for one container.
///
/// Starts from the derived default actions. Every transition either applies
/// fully or fails with [`VidnormError::InvalidTransition`] and leaves the state
/// untouched. `commit` consumes the session.
#[derive(Debug, Clone)]
pub struct ActionEditor {
    container: Container,
    policy: TargetFormatPolicy,
    actions: BTreeMap<usize, Action>,
    output_format: OutputFormat,
    output_name: Option<String>,
    subtitle_files: Vec<SubtitleFile>,
}

impl ActionEditor {
    /// Open a session with the policy's default actions and output format
    pub fn new(container: Container, policy: TargetFormatPolicy) -> Self {
        let actions = derive_all(&container, &policy);
        let output_format = policy.output_format;
        Self {
            container,
            policy,
            actions,
            output_format,
            output_name: None,
            subtitle_files: Vec::new(),
        }
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn actions(&self) -> &BTreeMap<usize, Action> {
        &self.actions
    }

    pub fn action(&self, stream_index: usize) -> Option<&Action> {
        self.actions.get(&stream_index)
    }

    pub fn output_format(&self) -> OutputFormat {
        self.output_format
    }

    pub fn subtitle_files(&self) -> &[SubtitleFile] {
        &self.subtitle_files
    }

    /// Where the converted file will be written
    pub fn destination(&self) -> PathBuf {
        output_path(
            &self.container.path,
            self.output_name.as_deref(),
            self.output_format.extension(),
        )
    }

    /// Cycle a stream through copy, convert and drop; returns the new disposition
    pub fn toggle(&mut self, stream_index: usize) -> VidnormResult<Disposition> {
        let stream = self
            .container
            .stream(stream_index)
            .ok_or_else(|| unknown_stream(stream_index))?;
        let target = self
            .policy
            .target_for(&stream.codec_type)
            .map(str::to_string)
            .or_else(|| stream.codec_name.clone());

        let action = self
            .actions
            .get_mut(&stream_index)
            .ok_or_else(|| unknown_stream(stream_index))?;
        action.disposition = action.disposition.next();
        action.target_codec = match action.disposition {
            Disposition::Convert => target,
            _ => None,
        };

        Ok(action.disposition)
    }

    /// Change the target codec of a stream that is being converted
    pub fn set_target_codec(&mut self, stream_index: usize, codec: &str) -> VidnormResult<()> {
        let action = self
            .actions
            .get_mut(&stream_index)
            .ok_or_else(|| unknown_stream(stream_index))?;
        if action.disposition != Disposition::Convert {
            return Err(VidnormError::invalid_transition(format!(
                "stream {} is set to {}, not convert",
                stream_index, action.disposition
            )));
        }
        let codec = codec.trim();
        if codec.is_empty() {
            return Err(VidnormError::invalid_transition("codec name is empty"));
        }

        action.target_codec = Some(codec.to_string());
        Ok(())
    }

    pub fn set_output_format(&mut self, format: OutputFormat) {
        self.output_format = format;
    }

    /// Rename the output file; the extension follows the output format
    pub fn set_output_name(&mut self, name: &str) -> VidnormResult<()> {
        if !is_valid_stem(name) {
            return Err(VidnormError::invalid_transition(format!(
                "'{}' is not a valid file name",
                name
            )));
        }
        self.output_name = Some(name.trim().to_string());
        Ok(())
    }

    /// Attach an external subtitle file; returns its slot
    pub fn add_subtitle_file(&mut self, path: impl AsRef<Path>, encoding: Option<&str>) -> usize {
        self.subtitle_files
            .push(SubtitleFile::new(path.as_ref(), encoding));
        self.subtitle_files.len() - 1
    }

    pub fn remove_subtitle_file(&mut self, slot: usize) -> VidnormResult<SubtitleFile> {
        if slot >= self.subtitle_files.len() {
            return Err(unknown_slot(slot));
        }
        Ok(self.subtitle_files.remove(slot))
    }

    pub fn set_subtitle_encoding(&mut self, slot: usize, encoding: &str) -> VidnormResult<()> {
        let encoding = encoding.trim();
        if encoding.is_empty() {
            return Err(VidnormError::invalid_transition("encoding is empty"));
        }
        let file = self
            .subtitle_files
            .get_mut(slot)
            .ok_or_else(|| unknown_slot(slot))?;
        file.encoding = encoding.to_string();
        Ok(())
    }

    /// Command the current state would run, without committing
    pub fn preview_command(&self) -> VidnormResult<Vec<String>> {
        build_command(
            &self.container,
            &self.actions,
            &self.destination(),
            &CommandOptions {
                policy: &self.policy,
                output_format: self.output_format,
                subtitle_files: &self.subtitle_files,
            },
        )
    }

    /// Freeze the session into a plan
    pub fn commit(self) -> CommittedPlan {
        let destination = self.destination();
        CommittedPlan {
            container: self.container,
            policy: self.policy,
            actions: self.actions,
            output_format: self.output_format,
            subtitle_files: self.subtitle_files,
            destination,
        }
    }
}

fn unknown_stream(stream_index: usize) -> VidnormError {
    VidnormError::invalid_transition(format!("no stream with index {}", stream_index))
}

fn unknown_slot(slot: usize) -> VidnormError {
    VidnormError::invalid_transition(format!("no subtitle file in slot {}", slot))
}

/// Immutable snapshot of a finished editing session
#[derive(Debug, Clone)]
pub struct CommittedPlan {
    container: Container,
    policy: TargetFormatPolicy,
    actions: BTreeMap<usize, Action>,
    output_format: OutputFormat,
    subtitle_files: Vec<SubtitleFile>,
    destination: PathBuf,
}

impl CommittedPlan {
    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn actions(&self) -> &BTreeMap<usize, Action> {
        &self.actions
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn output_format(&self) -> OutputFormat {
        self.output_format
    }

    pub fn subtitle_files(&self) -> &[SubtitleFile] {
        &self.subtitle_files
    }

    /// Argument list for the encoder
    pub fn command(&self) -> VidnormResult<Vec<String>> {
        build_command(
            &self.container,
            &self.actions,
            &self.destination,
            &CommandOptions {
                policy: &self.policy,
                output_format: self.output_format,
                subtitle_files: &self.subtitle_files,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{CodecType, Stream};

    fn editor() -> ActionEditor {
        let container = Container::new(
            "/library/show.mkv",
            Some(1800.0),
            vec![
                Stream::new(0, CodecType::Video).with_codec("h264"),
                Stream::new(1, CodecType::Audio).with_codec("flac"),
                Stream::new(2, CodecType::Other("data".to_string())).with_codec("bin_data"),
            ],
        );
        ActionEditor::new(container, TargetFormatPolicy::default())
    }

    #[test]
    fn test_starts_from_derived_actions() {
        let editor = editor();
        assert_eq!(editor.action(0), Some(&Action::copy(0)));
        assert_eq!(editor.action(1), Some(&Action::convert(1, "aac")));
        assert_eq!(editor.action(2), Some(&Action::drop(2)));
        assert_eq!(editor.destination(), PathBuf::from("/library/show.mp4"));
    }

    #[test]
    fn test_toggle_three_times_restores_disposition() {
        let mut editor = editor();
        for index in 0..3 {
            let before = editor.action(index).cloned();
            editor.toggle(index).unwrap();
            editor.toggle(index).unwrap();
            editor.toggle(index).unwrap();
            assert_eq!(editor.action(index).map(|a| a.disposition), before.map(|a| a.disposition));
        }
    }

    #[test]
    fn test_toggle_sets_and_clears_target() {
        let mut editor = editor();

        assert_eq!(editor.toggle(0).unwrap(), Disposition::Convert);
        assert_eq!(editor.action(0).unwrap().target_codec.as_deref(), Some("h264"));

        assert_eq!(editor.toggle(0).unwrap(), Disposition::Drop);
        assert_eq!(editor.action(0).unwrap().target_codec, None);

        // Other-type streams fall back to their own codec
        assert_eq!(editor.toggle(2).unwrap(), Disposition::Copy);
        assert_eq!(editor.toggle(2).unwrap(), Disposition::Convert);
        assert_eq!(editor.action(2).unwrap().target_codec.as_deref(), Some("bin_data"));
    }

    #[test]
    fn test_toggle_without_any_codec_leaves_target_empty() {
        let container = Container::new(
            "x.mkv",
            None,
            vec![Stream::new(0, CodecType::Other("data".to_string()))],
        );
        let mut editor = ActionEditor::new(container, TargetFormatPolicy::default());
        editor.toggle(0).unwrap();
        editor.toggle(0).unwrap();

        assert_eq!(editor.action(0).unwrap().disposition, Disposition::Convert);
        assert_eq!(editor.action(0).unwrap().target_codec, None);
        assert!(matches!(
            editor.preview_command(),
            Err(VidnormError::InvalidActionSet { .. })
        ));
    }

    #[test]
    fn test_set_target_codec_requires_convert() {
        let mut editor = editor();

        assert!(matches!(
            editor.set_target_codec(0, "hevc"),
            Err(VidnormError::InvalidTransition { .. })
        ));
        editor.set_target_codec(1, "opus").unwrap();
        assert_eq!(editor.action(1).unwrap().target_codec.as_deref(), Some("opus"));
    }

    #[test]
    fn test_unknown_stream_is_rejected() {
        let mut editor = editor();
        assert!(matches!(editor.toggle(7), Err(VidnormError::InvalidTransition { .. })));
        assert!(editor.set_target_codec(7, "h264").is_err());
    }

    #[test]
    fn test_output_name_and_format() {
        let mut editor = editor();
        editor.set_output_format(OutputFormat::Matroska);
        assert_eq!(editor.destination(), PathBuf::from("/library/show.converted.mkv"));

        editor.set_output_name("Show S01E01").unwrap();
        assert_eq!(editor.destination(), PathBuf::from("/library/Show S01E01.mkv"));

        assert!(editor.set_output_name("").is_err());
        assert_eq!(editor.destination(), PathBuf::from("/library/Show S01E01.mkv"));
    }

    #[test]
    fn test_subtitle_files() {
        let mut editor = editor();
        let slot = editor.add_subtitle_file("/library/show.srt", None);
        assert_eq!(slot, 0);
        assert_eq!(editor.subtitle_files()[0].encoding, DEFAULT_SUBTITLE_ENCODING);

        editor.set_subtitle_encoding(0, "cp1252").unwrap();
        assert_eq!(editor.subtitle_files()[0].encoding, "cp1252");
        assert!(editor.set_subtitle_encoding(3, "cp1252").is_err());

        let command = editor.preview_command().unwrap().join(" ");
        assert!(command.contains("-sub_charenc cp1252 -i /library/show.srt"));

        let removed = editor.remove_subtitle_file(0).unwrap();
        assert_eq!(removed.path, PathBuf::from("/library/show.srt"));
        assert!(editor.remove_subtitle_file(0).is_err());
    }

    #[test]
    fn test_commit_freezes_state() {
        let mut editor = editor();
        editor.toggle(1).unwrap();
        let preview = editor.preview_command().unwrap();

        let plan = editor.commit();
        assert_eq!(plan.command().unwrap(), preview);
        assert_eq!(plan.actions()[&1].disposition, Disposition::Drop);
        assert_eq!(plan.destination(), Path::new("/library/show.mp4"));
    }
}
