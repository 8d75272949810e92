//! Interactive menus for one editing session per file

use std::io::{self, BufRead, Write};
use std::path::Path;

use crate::domain::editor::{ActionEditor, CommittedPlan};
use crate::domain::rules::OutputFormat;

/// How an editing session ended
#[derive(Debug)]
pub enum SessionOutcome {
    /// The operator committed the plan for conversion
    Launch(CommittedPlan),
    /// The operator skipped this file
    Skip,
    /// The operator stopped configuring files
    Quit,
}

/// Line-oriented menu over any input and output
pub struct Menu<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Menu<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Print one message line to the operator
    pub fn say(&mut self, message: &str) -> io::Result<()> {
        writeln!(self.output, "{}", message)?;
        self.output.flush()
    }

    /// Run the main menu for one file until the operator converts, skips or quits
    pub fn run_session(&mut self, mut editor: ActionEditor) -> io::Result<SessionOutcome> {
        loop {
            self.render(&editor)?;
            let choice = match self.prompt("[c]onvert, [s]kip, [e]dit, [q]uit > ")? {
                Some(choice) => choice,
                None => return Ok(SessionOutcome::Quit),
            };

            match choice.as_str() {
                "c" => return Ok(SessionOutcome::Launch(editor.commit())),
                "s" => return Ok(SessionOutcome::Skip),
                "q" => return Ok(SessionOutcome::Quit),
                "e" => {
                    if !self.edit(&mut editor)? {
                        return Ok(SessionOutcome::Quit);
                    }
                }
                other => writeln!(self.output, "Unknown choice '{}'", other)?,
            }
        }
    }

    /// Edit menu; returns `false` when input ran out
    fn edit(&mut self, editor: &mut ActionEditor) -> io::Result<bool> {
        loop {
            writeln!(
                self.output,
                "[t]oggle stream, set [c]odec, output [f]ormat, output [n]ame,\n\
                 [a]dd subtitle file, [r]emove subtitle file, subtitle [e]ncoding,\n\
                 [d]isplay command, [m]ain menu"
            )?;
            let choice = match self.prompt("edit > ")? {
                Some(choice) => choice,
                None => return Ok(false),
            };

            let result = match choice.as_str() {
                "m" => return Ok(true),
                "t" => match self.prompt_index("Stream index: ")? {
                    Some(index) => editor.toggle(index).map(|disposition| {
                        format!("Stream {} set to {}", index, disposition)
                    }),
                    None => continue,
                },
                "c" => {
                    let index = match self.prompt_index("Stream index: ")? {
                        Some(index) => index,
                        None => continue,
                    };
                    let codec = self.prompt("Target codec: ")?.unwrap_or_default();
                    editor
                        .set_target_codec(index, &codec)
                        .map(|_| format!("Stream {} will be converted to {}", index, codec))
                }
                "f" => {
                    let name = self.prompt("Output format (mp4, matroska): ")?.unwrap_or_default();
                    match OutputFormat::parse(&name) {
                        Some(format) => {
                            editor.set_output_format(format);
                            Ok(format!("Output format set to {}", format))
                        }
                        None => Ok(format!("Unknown output format '{}'", name)),
                    }
                }
                "n" => {
                    let name = self.prompt("Output name (without extension): ")?.unwrap_or_default();
                    editor
                        .set_output_name(&name)
                        .map(|_| format!("Output: {}", editor.destination().display()))
                }
                "a" => {
                    let path = self.prompt("Subtitle file: ")?.unwrap_or_default();
                    if !Path::new(&path).is_file() {
                        writeln!(self.output, "No such file: {}", path)?;
                        continue;
                    }
                    let encoding = self.prompt("Encoding [UTF-8]: ")?.unwrap_or_default();
                    let slot = editor.add_subtitle_file(&path, Some(encoding.as_str()));
                    Ok(format!("Subtitle file {} attached as {}", path, slot))
                }
                "r" => match self.prompt_index("Subtitle slot: ")? {
                    Some(slot) => editor
                        .remove_subtitle_file(slot)
                        .map(|file| format!("Removed {}", file.path.display())),
                    None => continue,
                },
                "e" => {
                    let slot = match self.prompt_index("Subtitle slot: ")? {
                        Some(slot) => slot,
                        None => continue,
                    };
                    let encoding = self.prompt("Encoding: ")?.unwrap_or_default();
                    editor
                        .set_subtitle_encoding(slot, &encoding)
                        .map(|_| format!("Subtitle {} read as {}", slot, encoding))
                }
                "d" => editor.preview_command().map(|args| format!("ffmpeg {}", args.join(" "))),
                other => Ok(format!("Unknown choice '{}'", other)),
            };

            match result {
                Ok(message) => writeln!(self.output, "{}", message)?,
                Err(err) => writeln!(self.output, "Error: {}", err)?,
            }
        }
    }

    fn render(&mut self, editor: &ActionEditor) -> io::Result<()> {
        let container = editor.container();
        writeln!(self.output)?;
        writeln!(self.output, "*** File: {} ***", container.path.display())?;
        writeln!(self.output, "{}", container.summary())?;
        for stream in &container.streams {
            let action = editor
                .action(stream.index)
                .map(|action| action.describe())
                .unwrap_or_default();
            writeln!(
                self.output,
                "  [{}] {} => {}",
                stream.index,
                stream.summary(),
                action
            )?;
        }
        for (slot, file) in editor.subtitle_files().iter().enumerate() {
            writeln!(
                self.output,
                "  subtitle file {}: {} ({})",
                slot,
                file.path.display(),
                file.encoding
            )?;
        }
        writeln!(self.output, "Output: {}", editor.destination().display())
    }

    /// Print a prompt and read one trimmed line; `None` at end of input
    fn prompt(&mut self, text: &str) -> io::Result<Option<String>> {
        write!(self.output, "{}", text)?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    fn prompt_index(&mut self, text: &str) -> io::Result<Option<usize>> {
        let value = self.prompt(text)?.unwrap_or_default();
        match value.parse::<usize>() {
            Ok(index) => Ok(Some(index)),
            Err(_) => {
                writeln!(self.output, "'{}' is not a number", value)?;
                Ok(None)
            }
        }
    }
}
