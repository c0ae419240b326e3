pub mod foreground;

use std::io::{self, BufRead, Write};

use colored::*;
use log::debug;
use rustyline::error::ReadlineError;
use rustyline::{CompletionType, Config as EditorConfig, DefaultEditor, EditMode};

use crate::config::Config;
use crate::error::ShellError;

pub use self::foreground::{ControllingTerminal, Detached, ForegroundControl};

/// Where command lines come from. `Ok(None)` means end of input.
pub trait LineSource {
    fn read_line(&mut self) -> Result<Option<String>, ShellError>;
}

/// Interactive input with line editing and in-memory history.
pub struct LineEditor {
    editor: DefaultEditor,
    prompt: String,
    history: bool,
}

impl LineEditor {
    pub fn new(config: &Config) -> Result<Self, ShellError> {
        let editor_config = EditorConfig::builder()
            .edit_mode(EditMode::Emacs)
            .auto_add_history(false)
            .completion_type(CompletionType::List)
            .build();

        let editor = DefaultEditor::with_config(editor_config)
            .map_err(|e| ShellError::Input(e.to_string()))?;

        let prompt = if config.color {
            config.prompt.bright_green().to_string()
        } else {
            config.prompt.clone()
        };

        Ok(LineEditor {
            editor,
            prompt,
            history: config.history,
        })
    }
}

impl LineSource for LineEditor {
    fn read_line(&mut self) -> Result<Option<String>, ShellError> {
        match self.editor.readline(&self.prompt) {
            Ok(line) => {
                if self.history && !line.trim().is_empty() {
                    if let Err(e) = self.editor.add_history_entry(line.as_str()) {
                        debug!("Failed to record history: {}", e);
                    }
                }
                Ok(Some(line))
            }
            // Ctrl-C discards the line
            Err(ReadlineError::Interrupted) => Ok(Some(String::new())),
            Err(ReadlineError::Eof) => Ok(None),
            Err(e) => Err(ShellError::Input(e.to_string())),
        }
    }
}

/// Plain buffered input, used when stdin is not a terminal.
pub struct PipedInput<R> {
    reader: R,
    prompt: Option<String>,
}

impl<R: BufRead> PipedInput<R> {
    /// With `Some(prompt)`, the prompt is written to stdout before each read.
    pub fn new(reader: R, prompt: Option<String>) -> Self {
        PipedInput { reader, prompt }
    }
}

impl<R: BufRead> LineSource for PipedInput<R> {
    fn read_line(&mut self) -> Result<Option<String>, ShellError> {
        if let Some(prompt) = &self.prompt {
            let mut stdout = io::stdout().lock();
            let _ = write!(stdout, "{}", prompt);
            let _ = stdout.flush();
        }

        let mut line = String::new();
        let read = self.reader.read_line(&mut line).map_err(|e| {
            if e.kind() == io::ErrorKind::InvalidData {
                ShellError::Parse("input is not valid UTF-8".to_string())
            } else {
                ShellError::Input(e.to_string())
            }
        })?;

        if read == 0 {
            return Ok(None);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(Some(line))
    }
}
