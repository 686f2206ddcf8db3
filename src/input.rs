//! Line sources feeding the session loop.

use crate::completion::ShellHelper;
use anyhow::Context;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor as RlEditor};
use std::io::BufRead;
use std::path::PathBuf;

/// One read from a line source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// Text with surrounding whitespace removed; never empty.
    Text(String),
    /// Ctrl-C while the line was being edited.
    Interrupted,
    /// No more input.
    Eof,
}

pub trait LineSource {
    /// Read the next non-empty line.
    fn read_line(&mut self, prompt: &str) -> anyhow::Result<Line>;

    /// Whether a prompt is shown before each line.
    fn is_interactive(&self) -> bool {
        false
    }

    /// Persist whatever the source keeps between sessions.
    fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Interactive terminal input with history and completion.
pub struct Editor {
    editor: RlEditor<ShellHelper, DefaultHistory>,
    history_file: Option<PathBuf>,
}

impl Editor {
    /// Create the editor and load the history file, which may not exist yet.
    pub fn new(helper: ShellHelper, history_limit: usize, history_file: Option<PathBuf>) -> anyhow::Result<Self> {
        let config = Config::builder()
            .max_history_size(history_limit)
            .context("invalid history limit")?
            .auto_add_history(false)
            .build();
        let mut editor = RlEditor::with_config(config).context("cannot create line editor")?;
        editor.set_helper(Some(helper));
        if let Some(path) = &history_file {
            // A missing history file is the normal first run.
            let _ = editor.load_history(path);
        }
        Ok(Self { editor, history_file })
    }
}

impl LineSource for Editor {
    fn read_line(&mut self, prompt: &str) -> anyhow::Result<Line> {
        loop {
            match self.editor.readline(prompt) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    self.editor
                        .add_history_entry(line)
                        .context("cannot record history")?;
                    return Ok(Line::Text(line.to_string()));
                }
                Err(ReadlineError::Interrupted) => return Ok(Line::Interrupted),
                Err(ReadlineError::Eof) => return Ok(Line::Eof),
                Err(err) => return Err(err).context("cannot read line"),
            }
        }
    }

    fn is_interactive(&self) -> bool {
        true
    }

    fn close(&mut self) -> anyhow::Result<()> {
        if let Some(path) = &self.history_file {
            self.editor
                .save_history(path)
                .with_context(|| format!("cannot save history to {}", path.display()))?;
        }
        Ok(())
    }
}

/// Lines read from a stream without prompting, e.g. a piped script.
pub struct ScriptSource<R> {
    reader: R,
}

impl<R: BufRead> ScriptSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: BufRead> LineSource for ScriptSource<R> {
    fn read_line(&mut self, _prompt: &str) -> anyhow::Result<Line> {
        let mut buf = String::new();
        loop {
            buf.clear();
            let read = self.reader.read_line(&mut buf).context("cannot read input")?;
            if read == 0 {
                return Ok(Line::Eof);
            }
            let line = buf.trim();
            if !line.is_empty() {
                return Ok(Line::Text(line.to_string()));
            }
        }
    }
}

/// A single line given on the command line.
pub struct OneShot {
    line: Option<String>,
}

impl OneShot {
    pub fn new(line: impl Into<String>) -> Self {
        Self {
            line: Some(line.into()),
        }
    }
}

impl LineSource for OneShot {
    fn read_line(&mut self, _prompt: &str) -> anyhow::Result<Line> {
        match self.line.take().map(|line| line.trim().to_string()) {
            Some(line) if !line.is_empty() => Ok(Line::Text(line)),
            _ => Ok(Line::Eof),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn script_skips_blank_lines_and_trims() {
        let mut source = ScriptSource::new(Cursor::new("  echo a  \n\n   \necho b"));
        assert_eq!(source.read_line("").unwrap(), Line::Text("echo a".into()));
        assert_eq!(source.read_line("").unwrap(), Line::Text("echo b".into()));
        assert_eq!(source.read_line("").unwrap(), Line::Eof);
        assert_eq!(source.read_line("").unwrap(), Line::Eof);
        assert!(!source.is_interactive());
    }

    #[test]
    fn one_shot_yields_once() {
        let mut source = OneShot::new(" pwd ");
        assert_eq!(source.read_line("$ ").unwrap(), Line::Text("pwd".into()));
        assert_eq!(source.read_line("$ ").unwrap(), Line::Eof);
    }

    #[test]
    fn blank_one_shot_is_eof() {
        assert_eq!(OneShot::new("   ").read_line("").unwrap(), Line::Eof);
    }
}
