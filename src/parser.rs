use crate::command::Command;
use crate::env::Environment;
use crate::lexer;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Relation between a stage and the stage that follows it.
///
/// Decides only whether the *next* stage runs, based on the exit code of the
/// last stage that actually ran.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EdgeCondition {
    /// No operator follows: the next stage always runs.
    #[default]
    Unconditional,
    /// `&&`: the next stage runs only after success.
    RunIfSucceeded,
    /// `||`: the next stage runs only after failure.
    RunIfFailed,
}

/// Write mode of an output redirection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// `>`: create the file, discarding previous content.
    Truncate,
    /// `>>`: create the file if needed and write at its end.
    Append,
}

impl OutputMode {
    fn operator(self) -> &'static str {
        match self {
            OutputMode::Truncate => ">",
            OutputMode::Append => ">>",
        }
    }
}

/// `< path`, already opened for reading.
#[derive(Debug)]
pub struct InputRedirect {
    /// Path as written on the command line.
    pub path: PathBuf,
    /// The open file; consumed by the first command of the stage.
    pub file: File,
}

/// `> path` or `>> path`, already opened for writing.
#[derive(Debug)]
pub struct OutputRedirect {
    /// Path as written on the command line.
    pub path: PathBuf,
    /// How the file was opened.
    pub mode: OutputMode,
    /// The open file; consumed by the last command of the stage.
    pub file: File,
}

/// A run of commands connected by pipes.
///
/// Redirection files are owned by the stage and closed when it is dropped,
/// whether it ran or was skipped.
#[derive(Debug)]
pub struct Stage {
    /// Commands in launch order; never empty.
    pub commands: Vec<Command>,
    /// Input of the first command.
    pub input: Option<InputRedirect>,
    /// Output of the last command.
    pub output: Option<OutputRedirect>,
    /// Gate for the following stage.
    pub edge: EdgeCondition,
}

/// Every stage parsed from one input line, in textual order.
#[derive(Debug, Default)]
pub struct Pipeline {
    /// Stages in line order; each one's `edge` links it to the next.
    pub stages: Vec<Stage>,
}

impl Pipeline {
    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the line held no command at all.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// Errors that abandon the current line before anything runs.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The input redirection file could not be opened.
    #[error("{}: {source}", path.display())]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The output redirection file could not be created or opened.
    #[error("{}: {source}", path.display())]
    CreateFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// A redirection operator is not followed by a file name.
    #[error("syntax error: expected a file name after `{0}`")]
    MissingTarget(&'static str),
    /// A redirection operator appears where it cannot apply.
    #[error("syntax error: unexpected `{0}`")]
    MisplacedRedirection(String),
    /// A command consisting only of a redirection.
    #[error("syntax error: redirection without a command")]
    MissingCommand,
}

/// Parse a raw line into a [`Pipeline`].
///
/// Environment references are expanded first, then the line is split on
/// `&&`/`||` into stages and each stage on `|` into commands. Redirection
/// files are opened here, so a parse that fails on a later stage closes the
/// files of earlier ones when the partial result is dropped.
pub fn parse(line: &str, env: &Environment) -> Result<Pipeline, ParseError> {
    let line = lexer::normalize_operators(&env.expand(line));
    let mut pipeline = Pipeline::default();
    for (segment, edge) in lexer::segments(lexer::tokenize(&line)) {
        if let Some(stage) = build_stage(&segment, edge)? {
            pipeline.stages.push(stage);
        }
    }
    Ok(pipeline)
}

/// Build one stage from a segment, or `None` when it holds no command.
fn build_stage(segment: &str, edge: EdgeCondition) -> Result<Option<Stage>, ParseError> {
    let texts: Vec<Vec<&str>> = segment
        .split('|')
        .map(|text| text.split_whitespace().collect::<Vec<_>>())
        .filter(|tokens| !tokens.is_empty())
        .collect();
    let count = texts.len();
    if count == 0 {
        return Ok(None);
    }

    let mut input = None;
    let mut output = None;
    let mut commands = Vec::with_capacity(count);
    for (index, mut tokens) in texts.into_iter().enumerate() {
        if index == 0 {
            input = take_input(&mut tokens)?;
        }
        if index + 1 == count {
            output = take_output(&mut tokens)?;
        }
        if let Some(op) = tokens.iter().find(|t| matches!(**t, "<" | ">" | ">>")) {
            return Err(ParseError::MisplacedRedirection(op.to_string()));
        }
        let tokens = tokens.into_iter().map(String::from).collect();
        commands.push(Command::new(tokens).ok_or(ParseError::MissingCommand)?);
    }

    Ok(Some(Stage {
        commands,
        input,
        output,
        edge,
    }))
}

/// Remove `operator target` from `tokens` and return the target.
fn extract_target(
    tokens: &mut Vec<&str>,
    operator: &'static str,
) -> Result<Option<PathBuf>, ParseError> {
    let Some(index) = tokens.iter().position(|t| *t == operator) else {
        return Ok(None);
    };
    let target = tokens
        .get(index + 1)
        .map(PathBuf::from)
        .ok_or(ParseError::MissingTarget(operator))?;
    tokens.remove(index);
    tokens.remove(index);
    Ok(Some(target))
}

fn take_input(tokens: &mut Vec<&str>) -> Result<Option<InputRedirect>, ParseError> {
    let Some(path) = extract_target(tokens, "<")? else {
        return Ok(None);
    };
    match File::open(&path) {
        Ok(file) => Ok(Some(InputRedirect { path, file })),
        Err(source) => Err(ParseError::OpenFailed { path, source }),
    }
}

fn take_output(tokens: &mut Vec<&str>) -> Result<Option<OutputRedirect>, ParseError> {
    let append = tokens.iter().position(|t| *t == ">>");
    let truncate = tokens.iter().position(|t| *t == ">");
    let mode = match (truncate, append) {
        (None, None) => return Ok(None),
        (Some(t), Some(a)) if a < t => OutputMode::Append,
        (Some(_), _) => OutputMode::Truncate,
        (None, Some(_)) => OutputMode::Append,
    };
    let Some(path) = extract_target(tokens, mode.operator())? else {
        return Ok(None);
    };
    let mut options = OpenOptions::new();
    match mode {
        OutputMode::Truncate => options.write(true).create(true).truncate(true),
        OutputMode::Append => options.append(true).create(true),
    };
    match options.open(&path) {
        Ok(file) => Ok(Some(OutputRedirect { path, mode, file })),
        Err(source) => Err(ParseError::CreateFailed { path, source }),
    }
}
