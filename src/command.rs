use std::io::{IsTerminal, Read, Write};
use std::os::fd::AsFd;
use std::process::{ExitStatus, Stdio};

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells and many command-line tools.
pub type ExitCode = i32;

/// Status of a command that ran and succeeded.
pub const SUCCESS: ExitCode = 0;

/// Status reported for a failed builtin.
pub const FAILURE: ExitCode = 1;

/// Status reported for a line that could not be parsed.
pub const SYNTAX_ERROR: ExitCode = 2;

/// Status reported when a program exists but cannot be executed.
pub const NOT_EXECUTABLE: ExitCode = 126;

/// Status reported when a program cannot be found.
pub const NOT_FOUND: ExitCode = 127;

/// Abstraction over a readable input stream that can also be converted into
/// a [`Stdio`] handle for spawning external processes.
///
/// Implementors typically wrap standard input, a pipe or a redirection file.
/// A blanket implementation exists for any type that implements `Read` and
/// `Into<Stdio>` (e.g. [`std::fs::File`]).
pub trait Stdin: Read {
    /// Convert this input into a [`Stdio`] handle suitable for `std::process::Command`.
    fn stdio(self: Box<Self>) -> Stdio;
}

impl<T: Read + Into<Stdio>> Stdin for T {
    fn stdio(self: Box<Self>) -> Stdio {
        (*self).into()
    }
}

/// Abstraction over a writable output stream that can also be converted into
/// a [`Stdio`] handle for spawning external processes.
///
/// A blanket implementation exists for any type that implements `Write`, `Into<Stdio>`
/// and `AsFd` (e.g. [`std::fs::File`] or [`std::io::Stdout`]).
pub trait Stdout: Write {
    /// Convert this output into a [`Stdio`] handle suitable for `std::process::Command`.
    fn stdio(self: Box<Self>) -> Stdio;

    /// Whether the stream is attached to a terminal.
    fn is_terminal(&self) -> bool;
}

impl<T: Write + Into<Stdio> + AsFd> Stdout for T {
    fn stdio(self: Box<Self>) -> Stdio {
        (*self).into()
    }

    fn is_terminal(&self) -> bool {
        self.as_fd().is_terminal()
    }
}

/// One command of a stage: the program or builtin name followed by its arguments.
///
/// A command always holds at least one token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    tokens: Vec<String>,
}

impl Command {
    /// Build a command from its tokens, or `None` when there are none.
    pub fn new(tokens: Vec<String>) -> Option<Self> {
        if tokens.is_empty() {
            None
        } else {
            Some(Self { tokens })
        }
    }

    /// Program or builtin name.
    pub fn name(&self) -> &str {
        &self.tokens[0]
    }

    /// Arguments following the name.
    pub fn args(&self) -> &[String] {
        &self.tokens[1..]
    }

    /// All tokens, name included.
    pub fn argv(&self) -> &[String] {
        &self.tokens
    }
}

/// Convert the wait status of a reaped child into a shell exit code.
///
/// A child terminated by signal `N` reports `128 + N`.
pub fn exit_code(status: ExitStatus) -> ExitCode {
    match status.code() {
        Some(code) => code,
        None => terminated_by_signal(status),
    }
}

fn terminated_by_signal(status: ExitStatus) -> ExitCode {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = status.signal() {
        128 + signal
    } else if status.core_dumped() {
        255
    } else {
        -1
    }
}
