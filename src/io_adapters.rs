use crate::command::{Stdin, Stdout};
use nix::fcntl::OFlag;
use std::fmt::Display;
use std::fs::File;
use std::io::{self, Read, Result as IoResult, Write};
use std::process::Stdio;

/// The shell's own standard input, handed to the first command of a stage
/// that has no input redirection.
pub struct InheritedStdin(io::Stdin);

impl Read for InheritedStdin {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        self.0.read(buf)
    }
}

impl Stdin for InheritedStdin {
    fn stdio(self: Box<Self>) -> Stdio {
        Stdio::inherit()
    }
}

/// Streams a session hands to commands that are not redirected.
///
/// Each stream is either the process's own or a file standing in for it.
/// Every request returns a fresh duplicate, so whoever receives it owns and
/// closes it independently of the session.
#[derive(Debug, Default)]
pub struct StdStreams {
    input: Option<File>,
    output: Option<File>,
    error: Option<File>,
}

impl StdStreams {
    /// Use the process's standard input, output and error.
    pub fn inherit() -> Self {
        Self::default()
    }

    /// Replace standard input with `file`.
    pub fn with_input(mut self, file: File) -> Self {
        self.input = Some(file);
        self
    }

    /// Replace standard output with `file`.
    pub fn with_output(mut self, file: File) -> Self {
        self.output = Some(file);
        self
    }

    /// Replace standard error with `file`.
    pub fn with_error(mut self, file: File) -> Self {
        self.error = Some(file);
        self
    }

    pub(crate) fn stdin(&self) -> IoResult<Box<dyn Stdin>> {
        Ok(match &self.input {
            Some(file) => Box::new(file.try_clone()?),
            None => Box::new(InheritedStdin(io::stdin())),
        })
    }

    pub(crate) fn stdout(&self) -> IoResult<Box<dyn Stdout>> {
        Ok(match &self.output {
            Some(file) => Box::new(file.try_clone()?),
            None => Box::new(io::stdout()),
        })
    }

    pub(crate) fn stderr(&self) -> IoResult<Stdio> {
        Ok(match &self.error {
            Some(file) => file.try_clone()?.into(),
            None => Stdio::inherit(),
        })
    }

    /// Write one diagnostic line, prefixed with the shell's name, to the error stream.
    pub fn report(&self, message: impl Display) {
        let line = format!("pipesh: {message}\n");
        // Nothing sensible is left to do when the error stream itself fails.
        let _ = match &self.error {
            Some(file) => {
                let mut file = file;
                file.write_all(line.as_bytes())
            }
            None => io::stderr().write_all(line.as_bytes()),
        };
    }
}

/// Create an anonymous pipe, returning its `(read, write)` ends.
///
/// Both ends are close-on-exec, so a child only ever holds the end it was
/// given as a standard stream.
pub fn pipe() -> nix::Result<(File, File)> {
    let (reader, writer) = nix::unistd::pipe2(OFlag::O_CLOEXEC)?;
    Ok((File::from(reader), File::from(writer)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Seek;

    #[test]
    fn pipe_carries_bytes_until_writer_closes() {
        let (mut reader, mut writer) = pipe().unwrap();
        writer.write_all(b"through the pipe").unwrap();
        drop(writer);

        let mut got = String::new();
        reader.read_to_string(&mut got).unwrap();
        assert_eq!(got, "through the pipe");
    }

    #[test]
    fn stdout_duplicates_share_the_file() {
        let file = tempfile::tempfile().unwrap();
        let streams = StdStreams::inherit().with_output(file.try_clone().unwrap());

        streams.stdout().unwrap().write_all(b"one ").unwrap();
        streams.stdout().unwrap().write_all(b"two").unwrap();

        let mut file = file;
        file.rewind().unwrap();
        let mut got = String::new();
        file.read_to_string(&mut got).unwrap();
        assert_eq!(got, "one two");
    }

    #[test]
    fn report_prefixes_diagnostics() {
        let file = tempfile::tempfile().unwrap();
        let streams = StdStreams::inherit().with_error(file.try_clone().unwrap());

        streams.report("cd: too many arguments");

        let mut file = file;
        file.rewind().unwrap();
        let mut got = String::new();
        file.read_to_string(&mut got).unwrap();
        assert_eq!(got, "pipesh: cd: too many arguments\n");
    }
}
