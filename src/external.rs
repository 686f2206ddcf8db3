//! Process Spawner: starts external programs with the stdio handles chosen by
//! the stage executor and hands back a waitable [`RunningProcess`].

use crate::active::ActiveProcesses;
use crate::command::{self, Command, ExitCode, NOT_EXECUTABLE, NOT_FOUND, Stdin, Stdout};
use crate::env::Environment;
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{Id, WaitPidFlag, waitid};
use nix::unistd::Pid;
use std::borrow::Cow;
use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Stdio};
use thiserror::Error;

/// Why an external program could not be started.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("{0}: command not found")]
    NotFound(String),
    #[error("{0}: permission denied")]
    PermissionDenied(String),
    #[error("{name}: {source}")]
    Os {
        name: String,
        #[source]
        source: io::Error,
    },
}

impl SpawnError {
    /// Status recorded for the command that failed to start.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            SpawnError::NotFound(_) => NOT_FOUND,
            SpawnError::PermissionDenied(_) | SpawnError::Os { .. } => NOT_EXECUTABLE,
        }
    }

    /// Only running out of processes, descriptors or memory is a fault of the
    /// system. Everything else belongs to the program and ends just its stage.
    pub fn is_fatal(&self) -> bool {
        let SpawnError::Os { source, .. } = self else {
            return false;
        };
        matches!(
            source.raw_os_error().map(Errno::from_raw),
            Some(Errno::EAGAIN | Errno::EMFILE | Errno::ENFILE | Errno::ENOMEM)
        )
    }
}

/// An external program started by the shell and not yet reaped.
#[derive(Debug)]
pub struct RunningProcess {
    child: Child,
    pid: Pid,
}

impl RunningProcess {
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Deliver `SIGINT` to the process.
    pub fn interrupt(&self) -> nix::Result<()> {
        kill(self.pid, Signal::SIGINT)
    }

    /// Block until the process exits and return its exit code.
    ///
    /// The process stays tracked in `active` until it has exited but is not
    /// yet reaped, so its pid cannot be reused while the relay may signal it.
    pub fn wait(mut self, active: &ActiveProcesses) -> io::Result<ExitCode> {
        loop {
            match waitid(Id::Pid(self.pid), WaitPidFlag::WEXITED | WaitPidFlag::WNOWAIT) {
                Ok(_) => break,
                Err(Errno::EINTR) => continue,
                Err(errno) => {
                    active.forget(self.pid);
                    return Err(errno.into());
                }
            }
        }
        active.forget(self.pid);
        let status = self.child.wait()?;
        Ok(command::exit_code(status))
    }
}

/// Programs that drop their colours when not asked explicitly.
const COLOURED: [&str; 2] = ["ls", "grep"];

/// Extra leading argument keeping `name`'s colours on a terminal.
fn colour_flag(name: &str, to_terminal: bool) -> Option<&'static str> {
    (to_terminal && COLOURED.contains(&name)).then_some("--color=always")
}

/// Start `command` with the given standard streams.
///
/// The program is resolved through the environment's `PATH`; the child gets
/// the environment's variables and inherits the shell's working directory,
/// which `cd` keeps equal to [`Environment::current_dir`]. Handles passed in
/// are consumed, so the parent's copies are closed once the child has started.
pub fn spawn(
    command: &Command,
    stdin: Box<dyn Stdin>,
    stdout: Box<dyn Stdout>,
    stderr: Stdio,
    env: &Environment,
) -> Result<RunningProcess, SpawnError> {
    let name = command.name();
    let search_paths = env.get_var("PATH").unwrap_or_default();
    let program = find_command_path(OsStr::new(&search_paths), Path::new(name))
        .ok_or_else(|| SpawnError::NotFound(name.to_string()))?
        .into_owned();

    let mut process = std::process::Command::new(&program);
    process.args(colour_flag(name, stdout.is_terminal()));
    // The program was found above, so a failure here is about running it:
    // a bad interpreter line or format, or a lack of resources.
    let child = process
        .args(command.args())
        .stdin(stdin.stdio())
        .stdout(stdout.stdio())
        .stderr(stderr)
        .env_clear()
        .envs(env.vars.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .spawn()
        .map_err(|source| match source.kind() {
            io::ErrorKind::PermissionDenied => SpawnError::PermissionDenied(name.to_string()),
            _ => SpawnError::Os {
                name: name.to_string(),
                source,
            },
        })?;
    let pid = Pid::from_raw(child.id() as i32);
    Ok(RunningProcess { child, pid })
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it exists.
/// - Relative with multiple components (e.g., `bin/sh` or `./foo`): returns it if it exists.
/// - Single path component (no separators): search each directory in `search_paths` (PATH)
///   and return the first existing match.
/// - Empty path: returns `None`.
///
/// Returns either a borrowed reference to the provided `path` or an owned `PathBuf`
/// when the result is discovered via PATH lookup.
pub fn find_command_path<'a>(search_paths: &OsStr, path: &'a Path) -> Option<Cow<'a, Path>> {
    if path.is_absolute() {
        return find_by_path(path).map(Cow::Borrowed);
    }

    let mut components = path.components();
    let first = components.next();
    let second = components.next();
    match (first, second) {
        // Empty path -> not found
        (None, None) => None,
        // Single component -> search in PATH
        (Some(x), None) => find_in_path(search_paths, x.as_os_str()).map(Cow::Owned),
        // Multiple components -> relative to the current dir
        _ => find_by_path(path).map(Cow::Borrowed),
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(cmd))
        .find(|path| path.is_file())
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if path.exists() { Some(path) } else { None }
}
