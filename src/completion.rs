//! Tab completion for the interactive editor.

use rustyline::completion::{Completer, FilenameCompleter, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Helper};
use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// What the word under the cursor completes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    /// First word of a command: builtins and programs on `PATH`.
    Command,
    /// Argument of `cd`.
    Directory,
    /// Argument of `kill`.
    ProcessId,
    /// Anything else.
    File,
}

/// rustyline helper providing command, directory, pid and file completion.
pub struct ShellHelper {
    builtins: Vec<&'static str>,
    files: FilenameCompleter,
}

impl ShellHelper {
    pub fn new(builtins: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            builtins: builtins.into_iter().collect(),
            files: FilenameCompleter::new(),
        }
    }
}

impl Completer for ShellHelper {
    type Candidate = Pair;

    fn complete(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> rustyline::Result<(usize, Vec<Pair>)> {
        let (start, position) = classify(line, pos);
        let prefix = &line[start..pos];
        let names = match position {
            Position::File => return self.files.complete_path(line, pos),
            Position::Command => {
                let path = std::env::var_os("PATH").unwrap_or_default();
                command_candidates(prefix, self.builtins.iter().copied(), &path)
            }
            Position::Directory => {
                let cwd = std::env::current_dir().unwrap_or_default();
                directory_candidates(prefix, &cwd)
            }
            Position::ProcessId => pid_candidates(prefix, Path::new("/proc")),
        };
        let pairs = names
            .into_iter()
            .map(|name| Pair {
                display: name.clone(),
                replacement: name,
            })
            .collect();
        Ok((start, pairs))
    }
}

impl Hinter for ShellHelper {
    type Hint = String;
}

impl Highlighter for ShellHelper {}

impl Validator for ShellHelper {}

impl Helper for ShellHelper {}

fn is_operator(c: char) -> bool {
    matches!(c, '|' | '&')
}

/// Start of the word ending at `pos` and what it should complete to.
fn classify(line: &str, pos: usize) -> (usize, Position) {
    let before = &line[..pos];
    let start = before
        .rfind(|c: char| c.is_whitespace() || is_operator(c))
        .map_or(0, |i| i + 1);
    let command_start = before[..start].rfind(is_operator).map_or(0, |i| i + 1);
    let mut previous = before[command_start..start].split_whitespace();
    let position = match previous.next() {
        None => Position::Command,
        Some("cd") => Position::Directory,
        Some("kill") => Position::ProcessId,
        Some(_) => Position::File,
    };
    (start, position)
}

fn command_candidates<'a>(
    prefix: &str,
    builtins: impl Iterator<Item = &'a str>,
    search_paths: &OsStr,
) -> Vec<String> {
    let mut names: BTreeSet<String> = builtins
        .filter(|name| name.starts_with(prefix))
        .map(str::to_string)
        .collect();
    for dir in std::env::split_paths(search_paths) {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(prefix) {
                continue;
            }
            let executable = entry
                .path()
                .metadata()
                .is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0);
            if executable {
                names.insert(name);
            }
        }
    }
    names.into_iter().collect()
}

/// Directories matching `prefix`, which may itself contain a directory part.
fn directory_candidates(prefix: &str, cwd: &Path) -> Vec<String> {
    let (dir_part, name_part) = match prefix.rfind('/') {
        Some(i) => prefix.split_at(i + 1),
        None => ("", prefix),
    };
    let listed = if dir_part.is_empty() {
        cwd.to_path_buf()
    } else {
        cwd.join(dir_part)
    };
    let Ok(entries) = fs::read_dir(listed) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .flatten()
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(name_part))
        .filter(|name| !name.starts_with('.') || name_part.starts_with('.'))
        .map(|name| format!("{dir_part}{name}/"))
        .collect();
    names.sort();
    names
}

fn pid_candidates(prefix: &str, proc_root: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(proc_root) else {
        return Vec::new();
    };
    let mut pids: Vec<u32> = entries
        .flatten()
        .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
        .filter(|pid: &u32| pid.to_string().starts_with(prefix))
        .collect();
    pids.sort_unstable();
    pids.into_iter().map(|pid| pid.to_string()).collect()
}
