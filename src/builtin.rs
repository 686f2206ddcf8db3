use crate::env::Environment;
use argh::{EarlyExit, FromArgs};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use regex::Regex;
use std::env;
use std::fs;
use std::io::{self, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors reported by builtins.
///
/// A builtin error fails only the command that raised it, except for
/// [`BuiltinError::Enumeration`], which is a fault of the system.
#[derive(Debug, Error)]
pub enum BuiltinError {
    #[error("{0}: Not a directory")]
    NotADirectory(String),
    #[error("too many arguments")]
    TooManyArguments,
    #[error("HOME not set")]
    HomeNotSet,
    #[error("{path}: {source}")]
    ChangeDirectory {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to get absolute path name: {0}")]
    PathResolution(#[source] io::Error),
    #[error("{0}: arguments must be process or job IDs")]
    InvalidArgument(String),
    #[error("({0}) - Operation not permitted")]
    OperationNotPermitted(i32),
    #[error("({0}) - No such process")]
    NoSuchProcess(i32),
    #[error("cannot enumerate processes: {0}")]
    Enumeration(#[source] io::Error),
    #[error("write operation failed: {0}")]
    Write(#[from] io::Error),
    #[error("{0}")]
    Usage(String),
}

impl BuiltinError {
    /// Whether the error must end the session instead of just the stage.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BuiltinError::Enumeration(_))
    }
}

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process without spawning a child process.
pub trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "echo" or "cd".
    fn name() -> &'static str;

    /// Executes the command, writing to the output the executor assigned.
    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<(), BuiltinError>;
}

/// Object-safe form of a builtin with its arguments already parsed.
pub trait Builtin {
    fn run(self: Box<Self>, stdout: &mut dyn Write, env: &mut Environment) -> Result<(), BuiltinError>;
}

impl<T: BuiltinCommand> Builtin for T {
    fn run(self: Box<Self>, stdout: &mut dyn Write, env: &mut Environment) -> Result<(), BuiltinError> {
        T::execute(*self, stdout, env)
    }
}

/// Result of argument parsing that stopped early: `--help` output or a usage error.
struct InvalidArgs {
    output: String,
    is_error: bool,
}

impl Builtin for InvalidArgs {
    fn run(self: Box<Self>, stdout: &mut dyn Write, _env: &mut Environment) -> Result<(), BuiltinError> {
        if self.is_error {
            return Err(BuiltinError::Usage(self.output.trim_end().to_string()));
        }
        writeln!(stdout, "{}", self.output.trim_end())?;
        Ok(())
    }
}

/// Creates a builtin from its name's arguments.
pub trait BuiltinFactory {
    fn name(&self) -> &'static str;
    fn create(&self, args: &[&str]) -> Box<dyn Builtin>;
}

/// Factory for a builtin implemented by `T`.
pub struct Factory<T> {
    _phantom: PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T: BuiltinCommand + 'static> BuiltinFactory for Factory<T> {
    fn name(&self) -> &'static str {
        T::name()
    }

    fn create(&self, args: &[&str]) -> Box<dyn Builtin> {
        match T::from_args(&[T::name()], args) {
            Ok(cmd) => Box::new(cmd),
            Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
                output,
                is_error: status.is_err(),
            }),
        }
    }
}

/// Fixed name→handler table consulted before a command is treated as an
/// external program.
pub struct Registry {
    factories: Vec<Box<dyn BuiltinFactory>>,
}

impl Registry {
    pub fn new(factories: Vec<Box<dyn BuiltinFactory>>) -> Self {
        Self { factories }
    }

    pub fn lookup(&self, name: &str) -> Option<&dyn BuiltinFactory> {
        self.factories
            .iter()
            .find(|factory| factory.name() == name)
            .map(|factory| factory.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.iter().map(|factory| factory.name())
    }
}

impl Default for Registry {
    /// The shell's builtins: `cd`, `cd..`, `pwd`, `echo`, `kill` and `ps`.
    fn default() -> Self {
        Self::new(vec![
            Box::new(Factory::<Cd>::default()),
            Box::new(Factory::<CdUp>::default()),
            Box::new(Factory::<Pwd>::default()),
            Box::new(Factory::<Echo>::default()),
            Box::new(Factory::<Kill>::default()),
            Box::new(Factory::<Ps>::default()),
        ])
    }
}

#[derive(FromArgs)]
/// Print the current working directory to standard output.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn execute(self, stdout: &mut dyn Write, _env: &mut Environment) -> Result<(), BuiltinError> {
        let dir = env::current_dir().map_err(BuiltinError::PathResolution)?;
        writeln!(stdout, "{}", dir.display())?;
        Ok(())
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, or the target is `~`, changes to the directory in HOME.
pub struct Cd {
    #[argh(positional, greedy)]
    /// directory to switch to; absolute or relative to the current directory.
    pub targets: Vec<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<(), BuiltinError> {
        let target = match self.targets.as_slice() {
            [] => None,
            [one] if one == "~" => None,
            [one] => Some(one.clone()),
            _ => return Err(BuiltinError::TooManyArguments),
        };
        let target = match target {
            Some(t) => t,
            None => env.get_var("HOME").ok_or(BuiltinError::HomeNotSet)?,
        };
        change_directory(&target, env)
    }
}

#[derive(FromArgs)]
/// Change to the parent of the current working directory.
pub struct CdUp {}

impl BuiltinCommand for CdUp {
    fn name() -> &'static str {
        "cd.."
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<(), BuiltinError> {
        change_directory("..", env)
    }
}

fn change_directory(target: &str, env: &mut Environment) -> Result<(), BuiltinError> {
    let path = Path::new(target);
    let new_dir = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env.current_dir.join(path)
    };

    let canonical = fs::canonicalize(&new_dir).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory => {
            BuiltinError::NotADirectory(target.to_string())
        }
        _ => BuiltinError::ChangeDirectory {
            path: target.to_string(),
            source,
        },
    })?;
    if !canonical.is_dir() {
        return Err(BuiltinError::NotADirectory(target.to_string()));
    }

    env::set_current_dir(&canonical).map_err(|source| BuiltinError::ChangeDirectory {
        path: target.to_string(),
        source,
    })?;
    env.current_dir = canonical;
    Ok(())
}

#[derive(FromArgs)]
/// write the arguments to standard output, separated by spaces.
/// by default, a trailing newline is printed.
pub struct Echo {
    #[argh(switch, short = 'n')]
    /// do not output the trailing newline.
    pub no_newline: bool,

    #[argh(positional, greedy)]
    /// values to print as-is, separated by spaces.
    pub args: Vec<String>,
}

impl BuiltinCommand for Echo {
    fn name() -> &'static str {
        "echo"
    }

    fn execute(self, stdout: &mut dyn Write, _env: &mut Environment) -> Result<(), BuiltinError> {
        let s = self.args.join(" ");
        if self.no_newline {
            write!(stdout, "{}", s)?;
        } else {
            writeln!(stdout, "{}", s)?;
        }
        Ok(())
    }
}

#[derive(FromArgs)]
/// Send SIGTERM to a process.
pub struct Kill {
    #[argh(positional)]
    /// id of the process to terminate.
    pub pid: String,
}

impl BuiltinCommand for Kill {
    fn name() -> &'static str {
        "kill"
    }

    fn execute(self, _stdout: &mut dyn Write, _env: &mut Environment) -> Result<(), BuiltinError> {
        let pid: i32 = self
            .pid
            .parse()
            .map_err(|_| BuiltinError::InvalidArgument(self.pid.clone()))?;
        match kill(Pid::from_raw(pid), Signal::SIGTERM) {
            Ok(()) => Ok(()),
            Err(Errno::ESRCH) => Err(BuiltinError::NoSuchProcess(pid)),
            Err(_) => Err(BuiltinError::OperationNotPermitted(pid)),
        }
    }
}

#[derive(FromArgs)]
/// List the processes attached to the shell's terminal.
pub struct Ps {}

impl BuiltinCommand for Ps {
    fn name() -> &'static str {
        "ps"
    }

    fn execute(self, stdout: &mut dyn Write, _env: &mut Environment) -> Result<(), BuiltinError> {
        // Without a pseudo-terminal on stdin only the header is printed.
        let tty = fs::read_link("/proc/self/fd/0")
            .ok()
            .filter(|link| link.starts_with("/dev/pts"))
            .and_then(|link| link.file_name().map(|name| name.to_string_lossy().into_owned()))
            .unwrap_or_default();
        let same_terminal = Regex::new(&format!("/dev/pts/{}$", regex::escape(&tty)))
            .map_err(|e| BuiltinError::Enumeration(io::Error::other(e)))?;

        let processes = list_processes(Path::new("/proc")).map_err(BuiltinError::Enumeration)?;
        writeln!(stdout, "    PID TTY          TIME CMD")?;
        if tty.is_empty() {
            return Ok(());
        }
        for (pid, dir) in processes {
            let Ok(link) = fs::read_link(dir.join("fd/0")) else {
                continue;
            };
            if !same_terminal.is_match(&link.to_string_lossy()) {
                continue;
            }
            let comm = fs::read_to_string(dir.join("comm")).unwrap_or_default();
            writeln!(stdout, "{:>7} pts/{:<8} 00:00:00 {}", pid, tty, comm.trim_end())?;
        }
        Ok(())
    }
}

/// Numeric entries of a procfs-like directory, sorted by pid.
fn list_processes(proc_root: &Path) -> io::Result<Vec<(i32, PathBuf)>> {
    let mut processes = Vec::new();
    for entry in fs::read_dir(proc_root)? {
        let entry = entry?;
        if let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<i32>().ok()) {
            processes.push((pid, entry.path()));
        }
    }
    processes.sort_by_key(|(pid, _)| *pid);
    Ok(processes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use crate::test_support::lock_current_dir;
    use std::process::Command;
    use tempfile::TempDir;

    fn run(registry: &Registry, argv: &[&str], env: &mut Environment) -> (Result<(), BuiltinError>, String) {
        let factory = registry.lookup(argv[0]).expect("builtin exists");
        let mut out = Vec::new();
        let res = factory.create(&argv[1..]).run(&mut out, env);
        (res, String::from_utf8(out).unwrap())
    }

    #[test]
    fn registry_knows_the_fixed_set() {
        let registry = Registry::default();
        let mut names: Vec<_> = registry.names().collect();
        names.sort();
        assert_eq!(names, ["cd", "cd..", "echo", "kill", "ps", "pwd"]);
        assert!(registry.contains("echo"));
        assert!(!registry.contains("ls"));
    }

    #[test]
    fn test_pwd_prints_current_dir() {
        let _lock = lock_current_dir();
        let cur = env::current_dir().unwrap();
        let mut env = Environment::new();

        let (res, out) = run(&Registry::default(), &["pwd"], &mut env);

        assert!(res.is_ok());
        assert_eq!(out, format!("{}\n", cur.display()));
    }

    #[test]
    fn test_echo_with_and_without_newline() {
        let registry = Registry::default();
        let mut env = Environment::new();

        let (res, out) = run(&registry, &["echo", "hello", "world"], &mut env);
        assert!(res.is_ok());
        assert_eq!(out, "hello world\n");

        let (res, out) = run(&registry, &["echo", "-n", "foo", "bar"], &mut env);
        assert!(res.is_ok());
        assert_eq!(out, "foo bar");

        let (res, out) = run(&registry, &["echo"], &mut env);
        assert!(res.is_ok());
        assert_eq!(out, "\n");
    }

    #[test]
    fn echo_reports_write_faults() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::from(io::ErrorKind::BrokenPipe))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
        let echo = Echo {
            no_newline: false,
            args: vec!["x".into()],
        };
        let res = echo.execute(&mut Broken, &mut Environment::new());
        assert_matches!(res, Err(BuiltinError::Write(_)));
    }

    #[test]
    fn help_is_printed_and_succeeds() {
        let (res, out) = run(&Registry::default(), &["echo", "--help"], &mut Environment::new());
        assert!(res.is_ok());
        assert!(out.contains("Usage: echo"));
    }

    #[test]
    fn test_cd_to_absolute_path() {
        let _lock = lock_current_dir();
        let temp = TempDir::new().unwrap();
        let canonical_temp = fs::canonicalize(temp.path()).unwrap();
        let orig = env::current_dir().unwrap();
        let mut env = Environment::new();

        let target = canonical_temp.to_string_lossy().to_string();
        let (res, _) = run(&Registry::default(), &["cd", &target], &mut env);
        let new_cwd = env::current_dir().unwrap();
        env::set_current_dir(&orig).unwrap();

        assert!(res.is_ok());
        assert_eq!(fs::canonicalize(new_cwd).unwrap(), canonical_temp);
        assert_eq!(env.current_dir, canonical_temp);
    }

    #[test]
    fn test_cd_to_home_when_none_or_tilde() {
        let _lock = lock_current_dir();
        let temp = TempDir::new().unwrap();
        let canonical_temp = fs::canonicalize(temp.path()).unwrap();
        let orig = env::current_dir().unwrap();

        for argv in [&["cd"][..], &["cd", "~"][..]] {
            let mut env = Environment::new();
            env.set_var("HOME", canonical_temp.to_string_lossy().to_string());
            let (res, _) = run(&Registry::default(), argv, &mut env);
            let new_cwd = env::current_dir().unwrap();
            env::set_current_dir(&orig).unwrap();

            assert!(res.is_ok());
            assert_eq!(fs::canonicalize(new_cwd).unwrap(), canonical_temp);
        }
    }

    #[test]
    fn cd_up_moves_to_parent() {
        let _lock = lock_current_dir();
        let temp = TempDir::new().unwrap();
        let inner = temp.path().join("inner");
        fs::create_dir(&inner).unwrap();
        let orig = env::current_dir().unwrap();
        env::set_current_dir(&inner).unwrap();
        let mut env = Environment::new();

        let (res, _) = run(&Registry::default(), &["cd.."], &mut env);
        let new_cwd = env::current_dir().unwrap();
        env::set_current_dir(&orig).unwrap();

        assert!(res.is_ok());
        assert_eq!(new_cwd, fs::canonicalize(temp.path()).unwrap());
    }

    #[test]
    fn test_cd_nonexistent_path_errors() {
        let _lock = lock_current_dir();
        let orig = env::current_dir().unwrap();
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("missing").to_string_lossy().to_string();
        let mut env = Environment::new();

        let (res, _) = run(&Registry::default(), &["cd", &missing], &mut env);

        assert_matches!(res, Err(BuiltinError::NotADirectory(dir)) if dir == missing);
        assert_eq!(env::current_dir().unwrap(), orig);
    }

    #[test]
    fn cd_to_a_file_is_not_a_directory() {
        let _lock = lock_current_dir();
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("file");
        fs::write(&file, "").unwrap();
        let file = file.to_string_lossy().to_string();

        let (res, _) = run(&Registry::default(), &["cd", &file], &mut Environment::new());
        assert_matches!(res, Err(BuiltinError::NotADirectory(_)));
    }

    #[test]
    fn cd_with_two_targets_is_too_many() {
        let _lock = lock_current_dir();
        let (res, _) = run(&Registry::default(), &["cd", "/", "/tmp"], &mut Environment::new());
        assert_matches!(res, Err(BuiltinError::TooManyArguments));
    }

    #[test]
    fn kill_rejects_non_numeric_pid() {
        let (res, _) = run(&Registry::default(), &["kill", "abc"], &mut Environment::new());
        assert_matches!(res, Err(BuiltinError::InvalidArgument(arg)) if arg == "abc");
    }

    #[test]
    fn kill_without_pid_is_a_usage_error() {
        let (res, _) = run(&Registry::default(), &["kill"], &mut Environment::new());
        assert_matches!(res, Err(BuiltinError::Usage(_)));
    }

    #[test]
    fn kill_terminates_a_child() {
        let _lock = lock_current_dir();
        let mut child = Command::new("sleep").arg("5").spawn().unwrap();
        let pid = child.id().to_string();

        let (res, _) = run(&Registry::default(), &["kill", &pid], &mut Environment::new());
        assert!(res.is_ok());

        use std::os::unix::process::ExitStatusExt;
        let status = child.wait().unwrap();
        assert_eq!(status.signal(), Some(Signal::SIGTERM as i32));
    }

    #[test]
    fn kill_unknown_process() {
        // Pids are capped well below i32::MAX on Linux.
        let (res, _) = run(&Registry::default(), &["kill", "2147483000"], &mut Environment::new());
        assert_matches!(res, Err(BuiltinError::NoSuchProcess(2147483000)));
    }

    #[test]
    fn ps_prints_header() {
        let (res, out) = run(&Registry::default(), &["ps"], &mut Environment::new());
        assert!(res.is_ok());
        assert!(out.starts_with("    PID TTY          TIME CMD\n"));
    }

    #[test]
    fn list_processes_reads_numeric_entries_only() {
        let root = TempDir::new().unwrap();
        for name in ["12", "3", "self", "sys"] {
            fs::create_dir(root.path().join(name)).unwrap();
        }
        let pids: Vec<i32> = list_processes(root.path())
            .unwrap()
            .into_iter()
            .map(|(pid, _)| pid)
            .collect();
        assert_eq!(pids, [3, 12]);
    }

    #[test]
    fn enumeration_failure_is_fatal() {
        let err = list_processes(Path::new("/pipesh/no/such/proc")).unwrap_err();
        assert!(BuiltinError::Enumeration(err).is_fatal());
        assert!(!BuiltinError::TooManyArguments.is_fatal());
    }
}
