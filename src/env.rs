use regex::{Captures, Regex};
use std::collections::HashMap;
use std::env as stdenv;
use std::path::PathBuf;
use std::sync::LazyLock;

/// `$$`, `${NAME}` or `$NAME`.
static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(?:(\$)|\{([^}]*)\}|([A-Za-z0-9_]+))").expect("reference pattern is valid")
});

/// Mutable, user-level view of the process environment used by the interpreter.
///
/// The environment contains:
/// - `vars`: a map of environment variables that will be visible to executed commands.
/// - `current_dir`: the working directory for command execution.
///
/// Fields are public so that tests and embedders can build an environment directly.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Key-value store of environment variables (e.g., PATH, HOME).
    pub vars: HashMap<String, String>,
    /// The current working directory for command execution.
    pub current_dir: PathBuf,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    ///
    /// This copies variables from `std::env::vars()` and initializes `current_dir`
    /// from `std::env::current_dir()`.
    pub fn new() -> Self {
        let vars = stdenv::vars().collect();
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self { vars, current_dir }
    }

    /// Get the value of an environment variable.
    ///
    /// Looks up the key in `self.vars` first, falling back to `std::env::var`.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .cloned()
            .or_else(|| stdenv::var(key).ok())
    }

    /// Set or override an environment variable in `self.vars`.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    /// Replace environment references in `line` with their values.
    ///
    /// `$$` expands to the shell's process id and `$PPID` to its parent's.
    /// `$NAME` and `${NAME}` expand to the variable's value, or to nothing when
    /// it is unset. A `$` that does not start a reference is kept as is.
    pub fn expand(&self, line: &str) -> String {
        REFERENCE
            .replace_all(line, |caps: &Captures<'_>| {
                if caps.get(1).is_some() {
                    return std::process::id().to_string();
                }
                let name = caps
                    .get(2)
                    .or_else(|| caps.get(3))
                    .map_or("", |m| m.as_str());
                match name {
                    "PPID" => nix::unistd::getppid().to_string(),
                    "" => String::new(),
                    _ => self.get_var(name).unwrap_or_default(),
                }
            })
            .into_owned()
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
