//! Prompt rendering: the working directory, painted, then the prompt symbol.

use crate::config::PromptConfig;
use std::path::Path;

const RESET: &str = "\u{1b}[0m";
const BOLD: &str = "\u{1b}[1m";

/// Prompt used when the working directory cannot be determined.
pub const FALLBACK_PROMPT: &str = "$ ";

/// Colour and weight applied to the path part of the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Painter {
    colour: String,
    bold: bool,
    symbol: String,
}

impl Painter {
    /// Build a painter from the prompt settings; a known theme overrides the
    /// colour and weight.
    pub fn new(config: &PromptConfig) -> Self {
        let (colour, bold) = match theme(&config.theme) {
            Some((colour, bold)) => (colour.to_string(), bold),
            None => (config.path_colour.clone(), config.path_bold),
        };
        Self {
            colour: resolve_colour(&colour),
            bold,
            symbol: config.symbol.clone(),
        }
    }

    pub fn paint(&self, text: &str) -> String {
        let weight = if self.bold { BOLD } else { "" };
        format!("{weight}{}{text}{RESET}", self.colour)
    }

    /// Render the prompt for `cwd`, abbreviating `home` to `~`.
    pub fn render(&self, cwd: &Path, home: Option<&Path>) -> String {
        let shown = match home.and_then(|home| cwd.strip_prefix(home).ok()) {
            Some(rest) if rest.as_os_str().is_empty() => "~".to_string(),
            Some(rest) => format!("~/{}", rest.display()),
            None => cwd.display().to_string(),
        };
        format!("{}{} ", self.paint(&shown), self.symbol)
    }

    /// Prompt for the process's current directory.
    pub fn current(&self) -> String {
        let Ok(cwd) = std::env::current_dir() else {
            return FALLBACK_PROMPT.to_string();
        };
        let home = std::env::var_os("HOME").filter(|home| !home.is_empty());
        self.render(&cwd, home.as_deref().map(Path::new))
    }
}

impl Default for Painter {
    fn default() -> Self {
        Self::new(&PromptConfig::default())
    }
}

fn theme(name: &str) -> Option<(&'static str, bool)> {
    match name.trim().to_lowercase().as_str() {
        "pipesh" => Some(("yellow", false)),
        "wildberries" => Some(("\u{1b}[38;2;203;17;171m", true)),
        "monokai" => Some(("\u{1b}[38;2;249;38;114m", true)),
        "ohmybash" => Some(("green", false)),
        _ => None,
    }
}

fn resolve_colour(colour: &str) -> String {
    let colour = colour.trim();
    let code = match colour.to_lowercase().as_str() {
        "" => "",
        "default" => "\u{1b}[39m",
        "black" => "\u{1b}[30m",
        "red" => "\u{1b}[31m",
        "green" => "\u{1b}[32m",
        "yellow" => "\u{1b}[33m",
        "bright yellow" => "\u{1b}[93m",
        "blue" => "\u{1b}[94m",
        "magenta" => "\u{1b}[35m",
        "cyan" => "\u{1b}[36m",
        "white" => "\u{1b}[37m",
        _ => colour,
    };
    code.to_string()
}
