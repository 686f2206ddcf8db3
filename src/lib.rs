//! A small shell-like command interpreter.
//!
//! A line is parsed into a [`parser::Pipeline`] of stages joined by `&&` and
//! `||`; each stage is a run of commands joined by pipes, with optional `<`,
//! `>` and `>>` redirections. Builtins (`cd`, `cd..`, `pwd`, `echo`, `kill`,
//! `ps`) run in-process; everything else is spawned as an external program.
//!
//! The main entry point is [`Interpreter`], which runs lines against its own
//! [`env::Environment`]. [`Session`] wraps it with a line source, a prompt,
//! the [`SignalRelay`] forwarding Ctrl-C to running children and a periodic
//! descriptor audit.

pub mod active;
pub mod audit;
pub mod builtin;
pub mod command;
pub mod completion;
pub mod config;
pub mod env;
pub mod executor;
pub mod external;
pub mod input;
pub mod interpreter;
mod io_adapters;
pub mod lexer;
pub mod parser;
pub mod prompt;
pub mod session;
pub mod signal;
#[cfg(test)]
mod test_support;

pub use active::ActiveProcesses;
pub use config::Config;
pub use interpreter::Interpreter;
pub use io_adapters::{StdStreams, pipe};
pub use session::Session;
pub use signal::SignalRelay;
