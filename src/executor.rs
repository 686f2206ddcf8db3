//! Stage Executor: wires the pipes and redirections of one [`Stage`], runs its
//! commands and collects the stage's exit code.

use crate::active::ActiveProcesses;
use crate::builtin::{BuiltinError, Registry};
use crate::command::{Command, ExitCode, FAILURE, Stdin, Stdout, SUCCESS};
use crate::env::Environment;
use crate::external::{self, RunningProcess, SpawnError};
use crate::io_adapters::{self, StdStreams};
use crate::parser::Stage;
use std::fs::File;
use std::io::{self, Write};
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// Faults that end the session rather than the stage.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("cannot create pipe: {0}")]
    Pipe(#[from] nix::Error),
    #[error("cannot duplicate standard stream: {0}")]
    Stream(#[source] io::Error),
    #[error("{name}: {source}")]
    Builtin {
        name: String,
        #[source]
        source: BuiltinError,
    },
    #[error(transparent)]
    Spawn(SpawnError),
    #[error("cannot wait for {name}: {source}")]
    Wait {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("cannot start output writer: {0}")]
    Feeder(#[source] io::Error),
}

/// A command that was launched: either already finished (builtins, failed
/// launches) or still running.
enum Launched {
    Finished(ExitCode),
    Running { name: String, process: RunningProcess },
    /// A builtin whose output is still being written into the next pipe.
    Feeding {
        name: String,
        feeder: JoinHandle<io::Result<()>>,
    },
}

/// Where a command's standard output goes.
enum Sink {
    /// The stage's own output: a redirection file or the session's stdout.
    Stage(Box<dyn Stdout>),
    /// Write end of the pipe to the next command.
    Pipe(File),
}

impl Sink {
    fn into_stdout(self) -> Box<dyn Stdout> {
        match self {
            Sink::Stage(out) => out,
            Sink::Pipe(file) => Box::new(file),
        }
    }
}

/// Write `output` into `pipe` from a thread of its own, closing the pipe when done.
fn feed(mut pipe: File, output: Vec<u8>) -> io::Result<JoinHandle<io::Result<()>>> {
    thread::Builder::new()
        .name("builtin-output".into())
        .spawn(move || pipe.write_all(&output))
}

/// Runs one stage at a time against the session's state.
pub struct StageExecutor<'a> {
    env: &'a mut Environment,
    registry: &'a Registry,
    streams: &'a StdStreams,
    active: &'a ActiveProcesses,
}

impl<'a> StageExecutor<'a> {
    pub fn new(
        env: &'a mut Environment,
        registry: &'a Registry,
        streams: &'a StdStreams,
        active: &'a ActiveProcesses,
    ) -> Self {
        Self {
            env,
            registry,
            streams,
            active,
        }
    }

    /// Run every command of `stage` and return the stage's exit code.
    ///
    /// The code is the status of the rightmost command that did not succeed,
    /// or 0. Whatever happens during launching, every process already started
    /// is waited for before returning, and every descriptor the stage owned is
    /// closed.
    pub fn execute(&mut self, stage: Stage) -> Result<ExitCode, ExecError> {
        let mut launched = Vec::with_capacity(stage.commands.len());
        let launch_result = self.launch_all(stage, &mut launched);
        let (code, wait_result) = self.wait_all(launched);
        self.active.clear();
        launch_result?;
        wait_result?;
        Ok(code)
    }

    fn launch_all(&mut self, stage: Stage, launched: &mut Vec<Launched>) -> Result<(), ExecError> {
        let Stage {
            commands,
            input,
            output,
            ..
        } = stage;

        let mut next_input: Option<Box<dyn Stdin>> = Some(match input {
            Some(redirect) => Box::new(redirect.file),
            None => self.streams.stdin().map_err(ExecError::Stream)?,
        });
        let mut last_output: Option<Box<dyn Stdout>> = Some(match output {
            Some(redirect) => Box::new(redirect.file),
            None => self.streams.stdout().map_err(ExecError::Stream)?,
        });

        let count = commands.len();
        for (index, command) in commands.iter().enumerate() {
            let Some(stdin) = next_input.take() else {
                break;
            };
            let stdout = if index + 1 == count {
                match last_output.take() {
                    Some(out) => Sink::Stage(out),
                    None => break,
                }
            } else {
                let (reader, writer) = io_adapters::pipe()?;
                next_input = Some(Box::new(reader));
                Sink::Pipe(writer)
            };

            if !self.launch(command, stdin, stdout, launched)? {
                break;
            }
        }
        Ok(())
    }

    /// Launch one command. Returns `false` when the remaining commands of
    /// the stage must not be launched.
    fn launch(
        &mut self,
        command: &Command,
        stdin: Box<dyn Stdin>,
        stdout: Sink,
        launched: &mut Vec<Launched>,
    ) -> Result<bool, ExecError> {
        let name = command.name();
        if let Some(factory) = self.registry.lookup(name) {
            drop(stdin);
            let args: Vec<&str> = command.args().iter().map(String::as_str).collect();
            let builtin = factory.create(&args);
            let result = match stdout {
                Sink::Stage(mut stdout) => builtin
                    .run(&mut stdout, self.env)
                    .and_then(|()| stdout.flush().map_err(BuiltinError::Write))
                    .map(|()| None),
                // Nothing reads the pipe before the next command starts, so
                // the output is collected and written once launching moves on.
                Sink::Pipe(pipe) => {
                    let mut captured = Vec::new();
                    builtin.run(&mut captured, self.env).map(|()| Some((pipe, captured)))
                }
            };
            return match result {
                Ok(None) => {
                    launched.push(Launched::Finished(SUCCESS));
                    Ok(true)
                }
                Ok(Some((pipe, captured))) => match feed(pipe, captured) {
                    Ok(feeder) => {
                        launched.push(Launched::Feeding {
                            name: name.to_string(),
                            feeder,
                        });
                        Ok(true)
                    }
                    Err(source) => {
                        launched.push(Launched::Finished(FAILURE));
                        Err(ExecError::Feeder(source))
                    }
                },
                Err(source) if source.is_fatal() => {
                    launched.push(Launched::Finished(FAILURE));
                    Err(ExecError::Builtin {
                        name: name.to_string(),
                        source,
                    })
                }
                Err(err) => {
                    self.streams.report(format_args!("{name}: {err}"));
                    launched.push(Launched::Finished(FAILURE));
                    Ok(false)
                }
            };
        }

        let stderr = self.streams.stderr().map_err(ExecError::Stream)?;
        match external::spawn(command, stdin, stdout.into_stdout(), stderr, self.env) {
            Ok(process) => {
                self.active.track(process.pid());
                launched.push(Launched::Running {
                    name: name.to_string(),
                    process,
                });
                Ok(true)
            }
            Err(err) if err.is_fatal() => {
                launched.push(Launched::Finished(err.exit_code()));
                Err(ExecError::Spawn(err))
            }
            Err(err) => {
                self.streams.report(&err);
                launched.push(Launched::Finished(err.exit_code()));
                Ok(false)
            }
        }
    }

    fn wait_all(&self, launched: Vec<Launched>) -> (ExitCode, Result<(), ExecError>) {
        let mut code = SUCCESS;
        let mut fault = Ok(());
        for entry in launched {
            let status = match entry {
                Launched::Finished(status) => status,
                Launched::Running { name, process } => match process.wait(self.active) {
                    Ok(status) => status,
                    Err(source) => {
                        if fault.is_ok() {
                            fault = Err(ExecError::Wait { name, source });
                        }
                        FAILURE
                    }
                },
                Launched::Feeding { name, feeder } => match feeder.join() {
                    Ok(Ok(())) => SUCCESS,
                    // The reader quit early and took what it wanted.
                    Ok(Err(err)) if err.kind() == io::ErrorKind::BrokenPipe => SUCCESS,
                    Ok(Err(err)) => {
                        self.streams.report(format_args!("{name}: {err}"));
                        FAILURE
                    }
                    Err(_) => FAILURE,
                },
            };
            if status != SUCCESS {
                code = status;
            }
        }
        (code, fault)
    }
}
