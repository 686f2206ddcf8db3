use crate::audit::DescriptorAudit;
use crate::command::{ExitCode, SUCCESS, SYNTAX_ERROR};
use crate::config::Config;
use crate::input::{Line, LineSource};
use crate::interpreter::Interpreter;
use crate::prompt::Painter;
use crate::signal::SignalRelay;
use anyhow::Context;

/// What the `exit` line asks for.
#[derive(Debug, PartialEq, Eq)]
enum ExitRequest {
    /// Not an `exit` line.
    None,
    Exit(Option<ExitCode>),
    Invalid(String),
}

const EXIT_ALONE: &str = "exit: must be the only command on its line";

fn exit_request(line: &str) -> ExitRequest {
    if line.contains(['|', '&']) {
        // `exit` is not a command a pipeline can run.
        let is_exit = |command: &str| command.split_whitespace().next() == Some("exit");
        return if line.split(['|', '&']).any(is_exit) {
            ExitRequest::Invalid(EXIT_ALONE.to_string())
        } else {
            ExitRequest::None
        };
    }
    let mut words = line.split_whitespace();
    if words.next() != Some("exit") {
        return ExitRequest::None;
    }
    match (words.next(), words.next()) {
        (None, _) => ExitRequest::Exit(None),
        (Some(code), None) => match code.parse() {
            Ok(code) => ExitRequest::Exit(Some(code)),
            Err(_) => ExitRequest::Invalid(format!("exit: {code}: numeric argument required")),
        },
        (Some(_), Some(_)) => ExitRequest::Invalid("exit: too many arguments".to_string()),
    }
}

/// One run of the shell: boot, the read→parse→execute loop, teardown.
pub struct Session {
    interpreter: Interpreter,
    source: Box<dyn LineSource>,
    painter: Painter,
    audit: DescriptorAudit,
    relay: Option<SignalRelay>,
    interrupt_prompt: String,
    exit_message: String,
    last: ExitCode,
}

impl Session {
    /// Start the signal relay and record the descriptor baseline.
    ///
    /// Everything that stays open for the whole session must exist before
    /// this is called, so the audit baseline includes it.
    pub fn boot(interpreter: Interpreter, source: Box<dyn LineSource>, config: &Config) -> anyhow::Result<Self> {
        let relay = SignalRelay::start(interpreter.active().clone()).context("cannot start signal relay")?;
        let audit = DescriptorAudit::new(config.terminal.check_interval).context("cannot read descriptor directory")?;
        Ok(Self {
            interpreter,
            source,
            painter: Painter::new(&config.prompt),
            audit,
            relay: Some(relay),
            interrupt_prompt: config.terminal.interrupt_prompt.clone(),
            exit_message: config.terminal.exit_message.clone(),
            last: SUCCESS,
        })
    }

    /// Run lines until the input ends or `exit` is read, then tear down.
    ///
    /// Returns the status the shell should exit with. Faults of the system
    /// end the loop early and are returned as errors after teardown.
    pub fn run(mut self) -> anyhow::Result<ExitCode> {
        let result = self.run_loop();
        self.teardown();
        result
    }

    fn run_loop(&mut self) -> anyhow::Result<ExitCode> {
        let interactive = self.source.is_interactive();
        loop {
            let prompt = if interactive { self.painter.current() } else { String::new() };
            let line = match self.source.read_line(&prompt)? {
                Line::Text(line) => line,
                Line::Interrupted => {
                    println!("{}", self.interrupt_prompt);
                    continue;
                }
                Line::Eof => {
                    if interactive {
                        println!("{}", self.exit_message);
                    }
                    return Ok(self.last);
                }
            };

            match exit_request(&line) {
                ExitRequest::None => {}
                ExitRequest::Exit(code) => {
                    if interactive {
                        println!("{}", self.exit_message);
                    }
                    return Ok(code.unwrap_or(self.last));
                }
                ExitRequest::Invalid(message) => {
                    self.interpreter.streams().report(message);
                    self.last = SYNTAX_ERROR;
                    continue;
                }
            }

            self.last = self.interpreter.run_line(&line)?;
            self.audit.tick()?;
        }
    }

    fn teardown(&mut self) {
        if let Some(relay) = self.relay.take() {
            relay.stop();
        }
        if let Err(err) = self.source.close() {
            self.interpreter.streams().report(format_args!("{err:#}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::ScriptSource;
    use crate::io_adapters::StdStreams;
    use crate::test_support::lock_current_dir;
    use std::fs::File;
    use std::io::{Cursor, Read, Seek};

    #[test]
    fn exit_lines() {
        assert_eq!(exit_request("echo exit"), ExitRequest::None);
        assert_eq!(exit_request("exit"), ExitRequest::Exit(None));
        assert_eq!(exit_request("exit 3"), ExitRequest::Exit(Some(3)));
        assert_eq!(exit_request("exited"), ExitRequest::None);
        assert_eq!(
            exit_request("exit x"),
            ExitRequest::Invalid("exit: x: numeric argument required".into())
        );
        assert_eq!(
            exit_request("exit 1 2"),
            ExitRequest::Invalid("exit: too many arguments".into())
        );
    }

    #[test]
    fn exit_inside_a_chain_is_rejected() {
        for line in ["true && exit", "exit || true", "echo a | exit 3", "false||exit"] {
            assert_eq!(exit_request(line), ExitRequest::Invalid(EXIT_ALONE.into()), "line {line:?}");
        }
        assert_eq!(exit_request("echo exit | cat"), ExitRequest::None);
        assert_eq!(exit_request("true && echo done"), ExitRequest::None);
    }

    #[test]
    fn script_session_reports_last_status_and_stops_at_exit() {
        let _lock = lock_current_dir();
        let out = tempfile::tempfile().unwrap();
        let streams = StdStreams::inherit()
            .with_input(File::open("/dev/null").unwrap())
            .with_output(out.try_clone().unwrap())
            .with_error(tempfile::tempfile().unwrap());
        let source = ScriptSource::new(Cursor::new("echo one\nfalse\nexit\necho never\n"));

        let session = Session::boot(Interpreter::new(streams), Box::new(source), &Config::default()).unwrap();
        assert_eq!(session.run().unwrap(), 1);

        let mut out = out;
        out.rewind().unwrap();
        let mut got = String::new();
        out.read_to_string(&mut got).unwrap();
        assert_eq!(got, "one\n");
    }
}
