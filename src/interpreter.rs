use crate::active::ActiveProcesses;
use crate::builtin::Registry;
use crate::command::{ExitCode, SUCCESS, SYNTAX_ERROR};
use crate::env::Environment;
use crate::executor::{ExecError, StageExecutor};
use crate::io_adapters::StdStreams;
use crate::parser::{self, EdgeCondition, Pipeline};

/// Whether a stage runs, decided from the edge of the stage before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Run,
    Skip,
}

impl StageState {
    /// `prev_edge` is `None` for the first stage, which always runs. `last`
    /// is the exit code of the last stage that actually ran.
    pub fn decide(prev_edge: Option<EdgeCondition>, last: ExitCode) -> Self {
        match prev_edge {
            Some(EdgeCondition::RunIfSucceeded) if last != SUCCESS => StageState::Skip,
            Some(EdgeCondition::RunIfFailed) if last == SUCCESS => StageState::Skip,
            _ => StageState::Run,
        }
    }
}

/// Pipeline Orchestrator: parses lines and runs their stages in order,
/// gated by `&&` and `||`.
///
/// The interpreter owns the environment, the builtin registry and the set of
/// external processes currently running; the latter can be shared with a
/// [`crate::SignalRelay`] through [`Interpreter::active`].
///
/// Example
/// ```no_run
/// use pipesh::{Interpreter, StdStreams};
/// let mut sh = Interpreter::new(StdStreams::inherit());
/// let code = sh.run_line("echo hello && false || echo recovered").unwrap();
/// assert_eq!(code, 0);
/// ```
pub struct Interpreter {
    env: Environment,
    registry: Registry,
    streams: StdStreams,
    active: ActiveProcesses,
    trace: bool,
}

impl Interpreter {
    /// Create an interpreter with the default builtins and the process environment.
    pub fn new(streams: StdStreams) -> Self {
        Self {
            env: Environment::new(),
            registry: Registry::default(),
            streams,
            active: ActiveProcesses::new(),
            trace: false,
        }
    }

    /// Print every parsed pipeline and each stage decision to the error stream.
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn streams(&self) -> &StdStreams {
        &self.streams
    }

    /// Processes started for the stage in flight.
    pub fn active(&self) -> &ActiveProcesses {
        &self.active
    }

    /// Parse and run one line, returning the exit code of the last stage that ran.
    ///
    /// A line that cannot be parsed is reported and yields status 2. Only
    /// faults of the system are returned as errors.
    pub fn run_line(&mut self, line: &str) -> Result<ExitCode, ExecError> {
        match parser::parse(line, &self.env) {
            Ok(pipeline) => self.run_pipeline(pipeline),
            Err(err) => {
                self.streams.report(err);
                Ok(SYNTAX_ERROR)
            }
        }
    }

    /// Run the stages of `pipeline` in order.
    ///
    /// A skipped stage leaves the last exit code untouched, so the check for
    /// the stage after it sees the code of the last stage that ran. An error
    /// stops the pipeline; the stages not yet reached are dropped, closing
    /// their redirection files.
    pub fn run_pipeline(&mut self, pipeline: Pipeline) -> Result<ExitCode, ExecError> {
        if self.trace {
            self.streams.report(format_args!("trace: {pipeline:#?}"));
        }

        let mut last = SUCCESS;
        let mut prev_edge = None;
        for (index, stage) in pipeline.stages.into_iter().enumerate() {
            let edge = stage.edge;
            let state = StageState::decide(prev_edge, last);
            if state == StageState::Run {
                last = StageExecutor::new(&mut self.env, &self.registry, &self.streams, &self.active)
                    .execute(stage)?;
            }
            if self.trace {
                self.streams
                    .report(format_args!("trace: stage {index}: {state:?}, status {last}"));
            }
            prev_edge = Some(edge);
        }
        Ok(last)
    }
}

impl Default for Interpreter {
    /// An interpreter on the process's own standard streams.
    fn default() -> Self {
        Self::new(StdStreams::inherit())
    }
}
