use anyhow::Context;
use argh::FromArgs;
use pipesh::command::FAILURE;
use pipesh::completion::ShellHelper;
use pipesh::input::{Editor, LineSource, OneShot, ScriptSource};
use pipesh::{Config, Interpreter, Session, StdStreams};
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(FromArgs)]
/// A small shell with pipes, redirections and `&&`/`||` chaining.
struct Args {
    #[argh(option, short = 'c')]
    /// run a single line and exit with its status.
    command: Option<String>,

    #[argh(option)]
    /// configuration file to use instead of ~/.config/pipesh/config.toml.
    config: Option<PathBuf>,

    #[argh(switch)]
    /// print parsed pipelines and stage decisions to stderr.
    trace: bool,
}

fn load_config(path: Option<PathBuf>) -> Config {
    let Some(path) = path.or_else(Config::default_path) else {
        return Config::default();
    };
    Config::load(&path).unwrap_or_else(|err| {
        eprintln!("pipesh: {err}");
        Config::default()
    })
}

fn line_source(args: &Args, config: &Config, interpreter: &Interpreter) -> anyhow::Result<Box<dyn LineSource>> {
    if let Some(line) = &args.command {
        return Ok(Box::new(OneShot::new(line.as_str())));
    }
    if io::stdin().is_terminal() {
        let helper = ShellHelper::new(interpreter.registry().names());
        let editor = Editor::new(
            helper,
            config.terminal.history_limit,
            Some(config.history_path()),
        )?;
        return Ok(Box::new(editor));
    }
    Ok(Box::new(ScriptSource::new(io::stdin().lock())))
}

fn run(args: Args) -> anyhow::Result<i32> {
    let config = load_config(args.config.clone());
    let interpreter = Interpreter::new(StdStreams::inherit()).with_trace(args.trace || config.trace);
    let source = line_source(&args, &config, &interpreter).context("boot")?;
    let session = Session::boot(interpreter, source, &config).context("boot")?;
    session.run()
}

fn main() -> ExitCode {
    let args: Args = argh::from_env();
    match run(args) {
        Ok(code) => ExitCode::from((code & 0xff) as u8),
        Err(err) => {
            eprintln!("pipesh: {err:#}");
            ExitCode::from(FAILURE as u8)
        }
    }
}
