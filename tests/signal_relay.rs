use nix::sys::signal::{Signal, raise};
use pipesh::{Interpreter, SignalRelay, StdStreams};
use std::fs::File;
use std::thread;
use std::time::{Duration, Instant};

// The only test in this binary: it installs a process-wide SIGINT handler.
#[test]
fn interrupt_reaches_running_child_only() {
    let streams = StdStreams::inherit()
        .with_input(File::open("/dev/null").unwrap())
        .with_output(tempfile::tempfile().unwrap())
        .with_error(tempfile::tempfile().unwrap());
    let mut sh = Interpreter::new(streams);
    let active = sh.active().clone();
    let relay = SignalRelay::start(active.clone()).unwrap();

    let sender = thread::spawn(move || {
        let deadline = Instant::now() + Duration::from_secs(5);
        while active.is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        raise(Signal::SIGINT).unwrap();
    });

    let started = Instant::now();
    let code = sh.run_line("sleep 5").unwrap();
    sender.join().unwrap();

    assert_eq!(code, 128 + Signal::SIGINT as i32);
    assert!(started.elapsed() < Duration::from_secs(4));

    // The shell itself survived and keeps running lines.
    assert_eq!(sh.run_line("true").unwrap(), 0);
    relay.stop();
}
