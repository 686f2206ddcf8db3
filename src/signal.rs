//! Signal Relay: forwards `SIGINT` received by the shell to the external
//! processes of the stage in flight.
//!
//! The handler itself only writes a byte to a pipe; a background thread polls
//! that pipe and does the actual forwarding outside of signal context.

use crate::active::ActiveProcesses;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use std::fs::File;
use std::io::{self, Read};
use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::sync::atomic::{AtomicI32, Ordering};
use std::thread::{self, JoinHandle};

/// Write end of the pipe the handler notifies, or -1 when no relay runs.
static NOTIFY_FD: AtomicI32 = AtomicI32::new(-1);

extern "C" fn on_interrupt(_: nix::libc::c_int) {
    let fd = NOTIFY_FD.load(Ordering::Relaxed);
    if fd >= 0 {
        let byte = 1u8;
        // SAFETY: write(2) is async-signal-safe and the buffer outlives the call.
        unsafe {
            nix::libc::write(fd, (&byte as *const u8).cast(), 1);
        }
    }
}

/// Handle to the running relay. Only one relay may run per process.
///
/// Dropping the handle stops the relay and restores the previous `SIGINT`
/// disposition.
pub struct SignalRelay {
    previous: Option<SigAction>,
    notify_writer: Option<OwnedFd>,
    stop_writer: Option<OwnedFd>,
    thread: Option<JoinHandle<()>>,
}

impl SignalRelay {
    /// Install the `SIGINT` handler and start the relay thread.
    pub fn start(active: ActiveProcesses) -> nix::Result<Self> {
        let (notify_reader, notify_writer) = nix::unistd::pipe2(OFlag::O_CLOEXEC | OFlag::O_NONBLOCK)?;
        let (stop_reader, stop_writer) = nix::unistd::pipe2(OFlag::O_CLOEXEC)?;

        let thread = thread::Builder::new()
            .name("signal-relay".to_string())
            .spawn(move || relay(notify_reader, stop_reader, active))
            .map_err(|e| e.raw_os_error().map_or(Errno::EAGAIN, Errno::from_raw))?;

        NOTIFY_FD.store(notify_writer.as_raw_fd(), Ordering::SeqCst);
        let action = SigAction::new(
            SigHandler::Handler(on_interrupt),
            SaFlags::SA_RESTART,
            SigSet::empty(),
        );
        // SAFETY: the handler only touches an atomic and calls write(2).
        let previous = match unsafe { sigaction(Signal::SIGINT, &action) } {
            Ok(previous) => previous,
            Err(errno) => {
                NOTIFY_FD.store(-1, Ordering::SeqCst);
                drop(stop_writer);
                let _ = thread.join();
                return Err(errno);
            }
        };

        Ok(Self {
            previous: Some(previous),
            notify_writer: Some(notify_writer),
            stop_writer: Some(stop_writer),
            thread: Some(thread),
        })
    }

    /// Restore the previous `SIGINT` disposition and join the relay thread.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(previous) = self.previous.take() {
            // SAFETY: reinstalls the disposition that was active before `start`.
            let _ = unsafe { sigaction(Signal::SIGINT, &previous) };
        }
        NOTIFY_FD.store(-1, Ordering::SeqCst);
        self.notify_writer.take();
        self.stop_writer.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for SignalRelay {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn relay(notify: OwnedFd, stop: OwnedFd, active: ActiveProcesses) {
    let mut notify = File::from(notify);
    loop {
        let mut fds = [
            PollFd::new(notify.as_fd(), PollFlags::POLLIN),
            PollFd::new(stop.as_fd(), PollFlags::POLLIN),
        ];
        match poll(&mut fds, PollTimeout::NONE) {
            Ok(_) => {}
            Err(Errno::EINTR) => continue,
            Err(_) => return,
        }
        let ready = |fd: &PollFd| fd.revents().is_some_and(|r| !r.is_empty());
        let (notified, stopped) = (ready(&fds[0]), ready(&fds[1]));
        if stopped {
            return;
        }
        if notified {
            if drain(&mut notify).is_err() {
                return;
            }
            active.interrupt_all();
        }
    }
}

/// Consume every pending notification; several signals coalesce into one relay.
fn drain(notify: &mut File) -> io::Result<()> {
    let mut buf = [0u8; 64];
    loop {
        match notify.read(&mut buf) {
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(_) => continue,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}
