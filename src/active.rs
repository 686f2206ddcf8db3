use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Set of external processes started for the stage currently running.
///
/// The executor tracks a process right after spawning it and forgets it when
/// it has exited; the signal relay only ever asks for the tracked processes to
/// be interrupted. Clones share the same set.
#[derive(Clone, Debug, Default)]
pub struct ActiveProcesses {
    pids: Arc<Mutex<Vec<Pid>>>,
}

impl ActiveProcesses {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Pid>> {
        self.pids.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn track(&self, pid: Pid) {
        self.lock().push(pid);
    }

    pub(crate) fn forget(&self, pid: Pid) {
        self.lock().retain(|tracked| *tracked != pid);
    }

    /// Drop every tracked process without signaling it.
    pub(crate) fn clear(&self) {
        self.lock().clear();
    }

    /// Number of processes currently tracked.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Send `SIGINT` to every tracked process, holding the lock throughout.
    ///
    /// Returns how many processes were signaled. Processes that already exited
    /// are skipped silently.
    pub fn interrupt_all(&self) -> usize {
        self.signal_all(Signal::SIGINT)
    }

    fn signal_all(&self, signal: Signal) -> usize {
        let pids = self.lock();
        pids.iter()
            .filter(|pid| kill(**pid, signal).is_ok())
            .count()
    }
}
