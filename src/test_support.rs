use std::sync::{Mutex, MutexGuard, OnceLock};

/// Serializes tests that change the process working directory, or spawn
/// children that inherit it.
pub(crate) fn lock_current_dir() -> MutexGuard<'static, ()> {
    static MUTEX: OnceLock<Mutex<()>> = OnceLock::new();
    MUTEX
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}
