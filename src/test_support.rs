use std::sync::{Mutex, MutexGuard, OnceLock};

/// Serializes tests that touch process-wide state: the working directory, the
/// standard descriptors, or forked children inheriting them.
pub(crate) fn lock_process_state() -> MutexGuard<'static, ()> {
    static MUTEX: OnceLock<Mutex<()>> = OnceLock::new();
    MUTEX
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
