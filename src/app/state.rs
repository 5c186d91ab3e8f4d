use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::app::models::{InstallOutcome, InstallStats};

/// Mutable session state shared by every operation: the busy flag and the
/// install counters. Lives as long as the session; counters are never reset.
#[derive(Default)]
pub struct SessionState {
    busy: AtomicBool,
    install_success_count: AtomicU64,
    install_fail_count: AtomicU64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Claims the busy flag. Returns `None` when another operation holds it.
    pub fn try_begin(&self) -> Option<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| BusyGuard { state: self })
    }

    pub fn record_install(&self, outcome: &InstallOutcome) -> InstallStats {
        if outcome.success {
            self.install_success_count.fetch_add(1, Ordering::SeqCst);
        } else {
            self.install_fail_count.fetch_add(1, Ordering::SeqCst);
        }
        self.install_stats()
    }

    pub fn install_stats(&self) -> InstallStats {
        InstallStats {
            success_count: self.install_success_count.load(Ordering::SeqCst),
            fail_count: self.install_fail_count.load(Ordering::SeqCst),
        }
    }
}

/// Holds the busy flag; dropping it is the only way the flag goes back to false.
pub struct BusyGuard<'a> {
    state: &'a SessionState,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.state.busy.store(false, Ordering::SeqCst);
    }
}
