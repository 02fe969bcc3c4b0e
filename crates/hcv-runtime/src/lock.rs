//! Process-wide per-host cycle exclusion.
//!
//! Two cycles against the same host identity never interleave; cycles against
//! different hosts are independent. Contention is reported, not waited on.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

fn held() -> MutexGuard<'static, BTreeSet<String>> {
    static HELD: OnceLock<Mutex<BTreeSet<String>>> = OnceLock::new();
    HELD.get_or_init(|| Mutex::new(BTreeSet::new()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

pub struct HostLocks;

impl HostLocks {
    /// `None` when a cycle for `host_id` is already running in this process.
    pub fn try_acquire(host_id: &str) -> Option<CycleGuard> {
        if held().insert(host_id.to_string()) {
            Some(CycleGuard {
                host_id: host_id.to_string(),
            })
        } else {
            None
        }
    }

    pub fn is_held(host_id: &str) -> bool {
        held().contains(host_id)
    }
}

/// Releases the host on drop.
#[derive(Debug)]
pub struct CycleGuard {
    host_id: String,
}

impl CycleGuard {
    pub fn host_id(&self) -> &str {
        &self.host_id
    }
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        held().remove(&self.host_id);
    }
}
