//! Build completion hook
//!
//! The orchestrator calls [`BuildFinishedHook::build_finished`] once per
//! build. Passes for the same cache are serialized: a signal that arrives
//! while a pass is running waits for it and then runs its own.

use crate::retention::{RetentionPolicy, RetentionReport};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

/// Runs the retention pass for one cache root when a build finishes
#[derive(Debug)]
pub struct BuildFinishedHook {
    root: PathBuf,
    policy: RetentionPolicy,
    pass_lock: Mutex<()>,
}

impl BuildFinishedHook {
    /// Create a hook for the given cache root and policy
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, policy: RetentionPolicy) -> Self {
        Self {
            root: root.into(),
            policy,
            pass_lock: Mutex::new(()),
        }
    }

    /// The policy applied on each signal
    #[must_use]
    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Run a retention pass, blocking until any pass already in progress is done
    pub fn build_finished(&self) -> RetentionReport {
        // The guarded pass keeps no state, so a panic in an earlier pass
        // leaves nothing to repair.
        let _guard = self
            .pass_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        tracing::debug!(root = %self.root.display(), "Build finished, running cache retention");
        self.policy.run(&self.root)
    }
}
