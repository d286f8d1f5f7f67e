//! Progress reporting hooks
//!
//! Orchestrators never hold progress state of their own; the caller passes a
//! sink in, and multi-project runs ask it for one channel per project.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Receiver of audit progress events
pub trait ProgressSink: Send + Sync {
    /// Dependencies that will be evaluated
    fn set_total(&self, _total: usize) {}

    /// Dependencies excluded before dispatch
    fn set_ignored(&self, _ignored: usize) {}

    /// One dependency finished evaluating
    fn record_dependency(&self, _name: &str, _is_supported: bool, _has_warning: bool) {}

    /// Aggregate outcome for a project's dependency set
    fn record_semver_policy(&self, _is_supported: bool, _is_expiring: bool) {}

    /// A project finished auditing
    fn record_project(&self, _name: &str, _is_supported: bool, _is_expiring: bool) {}

    /// Channel for one project in a multi-project run
    fn project(&self, _path: &str) -> Arc<dyn ProgressSink> {
        Arc::new(NoopProgress)
    }
}

/// Sink that drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {}

/// Running totals for one project
#[derive(Debug, Default)]
pub struct ProgressCounts {
    pub total: AtomicUsize,
    pub ignored: AtomicUsize,
    pub done: AtomicUsize,
    pub unsupported: AtomicUsize,
    pub expiring: AtomicUsize,
}

impl ProgressCounts {
    pub fn done(&self) -> usize {
        self.done.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    pub fn ignored(&self) -> usize {
        self.ignored.load(Ordering::SeqCst)
    }

    pub fn unsupported(&self) -> usize {
        self.unsupported.load(Ordering::SeqCst)
    }

    pub fn expiring(&self) -> usize {
        self.expiring.load(Ordering::SeqCst)
    }
}

impl ProgressSink for ProgressCounts {
    fn set_total(&self, total: usize) {
        self.total.store(total, Ordering::SeqCst);
    }

    fn set_ignored(&self, ignored: usize) {
        self.ignored.store(ignored, Ordering::SeqCst);
    }

    fn record_dependency(&self, _name: &str, is_supported: bool, has_warning: bool) {
        self.done.fetch_add(1, Ordering::SeqCst);
        if !is_supported {
            self.unsupported.fetch_add(1, Ordering::SeqCst);
        } else if has_warning {
            self.expiring.fetch_add(1, Ordering::SeqCst);
        }
    }
}
