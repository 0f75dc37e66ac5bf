/*
 * observer.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Chain observer for tracing and progress reporting.
 */

//! Observer abstraction for chain execution events.
//!
//! Under the concurrent driver these hooks are called from several tasks at
//! once, so implementations must be `Send + Sync` and must not assume any
//! ordering between stages other than each stage's own start → end.

use crate::error::SlotError;

/// Observer for chain execution events.
///
/// All methods have empty default implementations.
pub trait ChainObserver: Send + Sync {
    /// Called when a stage begins running.
    fn on_stage_start(&self, _name: &str, _index: usize, _total: usize) {}

    /// Called when a stage has run and finalized successfully.
    fn on_stage_complete(&self, _name: &str, _index: usize, _total: usize) {}

    /// Called when a stage (or its finalize) fails.
    fn on_stage_error(&self, _name: &str, _index: usize, _error: &SlotError) {}

    /// Called when the chain starts.
    fn on_chain_start(&self, _total_stages: usize) {}

    /// Called when the chain produced its final output.
    fn on_chain_complete(&self) {}

    /// Called when the chain fails.
    fn on_chain_error(&self, _error: &SlotError) {}
}

/// Observer that does nothing. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ChainObserver for NoopObserver {}

/// Observer that emits `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl TracingObserver {
    pub fn new() -> Self {
        Self
    }
}

impl ChainObserver for TracingObserver {
    fn on_stage_start(&self, name: &str, index: usize, total: usize) {
        tracing::debug!(
            stage.name = name,
            stage.index = index,
            stage.total = total,
            "Starting stage"
        );
    }

    fn on_stage_complete(&self, name: &str, index: usize, total: usize) {
        tracing::debug!(
            stage.name = name,
            stage.index = index,
            stage.total = total,
            "Completed stage"
        );
    }

    fn on_stage_error(&self, name: &str, index: usize, error: &SlotError) {
        tracing::error!(
            stage.name = name,
            stage.index = index,
            error = %error,
            "Stage failed"
        );
    }

    fn on_chain_start(&self, total_stages: usize) {
        tracing::info!(total_stages = total_stages, "Starting chain");
    }

    fn on_chain_complete(&self) {
        tracing::info!("Chain completed");
    }

    fn on_chain_error(&self, error: &SlotError) {
        tracing::error!(error = %error, "Chain failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingObserver {
        starts: AtomicUsize,
        errors: AtomicUsize,
    }

    impl ChainObserver for CountingObserver {
        fn on_stage_start(&self, _name: &str, _index: usize, _total: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_stage_error(&self, _name: &str, _index: usize, _error: &SlotError) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_defaults_are_noops() {
        let observer = NoopObserver;
        observer.on_stage_start("view", 0, 1);
        observer.on_stage_error("view", 0, &SlotError::Cancelled);
        observer.on_chain_complete();

        let tracing = TracingObserver::new();
        tracing.on_chain_start(3);
        tracing.on_chain_error(&SlotError::PipeClosed);
    }

    #[test]
    fn test_counting_observer() {
        let observer = CountingObserver {
            starts: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
        };
        observer.on_stage_start("view", 0, 2);
        observer.on_stage_start("layout", 1, 2);
        observer.on_stage_error("layout", 1, &SlotError::Cancelled);
        observer.on_chain_complete();

        assert_eq!(observer.starts.load(Ordering::SeqCst), 2);
        assert_eq!(observer.errors.load(Ordering::SeqCst), 1);
    }
}
