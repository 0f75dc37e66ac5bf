/*
 * chain.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Sequential and concurrent drivers for a chain of stages.
 */

//! Chain execution.
//!
//! A [`Chain`] runs its stages either one after another
//! ([`Chain::run_sequential`]) or as one task per stage
//! ([`Chain::run_concurrent`]). Both drivers link the stages with the same
//! chain of [`Pipe`]s, so a stage's reads observe exactly what the stage
//! before it produced, whichever driver is used.
//!
//! ```text
//! input ─▶ [view] ─pipe─▶ [frame] ─pipe─▶ [layout] ─pipe─▶ body
//!             │              │               │
//!             └──── named fragments, headers (ordered commit) ───▶ sink
//! ```

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use tokio::task::JoinSet;

use crate::cancellation::Cancellation;
use crate::config::{ChainConfig, Strategy};
use crate::context::{SharedNamed, StageContext};
use crate::error::{Result, SlotError};
use crate::observer::{ChainObserver, NoopObserver};
use crate::pipe::Pipe;
use crate::sink::OutputSink;
use crate::slots::StageSlots;
use crate::stage::Stage;
use crate::state::SlotState;

/// An ordered list of stages and how to run them.
pub struct Chain {
    stages: Vec<Arc<dyn Stage>>,
    strategy: Strategy,
    observer: Arc<dyn ChainObserver>,
    cancellation: Cancellation,
}

impl Chain {
    /// Create a chain. Stages compose in declaration order, outermost last.
    pub fn new(stages: Vec<Arc<dyn Stage>>) -> Self {
        Self {
            stages,
            strategy: Strategy::default(),
            observer: Arc::new(NoopObserver),
            cancellation: Cancellation::new(),
        }
    }

    /// Apply a configuration.
    pub fn with_config(mut self, config: &ChainConfig) -> Self {
        self.strategy = config.strategy;
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set a custom observer for tracing and progress.
    pub fn with_observer(mut self, observer: Arc<dyn ChainObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Set a parent cancellation token, e.g. one tied to a request deadline.
    pub fn with_cancellation(mut self, token: Cancellation) -> Self {
        self.cancellation = token;
        self
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Get stage names for debugging.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run the chain with its configured strategy.
    pub async fn run(&self, input: &[u8], sink: Arc<dyn OutputSink>) -> Result<String> {
        match self.strategy {
            Strategy::Sequential => self.run_sequential(input, sink).await,
            Strategy::Concurrent => self.run_concurrent(input, sink).await,
        }
    }

    /// Run the stages one at a time in declaration order.
    ///
    /// `input` is the serialized state the first stage reads; empty input
    /// reads as empty slots. The last stage's main output is written to the
    /// sink's body and returned.
    ///
    /// A stage that returns `Err` is reported to the observer and the chain
    /// carries on; the stage is expected to have written its own error
    /// output. Only a failure to decode the final state (or to hand off
    /// between stages) fails the chain.
    pub async fn run_sequential(&self, input: &[u8], sink: Arc<dyn OutputSink>) -> Result<String> {
        let total = self.stages.len();
        self.observer.on_chain_start(total);
        tracing::debug!(strategy = %Strategy::Sequential, stages = total, "Running chain");

        let mut last = Pipe::closed_with(input);
        let named = seed_named(input);
        let mut previous: Option<StageContext> = None;

        for (index, stage) in self.stages.iter().enumerate() {
            let mut ctx = match &previous {
                Some(prev) => prev.next(stage.name()),
                None => StageContext::new(
                    stage.name(),
                    Arc::clone(&sink),
                    last.clone(),
                    self.cancellation.clone(),
                )
                .with_named(named.clone()),
            };

            self.observer.on_stage_start(stage.name(), index, total);
            let outcome = stage.run(&mut StageSlots::new(&mut ctx)).await;

            if let Err(e) = ctx.finalize().await {
                self.observer.on_stage_error(stage.name(), index, &e);
                return Err(self.fail(sink.as_ref(), e));
            }

            match outcome {
                Ok(()) => self.observer.on_stage_complete(stage.name(), index, total),
                Err(e) => {
                    self.observer.on_stage_error(stage.name(), index, &e);
                    tracing::warn!(
                        stage.name = stage.name(),
                        stage.index = index,
                        error = %e,
                        "Stage reported an error; continuing with its output"
                    );
                }
            }

            last = ctx.output();
            previous = Some(ctx);
        }

        self.finish(last, sink.as_ref()).await
    }

    /// Run every stage as its own task.
    ///
    /// The whole chain of contexts is built before any stage starts, so the
    /// pipe topology is fixed up front. Each task runs its stage and then
    /// always finalizes, releasing the stage after it. The first error (a
    /// stage `Err`, a failed finalize, or a task that panicked) cancels the
    /// shared token as soon as it happens and becomes the chain's error;
    /// later errors are discarded. All tasks are joined before returning,
    /// and dropping the returned future aborts any task still running.
    ///
    /// Must be called from within a tokio runtime. No deadline is imposed:
    /// a stage that never returns stalls the join unless it watches
    /// [`crate::Slots::is_cancelled`] and the parent token is cancelled.
    pub async fn run_concurrent(&self, input: &[u8], sink: Arc<dyn OutputSink>) -> Result<String> {
        let total = self.stages.len();
        self.observer.on_chain_start(total);
        tracing::debug!(strategy = %Strategy::Concurrent, stages = total, "Running chain");

        let cancellation = self.cancellation.child();
        let named = seed_named(input);

        let mut contexts: Vec<StageContext> = Vec::with_capacity(total);
        for stage in &self.stages {
            let ctx = match contexts.last() {
                Some(prev) => prev.next(stage.name()),
                None => StageContext::new(
                    stage.name(),
                    Arc::clone(&sink),
                    Pipe::closed_with(input),
                    cancellation.clone(),
                )
                .with_named(named.clone()),
            };
            contexts.push(ctx);
        }
        let last = contexts
            .last()
            .map_or_else(|| Pipe::closed_with(input), StageContext::output);

        let first_error = FirstError::new(cancellation);
        // Dropping the set aborts every task still running
        let mut tasks = JoinSet::new();
        let mut task_stages = HashMap::with_capacity(total);

        for (index, (stage, mut ctx)) in self.stages.iter().zip(contexts).enumerate() {
            let stage = Arc::clone(stage);
            let observer = Arc::clone(&self.observer);
            let first_error = first_error.clone();
            let name = stage.name().to_string();

            let handle = tasks.spawn(async move {
                let _guard = PanicGuard {
                    stage: stage.name().to_string(),
                    first_error: first_error.clone(),
                };

                observer.on_stage_start(stage.name(), index, total);
                let outcome = stage.run(&mut StageSlots::new(&mut ctx)).await;
                // Cancel before finalize: finalize waits on the stage before
                // this one, which may itself be waiting for cancellation
                if let Err(e) = &outcome {
                    observer.on_stage_error(stage.name(), index, e);
                    first_error.record(e.clone());
                }

                // Finalize even on failure so downstream reads never hang
                match ctx.finalize().await {
                    Err(e) => {
                        observer.on_stage_error(stage.name(), index, &e);
                        first_error.record(e);
                    }
                    Ok(()) if outcome.is_ok() => {
                        observer.on_stage_complete(stage.name(), index, total)
                    }
                    Ok(()) => {}
                }
            });
            task_stages.insert(handle.id(), (index, name));
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                let (index, stage) = task_stages.remove(&e.id()).unwrap_or_default();
                let error = SlotError::Join {
                    stage,
                    message: e.to_string(),
                };
                self.observer.on_stage_error(error_stage(&error), index, &error);
                first_error.record(error);
            }
        }

        if let Some(error) = first_error.get() {
            return Err(self.fail(sink.as_ref(), error));
        }

        self.finish(last, sink.as_ref()).await
    }

    /// Decode the last stage's state and emit its main output.
    async fn finish(&self, last: Pipe, sink: &dyn OutputSink) -> Result<String> {
        let bytes = last.read().await;
        match SlotState::decode(&bytes) {
            Ok(state) => {
                sink.write_body(state.main.as_bytes());
                self.observer.on_chain_complete();
                Ok(state.main)
            }
            Err(e) => Err(self.fail(sink, e)),
        }
    }

    /// Report a fatal error to the observer and the sink.
    fn fail(&self, sink: &dyn OutputSink, error: SlotError) -> SlotError {
        self.observer.on_chain_error(&error);
        sink.write_error(&error.to_string());
        error
    }
}

/// First-error-wins slot shared by the tasks of a concurrent run.
#[derive(Clone)]
struct FirstError {
    error: Arc<OnceLock<SlotError>>,
    cancellation: Cancellation,
}

impl FirstError {
    fn new(cancellation: Cancellation) -> Self {
        Self {
            error: Arc::default(),
            cancellation,
        }
    }

    /// Cancel the run and keep `error` unless an earlier one was recorded.
    fn record(&self, error: SlotError) {
        self.cancellation.cancel();
        if let Err(discarded) = self.error.set(error) {
            tracing::debug!(error = %discarded, "Discarding error after the first");
        }
    }

    fn get(&self) -> Option<SlotError> {
        self.error.get().cloned()
    }
}

/// Records a panicking stage as soon as its task unwinds, so siblings
/// waiting on cancellation are released without waiting for the join.
struct PanicGuard {
    stage: String,
    first_error: FirstError,
}

impl Drop for PanicGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.first_error.record(SlotError::Join {
                stage: std::mem::take(&mut self.stage),
                message: "stage panicked".to_string(),
            });
        }
    }
}

/// Named fragments of the chain input, shared by every stage.
///
/// Malformed input seeds nothing; the first stage's read reports the error.
fn seed_named(input: &[u8]) -> SharedNamed {
    SlotState::decode(input)
        .map(|state| SharedNamed::from(state.named))
        .unwrap_or_default()
}

fn error_stage(error: &SlotError) -> &str {
    match error {
        SlotError::Stage { stage, .. } | SlotError::Join { stage, .. } => stage,
        _ => "",
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("stages", &self.stage_names())
            .field("strategy", &self.strategy)
            .finish()
    }
}

/// Run `stages` one at a time. See [`Chain::run_sequential`].
pub async fn sequential(
    stages: Vec<Arc<dyn Stage>>,
    input: &[u8],
    sink: Arc<dyn OutputSink>,
) -> Result<String> {
    Chain::new(stages).run_sequential(input, sink).await
}

/// Run `stages` as concurrent tasks. See [`Chain::run_concurrent`].
pub async fn concurrent(
    stages: Vec<Arc<dyn Stage>>,
    input: &[u8],
    sink: Arc<dyn OutputSink>,
) -> Result<String> {
    Chain::new(stages).run_concurrent(input, sink).await
}
