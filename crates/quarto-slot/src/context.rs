/*
 * context.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Per-stage context wrapping the shared output sink.
 */

//! Stage execution context.
//!
//! A [`StageContext`] sits between one stage and the shared [`OutputSink`].
//! It captures the stage's main output and header intents locally, shares the
//! chain-wide named fragments, and on [`StageContext::finalize`] hands the
//! accumulated state to the next stage through its outgoing [`Pipe`].
//!
//! Finalization is an ordered commit: a context waits until its input pipe
//! is closed (the previous stage has committed) before it touches the shared
//! named fragments or the sink's headers. Commits therefore happen in
//! declaration order under both drivers, which makes header precedence and
//! same-key named interleaving deterministic.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::cancellation::Cancellation;
use crate::error::{Result, SlotError};
use crate::pipe::Pipe;
use crate::sink::{Headers, OutputSink};
use crate::state::SlotState;

/// Named fragments shared by every stage context of one chain.
#[derive(Debug, Clone, Default)]
pub struct SharedNamed {
    inner: Arc<Mutex<BTreeMap<String, String>>>,
}

impl SharedNamed {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append each fragment of `delta` to its key and return a snapshot.
    fn commit(&self, delta: BTreeMap<String, String>) -> BTreeMap<String, String> {
        let mut named = self.lock();
        for (key, fragment) in delta {
            named.entry(key).or_default().push_str(&fragment);
        }
        named.clone()
    }

    /// Snapshot of the current fragments.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.lock().clone()
    }
}

impl From<BTreeMap<String, String>> for SharedNamed {
    fn from(named: BTreeMap<String, String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(named)),
        }
    }
}

/// Context owned by a single stage invocation.
pub struct StageContext {
    index: usize,
    name: String,
    sink: Arc<dyn OutputSink>,

    // === Captured output ===
    main: String,
    /// Named writes made by this stage, applied at finalize
    named_delta: BTreeMap<String, String>,
    named: SharedNamed,
    /// Fresh per stage so concurrent stages never share a header map
    headers: Headers,

    // === Handoff ===
    input: Pipe,
    output: Pipe,
    finalized: bool,

    cancellation: Cancellation,
}

impl StageContext {
    /// Create the context for the first stage of a chain.
    ///
    /// `input` is what the stage reads. The chain's named fragments start
    /// empty; use [`StageContext::with_named`] to seed them.
    pub fn new(
        name: impl Into<String>,
        sink: Arc<dyn OutputSink>,
        input: Pipe,
        cancellation: Cancellation,
    ) -> Self {
        Self {
            index: 0,
            name: name.into(),
            sink,
            main: String::new(),
            named_delta: BTreeMap::new(),
            named: SharedNamed::new(),
            headers: Headers::new(),
            input,
            output: Pipe::new(),
            finalized: false,
            cancellation,
        }
    }

    /// Share `named` as this chain's named fragments.
    ///
    /// Drivers seed it with the named fragments of the chain's input so they
    /// survive past the first stage.
    pub fn with_named(mut self, named: SharedNamed) -> Self {
        self.named = named;
        self
    }

    /// Create the context for the stage after this one.
    ///
    /// The new context reads this context's output pipe and shares its named
    /// fragments. Its main output and headers start empty.
    pub fn next(&self, name: impl Into<String>) -> Self {
        Self {
            index: self.index + 1,
            name: name.into(),
            sink: Arc::clone(&self.sink),
            main: String::new(),
            named_delta: BTreeMap::new(),
            named: self.named.clone(),
            headers: Headers::new(),
            input: self.output.clone(),
            output: Pipe::new(),
            finalized: false,
            cancellation: self.cancellation.clone(),
        }
    }

    /// Position of this stage in its chain.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The pipe this stage reads its predecessor's state from.
    pub fn input(&self) -> &Pipe {
        &self.input
    }

    /// The pipe this stage's state is handed off on.
    pub fn output(&self) -> Pipe {
        self.output.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Append to this stage's main output.
    pub fn write_main(&mut self, fragment: &str) {
        self.main.push_str(fragment);
    }

    /// Append to a named fragment.
    pub fn write_named(&mut self, key: &str, fragment: &str) {
        self.named_delta
            .entry(key.to_string())
            .or_default()
            .push_str(fragment);
    }

    /// Record a header intent. The sink is untouched until finalize.
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers.set(name, value);
    }

    /// Headers this stage has set so far.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Pass a status straight through to the sink.
    pub fn set_status(&self, status: u16) {
        self.sink.set_status(status);
    }

    /// Hand this stage's state to the next stage and merge its headers.
    ///
    /// Waits for the previous stage to finalize, appends this stage's named
    /// writes to the shared fragments, writes `{main, named}` to the output
    /// pipe, merges headers into the sink (first writer wins) and closes the
    /// pipe. The pipe is closed even when encoding fails.
    ///
    /// # Errors
    ///
    /// Returns [`SlotError::PipeClosed`] if called twice, or an encoding
    /// error.
    pub async fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Err(SlotError::PipeClosed);
        }
        self.input.closed().await;
        self.finalized = true;

        let named = self.named.commit(std::mem::take(&mut self.named_delta));
        let state = SlotState {
            main: std::mem::take(&mut self.main),
            named,
        };
        let handoff = state.encode().and_then(|bytes| self.output.write(&bytes));

        for (name, value) in self.headers.iter() {
            if !self.sink.merge_header(name, value) {
                tracing::trace!(
                    stage.name = %self.name,
                    header = name,
                    "Header already set by an earlier stage"
                );
            }
        }

        self.output.close()?;
        tracing::trace!(stage.name = %self.name, stage.index = self.index, "Finalized stage");
        handoff
    }
}

impl Drop for StageContext {
    fn drop(&mut self) {
        // Never leave the next stage waiting on a pipe that will not close
        if !self.finalized && self.output.close().is_ok() {
            tracing::debug!(
                stage.name = %self.name,
                stage.index = self.index,
                "Stage context dropped before finalize"
            );
        }
    }
}

impl std::fmt::Debug for StageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageContext")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("main_len", &self.main.len())
            .field("headers", &self.headers.len())
            .field("finalized", &self.finalized)
            .field("is_cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::ResponseRecorder;

    fn first(sink: Arc<ResponseRecorder>) -> StageContext {
        StageContext::new("view", sink, Pipe::closed_with(""), Cancellation::new())
    }

    #[tokio::test]
    async fn test_finalize_hands_off_state() {
        let sink = Arc::new(ResponseRecorder::new());
        let mut ctx = first(sink);
        ctx.write_main("<view>");
        ctx.write_main("</view>");
        ctx.write_named("script", "<script src='a.js'></script>");
        ctx.finalize().await.unwrap();

        let state = SlotState::decode(&ctx.output().read().await).unwrap();
        assert_eq!(state.main, "<view></view>");
        assert_eq!(state.named("script"), "<script src='a.js'></script>");
    }

    #[tokio::test]
    async fn test_main_is_not_inherited_but_named_is() {
        let sink = Arc::new(ResponseRecorder::new());
        let mut view = first(sink);
        view.write_main("view");
        view.write_named("script", "a;");

        let mut frame = view.next("frame");
        view.finalize().await.unwrap();
        frame.write_named("script", "b;");
        frame.finalize().await.unwrap();

        let state = SlotState::decode(&frame.output().read().await).unwrap();
        assert_eq!(state.main, "");
        assert_eq!(state.named("script"), "a;b;");
        assert_eq!(frame.index(), 1);
    }

    #[tokio::test]
    async fn test_seeded_named_fragments_are_carried_forward() {
        let sink = Arc::new(ResponseRecorder::new());
        let seed = BTreeMap::from([("script".to_string(), "<s/>".to_string())]);
        let mut view = first(sink).with_named(SharedNamed::from(seed));
        view.write_named("script", "a;");
        let mut frame = view.next("frame");
        view.finalize().await.unwrap();
        frame.finalize().await.unwrap();

        let state = SlotState::decode(&frame.output().read().await).unwrap();
        assert_eq!(state.named("script"), "<s/>a;");
    }

    #[tokio::test]
    async fn test_headers_merge_first_writer_wins() {
        let sink = Arc::new(ResponseRecorder::new());
        let mut view = first(sink.clone());
        view.set_header("aa", "view");
        let mut layout = view.next("layout");
        layout.set_header("aa", "layout");
        layout.set_header("bb", "layout");

        // Nothing reaches the sink before finalize
        assert!(sink.header("aa").is_none());

        view.finalize().await.unwrap();
        layout.finalize().await.unwrap();

        assert_eq!(sink.header("aa").as_deref(), Some("view"));
        assert_eq!(sink.header("bb").as_deref(), Some("layout"));
    }

    #[tokio::test]
    async fn test_finalize_waits_for_predecessor() {
        let sink = Arc::new(ResponseRecorder::new());
        let mut view = first(sink.clone());
        let mut frame = view.next("frame");
        frame.set_header("x", "frame");
        view.set_header("x", "view");

        let handle = tokio::spawn(async move {
            frame.finalize().await.unwrap();
            frame
        });
        tokio::task::yield_now().await;
        assert!(!handle.is_finished());

        view.finalize().await.unwrap();
        let frame = handle.await.unwrap();
        assert!(frame.output().is_closed());
        assert_eq!(sink.header("x").as_deref(), Some("view"));
    }

    #[tokio::test]
    async fn test_double_finalize() {
        let sink = Arc::new(ResponseRecorder::new());
        let mut ctx = first(sink);
        ctx.finalize().await.unwrap();
        assert_eq!(ctx.finalize().await, Err(SlotError::PipeClosed));
    }

    #[tokio::test]
    async fn test_drop_closes_output() {
        let sink = Arc::new(ResponseRecorder::new());
        let ctx = first(sink);
        let output = ctx.output();
        drop(ctx);
        assert!(output.is_closed());
        assert!(output.read().await.is_empty());
    }

    #[test]
    fn test_status_passes_through() {
        let sink = Arc::new(ResponseRecorder::new());
        let ctx = first(sink.clone());
        ctx.set_status(201);
        assert_eq!(sink.status(), 201);
    }
}
