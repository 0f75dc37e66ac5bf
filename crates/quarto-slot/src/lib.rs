//! Slot composition for chained page renderers
//!
//! A page is often rendered by a sequence of independent stages: a view,
//! one or more frames around it, and a layout around everything. Each stage
//! wraps the main output of the stage before it and may contribute to named
//! side channels (injected `<script>` or `<link>` tags) that any later stage
//! can read back.
//!
//! # Architecture
//!
//! - [`SlotState`] - main fragment plus named fragments, handed between stages
//! - [`Pipe`] - handoff between two stages; reads wait until the producer closes
//! - [`StageContext`] - per-stage capture of output and headers, finalized into a pipe
//! - [`Slots`] / [`StageSlots`] - what a stage reads from and writes to
//! - [`Chain`] - sequential and concurrent drivers
//! - [`OutputSink`] - where the final body, status and headers go
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use quarto_slot::{Chain, ResponseRecorder, Stage, Strategy};
//!
//! let stages: Vec<Arc<dyn Stage>> = vec![Arc::new(View), Arc::new(Frame), Arc::new(Layout)];
//! let sink = Arc::new(ResponseRecorder::new());
//!
//! let html = Chain::new(stages)
//!     .with_strategy(Strategy::Concurrent)
//!     .run(b"", sink.clone())
//!     .await?;
//! ```

pub mod cancellation;
pub mod chain;
pub mod config;
pub mod context;
pub mod error;
pub mod observer;
pub mod pipe;
pub mod sink;
pub mod slots;
pub mod stage;
pub mod stand_in;
pub mod state;

// Re-export commonly used types
pub use cancellation::Cancellation;
pub use chain::{Chain, concurrent, sequential};
pub use config::{ChainConfig, Strategy};
pub use context::{SharedNamed, StageContext};
pub use error::{Result, SlotError};
pub use observer::{ChainObserver, NoopObserver, TracingObserver};
pub use pipe::Pipe;
pub use sink::{Headers, OutputSink, ResponseRecorder};
pub use slots::{Slots, StageSlots};
pub use stage::Stage;
pub use stand_in::{EmptySlots, MockSlots};
pub use state::SlotState;
