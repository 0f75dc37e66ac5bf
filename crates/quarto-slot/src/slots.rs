/*
 * slots.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * The slot accessor handed to each stage.
 */

//! Stage-facing slot access.
//!
//! [`Slots`] is the only surface a stage author sees. [`StageSlots`] is the
//! implementation bound to a [`StageContext`]; the stand-ins in
//! [`crate::stand_in`] implement the same trait for testing stages in
//! isolation.

use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::context::StageContext;
use crate::error::Result;
use crate::state::SlotState;

/// Read/write access to a stage's slots.
///
/// Reads see the state handed off by the previous stage and may wait until
/// that stage has finalized. Writes are captured for the next stage.
#[async_trait]
pub trait Slots: Send + Sync {
    /// The previous stage's main output.
    async fn read_main(&self) -> Result<String>;

    /// Everything written to the named fragment `key` by earlier stages.
    async fn read_named(&self, key: &str) -> Result<String>;

    /// Append to this stage's main output.
    fn write_main(&mut self, fragment: &str);

    /// Append to the named fragment `key`.
    fn write_named(&mut self, key: &str, fragment: &str);

    /// Set a response header. Earlier stages win on conflicts.
    fn set_header(&mut self, name: &str, value: &str);

    /// Set the response status.
    fn set_status(&mut self, _status: u16) {}

    /// Whether the chain has asked stages to stop early.
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// [`Slots`] bound to a live [`StageContext`].
///
/// The input is parsed at most once, on the first read. A parse failure is
/// remembered and returned by every later read.
pub struct StageSlots<'a> {
    ctx: &'a mut StageContext,
    parsed: OnceCell<Result<SlotState>>,
}

impl<'a> StageSlots<'a> {
    pub fn new(ctx: &'a mut StageContext) -> Self {
        Self {
            ctx,
            parsed: OnceCell::new(),
        }
    }

    async fn state(&self) -> Result<&SlotState> {
        let input = self.ctx.input();
        let parsed = self
            .parsed
            .get_or_init(|| async move {
                let bytes = input.read().await;
                SlotState::decode(&bytes)
            })
            .await;
        parsed.as_ref().map_err(Clone::clone)
    }
}

#[async_trait]
impl Slots for StageSlots<'_> {
    async fn read_main(&self) -> Result<String> {
        Ok(self.state().await?.main.clone())
    }

    async fn read_named(&self, key: &str) -> Result<String> {
        Ok(self.state().await?.named(key).to_string())
    }

    fn write_main(&mut self, fragment: &str) {
        self.ctx.write_main(fragment);
    }

    fn write_named(&mut self, key: &str, fragment: &str) {
        self.ctx.write_named(key, fragment);
    }

    fn set_header(&mut self, name: &str, value: &str) {
        self.ctx.set_header(name, value);
    }

    fn set_status(&mut self, status: u16) {
        self.ctx.set_status(status);
    }

    fn is_cancelled(&self) -> bool {
        self.ctx.is_cancelled()
    }
}
