/*
 * stage.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Stage trait definition.
 */

//! The [`Stage`] trait.

use async_trait::async_trait;

use crate::error::Result;
use crate::slots::Slots;

/// A single renderer in a chain (a view, a frame, a layout).
///
/// A stage reads what the previous stage produced through its [`Slots`] and
/// writes its own contribution back. Stages must be `Send + Sync` so the
/// concurrent driver can run each one on its own task.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use quarto_slot::{Slots, SlotError, Stage};
///
/// struct Layout;
///
/// #[async_trait]
/// impl Stage for Layout {
///     fn name(&self) -> &str { "layout" }
///
///     async fn run(&self, slots: &mut dyn Slots) -> Result<(), SlotError> {
///         let body = slots.read_main().await?;
///         let style = slots.read_named("style").await?;
///         slots.write_main(&format!("<html><head>{style}</head><body>{body}</body></html>"));
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Stage: Send + Sync {
    /// Human-readable name for logging and error messages.
    fn name(&self) -> &str;

    /// Run the stage.
    ///
    /// Under the concurrent driver an `Err` cancels the sibling stages and
    /// fails the chain. Under the sequential driver it is reported and the
    /// chain carries on with whatever the stage wrote.
    async fn run(&self, slots: &mut dyn Slots) -> Result<()>;
}
