/*
 * cancellation.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Advisory cancellation shared by the stages of a chain.
 */

//! Cancellation for chain execution.
//!
//! [`Cancellation`] wraps `tokio_util::sync::CancellationToken`. It is
//! advisory: the concurrent driver cancels it when a stage fails, and stages
//! that care poll [`Cancellation::is_cancelled`]. No task is interrupted.

use tokio_util::sync::CancellationToken;

/// A cloneable cancellation token. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    inner: CancellationToken,
}

impl Cancellation {
    /// Create a new cancellation token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Request cancellation.
    ///
    /// After this is called, `is_cancelled()` will return `true`.
    pub fn cancel(&self) {
        self.inner.cancel()
    }

    /// A token that is cancelled with this one but can also be cancelled on
    /// its own without affecting the parent.
    pub fn child(&self) -> Self {
        Self {
            inner: self.inner.child_token(),
        }
    }

    /// Wait until cancellation is requested.
    pub async fn cancelled(&self) {
        self.inner.cancelled().await
    }
}

impl From<CancellationToken> for Cancellation {
    fn from(token: CancellationToken) -> Self {
        Self { inner: token }
    }
}
