/*
 * pipe.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Handoff pipe between two consecutive stages.
 */

//! Single-producer/single-consumer handoff between stages.
//!
//! A [`Pipe`] is a write-once future over a byte buffer: the producing stage
//! appends bytes and closes it exactly once, and the consuming stage's
//! [`Pipe::read`] waits for that close before draining the buffer. This is
//! what lets the concurrent driver start stage N+1 before stage N has
//! produced anything: stage N+1 only waits at the point it actually reads.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::error::{Result, SlotError};

#[derive(Debug, Default)]
struct PipeState {
    buffer: Vec<u8>,
    closed: bool,
}

#[derive(Debug, Default)]
struct PipeInner {
    state: Mutex<PipeState>,
    /// Woken once, when the pipe closes.
    closed: Notify,
}

/// Blocking-read-until-closed byte conduit.
///
/// Clones share the same buffer; one clone is held by the producer and one by
/// the consumer.
#[derive(Debug, Clone, Default)]
pub struct Pipe {
    inner: Arc<PipeInner>,
}

impl Pipe {
    /// Create an open, empty pipe.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pipe that is already closed and carries `bytes`.
    ///
    /// Used for the initial input of a chain.
    pub fn closed_with(bytes: impl Into<Vec<u8>>) -> Self {
        let pipe = Self::new();
        {
            let mut state = pipe.state();
            state.buffer = bytes.into();
            state.closed = true;
        }
        pipe
    }

    fn state(&self) -> MutexGuard<'_, PipeState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Append bytes to the buffer.
    ///
    /// # Errors
    ///
    /// Returns [`SlotError::PipeClosed`] if the pipe has already been closed.
    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        let mut state = self.state();
        if state.closed {
            return Err(SlotError::PipeClosed);
        }
        state.buffer.extend_from_slice(bytes);
        Ok(())
    }

    /// Close the pipe, releasing every pending and future reader.
    ///
    /// # Errors
    ///
    /// Returns [`SlotError::PipeClosed`] on a second close.
    pub fn close(&self) -> Result<()> {
        {
            let mut state = self.state();
            if state.closed {
                return Err(SlotError::PipeClosed);
            }
            state.closed = true;
        }
        self.inner.closed.notify_waiters();
        Ok(())
    }

    /// Whether [`Pipe::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// Wait until the pipe is closed without consuming its contents.
    pub async fn closed(&self) {
        loop {
            // Register before checking so a close in between is not missed
            let notified = self.inner.closed.notified();
            if self.is_closed() {
                return;
            }
            notified.await;
        }
    }

    /// Wait until the pipe is closed, then drain its buffer.
    ///
    /// Later reads return whatever is left, which is empty after a full
    /// drain, and never wait.
    pub async fn read(&self) -> Vec<u8> {
        self.closed().await;
        let mut state = self.state();
        std::mem::take(&mut state.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_read_after_close() {
        let pipe = Pipe::new();
        pipe.write(b"<view>").unwrap();
        pipe.write(b"</view>").unwrap();
        pipe.close().unwrap();

        assert_eq!(pipe.read().await, b"<view></view>");
        // Drained
        assert!(pipe.read().await.is_empty());
    }

    #[test]
    fn test_double_close_is_an_error() {
        let pipe = Pipe::new();
        pipe.close().unwrap();
        assert_eq!(pipe.close(), Err(SlotError::PipeClosed));
    }

    #[test]
    fn test_write_after_close_is_an_error() {
        let pipe = Pipe::new();
        pipe.close().unwrap();
        assert_eq!(pipe.write(b"late"), Err(SlotError::PipeClosed));
    }

    #[tokio::test]
    async fn test_read_waits_for_close() {
        let pipe = Pipe::new();
        let reader = pipe.clone();
        let handle = tokio::spawn(async move { reader.read().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        pipe.write(b"done").unwrap();
        pipe.close().unwrap();
        assert_eq!(handle.await.unwrap(), b"done");
    }

    #[tokio::test]
    async fn test_closed_with_initial_bytes() {
        let pipe = Pipe::closed_with("seed");
        assert!(pipe.is_closed());
        assert_eq!(pipe.close(), Err(SlotError::PipeClosed));
        assert_eq!(pipe.read().await, b"seed");
    }
}
