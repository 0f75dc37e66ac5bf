/*
 * stand_in.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Slots that are not backed by a chain.
 */

//! Stand-in [`Slots`] for running a stage outside of a chain.
//!
//! - [`EmptySlots`] reads as empty and discards writes.
//! - [`MockSlots`] reads fixed values and records writes so tests can
//!   inspect what a stage produced.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::sink::Headers;
use crate::slots::Slots;

/// Slots that are always empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptySlots;

#[async_trait]
impl Slots for EmptySlots {
    async fn read_main(&self) -> Result<String> {
        Ok(String::new())
    }

    async fn read_named(&self, _key: &str) -> Result<String> {
        Ok(String::new())
    }

    fn write_main(&mut self, _fragment: &str) {}

    fn write_named(&mut self, _key: &str, _fragment: &str) {}

    fn set_header(&mut self, _name: &str, _value: &str) {}
}

/// Slots with fixed input values that record what a stage writes.
#[derive(Debug, Clone, Default)]
pub struct MockSlots {
    /// Returned by `read_main`
    pub main: String,
    /// Returned by `read_named`
    pub named: BTreeMap<String, String>,

    /// Everything written with `write_main`
    pub written_main: String,
    /// Everything written with `write_named`, by key
    pub written_named: BTreeMap<String, String>,
    /// Headers set by the stage
    pub headers: Headers,
    /// Status set by the stage, if any
    pub status: Option<u16>,
}

impl MockSlots {
    /// Mock whose main slot reads as `main`.
    pub fn new(main: impl Into<String>) -> Self {
        Self {
            main: main.into(),
            ..Self::default()
        }
    }

    /// Add a named fragment to read back.
    pub fn with_named(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.named.insert(key.into(), value.into());
        self
    }
}

#[async_trait]
impl Slots for MockSlots {
    async fn read_main(&self) -> Result<String> {
        Ok(self.main.clone())
    }

    async fn read_named(&self, key: &str) -> Result<String> {
        Ok(self.named.get(key).cloned().unwrap_or_default())
    }

    fn write_main(&mut self, fragment: &str) {
        self.written_main.push_str(fragment);
    }

    fn write_named(&mut self, key: &str, fragment: &str) {
        self.written_named
            .entry(key.to_string())
            .or_default()
            .push_str(fragment);
    }

    fn set_header(&mut self, name: &str, value: &str) {
        self.headers.set(name, value);
    }

    fn set_status(&mut self, status: u16) {
        self.status.get_or_insert(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_slots() {
        let mut slots = EmptySlots;
        slots.write_named("script", "ignored");
        slots.write_main("ignored");
        assert_eq!(slots.read_main().await.unwrap(), "");
        assert_eq!(slots.read_named("script").await.unwrap(), "");
        assert!(!slots.is_cancelled());
    }

    #[tokio::test]
    async fn test_mock_slots_reads_fixed_values() {
        let slots = MockSlots::new("<h1>hi</h1>").with_named("style", "<link/>");
        assert_eq!(slots.read_main().await.unwrap(), "<h1>hi</h1>");
        assert_eq!(slots.read_named("style").await.unwrap(), "<link/>");
        assert_eq!(slots.read_named("script").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_mock_slots_records_writes() {
        let mut slots = MockSlots::default();
        slots.write_main("a");
        slots.write_main("b");
        slots.write_named("script", "x;");
        slots.write_named("script", "y;");
        slots.set_header("Content-Type", "text/html");
        slots.set_status(404);
        slots.set_status(500);

        assert_eq!(slots.written_main, "ab");
        assert_eq!(slots.written_named["script"], "x;y;");
        assert_eq!(slots.headers.get("content-type"), Some("text/html"));
        assert_eq!(slots.status, Some(404));
        // Writes never feed back into reads
        assert_eq!(slots.read_main().await.unwrap(), "");
    }
}
