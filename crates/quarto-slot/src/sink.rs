/*
 * sink.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Output sink shared by every stage of a chain.
 */

//! The shared output sink and header maps.
//!
//! Stages never write headers to the [`OutputSink`] directly. Each stage
//! collects its headers in a private [`Headers`] map and the map is merged
//! into the sink when the stage finalizes, first writer wins.

use std::sync::{Mutex, MutexGuard, PoisonError};

use hashlink::LinkedHashMap;

/// Case-insensitive header map that remembers insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: LinkedHashMap<String, String>,
}

impl Headers {
    /// Create an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a header value by name, ignoring case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Set a header, replacing any previous value under the same name.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let key = name.to_ascii_lowercase();
        // Replace in place so the original insertion position is kept
        if let Some(existing) = self.entries.get_mut(&key) {
            *existing = value.into();
        } else {
            self.entries.insert(key, value.into());
        }
    }

    /// Iterate over `(name, value)` pairs in insertion order.
    ///
    /// Names are lower-cased.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The ultimate destination of a chain's output.
///
/// Implementations are shared by every stage of a chain and must guard their
/// state themselves.
pub trait OutputSink: Send + Sync {
    /// Current value of a header, if any.
    fn header(&self, name: &str) -> Option<String>;

    /// Set a header value.
    fn set_header(&self, name: &str, value: &str);

    /// Set the response status. Only the first call takes effect.
    fn set_status(&self, status: u16);

    /// Append bytes to the response body.
    fn write_body(&self, bytes: &[u8]);

    /// Merge a header under the first-writer-wins policy.
    ///
    /// The value is only set when the sink has no value (or an empty one)
    /// for `name`. Returns whether the value was set.
    fn merge_header(&self, name: &str, value: &str) -> bool {
        let present = self.header(name).is_some_and(|v| !v.is_empty());
        if !present {
            self.set_header(name, value);
        }
        !present
    }

    /// Report a fatal chain error: status 500 and the error text as body.
    fn write_error(&self, message: &str) {
        self.set_status(500);
        self.write_body(message.as_bytes());
        self.write_body(b"\n");
    }
}

#[derive(Debug, Default)]
struct RecordedResponse {
    status: Option<u16>,
    headers: Headers,
    body: Vec<u8>,
}

/// In-memory [`OutputSink`] that records what a chain produced.
#[derive(Debug, Default)]
pub struct ResponseRecorder {
    inner: Mutex<RecordedResponse>,
}

impl ResponseRecorder {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, RecordedResponse> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The recorded status, defaulting to 200 when none was set.
    pub fn status(&self) -> u16 {
        self.inner().status.unwrap_or(200)
    }

    /// Snapshot of the recorded headers.
    pub fn headers(&self) -> Headers {
        self.inner().headers.clone()
    }

    /// The recorded body as (lossy) UTF-8.
    pub fn body(&self) -> String {
        String::from_utf8_lossy(&self.inner().body).into_owned()
    }
}

impl OutputSink for ResponseRecorder {
    fn header(&self, name: &str) -> Option<String> {
        self.inner().headers.get(name).map(str::to_string)
    }

    fn set_header(&self, name: &str, value: &str) {
        self.inner().headers.set(name, value);
    }

    fn set_status(&self, status: u16) {
        let mut inner = self.inner();
        if inner.status.is_none() {
            inner.status = Some(status);
        }
    }

    fn write_body(&self, bytes: &[u8]) {
        self.inner().body.extend_from_slice(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_case_insensitive() {
        let mut headers = Headers::new();
        headers.set("Content-Type", "text/html");
        assert_eq!(headers.get("content-type"), Some("text/html"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/html"));

        headers.set("content-type", "text/plain");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("Content-Type"), Some("text/plain"));
    }

    #[test]
    fn test_headers_keep_insertion_order() {
        let mut headers = Headers::new();
        headers.set("b", "1");
        headers.set("a", "2");
        headers.set("b", "3");
        let names: Vec<_> = headers.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_merge_header_first_writer_wins() {
        let sink = ResponseRecorder::new();
        assert!(sink.merge_header("aa", "view"));
        assert!(!sink.merge_header("aa", "layout"));
        assert_eq!(sink.header("aa").as_deref(), Some("view"));
    }

    #[test]
    fn test_merge_header_replaces_empty_value() {
        let sink = ResponseRecorder::new();
        sink.set_header("x", "");
        assert!(sink.merge_header("x", "filled"));
        assert_eq!(sink.header("x").as_deref(), Some("filled"));
    }

    #[test]
    fn test_first_status_wins() {
        let sink = ResponseRecorder::new();
        assert_eq!(sink.status(), 200);
        sink.set_status(404);
        sink.set_status(500);
        assert_eq!(sink.status(), 404);
    }

    #[test]
    fn test_write_error() {
        let sink = ResponseRecorder::new();
        sink.write_error("boom");
        assert_eq!(sink.status(), 500);
        assert_eq!(sink.body(), "boom\n");
    }
}
