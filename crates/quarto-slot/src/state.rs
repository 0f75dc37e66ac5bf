/*
 * state.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Slot state and its wire format between stages.
 */

//! The value handed from one stage to the next.
//!
//! On the wire a [`SlotState`] is a JSON object with a `main` string and a
//! `named` string map. `serde_json` never escapes `<`, `>` or `&`, so markup
//! fragments survive the hop byte-for-byte.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SlotError};

/// Main fragment plus the accumulated named fragments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotState {
    /// Output written by a single stage to its default slot
    #[serde(default)]
    pub main: String,

    /// Named fragments (e.g. `script`, `style`) accumulated across the chain
    #[serde(default)]
    pub named: BTreeMap<String, String>,
}

impl SlotState {
    /// Decode a state from its wire form.
    ///
    /// Zero-length input is the empty state.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Encode the state to its wire form.
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| SlotError::Encode(e.to_string()))
    }

    /// The value of a named fragment, or `""` if it was never written.
    pub fn named(&self, key: &str) -> &str {
        self.named.get(key).map(String::as_str).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_empty_input() {
        let state = SlotState::decode(b"").unwrap();
        assert_eq!(state.main, "");
        assert!(state.named.is_empty());
    }

    #[test]
    fn test_markup_is_not_escaped() {
        let mut state = SlotState {
            main: "<h1 class=\"x\">a & b</h1>".to_string(),
            named: BTreeMap::new(),
        };
        state
            .named
            .insert("script".to_string(), "<script src='x.js'></script>".to_string());

        let bytes = state.encode().unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains("<script src='x.js'></script>"));
        assert!(text.contains("a & b"));
        assert!(!text.contains("\\u003c"));

        assert_eq!(SlotState::decode(&bytes).unwrap(), state);
    }

    #[test]
    fn test_missing_fields_default() {
        let state = SlotState::decode(br#"{"main":"hi"}"#).unwrap();
        assert_eq!(state.main, "hi");
        assert!(state.named.is_empty());

        let state = SlotState::decode(br#"{"named":{"style":"s"}}"#).unwrap();
        assert_eq!(state.main, "");
        assert_eq!(state.named("style"), "s");
        assert_eq!(state.named("script"), "");
    }

    #[test]
    fn test_malformed_input() {
        let err = SlotState::decode(br#"{"main":"trunc"#).unwrap_err();
        assert!(matches!(err, SlotError::Decode(_)));

        let err = SlotState::decode(b"not json").unwrap_err();
        assert!(matches!(err, SlotError::Decode(_)));
    }

    #[test]
    fn test_named_keys_are_sorted() {
        let mut state = SlotState::default();
        state.named.insert("style".to_string(), "b".to_string());
        state.named.insert("script".to_string(), "a".to_string());
        let text = String::from_utf8(state.encode().unwrap()).unwrap();
        assert_eq!(text, r#"{"main":"","named":{"script":"a","style":"b"}}"#);
    }
}
