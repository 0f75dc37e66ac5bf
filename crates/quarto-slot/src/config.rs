/*
 * config.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Chain configuration.
 */

//! Chain configuration.
//!
//! ```toml
//! strategy = "concurrent"
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Result, SlotError};

/// How a chain runs its stages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// One stage at a time, in declaration order
    #[default]
    Sequential,
    /// One task per stage, ordered only by data dependencies
    Concurrent,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Sequential => write!(f, "sequential"),
            Strategy::Concurrent => write!(f, "concurrent"),
        }
    }
}

/// Configuration for a [`crate::Chain`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChainConfig {
    /// Execution strategy. Default: sequential.
    pub strategy: Strategy,
}

impl ChainConfig {
    /// Parse a configuration from TOML. Missing keys take their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| SlotError::Config(e.to_string()))
    }
}
