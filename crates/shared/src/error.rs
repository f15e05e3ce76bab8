//! Error kinds shared across the Pentagram cognitive core.
//!
//! Mirrors the error funnel described for the kernel: nothing below the
//! kernel raises out of `process()`. These variants exist so call sites that
//! *do* need to propagate (identity loading, configuration) have a typed,
//! serializable error rather than bare `anyhow::Error`.

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail")]
pub enum PentagramError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("LM provider error: {0}")]
    LmFailure(String),

    #[error("memory store error: {0}")]
    MemoryStoreFailure(String),

    #[error("failed to parse LM response as JSON: {0}")]
    ParseFailure(String),

    #[error("identity scar document error: {0}")]
    ScarLoad(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, PentagramError>;
