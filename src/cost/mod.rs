// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Model pricing and token accounting.
//!
//! The [`CostCatalog`] maps model names (and their aliases) to per-million-token
//! prices and context limits. When a provider does not report usage, the
//! [`estimate`] helpers approximate token counts at four characters per token.

pub mod catalog;
pub mod estimate;

pub use catalog::{CostCatalog, Evaluation, ModelCost};
pub use estimate::{estimate_messages, estimate_tokens, message_text};

use thiserror::Error;

use crate::error::ErrorCategory;

/// Errors raised by cost calculation.
#[derive(Debug, Error, PartialEq)]
pub enum CostError {
    #[error("unknown model: {0}")]
    UnknownModel(String),
}

impl CostError {
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::Validation
    }
}
