// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("Input '{slot}' accepts a single binding but channel '{tag}' is emitted by {producers:?}")]
    AmbiguousBinding {
        slot: String,
        tag: String,
        producers: Vec<String>,
    },

    #[error("Required input '{slot}' has no source")]
    UnboundInput { slot: String },

    #[error("Source given for undeclared input '{slot}'")]
    UnknownSlot { slot: String },
}
