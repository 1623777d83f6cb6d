// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod backends;   // task executors
pub mod channel;    // emission routing between tasks
pub mod config;     // pipeline definitions, profiles, samplesheets
pub mod engine;     // pipeline engine
pub mod errors;     // error handling
pub mod observability;
pub mod process;    // process specs and instantiation
pub mod provenance; // tool version records
pub mod traits;     // unified abstractions
pub mod utils;
