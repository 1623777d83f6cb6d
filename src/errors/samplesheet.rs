// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Samplesheet problems; every variant carries the offending line where one exists.
#[derive(Debug, Error)]
pub enum SamplesheetError {
    #[error("Please check samplesheet header -> {found} != {expected}")]
    InvalidHeader { found: String, expected: String },

    #[error("Please check samplesheet -> Invalid number of columns (minimum = {minimum})!\nLine: '{line}'")]
    InvalidColumnCount { minimum: usize, line: String },

    #[error("Please check samplesheet -> Invalid number of populated columns (minimum = {minimum})!\nLine: '{line}'")]
    InvalidPopulatedColumns { minimum: usize, line: String },

    #[error("Please check samplesheet -> Sample entry has not been specified!\nLine: '{line}'")]
    MissingSpecies { line: String },

    #[error("Please check samplesheet -> fasta file contains spaces!\nLine: '{line}'")]
    FastaContainsSpaces { line: String },

    #[error("Please check samplesheet -> Fasta file does not have extension '.fasta' or '.fa'!\nLine: '{line}'")]
    InvalidFastaExtension { line: String },

    #[error("Please check samplesheet -> Samplesheet contains duplicate rows!\nLine: '{line}'")]
    DuplicateRow { line: String },

    #[error("Please check samplesheet -> No entries to process!")]
    NoEntries,

    #[error("Failed to access samplesheet: {0}")]
    Io(#[from] std::io::Error),
}
