// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2025 William Bro-Jørgensen
// Copyright (c) 2020 Guillaume Fraux and contributors
//
// See LICENSE at the project root for full text.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CError {
    #[error("{0}")]
    IoError(#[from] std::io::Error),
    #[error("{format} format: {details} (line {line})")]
    Format {
        format: &'static str,
        line: usize,
        details: String,
    },
    #[error("{format} format: missing {section} section")]
    MissingSection {
        format: &'static str,
        section: &'static str,
    },
    #[error("unknown element: `{0}`")]
    UnknownElement(String),
    #[error("{what} {index} not found (only {len} available)")]
    NotFound {
        what: &'static str,
        index: usize,
        len: usize,
    },
    #[error("invalid value: {0}")]
    InvalidValue(String),
    #[error("cannot write a geometry without atoms")]
    EmptyGeometry,
    #[error("cannot write a deck without jobs")]
    EmptyDeck,
    #[error("unknown format: {0}")]
    UnknownFormat(String),
    #[error("Failed to parse float: {0}")]
    ParseFloatError(#[from] std::num::ParseFloatError),
    #[error("Failed to parse integer: {0}")]
    ParseIntError(#[from] std::num::ParseIntError),
    #[error("Missing token")]
    MissingToken,
}

impl CError {
    pub fn format(format: &'static str, line: usize, details: impl Into<String>) -> Self {
        CError::Format {
            format,
            line,
            details: details.into(),
        }
    }

    /// `true` for every failure caused by structurally unparseable input,
    /// as opposed to lookups, writer preconditions and I/O.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            CError::Format { .. }
                | CError::MissingSection { .. }
                | CError::UnknownElement(_)
                | CError::UnknownFormat(_)
                | CError::ParseFloatError(_)
                | CError::ParseIntError(_)
                | CError::MissingToken
        )
    }
}
