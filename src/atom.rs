// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2025 William Bro-Jørgensen
// Copyright (c) 2020 Guillaume Fraux and contributors
//
// See LICENSE at the project root for full text.

use crate::error::CError;
use crate::periodic;
use nalgebra::Vector3;

/// An element at a Cartesian position (Å).
///
/// The symbol and the atomic number are always consistent with each other,
/// which is why they can only be set together through the constructors.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    symbol: String,
    atomic_number: u8,
    pub position: Vector3<f64>,
}

impl Atom {
    /// Creates an atom from an element symbol, in any capitalization.
    ///
    /// # Errors
    ///
    /// Returns [`CError::UnknownElement`] if `symbol` is not an element.
    pub fn new(symbol: &str, position: [f64; 3]) -> Result<Self, CError> {
        let atomic_number = periodic::atomic_number(symbol)
            .ok_or_else(|| CError::UnknownElement(symbol.to_string()))?;
        Ok(Self {
            symbol: periodic::normalize_symbol(symbol),
            atomic_number,
            position: Vector3::from(position),
        })
    }

    /// Creates an atom from its atomic number.
    ///
    /// # Errors
    ///
    /// Returns [`CError::UnknownElement`] if no element has this number.
    pub fn from_atomic_number(atomic_number: u8, position: [f64; 3]) -> Result<Self, CError> {
        let symbol = periodic::symbol(atomic_number)
            .ok_or_else(|| CError::UnknownElement(atomic_number.to_string()))?;
        Ok(Self {
            symbol: symbol.to_string(),
            atomic_number,
            position: Vector3::from(position),
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn atomic_number(&self) -> u8 {
        self.atomic_number
    }

    pub fn set_position(&mut self, position: [f64; 3]) {
        self.position = Vector3::from(position);
    }
}
