// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2025 William Bro-Jørgensen
// Copyright (c) 2020 Guillaume Fraux and contributors
//
// See LICENSE at the project root for full text.

use crate::atom::Atom;
use std::ops::{Index, IndexMut};

/// The molecular geometry at one optimization step or single point.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct GeometrySnapshot {
    atoms: Vec<Atom>,
}

impl GeometrySnapshot {
    pub fn new() -> Self {
        GeometrySnapshot { atoms: Vec::new() }
    }

    pub fn from_atoms(atoms: Vec<Atom>) -> Self {
        GeometrySnapshot { atoms }
    }

    pub fn size(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Atom> {
        self.atoms.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Atom> {
        self.atoms.iter_mut()
    }

    pub fn positions(&self) -> Vec<[f64; 3]> {
        self.atoms
            .iter()
            .map(|a| [a.position.x, a.position.y, a.position.z])
            .collect()
    }

    pub fn symbols(&self) -> Vec<&str> {
        self.atoms.iter().map(Atom::symbol).collect()
    }

    pub fn add_atom(&mut self, atom: Atom) {
        self.atoms.push(atom)
    }
}

impl Index<usize> for GeometrySnapshot {
    type Output = Atom;

    fn index(&self, index: usize) -> &Self::Output {
        &self.atoms[index]
    }
}

impl IndexMut<usize> for GeometrySnapshot {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.atoms[index]
    }
}

impl FromIterator<Atom> for GeometrySnapshot {
    fn from_iter<I: IntoIterator<Item = Atom>>(iter: I) -> Self {
        GeometrySnapshot {
            atoms: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a GeometrySnapshot {
    type Item = &'a Atom;
    type IntoIter = std::slice::Iter<'a, Atom>;

    fn into_iter(self) -> Self::IntoIter {
        self.atoms.iter()
    }
}
