// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2025 William Bro-Jørgensen
// Copyright (c) 2020 Guillaume Fraux and contributors
//
// See LICENSE at the project root for full text.

use crate::atom::Atom;
use crate::error::CError;
use crate::format::FileFormat;
use crate::geometry::GeometrySnapshot;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const FORMAT: &str = "XYZ";

/// Renders `snapshot` as an XYZ frame: the atom count, a comment line and
/// one `symbol x y z` line per atom with six decimals.
///
/// Line breaks inside `comment` are replaced by spaces so that the comment
/// stays on the second line.
///
/// # Errors
///
/// Returns [`CError::EmptyGeometry`] if the snapshot has no atoms.
pub fn write_xyz(snapshot: &GeometrySnapshot, comment: Option<&str>) -> Result<String, CError> {
    if snapshot.is_empty() {
        return Err(CError::EmptyGeometry);
    }

    let comment = comment.unwrap_or("").replace(['\r', '\n'], " ");
    let mut text = format!("{}\n{}\n", snapshot.size(), comment);
    for atom in snapshot {
        let p = &atom.position;
        text.push_str(&format!(
            "{} {:.6} {:.6} {:.6}\n",
            atom.symbol(),
            p.x,
            p.y,
            p.z
        ));
    }
    Ok(text)
}

pub fn write_xyz_to<W: Write>(
    snapshot: &GeometrySnapshot,
    comment: Option<&str>,
    writer: &mut W,
) -> Result<(), CError> {
    let text = write_xyz(snapshot, comment)?;
    writer.write_all(text.as_bytes())?;
    Ok(())
}

/// Writes a single-frame XYZ file to `path`, replacing any existing file.
pub fn write_xyz_file(
    snapshot: &GeometrySnapshot,
    comment: Option<&str>,
    path: &Path,
) -> Result<(), CError> {
    let text = write_xyz(snapshot, comment)?;
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(text.as_bytes())?;
    writer.flush()?;
    Ok(())
}

/// Reads the first frame of an XYZ file. Columns after the coordinates are
/// ignored.
///
/// # Errors
///
/// Returns an error if the atom count is not a number, if fewer atom lines
/// than announced are present, or if an atom line is malformed.
pub fn read_xyz(text: &str) -> Result<GeometrySnapshot, CError> {
    let mut lines = text.lines();
    let count_line = lines.next().ok_or(CError::MissingToken)?;
    let n_atoms = count_line.trim().parse::<usize>().map_err(|e| {
        CError::format(
            FORMAT,
            1,
            format!("invalid atom count '{}': {e}", count_line.trim()),
        )
    })?;
    // comment
    lines.next().ok_or(CError::MissingToken)?;

    let mut snapshot = GeometrySnapshot::new();
    for i in 0..n_atoms {
        let lineno = i + 3;
        let line = lines.next().ok_or_else(|| {
            CError::format(
                FORMAT,
                lineno,
                format!("expected {n_atoms} atoms, found {i}"),
            )
        })?;
        let mut tokens = line.split_whitespace();
        let symbol = tokens.next().ok_or(CError::MissingToken)?;
        let mut position = [0.0; 3];
        for value in &mut position {
            let token = tokens.next().ok_or(CError::MissingToken)?;
            *value = token.parse::<f64>().map_err(|e| {
                CError::format(FORMAT, lineno, format!("invalid coordinate '{token}': {e}"))
            })?;
        }
        snapshot.add_atom(Atom::new(symbol, position)?);
    }

    if lines.any(|l| !l.trim().is_empty()) {
        log::warn!("ignoring content after the first frame of the XYZ file");
    }
    Ok(snapshot)
}

impl FileFormat for GeometrySnapshot {
    fn parse(text: &str) -> Result<Self, CError> {
        read_xyz(text)
    }
}
