// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2025 William Bro-Jørgensen
// Copyright (c) 2020 Guillaume Fraux and contributors
//
// See LICENSE at the project root for full text.

//! Multi-job input files, where consecutive jobs are separated by a
//! `--Link1--` line and run one after the other.

use crate::error::CError;
use crate::format::{FileFormat, WriteFormat};
use crate::formats::gaussian_in::GaussianIn;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub const LINK1_SEPARATOR: &str = "--Link1--";

/// A job inside a deck. `chained` jobs are preceded by the separator.
#[derive(Debug, Clone, Copy)]
pub struct Link<'a> {
    pub job: &'a GaussianIn,
    pub chained: bool,
}

impl WriteFormat for Link<'_> {
    fn render(&self) -> Result<String, CError> {
        let job = self.job.render()?;
        if self.chained {
            Ok(format!("{LINK1_SEPARATOR}\n{job}"))
        } else {
            Ok(job)
        }
    }
}

/// Renders `jobs` as one input file, with a separator between consecutive
/// jobs and none before the first or after the last.
///
/// # Errors
///
/// Returns [`CError::EmptyDeck`] if `jobs` is empty, or the error of the
/// first job that cannot be written.
pub fn write_deck(jobs: &[GaussianIn]) -> Result<String, CError> {
    if jobs.is_empty() {
        return Err(CError::EmptyDeck);
    }

    let mut text = String::new();
    for (i, job) in jobs.iter().enumerate() {
        if i > 0 && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&Link { job, chained: i > 0 }.render()?);
    }
    Ok(text)
}

/// Same as [`write_deck`], writing into `writer`. Nothing is written if any
/// job fails to render.
pub fn write_deck_to<W: Write>(jobs: &[GaussianIn], writer: &mut W) -> Result<(), CError> {
    let text = write_deck(jobs)?;
    writer.write_all(text.as_bytes())?;
    Ok(())
}

/// Writes the deck to `path`, replacing any existing file.
pub fn write_deck_file(jobs: &[GaussianIn], path: &Path) -> Result<(), CError> {
    let text = write_deck(jobs)?;
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(text.as_bytes())?;
    writer.flush()?;
    Ok(())
}

/// Splits an input file on its separator lines (matched case-insensitively)
/// and parses every job.
///
/// # Errors
///
/// Returns the first parse error, with line numbers relative to the job.
pub fn read_deck(text: &str) -> Result<Vec<GaussianIn>, CError> {
    let mut jobs = Vec::new();
    let mut start = 0;
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if line.trim().eq_ignore_ascii_case(LINK1_SEPARATOR) {
            jobs.push(GaussianIn::parse(&text[start..offset])?);
            start = offset + line.len();
        }
        offset += line.len();
    }
    jobs.push(GaussianIn::parse(&text[start..])?);
    log::debug!("read {} job(s) from input deck", jobs.len());
    Ok(jobs)
}
