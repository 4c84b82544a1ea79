// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2025 William Bro-Jørgensen
// Copyright (c) 2020 Guillaume Fraux and contributors
//
// See LICENSE at the project root for full text.

use crate::error::CError;
use crate::formats::deck::read_deck;
use crate::formats::gaussian_in::GaussianIn;
use crate::formats::gaussian_out::GaussianOut;
use crate::formats::xyz::read_xyz;
use crate::geometry::GeometrySnapshot;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Supported text formats.
///
/// - `GaussianOutput`: calculation log (`.log`, `.out`).
/// - `GaussianInput`: job input deck (`.gjf`, `.com`).
/// - `XYZ`: plain-text XYZ coordinate format.
/// - `Guess`: autodetect format from file extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextFormat {
    GaussianOutput,
    GaussianInput,
    XYZ,
    Guess,
}

impl TextFormat {
    /// Infers the format from the extension of `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file extension is unrecognized.
    pub fn from_path(path: &Path) -> Result<Self, CError> {
        let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");

        match ext.to_lowercase().as_str() {
            "log" | "out" => Ok(TextFormat::GaussianOutput),
            "gjf" | "com" => Ok(TextFormat::GaussianInput),
            "xyz" => Ok(TextFormat::XYZ),
            _ => Err(CError::UnknownFormat(path.display().to_string())),
        }
    }

    /// Replaces `Guess` by the format inferred from `path`.
    pub fn resolve(self, path: &Path) -> Result<Self, CError> {
        match self {
            TextFormat::Guess => Self::from_path(path),
            fmt => Ok(fmt),
        }
    }
}

/// A text format that is parsed in one pass from its complete content.
pub trait FileFormat: Sized {
    /// Parses the full text of one file.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not structurally valid.
    fn parse(text: &str) -> Result<Self, CError>;

    /// Reads everything from `reader`, then parses it.
    fn read_from<R: Read>(reader: R) -> Result<Self, CError> {
        let mut text = String::new();
        BufReader::new(reader).read_to_string(&mut text)?;
        Self::parse(&text)
    }

    /// Opens `path` and parses its content. The file is closed before
    /// returning, whether parsing succeeds or not.
    fn open(path: &Path) -> Result<Self, CError> {
        let file = File::open(path)?;
        Self::read_from(file)
    }
}

/// A value that can be serialized back to text.
pub trait WriteFormat {
    /// Renders the complete file content.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be represented in the format.
    fn render(&self) -> Result<String, CError>;

    fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), CError> {
        let text = self.render()?;
        writer.write_all(text.as_bytes())?;
        Ok(())
    }

    /// Writes the rendered text to `path`, replacing any existing file.
    fn write(&self, path: &Path) -> Result<(), CError> {
        let text = self.render()?;
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(text.as_bytes())?;
        writer.flush()?;
        Ok(())
    }
}

/// The parsed content of any supported file.
#[derive(Debug)]
pub enum Document {
    Output(GaussianOut),
    /// Every job of the deck, in file order.
    Input(Vec<GaussianIn>),
    XYZ(GeometrySnapshot),
}

impl Document {
    /// Opens `path`, guessing the format from its extension.
    pub fn open(path: &Path) -> Result<Self, CError> {
        Self::open_with_format(path, TextFormat::Guess)
    }

    /// Opens `path` as the given format.
    pub fn open_with_format(path: &Path, fmt: TextFormat) -> Result<Self, CError> {
        let fmt = fmt.resolve(path)?;
        let mut text = String::new();
        BufReader::new(File::open(path)?).read_to_string(&mut text)?;

        match fmt {
            TextFormat::GaussianOutput => Ok(Document::Output(GaussianOut::parse(&text)?)),
            TextFormat::GaussianInput => Ok(Document::Input(read_deck(&text)?)),
            TextFormat::XYZ => Ok(Document::XYZ(read_xyz(&text)?)),
            TextFormat::Guess => Err(CError::UnknownFormat(path.display().to_string())),
        }
    }

    /// The most relevant geometry of the document: the last snapshot of a
    /// log, the molecule of the last job of a deck, or the XYZ frame.
    pub fn geometry(&self) -> Option<&GeometrySnapshot> {
        match self {
            Document::Output(out) => out.snapshots().last(),
            Document::Input(jobs) => jobs.last().map(|job| &job.molecule),
            Document::XYZ(snapshot) => Some(snapshot),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn guess_from_extension() {
        let guess = |p: &str| TextFormat::from_path(Path::new(p)).unwrap();
        assert_eq!(guess("job.log"), TextFormat::GaussianOutput);
        assert_eq!(guess("job.OUT"), TextFormat::GaussianOutput);
        assert_eq!(guess("job.gjf"), TextFormat::GaussianInput);
        assert_eq!(guess("job.com"), TextFormat::GaussianInput);
        assert_eq!(guess("water.xyz"), TextFormat::XYZ);
        assert_eq!(
            TextFormat::XYZ.resolve(Path::new("job.log")).unwrap(),
            TextFormat::XYZ
        );
    }

    #[test]
    #[should_panic(expected = "UnknownFormat")]
    fn unknown_extension() {
        TextFormat::from_path(Path::new("job.pdb")).unwrap();
    }

    #[test]
    fn open_documents() {
        let doc = Document::open(Path::new("./src/tests-data/gaussian/water_opt.log")).unwrap();
        assert!(matches!(doc, Document::Output(_)));
        assert_eq!(doc.geometry().unwrap().size(), 3);

        let doc = Document::open(Path::new("./src/tests-data/gaussian/two_jobs.gjf")).unwrap();
        match &doc {
            Document::Input(jobs) => assert_eq!(jobs.len(), 2),
            _ => panic!("expected an input deck"),
        }

        let doc = Document::open_with_format(
            Path::new("./src/tests-data/gaussian/water.xyz"),
            TextFormat::Guess,
        )
        .unwrap();
        assert_eq!(doc.geometry().unwrap().symbols(), vec!["O", "H", "H"]);
    }
}
